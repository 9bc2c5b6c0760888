//! The delegate worker: consumes computation requests from the request
//! queue and answers each on its reply destination, echoing the request's
//! correlation id.

use amqprs::channel::{
    BasicConsumeArguments, BasicPublishArguments, Channel, QueueDeclareArguments,
};
use amqprs::consumer::AsyncConsumer;
use amqprs::{BasicProperties, Deliver};
use async_trait::async_trait;

use amqp::AmqpConfig;
use common::{sum_reply, ComputationRequest, REQUEST_QUEUE};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = AmqpConfig::from_env();
    let (_connection, channel) = amqp::connect(&config).await?;

    channel
        .queue_declare(QueueDeclareArguments::new(REQUEST_QUEUE))
        .await?;

    let consume_args = BasicConsumeArguments::new(REQUEST_QUEUE, "sum_worker")
        .manual_ack(false)
        .finish();
    channel
        .basic_consume(
            SumConsumer {
                channel: channel.clone(),
            },
            consume_args,
        )
        .await?;

    tracing::info!(queue = REQUEST_QUEUE, "waiting for computation requests");
    tokio::signal::ctrl_c().await?;
    tracing::info!("exiting");
    Ok(())
}

/// Decodes the wire request and produces the contracted reply string.
fn reply_body(payload: &[u8]) -> Result<String, serde_json::Error> {
    let request: ComputationRequest = serde_json::from_slice(payload)?;
    tracing::info!(name = %request.name, a = request.a, b = request.b, "computing sum");
    Ok(sum_reply(request.a, request.b))
}

struct SumConsumer {
    channel: Channel,
}

#[async_trait]
impl AsyncConsumer for SumConsumer {
    async fn consume(
        &mut self,
        _channel: &Channel,
        _deliver: Deliver,
        properties: BasicProperties,
        content: Vec<u8>,
    ) {
        let reply = match reply_body(&content) {
            Ok(reply) => reply,
            Err(error) => {
                tracing::warn!(%error, "discarding unparseable request");
                return;
            }
        };

        let Some(reply_to) = properties.reply_to() else {
            tracing::warn!("request without a reply destination, nowhere to answer");
            return;
        };

        let mut reply_properties = BasicProperties::default();
        if let Some(correlation_id) = properties.correlation_id() {
            reply_properties.with_correlation_id(correlation_id);
        }

        let args = BasicPublishArguments::new("", reply_to);
        if let Err(error) = self
            .channel
            .basic_publish(reply_properties, reply.into_bytes(), args)
            .await
        {
            tracing::error!(%error, reply_to = %reply_to, "failed to publish reply");
        }
    }
}

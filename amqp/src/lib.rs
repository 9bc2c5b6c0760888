//! AMQP plumbing for the RPC-over-queue exchange: connection lifecycle,
//! the request publisher, and the correlated-reply consumer.

use amqprs::callbacks::{DefaultChannelCallback, DefaultConnectionCallback};
use amqprs::channel::{
    BasicConsumeArguments, BasicPublishArguments, Channel, QueueDeclareArguments,
};
use amqprs::connection::{Connection, OpenConnectionArguments};
use amqprs::consumer::AsyncConsumer;
use amqprs::{BasicProperties, Deliver};
use async_trait::async_trait;
use tokio::sync::mpsc;

use common::{CorrelationId, OutboundRequest, Reply, RequestTransport, TransportError};

/// Broker connection parameters, supplied through the environment with the
/// usual local defaults.
#[derive(Debug, Clone)]
pub struct AmqpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
}

impl AmqpConfig {
    pub fn from_env() -> Self {
        AmqpConfig {
            host: std::env::var("AMQP_HOST").unwrap_or_else(|_| "localhost".to_string()),
            port: std::env::var("AMQP_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(5672),
            username: std::env::var("AMQP_USERNAME").unwrap_or_else(|_| "guest".to_string()),
            password: std::env::var("AMQP_PASSWORD").unwrap_or_else(|_| "guest".to_string()),
        }
    }
}

fn transport(error: amqprs::error::Error) -> TransportError {
    TransportError::new(error.to_string())
}

/// Opens a connection and a channel with the default recovery callbacks
/// registered. The connection must outlive the channel.
pub async fn connect(config: &AmqpConfig) -> Result<(Connection, Channel), TransportError> {
    let connection = Connection::open(&OpenConnectionArguments::new(
        &config.host,
        config.port,
        &config.username,
        &config.password,
    ))
    .await
    .map_err(transport)?;
    connection
        .register_callback(DefaultConnectionCallback)
        .await
        .map_err(transport)?;

    let channel = connection.open_channel(None).await.map_err(transport)?;
    channel
        .register_callback(DefaultChannelCallback)
        .await
        .map_err(transport)?;

    Ok((connection, channel))
}

/// Publishes requests to the well-known request queue and feeds correlated
/// replies from an exclusive server-named reply queue into `reply_tx`.
pub struct RpcClient {
    connection: Connection,
    channel: Channel,
    request_queue: String,
    reply_queue: String,
}

impl RpcClient {
    /// Connects, declares the request queue and the reply queue, and starts
    /// the reply consumer.
    pub async fn connect(
        config: &AmqpConfig,
        request_queue: &str,
        reply_tx: mpsc::Sender<Reply>,
    ) -> Result<Self, TransportError> {
        let (connection, channel) = connect(config).await?;

        channel
            .queue_declare(QueueDeclareArguments::new(request_queue))
            .await
            .map_err(transport)?;

        // Server-named, exclusive to this connection, gone when it closes.
        let reply_args = QueueDeclareArguments::default()
            .exclusive(true)
            .auto_delete(true)
            .finish();
        let (reply_queue, _, _) = channel
            .queue_declare(reply_args)
            .await
            .map_err(transport)?
            .ok_or_else(|| TransportError::new("broker did not confirm reply queue declare"))?;

        let consume_args = BasicConsumeArguments::new(&reply_queue, "reply_listener")
            .manual_ack(false)
            .finish();
        channel
            .basic_consume(ReplyConsumer { reply_tx }, consume_args)
            .await
            .map_err(transport)?;

        tracing::info!(%reply_queue, "consuming correlated replies");

        Ok(RpcClient {
            connection,
            channel,
            request_queue: request_queue.to_string(),
            reply_queue,
        })
    }

    /// Closes the channel and the connection.
    pub async fn close(self) -> Result<(), TransportError> {
        self.channel.close().await.map_err(transport)?;
        self.connection.close().await.map_err(transport)
    }
}

#[async_trait]
impl RequestTransport for RpcClient {
    async fn publish(&self, request: &OutboundRequest) -> Result<(), TransportError> {
        let mut properties = BasicProperties::default();
        properties
            .with_correlation_id(&request.correlation_id.0)
            .with_reply_to(&self.reply_queue);

        let args = BasicPublishArguments::new("", &self.request_queue);
        self.channel
            .basic_publish(properties, request.body.clone().into_bytes(), args)
            .await
            .map_err(transport)
    }
}

struct ReplyConsumer {
    reply_tx: mpsc::Sender<Reply>,
}

#[async_trait]
impl AsyncConsumer for ReplyConsumer {
    async fn consume(
        &mut self,
        _channel: &Channel,
        _deliver: Deliver,
        properties: BasicProperties,
        content: Vec<u8>,
    ) {
        let Some(correlation_id) = properties.correlation_id() else {
            tracing::warn!("dropping reply without a correlation id");
            return;
        };
        let reply = Reply {
            correlation_id: CorrelationId(correlation_id.clone()),
            body: String::from_utf8_lossy(&content).to_string(),
        };
        if let Err(error) = self.reply_tx.send(reply).await {
            tracing::error!(%error, "reply channel closed, dropping reply");
        }
    }
}

use std::sync::Arc;

use tokio::sync::mpsc;

use common::{Reply, REQUEST_QUEUE};

mod config;
mod eval;
mod rest;
mod rpc;

use crate::config::GatewayConfig;
use crate::eval::LocalEvaluator;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = GatewayConfig::from_env();

    let (dispatch_tx, dispatch_rx) = mpsc::channel(64);
    let (reply_tx, mut reply_rx) = mpsc::channel::<Reply>(64);

    // Broker replies are forwarded into the dispatch loop for matching.
    let reply_dispatch_tx = dispatch_tx.clone();
    tokio::spawn(async move {
        while let Some(reply) = reply_rx.recv().await {
            if reply_dispatch_tx
                .send(rpc::RpcMessage::Reply(reply))
                .await
                .is_err()
            {
                break;
            }
        }
    });

    match amqp::RpcClient::connect(&config.amqp, REQUEST_QUEUE, reply_tx).await {
        Ok(client) => {
            tokio::spawn(rpc::run(dispatch_rx, client));
        }
        Err(error) => {
            tracing::error!(%error, "broker unreachable, rpc requests will report transport errors");
            tokio::spawn(rpc::run(dispatch_rx, rpc::Disconnected::new(error)));
        }
    }

    let app = rest::router(Arc::new(LocalEvaluator), dispatch_tx, config.rpc_deadline);
    rest::serve(config.listen_addr, app).await
}

use std::net::SocketAddr;
use std::time::Duration;

use amqp::AmqpConfig;

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub listen_addr: SocketAddr,
    pub rpc_deadline: Duration,
    pub amqp: AmqpConfig,
}

impl GatewayConfig {
    pub fn from_env() -> Self {
        let listen_addr = std::env::var("GATEWAY_ADDR")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], 3000)));
        let rpc_deadline = std::env::var("RPC_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(Duration::from_secs(10));

        GatewayConfig {
            listen_addr,
            rpc_deadline,
            amqp: AmqpConfig::from_env(),
        }
    }
}

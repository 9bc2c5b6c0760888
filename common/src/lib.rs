//! Wire types shared by the gateway, the worker, and the demo client.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

mod error;

pub use error::{RpcError, TransportError};

/// Well-known request queue the worker consumes from.
pub const REQUEST_QUEUE: &str = "rpc_queue";

/// Body accepted by both compute endpoints and published to the broker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputationRequest {
    pub name: String,
    pub a: i64,
    pub b: i64,
}

/// Token matching a reply to the request that produced it.
#[derive(Eq, Hash, PartialEq, Debug, Clone)]
pub struct CorrelationId(pub String);

impl CorrelationId {
    pub fn generate() -> Self {
        CorrelationId(Uuid::new_v4().to_string())
    }
}

/// A request encoded for the broker, tagged with its correlation id.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub correlation_id: CorrelationId,
    pub body: String,
}

impl OutboundRequest {
    /// Encodes the request as canonical JSON and assigns a fresh
    /// correlation id.
    pub fn encode(request: &ComputationRequest) -> Result<Self, serde_json::Error> {
        Ok(OutboundRequest {
            correlation_id: CorrelationId::generate(),
            body: serde_json::to_string(request)?,
        })
    }
}

/// A decoded broker reply.
#[derive(Debug, Clone)]
pub struct Reply {
    pub correlation_id: CorrelationId,
    pub body: String,
}

/// Seam between the dispatch loop and the broker. The implementation must
/// attach the correlation id and a reply destination to the outgoing
/// message.
#[async_trait]
pub trait RequestTransport: Send + Sync + 'static {
    async fn publish(&self, request: &OutboundRequest) -> Result<(), TransportError>;
}

/// The contracted computation. Both backends and the worker answer with
/// exactly this string, so their results stay interchangeable.
pub fn sum_reply(a: i64, b: i64) -> String {
    (a + b).to_string()
}

//! Request/reply dispatch keyed by correlation id.
//!
//! A single loop owns the map of pending waiters. Callers hand it an
//! encoded request plus a oneshot sender over the dispatch channel and
//! await the oneshot under a deadline, so no thread ever blocks on the
//! broker.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;

use common::{CorrelationId, OutboundRequest, Reply, RequestTransport, RpcError, TransportError};

type ReplyWaiter = oneshot::Sender<Result<String, RpcError>>;

#[derive(Debug)]
pub enum RpcMessage {
    Request(OutboundRequest, ReplyWaiter),
    Reply(Reply),
    Expired(CorrelationId),
}

/// Performs one RPC round trip: enqueue the request, wait for the
/// correlated reply, give up after `deadline`.
pub async fn call(
    request: OutboundRequest,
    dispatch_tx: &mpsc::Sender<RpcMessage>,
    deadline: Duration,
) -> Result<String, RpcError> {
    let correlation_id = request.correlation_id.clone();
    let (reply_tx, reply_rx) = oneshot::channel();

    dispatch_tx
        .send(RpcMessage::Request(request, reply_tx))
        .await
        .map_err(|_| TransportError::new("rpc dispatch loop is not running"))?;

    match timeout(deadline, reply_rx).await {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(_)) => Err(TransportError::new("rpc dispatch loop dropped the request").into()),
        Err(_) => {
            // Purge the waiter so a late reply is not matched against a
            // caller that already gave up.
            let _ = dispatch_tx
                .send(RpcMessage::Expired(correlation_id))
                .await;
            Err(RpcError::Timeout(deadline))
        }
    }
}

/// Owns the pending-waiter map. Publishes requests through `transport`,
/// resolves waiters as correlated replies come in, and purges waiters
/// whose callers timed out.
pub async fn run<T: RequestTransport>(mut dispatch_rx: mpsc::Receiver<RpcMessage>, transport: T) {
    let mut pending: HashMap<CorrelationId, ReplyWaiter> = HashMap::new();

    while let Some(message) = dispatch_rx.recv().await {
        match message {
            RpcMessage::Request(request, reply_tx) => {
                let correlation_id = request.correlation_id.clone();
                match transport.publish(&request).await {
                    Ok(()) => {
                        pending.insert(correlation_id, reply_tx);
                    }
                    Err(error) => {
                        tracing::error!(%error, correlation_id = %correlation_id.0, "publish failed");
                        let _ = reply_tx.send(Err(error.into()));
                    }
                }
            }
            RpcMessage::Reply(reply) => match pending.remove(&reply.correlation_id) {
                Some(waiter) => {
                    if waiter.send(Ok(reply.body)).is_err() {
                        tracing::warn!(
                            correlation_id = %reply.correlation_id.0,
                            "waiter gone before its reply arrived"
                        );
                    }
                }
                None => tracing::warn!(
                    correlation_id = %reply.correlation_id.0,
                    "reply with no pending request"
                ),
            },
            RpcMessage::Expired(correlation_id) => {
                pending.remove(&correlation_id);
            }
        }
    }

    tracing::info!("rpc dispatch channel closed");
}

/// Stand-in transport for when the broker could not be reached at startup.
/// Every publish reports the original connect failure.
pub struct Disconnected(TransportError);

impl Disconnected {
    pub fn new(cause: TransportError) -> Self {
        Disconnected(cause)
    }
}

#[async_trait::async_trait]
impl RequestTransport for Disconnected {
    async fn publish(&self, _request: &OutboundRequest) -> Result<(), TransportError> {
        Err(self.0.clone())
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{EchoWorker, SilentWorker};
    use super::*;
    use common::ComputationRequest;

    fn encode(name: &str, a: i64, b: i64) -> OutboundRequest {
        OutboundRequest::encode(&ComputationRequest {
            name: name.to_string(),
            a,
            b,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn reply_matches_the_contracted_sum() {
        let (dispatch_tx, dispatch_rx) = mpsc::channel(64);
        tokio::spawn(run(
            dispatch_rx,
            EchoWorker {
                dispatch_tx: dispatch_tx.clone(),
            },
        ));

        let body = call(
            encode("Vladimir", 5, 3),
            &dispatch_tx,
            Duration::from_secs(5),
        )
        .await
        .unwrap();
        assert_eq!(body, "8");
    }

    #[tokio::test]
    async fn concurrent_requests_never_cross_deliver() {
        let (dispatch_tx, dispatch_rx) = mpsc::channel(64);
        tokio::spawn(run(
            dispatch_rx,
            EchoWorker {
                dispatch_tx: dispatch_tx.clone(),
            },
        ));

        let mut handles = Vec::new();
        for i in 0..16i64 {
            let dispatch_tx = dispatch_tx.clone();
            handles.push(tokio::spawn(async move {
                let body = call(
                    encode(&format!("caller-{i}"), i, 1000),
                    &dispatch_tx,
                    Duration::from_secs(5),
                )
                .await
                .unwrap();
                assert_eq!(body, (i + 1000).to_string());
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
    }

    #[tokio::test]
    async fn missing_worker_times_out_instead_of_hanging() {
        let (dispatch_tx, dispatch_rx) = mpsc::channel(64);
        tokio::spawn(run(dispatch_rx, SilentWorker));

        let error = call(
            encode("Vladimir", 5, 3),
            &dispatch_tx,
            Duration::from_millis(50),
        )
        .await
        .unwrap_err();
        assert!(matches!(error, RpcError::Timeout(_)));
    }

    #[tokio::test]
    async fn unreachable_broker_reports_transport_error() {
        let (dispatch_tx, dispatch_rx) = mpsc::channel(64);
        tokio::spawn(run(
            dispatch_rx,
            Disconnected::new(TransportError::new("connection refused")),
        ));

        let error = call(
            encode("Vladimir", 5, 3),
            &dispatch_tx,
            Duration::from_secs(5),
        )
        .await
        .unwrap_err();
        assert!(matches!(error, RpcError::Transport(_)));
        assert_eq!(error.kind(), "transport");
    }

    #[tokio::test]
    async fn orphan_reply_does_not_disturb_the_loop() {
        let (dispatch_tx, dispatch_rx) = mpsc::channel(64);
        tokio::spawn(run(
            dispatch_rx,
            EchoWorker {
                dispatch_tx: dispatch_tx.clone(),
            },
        ));

        dispatch_tx
            .send(RpcMessage::Reply(Reply {
                correlation_id: CorrelationId::generate(),
                body: "orphan".to_string(),
            }))
            .await
            .unwrap();

        let body = call(encode("still-up", 2, 2), &dispatch_tx, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(body, "4");
    }
}

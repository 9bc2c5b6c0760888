//! HTTP façade: two POST endpoints, one per backend. Results are passed
//! through unchanged; failures map to a non-200 status with a
//! machine-readable error kind.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::json;
use tokio::sync::mpsc;

use common::{ComputationRequest, OutboundRequest, RpcError};

use crate::eval::{EvaluationError, Evaluator};
use crate::rpc;

pub fn router(
    evaluator: Arc<dyn Evaluator>,
    dispatch_tx: mpsc::Sender<rpc::RpcMessage>,
    rpc_deadline: Duration,
) -> Router {
    Router::new()
        .route(
            "/compute/eval",
            post(move |body| eval(body, evaluator.clone())),
        )
        .route(
            "/compute/rpc",
            post(move |body| rpc_call(body, dispatch_tx.clone(), rpc_deadline)),
        )
}

pub async fn serve(addr: SocketAddr, app: Router) -> anyhow::Result<()> {
    tracing::info!(%addr, "listening");
    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await?;
    Ok(())
}

async fn eval(
    Json(request): Json<ComputationRequest>,
    evaluator: Arc<dyn Evaluator>,
) -> Result<String, ApiError> {
    tracing::info!(name = %request.name, a = request.a, b = request.b, "eval request");
    Ok(evaluator
        .evaluate(&request.name, request.a, request.b)
        .await?)
}

async fn rpc_call(
    Json(request): Json<ComputationRequest>,
    dispatch_tx: mpsc::Sender<rpc::RpcMessage>,
    deadline: Duration,
) -> Result<String, ApiError> {
    tracing::info!(name = %request.name, a = request.a, b = request.b, "rpc request");
    let outbound = OutboundRequest::encode(&request)?;
    Ok(rpc::call(outbound, &dispatch_tx, deadline).await?)
}

/// Error surface of the façade: a status plus `{"error": kind, "message"}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    kind: &'static str,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({ "error": self.kind, "message": self.message }));
        (self.status, body).into_response()
    }
}

impl From<RpcError> for ApiError {
    fn from(error: RpcError) -> Self {
        let status = match error {
            RpcError::Transport(_) => StatusCode::BAD_GATEWAY,
            RpcError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        };
        ApiError {
            status,
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

impl From<EvaluationError> for ApiError {
    fn from(error: EvaluationError) -> Self {
        ApiError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            kind: "evaluation",
            message: error.to_string(),
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(error: serde_json::Error) -> Self {
        ApiError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            kind: "encode",
            message: error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::LocalEvaluator;
    use crate::rpc::testing::{EchoWorker, SilentWorker};
    use axum::body::Body;
    use axum::http::Request;
    use common::TransportError;
    use tower::ServiceExt;

    const VLADIMIR: &str = r#"{"name":"Vladimir","a":5,"b":3}"#;

    fn post(uri: &str, body: &'static str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body))
            .unwrap()
    }

    async fn body_string(response: Response) -> String {
        let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn app_with<T: common::RequestTransport>(transport_of: impl FnOnce(mpsc::Sender<rpc::RpcMessage>) -> T, deadline: Duration) -> Router {
        let (dispatch_tx, dispatch_rx) = mpsc::channel(64);
        tokio::spawn(rpc::run(dispatch_rx, transport_of(dispatch_tx.clone())));
        router(Arc::new(LocalEvaluator), dispatch_tx, deadline)
    }

    #[tokio::test]
    async fn eval_path_returns_the_sum() {
        let app = app_with(|dispatch_tx| EchoWorker { dispatch_tx }, Duration::from_secs(1));
        let response = app.oneshot(post("/compute/eval", VLADIMIR)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "8");
    }

    #[tokio::test]
    async fn rpc_path_returns_the_same_sum_as_eval() {
        let app = app_with(|dispatch_tx| EchoWorker { dispatch_tx }, Duration::from_secs(5));
        let response = app.oneshot(post("/compute/rpc", VLADIMIR)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "8");
    }

    #[tokio::test]
    async fn unreachable_broker_maps_to_bad_gateway() {
        let app = app_with(
            |_| rpc::Disconnected::new(TransportError::new("connection refused")),
            Duration::from_secs(5),
        );
        let response = app.oneshot(post("/compute/rpc", VLADIMIR)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let body: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(body["error"], "transport");
    }

    #[tokio::test]
    async fn missing_worker_maps_to_gateway_timeout() {
        let app = app_with(|_| SilentWorker, Duration::from_millis(50));
        let response = app.oneshot(post("/compute/rpc", VLADIMIR)).await.unwrap();
        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
        let body: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(body["error"], "timeout");
    }

    #[tokio::test]
    async fn malformed_body_is_rejected() {
        let app = app_with(|dispatch_tx| EchoWorker { dispatch_tx }, Duration::from_secs(1));
        let response = app
            .oneshot(post("/compute/eval", r#"{"name":"Vladimir"}"#))
            .await
            .unwrap();
        assert!(response.status().is_client_error());
    }
}

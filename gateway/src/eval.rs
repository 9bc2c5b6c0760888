//! Script-evaluation backend, treated as an opaque capability.

use async_trait::async_trait;
use thiserror::Error;

use common::sum_reply;

#[derive(Debug, Error)]
#[error("evaluation failed: {0}")]
pub struct EvaluationError(pub String);

/// Delegates a computation to an evaluation engine and returns its result.
#[async_trait]
pub trait Evaluator: Send + Sync + 'static {
    async fn evaluate(&self, name: &str, a: i64, b: i64) -> Result<String, EvaluationError>;
}

/// In-process stand-in for an external script engine. Answers with the same
/// contracted sum the queue worker produces.
pub struct LocalEvaluator;

#[async_trait]
impl Evaluator for LocalEvaluator {
    async fn evaluate(&self, name: &str, a: i64, b: i64) -> Result<String, EvaluationError> {
        tracing::debug!(name, a, b, "evaluating locally");
        Ok(sum_reply(a, b))
    }
}

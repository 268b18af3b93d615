//! The Evaluator (C3): judges an executed attack vector against its
//! prediction, producing the labelled record training pairs bundle.

use crate::error::Result;
use crate::intelligence::{EvaluationResult, PredictionMetrics};
use async_trait::async_trait;

#[async_trait]
pub trait Evaluator: Send + Sync {
    async fn evaluate(&self, vector_id: &str, prediction: &PredictionMetrics, actual_output: &str) -> Result<EvaluationResult>;
}

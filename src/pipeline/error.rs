//! Pipeline and gateway error types

use thiserror::Error;

use super::types::Metric;

pub type GatewayResult<T> = Result<T, GatewayError>;
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Failure of a single remote call
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GatewayError {
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("backend answered {status}: {body}")]
    Status { status: u16, body: String },
    #[error("could not decode response: {0}")]
    Decode(String),
    #[error("response carried no data")]
    EmptyPayload,
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            GatewayError::Decode(err.to_string())
        } else {
            GatewayError::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        GatewayError::Decode(err.to_string())
    }
}

/// Pipeline stage an error belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Validation,
    Cache,
    Collection,
    Analysis,
    Recommendation,
    Admission,
}

/// Terminal error of one pipeline run. No variant is ever retried.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PipelineError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("transport error: {0}")]
    Transport(#[source] GatewayError),
    #[error("collection error ({metric}): {reason}")]
    Collection { metric: Metric, reason: String },
    #[error("analysis error ({metric}): {reason}")]
    Analysis { metric: Metric, reason: String },
    #[error("recommendation error: {0}")]
    Recommendation(String),
    #[error("a pipeline run is already in progress")]
    Busy,
    #[error("pipeline run was cancelled")]
    Cancelled,
    #[error("unsupported operation: {0}")]
    Unsupported(String),
}

impl PipelineError {
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::Validation(_) => Stage::Validation,
            PipelineError::Transport(_) => Stage::Cache,
            PipelineError::Collection { .. } => Stage::Collection,
            PipelineError::Analysis { .. } => Stage::Analysis,
            PipelineError::Recommendation(_) => Stage::Recommendation,
            PipelineError::Busy | PipelineError::Cancelled | PipelineError::Unsupported(_) => {
                Stage::Admission
            }
        }
    }

    /// Short reason carried by `PipelineStatus::Failed`
    pub fn status_reason(&self) -> &'static str {
        match self {
            PipelineError::Validation(_) => "validation error",
            PipelineError::Transport(_) => "cache error",
            PipelineError::Collection { .. } => "collection error",
            PipelineError::Analysis { .. } => "analysis error",
            PipelineError::Recommendation(_) => "recommendation error",
            PipelineError::Busy => "busy",
            PipelineError::Cancelled => "cancelled",
            PipelineError::Unsupported(_) => "unsupported",
        }
    }
}

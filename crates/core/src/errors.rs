use thiserror::Error;

use crate::domain::schema::BoardId;
use crate::pipeline::PipelineState;

/// Failure of the external data-source client for a single board call.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SourceError {
    #[error("data source unavailable: {0}")]
    Unavailable(String),
    #[error("data source rate limited: {0}")]
    RateLimited(String),
    #[error("board `{0}` not found")]
    BoardNotFound(BoardId),
    #[error("data source call timed out after {0}s")]
    Timeout(u64),
}

impl SourceError {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::BoardNotFound(_))
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited(_))
    }
}

/// Failure of the external language-model client for a single completion call.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ModelError {
    #[error("model unavailable: {0}")]
    Unavailable(String),
    #[error("model rate limited: {0}")]
    RateLimited(String),
    #[error("model call timed out after {0}s")]
    Timeout(u64),
}

/// Model output that could not be turned into a valid query plan.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PlanParseError {
    #[error("no JSON object found in model output")]
    NoJson,
    #[error("malformed plan JSON: {0}")]
    Malformed(String),
    #[error("plan names no boards")]
    NoBoards,
    #[error("plan references unknown board `{0}`")]
    UnknownBoard(String),
    #[error("plan requests no metrics")]
    NoMetrics,
    #[error("field `{field}` does not exist on the selected boards")]
    UnknownField { field: String },
    #[error("metric `{metric}` invalid: {reason}")]
    InvalidMetric { metric: String, reason: String },
    #[error("filter on `{field}` invalid: {reason}")]
    InvalidFilter { field: String, reason: String },
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("illegal pipeline transition from {from:?} to {to:?}")]
pub struct TransitionError {
    pub from: PipelineState,
    pub to: PipelineState,
}

/// Terminal failure of a request. Only `user_message` ever reaches the caller.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PipelineFailure {
    #[error("no board schema could be retrieved")]
    SchemaUnavailable { rate_limited: bool },
    #[error("every requested board failed to fetch")]
    AllBoardsFailed { rate_limited: bool },
    #[error("language model failed during planning: {0}")]
    Planning(ModelError),
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error("request cancelled")]
    Cancelled,
}

impl PipelineFailure {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::SchemaUnavailable { rate_limited: true }
            | Self::AllBoardsFailed { rate_limited: true } => {
                "The board data source is rate limiting requests right now. Please try again in a minute."
            }
            Self::SchemaUnavailable { rate_limited: false } => {
                "I couldn't read the board structure from the data source. Please try again shortly."
            }
            Self::AllBoardsFailed { rate_limited: false } => {
                "I couldn't retrieve data for any of the boards needed to answer this. Please try again shortly."
            }
            Self::Planning(_) => {
                "Our AI service is temporarily at capacity. This usually resets within a few minutes. Please try again shortly."
            }
            Self::Transition(_) => "Something went wrong while processing your query. Please try again.",
            Self::Cancelled => "The request was cancelled before an answer could be prepared.",
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }
}

impl SourceError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        match self {
            Self::BoardNotFound(board) => InterfaceError::BadRequest {
                message: format!("board `{board}` not found"),
                correlation_id,
            },
            other => InterfaceError::ServiceUnavailable { message: other.to_string(), correlation_id },
        }
    }
}

//! Error types for plan operations

use thiserror::Error;

/// Main error type for request planning
///
/// Every variant is fatal to the request being planned; the planner never
/// retries and never returns partial output.
#[derive(Error, Debug)]
pub enum PlanError {
    #[error("no handler for function: {0}")]
    UnknownFunction(String),

    #[error("malformed message: {0}")]
    MalformedMessage(String),

    #[error("malformed manifest: {0}")]
    MalformedManifest(String),

    #[error("curtain dim0s/dim1s length mismatch: {dim0s} != {dim1s}")]
    MalformedCurtain { dim0s: usize, dim1s: usize },

    #[error("line (= {line}) not found in dimension {dim}")]
    LineNotFound { line: i64, dim: usize },

    #[error("task_size (= {0}) < 1")]
    InvalidTaskSize(usize),

    #[error("invalid grid: {0}")]
    InvalidGrid(String),

    #[error("invalid axis: {0}")]
    InvalidAxis(usize),

    #[error("task-count arithmetic overflow")]
    IntegerOverflow,
}

/// Specialized Result type for plan operations
pub type Result<T> = std::result::Result<T, PlanError>;

impl From<rmp_serde::encode::Error> for PlanError {
    fn from(err: rmp_serde::encode::Error) -> Self {
        PlanError::MalformedMessage(err.to_string())
    }
}

impl From<rmp_serde::decode::Error> for PlanError {
    fn from(err: rmp_serde::decode::Error) -> Self {
        PlanError::MalformedMessage(err.to_string())
    }
}

//! # Structured Error Handling
//!
//! Error taxonomy for the status aggregation core. Only two conditions are
//! hard failures surfaced to the caller: an unknown task name and a database
//! error on the mandatory lookup path. Everything else (missing webdir,
//! transport failures, corrupt snapshots) folds into a well-formed
//! [`StatusResult`](crate::aggregator::StatusResult) instead of an error.

use thiserror::Error;

/// Errors surfaced to callers of the status aggregation core.
#[derive(Debug, Error)]
pub enum StatusError {
    #[error("task not found: {task}")]
    TaskNotFound { task: String },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("too many concurrent status requests for {identity}: limit is {limit}")]
    Throttled { identity: String, limit: usize },

    #[error("configuration error: {0}")]
    Configuration(String),
}

pub type Result<T> = std::result::Result<T, StatusError>;

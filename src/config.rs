//! Configuration for the status aggregation core.
//!
//! Environment-driven configuration following the `TASKSTATUS_*` variable
//! convention. All knobs have conservative defaults so the core works out
//! of the box against a local database.

use crate::error::{Result, StatusError};

#[derive(Debug, Clone)]
pub struct StatusConfig {
    pub database_url: String,
    /// Connect timeout for remote snapshot fetches, in seconds.
    pub connect_timeout_secs: u64,
    /// Total request timeout for remote snapshot fetches, in seconds.
    pub request_timeout_secs: u64,
    /// Age in seconds after which a non-final node-state snapshot is
    /// considered stale.
    pub stale_after_secs: i64,
    /// Maximum concurrent status requests per caller identity.
    pub throttle_limit: usize,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            database_url: "postgresql://localhost/taskstatus_development".to_string(),
            connect_timeout_secs: 30,
            request_timeout_secs: 30,
            stale_after_secs: 120,
            throttle_limit: 3,
        }
    }
}

impl StatusConfig {
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(db_url) = std::env::var("DATABASE_URL") {
            config.database_url = db_url;
        }

        if let Ok(connect_timeout) = std::env::var("TASKSTATUS_CONNECT_TIMEOUT_SECS") {
            config.connect_timeout_secs = connect_timeout.parse().map_err(|e| {
                StatusError::Configuration(format!("Invalid connect_timeout_secs: {e}"))
            })?;
        }

        if let Ok(request_timeout) = std::env::var("TASKSTATUS_REQUEST_TIMEOUT_SECS") {
            config.request_timeout_secs = request_timeout.parse().map_err(|e| {
                StatusError::Configuration(format!("Invalid request_timeout_secs: {e}"))
            })?;
        }

        if let Ok(stale_after) = std::env::var("TASKSTATUS_STALE_AFTER_SECS") {
            config.stale_after_secs = stale_after.parse().map_err(|e| {
                StatusError::Configuration(format!("Invalid stale_after_secs: {e}"))
            })?;
        }

        if let Ok(throttle_limit) = std::env::var("TASKSTATUS_THROTTLE_LIMIT") {
            config.throttle_limit = throttle_limit.parse().map_err(|e| {
                StatusError::Configuration(format!("Invalid throttle_limit: {e}"))
            })?;
        }

        Ok(config)
    }
}

//! # Remote State Fetcher
//!
//! Retrieves named snapshot files from a task's remote working directory.
//!
//! ## Overview
//!
//! The scheduler publishes its per-task snapshot files (node state, transfer
//! status, error report) under an HTTP-reachable working directory. This
//! module fetches one file per call with bounded connect and total timeouts,
//! never follows redirects, never retries, and maps every failure to a typed
//! [`FetchError`] so the aggregator can apply its mandatory-vs-optional
//! failure policy.
//!
//! The fetch seam is the [`SnapshotTransport`] trait; production code uses
//! [`WebdirFetcher`], tests substitute in-memory transports.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{redirect, Client, StatusCode, Url};
use thiserror::Error;
use tracing::debug;

use crate::config::StatusConfig;

/// Typed failure taxonomy for a single remote fetch.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("timed out fetching {url}")]
    Timeout { url: String },

    #[error("connection error fetching {url}: {message}")]
    Connection { url: String, message: String },

    #[error("file not found at {url}")]
    NotFound { url: String },

    #[error("redirect rejected for {url}")]
    RedirectRejected { url: String },

    #[error("unexpected status {status} fetching {url}")]
    UpstreamStatus { status: u16, url: String },

    #[error("invalid working directory URL {url}: {message}")]
    InvalidUrl { url: String, message: String },
}

impl FetchError {
    /// Short machine-readable failure kind, used by callers deciding
    /// whether a retry at their level is worthwhile.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Timeout { .. } => "timeout",
            Self::Connection { .. } => "connection-error",
            Self::NotFound { .. } => "not-found",
            Self::RedirectRejected { .. } => "redirect-rejected",
            Self::UpstreamStatus { .. } => "upstream-status",
            Self::InvalidUrl { .. } => "invalid-url",
        }
    }
}

/// Transport interface for retrieving a named file from a task's remote
/// working directory.
#[async_trait]
pub trait SnapshotTransport: Send + Sync {
    async fn fetch(&self, webdir: &str, filename: &str) -> Result<Vec<u8>, FetchError>;
}

/// HTTP implementation of [`SnapshotTransport`].
///
/// A fresh client is built per call so no connection state leaks across
/// requests; the scheduler webdir is not a service worth pooling against.
#[derive(Debug, Clone)]
pub struct WebdirFetcher {
    connect_timeout: Duration,
    request_timeout: Duration,
}

impl WebdirFetcher {
    pub fn new(config: &StatusConfig) -> Self {
        Self {
            connect_timeout: Duration::from_secs(config.connect_timeout_secs),
            request_timeout: Duration::from_secs(config.request_timeout_secs),
        }
    }

    fn file_url(webdir: &str, filename: &str) -> Result<Url, FetchError> {
        let joined = format!("{}/{}", webdir.trim_end_matches('/'), filename);
        Url::parse(&joined).map_err(|e| FetchError::InvalidUrl {
            url: joined,
            message: e.to_string(),
        })
    }

    fn build_client(&self) -> Result<Client, FetchError> {
        Client::builder()
            .redirect(redirect::Policy::none())
            .connect_timeout(self.connect_timeout)
            .timeout(self.request_timeout)
            .user_agent(format!("taskstatus-core/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FetchError::Connection {
                url: String::new(),
                message: format!("failed to create HTTP client: {e}"),
            })
    }

    fn classify_send_error(error: reqwest::Error, url: &Url) -> FetchError {
        if error.is_timeout() {
            FetchError::Timeout {
                url: url.to_string(),
            }
        } else if error.is_redirect() {
            FetchError::RedirectRejected {
                url: url.to_string(),
            }
        } else {
            FetchError::Connection {
                url: url.to_string(),
                message: error.to_string(),
            }
        }
    }
}

#[async_trait]
impl SnapshotTransport for WebdirFetcher {
    async fn fetch(&self, webdir: &str, filename: &str) -> Result<Vec<u8>, FetchError> {
        let url = Self::file_url(webdir, filename)?;
        let client = self.build_client()?;

        debug!(url = %url, "fetching remote snapshot file");
        let response = client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| Self::classify_send_error(e, &url))?;

        let status = response.status();
        if status.is_redirection() {
            return Err(FetchError::RedirectRejected {
                url: url.to_string(),
            });
        }
        if status == StatusCode::NOT_FOUND {
            return Err(FetchError::NotFound {
                url: url.to_string(),
            });
        }
        if !status.is_success() {
            return Err(FetchError::UpstreamStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| Self::classify_send_error(e, &url))?;
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_url_joins_without_doubling_slashes() {
        let url =
            WebdirFetcher::file_url("https://schedd.example.org/cms/task/", "node_state").unwrap();
        assert_eq!(
            url.as_str(),
            "https://schedd.example.org/cms/task/node_state"
        );

        let url =
            WebdirFetcher::file_url("https://schedd.example.org/cms/task", "aso_status").unwrap();
        assert_eq!(url.as_str(), "https://schedd.example.org/cms/task/aso_status");
    }

    #[test]
    fn file_url_rejects_garbage_webdir() {
        let err = WebdirFetcher::file_url("not a url", "node_state").unwrap_err();
        assert_eq!(err.kind(), "invalid-url");
    }

    #[test]
    fn failure_kinds_are_stable() {
        let err = FetchError::Timeout {
            url: "https://x/y".into(),
        };
        assert_eq!(err.kind(), "timeout");
        let err = FetchError::RedirectRejected {
            url: "https://x/y".into(),
        };
        assert_eq!(err.kind(), "redirect-rejected");
    }
}

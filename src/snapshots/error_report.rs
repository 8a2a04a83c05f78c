//! # Error Report Reconciliation
//!
//! Decodes the error-report snapshot and attaches failure detail to failed
//! jobs. The report maps job ids to per-retry error details; the entry at
//! the numerically highest retry key describes the final failure.
//!
//! ## Format
//!
//! ```json
//! {
//!   "3": {
//!     "1": {"exit_code": 8021, "message": "file read error"},
//!     "2": {"exit_code": 8028, "message": "stage-out timeout"}
//!   }
//! }
//! ```

use std::collections::BTreeMap;

use tracing::warn;

use crate::snapshots::node_state::{JobId, JobState, NodeStateSnapshot};
use crate::snapshots::SnapshotError;

/// Decoded error report: job id -> retry number -> error detail. The
/// `BTreeMap` retry key keeps entries in numeric order, so the last entry
/// is the final retry.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ErrorSnapshot {
    pub reports: BTreeMap<JobId, BTreeMap<u32, serde_json::Value>>,
}

/// Decode raw error-report bytes. Retry keys compare numerically, not
/// lexically; non-numeric retry keys are skipped.
pub fn parse_error_snapshot(bytes: &[u8]) -> Result<ErrorSnapshot, SnapshotError> {
    let value: serde_json::Value = serde_json::from_slice(bytes)
        .map_err(|e| SnapshotError::Parse(format!("invalid JSON: {e}")))?;
    let object = value
        .as_object()
        .ok_or_else(|| SnapshotError::Parse("top level is not an object".to_string()))?;

    let mut reports = BTreeMap::new();
    for (job_key, retries) in object {
        let job_id = JobId::parse(job_key)
            .ok_or_else(|| SnapshotError::Parse(format!("invalid job id key: {job_key}")))?;
        let retries = retries
            .as_object()
            .ok_or_else(|| SnapshotError::Parse(format!("job {job_key} entry is not an object")))?;

        let mut by_retry = BTreeMap::new();
        for (retry_key, detail) in retries {
            match retry_key.parse::<u32>() {
                Ok(retry) => {
                    by_retry.insert(retry, detail.clone());
                }
                Err(_) => {
                    warn!(job = %job_id, retry = %retry_key, "skipping non-numeric retry key");
                }
            }
        }
        reports.insert(job_id, by_retry);
    }

    Ok(ErrorSnapshot { reports })
}

/// Attach to every `failed` job the error detail recorded at its highest
/// retry. Jobs with no matching report keep their error unset; details are
/// never fabricated.
///
/// Pure transformation over the owned snapshot; idempotent.
pub fn attach_errors(snapshot: NodeStateSnapshot, errors: &ErrorSnapshot) -> NodeStateSnapshot {
    let mut snapshot = snapshot;
    for (job_id, info) in &mut snapshot.jobs {
        if info.state != JobState::Failed {
            continue;
        }
        if let Some(retries) = errors.reports.get(job_id) {
            if let Some((_, detail)) = retries.iter().next_back() {
                info.error = Some(detail.clone());
            }
        }
    }
    snapshot
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshots::node_state::{DagStatus, DagSummary, JobInfo};
    use serde_json::json;

    fn node_snapshot(states: &[(u32, JobState)]) -> NodeStateSnapshot {
        let jobs = states
            .iter()
            .map(|&(id, state)| (JobId(id), JobInfo::new(state)))
            .collect();
        NodeStateSnapshot {
            jobs,
            summary: DagSummary {
                timestamp: 1_700_000_000,
                dag_status: Some(DagStatus::Error),
                nodes_total: states.len() as u32,
            },
        }
    }

    #[test]
    fn highest_retry_wins_numerically_not_lexically() {
        // Lexically "9" > "10"; numerically 10 wins.
        let bytes = serde_json::to_vec(&json!({
            "1": {
                "9": {"message": "ninth"},
                "10": {"message": "tenth"},
            }
        }))
        .unwrap();
        let errors = parse_error_snapshot(&bytes).unwrap();

        let attached = attach_errors(node_snapshot(&[(1, JobState::Failed)]), &errors);
        assert_eq!(
            attached.jobs[&JobId(1)].error,
            Some(json!({"message": "tenth"}))
        );
    }

    #[test]
    fn only_failed_jobs_get_errors() {
        let bytes = serde_json::to_vec(&json!({
            "1": {"1": {"message": "boom"}},
            "2": {"1": {"message": "boom"}},
        }))
        .unwrap();
        let errors = parse_error_snapshot(&bytes).unwrap();

        let attached = attach_errors(
            node_snapshot(&[(1, JobState::Finished), (2, JobState::Failed)]),
            &errors,
        );
        assert_eq!(attached.jobs[&JobId(1)].error, None);
        assert!(attached.jobs[&JobId(2)].error.is_some());
    }

    #[test]
    fn failed_job_without_report_keeps_error_unset() {
        let attached = attach_errors(
            node_snapshot(&[(1, JobState::Failed)]),
            &ErrorSnapshot::default(),
        );
        assert_eq!(attached.jobs[&JobId(1)].error, None);
    }

    #[test]
    fn non_numeric_retry_keys_are_skipped() {
        let bytes = serde_json::to_vec(&json!({
            "1": {"1": {"message": "real"}, "latest": {"message": "bogus"}},
        }))
        .unwrap();
        let errors = parse_error_snapshot(&bytes).unwrap();
        assert_eq!(errors.reports[&JobId(1)].len(), 1);
    }

    #[test]
    fn corrupt_report_is_a_parse_error() {
        assert!(parse_error_snapshot(b"[1, 2, 3]").is_err());
        assert!(parse_error_snapshot(b"{\"1\": 42}").is_err());
    }

    #[test]
    fn attachment_is_idempotent() {
        let bytes = serde_json::to_vec(&json!({
            "1": {"1": {"message": "boom"}},
        }))
        .unwrap();
        let errors = parse_error_snapshot(&bytes).unwrap();

        let once = attach_errors(node_snapshot(&[(1, JobState::Failed)]), &errors);
        let twice = attach_errors(once.clone(), &errors);
        assert_eq!(once, twice);
    }
}

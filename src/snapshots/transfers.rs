//! # Transfer Status Reconciliation
//!
//! Decodes the stage-out status snapshot and upgrades jobs from
//! `transferring` to `transferred` when every transfer document recorded
//! for them reached the terminal success state.
//!
//! ## Format
//!
//! ```json
//! {
//!   "results": {
//!     "doc-a": [{"jobid": 2, "state": "done"}],
//!     "doc-b": [{"jobid": 2, "state": "done"}]
//!   }
//! }
//! ```
//!
//! Each `results` entry is a history list whose first element is current.
//! The post-job writes this file only after all transfer documents for a
//! job exist, so N documents for a job means exactly N files to transfer.

use std::collections::{BTreeMap, BTreeSet};

use crate::constants::TRANSFER_DONE;
use crate::snapshots::node_state::{JobId, JobState, NodeStateSnapshot};
use crate::snapshots::SnapshotError;

/// One transfer document: its id, the owning job, and the current state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferDocument {
    pub doc_id: String,
    pub job_id: JobId,
    pub state: String,
}

/// Decoded stage-out status snapshot. Ephemeral: used only to upgrade
/// node-state entries.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TransferSnapshot {
    pub documents: Vec<TransferDocument>,
}

/// Result of folding the transfer snapshot into the node-state snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferReconciliation {
    pub snapshot: NodeStateSnapshot,
    /// Task-level warnings for cross-snapshot anomalies.
    pub warnings: Vec<String>,
}

/// Decode raw transfer-status bytes.
pub fn parse_transfer_snapshot(bytes: &[u8]) -> Result<TransferSnapshot, SnapshotError> {
    let value: serde_json::Value = serde_json::from_slice(bytes)
        .map_err(|e| SnapshotError::Parse(format!("invalid JSON: {e}")))?;
    let results = value
        .get("results")
        .and_then(|r| r.as_object())
        .ok_or_else(|| SnapshotError::Parse("missing results object".to_string()))?;

    let mut documents = Vec::with_capacity(results.len());
    for (doc_id, history) in results {
        // The first history element is the current revision; an empty
        // history carries no usable state.
        let Some(current) = history.as_array().and_then(|h| h.first()) else {
            continue;
        };
        let job_id = parse_job_id(current.get("jobid")).ok_or_else(|| {
            SnapshotError::Parse(format!("document {doc_id} has no valid jobid"))
        })?;
        let state = current
            .get("state")
            .and_then(|s| s.as_str())
            .ok_or_else(|| SnapshotError::Parse(format!("document {doc_id} has no state")))?;
        documents.push(TransferDocument {
            doc_id: doc_id.clone(),
            job_id,
            state: state.to_string(),
        });
    }

    Ok(TransferSnapshot { documents })
}

// jobid appears as a number or a decimal string depending on the writer.
fn parse_job_id(value: Option<&serde_json::Value>) -> Option<JobId> {
    let value = value?;
    if let Some(n) = value.as_u64() {
        return u32::try_from(n).ok().filter(|&n| n > 0).map(JobId);
    }
    value.as_str().and_then(JobId::parse)
}

/// Upgrade every `transferring` job whose recorded document states are all
/// `done`. Jobs with zero recorded documents are left unchanged: absence of
/// evidence is not completion. Documents naming a job id missing from the
/// node-state snapshot produce a task-level warning and are skipped.
///
/// Pure transformation over the owned snapshot; idempotent.
pub fn reconcile_transfers(
    snapshot: NodeStateSnapshot,
    transfers: &TransferSnapshot,
) -> TransferReconciliation {
    let mut snapshot = snapshot;
    let mut per_job: BTreeMap<JobId, Vec<&str>> = BTreeMap::new();
    let mut unknown_ids: BTreeSet<JobId> = BTreeSet::new();

    for document in &transfers.documents {
        match snapshot.jobs.get(&document.job_id) {
            None => {
                unknown_ids.insert(document.job_id);
            }
            Some(info) if info.state == JobState::Transferring => {
                per_job
                    .entry(document.job_id)
                    .or_default()
                    .push(document.state.as_str());
            }
            Some(_) => {}
        }
    }

    for (job_id, states) in per_job {
        if states.iter().all(|state| *state == TRANSFER_DONE) {
            if let Some(info) = snapshot.jobs.get_mut(&job_id) {
                info.state = JobState::Transferred;
            }
        }
    }

    let mut warnings = Vec::new();
    if !unknown_ids.is_empty() {
        let ids: Vec<String> = unknown_ids.iter().map(ToString::to_string).collect();
        warnings.push(format!(
            "Transfer status mentions jobs missing from the node state file ({}). \
             The file might be corrupted as a result of a disk failure on the scheduler.",
            ids.join(", ")
        ));
    }

    TransferReconciliation { snapshot, warnings }
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
                dag_status: Some(DagStatus::Submitted),
                nodes_total: states.len() as u32,
            },
        }
    }

    fn transfer_bytes(docs: &[(&str, u64, &str)]) -> Vec<u8> {
        let results: serde_json::Map<String, serde_json::Value> = docs
            .iter()
            .map(|&(doc, job, state)| {
                (
                    doc.to_string(),
                    json!([{"jobid": job, "state": state}]),
                )
            })
            .collect();
        serde_json::to_vec(&json!({ "results": results })).unwrap()
    }

    #[test]
    fn parses_documents_with_numeric_and_string_jobids() {
        let bytes = serde_json::to_vec(&json!({
            "results": {
                "doc-a": [{"jobid": 2, "state": "done"}],
                "doc-b": [{"jobid": "3", "state": "failed"}],
            }
        }))
        .unwrap();
        let snapshot = parse_transfer_snapshot(&bytes).unwrap();
        assert_eq!(snapshot.documents.len(), 2);
        assert!(snapshot
            .documents
            .iter()
            .any(|d| d.job_id == JobId(3) && d.state == "failed"));
    }

    #[test]
    fn missing_results_is_a_parse_error() {
        assert!(parse_transfer_snapshot(b"{}").is_err());
        assert!(parse_transfer_snapshot(b"not json").is_err());
    }

    #[test]
    fn upgrades_only_when_every_document_is_done() {
        let nodes = node_snapshot(&[(1, JobState::Transferring), (2, JobState::Transferring)]);
        let transfers = parse_transfer_snapshot(&transfer_bytes(&[
            ("a", 1, "done"),
            ("b", 1, "done"),
            ("c", 2, "done"),
            ("d", 2, "acquired"),
        ]))
        .unwrap();

        let reconciled = reconcile_transfers(nodes, &transfers);
        assert_eq!(reconciled.snapshot.jobs[&JobId(1)].state, JobState::Transferred);
        assert_eq!(reconciled.snapshot.jobs[&JobId(2)].state, JobState::Transferring);
        assert!(reconciled.warnings.is_empty());
    }

    #[test]
    fn zero_documents_leave_a_job_unchanged() {
        let nodes = node_snapshot(&[(1, JobState::Transferring)]);
        let reconciled = reconcile_transfers(nodes, &TransferSnapshot::default());
        assert_eq!(reconciled.snapshot.jobs[&JobId(1)].state, JobState::Transferring);
    }

    #[test]
    fn never_demotes_jobs_past_transferring() {
        let nodes = node_snapshot(&[(1, JobState::Finished)]);
        let transfers =
            parse_transfer_snapshot(&transfer_bytes(&[("a", 1, "acquired")])).unwrap();
        let reconciled = reconcile_transfers(nodes, &transfers);
        assert_eq!(reconciled.snapshot.jobs[&JobId(1)].state, JobState::Finished);
    }

    #[test]
    fn unknown_job_id_warns_and_is_skipped() {
        let nodes = node_snapshot(&[(1, JobState::Transferring)]);
        let transfers = parse_transfer_snapshot(&transfer_bytes(&[
            ("a", 1, "done"),
            ("b", 9, "done"),
        ]))
        .unwrap();
        let reconciled = reconcile_transfers(nodes, &transfers);
        assert_eq!(reconciled.snapshot.jobs[&JobId(1)].state, JobState::Transferred);
        assert_eq!(reconciled.warnings.len(), 1);
        assert!(reconciled.warnings[0].contains('9'));
    }

    #[test]
    fn reconciliation_is_idempotent() {
        let nodes = node_snapshot(&[(1, JobState::Transferring), (2, JobState::Failed)]);
        let transfers = parse_transfer_snapshot(&transfer_bytes(&[("a", 1, "done")])).unwrap();

        let once = reconcile_transfers(nodes, &transfers);
        let twice = reconcile_transfers(once.snapshot.clone(), &transfers);
        assert_eq!(once.snapshot, twice.snapshot);
    }
}

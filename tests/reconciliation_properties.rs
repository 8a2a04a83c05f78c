//! Property-based tests for the snapshot reconciliation laws.

use std::collections::BTreeMap;

use proptest::prelude::*;

use taskstatus_core::snapshots::{
    attach_errors, fill_missing_jobs, reconcile_transfers, DagStatus, DagSummary, ErrorSnapshot,
    JobId, JobInfo, JobState, NodeStateSnapshot, TransferSnapshot,
};
use taskstatus_core::snapshots::transfers::TransferDocument;

fn job_state_strategy() -> impl Strategy<Value = JobState> {
    prop_oneof![
        Just(JobState::Unsubmitted),
        Just(JobState::Idle),
        Just(JobState::Running),
        Just(JobState::Transferring),
        Just(JobState::Transferred),
        Just(JobState::Finished),
        Just(JobState::Failed),
        Just(JobState::Killed),
        Just(JobState::Held),
    ]
}

/// A snapshot with `nodes_total` jobs, some of which may be missing from
/// the map (as the orchestrator writes entries lazily).
fn snapshot_strategy() -> impl Strategy<Value = NodeStateSnapshot> {
    (1u32..40).prop_flat_map(|nodes_total| {
        proptest::collection::btree_map(1..=nodes_total, job_state_strategy(), 0..=nodes_total as usize)
            .prop_map(move |states| {
                let jobs: BTreeMap<JobId, JobInfo> = states
                    .into_iter()
                    .map(|(id, state)| (JobId(id), JobInfo::new(state)))
                    .collect();
                NodeStateSnapshot {
                    jobs,
                    summary: DagSummary {
                        timestamp: 1_700_000_000,
                        dag_status: Some(DagStatus::Submitted),
                        nodes_total,
                    },
                }
            })
    })
}

fn transfer_state_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("done".to_string()),
        Just("acquired".to_string()),
        Just("failed".to_string()),
        Just("new".to_string()),
    ]
}

fn transfer_snapshot_strategy() -> impl Strategy<Value = TransferSnapshot> {
    proptest::collection::vec((1u32..40, transfer_state_strategy()), 0..30).prop_map(|docs| {
        let documents = docs
            .into_iter()
            .enumerate()
            .map(|(i, (job, state))| TransferDocument {
                doc_id: format!("doc-{i}"),
                job_id: JobId(job),
                state,
            })
            .collect();
        TransferSnapshot { documents }
    })
}

proptest! {
    /// For any NodesTotal = N, the filled snapshot has exactly N entries,
    /// ids 1..=N, each with a defined state.
    #[test]
    fn fill_produces_exactly_nodes_total_entries(snapshot in snapshot_strategy()) {
        let nodes_total = snapshot.summary.nodes_total;
        let filled = fill_missing_jobs(snapshot, JobState::Unsubmitted);
        prop_assert_eq!(filled.jobs.len() as u32, nodes_total);
        for (expected, actual) in (1..=nodes_total).zip(filled.jobs.keys()) {
            prop_assert_eq!(JobId(expected), *actual);
        }
    }

    /// A transferring job becomes transferred iff it has at least one
    /// recorded document and every recorded state is "done".
    #[test]
    fn transfer_upgrade_law(
        snapshot in snapshot_strategy(),
        transfers in transfer_snapshot_strategy(),
    ) {
        let before = snapshot.clone();
        let reconciled = reconcile_transfers(snapshot, &transfers);

        for (job_id, info) in &before.jobs {
            let after = &reconciled.snapshot.jobs[job_id];
            if info.state != JobState::Transferring {
                // Never demotes, never touches other states.
                prop_assert_eq!(after.state, info.state);
                continue;
            }
            let states: Vec<&str> = transfers
                .documents
                .iter()
                .filter(|d| d.job_id == *job_id)
                .map(|d| d.state.as_str())
                .collect();
            let expected = if !states.is_empty() && states.iter().all(|s| *s == "done") {
                JobState::Transferred
            } else {
                JobState::Transferring
            };
            prop_assert_eq!(after.state, expected);
        }
    }

    /// Re-applying transfer reconciliation to an already-reconciled
    /// snapshot changes nothing.
    #[test]
    fn transfer_reconciliation_is_idempotent(
        snapshot in snapshot_strategy(),
        transfers in transfer_snapshot_strategy(),
    ) {
        let once = reconcile_transfers(snapshot, &transfers);
        let twice = reconcile_transfers(once.snapshot.clone(), &transfers);
        prop_assert_eq!(once.snapshot, twice.snapshot);
    }

    /// A failed job's attached error equals the detail at the numerically
    /// highest retry key; everything else keeps its error unset.
    #[test]
    fn error_attachment_law(
        snapshot in snapshot_strategy(),
        retries in proptest::collection::btree_map(0u32..50, 0i64..1000, 1..8),
        target in 1u32..40,
    ) {
        let mut reports = BTreeMap::new();
        reports.insert(
            JobId(target),
            retries
                .iter()
                .map(|(retry, detail)| (*retry, serde_json::json!(detail)))
                .collect::<BTreeMap<_, _>>(),
        );
        let errors = ErrorSnapshot { reports };

        let before = snapshot.clone();
        let attached = attach_errors(snapshot, &errors);

        let highest = retries.iter().next_back().map(|(_, d)| serde_json::json!(d));
        for (job_id, info) in &before.jobs {
            let after = &attached.jobs[job_id];
            if info.state == JobState::Failed && *job_id == JobId(target) {
                prop_assert_eq!(&after.error, &highest);
            } else {
                prop_assert_eq!(&after.error, &None);
            }
        }
    }

    /// The full reconciliation pipeline is idempotent end to end.
    #[test]
    fn pipeline_is_idempotent(
        snapshot in snapshot_strategy(),
        transfers in transfer_snapshot_strategy(),
    ) {
        let errors = ErrorSnapshot::default();

        let apply = |s: NodeStateSnapshot| {
            let filled = fill_missing_jobs(s, JobState::Unsubmitted);
            let reconciled = reconcile_transfers(filled, &transfers);
            attach_errors(reconciled.snapshot, &errors)
        };

        let once = apply(snapshot);
        let twice = apply(once.clone());
        prop_assert_eq!(once, twice);
    }
}

//! # System Constants
//!
//! Status vocabularies, status groups and snapshot artifact names that define
//! the operational boundaries of the status aggregation core. The string
//! values are wire-compatible with the task database and the scheduler-side
//! snapshot files this core consumes.

/// Task status codes as recorded in the task database.
pub mod db_status {
    pub const NEW: &str = "NEW";
    pub const HOLDING: &str = "HOLDING";
    pub const UPLOADED: &str = "UPLOADED";
    pub const QUEUED: &str = "QUEUED";
    pub const SUBMITTED: &str = "SUBMITTED";
    pub const SUBMITFAILED: &str = "SUBMITFAILED";
    pub const KILLED: &str = "KILLED";
    pub const KILLFAILED: &str = "KILLFAILED";
    pub const RESUBMITFAILED: &str = "RESUBMITFAILED";
    pub const FAILED: &str = "FAILED";
    pub const COMPLETED: &str = "COMPLETED";
    pub const UNKNOWN: &str = "UNKNOWN";
}

/// Commands a client may have queued against a task.
pub mod commands {
    pub const KILL: &str = "KILL";
    pub const RESUBMIT: &str = "RESUBMIT";
}

/// Status groups used by the aggregator's control flow.
pub mod status_groups {
    use super::{commands, db_status};

    /// Statuses for which no job-level state exists yet (or anymore) and a
    /// database-only answer is returned when no command is pending.
    pub const DB_ONLY_STATUSES: &[&str] = &[
        db_status::NEW,
        db_status::HOLDING,
        db_status::UPLOADED,
        db_status::SUBMITFAILED,
        db_status::KILLFAILED,
        db_status::RESUBMITFAILED,
        db_status::FAILED,
    ];

    /// Post-terminal statuses for which the database value wins over the
    /// DAG-code mapping when building the final result.
    pub const DB_PREFERRED_STATUSES: &[&str] = &[
        db_status::QUEUED,
        db_status::KILLED,
        db_status::KILLFAILED,
        db_status::RESUBMITFAILED,
        db_status::FAILED,
    ];

    /// Commands that force job-level retrieval even for a DB-only status.
    pub const PENDING_COMMANDS: &[&str] = &[commands::KILL, commands::RESUBMIT];

    pub fn is_db_only(status: &str) -> bool {
        DB_ONLY_STATUSES.contains(&status)
    }

    pub fn is_db_preferred(status: &str) -> bool {
        DB_PREFERRED_STATUSES.contains(&status)
    }

    pub fn is_pending_command(command: &str) -> bool {
        PENDING_COMMANDS.contains(&command)
    }
}

/// Names of the snapshot files published in a task's remote working
/// directory by the job orchestrator and the post-job.
pub mod snapshot_files {
    pub const NODE_STATE: &str = "node_state";
    pub const TRANSFER_STATUS: &str = "aso_status";
    pub const ERROR_REPORT: &str = "error_report";
}

/// Terminal state a transfer document must reach for the owning job to be
/// upgraded from `transferring` to `transferred`.
pub const TRANSFER_DONE: &str = "done";

/// Retrieval-failure message used when a task has no working-directory URL.
pub const MISSING_WEBDIR_MSG: &str = "missing webdir info";

/// Numeric publication-state codes and their labels, as stored per output
/// file. Code 5 is the already-reported terminal code and is excluded from
/// summaries.
pub const PUBLICATION_STATES: &[(i16, &str)] = &[
    (0, "NEW"),
    (1, "ACQUIRED"),
    (2, "FAILED"),
    (3, "DONE"),
    (4, "RETRY"),
    (5, "NOT_REQUIRED"),
];

/// Publication-state code excluded from summaries (already reported).
pub const PUBLICATION_ALREADY_REPORTED: i16 = 5;

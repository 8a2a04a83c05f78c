//! # Publication Status
//!
//! Summarizes the per-file publication state distribution of a task. The
//! store returns `(numeric state, count)` rows; they are grouped by the
//! fixed numeric-to-label table, lower-cased, excluding the already-reported
//! terminal code.

use std::collections::BTreeMap;

use serde::ser::{Serialize, SerializeMap, Serializer};
use tracing::warn;

use crate::constants::{PUBLICATION_ALREADY_REPORTED, PUBLICATION_STATES};
use crate::error::StatusError;
use crate::store::TaskMetadataStore;

/// Publication summary attached to the status document.
///
/// Serializes to the wire shapes clients expect: `{"disabled": []}` when
/// publication is off for the task, the per-label count map when available,
/// and `{}` when no summary applies (no finished jobs yet, or the query
/// could not be answered).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublicationSummary {
    Disabled,
    Counts(BTreeMap<String, i64>),
    NotAvailable,
}

impl Serialize for PublicationSummary {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Disabled => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("disabled", &Vec::<String>::new())?;
                map.end()
            }
            Self::Counts(counts) => {
                let mut map = serializer.serialize_map(Some(counts.len()))?;
                for (label, count) in counts {
                    map.serialize_entry(label, count)?;
                }
                map.end()
            }
            Self::NotAvailable => serializer.serialize_map(Some(0))?.end(),
        }
    }
}

/// Label for a numeric publication state code.
pub fn label_for_state(code: i16) -> Option<&'static str> {
    PUBLICATION_STATES
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, label)| *label)
}

/// Query and group the publication state distribution for a task. The
/// caller checks the task's publication flag first; this never reports an
/// error for a disabled task, only counts for an enabled one.
pub async fn publication_status(
    store: &dyn TaskMetadataStore,
    task_name: &str,
    username: &str,
) -> Result<PublicationSummary, StatusError> {
    let rows = store.publication_state_counts(task_name, username).await?;

    let mut counts: BTreeMap<String, i64> = BTreeMap::new();
    for (code, count) in rows {
        if code == PUBLICATION_ALREADY_REPORTED {
            continue;
        }
        match label_for_state(code) {
            Some(label) => {
                *counts.entry(label.to_lowercase()).or_insert(0) += count;
            }
            None => {
                warn!(task = task_name, code, "unknown publication state code");
            }
        }
    }

    Ok(PublicationSummary::Counts(counts))
}

//! Merge local history with the CI system's authoritative run list.
//!
//! The remote list wins for any shared commit sha. Local fields only fill in
//! what the remote record lacks (`action`, `itemId`), since runs started by
//! other actors have no editor-supplied description. Unmatched remote runs
//! are appended. The result is sorted newest first by `completedAt`,
//! falling back to `startedAt`.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use pressroom_core::{DeploymentRecord, HistoryStore};

use crate::error::{RemoteError, SyncError};
use crate::remote::RemoteHistory;

/// How fresh the remote half of a [`HistoryView`] is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RemoteState {
    /// Remote history was fetched and merged.
    Fresh,
    /// The CI system could not be reached; local history only.
    Unavailable { reason: String },
    /// The integration has no endpoint or credentials; local history only.
    NotConfigured { reason: String },
}

impl RemoteState {
    pub fn from_error(err: &RemoteError) -> Self {
        match err {
            RemoteError::NotConfigured(reason) => RemoteState::NotConfigured {
                reason: reason.clone(),
            },
            other => RemoteState::Unavailable {
                reason: other.to_string(),
            },
        }
    }

    pub fn is_fresh(&self) -> bool {
        matches!(self, RemoteState::Fresh)
    }
}

/// Reconciled, newest-first history plus where it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryView {
    pub records: Vec<DeploymentRecord>,
    pub remote: RemoteState,
}

// ---------------------------------------------------------------------------
// Merge
// ---------------------------------------------------------------------------

/// Merge `local` with `remote`. Pure.
///
/// When the remote list holds several runs for one sha, local records
/// consume them in order; leftovers are appended as unmatched.
pub fn merge(
    local: Vec<DeploymentRecord>,
    remote: Vec<DeploymentRecord>,
) -> Vec<DeploymentRecord> {
    let mut slots: Vec<Option<DeploymentRecord>> = remote.into_iter().map(Some).collect();
    let mut by_sha: HashMap<String, Vec<usize>> = HashMap::new();
    for (idx, record) in slots.iter().enumerate() {
        if let Some(record) = record {
            by_sha
                .entry(record.commit_sha.as_str().to_string())
                .or_default()
                .push(idx);
        }
    }
    // Pop from the front of each bucket.
    for bucket in by_sha.values_mut() {
        bucket.reverse();
    }

    let mut merged = Vec::with_capacity(local.len() + slots.len());
    for local_record in local {
        let matched = by_sha
            .get_mut(local_record.commit_sha.as_str())
            .and_then(|bucket| bucket.pop())
            .and_then(|idx| slots[idx].take());
        match matched {
            Some(mut remote_record) => {
                if remote_record.action.trim().is_empty() {
                    remote_record.action = local_record.action;
                }
                if remote_record.item_id.is_none() {
                    remote_record.item_id = local_record.item_id;
                }
                merged.push(remote_record);
            }
            None => merged.push(local_record),
        }
    }
    merged.extend(slots.into_iter().flatten());

    sort_newest_first(&mut merged);
    merged
}

/// Stable sort, newest `completedAt` (else `startedAt`) first.
pub fn sort_newest_first(records: &mut [DeploymentRecord]) {
    records.sort_by(|a, b| b.sort_key().cmp(&a.sort_key()));
}

/// Combine local history with the outcome of a remote fetch.
///
/// A remote failure degrades to local history only; it is never an error.
pub fn reconcile(
    local: Vec<DeploymentRecord>,
    remote: Result<Vec<DeploymentRecord>, RemoteError>,
) -> HistoryView {
    match remote {
        Ok(remote) => HistoryView {
            records: merge(local, remote),
            remote: RemoteState::Fresh,
        },
        Err(err) => {
            let mut records = local;
            sort_newest_first(&mut records);
            HistoryView {
                records,
                remote: RemoteState::from_error(&err),
            }
        }
    }
}

/// Load local history and merge it with a fresh remote fetch.
///
/// Only a store failure is an error; remote failures are reported through
/// [`HistoryView::remote`].
pub fn get_history(
    store: &HistoryStore,
    remote: &dyn RemoteHistory,
) -> Result<HistoryView, SyncError> {
    let local = store.load()?;
    let fetched = remote.history();
    if let Err(err) = &fetched {
        if err.is_not_configured() {
            tracing::debug!(error = %err, "remote history not configured; using local history");
        } else {
            tracing::warn!(error = %err, "remote history unavailable; using local history");
        }
    }
    Ok(reconcile(local, fetched))
}

//! # pressroom-sync
//!
//! Read-only access to the CI system and reconciliation with local history.
//!
//! Call [`remote::HttpRemote`] (or any [`RemoteHistory`]) for per-commit run
//! status and the authoritative run list, then [`reconcile::get_history`] to
//! merge that list with the local history store into one newest-first view.

pub mod error;
pub mod reconcile;
pub mod remote;

pub use error::{RemoteError, SyncError};
pub use reconcile::{get_history, merge, reconcile, HistoryView, RemoteState};
pub use remote::{HttpRemote, RemoteHistory, RemoteStatus};

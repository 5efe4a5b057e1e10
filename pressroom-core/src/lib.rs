//! Pressroom core library: deployment records, local history, settings, errors.
//!
//! Public API surface:
//! - [`types`]: [`CommitSha`], [`DeploymentStatus`], [`DeploymentRecord`]
//! - [`error`]: [`StoreError`], [`RecordError`]
//! - [`history`]: capped, persisted list of settled deployments
//! - [`settings`]: load / save / validate `config.yaml`

pub mod error;
pub mod history;
pub mod settings;
pub mod types;

pub use error::{RecordError, StoreError};
pub use history::HistoryStore;
pub use settings::{BannerSettings, RemoteSettings, Settings};
pub use types::{CommitSha, DeploymentRecord, DeploymentStatus, Transition};

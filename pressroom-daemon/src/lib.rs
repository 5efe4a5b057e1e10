//! Pressroom daemon: deployment tracker, pollers, banner presenter, and the
//! Unix socket server the CLI talks to.

mod error;
pub mod events;
pub mod paths;
pub mod poller;
pub mod presenter;
pub mod protocol;
mod runtime;
pub mod service;
pub mod tracker;

pub use error::DaemonError;
pub use events::TrackerEvent;
pub use presenter::Presenter;
pub use protocol::{
    request_configure, request_history, request_status, request_stop, request_track,
    send_request, watch, DaemonRequest, DaemonResponse,
};
pub use runtime::{run, run_with, start_blocking};
pub use service::{DeploymentService, ServiceSnapshot};
pub use tracker::{ActiveDeployment, TrackOutcome, TrackingId};

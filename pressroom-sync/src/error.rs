//! Error types for pressroom-sync.

use thiserror::Error;

use pressroom_core::StoreError;

/// Failures talking to the CI status proxy.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    /// No endpoint configured, or the proxy lacks its CI credentials.
    #[error("CI integration not configured: {0}")]
    NotConfigured(String),

    /// Connection, DNS, TLS, or timeout failure.
    #[error("CI request to {url} failed: {message}")]
    Transport { url: String, message: String },

    /// Non-2xx answer from the proxy.
    #[error("CI proxy answered {code} for {url}: {body}")]
    Status { url: String, code: u16, body: String },

    /// 2xx answer whose body is not the expected JSON.
    #[error("could not decode CI response from {url}: {message}")]
    Decode { url: String, message: String },
}

impl RemoteError {
    pub fn is_not_configured(&self) -> bool {
        matches!(self, RemoteError::NotConfigured(_))
    }
}

/// All errors that can arise from reconciliation.
#[derive(Debug, Error)]
pub enum SyncError {
    /// An error from the local history store.
    #[error("history store error: {0}")]
    Store(#[from] StoreError),

    /// An error from the CI status proxy.
    #[error("remote history error: {0}")]
    Remote(#[from] RemoteError),
}

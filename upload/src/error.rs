use thiserror::Error;

use tracekit_proto::SerialisationError;
use tracekit_store::PersistenceError;

/// The *Network* error taxonomy (§7): covers everything C7 can observe talking to the
/// collector. Transport and `HttpStatus` with a 5xx code are transient and retried with
/// exponential back-off; the rest are surfaced as-is.
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("unexpected HTTP status {code}")]
    HttpStatus { code: u16 },
    #[error("authentication required, and refresh did not recover it")]
    AuthRequired,
    #[error("server rejected the request: {reason}")]
    ServerRejected { reason: String },
}

impl NetworkError {
    /// Whether this failure is worth retrying the current attempt for (§7: "Transient ones
    /// retried with exponential back-off up to a bounded count").
    pub fn is_transient(&self) -> bool {
        match self {
            NetworkError::Transport(e) => e.is_timeout() || e.is_connect(),
            NetworkError::HttpStatus { code } => *code >= 500,
            NetworkError::AuthRequired | NetworkError::ServerRejected { .. } => false,
        }
    }
}

/// Errors from the authentication adapter (C8).
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("this authenticator does not support token refresh")]
    NotImplemented,
    #[error("no refresh token is stored")]
    NoRefreshToken,
    #[error(transparent)]
    Network(#[from] NetworkError),
}

/// The top-level error returned by [`crate::uploader::Uploader`].
#[derive(Debug, Error)]
pub enum UploadError {
    #[error(transparent)]
    Network(#[from] NetworkError),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Serialisation(#[from] SerialisationError),
    #[error(transparent)]
    Store(#[from] PersistenceError),
    #[error("an upload for measurement {0} is already in flight")]
    AlreadyUploading(u64),
    #[error("upload cancelled")]
    Cancelled,
    #[error("reading sensor files for upload: {0}")]
    Io(#[from] std::io::Error),
    #[error("payload build worker panicked")]
    WorkerPanicked,
}

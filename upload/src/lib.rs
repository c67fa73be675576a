//! Resumable upload (C7) and the authentication adapter (C8): turns a finished Measurement
//! into a transferred, synchronized one against a remote collector.

mod auth;
mod error;
mod metadata;
mod uploader;

pub use auth::{Authenticator, MockAuthenticator, OAuthPkceAuthenticator, StaticAuthenticator};
pub use error::{AuthError, NetworkError, UploadError};
pub use metadata::UploadMetadata;
pub use uploader::{UploadOutcome, Uploader};

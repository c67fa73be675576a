//! The authentication adapter (C8): three variants selectable by the host, dispatched
//! through one enum rather than a trait object. Only `authenticate()` is consumed by
//! [`crate::uploader::Uploader`]; `logout`/`delete` are exposed for the host to call directly
//! on the OAuth variant.

use std::sync::Mutex;

use reqwest::Client;
use tracing::{debug, instrument};

use crate::error::AuthError;

/// A pre-obtained bearer token supplied by the host. Cannot refresh itself; the host is
/// responsible for replacing it (by constructing a new `Authenticator::Static`) if it
/// expires.
#[derive(Debug)]
pub struct StaticAuthenticator {
    token: String,
}

impl StaticAuthenticator {
    pub fn new(token: impl Into<String>) -> Self {
        StaticAuthenticator { token: token.into() }
    }
}

/// OAuth2/OIDC with PKCE: holds a stored refresh token and exchanges it for an access token
/// on demand.
#[derive(Debug)]
pub struct OAuthPkceAuthenticator {
    client: Client,
    token_endpoint: String,
    client_id: String,
    refresh_token: Mutex<Option<String>>,
    access_token: Mutex<Option<String>>,
    account_endpoint: Option<String>,
}

impl OAuthPkceAuthenticator {
    pub fn new(token_endpoint: impl Into<String>, client_id: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        OAuthPkceAuthenticator {
            client: Client::new(),
            token_endpoint: token_endpoint.into(),
            client_id: client_id.into(),
            refresh_token: Mutex::new(Some(refresh_token.into())),
            access_token: Mutex::new(None),
            account_endpoint: None,
        }
    }

    pub fn with_account_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.account_endpoint = Some(endpoint.into());
        self
    }

    #[instrument(skip(self))]
    async fn exchange_refresh_token(&self) -> Result<String, AuthError> {
        let refresh_token = self.refresh_token.lock().expect("poisoned").clone().ok_or(AuthError::NoRefreshToken)?;

        #[derive(serde::Deserialize)]
        struct TokenResponse {
            access_token: String,
            refresh_token: Option<String>,
        }

        let response = self
            .client
            .post(&self.token_endpoint)
            .form(&[
                ("grant_type", "refresh_token"),
                ("client_id", self.client_id.as_str()),
                ("refresh_token", refresh_token.as_str()),
            ])
            .send()
            .await
            .map_err(crate::error::NetworkError::Transport)?;

        if !response.status().is_success() {
            return Err(AuthError::Network(crate::error::NetworkError::HttpStatus { code: response.status().as_u16() }));
        }

        let body: TokenResponse = response.json().await.map_err(crate::error::NetworkError::Transport)?;
        if let Some(rt) = body.refresh_token {
            *self.refresh_token.lock().expect("poisoned") = Some(rt);
        }
        *self.access_token.lock().expect("poisoned") = Some(body.access_token.clone());
        Ok(body.access_token)
    }

    /// Drops the stored access token, forcing the next `authenticate()` to refresh.
    pub fn logout(&self) {
        debug!("logging out, dropping cached access token");
        *self.access_token.lock().expect("poisoned") = None;
    }

    /// Issues an HTTP DELETE against the configured account endpoint, then forgets the
    /// refresh token entirely.
    #[instrument(skip(self))]
    pub async fn delete(&self) -> Result<(), AuthError> {
        if let Some(endpoint) = &self.account_endpoint {
            let token = self.exchange_refresh_token().await?;
            let response = self
                .client
                .delete(endpoint)
                .bearer_auth(token)
                .send()
                .await
                .map_err(crate::error::NetworkError::Transport)?;
            if !response.status().is_success() {
                return Err(AuthError::Network(crate::error::NetworkError::HttpStatus { code: response.status().as_u16() }));
            }
        }
        *self.refresh_token.lock().expect("poisoned") = None;
        *self.access_token.lock().expect("poisoned") = None;
        Ok(())
    }
}

/// Returns a fixed token, for tests.
#[derive(Debug, Clone)]
pub struct MockAuthenticator {
    token: String,
}

impl MockAuthenticator {
    pub fn new(token: impl Into<String>) -> Self {
        MockAuthenticator { token: token.into() }
    }
}

/// Selects among the three authentication strategies without paying for a trait object.
#[derive(Debug)]
pub enum Authenticator {
    Static(StaticAuthenticator),
    OAuthPkce(OAuthPkceAuthenticator),
    Mock(MockAuthenticator),
}

impl Authenticator {
    /// Returns the current bearer token, acquiring or reusing a cached one as appropriate.
    #[instrument(skip(self))]
    pub async fn authenticate(&self) -> Result<String, AuthError> {
        match self {
            Authenticator::Static(s) => Ok(s.token.clone()),
            Authenticator::OAuthPkce(o) => {
                if let Some(cached) = o.access_token.lock().expect("poisoned").clone() {
                    return Ok(cached);
                }
                o.exchange_refresh_token().await
            }
            Authenticator::Mock(m) => Ok(m.token.clone()),
        }
    }

    /// Forces re-acquisition of the token (called by the uploader after a 401).
    #[instrument(skip(self))]
    pub async fn refresh(&self) -> Result<String, AuthError> {
        match self {
            Authenticator::Static(_) => Err(AuthError::NotImplemented),
            Authenticator::OAuthPkce(o) => o.exchange_refresh_token().await,
            Authenticator::Mock(m) => Ok(m.token.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_authenticator_returns_its_token() {
        let auth = Authenticator::Static(StaticAuthenticator::new("abc123"));
        assert_eq!(auth.authenticate().await.unwrap(), "abc123");
    }

    #[tokio::test]
    async fn static_authenticator_refresh_is_not_implemented() {
        let auth = Authenticator::Static(StaticAuthenticator::new("abc123"));
        assert!(matches!(auth.refresh().await, Err(AuthError::NotImplemented)));
    }

    #[tokio::test]
    async fn mock_authenticator_returns_fixed_token() {
        let auth = Authenticator::Mock(MockAuthenticator::new("test-token"));
        assert_eq!(auth.authenticate().await.unwrap(), "test-token");
        assert_eq!(auth.refresh().await.unwrap(), "test-token");
    }
}

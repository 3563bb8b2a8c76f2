//! Authentication collaborator.
//!
//! The server does not verify credentials itself. The session cookie from
//! the WebSocket handshake is forwarded to an external auth service which
//! confirms the session is active and resolves the player's display name.

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

/// Authentication errors. Every variant ends up as a session rejection.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The auth service rejected the cookie.
    #[error("user unauthenticated")]
    Unauthenticated,
    /// The auth service could not be reached.
    #[error("auth service unreachable: {0}")]
    Unreachable(#[from] reqwest::Error),
}

/// Narrow interface to the authentication collaborator.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Verify the session cookie and return the player's display name.
    async fn authenticate(&self, cookie: &str) -> Result<String, AuthError>;
}

/// HTTP implementation calling the external auth service: one request to
/// confirm the session is active, one to fetch the username.
pub struct HttpAuthenticator {
    client: reqwest::Client,
    verify_session_url: String,
    get_username_url: String,
}

impl HttpAuthenticator {
    /// Create an auth client for the given endpoints.
    pub fn new(verify_session_url: impl Into<String>, get_username_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            verify_session_url: verify_session_url.into(),
            get_username_url: get_username_url.into(),
        }
    }

    fn cookie_header(cookie: &str) -> String {
        format!("SESSION={cookie}")
    }
}

#[async_trait]
impl Authenticator for HttpAuthenticator {
    async fn authenticate(&self, cookie: &str) -> Result<String, AuthError> {
        let verify = self
            .client
            .get(&self.verify_session_url)
            .header(reqwest::header::COOKIE, Self::cookie_header(cookie))
            .send()
            .await?;

        if !verify.status().is_success() {
            debug!(status = %verify.status(), "session verification refused");
            return Err(AuthError::Unauthenticated);
        }

        let username = self
            .client
            .get(&self.get_username_url)
            .header(reqwest::header::COOKIE, Self::cookie_header(cookie))
            .send()
            .await?
            .error_for_status()
            .map_err(|_| AuthError::Unauthenticated)?
            .text()
            .await?;

        Ok(username)
    }
}

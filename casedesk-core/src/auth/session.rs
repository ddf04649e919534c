//! Login, logout and token validation.
//!
//! These are mutations of the user record, not guard states: login writes
//! `token` + `timeout` with `update`, logout removes both with `unset`.

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde_json::json;

use super::guard::Guard;
use super::level::Level;
use super::user::{AuthView, User, UserDirectory};
use crate::document::doc;
use crate::error::AuthError;

/// Default token lifetime in days.
pub const DEFAULT_TOKEN_TTL_DAYS: i64 = 14;

/// A freshly issued token.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub token: String,
    /// Epoch seconds after which the token is rejected.
    pub timeout: i64,
    pub user: User,
}

impl Session {
    pub fn view(&self) -> AuthView {
        AuthView {
            token: self.token.clone(),
            user: self.user.view(),
        }
    }
}

/// Issues and revokes tokens.
#[derive(Debug, Clone)]
pub struct Sessions {
    users: UserDirectory,
    ttl: Duration,
}

impl Sessions {
    /// Sessions with the default two week token lifetime.
    pub fn new(users: UserDirectory) -> Self {
        Self::with_ttl(users, Duration::days(DEFAULT_TOKEN_TTL_DAYS))
    }

    pub fn with_ttl(users: UserDirectory, ttl: Duration) -> Self {
        Self { users, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Verifies the credentials and stores a new token on the user.
    pub async fn login(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        self.login_at(email, password, Utc::now()).await
    }

    pub async fn login_at(
        &self,
        email: &str,
        password: &str,
        now: DateTime<Utc>,
    ) -> Result<Session, AuthError> {
        let user = self
            .users
            .find_by_credentials(email, password)
            .await?
            .ok_or_else(|| {
                tracing::debug!("Failed login for {}", email);
                AuthError::InvalidCredentials
            })?;

        let timeout = now
            .checked_add_signed(self.ttl)
            .ok_or(AuthError::TokenLifetime(self.ttl.num_seconds()))?
            .timestamp();
        let token = generate_token();

        let updated = self
            .users
            .provider()
            .update(&doc(json!({
                "id": user.id.to_external(),
                "token": &token,
                "timeout": timeout,
            })))
            .await?;
        let user = User::from_document(&updated)?;

        tracing::info!("{} logged in", user.email);

        Ok(Session {
            token,
            timeout,
            user,
        })
    }

    /// Removes the token and its timeout from the owning user.
    ///
    /// Expired tokens may still be logged out.
    pub async fn logout(&self, token: Option<&str>) -> Result<User, AuthError> {
        let token = match token.map(str::trim) {
            Some(t) if !t.is_empty() => t,
            _ => return Err(AuthError::NoToken),
        };

        let user = self
            .users
            .find_by_token(token)
            .await?
            .ok_or(AuthError::InvalidToken)?;

        let updated = self
            .users
            .provider()
            .unset(&doc(json!({
                "id": user.id.to_external(),
                "token": "",
                "timeout": "",
            })))
            .await?;
        let user = User::from_document(&updated)?;

        tracing::info!("{} logged out", user.email);
        Ok(user)
    }

    /// Confirms a token is usable and returns it with its user.
    pub async fn validate(&self, token: Option<&str>) -> Result<AuthView, AuthError> {
        let authorized = Guard::new(self.users.clone(), Level::Viewer)
            .authorize(token)
            .await?;
        Ok(AuthView {
            token: authorized.token,
            user: authorized.user.view(),
        })
    }
}

/// Generates a secure random token.
///
/// Returns 32 random bytes encoded as base64url (no padding).
fn generate_token() -> String {
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};

    let mut bytes = [0u8; 32];
    rand::rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

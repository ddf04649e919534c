//! Token authorization guard.
//!
//! A [`Guard`] is built once per operation with the level that operation
//! requires. Every call re-runs the full chain
//! `token present -> token known -> not expired -> level high enough`
//! against the user collection; nothing is cached between calls because
//! logout or expiry can invalidate a token at any time.

use chrono::Utc;
use std::future::Future;

use super::level::Level;
use super::user::{User, UserDirectory};
use crate::error::AuthError;

/// Proof that a token passed the guard, carrying its user.
#[derive(Debug, Clone, PartialEq)]
pub struct Authorized {
    pub user: User,
    pub token: String,
}

/// Authorization guard for one required level.
#[derive(Debug, Clone)]
pub struct Guard {
    users: UserDirectory,
    required: Level,
}

impl Guard {
    pub fn new(users: UserDirectory, required: Level) -> Self {
        Self { users, required }
    }

    pub fn required(&self) -> Level {
        self.required
    }

    /// Checks `token` against the current time.
    pub async fn authorize(&self, token: Option<&str>) -> Result<Authorized, AuthError> {
        self.authorize_at(token, Utc::now().timestamp()).await
    }

    /// Checks `token` as of `now` (epoch seconds).
    pub async fn authorize_at(
        &self,
        token: Option<&str>,
        now: i64,
    ) -> Result<Authorized, AuthError> {
        let token = match token.map(str::trim) {
            Some(t) if !t.is_empty() => t,
            _ => return Err(AuthError::NoToken),
        };

        let user = self
            .users
            .find_by_token(token)
            .await?
            .ok_or(AuthError::InvalidToken)?;

        // A record with a token but no timeout is treated as expired.
        match user.timeout {
            Some(timeout) if timeout > now => {}
            _ => {
                tracing::debug!("Rejected expired token of {}", user.email);
                return Err(AuthError::ExpiredToken);
            }
        }

        if !user.level.satisfies(self.required) {
            tracing::warn!(
                "{} ({}) denied an operation requiring {}",
                user.email,
                user.level,
                self.required
            );
            return Err(AuthError::InsufficientLevel {
                required: self.required,
                actual: user.level,
            });
        }

        Ok(Authorized {
            user,
            token: token.to_string(),
        })
    }

    /// Runs `op` only if `token` is authorized.
    pub async fn run<T, F, Fut>(&self, token: Option<&str>, op: F) -> Result<T, AuthError>
    where
        F: FnOnce(Authorized) -> Fut,
        Fut: Future<Output = Result<T, AuthError>>,
    {
        let authorized = self.authorize(token).await?;
        op(authorized).await
    }
}

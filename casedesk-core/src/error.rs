//! Error types for providers and authorization.

use thiserror::Error;

use crate::document_id::DocumentIdError;

/// Errors raised by a [`DocumentProvider`](crate::DocumentProvider).
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Document must carry an `id` to be updated, deleted or unset")]
    MissingIdentity,

    #[error("No document with id {0}")]
    NotFound(String),

    #[error("Malformed document identity: {0}")]
    MalformedIdentity(String),

    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    #[error("Invalid name '{0}': only ASCII letters, digits, '_' and '-' are allowed")]
    InvalidName(String),

    #[error("Document JSON could not be encoded or decoded: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Storage error: {0}")]
    Storage(#[source] sqlx::Error),

    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

impl From<DocumentIdError> for ProviderError {
    fn from(e: DocumentIdError) -> Self {
        ProviderError::MalformedIdentity(e.to_string())
    }
}

impl From<sqlx::Error> for ProviderError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                ProviderError::DuplicateKey(db.message().to_string())
            }
            _ => ProviderError::Storage(e),
        }
    }
}

/// Errors raised by the authorization guard and session operations.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("No token found.")]
    NoToken,

    #[error("Invalid token.")]
    InvalidToken,

    #[error("Token expired.")]
    ExpiredToken,

    #[error("You are not authorized: requires {required}, have {actual}.")]
    InsufficientLevel {
        required: crate::Level,
        actual: crate::Level,
    },

    #[error("Invalid email or password.")]
    InvalidCredentials,

    #[error("Invalid user record: {0}")]
    InvalidRecord(String),

    #[error("Token lifetime of {0} seconds runs past the supported time range.")]
    TokenLifetime(i64),

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

impl AuthError {
    /// Stable snake_case kind, used in response envelopes.
    pub fn kind(&self) -> &'static str {
        match self {
            AuthError::NoToken => "no_token",
            AuthError::InvalidToken => "invalid_token",
            AuthError::ExpiredToken => "expired_token",
            AuthError::InsufficientLevel { .. } => "insufficient_level",
            AuthError::InvalidCredentials => "invalid_credentials",
            AuthError::InvalidRecord(_) => "invalid_record",
            AuthError::TokenLifetime(_) => "token_lifetime",
            AuthError::Provider(e) => e.kind(),
        }
    }
}

impl ProviderError {
    /// Stable snake_case kind, used in response envelopes.
    pub fn kind(&self) -> &'static str {
        match self {
            ProviderError::MissingIdentity => "missing_identity",
            ProviderError::NotFound(_) => "not_found",
            ProviderError::MalformedIdentity(_) => "malformed_identity",
            ProviderError::DuplicateKey(_) => "duplicate_key",
            ProviderError::InvalidName(_) => "invalid_name",
            ProviderError::Json(_) | ProviderError::Storage(_) | ProviderError::Migrate(_) => {
                "storage"
            }
        }
    }
}

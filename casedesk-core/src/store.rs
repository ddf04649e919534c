//! The store handle.
//!
//! A [`Store`] owns the SQLite connection pool for the lifetime of the
//! process. It is opened once at startup, cloned into every
//! [`DocumentProvider`] it hands out, and closed at shutdown.

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;

use crate::error::ProviderError;
use crate::provider::DocumentProvider;

/// Shared, thread-safe handle to the document store.
#[derive(Debug, Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Opens (creating if needed) the database at `path` and runs migrations.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, ProviderError> {
        let path = path.as_ref();

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| ProviderError::Storage(sqlx::Error::Io(e)))?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        tracing::info!("Opened document store at {}", path.display());

        Ok(Self { pool })
    }

    /// Returns a provider bound to one (database, collection) pair.
    pub fn provider(
        &self,
        database: &str,
        collection: &str,
    ) -> Result<DocumentProvider, ProviderError> {
        validate_name(database)?;
        validate_name(collection)?;
        Ok(DocumentProvider::new(
            self.pool.clone(),
            database.to_string(),
            collection.to_string(),
        ))
    }

    /// Closes every pooled connection.
    pub async fn close(&self) {
        self.pool.close().await;
        tracing::info!("Closed document store");
    }

    /// Returns true once [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }
}

/// Database, collection and indexed field names end up in SQL text, so
/// they are restricted to a conservative alphabet.
pub(crate) fn validate_name(name: &str) -> Result<(), ProviderError> {
    if name.is_empty()
        || name.len() > 64
        || !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(ProviderError::InvalidName(name.to_string()));
    }
    Ok(())
}

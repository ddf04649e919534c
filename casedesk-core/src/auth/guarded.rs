//! A document provider with a guard in front of every operation.

use super::guard::{Authorized, Guard};
use super::level::Level;
use super::user::UserDirectory;
use crate::document::Document;
use crate::document_id::DocumentId;
use crate::error::{AuthError, ProviderError};
use crate::provider::{DeleteOutcome, DocumentProvider, Saved};

/// Collection holding case records.
pub const CASES_COLLECTION: &str = "cases";

/// Level required by each operation of a [`GuardedCollection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectionLevels {
    pub read: Level,
    pub save: Level,
    pub unset: Level,
    pub delete: Level,
}

impl Default for CollectionLevels {
    fn default() -> Self {
        Self {
            read: Level::Viewer,
            save: Level::Regular,
            unset: Level::Regular,
            delete: Level::Admin,
        }
    }
}

/// A provider whose operations each run behind their own guard.
#[derive(Debug, Clone)]
pub struct GuardedCollection {
    provider: DocumentProvider,
    read: Guard,
    save: Guard,
    unset: Guard,
    delete: Guard,
}

impl GuardedCollection {
    pub fn new(provider: DocumentProvider, users: UserDirectory, levels: CollectionLevels) -> Self {
        Self {
            provider,
            read: Guard::new(users.clone(), levels.read),
            save: Guard::new(users.clone(), levels.save),
            unset: Guard::new(users.clone(), levels.unset),
            delete: Guard::new(users, levels.delete),
        }
    }

    pub fn provider(&self) -> &DocumentProvider {
        &self.provider
    }

    pub fn levels(&self) -> CollectionLevels {
        CollectionLevels {
            read: self.read.required(),
            save: self.save.required(),
            unset: self.unset.required(),
            delete: self.delete.required(),
        }
    }

    pub async fn read(
        &self,
        token: Option<&str>,
        filter: &Document,
    ) -> Result<Vec<Document>, AuthError> {
        self.read
            .run(token, |_| async move {
                self.provider.read(filter).await.map_err(AuthError::from)
            })
            .await
    }

    /// Looks up one document by its external identity, which is only
    /// parsed once the token has passed.
    pub async fn get(
        &self,
        token: Option<&str>,
        id: &str,
    ) -> Result<Option<Document>, AuthError> {
        self.read
            .run(token, |_| async move {
                let id = DocumentId::parse(id).map_err(ProviderError::from)?;
                Ok::<_, AuthError>(self.provider.get_by_identity(id).await?)
            })
            .await
    }

    pub async fn add_update(&self, token: Option<&str>, doc: &Document) -> Result<Saved, AuthError> {
        self.save
            .run(token, |auth: Authorized| async move {
                let saved = self.provider.add_update(doc).await?;
                tracing::debug!(
                    "{} saved {}/{}",
                    auth.user.email,
                    self.provider.collection(),
                    saved.id().map(|id| id.to_string()).unwrap_or_default()
                );
                Ok::<_, AuthError>(saved)
            })
            .await
    }

    pub async fn update(&self, token: Option<&str>, doc: &Document) -> Result<Document, AuthError> {
        self.save
            .run(token, |_| async move {
                self.provider.update(doc).await.map_err(AuthError::from)
            })
            .await
    }

    pub async fn unset(&self, token: Option<&str>, doc: &Document) -> Result<Document, AuthError> {
        self.unset
            .run(token, |_| async move {
                self.provider.unset(doc).await.map_err(AuthError::from)
            })
            .await
    }

    pub async fn delete(
        &self,
        token: Option<&str>,
        doc: &Document,
    ) -> Result<DeleteOutcome, AuthError> {
        self.delete
            .run(token, |_| async move {
                self.provider.delete(doc).await.map_err(AuthError::from)
            })
            .await
    }
}

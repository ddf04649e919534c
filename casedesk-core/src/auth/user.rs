//! User records and the user directory.
//!
//! A user is a plain document in the `users` collection:
//!
//! ```text
//! {
//!   "id": "<external id>",
//!   "name": "Ann",
//!   "email": "a@x.com",          // unique, stored lowercase
//!   "password": "<sha256 hex>",  // hashed by the caller
//!   "level": "admin",
//!   "token": "<opaque>",         // present while logged in
//!   "timeout": 1700000000        // epoch seconds
//! }
//! ```

use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::{json, Number, Value};

use super::level::Level;
use crate::document::{doc, Document};
use crate::document_id::DocumentId;
use crate::error::{AuthError, ProviderError};
use crate::provider::{DeleteOutcome, DocumentProvider};
use crate::store::Store;

/// Collection holding user records.
pub const USERS_COLLECTION: &str = "users";

/// A user record as stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: DocumentId,
    pub name: String,
    pub email: String,
    pub password: String,
    pub level: Level,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Epoch seconds; fractional values are rounded up.
    #[serde(
        default,
        deserialize_with = "epoch_seconds",
        skip_serializing_if = "Option::is_none"
    )]
    pub timeout: Option<i64>,
}

fn epoch_seconds<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(n) = Option::<Number>::deserialize(deserializer)? else {
        return Ok(None);
    };
    if let Some(secs) = n.as_i64() {
        return Ok(Some(secs));
    }
    // `timeout <= now` holds for t exactly when it holds for ceil(t)
    n.as_f64()
        .filter(|f| f.is_finite())
        .map(|f| Some(f.ceil() as i64))
        .ok_or_else(|| de::Error::custom(format!("invalid epoch timestamp {}", n)))
}

impl User {
    /// Parses a user out of a provider document.
    pub fn from_document(doc: &Document) -> Result<Self, AuthError> {
        serde_json::from_value(Value::Object(doc.clone()))
            .map_err(|e| AuthError::InvalidRecord(e.to_string()))
    }

    /// Public projection: no password, no token.
    pub fn view(&self) -> UserView {
        UserView {
            id: self.id.to_external(),
            name: self.name.clone(),
            email: self.email.clone(),
            level: self.level,
        }
    }
}

/// What callers are allowed to see of a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserView {
    pub id: String,
    pub name: String,
    pub email: String,
    pub level: Level,
}

/// A token together with the user it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthView {
    pub token: String,
    pub user: UserView,
}

/// Input for [`UserDirectory::create`].
#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    /// Already hashed by the caller.
    pub password: String,
    pub level: Level,
}

impl NewUser {
    fn to_document(&self) -> Document {
        doc(json!({
            "name": self.name.trim(),
            "email": normalize_email(&self.email),
            "password": normalize_password(&self.password),
            "level": self.level,
        }))
    }
}

pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Password hashes arrive as hex, whose case carries no meaning.
pub(crate) fn normalize_password(password: &str) -> String {
    password.trim().to_lowercase()
}

/// Administrative access to user records.
#[derive(Debug, Clone)]
pub struct UserDirectory {
    users: DocumentProvider,
}

impl UserDirectory {
    /// Binds to the users collection of `database` and installs the unique
    /// email index.
    pub async fn open(store: &Store, database: &str) -> Result<Self, ProviderError> {
        let users = store.provider(database, USERS_COLLECTION)?;
        users.ensure_unique("email").await?;
        Ok(Self { users })
    }

    pub fn provider(&self) -> &DocumentProvider {
        &self.users
    }

    /// Creates a user. A taken email fails before anything is written.
    pub async fn create(&self, user: &NewUser) -> Result<DocumentId, AuthError> {
        let record = user.to_document();
        let email = normalize_email(&user.email);

        if self.find_by_email(&email).await?.is_some() {
            return Err(ProviderError::DuplicateKey(format!("email {}", email)).into());
        }

        let id = self.users.create(&record).await?;
        tracing::info!("Created user {} ({}) at level {}", email, id, user.level);
        Ok(id)
    }

    pub async fn list(&self) -> Result<Vec<User>, AuthError> {
        self.users
            .read(&Document::new())
            .await?
            .iter()
            .map(User::from_document)
            .collect()
    }

    pub async fn get(&self, id: DocumentId) -> Result<Option<User>, AuthError> {
        self.users
            .get_by_identity(id)
            .await?
            .as_ref()
            .map(User::from_document)
            .transpose()
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>, AuthError> {
        self.find_one(doc(json!({"email": normalize_email(email)})))
            .await
    }

    pub async fn find_by_token(&self, token: &str) -> Result<Option<User>, AuthError> {
        self.find_one(doc(json!({"token": token}))).await
    }

    /// Finds the user matching both credentials.
    pub(crate) async fn find_by_credentials(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Option<User>, AuthError> {
        self.find_one(doc(json!({
            "email": normalize_email(email),
            "password": normalize_password(password),
        })))
        .await
    }

    async fn find_one(&self, filter: Document) -> Result<Option<User>, AuthError> {
        self.users
            .read(&filter)
            .await?
            .first()
            .map(User::from_document)
            .transpose()
    }

    /// Partially updates a user. `doc` must carry the user's `id`.
    ///
    /// `email`, `password` and `level` are normalized and checked the same
    /// way as on create.
    pub async fn update(&self, doc: &Document) -> Result<User, AuthError> {
        let id = crate::document::require_identity(doc)?;
        let mut changes = doc.clone();

        if let Some(level) = changes.get("level") {
            let level = level
                .as_str()
                .ok_or_else(|| AuthError::InvalidRecord("level must be a string".to_string()))?
                .parse::<Level>()
                .map_err(AuthError::InvalidRecord)?;
            changes.insert("level".to_string(), json!(level));
        }

        if let Some(password) = changes.get("password").and_then(Value::as_str) {
            let password = normalize_password(password);
            changes.insert("password".to_string(), json!(password));
        }

        if let Some(email) = changes.get("email").and_then(Value::as_str) {
            let email = normalize_email(email);
            if let Some(other) = self.find_by_email(&email).await? {
                if other.id != id {
                    return Err(ProviderError::DuplicateKey(format!("email {}", email)).into());
                }
            }
            changes.insert("email".to_string(), json!(email));
        }

        // Shape errors must not reach the store
        let mut merged = self
            .users
            .get_by_identity(id)
            .await?
            .ok_or_else(|| ProviderError::NotFound(id.to_string()))?;
        merged.extend(crate::document::strip_identity(&changes));
        User::from_document(&merged)?;

        let updated = self.users.update(&changes).await?;
        User::from_document(&updated)
    }

    pub async fn delete(&self, id: DocumentId) -> Result<DeleteOutcome, AuthError> {
        let outcome = self
            .users
            .delete(&doc(json!({"id": id.to_external()})))
            .await?;
        if outcome == DeleteOutcome::Deleted {
            tracing::info!("Deleted user {}", id);
        }
        Ok(outcome)
    }
}

//! Casedesk Core Library
//!
//! Document providers over a schemaless store, and the token guard that
//! sits in front of them.

pub mod auth;
pub mod document;
pub mod document_id;
pub mod error;
pub mod filter;
pub mod provider;
pub mod store;

pub use auth::{
    AuthView, Authorized, CollectionLevels, Guard, GuardedCollection, Level, NewUser, Session,
    Sessions, User, UserDirectory, UserView, CASES_COLLECTION, DEFAULT_TOKEN_TTL_DAYS,
    USERS_COLLECTION,
};
pub use document::Document;
pub use document_id::{DocumentId, DocumentIdError};
pub use error::{AuthError, ProviderError};
pub use provider::{DeleteOutcome, DocumentProvider, Saved};
pub use store::Store;

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

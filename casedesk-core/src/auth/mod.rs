//! Token authorization over the users collection.

pub mod guard;
pub mod guarded;
pub mod level;
pub mod session;
pub mod user;

pub use guard::{Authorized, Guard};
pub use guarded::{CollectionLevels, GuardedCollection, CASES_COLLECTION};
pub use level::Level;
pub use session::{Session, Sessions, DEFAULT_TOKEN_TTL_DAYS};
pub use user::{AuthView, NewUser, User, UserDirectory, UserView, USERS_COLLECTION};

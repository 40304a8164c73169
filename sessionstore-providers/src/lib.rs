//! Sessionstore Providers - Storage backends for sessions
//!
//! Every backend implements [`SessionProvider`]. The in-memory map is always
//! available; the others sit behind cargo features of the same name.

pub mod memory;
#[cfg(feature = "mongodb")]
pub mod mongodb;
#[cfg(feature = "redis")]
pub mod redis;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use memory::MemoryProvider;
#[cfg(feature = "mongodb")]
pub use self::mongodb::MongoProvider;
#[cfg(feature = "redis")]
pub use self::redis::RedisProvider;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteProvider;

pub use sessionstore_core::{Session, SessionError, SessionProvider, SessionResult};

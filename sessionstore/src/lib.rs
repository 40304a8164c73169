//! Sessionstore - Pluggable server-side sessions
//!
//! Sessions are created and resolved through a [`SessionManager`], which
//! delegates persistence to one [`SessionProvider`] chosen at runtime:
//!
//! ```no_run
//! use sessionstore::{SessionManager, SessionStoreConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//! let config = SessionStoreConfig::from_file("sessionstore.toml")?;
//! let manager = SessionManager::from_config(&config).await?;
//!
//! let session = manager.new_session();
//! session.set("user", "alice");
//! manager.save(&session).await?;
//!
//! let token = format!("Bearer {}", session.id());
//! let loaded = manager.load_from_token(Some(&token)).await?;
//! assert_eq!(loaded.id(), session.id());
//! # Ok(())
//! # }
//! ```

pub mod factory;
pub mod manager;

pub use factory::build_provider;
pub use manager::SessionManager;

pub use sessionstore_core::*;
pub use sessionstore_providers as providers;
pub use sessionstore_providers::MemoryProvider;
#[cfg(feature = "mongodb")]
pub use sessionstore_providers::MongoProvider;
#[cfg(feature = "redis")]
pub use sessionstore_providers::RedisProvider;
#[cfg(feature = "sqlite")]
pub use sessionstore_providers::SqliteProvider;

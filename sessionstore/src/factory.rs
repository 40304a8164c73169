//! Provider construction from configuration

use sessionstore_core::{ProviderConfig, SessionError, SessionProvider, SessionResult};
use sessionstore_providers::MemoryProvider;
use std::sync::Arc;
use tracing::info;

/// Build the provider selected by `config`
///
/// Backends whose cargo feature is disabled fail with a configuration error.
pub async fn build_provider(config: &ProviderConfig) -> SessionResult<Arc<dyn SessionProvider>> {
    config.validate()?;
    info!(backend = config.backend_name(), "Building session provider");

    match config {
        ProviderConfig::Memory => Ok(Arc::new(MemoryProvider::new())),

        #[cfg(feature = "redis")]
        ProviderConfig::Redis(redis) => Ok(Arc::new(sessionstore_providers::RedisProvider::new(redis))),

        #[cfg(feature = "sqlite")]
        ProviderConfig::Sqlite(sql) => Ok(Arc::new(
            sessionstore_providers::SqliteProvider::from_config(sql).await?,
        )),

        #[cfg(feature = "mongodb")]
        ProviderConfig::Mongodb(document) => Ok(Arc::new(
            sessionstore_providers::MongoProvider::connect(document).await?,
        )),

        #[allow(unreachable_patterns)]
        other => Err(SessionError::config(
            format!("Backend {:?} is not compiled in", other.backend_name()),
            Some("provider.backend"),
        )),
    }
}

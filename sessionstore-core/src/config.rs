//! Configuration management
//!
//! Manager settings and backend connection settings, loadable from a TOML file.

use crate::error::{SessionError, SessionResult};
use crate::logging::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_TOKEN_NAME: &str = "Authorization";
pub const DEFAULT_TOKEN_PREFIX: &str = "Bearer";
pub const DEFAULT_SESSION_LIFETIME_SECS: u64 = 1200;
pub const DEFAULT_TABLE_NAME: &str = "session";
pub const DEFAULT_COLLECTION_NAME: &str = "session";
pub const DEFAULT_REDIS_DATABASE: i64 = 0;

/// Ten years; keeps `now + lifetime` far away from chrono's range limits
const MAX_SESSION_LIFETIME_SECS: u64 = 10 * 365 * 24 * 60 * 60;

/// Session manager settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Header field carrying the session token
    pub token_name: String,
    /// Prefix in front of the identifier inside the token value
    pub token_prefix: String,
    /// Seconds added to "now" when a session is created or extended
    pub lifetime_secs: u64,
    /// Period of the background sweeper, if one should run
    pub sweep_interval_secs: Option<u64>,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            token_name: DEFAULT_TOKEN_NAME.to_string(),
            token_prefix: DEFAULT_TOKEN_PREFIX.to_string(),
            lifetime_secs: DEFAULT_SESSION_LIFETIME_SECS,
            sweep_interval_secs: None,
        }
    }
}

impl ManagerConfig {
    pub fn with_lifetime_secs(mut self, lifetime_secs: u64) -> Self {
        self.lifetime_secs = lifetime_secs;
        self
    }

    pub fn with_token(mut self, name: impl Into<String>, prefix: impl Into<String>) -> Self {
        self.token_name = name.into();
        self.token_prefix = prefix.into();
        self
    }

    pub fn lifetime(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.lifetime_secs.min(MAX_SESSION_LIFETIME_SECS) as i64)
    }

    pub fn sweep_interval(&self) -> Option<std::time::Duration> {
        self.sweep_interval_secs.map(std::time::Duration::from_secs)
    }

    pub fn validate(&self) -> SessionResult<()> {
        if self.token_name.trim().is_empty() {
            return Err(SessionError::config(
                "Token name must not be empty",
                Some("manager.token_name"),
            ));
        }

        if self.lifetime_secs == 0 || self.lifetime_secs > MAX_SESSION_LIFETIME_SECS {
            return Err(SessionError::config(
                format!(
                    "Session lifetime must be between 1 and {} seconds",
                    MAX_SESSION_LIFETIME_SECS
                ),
                Some("manager.lifetime_secs"),
            ));
        }

        if self.sweep_interval_secs == Some(0) {
            return Err(SessionError::config(
                "Sweep interval must be greater than 0",
                Some("manager.sweep_interval_secs"),
            ));
        }

        Ok(())
    }
}

/// Cache-with-TTL backend connection settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    /// `host:port` of the server
    pub server: String,
    pub password: String,
    /// Logical database index
    pub database: i64,
    /// Namespace prepended to every key as `prefix:id`
    pub key_prefix: Option<String>,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            server: "localhost:6379".to_string(),
            password: String::new(),
            database: DEFAULT_REDIS_DATABASE,
            key_prefix: None,
        }
    }
}

impl RedisConfig {
    /// Connection URL in the `redis://[:password@]host:port/db` form
    pub fn connection_url(&self) -> String {
        let auth = if self.password.is_empty() {
            String::new()
        } else {
            format!(":{}@", urlencoding::encode(&self.password))
        };

        format!("redis://{}{}/{}", auth, self.server, self.database)
    }
}

/// Relational backend settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SqlConfig {
    /// sqlx connection URL, e.g. `sqlite:sessions.db` or `sqlite::memory:`
    pub url: String,
    pub table: String,
    pub max_connections: u32,
}

impl Default for SqlConfig {
    fn default() -> Self {
        Self {
            url: "sqlite:sessions.db".to_string(),
            table: DEFAULT_TABLE_NAME.to_string(),
            max_connections: 5,
        }
    }
}

/// Document-store backend settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentConfig {
    pub uri: String,
    pub database: String,
    pub collection: String,
}

impl Default for DocumentConfig {
    fn default() -> Self {
        Self {
            uri: "mongodb://localhost:27017".to_string(),
            database: "sessionstore".to_string(),
            collection: DEFAULT_COLLECTION_NAME.to_string(),
        }
    }
}

/// Which storage backend to use, with its settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum ProviderConfig {
    /// In-process map (single process only)
    #[default]
    Memory,
    Redis(RedisConfig),
    Sqlite(SqlConfig),
    Mongodb(DocumentConfig),
}

impl ProviderConfig {
    pub fn backend_name(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Redis(_) => "redis",
            Self::Sqlite(_) => "sqlite",
            Self::Mongodb(_) => "mongodb",
        }
    }

    pub fn validate(&self) -> SessionResult<()> {
        match self {
            Self::Memory => Ok(()),
            Self::Redis(redis) => {
                if redis.server.trim().is_empty() {
                    return Err(SessionError::config(
                        "Redis server address must not be empty",
                        Some("provider.server"),
                    ));
                }
                if redis.database < 0 {
                    return Err(SessionError::config(
                        "Redis database index must not be negative",
                        Some("provider.database"),
                    ));
                }
                Ok(())
            }
            Self::Sqlite(sql) => {
                if !is_valid_identifier(&sql.table) {
                    return Err(SessionError::config(
                        format!("Invalid table name: {:?}", sql.table),
                        Some("provider.table"),
                    ));
                }
                if sql.max_connections == 0 {
                    return Err(SessionError::config(
                        "max_connections must be greater than 0",
                        Some("provider.max_connections"),
                    ));
                }
                Ok(())
            }
            Self::Mongodb(document) => {
                if document.database.is_empty() || document.collection.is_empty() {
                    return Err(SessionError::config(
                        "Database and collection names must not be empty",
                        Some("provider.collection"),
                    ));
                }
                Ok(())
            }
        }
    }
}

/// True for names safe to splice into SQL: `[A-Za-z_][A-Za-z0-9_]{0,63}`
pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }

    name.len() <= 64 && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Complete configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionStoreConfig {
    pub manager: ManagerConfig,
    pub provider: ProviderConfig,
    pub logging: LoggingConfig,
}

impl SessionStoreConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> SessionResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            SessionError::config(
                format!("Failed to read config file {}: {}", path.display(), e),
                None,
            )
        })?;

        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> SessionResult<Self> {
        let config: SessionStoreConfig = toml::from_str(content)
            .map_err(|e| SessionError::config(format!("Failed to parse config: {}", e), None))?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> SessionResult<()> {
        let content = toml::to_string_pretty(self).map_err(|e| {
            SessionError::config(format!("Failed to serialize config: {}", e), None)
        })?;

        std::fs::write(path, content).map_err(|e| {
            SessionError::config(format!("Failed to write config file: {}", e), None)
        })?;

        Ok(())
    }

    pub fn validate(&self) -> SessionResult<()> {
        self.manager.validate()?;
        self.provider.validate()?;
        Ok(())
    }
}

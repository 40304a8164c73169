//! Relational session storage on SQLite
//!
//! One row per session in a single table. The table and its expire index are
//! created on first use; expired rows are removed by an explicit sweep.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use sessionstore_core::config::{is_valid_identifier, SqlConfig};
use sessionstore_core::{normalize_timestamp, Session, SessionData, SessionError, SessionProvider, SessionRecord, SessionResult};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::str::FromStr;
use tokio::sync::OnceCell;
use tracing::{debug, info};

const BACKEND: &str = "sqlite";

/// Textual layout of the `expire` column
///
/// Fixed width with millisecond precision, so string comparison in SQL
/// orders rows chronologically and rows defaulted to `CURRENT_TIMESTAMP`
/// still compare correctly.
const EXPIRE_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";
const EXPIRE_PARSE_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

struct Queries {
    create_table: String,
    create_index: String,
    select: String,
    upsert: String,
    delete: String,
    sweep: String,
}

impl Queries {
    fn for_table(table: &str) -> Self {
        Self {
            create_table: format!(
                r#"
                CREATE TABLE IF NOT EXISTS {table} (
                    uuid CHAR(36) NOT NULL PRIMARY KEY,
                    data BLOB NULL,
                    expire DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
                )
                "#
            ),
            create_index: format!("CREATE INDEX IF NOT EXISTS idx_{table}_expire ON {table} (expire)"),
            select: format!("SELECT uuid, data, expire FROM {table} WHERE uuid = ?"),
            upsert: format!(
                r#"
                INSERT INTO {table} (uuid, data, expire) VALUES (?, ?, ?)
                ON CONFLICT(uuid) DO UPDATE SET data = excluded.data, expire = excluded.expire
                "#
            ),
            delete: format!("DELETE FROM {table} WHERE uuid = ?"),
            sweep: format!("DELETE FROM {table} WHERE expire < ?"),
        }
    }
}

/// SQLite session storage
pub struct SqliteProvider {
    pool: SqlitePool,
    table: String,
    queries: Queries,
    schema: OnceCell<()>,
}

impl SqliteProvider {
    /// Wrap an existing pool; fails if `table` is not a plain identifier
    pub fn new(pool: SqlitePool, table: impl Into<String>) -> SessionResult<Self> {
        let table = table.into();
        if !is_valid_identifier(&table) {
            return Err(SessionError::config(
                format!("Invalid table name: {:?}", table),
                Some("provider.table"),
            ));
        }

        Ok(Self {
            pool,
            queries: Queries::for_table(&table),
            table,
            schema: OnceCell::new(),
        })
    }

    /// Open a pool from configuration, creating the database file if needed
    ///
    /// The table itself is created lazily on the first operation.
    pub async fn from_config(config: &SqlConfig) -> SessionResult<Self> {
        let options = SqliteConnectOptions::from_str(&config.url)
            .map_err(|e| SessionError::storage(BACKEND, "Invalid SQLite connection URL", e))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await
            .map_err(|e| {
                SessionError::storage(BACKEND, "Failed to connect to SQLite database", e)
            })?;

        Self::new(pool, config.table.clone())
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Health check for the storage backend
    pub async fn health_check(&self) -> SessionResult<()> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| SessionError::storage(BACKEND, "SQLite health check failed", e))?;

        Ok(())
    }

    /// Create the table on first use
    ///
    /// Concurrent first callers wait on the same attempt. A failed attempt
    /// leaves the cell empty so the next call retries.
    async fn ensure_schema(&self) -> SessionResult<()> {
        self.schema
            .get_or_try_init(|| async {
                sqlx::query(&self.queries.create_table)
                    .execute(&self.pool)
                    .await
                    .map_err(|e| SessionError::storage(BACKEND, "Failed to create session table", e))?;

                sqlx::query(&self.queries.create_index)
                    .execute(&self.pool)
                    .await
                    .map_err(|e| SessionError::storage(BACKEND, "Failed to create expire index", e))?;

                info!("Session table {} is ready", self.table);
                Ok::<(), SessionError>(())
            })
            .await?;

        Ok(())
    }

    fn row_to_session(row: &SqliteRow) -> SessionResult<Session> {
        let uuid: String = row
            .try_get("uuid")
            .map_err(|e| SessionError::serialization("Failed to get uuid column", e))?;

        let data: Option<Vec<u8>> = row
            .try_get("data")
            .map_err(|e| SessionError::serialization("Failed to get data column", e))?;

        let data: SessionData = match data {
            Some(bytes) if !bytes.is_empty() => serde_json::from_slice(&bytes)
                .map_err(|e| SessionError::serialization("Failed to parse session data", e))?,
            _ => SessionData::new(),
        };

        let expire: String = row
            .try_get("expire")
            .map_err(|e| SessionError::serialization("Failed to get expire column", e))?;

        Ok(Session::from(SessionRecord {
            uuid,
            data,
            expire: parse_expire(&expire)?,
        }))
    }
}

fn format_expire(timestamp: DateTime<Utc>) -> String {
    normalize_timestamp(timestamp).format(EXPIRE_FORMAT).to_string()
}

fn parse_expire(value: &str) -> SessionResult<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(value, EXPIRE_PARSE_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|e| SessionError::serialization(format!("Invalid expire value {:?}", value), e))
}

#[async_trait]
impl SessionProvider for SqliteProvider {
    async fn read(&self, id: &str) -> SessionResult<Session> {
        self.ensure_schema().await?;

        let row = sqlx::query(&self.queries.select)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| SessionError::storage(BACKEND, "Failed to load session from database", e))?;

        match row {
            Some(row) => {
                let session = Self::row_to_session(&row)?;
                debug!("Loaded session {} from SQLite storage", id);
                Ok(session)
            }
            None => Err(SessionError::not_found(id)),
        }
    }

    async fn save(&self, session: &Session) -> SessionResult<()> {
        self.ensure_schema().await?;

        let record = session.to_record();
        let data = serde_json::to_vec(&record.data)
            .map_err(|e| SessionError::serialization("Failed to serialize session data", e))?;

        sqlx::query(&self.queries.upsert)
            .bind(&record.uuid)
            .bind(data)
            .bind(format_expire(record.expire))
            .execute(&self.pool)
            .await
            .map_err(|e| SessionError::storage(BACKEND, "Failed to save session to database", e))?;

        debug!("Saved session {} to SQLite storage", record.uuid);
        Ok(())
    }

    async fn destroy(&self, id: &str) -> SessionResult<()> {
        self.ensure_schema().await?;

        let result = sqlx::query(&self.queries.delete)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| SessionError::storage(BACKEND, "Failed to delete session from database", e))?;

        if result.rows_affected() > 0 {
            debug!("Destroyed session {} in SQLite storage", id);
        }
        Ok(())
    }

    async fn garbage_collect(&self) -> SessionResult<u64> {
        self.ensure_schema().await?;

        let result = sqlx::query(&self.queries.sweep)
            .bind(format_expire(Utc::now()))
            .execute(&self.pool)
            .await
            .map_err(|e| SessionError::storage(BACKEND, "Failed to sweep expired sessions", e))?;

        let removed = result.rows_affected();
        if removed > 0 {
            info!("Swept {} expired sessions from {}", removed, self.table);
        }
        Ok(removed)
    }
}

//! Core trait definitions

use crate::error::SessionResult;
use crate::session::Session;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Storage provider capability set
///
/// Every backend implements these five operations. Implementations must be
/// safe to share between tasks: the session manager holds one provider behind
/// an `Arc` and calls it from any number of concurrent callers.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// Build an empty, unsaved session for `id`
    fn init(&self, id: String, expire: DateTime<Utc>) -> Session {
        Session::new(id, expire)
    }

    /// Fetch the record stored under `id`
    ///
    /// Fails with `NotFound` when the key is absent or was already evicted.
    /// Providers that expire records by sweeping return a logically expired
    /// record until the sweep has removed it.
    async fn read(&self, id: &str) -> SessionResult<Session>;

    /// Upsert the session; saving the same id twice overwrites
    async fn save(&self, session: &Session) -> SessionResult<()>;

    /// Remove the record; removing a missing id is not an error
    async fn destroy(&self, id: &str) -> SessionResult<()>;

    /// Remove every record whose expiration lies strictly before now
    ///
    /// Returns the number of records removed. Backends with native
    /// per-record expiration return `Ok(0)` without doing anything.
    async fn garbage_collect(&self) -> SessionResult<u64>;
}

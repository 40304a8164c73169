//! Session record and its in-memory handle
//!
//! A [`Session`] is the handle callers mutate. Its payload and expiration sit
//! behind a lock owned by the handle itself; the persisted form is the plain
//! [`SessionRecord`], which never carries the lock.

use crate::error::SessionResult;
use chrono::{DateTime, SubsecRound, Utc};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Caller payload: string keys mapped to arbitrary JSON values
pub type SessionData = Map<String, Value>;

/// Bring a timestamp down to the precision every backend can store
pub fn normalize_timestamp(timestamp: DateTime<Utc>) -> DateTime<Utc> {
    timestamp.trunc_subsecs(3)
}

/// Serialized shape of a session as written to every backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub uuid: String,
    #[serde(default)]
    pub data: SessionData,
    pub expire: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct SessionState {
    data: SessionData,
    expire: DateTime<Utc>,
}

/// Server-side session handle
///
/// Identity is the id: two handles with the same id compare equal even when
/// they were loaded independently, but they share no state, and whichever is
/// saved last wins.
pub struct Session {
    id: String,
    state: RwLock<SessionState>,
}

impl Session {
    /// Create an empty session with the given id and expiration
    pub fn new(id: impl Into<String>, expire: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            state: RwLock::new(SessionState {
                data: SessionData::new(),
                expire: normalize_timestamp(expire),
            }),
        }
    }

    /// Generate a fresh session identifier (UUID v4, textual form)
    pub fn generate_id() -> String {
        uuid::Uuid::new_v4().to_string()
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Upsert one payload entry
    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        let value = value.into();
        self.state.write().data.insert(key, value);
    }

    /// Upsert one entry from any serializable value
    pub fn set_serialized<T: Serialize>(&self, key: impl Into<String>, value: &T) -> SessionResult<()> {
        let value = serde_json::to_value(value)?;
        self.set(key, value);
        Ok(())
    }

    /// Upsert several entries as one critical section
    pub fn set_many<I, K, V>(&self, entries: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let entries: Vec<(String, Value)> = entries
            .into_iter()
            .map(|(key, value)| (key.into(), value.into()))
            .collect();

        let mut state = self.state.write();
        state.data.extend(entries);
    }

    /// Overwrite the expiration timestamp
    pub fn set_expiration(&self, expire: DateTime<Utc>) {
        self.state.write().expire = normalize_timestamp(expire);
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.state.read().data.get(key).cloned()
    }

    /// Decode one entry into a concrete type
    ///
    /// Returns `Ok(None)` when the key is absent and a serialization error
    /// when the stored value does not match `T`.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> SessionResult<Option<T>> {
        match self.get(key) {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        self.state.write().data.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.state.read().data.contains_key(key)
    }

    /// Snapshot of the whole payload
    pub fn data(&self) -> SessionData {
        self.state.read().data.clone()
    }

    pub fn expire(&self) -> DateTime<Utc> {
        self.state.read().expire
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// True when `expire` lies strictly before `now`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expire() < now
    }

    /// Consistent snapshot of id, payload and expiration
    pub fn to_record(&self) -> SessionRecord {
        let state = self.state.read();
        SessionRecord {
            uuid: self.id.clone(),
            data: state.data.clone(),
            expire: state.expire,
        }
    }
}

impl From<SessionRecord> for Session {
    fn from(record: SessionRecord) -> Self {
        Self {
            id: record.uuid,
            state: RwLock::new(SessionState {
                data: record.data,
                expire: normalize_timestamp(record.expire),
            }),
        }
    }
}

impl Clone for Session {
    fn clone(&self) -> Self {
        Session::from(self.to_record())
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.read();
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("data", &state.data)
            .field("expire", &state.expire)
            .finish()
    }
}

impl PartialEq for Session {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Session {}

impl Hash for Session {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state)
    }
}

impl Serialize for Session {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_record().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Session {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        SessionRecord::deserialize(deserializer).map(Session::from)
    }
}

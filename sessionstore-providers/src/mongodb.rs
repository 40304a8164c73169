//! Document-store session storage on MongoDB
//!
//! One document per session, keyed by `_id = uuid`. `expire` is stored as a
//! native BSON datetime so the sweep can filter on it server-side.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::TryStreamExt;
use mongodb::bson::{self, doc, Document};
use mongodb::{Client, Collection};
use serde::{Deserialize, Serialize};
use sessionstore_core::config::DocumentConfig;
use sessionstore_core::{Session, SessionData, SessionError, SessionProvider, SessionRecord, SessionResult};
use tracing::{debug, info, warn};

const BACKEND: &str = "mongodb";

/// Stored document layout
#[derive(Debug, Serialize, Deserialize)]
struct SessionDocument {
    #[serde(rename = "_id")]
    id: String,
    uuid: String,
    #[serde(default)]
    data: SessionData,
    expire: bson::DateTime,
}

fn to_bson_datetime(timestamp: DateTime<Utc>) -> bson::DateTime {
    bson::DateTime::from_millis(timestamp.timestamp_millis())
}

fn record_to_document(record: &SessionRecord) -> SessionResult<Document> {
    let document = SessionDocument {
        id: record.uuid.clone(),
        uuid: record.uuid.clone(),
        data: record.data.clone(),
        expire: to_bson_datetime(record.expire),
    };

    bson::to_document(&document)
        .map_err(|e| SessionError::serialization("Failed to encode session document", e))
}

fn document_to_record(document: Document) -> SessionResult<SessionRecord> {
    let document: SessionDocument = bson::from_document(document)
        .map_err(|e| SessionError::serialization("Failed to decode session document", e))?;

    let expire = DateTime::<Utc>::from_timestamp_millis(document.expire.timestamp_millis())
        .ok_or_else(|| SessionError::Serialization {
            message: format!("Session {} has an out-of-range expire", document.id),
            source: None,
        })?;

    Ok(SessionRecord {
        uuid: document.uuid,
        data: document.data,
        expire,
    })
}

/// MongoDB session storage
pub struct MongoProvider {
    collection: Collection<Document>,
}

impl MongoProvider {
    pub fn new(client: &Client, database: &str, collection: &str) -> Self {
        Self {
            collection: client.database(database).collection(collection),
        }
    }

    /// Connect using the configured URI
    pub async fn connect(config: &DocumentConfig) -> SessionResult<Self> {
        let client = Client::with_uri_str(&config.uri)
            .await
            .map_err(|e| SessionError::storage(BACKEND, "Failed to connect to MongoDB", e))?;

        info!(
            "Using MongoDB collection {}.{} for sessions",
            config.database, config.collection
        );
        Ok(Self::new(&client, &config.database, &config.collection))
    }

    /// Ids of every document whose expire lies before `now`
    async fn expired_ids(&self, now: DateTime<Utc>) -> SessionResult<Vec<String>> {
        let mut cursor = self
            .collection
            .find(doc! { "expire": { "$lt": to_bson_datetime(now) } })
            .projection(doc! { "_id": 1 })
            .await
            .map_err(|e| SessionError::storage(BACKEND, "Failed to query expired sessions", e))?;

        let mut ids = Vec::new();
        while let Some(document) = cursor
            .try_next()
            .await
            .map_err(|e| SessionError::storage(BACKEND, "Failed to iterate expired sessions", e))?
        {
            match document.get_str("_id") {
                Ok(id) => ids.push(id.to_string()),
                Err(e) => warn!("Skipping expired session with unexpected _id: {}", e),
            }
        }

        Ok(ids)
    }
}

#[async_trait]
impl SessionProvider for MongoProvider {
    async fn read(&self, id: &str) -> SessionResult<Session> {
        let document = self
            .collection
            .find_one(doc! { "_id": id })
            .await
            .map_err(|e| SessionError::storage(BACKEND, "Failed to load session from MongoDB", e))?;

        match document {
            Some(document) => {
                let record = document_to_record(document)?;
                debug!("Loaded session {} from MongoDB storage", id);
                Ok(Session::from(record))
            }
            None => Err(SessionError::not_found(id)),
        }
    }

    async fn save(&self, session: &Session) -> SessionResult<()> {
        let record = session.to_record();
        let document = record_to_document(&record)?;

        self.collection
            .replace_one(doc! { "_id": record.uuid.as_str() }, document)
            .upsert(true)
            .await
            .map_err(|e| SessionError::storage(BACKEND, "Failed to save session to MongoDB", e))?;

        debug!("Saved session {} to MongoDB storage", record.uuid);
        Ok(())
    }

    async fn destroy(&self, id: &str) -> SessionResult<()> {
        let result = self
            .collection
            .delete_one(doc! { "_id": id })
            .await
            .map_err(|e| SessionError::storage(BACKEND, "Failed to delete session from MongoDB", e))?;

        if result.deleted_count > 0 {
            debug!("Destroyed session {} in MongoDB storage", id);
        }
        Ok(())
    }

    async fn garbage_collect(&self) -> SessionResult<u64> {
        // Collect first so deletions never disturb the open cursor.
        let ids = self.expired_ids(Utc::now()).await?;

        let mut removed = 0;
        for id in &ids {
            match self.collection.delete_one(doc! { "_id": id.as_str() }).await {
                Ok(result) => removed += result.deleted_count,
                Err(e) => warn!("Failed to delete expired session {}: {}", id, e),
            }
        }

        if removed > 0 {
            info!("Swept {} expired sessions from MongoDB storage", removed);
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use sessionstore_core::normalize_timestamp;
    use serde_json::json;

    fn record() -> SessionRecord {
        let session = Session::new("doc-1", Utc::now() + Duration::seconds(90));
        session.set("value-string", "Test Data String");
        session.set("value-int", 100);
        session.set("value-float", 100.001);
        session.set("nested", json!({"list": [1, 2, 3]}));
        session.to_record()
    }

    #[test]
    fn test_document_layout() {
        let record = record();
        let document = record_to_document(&record).unwrap();

        assert_eq!(document.get_str("_id").unwrap(), "doc-1");
        assert_eq!(document.get_str("uuid").unwrap(), "doc-1");
        assert!(document.get_datetime("expire").is_ok());
        assert_eq!(
            document.get_document("data").unwrap().get_str("value-string").unwrap(),
            "Test Data String"
        );
    }

    #[test]
    fn test_document_round_trip_keeps_values() {
        let record = record();
        let decoded = document_to_record(record_to_document(&record).unwrap()).unwrap();

        assert_eq!(decoded, record);
        assert_eq!(decoded.expire, normalize_timestamp(decoded.expire));
    }

    #[test]
    fn test_document_without_data_decodes() {
        let document = doc! {
            "_id": "bare",
            "uuid": "bare",
            "expire": bson::DateTime::from_millis(1_900_000_000_000),
        };

        let record = document_to_record(document).unwrap();
        assert_eq!(record.uuid, "bare");
        assert!(record.data.is_empty());
    }

    #[test]
    fn test_malformed_document_is_serialization_error() {
        let document = doc! { "_id": "broken", "uuid": "broken", "expire": "tomorrow" };
        assert!(matches!(
            document_to_record(document),
            Err(SessionError::Serialization { .. })
        ));
    }
}

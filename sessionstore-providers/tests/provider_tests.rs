//! Behavior every storage provider must share
//!
//! The memory and SQLite providers run everywhere. Redis and MongoDB need a
//! live server and are ignored unless `SESSIONSTORE_REDIS_URL` or
//! `SESSIONSTORE_MONGO_URI` point at one (`cargo test -- --ignored`).

use chrono::{Duration, Utc};
use serde_json::json;
use sessionstore_providers::{MemoryProvider, Session, SessionError, SessionProvider};

fn session_expiring_in(id: &str, offset: Duration) -> Session {
    Session::new(id, Utc::now() + offset)
}

async fn check_round_trip(provider: &dyn SessionProvider) {
    let session = session_expiring_in(&Session::generate_id(), Duration::seconds(120));
    session.set_many([("value-string", json!("Test Data String")), ("value-int", json!(100))]);
    session.set("value-float", 100.001);
    session.set("nested", json!({"list": [1, 2, 3], "flag": true}));
    provider.save(&session).await.unwrap();

    let loaded = provider.read(session.id()).await.unwrap();
    assert_eq!(loaded.id(), session.id());
    assert_eq!(loaded.data(), session.data());
    assert_eq!(loaded.expire(), session.expire());
}

async fn check_overwrite(provider: &dyn SessionProvider) {
    let session = session_expiring_in(&Session::generate_id(), Duration::seconds(120));
    session.set("count", 1);
    provider.save(&session).await.unwrap();

    session.set("count", 2);
    session.set_expiration(Utc::now() + Duration::seconds(300));
    provider.save(&session).await.unwrap();

    let loaded = provider.read(session.id()).await.unwrap();
    assert_eq!(loaded.get("count"), Some(json!(2)));
    assert_eq!(loaded.expire(), session.expire());
}

async fn check_missing_and_destroy(provider: &dyn SessionProvider) {
    let missing = Session::generate_id();
    match provider.read(&missing).await {
        Err(SessionError::NotFound { session_id }) => assert_eq!(session_id, missing),
        other => panic!("Expected NotFound, got {:?}", other),
    }

    let session = session_expiring_in(&Session::generate_id(), Duration::seconds(120));
    provider.save(&session).await.unwrap();
    provider.destroy(session.id()).await.unwrap();
    provider.destroy(session.id()).await.unwrap();
    assert!(provider.read(session.id()).await.unwrap_err().is_not_found());
}

/// Sweep semantics for providers that expire records by garbage collection
async fn check_sweep(provider: &dyn SessionProvider) {
    let long_gone = session_expiring_in("sweep-long-gone", Duration::seconds(-10));
    let just_gone = session_expiring_in("sweep-just-gone", Duration::seconds(-1));
    let alive = session_expiring_in("sweep-alive", Duration::seconds(100));
    for session in [&long_gone, &just_gone, &alive] {
        provider.save(session).await.unwrap();
    }

    // Not swept yet: still readable even though logically expired
    assert!(provider.read(long_gone.id()).await.unwrap().is_expired());

    assert_eq!(provider.garbage_collect().await.unwrap(), 2);
    assert!(provider.read(long_gone.id()).await.unwrap_err().is_not_found());
    assert!(provider.read(just_gone.id()).await.unwrap_err().is_not_found());
    assert!(provider.read(alive.id()).await.is_ok());

    assert_eq!(provider.garbage_collect().await.unwrap(), 0);
}

async fn check_all(provider: &dyn SessionProvider) {
    check_round_trip(provider).await;
    check_overwrite(provider).await;
    check_missing_and_destroy(provider).await;
}

#[tokio::test]
async fn test_memory_provider() {
    let provider = MemoryProvider::new();
    check_all(&provider).await;
    check_sweep(&provider).await;
}

#[cfg(feature = "sqlite")]
mod sqlite {
    use super::*;
    use sessionstore_core::config::SqlConfig;
    use sessionstore_providers::SqliteProvider;

    async fn provider() -> SqliteProvider {
        let config = SqlConfig {
            url: "sqlite::memory:".to_string(),
            table: "web_session".to_string(),
            max_connections: 1,
        };
        SqliteProvider::from_config(&config).await.unwrap()
    }

    #[tokio::test]
    async fn test_sqlite_provider() {
        let provider = provider().await;
        check_all(&provider).await;
        check_sweep(&provider).await;
        provider.health_check().await.unwrap();
    }

    #[tokio::test]
    async fn test_sqlite_null_data_reads_as_empty() {
        let provider = provider().await;
        // First operation creates the table
        assert!(provider.read("nobody").await.is_err());

        sqlx::query("INSERT INTO web_session (uuid, data, expire) VALUES ('raw', NULL, '2099-01-01 00:00:00')")
            .execute(provider.pool())
            .await
            .unwrap();

        let session = provider.read("raw").await.unwrap();
        assert!(session.data().is_empty());
        assert!(!session.is_expired());
    }

    #[tokio::test]
    async fn test_sqlite_corrupt_data_is_serialization_error() {
        let provider = provider().await;
        assert!(provider.read("nobody").await.is_err());

        sqlx::query("INSERT INTO web_session (uuid, data, expire) VALUES ('bad', X'7B6E6F', '2099-01-01 00:00:00')")
            .execute(provider.pool())
            .await
            .unwrap();

        assert!(matches!(
            provider.read("bad").await,
            Err(SessionError::Serialization { .. })
        ));
    }

    #[tokio::test]
    async fn test_sqlite_concurrent_first_use() {
        let provider = std::sync::Arc::new(provider().await);

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let provider = provider.clone();
                tokio::spawn(async move {
                    let session = Session::new(format!("first-use-{i}"), Utc::now() + Duration::seconds(60));
                    provider.save(&session).await
                })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert!(provider.read("first-use-7").await.is_ok());
    }
}

#[cfg(feature = "redis")]
mod redis {
    use super::*;
    use sessionstore_providers::RedisProvider;

    fn provider() -> Option<RedisProvider> {
        let url = std::env::var("SESSIONSTORE_REDIS_URL").ok()?;
        Some(RedisProvider::with_url(url).with_key_prefix(Some("sessionstore-test".to_string())))
    }

    #[tokio::test]
    #[ignore = "requires a running Redis server"]
    async fn test_redis_provider() {
        let Some(provider) = provider() else { return };
        check_all(&provider).await;

        // Native TTL: already-expired saves vanish, sweep is a no-op
        let expired = session_expiring_in(&Session::generate_id(), Duration::seconds(-1));
        provider.save(&expired).await.unwrap();
        assert!(provider.read(expired.id()).await.unwrap_err().is_not_found());
        assert_eq!(provider.garbage_collect().await.unwrap(), 0);
    }

    #[tokio::test]
    #[ignore = "requires a running Redis server"]
    async fn test_redis_key_expires_on_server() {
        let Some(provider) = provider() else { return };

        let session = session_expiring_in(&Session::generate_id(), Duration::milliseconds(300));
        provider.save(&session).await.unwrap();
        assert!(provider.read(session.id()).await.is_ok());

        tokio::time::sleep(std::time::Duration::from_millis(600)).await;
        assert!(provider.read(session.id()).await.unwrap_err().is_not_found());
    }
}

#[cfg(feature = "mongodb")]
mod mongo {
    use super::*;
    use sessionstore_core::config::DocumentConfig;
    use sessionstore_providers::MongoProvider;

    #[tokio::test]
    #[ignore = "requires a running MongoDB server"]
    async fn test_mongo_provider() {
        let Ok(uri) = std::env::var("SESSIONSTORE_MONGO_URI") else { return };
        let config = DocumentConfig {
            uri,
            database: "sessionstore_test".to_string(),
            collection: format!("session_{}", Utc::now().timestamp_millis()),
        };
        let provider = MongoProvider::connect(&config).await.unwrap();

        check_all(&provider).await;
        check_sweep(&provider).await;
    }
}

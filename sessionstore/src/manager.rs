//! Session Manager - lifecycle operations over one storage provider
//!
//! The manager creates sessions, resolves request tokens to stored sessions,
//! refreshes expirations and schedules sweeps. It owns no session state of
//! its own; everything persistent lives in the provider.

use crate::factory::build_provider;
use chrono::{DateTime, Utc};
use sessionstore_core::{
    init_logging, normalize_timestamp, parse_token, LoadError, ManagerConfig, Session,
    SessionError, SessionProvider, SessionResult, SessionStoreConfig, TokenSource,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Shortest period accepted by [`SessionManager::spawn_sweeper`]
pub const MIN_SWEEP_PERIOD: Duration = Duration::from_millis(1);

/// Session manager bound to one provider
///
/// Cheap to clone; clones share the provider.
#[derive(Clone)]
pub struct SessionManager {
    provider: Arc<dyn SessionProvider>,
    config: ManagerConfig,
}

impl SessionManager {
    pub fn new(provider: Arc<dyn SessionProvider>, config: ManagerConfig) -> Self {
        Self { provider, config }
    }

    /// Manager with the default token name, prefix and lifetime
    pub fn with_provider(provider: Arc<dyn SessionProvider>) -> Self {
        Self::new(provider, ManagerConfig::default())
    }

    /// Validate the configuration and build the configured provider
    ///
    /// The `logging` section is not applied here; the application installs
    /// its own subscriber or calls [`SessionManager::from_config_with_logging`].
    pub async fn from_config(config: &SessionStoreConfig) -> SessionResult<Self> {
        config.validate()?;
        let provider = build_provider(&config.provider).await?;

        info!(
            backend = config.provider.backend_name(),
            lifetime_secs = config.manager.lifetime_secs,
            "Session manager ready"
        );
        Ok(Self::new(provider, config.manager.clone()))
    }

    /// Install the global subscriber from `config.logging`, then build as
    /// [`SessionManager::from_config`] does
    ///
    /// Fails with a configuration error if the subscriber cannot be
    /// installed, including when one is already set.
    pub async fn from_config_with_logging(config: &SessionStoreConfig) -> SessionResult<Self> {
        config.validate()?;
        init_logging(&config.logging).map_err(|e| {
            SessionError::config(format!("Failed to initialize logging: {e}"), Some("logging"))
        })?;

        Self::from_config(config).await
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    pub fn provider(&self) -> &Arc<dyn SessionProvider> {
        &self.provider
    }

    /// `now + lifetime`, at stored precision
    pub fn expiration(&self) -> DateTime<Utc> {
        normalize_timestamp(Utc::now() + self.config.lifetime())
    }

    /// Create an unsaved session with a fresh identifier
    pub fn new_session(&self) -> Session {
        self.new_session_with_id(Session::generate_id())
    }

    /// Create an unsaved session with a caller-chosen identifier
    ///
    /// Uniqueness is not checked; saving over an existing id replaces it.
    pub fn new_session_with_id(&self, id: impl Into<String>) -> Session {
        let session = self.provider.init(id.into(), self.expiration());
        debug!("Created session {}", session.id());
        session
    }

    /// Fetch a stored session
    ///
    /// Every provider failure, a miss included, comes back as one
    /// [`LoadError`]; the provider error stays reachable as its source.
    pub async fn load(&self, id: &str) -> Result<Session, LoadError> {
        self.provider.read(id).await.map_err(|e| {
            e.log();
            LoadError::from(e)
        })
    }

    /// Resolve a raw token value such as `"Bearer <id>"` to a session
    ///
    /// A missing or empty token fails without touching the provider.
    pub async fn load_from_token(&self, raw: Option<&str>) -> Result<Session, LoadError> {
        let id = raw
            .and_then(|raw| parse_token(raw, &self.config.token_prefix))
            .ok_or_else(|| {
                debug!("No session token supplied");
                LoadError::missing_token()
            })?;

        self.load(id).await
    }

    /// Look up the configured token field in `source` and load its session
    pub async fn load_from_request<T>(&self, source: &T) -> Result<Session, LoadError>
    where
        T: TokenSource + Sync + ?Sized,
    {
        self.load_from_token(source.token_value(&self.config.token_name))
            .await
    }

    pub async fn save(&self, session: &Session) -> SessionResult<()> {
        self.provider.save(session).await
    }

    /// Push the expiration to `now + lifetime` and persist
    ///
    /// The new expiration is always at least one millisecond past the old
    /// one, so repeated calls within the same millisecond still move it.
    /// A failed save is logged and otherwise ignored; the in-memory handle
    /// keeps the new expiration either way.
    pub async fn extend(&self, session: &Session) {
        let next = self
            .expiration()
            .max(session.expire() + chrono::Duration::milliseconds(1));
        session.set_expiration(next);

        if let Err(e) = self.provider.save(session).await {
            warn!(
                session_id = session.id(),
                error = %e,
                "Failed to persist extended session"
            );
        }
    }

    pub async fn destroy(&self, session: &Session) -> SessionResult<()> {
        self.provider.destroy(session.id()).await
    }

    /// Run one provider sweep in the background and return immediately
    ///
    /// The outcome is only logged. Awaiting the handle waits for the sweep
    /// to finish but yields nothing about its result.
    pub fn garbage_collect(&self) -> JoinHandle<()> {
        let provider = self.provider.clone();
        tokio::spawn(
            async move { sweep_once(provider.as_ref()).await }
                .instrument(info_span!("session_sweep")),
        )
    }

    /// Sweep every `period` until the returned handle is aborted
    ///
    /// The first sweep runs immediately. Periods shorter than
    /// [`MIN_SWEEP_PERIOD`] are raised to it.
    pub fn spawn_sweeper(&self, period: Duration) -> JoinHandle<()> {
        let period = if period < MIN_SWEEP_PERIOD {
            warn!(?period, "Sweep period too short, using {:?}", MIN_SWEEP_PERIOD);
            MIN_SWEEP_PERIOD
        } else {
            period
        };
        let provider = self.provider.clone();
        info!(period_secs = period.as_secs_f64(), "Starting session sweeper");

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                sweep_once(provider.as_ref())
                    .instrument(info_span!("session_sweep"))
                    .await;
            }
        })
    }

    /// Start the sweeper if `sweep_interval_secs` is configured
    pub fn spawn_configured_sweeper(&self) -> Option<JoinHandle<()>> {
        self.config
            .sweep_interval()
            .map(|period| self.spawn_sweeper(period))
    }
}

async fn sweep_once(provider: &dyn SessionProvider) {
    match provider.garbage_collect().await {
        Ok(0) => debug!("Session sweep found nothing to remove"),
        Ok(removed) => info!(removed, "Session sweep completed"),
        Err(e) => error!(error = %e, "Session sweep failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use sessionstore_providers::MemoryProvider;

    fn manager(lifetime_secs: u64) -> SessionManager {
        SessionManager::new(
            Arc::new(MemoryProvider::new()),
            ManagerConfig::default().with_lifetime_secs(lifetime_secs),
        )
    }

    #[tokio::test]
    async fn test_new_session_uses_lifetime() {
        let manager = manager(60);
        let before = Utc::now();
        let session = manager.new_session();

        assert!(session.data().is_empty());
        assert!(session.expire() > before + ChronoDuration::seconds(59));
        assert!(session.expire() <= Utc::now() + ChronoDuration::seconds(60));
    }

    #[tokio::test]
    async fn test_new_session_is_not_saved() {
        let manager = manager(60);
        let session = manager.new_session_with_id("custom-id");
        assert_eq!(session.id(), "custom-id");

        let err = manager.load("custom-id").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_configured_sweeper_is_optional() {
        let manager = manager(60);
        assert!(manager.spawn_configured_sweeper().is_none());

        let config = ManagerConfig {
            sweep_interval_secs: Some(3600),
            ..Default::default()
        };
        let manager = SessionManager::new(Arc::new(MemoryProvider::new()), config);
        let handle = manager.spawn_configured_sweeper().unwrap();
        handle.abort();
        assert!(handle.await.unwrap_err().is_cancelled());
    }

    #[tokio::test]
    async fn test_zero_sweep_period_is_clamped() {
        let manager = manager(60);
        let expired = manager.new_session_with_id("stale");
        expired.set_expiration(Utc::now() - ChronoDuration::seconds(1));
        manager.save(&expired).await.unwrap();

        let handle = manager.spawn_sweeper(Duration::ZERO);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!handle.is_finished());
        handle.abort();

        assert!(manager.load("stale").await.unwrap_err().is_not_found());
    }
}

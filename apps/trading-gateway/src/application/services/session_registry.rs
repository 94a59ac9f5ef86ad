//! Session Registry
//!
//! Owns every live backend connection. Each session has its own execution
//! lane: a fair async mutex around the connection handle. Calls on one
//! session queue on that lane and run one at a time in arrival order;
//! calls on different sessions never contend.
//!
//! A closed session leaves a tombstone (`None`) in its lane, so callers
//! that were already queued fail fast instead of touching a released
//! handle. The session id is removed from the registry only after the
//! handle has been released.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use parking_lot::{Mutex, RwLock};
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{BackendConnection, TradingBackend};
use crate::domain::error::{BackendError, GatewayError};
use crate::domain::mode::Mode;
use crate::domain::session::{AccountCredentials, AccountId, SessionId, SessionInfo, SessionState};
use crate::infrastructure::metrics;

// =============================================================================
// Configuration
// =============================================================================

/// Limits for the session registry.
#[derive(Debug, Clone, Copy)]
pub struct SessionConfig {
    /// Maximum live sessions across all accounts.
    pub max_sessions: usize,
    /// Maximum live sessions per account.
    pub max_sessions_per_account: usize,
    /// Sessions unused for this long are evicted by the sweeper.
    pub idle_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_sessions: 64,
            max_sessions_per_account: 4,
            idle_timeout: Duration::from_secs(30 * 60),
        }
    }
}

// =============================================================================
// Session Entry
// =============================================================================

type Lane = AsyncMutex<Option<Box<dyn BackendConnection>>>;

#[derive(Debug, Clone, Copy)]
struct LastUsed {
    instant: Instant,
    at: DateTime<Utc>,
}

impl LastUsed {
    fn now() -> Self {
        Self {
            instant: Instant::now(),
            at: Utc::now(),
        }
    }
}

struct SessionEntry {
    id: SessionId,
    account_id: AccountId,
    mode: Mode,
    created_at: DateTime<Utc>,
    state: RwLock<SessionState>,
    last_used: Mutex<LastUsed>,
    lane: Arc<Lane>,
}

impl SessionEntry {
    fn touch(&self) {
        *self.last_used.lock() = LastUsed::now();
    }

    fn idle_for(&self) -> Duration {
        self.last_used.lock().instant.elapsed()
    }

    fn state(&self) -> SessionState {
        *self.state.read()
    }

    fn set_state(&self, state: SessionState) {
        *self.state.write() = state;
    }

    fn info(&self) -> SessionInfo {
        SessionInfo {
            session_id: self.id.clone(),
            account_id: self.account_id.clone(),
            state: self.state(),
            mode: self.mode,
            created_at: self.created_at,
            last_used_at: self.last_used.lock().at,
        }
    }
}

#[derive(Default)]
struct RegistryState {
    sessions: HashMap<SessionId, Arc<SessionEntry>>,
    pending: HashMap<AccountId, usize>,
}

impl RegistryState {
    fn live_for(&self, account_id: &AccountId) -> usize {
        let live = self
            .sessions
            .values()
            .filter(|s| &s.account_id == account_id)
            .count();
        live + self.pending.get(account_id).copied().unwrap_or(0)
    }

    fn live_total(&self) -> usize {
        self.sessions.len() + self.pending.values().sum::<usize>()
    }

    fn release_pending(&mut self, account_id: &AccountId) {
        if let Some(count) = self.pending.get_mut(account_id) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                self.pending.remove(account_id);
            }
        }
    }
}

/// Holds a connect slot until the backend answers. Dropping it (including
/// when the connect future is cancelled) gives the slot back; committing
/// turns it into a live session.
struct Reservation<'a> {
    registry: &'a SessionRegistry,
    account_id: AccountId,
    armed: bool,
}

impl Reservation<'_> {
    /// Insert the session and release the slot under one lock, so the
    /// session is never counted twice.
    fn commit(mut self, entry: &Arc<SessionEntry>) {
        let mut state = self.registry.state.write();
        state.sessions.insert(entry.id.clone(), Arc::clone(entry));
        state.release_pending(&self.account_id);
        self.armed = false;
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.registry.state.write().release_pending(&self.account_id);
        }
    }
}

// =============================================================================
// Session Registry
// =============================================================================

/// Owns and serializes access to trading backend connections.
pub struct SessionRegistry {
    backend: Arc<dyn TradingBackend>,
    mode: Mode,
    config: SessionConfig,
    state: RwLock<RegistryState>,
}

impl SessionRegistry {
    /// Create a registry opening connections through `backend`. Every
    /// session created by this registry captures `mode`.
    #[must_use]
    pub fn new(backend: Arc<dyn TradingBackend>, mode: Mode, config: SessionConfig) -> Self {
        Self {
            backend,
            mode,
            config,
            state: RwLock::new(RegistryState::default()),
        }
    }

    /// Registry limits.
    #[must_use]
    pub const fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Open a new backend connection for an account.
    ///
    /// # Errors
    ///
    /// - `LimitExceeded` when the global or per-account cap is reached
    /// - `Timeout` when the backend does not answer within `timeout`
    /// - `Upstream` when the backend refuses the connection
    pub async fn connect(
        &self,
        account_id: AccountId,
        credentials: &AccountCredentials,
        timeout: Duration,
    ) -> Result<SessionInfo, GatewayError> {
        let reservation = self.reserve(&account_id)?;

        let opened = tokio::time::timeout(timeout, self.backend.open(&account_id, credentials))
            .await
            .map_err(|_| GatewayError::Timeout(timeout))??;

        let now = LastUsed::now();
        let entry = Arc::new(SessionEntry {
            id: SessionId::generate(),
            account_id,
            mode: self.mode,
            created_at: now.at,
            state: RwLock::new(SessionState::Connected),
            last_used: Mutex::new(now),
            lane: Arc::new(AsyncMutex::new(Some(opened))),
        });

        reservation.commit(&entry);

        metrics::record_session_opened(self.mode);
        metrics::set_active_sessions(self.count());
        tracing::info!(
            session_id = %entry.id,
            account_id = %entry.account_id,
            mode = %self.mode,
            "Session connected"
        );

        Ok(entry.info())
    }

    fn reserve(&self, account_id: &AccountId) -> Result<Reservation<'_>, GatewayError> {
        let mut state = self.state.write();
        if state.live_total() >= self.config.max_sessions {
            return Err(GatewayError::LimitExceeded(format!(
                "maximum of {} sessions reached",
                self.config.max_sessions
            )));
        }
        if state.live_for(account_id) >= self.config.max_sessions_per_account {
            return Err(GatewayError::LimitExceeded(format!(
                "account {account_id} already has {} sessions",
                self.config.max_sessions_per_account
            )));
        }
        *state.pending.entry(account_id.clone()).or_insert(0) += 1;
        Ok(Reservation {
            registry: self,
            account_id: account_id.clone(),
            armed: true,
        })
    }

    /// Run `operation` against the session's backend connection.
    ///
    /// Calls on the same session run one at a time in arrival order. The
    /// operation runs on its own task: if `timeout` expires while it is
    /// executing, the caller gets `Timeout` and the operation still runs
    /// to completion while holding the lane. A panic inside the operation
    /// releases the lane, marks the session as errored and surfaces as
    /// `Internal`.
    ///
    /// # Errors
    ///
    /// - `NotFound` for an unknown, disconnected or evicted session
    /// - `Upstream` when the session is in the error state or the backend fails
    /// - `Timeout` when the lane or the call exceeds `timeout`
    /// - `Internal` when the operation panics
    pub async fn with_session<T, F>(
        &self,
        session_id: &SessionId,
        timeout: Duration,
        operation: F,
    ) -> Result<T, GatewayError>
    where
        T: Send + 'static,
        F: for<'c> FnOnce(&'c mut dyn BackendConnection, Mode) -> BoxFuture<'c, Result<T, BackendError>>
            + Send
            + 'static,
    {
        let entry = self.resolve(session_id)?;
        entry.touch();

        let deadline = tokio::time::Instant::now() + timeout;
        let guard = tokio::time::timeout_at(deadline, Arc::clone(&entry.lane).lock_owned())
            .await
            .map_err(|_| GatewayError::Timeout(timeout))?;
        if guard.is_none() {
            return Err(GatewayError::session_not_found(session_id.as_str()));
        }

        let task_entry = Arc::clone(&entry);
        let task = tokio::spawn(async move {
            let mut guard = guard;
            let Some(connection) = guard.as_mut() else {
                return Err(BackendError::ConnectionLost("session closed".into()));
            };
            let result = operation(&mut **connection, task_entry.mode).await;
            if let Err(e) = &result {
                if e.is_connection_fatal() {
                    task_entry.set_state(SessionState::Error);
                }
            }
            task_entry.touch();
            result
        });

        match tokio::time::timeout_at(deadline, task).await {
            Err(_) => {
                tracing::warn!(
                    session_id = %session_id,
                    timeout_ms = timeout.as_millis(),
                    "Session call timed out; call continues in background"
                );
                Err(GatewayError::Timeout(timeout))
            }
            Ok(Err(join_error)) => {
                entry.set_state(SessionState::Error);
                tracing::error!(
                    session_id = %session_id,
                    error = %join_error,
                    "Session call aborted"
                );
                Err(GatewayError::Internal(format!(
                    "session call aborted: {join_error}"
                )))
            }
            Ok(Ok(result)) => result.map_err(GatewayError::from),
        }
    }

    fn resolve(&self, session_id: &SessionId) -> Result<Arc<SessionEntry>, GatewayError> {
        let entry = self
            .state
            .read()
            .sessions
            .get(session_id)
            .cloned()
            .ok_or_else(|| GatewayError::session_not_found(session_id.as_str()))?;

        match entry.state() {
            SessionState::Connected => Ok(entry),
            SessionState::Error => Err(BackendError::ConnectionLost(format!(
                "session {session_id} is in error state; disconnect and reconnect"
            ))
            .into()),
            SessionState::Connecting | SessionState::Disconnected => {
                Err(GatewayError::session_not_found(session_id.as_str()))
            }
        }
    }

    /// Release a session's connection and invalidate its id.
    ///
    /// Waits for the call currently holding the lane, if any. Callers that
    /// queued behind the disconnect observe `NotFound`.
    ///
    /// # Errors
    ///
    /// - `NotFound` for an unknown or already closed session
    /// - `Timeout` if the in-flight call does not finish within `timeout`;
    ///   the session is left as it was
    pub async fn disconnect(
        &self,
        session_id: &SessionId,
        timeout: Duration,
    ) -> Result<(), GatewayError> {
        let entry = self
            .state
            .read()
            .sessions
            .get(session_id)
            .cloned()
            .ok_or_else(|| GatewayError::session_not_found(session_id.as_str()))?;

        let mut guard = tokio::time::timeout(timeout, Arc::clone(&entry.lane).lock_owned())
            .await
            .map_err(|_| GatewayError::Timeout(timeout))?;
        let Some(connection) = guard.take() else {
            return Err(GatewayError::session_not_found(session_id.as_str()));
        };

        self.release(&entry, connection).await;
        drop(guard);
        self.forget(session_id);

        tracing::info!(session_id = %session_id, account_id = %entry.account_id, "Session disconnected");
        Ok(())
    }

    /// Close every session that has been idle longer than the configured
    /// timeout. Sessions whose lane is busy are skipped.
    pub async fn evict_idle(&self) -> Vec<SessionId> {
        let idle_timeout = self.config.idle_timeout;
        let candidates: Vec<Arc<SessionEntry>> = self
            .state
            .read()
            .sessions
            .values()
            .filter(|s| s.idle_for() >= idle_timeout)
            .cloned()
            .collect();

        let mut evicted = Vec::new();
        for entry in candidates {
            let Ok(mut guard) = Arc::clone(&entry.lane).try_lock_owned() else {
                continue;
            };
            // A call may have arrived between the scan and the lock.
            if entry.idle_for() < idle_timeout {
                continue;
            }
            let Some(connection) = guard.take() else {
                continue;
            };

            self.release(&entry, connection).await;
            drop(guard);
            self.forget(&entry.id);

            metrics::record_session_evicted();
            tracing::info!(
                session_id = %entry.id,
                account_id = %entry.account_id,
                idle_secs = entry.idle_for().as_secs(),
                "Idle session evicted"
            );
            evicted.push(entry.id.clone());
        }
        evicted
    }

    /// Spawn a task that runs [`Self::evict_idle`] every `interval` until
    /// `cancel` fires.
    pub fn spawn_idle_sweeper(
        self: &Arc<Self>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    () = cancel.cancelled() => {
                        tracing::debug!("Idle session sweeper cancelled");
                        break;
                    }
                    _ = ticker.tick() => {
                        let evicted = registry.evict_idle().await;
                        if !evicted.is_empty() {
                            tracing::debug!(count = evicted.len(), "Idle sweep finished");
                        }
                    }
                }
            }
        })
    }

    /// Disconnect every session, waiting up to `timeout` for each.
    pub async fn close_all(&self, timeout: Duration) {
        let ids: Vec<SessionId> = self.state.read().sessions.keys().cloned().collect();
        for id in ids {
            if let Err(e) = self.disconnect(&id, timeout).await {
                tracing::warn!(session_id = %id, error = %e, "Failed to close session on shutdown");
            }
        }
    }

    async fn release(&self, entry: &SessionEntry, mut connection: Box<dyn BackendConnection>) {
        entry.set_state(SessionState::Disconnected);
        if let Err(e) = connection.close().await {
            tracing::warn!(session_id = %entry.id, error = %e, "Backend close failed");
        }
        metrics::record_session_closed(self.mode);
    }

    fn forget(&self, session_id: &SessionId) {
        self.state.write().sessions.remove(session_id);
        metrics::set_active_sessions(self.count());
    }

    /// Snapshot of one session.
    #[must_use]
    pub fn info(&self, session_id: &SessionId) -> Option<SessionInfo> {
        self.state
            .read()
            .sessions
            .get(session_id)
            .map(|entry| entry.info())
    }

    /// Snapshots of all sessions, oldest first.
    #[must_use]
    pub fn list(&self) -> Vec<SessionInfo> {
        let mut infos: Vec<SessionInfo> = self
            .state
            .read()
            .sessions
            .values()
            .map(|entry| entry.info())
            .collect();
        infos.sort_by_key(|i| i.created_at);
        infos
    }

    /// Number of registered sessions.
    #[must_use]
    pub fn count(&self) -> usize {
        self.state.read().sessions.len()
    }

    /// Number of registered sessions for an account.
    #[must_use]
    pub fn count_for(&self, account_id: &AccountId) -> usize {
        self.state
            .read()
            .sessions
            .values()
            .filter(|s| &s.account_id == account_id)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::application::ports::{BackendKind, MockBackendConnection};
    use crate::domain::error::ResourceKind;

    const T: Duration = Duration::from_secs(2);

    /// Backend whose connections are mockall mocks that accept `close`.
    struct MockBackend {
        opened: AtomicUsize,
        closed: Arc<AtomicUsize>,
    }

    impl MockBackend {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                opened: AtomicUsize::new(0),
                closed: Arc::new(AtomicUsize::new(0)),
            })
        }
    }

    #[async_trait]
    impl TradingBackend for MockBackend {
        fn kind(&self) -> BackendKind {
            BackendKind::Simulated
        }

        async fn open(
            &self,
            account_id: &AccountId,
            _credentials: &AccountCredentials,
        ) -> Result<Box<dyn BackendConnection>, BackendError> {
            if account_id.as_str() == "refused" {
                return Err(BackendError::rejected("AUTH", "bad password"));
            }
            self.opened.fetch_add(1, Ordering::SeqCst);
            let closed = Arc::clone(&self.closed);
            let mut conn = MockBackendConnection::new();
            conn.expect_close().returning(move || {
                closed.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
            conn.expect_trades().returning(|| Ok(Vec::new()));
            conn.expect_orders()
                .returning(|| Err(BackendError::ConnectionLost("socket reset".into())));
            Ok(Box::new(conn))
        }
    }

    fn registry(backend: Arc<MockBackend>, config: SessionConfig) -> Arc<SessionRegistry> {
        Arc::new(SessionRegistry::new(backend, Mode::Mock, config))
    }

    fn account(id: &str) -> AccountId {
        AccountId::parse(id).unwrap()
    }

    async fn connect(registry: &SessionRegistry, id: &str) -> Result<SessionId, GatewayError> {
        registry
            .connect(account(id), &AccountCredentials::new("pw"), T)
            .await
            .map(|info| info.session_id)
    }

    #[tokio::test]
    async fn connect_opens_one_connection_per_call() {
        let backend = MockBackend::new();
        let registry = registry(Arc::clone(&backend), SessionConfig::default());

        let a = connect(&registry, "acct").await.unwrap();
        let b = connect(&registry, "acct").await.unwrap();

        assert_ne!(a, b);
        assert_eq!(backend.opened.load(Ordering::SeqCst), 2);
        assert_eq!(registry.count_for(&account("acct")), 2);
        assert_eq!(registry.info(&a).unwrap().mode, Mode::Mock);
    }

    #[tokio::test]
    async fn per_account_cap_is_a_limit_error() {
        let registry = registry(
            MockBackend::new(),
            SessionConfig {
                max_sessions_per_account: 1,
                ..SessionConfig::default()
            },
        );

        connect(&registry, "acct").await.unwrap();
        let err = connect(&registry, "acct").await.unwrap_err();
        assert!(matches!(err, GatewayError::LimitExceeded(_)));

        // Other accounts are unaffected.
        connect(&registry, "other").await.unwrap();
    }

    #[tokio::test]
    async fn refused_connect_releases_reservation() {
        let registry = registry(
            MockBackend::new(),
            SessionConfig {
                max_sessions_per_account: 1,
                ..SessionConfig::default()
            },
        );

        let err = connect(&registry, "refused").await.unwrap_err();
        assert!(matches!(err, GatewayError::Upstream(BackendError::Rejected { .. })));
        let err = connect(&registry, "refused").await.unwrap_err();
        assert!(matches!(err, GatewayError::Upstream(_)));
        assert_eq!(registry.count(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn connect_never_counts_a_session_twice() {
        use std::sync::atomic::AtomicBool;

        let registry = registry(
            MockBackend::new(),
            SessionConfig {
                max_sessions_per_account: 2,
                ..SessionConfig::default()
            },
        );
        connect(&registry, "acct").await.unwrap();

        let stop = Arc::new(AtomicBool::new(false));
        let watcher = {
            let registry = Arc::clone(&registry);
            let stop = Arc::clone(&stop);
            std::thread::spawn(move || {
                let mut highest = 0;
                while !stop.load(Ordering::SeqCst) {
                    highest = highest.max(registry.state.read().live_for(&account("acct")));
                }
                highest
            })
        };

        for _ in 0..200 {
            let id = connect(&registry, "acct").await.unwrap();
            registry.disconnect(&id, T).await.unwrap();
        }
        stop.store(true, Ordering::SeqCst);

        assert!(watcher.join().unwrap() <= 2);
        let state = registry.state.read();
        assert!(state.pending.is_empty());
        assert_eq!(state.live_for(&account("acct")), 1);
    }

    #[tokio::test]
    async fn double_disconnect_is_not_found() {
        let backend = MockBackend::new();
        let registry = registry(Arc::clone(&backend), SessionConfig::default());
        let id = connect(&registry, "acct").await.unwrap();

        registry.disconnect(&id, T).await.unwrap();
        let err = registry.disconnect(&id, T).await.unwrap_err();

        assert!(err.is_not_found(ResourceKind::Session));
        assert_eq!(backend.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn with_session_on_unknown_id_is_not_found() {
        let registry = registry(MockBackend::new(), SessionConfig::default());
        let err = registry
            .with_session(&SessionId::from("sess_missing"), T, |conn, _| conn.trades())
            .await
            .unwrap_err();
        assert!(err.is_not_found(ResourceKind::Session));
    }

    #[tokio::test]
    async fn connection_loss_moves_session_to_error() {
        let registry = registry(MockBackend::new(), SessionConfig::default());
        let id = connect(&registry, "acct").await.unwrap();

        let err = registry
            .with_session(&id, T, |conn, _| conn.orders())
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Upstream(BackendError::ConnectionLost(_))));
        assert_eq!(registry.info(&id).unwrap().state, SessionState::Error);

        // Fails fast afterwards, but can still be disconnected.
        let err = registry
            .with_session(&id, T, |conn, _| conn.trades())
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Upstream(_)));
        registry.disconnect(&id, T).await.unwrap();
    }

    #[tokio::test]
    async fn panicking_operation_is_contained() {
        let registry = registry(MockBackend::new(), SessionConfig::default());
        let id = connect(&registry, "acct").await.unwrap();

        fn explode(
            _conn: &mut dyn BackendConnection,
            _mode: Mode,
        ) -> BoxFuture<'_, Result<(), BackendError>> {
            Box::pin(async { panic!("boom") })
        }

        let err = registry.with_session(&id, T, explode).await.unwrap_err();

        assert!(matches!(err, GatewayError::Internal(_)));
        assert_eq!(registry.info(&id).unwrap().state, SessionState::Error);
        // Lane was released, so disconnect does not hang.
        registry.disconnect(&id, T).await.unwrap();
    }

    #[tokio::test]
    async fn idle_sessions_are_evicted() {
        let backend = MockBackend::new();
        let registry = registry(
            Arc::clone(&backend),
            SessionConfig {
                idle_timeout: Duration::from_millis(30),
                ..SessionConfig::default()
            },
        );
        let id = connect(&registry, "acct").await.unwrap();

        assert!(registry.evict_idle().await.is_empty());
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(registry.evict_idle().await, vec![id.clone()]);

        let err = registry
            .with_session(&id, T, |conn, _| conn.trades())
            .await
            .unwrap_err();
        assert!(err.is_not_found(ResourceKind::Session));
        assert_eq!(backend.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn sweeper_stops_on_cancel() {
        let registry = registry(MockBackend::new(), SessionConfig::default());
        let cancel = CancellationToken::new();
        let handle = registry.spawn_idle_sweeper(Duration::from_millis(10), cancel.clone());
        cancel.cancel();
        tokio::time::timeout(T, handle).await.unwrap().unwrap();
    }
}

//! Trading Service
//!
//! Composes the session registry and the mode gate into the operations the
//! delivery surfaces call. Every backend call goes through
//! [`SessionRegistry::with_session`]; mutations additionally pass through
//! the [`ModeGate`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use serde::Serialize;

use super::mode_gate::ModeGate;
use super::session_registry::SessionRegistry;
use crate::application::ports::{BackendConnection, TradingEventSink};
use crate::domain::error::{BackendError, GatewayError};
use crate::domain::mode::Mode;
use crate::domain::session::{AccountCredentials, AccountId, SessionId, SessionInfo};
use crate::domain::trading::{
    AccountInfo, AssetInfo, CancelRequest, CancelResponse, OrderInfo, OrderRequest, OrderResponse,
    PositionInfo, RiskSnapshot, TradeInfo, TradingEvent, TradingEventKind,
};
use crate::infrastructure::metrics;

/// Result of a successful connect.
#[derive(Debug, Clone, Serialize)]
pub struct Connected {
    /// The new session.
    #[serde(flatten)]
    pub session: SessionInfo,
    /// Account summary fetched right after connecting.
    pub account: AccountInfo,
}

/// Session-scoped trading operations.
pub struct TradingService {
    registry: Arc<SessionRegistry>,
    gate: Arc<ModeGate>,
    events: Option<Arc<dyn TradingEventSink>>,
    call_timeout: Duration,
}

impl TradingService {
    /// Create a service. `call_timeout` bounds every backend call,
    /// including the wait for the session's lane.
    #[must_use]
    pub fn new(registry: Arc<SessionRegistry>, gate: Arc<ModeGate>, call_timeout: Duration) -> Self {
        Self {
            registry,
            gate,
            events: None,
            call_timeout,
        }
    }

    /// Publish connect, disconnect and mutation failures to `sink`.
    #[must_use]
    pub fn with_events(mut self, sink: Arc<dyn TradingEventSink>) -> Self {
        self.events = Some(sink);
        self
    }

    /// The process mode.
    #[must_use]
    pub fn mode(&self) -> Mode {
        self.gate.mode()
    }

    /// The underlying registry.
    #[must_use]
    pub const fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Open a session and return it with the account summary.
    ///
    /// If the account summary cannot be fetched the new session is closed
    /// again, so a failed connect never leaks a connection.
    ///
    /// # Errors
    ///
    /// Everything [`SessionRegistry::connect`] returns, plus the error of
    /// the initial account fetch.
    pub async fn connect(
        &self,
        account_id: AccountId,
        credentials: &AccountCredentials,
    ) -> Result<Connected, GatewayError> {
        let session = self
            .registry
            .connect(account_id, credentials, self.call_timeout)
            .await?;

        let account = match self
            .call(&session.session_id, "account", |conn, _| conn.account())
            .await
        {
            Ok(account) => account,
            Err(e) => {
                tracing::warn!(
                    session_id = %session.session_id,
                    error = %e,
                    "Account fetch after connect failed, closing session"
                );
                if let Err(close_err) = self
                    .registry
                    .disconnect(&session.session_id, self.call_timeout)
                    .await
                {
                    tracing::warn!(session_id = %session.session_id, error = %close_err, "Cleanup disconnect failed");
                }
                return Err(e);
            }
        };

        self.emit(&session.account_id, TradingEventKind::Connected);
        Ok(Connected { session, account })
    }

    /// Close a session.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown or already closed session.
    pub async fn disconnect(&self, session_id: &SessionId) -> Result<(), GatewayError> {
        let account_id = self.registry.info(session_id).map(|info| info.account_id);
        self.registry
            .disconnect(session_id, self.call_timeout)
            .await?;
        if let Some(account_id) = account_id {
            self.emit(&account_id, TradingEventKind::Disconnected);
        }
        Ok(())
    }

    /// Snapshot of a session.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown session.
    pub fn status(&self, session_id: &SessionId) -> Result<SessionInfo, GatewayError> {
        self.registry
            .info(session_id)
            .ok_or_else(|| GatewayError::session_not_found(session_id.as_str()))
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Account summary.
    ///
    /// # Errors
    ///
    /// See [`SessionRegistry::with_session`].
    pub async fn account(&self, session_id: &SessionId) -> Result<AccountInfo, GatewayError> {
        self.call(session_id, "account", |conn, _| conn.account()).await
    }

    /// Asset snapshot.
    ///
    /// # Errors
    ///
    /// See [`SessionRegistry::with_session`].
    pub async fn asset(&self, session_id: &SessionId) -> Result<AssetInfo, GatewayError> {
        self.call(session_id, "asset", |conn, _| conn.asset()).await
    }

    /// Current positions.
    ///
    /// # Errors
    ///
    /// See [`SessionRegistry::with_session`].
    pub async fn positions(&self, session_id: &SessionId) -> Result<Vec<PositionInfo>, GatewayError> {
        self.call(session_id, "positions", |conn, _| conn.positions())
            .await
    }

    /// Orders placed today.
    ///
    /// # Errors
    ///
    /// See [`SessionRegistry::with_session`].
    pub async fn orders(&self, session_id: &SessionId) -> Result<Vec<OrderInfo>, GatewayError> {
        self.call(session_id, "orders", |conn, _| conn.orders()).await
    }

    /// Executions today.
    ///
    /// # Errors
    ///
    /// See [`SessionRegistry::with_session`].
    pub async fn trades(&self, session_id: &SessionId) -> Result<Vec<TradeInfo>, GatewayError> {
        self.call(session_id, "trades", |conn, _| conn.trades()).await
    }

    /// Position and cash ratios derived from the asset snapshot.
    ///
    /// # Errors
    ///
    /// See [`SessionRegistry::with_session`].
    pub async fn risk(&self, session_id: &SessionId) -> Result<RiskSnapshot, GatewayError> {
        let asset = self.asset(session_id).await?;
        Ok(RiskSnapshot::from_asset(&asset))
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Submit an order. Upstream failures are returned as-is and never
    /// retried.
    ///
    /// # Errors
    ///
    /// `Validation` for a malformed request, otherwise see
    /// [`SessionRegistry::with_session`].
    pub async fn submit_order(
        &self,
        session_id: &SessionId,
        request: OrderRequest,
    ) -> Result<OrderResponse, GatewayError> {
        request.validate()?;
        let gate = Arc::clone(&self.gate);
        let result = self
            .call(session_id, "submit_order", move |conn, mode| {
                async move { gate.submit_order(mode, conn, &request).await }.boxed()
            })
            .await;

        if let Err(e) = &result {
            self.emit_for(
                session_id,
                TradingEventKind::OrderError {
                    order_id: None,
                    message: e.to_string(),
                },
            );
        }
        result
    }

    /// Cancel an order. Upstream failures are returned as-is and never
    /// retried.
    ///
    /// # Errors
    ///
    /// `Validation` for a malformed request, otherwise see
    /// [`SessionRegistry::with_session`].
    pub async fn cancel_order(
        &self,
        session_id: &SessionId,
        request: CancelRequest,
    ) -> Result<CancelResponse, GatewayError> {
        request.validate()?;
        let order_id = request.order_id.clone();
        let gate = Arc::clone(&self.gate);
        let result = self
            .call(session_id, "cancel_order", move |conn, mode| {
                async move { gate.cancel_order(mode, conn, &request).await }.boxed()
            })
            .await;

        if let Err(e) = &result {
            self.emit_for(
                session_id,
                TradingEventKind::CancelError {
                    order_id,
                    message: e.to_string(),
                },
            );
        }
        result
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    async fn call<T, F>(
        &self,
        session_id: &SessionId,
        operation: &'static str,
        f: F,
    ) -> Result<T, GatewayError>
    where
        T: Send + 'static,
        F: for<'c> FnOnce(
                &'c mut dyn BackendConnection,
                Mode,
            ) -> futures::future::BoxFuture<'c, Result<T, BackendError>>
            + Send
            + 'static,
    {
        let started = Instant::now();
        let result = self
            .registry
            .with_session(session_id, self.call_timeout, f)
            .await;
        metrics::record_trading_call(operation, &result, started.elapsed());
        if let Err(e) = &result {
            tracing::debug!(session_id = %session_id, operation, error = %e, "Trading call failed");
        }
        result
    }

    fn emit_for(&self, session_id: &SessionId, kind: TradingEventKind) {
        if let Some(info) = self.registry.info(session_id) {
            self.emit(&info.account_id, kind);
        }
    }

    fn emit(&self, account_id: &AccountId, kind: TradingEventKind) {
        if let Some(sink) = &self.events {
            sink.publish(TradingEvent::now(account_id.clone(), kind));
        }
    }
}

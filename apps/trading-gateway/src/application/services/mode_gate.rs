//! Mode Gate
//!
//! Applies the mock/dev/prod contract to mutating trading calls. Query
//! calls never pass through the gate.
//!
//! | Mode | Backend    | Submit / cancel                          |
//! |------|------------|------------------------------------------|
//! | mock | simulated  | executed against the simulated book      |
//! | dev  | live       | intercepted, synthetic flagged response  |
//! | prod | live       | passed through unmodified                |

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;

use crate::application::ports::{BackendConnection, BackendKind};
use crate::domain::error::{BackendError, GatewayError};
use crate::domain::mode::Mode;
use crate::domain::trading::{
    CancelRequest, CancelResponse, OrderRequest, OrderResponse, OrderStatus,
};
use crate::infrastructure::metrics;

/// Enforces the trading mode on mutating calls.
#[derive(Debug)]
pub struct ModeGate {
    mode: Mode,
    intercept_seq: AtomicU64,
}

impl ModeGate {
    /// Create a gate for a fixed mode.
    #[must_use]
    pub const fn new(mode: Mode) -> Self {
        Self {
            mode,
            intercept_seq: AtomicU64::new(0),
        }
    }

    /// The mode this gate enforces.
    #[must_use]
    pub const fn mode(&self) -> Mode {
        self.mode
    }

    /// Check that a backend is allowed to serve this mode.
    ///
    /// # Errors
    ///
    /// Returns `Internal` when mock mode is given a live backend or
    /// dev/prod mode is given the simulation.
    pub fn check_backend(&self, kind: BackendKind) -> Result<(), GatewayError> {
        let expected = if self.mode.is_simulated() {
            BackendKind::Simulated
        } else {
            BackendKind::Live
        };
        if kind == expected {
            Ok(())
        } else {
            Err(GatewayError::Internal(format!(
                "{} mode requires a {expected} backend, got {kind}",
                self.mode
            )))
        }
    }

    /// Submit an order according to the session's captured mode.
    ///
    /// # Errors
    ///
    /// Returns the backend error verbatim when the call is passed through.
    pub async fn submit_order(
        &self,
        session_mode: Mode,
        connection: &mut dyn BackendConnection,
        request: &OrderRequest,
    ) -> Result<OrderResponse, BackendError> {
        if session_mode.intercepts_mutations() {
            metrics::record_intercepted("submit_order");
            tracing::info!(
                symbol = %request.symbol,
                side = ?request.side,
                volume = request.volume,
                "Order intercepted"
            );
            return Ok(self.intercepted_order(request));
        }
        connection.submit_order(request).await
    }

    /// Cancel an order according to the session's captured mode.
    ///
    /// # Errors
    ///
    /// Returns the backend error verbatim when the call is passed through.
    pub async fn cancel_order(
        &self,
        session_mode: Mode,
        connection: &mut dyn BackendConnection,
        request: &CancelRequest,
    ) -> Result<CancelResponse, BackendError> {
        if session_mode.intercepts_mutations() {
            metrics::record_intercepted("cancel_order");
            tracing::info!(order_id = %request.order_id, "Cancel intercepted");
            return Ok(CancelResponse {
                order_id: request.order_id.clone(),
                success: true,
                intercepted: true,
                message: Some(format!("cancel intercepted in {session_mode} mode")),
            });
        }
        connection.cancel_order(request).await
    }

    fn intercepted_order(&self, request: &OrderRequest) -> OrderResponse {
        let seq = self.intercept_seq.fetch_add(1, Ordering::Relaxed) + 1;
        OrderResponse {
            order_id: format!("intercepted_{seq}"),
            symbol: request.symbol.clone(),
            side: request.side,
            volume: request.volume,
            price: request.price,
            status: OrderStatus::Submitted,
            submitted_at: Utc::now(),
            intercepted: true,
            message: Some(format!("order intercepted in {} mode", Mode::Dev)),
        }
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;
    use crate::application::ports::MockBackendConnection;
    use crate::domain::streaming::Symbol;
    use crate::domain::trading::OrderSide;

    fn order() -> OrderRequest {
        OrderRequest::limit(
            Symbol::parse("000001.SZ").unwrap(),
            OrderSide::Buy,
            100,
            Decimal::new(1250, 2),
        )
    }

    fn accepted(request: &OrderRequest) -> OrderResponse {
        OrderResponse {
            order_id: "real_1".into(),
            symbol: request.symbol.clone(),
            side: request.side,
            volume: request.volume,
            price: request.price,
            status: OrderStatus::Submitted,
            submitted_at: Utc::now(),
            intercepted: false,
            message: None,
        }
    }

    #[tokio::test]
    async fn dev_never_reaches_backend() {
        let gate = ModeGate::new(Mode::Dev);
        let mut conn = MockBackendConnection::new();
        conn.expect_submit_order().never();
        conn.expect_cancel_order().never();

        let response = gate.submit_order(Mode::Dev, &mut conn, &order()).await.unwrap();
        assert!(response.intercepted);
        assert_eq!(response.order_id, "intercepted_1");

        let cancel = gate
            .cancel_order(
                Mode::Dev,
                &mut conn,
                &CancelRequest {
                    order_id: response.order_id,
                },
            )
            .await
            .unwrap();
        assert!(cancel.intercepted);
    }

    #[tokio::test]
    async fn prod_passes_through_unmodified() {
        let gate = ModeGate::new(Mode::Prod);
        let request = order();
        let expected = accepted(&request);
        let returned = expected.clone();

        let mut conn = MockBackendConnection::new();
        conn.expect_submit_order()
            .times(1)
            .returning(move |_| Ok(returned.clone()));

        let response = gate
            .submit_order(Mode::Prod, &mut conn, &request)
            .await
            .unwrap();
        assert_eq!(response, expected);
    }

    #[tokio::test]
    async fn prod_surfaces_upstream_failure_once() {
        let gate = ModeGate::new(Mode::Prod);
        let mut conn = MockBackendConnection::new();
        conn.expect_submit_order()
            .times(1)
            .returning(|_| Err(BackendError::rejected("E1001", "price out of band")));

        let err = gate
            .submit_order(Mode::Prod, &mut conn, &order())
            .await
            .unwrap_err();
        assert_eq!(err, BackendError::rejected("E1001", "price out of band"));
    }

    #[test]
    fn backend_kind_must_match_mode() {
        assert!(ModeGate::new(Mode::Mock).check_backend(BackendKind::Simulated).is_ok());
        assert!(ModeGate::new(Mode::Mock).check_backend(BackendKind::Live).is_err());
        assert!(ModeGate::new(Mode::Dev).check_backend(BackendKind::Live).is_ok());
        assert!(ModeGate::new(Mode::Prod).check_backend(BackendKind::Simulated).is_err());
    }
}

//! Gateway Error Taxonomy
//!
//! Every fallible gateway operation returns [`GatewayError`]. Backend
//! faults are wrapped verbatim in [`GatewayError::Upstream`] and are
//! never retried by the gateway itself.
//!
//! Dev-mode interception is not an error: intercepted mutations succeed
//! and carry `intercepted = true` on their response DTO.

use std::fmt;
use std::time::Duration;

// =============================================================================
// Resource Kind
// =============================================================================

/// Kind of resource a lookup failed to find.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    /// A trading session.
    Session,
    /// A market data subscription.
    Subscription,
    /// An order known to a session.
    Order,
}

impl ResourceKind {
    /// Get the string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Session => "session",
            Self::Subscription => "subscription",
            Self::Order => "order",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Backend Error
// =============================================================================

/// Errors reported by a trading backend connection.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    /// The backend refused the request.
    #[error("rejected by backend ({code}): {message}")]
    Rejected {
        /// Backend error code.
        code: String,
        /// Backend error message.
        message: String,
    },

    /// The connection to the backend dropped.
    #[error("backend connection lost: {0}")]
    ConnectionLost(String),

    /// The backend could not be reached.
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    /// The backend answered with something unparseable.
    #[error("backend protocol error: {0}")]
    Protocol(String),
}

impl BackendError {
    /// Create a rejection error.
    #[must_use]
    pub fn rejected(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Rejected {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Whether the connection that produced this error is unusable afterwards.
    #[must_use]
    pub const fn is_connection_fatal(&self) -> bool {
        matches!(self, Self::ConnectionLost(_))
    }
}

// =============================================================================
// Gateway Error
// =============================================================================

/// Errors returned by gateway operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    /// Malformed input.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Unknown or expired session, subscription or order.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// What was looked up.
        kind: ResourceKind,
        /// The identifier that did not resolve.
        id: String,
    },

    /// Strict duplicate request.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// A session or subscription cap was hit.
    #[error("limit exceeded: {0}")]
    LimitExceeded(String),

    /// A queue or backend call deadline passed.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// The backend returned an error or dropped.
    #[error("upstream failure: {0}")]
    Upstream(#[from] BackendError),

    /// An invariant was violated inside the gateway.
    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Create a validation error.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a not-found error for a session.
    #[must_use]
    pub fn session_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: ResourceKind::Session,
            id: id.into(),
        }
    }

    /// Create a not-found error for a subscription.
    #[must_use]
    pub fn subscription_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: ResourceKind::Subscription,
            id: id.into(),
        }
    }

    /// Whether this is a not-found error for the given resource kind.
    #[must_use]
    pub fn is_not_found(&self, expected: ResourceKind) -> bool {
        matches!(self, Self::NotFound { kind, .. } if *kind == expected)
    }

    /// Stable machine-readable code for transport adapters.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::AlreadyExists(_) => "ALREADY_EXISTS",
            Self::LimitExceeded(_) => "LIMIT_EXCEEDED",
            Self::Timeout(_) => "TIMEOUT",
            Self::Upstream(_) => "UPSTREAM_FAILURE",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(GatewayError::validation("x"), "VALIDATION_ERROR")]
    #[test_case(GatewayError::session_not_found("s"), "NOT_FOUND")]
    #[test_case(GatewayError::AlreadyExists("x".into()), "ALREADY_EXISTS")]
    #[test_case(GatewayError::LimitExceeded("x".into()), "LIMIT_EXCEEDED")]
    #[test_case(GatewayError::Timeout(Duration::from_secs(1)), "TIMEOUT")]
    #[test_case(BackendError::Unavailable("x".into()).into(), "UPSTREAM_FAILURE")]
    #[test_case(GatewayError::Internal("x".into()), "INTERNAL_ERROR")]
    fn error_codes(err: GatewayError, code: &str) {
        assert_eq!(err.code(), code);
    }

    #[test]
    fn not_found_matches_kind() {
        let err = GatewayError::session_not_found("sess_1");
        assert!(err.is_not_found(ResourceKind::Session));
        assert!(!err.is_not_found(ResourceKind::Subscription));
        assert_eq!(err.to_string(), "session not found: sess_1");
    }

    #[test]
    fn upstream_wraps_backend_error_verbatim() {
        let err: GatewayError = BackendError::rejected("E42", "insufficient funds").into();
        assert_eq!(
            err.to_string(),
            "upstream failure: rejected by backend (E42): insufficient funds"
        );
    }

    #[test]
    fn only_connection_loss_is_fatal() {
        assert!(BackendError::ConnectionLost("eof".into()).is_connection_fatal());
        assert!(!BackendError::rejected("1", "no").is_connection_fatal());
        assert!(!BackendError::Unavailable("down".into()).is_connection_fatal());
    }
}

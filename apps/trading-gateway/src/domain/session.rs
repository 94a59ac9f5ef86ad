//! Session Types
//!
//! Identifiers and state for trading sessions. The registry that owns
//! live sessions lives in the application layer.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::error::GatewayError;
use crate::domain::mode::Mode;

/// Maximum accepted account id length.
const MAX_ACCOUNT_ID_LEN: usize = 64;

// =============================================================================
// Identifiers
// =============================================================================

/// Brokerage account identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AccountId(String);

impl AccountId {
    /// Parse and validate an account id.
    ///
    /// # Errors
    ///
    /// Returns a validation error for an empty, overlong or non-printable id.
    pub fn parse(raw: &str) -> Result<Self, GatewayError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(GatewayError::validation("account_id must not be empty"));
        }
        if trimmed.len() > MAX_ACCOUNT_ID_LEN {
            return Err(GatewayError::validation(format!(
                "account_id exceeds {MAX_ACCOUNT_ID_LEN} characters"
            )));
        }
        if trimmed.chars().any(|c| c.is_control() || c.is_whitespace()) {
            return Err(GatewayError::validation(
                "account_id must not contain whitespace or control characters",
            ));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Get the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for AccountId {
    type Error = GatewayError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<AccountId> for String {
    fn from(value: AccountId) -> Self {
        value.0
    }
}

/// Opaque session token, safe to embed in URLs and JSON.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Generate a fresh session id.
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("sess_{}", uuid::Uuid::new_v4().simple()))
    }

    /// Get the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

// =============================================================================
// Credentials
// =============================================================================

/// Credentials presented on connect.
#[derive(Clone, Default, Deserialize)]
pub struct AccountCredentials {
    password: String,
}

impl AccountCredentials {
    /// Create credentials.
    #[must_use]
    pub fn new(password: impl Into<String>) -> Self {
        Self {
            password: password.into(),
        }
    }

    /// Get the password.
    #[must_use]
    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for AccountCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountCredentials")
            .field("password", &"[REDACTED]")
            .finish()
    }
}

// =============================================================================
// Session State
// =============================================================================

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Backend connection being opened.
    Connecting,
    /// Ready for calls.
    Connected,
    /// Closed; the id no longer resolves.
    Disconnected,
    /// The backend connection failed; only disconnect is accepted.
    Error,
}

impl SessionState {
    /// Get the string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Error => "error",
        }
    }
}

/// Serializable snapshot of a session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    /// Session token.
    pub session_id: SessionId,
    /// Account the session belongs to.
    pub account_id: AccountId,
    /// Current state.
    pub state: SessionState,
    /// Mode captured when the session was created.
    pub mode: Mode,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last time a call arrived for or completed on this session.
    pub last_used_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("55009640")]
    #[test_case("acct-01")]
    fn valid_account_ids(raw: &str) {
        assert_eq!(AccountId::parse(raw).unwrap().as_str(), raw);
    }

    #[test_case(""; "empty")]
    #[test_case("a b"; "space")]
    #[test_case("a\tb"; "tab")]
    fn invalid_account_ids(raw: &str) {
        assert!(AccountId::parse(raw).is_err());
    }

    #[test]
    fn session_ids_are_unique_and_url_safe() {
        let a = SessionId::generate();
        let b = SessionId::generate();
        assert_ne!(a, b);
        assert!(
            a.as_str()
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
        );
    }

    #[test]
    fn credentials_debug_redacts_password() {
        let creds = AccountCredentials::new("hunter2");
        let debug = format!("{creds:?}");
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("REDACTED"));
    }
}

//! Trading Mode
//!
//! Process-wide trading mode, fixed at startup.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Mode that decides how mutating trading calls are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Simulated backend; mutations hit a deterministic order book.
    Mock,
    /// Real backend for queries; mutations are intercepted.
    Dev,
    /// Everything passes through.
    Prod,
}

impl Mode {
    /// Get the string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Mock => "mock",
            Self::Dev => "dev",
            Self::Prod => "prod",
        }
    }

    /// Whether sessions in this mode use the simulated backend.
    #[must_use]
    pub const fn is_simulated(self) -> bool {
        matches!(self, Self::Mock)
    }

    /// Whether mutating calls are intercepted before reaching the backend.
    #[must_use]
    pub const fn intercepts_mutations(self) -> bool {
        matches!(self, Self::Dev)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for an unrecognized mode string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown mode: {0} (expected mock, dev or prod)")]
pub struct ParseModeError(String);

impl FromStr for Mode {
    type Err = ParseModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "mock" => Ok(Self::Mock),
            "dev" | "development" => Ok(Self::Dev),
            "prod" | "production" => Ok(Self::Prod),
            other => Err(ParseModeError(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("mock", Mode::Mock)]
    #[test_case("DEV", Mode::Dev)]
    #[test_case(" production ", Mode::Prod)]
    fn parses(raw: &str, expected: Mode) {
        assert_eq!(raw.parse::<Mode>().unwrap(), expected);
    }

    #[test]
    fn rejects_unknown() {
        let err = "staging".parse::<Mode>().unwrap_err();
        assert!(err.to_string().contains("staging"));
    }

    #[test]
    fn only_dev_intercepts() {
        assert!(!Mode::Mock.intercepts_mutations());
        assert!(Mode::Dev.intercepts_mutations());
        assert!(!Mode::Prod.intercepts_mutations());
        assert!(Mode::Mock.is_simulated());
    }

    #[test]
    fn serde_lowercase() {
        assert_eq!(serde_json::to_string(&Mode::Prod).unwrap(), "\"prod\"");
    }
}

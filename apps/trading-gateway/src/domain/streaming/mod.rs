//! Market Data Streaming Types
//!
//! Core domain types for the tick feed. A [`Tick`] is immutable once
//! published and is shared between subscriber queues behind an `Arc`.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::error::GatewayError;

/// Maximum accepted symbol length.
pub const MAX_SYMBOL_LEN: usize = 32;

// =============================================================================
// Symbol
// =============================================================================

/// An instrument code such as `AAPL` or `000001.SZ`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Symbol(String);

impl Symbol {
    /// Parse and validate a symbol.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the symbol is empty, too long or
    /// contains characters outside `[A-Za-z0-9._-/]`.
    pub fn parse(raw: &str) -> Result<Self, GatewayError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(GatewayError::validation("symbol must not be empty"));
        }
        if trimmed.len() > MAX_SYMBOL_LEN {
            return Err(GatewayError::validation(format!(
                "symbol exceeds {MAX_SYMBOL_LEN} characters: {trimmed}"
            )));
        }
        if let Some(bad) = trimmed
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-' | '/')))
        {
            return Err(GatewayError::validation(format!(
                "symbol {trimmed:?} contains invalid character {bad:?}"
            )));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Get the symbol as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Symbol {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Symbol {
    type Error = GatewayError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Symbol> for String {
    fn from(value: Symbol) -> Self {
        value.0
    }
}

// =============================================================================
// Tick
// =============================================================================

/// Quote fields carried by a tick.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickPayload {
    /// Last traded price.
    pub last_price: Decimal,
    /// Best bid.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bid_price: Option<Decimal>,
    /// Best ask.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ask_price: Option<Decimal>,
    /// Cumulative traded volume.
    #[serde(default)]
    pub volume: u64,
}

/// A timestamped market data update for one symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tick {
    /// Instrument.
    pub symbol: Symbol,
    /// Exchange or feed timestamp.
    pub timestamp: DateTime<Utc>,
    /// Monotonic per-symbol sequence assigned by the feed.
    pub sequence: u64,
    /// Quote fields.
    pub payload: TickPayload,
}

/// A published tick shared by every queue it was fanned out to.
pub type SharedTick = Arc<Tick>;

impl Tick {
    /// Create a tick stamped with the current time.
    #[must_use]
    pub fn new(symbol: Symbol, sequence: u64, payload: TickPayload) -> Self {
        Self {
            symbol,
            timestamp: Utc::now(),
            sequence,
            payload,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("AAPL"; "us ticker")]
    #[test_case("000001.SZ"; "exchange suffix")]
    #[test_case("BRK-B"; "dash")]
    #[test_case("  MSFT "; "surrounding whitespace")]
    fn valid_symbols(raw: &str) {
        let symbol = Symbol::parse(raw).unwrap();
        assert_eq!(symbol.as_str(), raw.trim());
    }

    #[test_case(""; "empty")]
    #[test_case("   "; "blank")]
    #[test_case("AA PL"; "inner space")]
    #[test_case("AAPL;DROP"; "semicolon")]
    #[test_case("ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789"; "too long")]
    fn invalid_symbols(raw: &str) {
        assert!(matches!(
            Symbol::parse(raw),
            Err(GatewayError::Validation(_))
        ));
    }

    #[test]
    fn symbol_serde_validates() {
        let ok: Symbol = serde_json::from_str("\"600000.SH\"").unwrap();
        assert_eq!(ok.to_string(), "600000.SH");
        assert!(serde_json::from_str::<Symbol>("\"\"").is_err());
    }

    #[test]
    fn tick_json_shape() {
        let tick = Tick::new(
            Symbol::parse("AAPL").unwrap(),
            7,
            TickPayload {
                last_price: Decimal::new(18525, 2),
                volume: 100,
                ..TickPayload::default()
            },
        );
        let json = serde_json::to_value(&tick).unwrap();
        assert_eq!(json["symbol"], "AAPL");
        assert_eq!(json["sequence"], 7);
        assert_eq!(json["payload"]["last_price"], "185.25");
        assert!(json["payload"].get("bid_price").is_none());
    }
}

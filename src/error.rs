//! Error taxonomy for the trading engine.
//!
//! Transport failures surface as `anyhow::Error` straight from the client.
//! Everything the engine itself can diagnose lands here.

use thiserror::Error;

/// Failures the engine classifies itself.
///
/// Status and parse failures only ever abandon the current cycle; the
/// symbol failure is fatal and only raised at startup.
#[derive(Debug, Error)]
pub enum TradeError {
    /// The exchange answered but with a non-zero application status.
    #[error("{endpoint} returned status {status}: {}", .msg.as_deref().unwrap_or("no message"))]
    Status {
        endpoint: &'static str,
        status: i64,
        msg: Option<String>,
    },

    /// Status was zero but the payload was absent.
    #[error("{0} returned no data")]
    MissingData(&'static str),

    /// A decimal string from the exchange could not be parsed.
    #[error("malformed {field} value {value:?}")]
    Parse { field: &'static str, value: String },

    /// The ticker array did not carry the expected number of fields.
    #[error("ticker has {0} fields, expected 11")]
    MalformedTicker(usize),

    /// No balance record has been observed for a currency of the pair.
    #[error("no balance record for {0}")]
    MissingBalance(String),

    /// The configured symbol cannot be split into two listed currencies.
    #[error("symbol {0} is not supported by the exchange")]
    UnsupportedSymbol(String),
}

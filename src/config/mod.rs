//! Configuration management for the pair trader.
//!
//! Loads settings from a config file and `FCT__` environment variables.

use crate::exchange::MAINNET_BASE_URL;
use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::info;

/// Lower bound for every polling interval.
pub const MIN_INTERVAL_MS: u64 = 500;

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// FCoin API credentials and transport settings
    #[serde(default)]
    pub fcoin: FcoinConfig,
    /// Pair and strategy parameters
    pub trading: TradingConfig,
    /// Loop cadences
    #[serde(default)]
    pub intervals: IntervalConfig,
    /// Stale order revocation
    #[serde(default)]
    pub order_monitor: OrderMonitorConfig,
    /// Log output
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FcoinConfig {
    /// API key for authentication
    #[serde(default)]
    pub api_key: String,
    /// Secret key for signing requests
    #[serde(default)]
    pub secret_key: String,
    /// REST endpoint root
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Per-request timeout
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

/// Which loop generates trades.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradingMode {
    /// Balance poller -> balance gate -> trade trigger
    Gated,
    /// Fixed-interval loop that checks balances and trades on every tick
    WashCycle,
}

impl Default for TradingMode {
    fn default() -> Self {
        TradingMode::WashCycle
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingConfig {
    /// Market symbol, e.g. "ftusdt"
    pub symbol: String,
    /// Base currency quantity per order
    pub sell_size: Decimal,
    /// Offset added to the best bid when pricing orders
    #[serde(default)]
    pub expect_value: Decimal,
    /// Share of `sell_size` moved by a one-sided make-up trade (1-100)
    #[serde(default = "default_make_up_percent")]
    pub make_up_percent: u32,
    /// Share of `sell_size` used when both sides are in surplus or both short (1-100)
    #[serde(default = "default_balance_percent")]
    pub balance_percent: u32,
    #[serde(default)]
    pub mode: TradingMode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntervalConfig {
    #[serde(default = "default_quote_ms")]
    pub quote_ms: u64,
    #[serde(default = "default_balance_ms")]
    pub balance_ms: u64,
    #[serde(default = "default_check_order_ms")]
    pub check_order_ms: u64,
    #[serde(default = "default_wash_cycle_ms")]
    pub wash_cycle_ms: u64,
    /// Config file reload period, 0 disables reloading
    #[serde(default)]
    pub reload_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderMonitorConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Orders older than this (relative to server time) get cancelled
    #[serde(default = "default_revoke_after_ms")]
    pub revoke_after_ms: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_directory")]
    pub directory: String,
    #[serde(default = "default_log_file_prefix")]
    pub file_prefix: String,
    /// `EnvFilter` directives, overridden by `RUST_LOG`
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

// Default value functions
fn default_base_url() -> String {
    MAINNET_BASE_URL.to_string()
}

fn default_request_timeout_ms() -> u64 {
    5000
}

fn default_make_up_percent() -> u32 {
    50
}

fn default_balance_percent() -> u32 {
    50
}

fn default_quote_ms() -> u64 {
    1000
}

fn default_balance_ms() -> u64 {
    2000
}

fn default_check_order_ms() -> u64 {
    5000
}

fn default_wash_cycle_ms() -> u64 {
    3000
}

fn default_revoke_after_ms() -> i64 {
    60_000
}

fn default_log_directory() -> String {
    "logs".to_string()
}

fn default_log_file_prefix() -> String {
    "fcoin-trader.log".to_string()
}

fn default_log_filter() -> String {
    "info,fcoin_trader=debug".to_string()
}

/// Clamp a configured interval to [`MIN_INTERVAL_MS`].
pub fn clamp_interval(name: &str, ms: u64) -> Duration {
    if ms < MIN_INTERVAL_MS {
        info!(
            interval = name,
            configured_ms = ms,
            "Interval below {}ms, using {}ms",
            MIN_INTERVAL_MS,
            MIN_INTERVAL_MS
        );
        return Duration::from_millis(MIN_INTERVAL_MS);
    }
    Duration::from_millis(ms)
}

impl IntervalConfig {
    pub fn quote(&self) -> Duration {
        clamp_interval("quote", self.quote_ms)
    }

    pub fn balance(&self) -> Duration {
        clamp_interval("balance", self.balance_ms)
    }

    pub fn check_order(&self) -> Duration {
        clamp_interval("check_order", self.check_order_ms)
    }

    pub fn wash_cycle(&self) -> Duration {
        clamp_interval("wash_cycle", self.wash_cycle_ms)
    }

    /// Reload period, `None` when reloading is disabled.
    pub fn reload(&self) -> Option<Duration> {
        (self.reload_ms > 0).then(|| clamp_interval("reload", self.reload_ms))
    }
}

impl Config {
    /// Load configuration from `path` (any extension `config` understands)
    /// and environment variables.
    pub fn load(path: &str) -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::default().separator("__").prefix("FCT"))
            .build()
            .with_context(|| format!("Failed to build configuration from {}", path))?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(!self.trading.symbol.trim().is_empty(), "symbol must be set");

        anyhow::ensure!(
            self.trading.sell_size > Decimal::ZERO,
            "sell_size must be positive"
        );

        anyhow::ensure!(
            (1..=100).contains(&self.trading.make_up_percent),
            "make_up_percent must be between 1 and 100"
        );

        anyhow::ensure!(
            (1..=100).contains(&self.trading.balance_percent),
            "balance_percent must be between 1 and 100"
        );

        anyhow::ensure!(
            self.order_monitor.revoke_after_ms >= 0,
            "revoke_after_ms must not be negative"
        );

        anyhow::ensure!(
            self.fcoin.request_timeout_ms > 0,
            "request_timeout_ms must be positive"
        );

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            fcoin: FcoinConfig::default(),
            trading: TradingConfig {
                symbol: "ftusdt".to_string(),
                sell_size: Decimal::new(10, 0),
                expect_value: Decimal::ZERO,
                make_up_percent: default_make_up_percent(),
                balance_percent: default_balance_percent(),
                mode: TradingMode::default(),
            },
            intervals: IntervalConfig::default(),
            order_monitor: OrderMonitorConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for FcoinConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            secret_key: String::new(),
            base_url: default_base_url(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl Default for IntervalConfig {
    fn default() -> Self {
        Self {
            quote_ms: default_quote_ms(),
            balance_ms: default_balance_ms(),
            check_order_ms: default_check_order_ms(),
            wash_cycle_ms: default_wash_cycle_ms(),
            reload_ms: 0,
        }
    }
}

impl Default for OrderMonitorConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            revoke_after_ms: default_revoke_after_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_log_directory(),
            file_prefix: default_log_file_prefix(),
            filter: default_log_filter(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_intervals_are_floor_clamped() {
        let intervals = IntervalConfig {
            quote_ms: 100,
            balance_ms: 500,
            check_order_ms: 0,
            wash_cycle_ms: 1500,
            reload_ms: 0,
        };

        assert_eq!(intervals.quote(), Duration::from_millis(500));
        assert_eq!(intervals.balance(), Duration::from_millis(500));
        assert_eq!(intervals.check_order(), Duration::from_millis(500));
        assert_eq!(intervals.wash_cycle(), Duration::from_millis(1500));
        assert_eq!(intervals.reload(), None);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.trading.sell_size = dec!(0);
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.trading.balance_percent = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.trading.make_up_percent = 101;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.trading.symbol = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_mode_deserializes_snake_case() {
        let mode: TradingMode = serde_json::from_str("\"wash_cycle\"").unwrap();
        assert_eq!(mode, TradingMode::WashCycle);
        let mode: TradingMode = serde_json::from_str("\"gated\"").unwrap();
        assert_eq!(mode, TradingMode::Gated);
    }
}

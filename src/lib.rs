//! # FCoin Trader
//!
//! Automated trading on a single FCoin spot pair.
//!
//! ## Architecture
//!
//! - `config`: Configuration loading and validation
//! - `error`: Domain errors
//! - `exchange`: FCoin REST client, paper exchange and the API seam
//! - `strategy`: Polling loops, balance gate, order engine and order monitor

pub mod config;
pub mod error;
pub mod exchange;
pub mod strategy;

pub use config::Config;
pub use error::TradeError;

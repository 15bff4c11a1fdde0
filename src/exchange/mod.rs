//! Exchange integration for FCoin.
//!
//! Provides:
//! - The [`ExchangeApi`] seam the engine trades through
//! - A signed REST client for the live exchange
//! - An in-memory paper exchange for dry runs and tests

mod client;
pub mod paper;
mod traits;
mod types;

pub use client::{FcoinClient, MAINNET_BASE_URL};
pub use paper::{Endpoint, Fault, PaperExchange};
pub use traits::ExchangeApi;
pub use types::*;

#[cfg(test)]
pub use traits::MockExchangeApi;

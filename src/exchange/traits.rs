//! Exchange-facing seam consumed by the trading engine.
//!
//! The engine only talks to the exchange through [`ExchangeApi`], so the live
//! REST client and the in-memory paper exchange are interchangeable.

use super::types::{ApiResponse, BalanceRecord, NewOrder, OpenOrder, OrderQuery, TickerData};
use anyhow::Result;
use async_trait::async_trait;

/// Operations the engine needs from an exchange.
///
/// `Err` means the call itself failed (network, timeout, undecodable body).
/// A successful call can still carry a non-zero application status inside the
/// [`ApiResponse`]; callers treat that as a soft failure.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ExchangeApi: Send + Sync {
    /// List every currency code the exchange trades.
    async fn get_currencies(&self) -> Result<ApiResponse<Vec<String>>>;

    /// Exchange clock in milliseconds since the epoch.
    async fn get_server_time(&self) -> Result<ApiResponse<i64>>;

    /// Current ticker for `symbol`.
    async fn get_ticker(&self, symbol: &str) -> Result<ApiResponse<TickerData>>;

    /// Balances of every currency in the account.
    async fn get_balance(&self) -> Result<ApiResponse<Vec<BalanceRecord>>>;

    /// Orders matching `query`.
    async fn list_orders(&self, query: &OrderQuery) -> Result<ApiResponse<Vec<OpenOrder>>>;

    /// Submit an order, returning the new order id.
    async fn create_order(&self, order: &NewOrder) -> Result<ApiResponse<String>>;

    /// Request cancellation of an order.
    async fn cancel_order(&self, order_id: &str) -> Result<ApiResponse<bool>>;
}

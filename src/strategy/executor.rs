//! Order submission and cancellation.

use crate::error::TradeError;
use crate::exchange::{ExchangeApi, NewOrder, OpenOrder, OrderQuery, OrderSide, OrderState};
use anyhow::Result;
use rust_decimal::{Decimal, RoundingStrategy};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// FCoin's insufficient-balance status.
const STATUS_INSUFFICIENT_BALANCE: i64 = 1016;

/// Price string with 8 decimal places.
pub fn format_price(price: Decimal) -> String {
    format_fixed(price, 8)
}

/// Quantity string with 2 decimal places.
pub fn format_quantity(quantity: Decimal) -> String {
    format_fixed(quantity, 2)
}

fn format_fixed(value: Decimal, dp: u32) -> String {
    let rounded = value.round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero);
    format!("{:.*}", dp as usize, rounded)
}

/// `percent`% of `value`.
pub fn percent_of(value: Decimal, percent: u32) -> Decimal {
    value * Decimal::from(percent) / Decimal::ONE_HUNDRED
}

/// Places and cancels limit orders on one symbol.
///
/// The `spawn_*` methods run detached: each task logs its own outcome and
/// nothing waits on or retries it. The handles are returned so callers that
/// care (tests, shutdown) can await them.
#[derive(Clone)]
pub struct OrderExecutor {
    exchange: Arc<dyn ExchangeApi>,
    symbol: String,
}

impl OrderExecutor {
    pub fn new(exchange: Arc<dyn ExchangeApi>, symbol: impl Into<String>) -> Self {
        Self {
            exchange,
            symbol: symbol.into(),
        }
    }

    /// Submit one limit order and return its id.
    pub async fn submit(&self, side: OrderSide, price: Decimal, quantity: Decimal) -> Result<String> {
        let order = NewOrder::limit(
            &self.symbol,
            side,
            format_price(price),
            format_quantity(quantity),
        );

        let id = self
            .exchange
            .create_order(&order)
            .await?
            .into_result("create order")?;

        info!(
            symbol = %self.symbol,
            %side,
            price = %order.price,
            amount = %order.amount,
            order_id = %id,
            "Order placed"
        );
        Ok(id)
    }

    /// Submit one order in a detached task.
    pub fn spawn_submit(&self, side: OrderSide, price: Decimal, quantity: Decimal) -> JoinHandle<()> {
        let executor = self.clone();
        tokio::spawn(async move {
            executor.submit_logged(side, price, quantity).await;
        })
    }

    /// Submit a buy and a sell at the same price and quantity, concurrently.
    ///
    /// The legs are independent: one failing does not touch the other.
    pub fn spawn_pair(&self, price: Decimal, quantity: Decimal) -> [JoinHandle<()>; 2] {
        [
            self.spawn_submit(OrderSide::Buy, price, quantity),
            self.spawn_submit(OrderSide::Sell, price, quantity),
        ]
    }

    /// Sell, then buy, one after the other.
    ///
    /// Each leg logs its own failure; the buy is submitted whatever happened
    /// to the sell. Returns the ids of the accepted legs.
    pub async fn sell_then_buy(
        &self,
        price: Decimal,
        quantity: Decimal,
    ) -> (Option<String>, Option<String>) {
        let sell_id = self.submit_logged(OrderSide::Sell, price, quantity).await;
        let buy_id = self.submit_logged(OrderSide::Buy, price, quantity).await;
        (sell_id, buy_id)
    }

    async fn submit_logged(&self, side: OrderSide, price: Decimal, quantity: Decimal) -> Option<String> {
        match self.submit(side, price, quantity).await {
            Ok(id) => Some(id),
            Err(e) => {
                log_submit_failure(side, &e);
                None
            }
        }
    }

    /// Open orders in every open state, newest first per state.
    pub async fn list_open_orders(&self) -> Result<Vec<OpenOrder>> {
        let mut orders = Vec::new();
        for state in OrderState::OPEN {
            orders.extend(self.list_orders(state).await?);
        }
        Ok(orders)
    }

    /// Open orders in one state, up to [`OrderQuery::DEFAULT_LIMIT`].
    pub async fn list_orders(&self, state: OrderState) -> Result<Vec<OpenOrder>> {
        let query = OrderQuery::new(&self.symbol, state);
        Ok(self
            .exchange
            .list_orders(&query)
            .await?
            .into_result("orders")?)
    }

    /// Cancel one order in a detached task.
    pub fn spawn_cancel(&self, order_id: String) -> JoinHandle<()> {
        let exchange = self.exchange.clone();
        tokio::spawn(async move {
            match exchange.cancel_order(&order_id).await {
                Ok(response) => match response.into_result("cancel order") {
                    Ok(true) => info!(%order_id, "Order cancelled"),
                    Ok(false) => warn!(%order_id, "Cancel request not accepted"),
                    Err(e) => warn!(%order_id, error = %e, "Cancel rejected"),
                },
                Err(e) => error!(%order_id, error = %e, "Cancel request failed"),
            }
        })
    }

    /// List everything open now and cancel each order in its own task.
    ///
    /// Listing happens before returning so orders placed afterwards are not
    /// swept up.
    pub async fn cancel_open_orders(&self) -> Result<Vec<JoinHandle<()>>> {
        let orders = self.list_open_orders().await?;
        info!(symbol = %self.symbol, count = orders.len(), "Cancelling open orders");
        Ok(orders
            .into_iter()
            .map(|order| self.spawn_cancel(order.id))
            .collect())
    }
}

fn log_submit_failure(side: OrderSide, error: &anyhow::Error) {
    match error.downcast_ref::<TradeError>() {
        Some(TradeError::Status {
            status: STATUS_INSUFFICIENT_BALANCE,
            ..
        }) => warn!(%side, "Order rejected: insufficient balance"),
        _ => error!(%side, error = %error, "Order submission failed"),
    }
}

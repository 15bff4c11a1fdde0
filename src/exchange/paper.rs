//! In-memory paper exchange for dry runs and tests.
//!
//! Simulates one spot pair: balances with available/frozen accounting, a
//! resting order book that matches crossing limit orders at the resting
//! price, and per-endpoint fault injection.

use super::traits::ExchangeApi;
use super::types::*;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Status FCoin uses for insufficient balance.
const STATUS_INSUFFICIENT_BALANCE: i64 = 1016;
/// Status for unknown or finished orders.
const STATUS_ORDER_NOT_CANCELLABLE: i64 = 3008;
/// Status for symbols the paper exchange does not simulate.
const STATUS_INVALID_SYMBOL: i64 = 400;

/// Endpoints faults can be injected into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Currencies,
    ServerTime,
    Ticker,
    Balance,
    ListOrders,
    CreateOrder,
    CancelOrder,
}

/// A failure to return instead of the simulated response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// The call fails as if the network dropped.
    Transport,
    /// The call succeeds with this non-zero application status.
    Status(i64),
}

#[derive(Debug, Clone, Default)]
struct PaperBalance {
    available: Decimal,
    frozen: Decimal,
}

#[derive(Debug, Clone)]
struct PaperOrder {
    order: OpenOrder,
    price: Decimal,
    remaining: Decimal,
    filled: Decimal,
}

#[derive(Debug, Default)]
struct PaperState {
    currencies: Vec<String>,
    ticker: Option<TickerData>,
    balances: BTreeMap<String, PaperBalance>,
    orders: Vec<PaperOrder>,
    server_time: Option<i64>,
    faults: HashMap<Endpoint, VecDeque<Fault>>,
    calls: HashMap<Endpoint, u64>,
    submitted: Vec<NewOrder>,
    cancelled: Vec<String>,
}

/// Simulated FCoin account trading `base`/`quote`.
pub struct PaperExchange {
    symbol: String,
    base: String,
    quote: String,
    state: RwLock<PaperState>,
    order_id_counter: AtomicU64,
}

impl PaperExchange {
    /// Create an exchange listing exactly the two currencies of the pair.
    pub fn new(base: &str, quote: &str) -> Self {
        let state = PaperState {
            currencies: vec![base.to_string(), quote.to_string()],
            ..Default::default()
        };

        Self {
            symbol: format!("{}{}", base, quote),
            base: base.to_string(),
            quote: quote.to_string(),
            state: RwLock::new(state),
            order_id_counter: AtomicU64::new(1),
        }
    }

    /// Paper account used by `--paper` runs.
    pub async fn demo(base: &str, quote: &str) -> Self {
        let exchange = Self::new(base, quote);
        exchange.set_ticker(dec!(0.1200), dec!(0.1205)).await;
        exchange.set_balance(base, dec!(1000), Decimal::ZERO).await;
        exchange.set_balance(quote, dec!(500), Decimal::ZERO).await;
        info!(symbol = %exchange.symbol, "Paper exchange ready");
        exchange
    }

    /// Replace the listed currencies.
    pub async fn set_currencies(&self, currencies: &[&str]) {
        self.state.write().await.currencies = currencies.iter().map(|c| c.to_string()).collect();
    }

    /// Set the top of book. The rest of the ticker is derived from it.
    pub async fn set_ticker(&self, best_bid: Decimal, best_ask: Decimal) {
        let mut state = self.state.write().await;
        let seq = state.ticker.as_ref().map(|t| t.seq + 1).unwrap_or(1);
        let mid = (best_bid + best_ask) / dec!(2);

        state.ticker = Some(TickerData {
            kind: format!("ticker.{}", self.symbol),
            seq,
            ticker: vec![
                mid,
                Decimal::ONE,
                best_bid,
                dec!(100),
                best_ask,
                dec!(100),
                mid,
                best_ask,
                best_bid,
                dec!(10000),
                dec!(10000) * mid,
            ],
        });
    }

    /// Raw ticker override, for malformed payload tests.
    pub async fn set_ticker_data(&self, data: TickerData) {
        self.state.write().await.ticker = Some(data);
    }

    /// Set one currency's balance.
    pub async fn set_balance(&self, currency: &str, available: Decimal, frozen: Decimal) {
        self.state
            .write()
            .await
            .balances
            .insert(currency.to_string(), PaperBalance { available, frozen });
    }

    /// Pin the exchange clock, `None` follows the local clock.
    pub async fn set_server_time(&self, millis: Option<i64>) {
        self.state.write().await.server_time = millis;
    }

    /// Rest an order on the book without touching balances.
    pub async fn insert_order(
        &self,
        side: OrderSide,
        price: Decimal,
        amount: Decimal,
        created_at: i64,
    ) -> String {
        let id = self.next_order_id();
        let order = PaperOrder {
            order: OpenOrder {
                id: id.clone(),
                symbol: self.symbol.clone(),
                order_type: OrderType::Limit,
                side,
                price: price.to_string(),
                amount: amount.to_string(),
                state: OrderState::Submitted,
                executed_value: "0".to_string(),
                fill_fees: "0".to_string(),
                filled_amount: "0".to_string(),
                created_at,
                source: "paper".to_string(),
            },
            price,
            remaining: amount,
            filled: Decimal::ZERO,
        };
        self.state.write().await.orders.push(order);
        id
    }

    /// Queue a fault for the next call to `endpoint`.
    pub async fn fail_next(&self, endpoint: Endpoint, fault: Fault) {
        self.state
            .write()
            .await
            .faults
            .entry(endpoint)
            .or_default()
            .push_back(fault);
    }

    /// Number of calls made to `endpoint`, faulted ones included.
    pub async fn call_count(&self, endpoint: Endpoint) -> u64 {
        self.state.read().await.calls.get(&endpoint).copied().unwrap_or(0)
    }

    /// Every order request received, accepted or not.
    pub async fn submitted_orders(&self) -> Vec<NewOrder> {
        self.state.read().await.submitted.clone()
    }

    /// Ids of successfully cancelled orders.
    pub async fn cancelled_orders(&self) -> Vec<String> {
        self.state.read().await.cancelled.clone()
    }

    /// Current state of an order.
    pub async fn order_state(&self, id: &str) -> Option<OrderState> {
        self.state
            .read()
            .await
            .orders
            .iter()
            .find(|o| o.order.id == id)
            .map(|o| o.order.state)
    }

    fn next_order_id(&self) -> String {
        format!("paper-{}", self.order_id_counter.fetch_add(1, Ordering::SeqCst))
    }

    /// Count the call and pop a queued fault, if any.
    async fn intercept<T>(&self, endpoint: Endpoint) -> Option<Result<ApiResponse<T>>> {
        let mut state = self.state.write().await;
        *state.calls.entry(endpoint).or_insert(0) += 1;

        let fault = state.faults.get_mut(&endpoint).and_then(VecDeque::pop_front)?;
        debug!(?endpoint, ?fault, "Injecting paper exchange fault");

        Some(match fault {
            Fault::Transport => Err(anyhow!("simulated transport failure on {:?}", endpoint)),
            Fault::Status(status) => Ok(ApiResponse::error(status, "simulated failure")),
        })
    }

    fn local_millis() -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

impl PaperState {
    fn balance_mut(&mut self, currency: &str) -> &mut PaperBalance {
        self.balances.entry(currency.to_string()).or_default()
    }

    /// Move funds from available to frozen, refusing if short.
    fn freeze(&mut self, currency: &str, amount: Decimal) -> bool {
        let balance = self.balance_mut(currency);
        if balance.available < amount {
            return false;
        }
        balance.available -= amount;
        balance.frozen += amount;
        true
    }

    fn release(&mut self, currency: &str, amount: Decimal) {
        let balance = self.balance_mut(currency);
        balance.frozen -= amount;
        balance.available += amount;
    }
}

/// Record a fill of `qty` on one order.
fn fill(order: &mut PaperOrder, qty: Decimal, price: Decimal) {
    order.remaining -= qty;
    order.filled += qty;
    order.order.filled_amount = order.filled.to_string();
    let executed = order
        .order
        .executed_value
        .parse::<Decimal>()
        .unwrap_or(Decimal::ZERO)
        + qty * price;
    order.order.executed_value = executed.to_string();
    order.order.state = if order.remaining.is_zero() {
        OrderState::Filled
    } else {
        OrderState::PartialFilled
    };
}

#[async_trait]
impl ExchangeApi for PaperExchange {
    async fn get_currencies(&self) -> Result<ApiResponse<Vec<String>>> {
        if let Some(faulted) = self.intercept(Endpoint::Currencies).await {
            return faulted;
        }
        Ok(ApiResponse::ok(self.state.read().await.currencies.clone()))
    }

    async fn get_server_time(&self) -> Result<ApiResponse<i64>> {
        if let Some(faulted) = self.intercept(Endpoint::ServerTime).await {
            return faulted;
        }
        let pinned = self.state.read().await.server_time;
        Ok(ApiResponse::ok(pinned.unwrap_or_else(Self::local_millis)))
    }

    async fn get_ticker(&self, symbol: &str) -> Result<ApiResponse<TickerData>> {
        if let Some(faulted) = self.intercept(Endpoint::Ticker).await {
            return faulted;
        }
        if symbol != self.symbol {
            return Ok(ApiResponse::error(STATUS_INVALID_SYMBOL, "invalid symbol"));
        }
        match self.state.read().await.ticker.clone() {
            Some(ticker) => Ok(ApiResponse::ok(ticker)),
            None => Ok(ApiResponse::error(STATUS_INVALID_SYMBOL, "no market data")),
        }
    }

    async fn get_balance(&self) -> Result<ApiResponse<Vec<BalanceRecord>>> {
        if let Some(faulted) = self.intercept(Endpoint::Balance).await {
            return faulted;
        }
        let state = self.state.read().await;
        let records = state
            .balances
            .iter()
            .map(|(currency, b)| BalanceRecord::new(currency, b.available, b.frozen))
            .collect();
        Ok(ApiResponse::ok(records))
    }

    async fn list_orders(&self, query: &OrderQuery) -> Result<ApiResponse<Vec<OpenOrder>>> {
        if let Some(faulted) = self.intercept(Endpoint::ListOrders).await {
            return faulted;
        }
        let state = self.state.read().await;
        let mut orders: Vec<OpenOrder> = state
            .orders
            .iter()
            .filter(|o| o.order.symbol == query.symbol && query.states.contains(&o.order.state))
            .map(|o| o.order.clone())
            .collect();

        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        orders.truncate(query.limit as usize);
        Ok(ApiResponse::ok(orders))
    }

    async fn create_order(&self, order: &NewOrder) -> Result<ApiResponse<String>> {
        if let Some(faulted) = self.intercept(Endpoint::CreateOrder).await {
            return faulted;
        }

        let mut state = self.state.write().await;
        state.submitted.push(order.clone());

        if order.symbol != self.symbol {
            return Ok(ApiResponse::error(STATUS_INVALID_SYMBOL, "invalid symbol"));
        }

        let price = parse_decimal("price", &order.price).unwrap_or(Decimal::ZERO);
        let amount = parse_decimal("amount", &order.amount).unwrap_or(Decimal::ZERO);
        if price <= Decimal::ZERO || amount <= Decimal::ZERO {
            return Ok(ApiResponse::error(
                STATUS_INVALID_SYMBOL,
                "invalid price or amount",
            ));
        }

        let frozen = match order.side {
            OrderSide::Buy => state.freeze(&self.quote, price * amount),
            OrderSide::Sell => state.freeze(&self.base, amount),
        };
        if !frozen {
            return Ok(ApiResponse::error(
                STATUS_INSUFFICIENT_BALANCE,
                "account balance insufficient",
            ));
        }

        let id = self.next_order_id();
        let mut incoming = PaperOrder {
            order: OpenOrder {
                id: id.clone(),
                symbol: order.symbol.clone(),
                order_type: order.order_type,
                side: order.side,
                price: order.price.clone(),
                amount: order.amount.clone(),
                state: OrderState::Submitted,
                executed_value: "0".to_string(),
                fill_fees: "0".to_string(),
                filled_amount: "0".to_string(),
                created_at: Self::local_millis(),
                source: "api".to_string(),
            },
            price,
            remaining: amount,
            filled: Decimal::ZERO,
        };

        // Match against resting orders of the other side, oldest first.
        let mut settlements = Vec::new();
        for resting in state.orders.iter_mut() {
            if incoming.remaining.is_zero() {
                break;
            }
            // Seeded orders hold no funds and never match.
            if !resting.order.state.is_open()
                || resting.order.side == incoming.order.side
                || resting.order.source == "paper"
            {
                continue;
            }
            let crosses = match incoming.order.side {
                OrderSide::Buy => resting.price <= incoming.price,
                OrderSide::Sell => resting.price >= incoming.price,
            };
            if !crosses {
                continue;
            }

            let qty = incoming.remaining.min(resting.remaining);
            let fill_price = resting.price;
            fill(resting, qty, fill_price);
            fill(&mut incoming, qty, fill_price);

            let buy_limit = match incoming.order.side {
                OrderSide::Buy => incoming.price,
                OrderSide::Sell => resting.price,
            };
            settlements.push((qty, fill_price, buy_limit));
        }

        for (qty, fill_price, buy_limit) in settlements {
            // Buyer: release the quote frozen at its limit, pay the fill price, receive base.
            let quote = state.balance_mut(&self.quote);
            quote.frozen -= buy_limit * qty;
            quote.available += (buy_limit - fill_price) * qty;
            state.balance_mut(&self.base).available += qty;

            // Seller: frozen base leaves, quote proceeds arrive.
            state.balance_mut(&self.base).frozen -= qty;
            state.balance_mut(&self.quote).available += fill_price * qty;

            debug!(%qty, price = %fill_price, "Paper fill");
        }

        state.orders.push(incoming);
        Ok(ApiResponse::ok(id))
    }

    async fn cancel_order(&self, order_id: &str) -> Result<ApiResponse<bool>> {
        if let Some(faulted) = self.intercept(Endpoint::CancelOrder).await {
            return faulted;
        }

        let mut state = self.state.write().await;
        let Some(index) = state.orders.iter().position(|o| o.order.id == order_id) else {
            return Ok(ApiResponse::error(STATUS_ORDER_NOT_CANCELLABLE, "order not found"));
        };

        let order = state.orders[index].clone();
        if !order.order.state.is_open() {
            return Ok(ApiResponse::error(STATUS_ORDER_NOT_CANCELLABLE, "order already done"));
        }

        // Orders seeded with insert_order never froze anything.
        if order.order.source != "paper" {
            match order.order.side {
                OrderSide::Buy => state.release(&self.quote, order.price * order.remaining),
                OrderSide::Sell => state.release(&self.base, order.remaining),
            }
        }

        state.orders[index].order.state = if order.filled.is_zero() {
            OrderState::Canceled
        } else {
            OrderState::PartialCanceled
        };
        state.cancelled.push(order_id.to_string());

        Ok(ApiResponse::ok(true))
    }
}

//! Shared exchange context: the traded pair, live strategy parameters and the
//! last observed quote and balances.

use crate::config::Config;
use crate::error::TradeError;
use crate::exchange::{BalanceRecord, ExchangeApi, Quote};
use anyhow::{Context as _, Result};
use rust_decimal::Decimal;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// A market symbol split into its two currencies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TradingPair {
    pub symbol: String,
    pub base: String,
    pub quote: String,
}

impl TradingPair {
    /// Split `symbol` into `base + quote`, both of which must be listed.
    ///
    /// Currencies are tried in listing order; the first prefix whose remainder
    /// is also a listed currency wins.
    pub fn resolve(symbol: &str, currencies: &[String]) -> Result<Self, TradeError> {
        let listed = |code: &str| currencies.iter().any(|c| c == code);

        currencies
            .iter()
            .filter(|c| !c.is_empty())
            .find_map(|base| {
                let quote = symbol.strip_prefix(base.as_str())?;
                (!quote.is_empty() && listed(quote)).then(|| Self {
                    symbol: symbol.to_string(),
                    base: base.clone(),
                    quote: quote.to_string(),
                })
            })
            .ok_or_else(|| TradeError::UnsupportedSymbol(symbol.to_string()))
    }
}

/// Strategy parameters that may change while running.
#[derive(Debug, Clone, PartialEq)]
pub struct StrategyParams {
    pub sell_size: Decimal,
    pub expect_value: Decimal,
    pub make_up_percent: u32,
    pub balance_percent: u32,
    pub revoke_after_ms: i64,
}

impl From<&Config> for StrategyParams {
    fn from(config: &Config) -> Self {
        Self {
            sell_size: config.trading.sell_size,
            expect_value: config.trading.expect_value,
            make_up_percent: config.trading.make_up_percent,
            balance_percent: config.trading.balance_percent,
            revoke_after_ms: config.order_monitor.revoke_after_ms,
        }
    }
}

#[derive(Debug)]
struct ContextState {
    params: StrategyParams,
    quote: Option<Quote>,
    balances: HashMap<String, BalanceRecord>,
}

/// Long-lived state shared by every loop.
///
/// One lock guards everything; it is only ever held for in-memory reads and
/// swaps, never across an exchange call.
#[derive(Debug)]
pub struct ExchangeContext {
    pair: TradingPair,
    state: RwLock<ContextState>,
}

impl ExchangeContext {
    pub fn new(pair: TradingPair, params: StrategyParams) -> Self {
        Self {
            pair,
            state: RwLock::new(ContextState {
                params,
                quote: None,
                balances: HashMap::new(),
            }),
        }
    }

    /// Resolve the configured symbol against the exchange's currency list.
    ///
    /// Any failure here is fatal: the engine cannot run on an unknown pair.
    pub async fn initialize(exchange: &dyn ExchangeApi, config: &Config) -> Result<Self> {
        let currencies = exchange
            .get_currencies()
            .await
            .context("Failed to fetch currency list")?
            .into_result("currencies")?;

        let pair = TradingPair::resolve(&config.trading.symbol, &currencies)?;
        info!(
            symbol = %pair.symbol,
            base = %pair.base,
            quote = %pair.quote,
            "Trading pair resolved"
        );

        Ok(Self::new(pair, StrategyParams::from(config)))
    }

    pub fn pair(&self) -> &TradingPair {
        &self.pair
    }

    pub async fn params(&self) -> StrategyParams {
        self.state.read().await.params.clone()
    }

    /// Swap in new parameters (config reload).
    pub async fn apply_params(&self, params: StrategyParams) {
        let mut state = self.state.write().await;
        if state.params != params {
            info!(
                sell_size = %params.sell_size,
                expect_value = %params.expect_value,
                make_up_percent = params.make_up_percent,
                balance_percent = params.balance_percent,
                revoke_after_ms = params.revoke_after_ms,
                "Strategy parameters updated"
            );
            state.params = params;
        }
    }

    /// Scale the sell size to `percent`% of its current value.
    pub async fn shrink_sell_size(&self, percent: u32) -> Decimal {
        let mut state = self.state.write().await;
        state.params.sell_size = state.params.sell_size * Decimal::from(percent) / Decimal::ONE_HUNDRED;
        state.params.sell_size
    }

    pub async fn quote(&self) -> Option<Quote> {
        self.state.read().await.quote.clone()
    }

    pub async fn replace_quote(&self, quote: Quote) {
        self.state.write().await.quote = Some(quote);
    }

    /// Overwrite the records present in `records`.
    ///
    /// Currencies missing from `records` keep their previous entry.
    pub async fn merge_balances(&self, records: Vec<BalanceRecord>) {
        let mut state = self.state.write().await;
        for record in records {
            state.balances.insert(record.currency.clone(), record);
        }
        debug!(currencies = state.balances.len(), "Balances merged");
    }

    pub async fn balance(&self, currency: &str) -> Option<BalanceRecord> {
        self.state.read().await.balances.get(currency).cloned()
    }

    /// Balance records of the base and quote currency.
    pub async fn pair_balances(&self) -> Result<(BalanceRecord, BalanceRecord), TradeError> {
        let state = self.state.read().await;
        let lookup = |currency: &str| {
            state
                .balances
                .get(currency)
                .cloned()
                .ok_or_else(|| TradeError::MissingBalance(currency.to_string()))
        };
        Ok((lookup(&self.pair.base)?, lookup(&self.pair.quote)?))
    }
}

//! Balance gate and make-up rebalancing.
//!
//! After every balance refresh the gate decides whether the account can fund
//! a buy+sell pair at the current quote. When it cannot, the balances are
//! classified into one of four make-up actions that move the account back
//! toward a tradable state.

use crate::exchange::{ExchangeApi, OrderSide, Quote};
use crate::strategy::context::{ExchangeContext, StrategyParams};
use crate::strategy::executor::{percent_of, OrderExecutor};
use crate::strategy::poller::current_quote;
use crate::strategy::signal::{SignalReceiver, SignalSender};
use anyhow::Result;
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Whether available balances cover one buy at the ask and one sell of
/// `sell_size`.
pub fn is_ready(
    quote: &Quote,
    base_available: Decimal,
    quote_available: Decimal,
    sell_size: Decimal,
) -> bool {
    quote_available >= quote.best_ask * sell_size && base_available >= sell_size
}

/// Rebalancing action chosen from the account totals.
#[derive(Debug, Clone, PartialEq)]
pub enum MakeUpPlan {
    /// Both sides short: trade smaller from now on.
    ShrinkSellSize { percent: u32 },
    /// Quote surplus only: buy base at the ask.
    BuyBase { price: Decimal, quantity: Decimal },
    /// Base surplus only: sell base at the bid.
    SellBase { price: Decimal, quantity: Decimal },
    /// Both sides in surplus: clear open orders and wash a smaller pair.
    CancelAndWash { price: Decimal, quantity: Decimal },
}

impl MakeUpPlan {
    /// Two-digit code: tens = base side, units = quote side, 2 = surplus.
    pub fn code(&self) -> u8 {
        match self {
            MakeUpPlan::ShrinkSellSize { .. } => 11,
            MakeUpPlan::BuyBase { .. } => 12,
            MakeUpPlan::SellBase { .. } => 21,
            MakeUpPlan::CancelAndWash { .. } => 22,
        }
    }
}

/// Pick the make-up action for the given totals.
pub fn classify(
    base_total: Decimal,
    quote_total: Decimal,
    quote: &Quote,
    params: &StrategyParams,
) -> MakeUpPlan {
    let base_surplus = base_total > params.sell_size;
    let quote_surplus = quote_total > quote.best_bid * params.sell_size;

    match (base_surplus, quote_surplus) {
        (false, false) => MakeUpPlan::ShrinkSellSize {
            percent: params.balance_percent,
        },
        (false, true) => MakeUpPlan::BuyBase {
            price: quote.best_ask,
            quantity: percent_of(params.sell_size, params.make_up_percent),
        },
        (true, false) => MakeUpPlan::SellBase {
            price: quote.best_bid,
            quantity: percent_of(params.sell_size, params.make_up_percent),
        },
        (true, true) => MakeUpPlan::CancelAndWash {
            price: (quote.best_bid - params.expect_value).abs(),
            quantity: percent_of(params.sell_size, params.balance_percent),
        },
    }
}

/// Outcome of one gate evaluation.
#[derive(Debug)]
pub enum GateDecision {
    /// Balances cover a trade at this quote.
    Ready(Quote),
    /// Not ready; the plan was carried out. `tasks` are the detached order
    /// and cancel tasks it started.
    MadeUp {
        plan: MakeUpPlan,
        tasks: Vec<JoinHandle<()>>,
    },
}

/// Readiness check plus synchronous make-up.
pub struct BalanceGate {
    exchange: Arc<dyn ExchangeApi>,
    ctx: Arc<ExchangeContext>,
    executor: OrderExecutor,
}

impl BalanceGate {
    pub fn new(
        exchange: Arc<dyn ExchangeApi>,
        ctx: Arc<ExchangeContext>,
        executor: OrderExecutor,
    ) -> Self {
        Self {
            exchange,
            ctx,
            executor,
        }
    }

    /// Evaluate the current balance map against a freshly fetched quote.
    ///
    /// Any missing record, malformed balance or quote failure aborts the
    /// cycle with an error and no action.
    pub async fn evaluate(&self) -> Result<GateDecision> {
        let (base, quote_balance) = self.ctx.pair_balances().await?;
        let base_available = base.available()?;
        let quote_available = quote_balance.available()?;

        let quote = current_quote(self.exchange.as_ref(), &self.ctx).await?;
        let params = self.ctx.params().await;

        if is_ready(&quote, base_available, quote_available, params.sell_size) {
            debug!(
                %base_available,
                %quote_available,
                sell_size = %params.sell_size,
                "Balances ready"
            );
            return Ok(GateDecision::Ready(quote));
        }

        let plan = classify(base.total()?, quote_balance.total()?, &quote, &params);
        info!(
            code = plan.code(),
            base_total = %base.balance,
            quote_total = %quote_balance.balance,
            best_bid = %quote.best_bid,
            best_ask = %quote.best_ask,
            "Balances not ready, making up"
        );

        let tasks = self.make_up(&plan).await?;
        Ok(GateDecision::MadeUp { plan, tasks })
    }

    /// Carry out a make-up plan. Single orders are awaited, pair legs and
    /// cancellations run detached.
    pub async fn make_up(&self, plan: &MakeUpPlan) -> Result<Vec<JoinHandle<()>>> {
        match *plan {
            MakeUpPlan::ShrinkSellSize { percent } => {
                let sell_size = self.ctx.shrink_sell_size(percent).await;
                info!(%sell_size, "Sell size reduced");
                Ok(Vec::new())
            }
            MakeUpPlan::BuyBase { price, quantity } => {
                self.executor.submit(OrderSide::Buy, price, quantity).await?;
                Ok(Vec::new())
            }
            MakeUpPlan::SellBase { price, quantity } => {
                self.executor.submit(OrderSide::Sell, price, quantity).await?;
                Ok(Vec::new())
            }
            MakeUpPlan::CancelAndWash { price, quantity } => {
                let mut tasks = match self.executor.cancel_open_orders().await {
                    Ok(tasks) => tasks,
                    Err(e) => {
                        warn!(error = %e, "Could not list open orders for cancellation");
                        Vec::new()
                    }
                };
                tasks.extend(self.executor.spawn_pair(price, quantity));
                Ok(tasks)
            }
        }
    }

    /// Evaluate on every balance-ready signal, forwarding trade-ready when
    /// the account is funded.
    pub async fn run(
        self,
        mut balance_ready: SignalReceiver,
        trade_ready: SignalSender,
        token: CancellationToken,
    ) {
        info!("Balance gate started");

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                signal = balance_ready.recv() => {
                    if signal.is_none() {
                        break;
                    }
                }
            }

            match self.evaluate().await {
                Ok(GateDecision::Ready(_)) => {
                    trade_ready.notify();
                }
                Ok(GateDecision::MadeUp { plan, .. }) => {
                    debug!(code = plan.code(), "Make-up done, no trade this cycle");
                }
                Err(e) => warn!(error = %e, "Balance gate cycle skipped"),
            }
        }

        info!("Balance gate stopped");
    }
}

//! Trade generation cadences.
//!
//! Exactly one cadence runs per process, chosen from `trading.mode`:
//!
//! - [`GatedCadence`]: balance poller -> balance gate -> trade trigger, wired
//!   with single-slot signals.
//! - [`WashCycleCadence`]: one fixed-interval loop doing the same three steps
//!   in sequence.

use crate::exchange::ExchangeApi;
use crate::strategy::context::ExchangeContext;
use crate::strategy::executor::OrderExecutor;
use crate::strategy::poller::{refresh_balances, BalancePoller};
use crate::strategy::rebalancer::{BalanceGate, GateDecision};
use crate::strategy::signal::signal_channel;
use crate::strategy::trigger::TradeTrigger;
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[async_trait]
pub trait TradeCadence: Send {
    fn name(&self) -> &'static str;

    /// Run until `token` is cancelled.
    async fn run(self: Box<Self>, token: CancellationToken);
}

pub struct GatedCadence {
    exchange: Arc<dyn ExchangeApi>,
    ctx: Arc<ExchangeContext>,
    executor: OrderExecutor,
    balance_interval: Duration,
}

impl GatedCadence {
    pub fn new(
        exchange: Arc<dyn ExchangeApi>,
        ctx: Arc<ExchangeContext>,
        executor: OrderExecutor,
        balance_interval: Duration,
    ) -> Self {
        Self {
            exchange,
            ctx,
            executor,
            balance_interval,
        }
    }
}

#[async_trait]
impl TradeCadence for GatedCadence {
    fn name(&self) -> &'static str {
        "gated"
    }

    async fn run(self: Box<Self>, token: CancellationToken) {
        let (balance_tx, balance_rx) = signal_channel("balance_ready");
        let (trade_tx, trade_rx) = signal_channel("trade_ready");

        let poller = BalancePoller::new(
            self.exchange.clone(),
            self.ctx.clone(),
            self.balance_interval,
            balance_tx,
        );
        let gate = BalanceGate::new(
            self.exchange.clone(),
            self.ctx.clone(),
            self.executor.clone(),
        );
        let trigger = TradeTrigger::new(self.exchange, self.ctx, self.executor);

        let tasks = [
            tokio::spawn(poller.run(token.clone())),
            tokio::spawn(gate.run(balance_rx, trade_tx, token.clone())),
            tokio::spawn(trigger.run(trade_rx, token)),
        ];
        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Gated cadence stage ended abnormally");
            }
        }
    }
}

pub struct WashCycleCadence {
    exchange: Arc<dyn ExchangeApi>,
    ctx: Arc<ExchangeContext>,
    gate: BalanceGate,
    trigger: TradeTrigger,
    interval: Duration,
}

impl WashCycleCadence {
    pub fn new(
        exchange: Arc<dyn ExchangeApi>,
        ctx: Arc<ExchangeContext>,
        executor: OrderExecutor,
        interval: Duration,
    ) -> Self {
        Self {
            gate: BalanceGate::new(exchange.clone(), ctx.clone(), executor.clone()),
            trigger: TradeTrigger::new(exchange.clone(), ctx.clone(), executor),
            exchange,
            ctx,
            interval,
        }
    }

    /// Refresh balances, gate, then either make up or trade.
    pub async fn cycle(&self) -> Result<()> {
        refresh_balances(self.exchange.as_ref(), &self.ctx).await?;

        match self.gate.evaluate().await? {
            GateDecision::Ready(_) => {
                self.trigger.fire().await?;
            }
            GateDecision::MadeUp { plan, .. } => {
                debug!(code = plan.code(), "Wash cycle made up balances");
            }
        }
        Ok(())
    }
}

#[async_trait]
impl TradeCadence for WashCycleCadence {
    fn name(&self) -> &'static str {
        "wash_cycle"
    }

    async fn run(self: Box<Self>, token: CancellationToken) {
        info!(interval_ms = self.interval.as_millis() as u64, "Wash cycle started");
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = interval.tick() => {}
            }

            if let Err(e) = self.cycle().await {
                warn!(error = %e, "Wash cycle skipped");
            }
        }

        info!("Wash cycle stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::{Endpoint, Fault, PaperExchange};
    use crate::strategy::context::{StrategyParams, TradingPair};
    use rust_decimal_macros::dec;

    fn context() -> Arc<ExchangeContext> {
        let pair = TradingPair {
            symbol: "ftusdt".to_string(),
            base: "ft".to_string(),
            quote: "usdt".to_string(),
        };
        let params = StrategyParams {
            sell_size: dec!(10),
            expect_value: dec!(0),
            make_up_percent: 50,
            balance_percent: 50,
            revoke_after_ms: 60_000,
        };
        Arc::new(ExchangeContext::new(pair, params))
    }

    async fn funded_paper() -> Arc<PaperExchange> {
        let paper = Arc::new(PaperExchange::new("ft", "usdt"));
        paper.set_ticker(dec!(0.5), dec!(0.5)).await;
        paper.set_balance("ft", dec!(100), dec!(0)).await;
        paper.set_balance("usdt", dec!(100), dec!(0)).await;
        paper
    }

    #[tokio::test]
    async fn test_wash_cycle_trades_when_ready() {
        let paper = funded_paper().await;
        let ctx = context();
        let executor = OrderExecutor::new(paper.clone(), "ftusdt");
        let cadence = WashCycleCadence::new(paper.clone(), ctx.clone(), executor, Duration::from_secs(3));

        cadence.cycle().await.unwrap();
        while paper.submitted_orders().await.len() < 2 {
            tokio::task::yield_now().await;
        }

        // The pair crossed itself, so totals are back where they started.
        refresh_balances(paper.as_ref(), &ctx).await.unwrap();
        let (base, quote) = ctx.pair_balances().await.unwrap();
        assert_eq!(base.total().unwrap(), dec!(100));
        assert_eq!(quote.total().unwrap(), dec!(100));
    }

    #[tokio::test]
    async fn test_wash_cycle_stops_on_balance_failure() {
        let paper = funded_paper().await;
        paper.fail_next(Endpoint::Balance, Fault::Transport).await;
        let executor = OrderExecutor::new(paper.clone(), "ftusdt");
        let cadence = WashCycleCadence::new(paper.clone(), context(), executor, Duration::from_secs(3));

        assert!(cadence.cycle().await.is_err());
        assert_eq!(paper.call_count(Endpoint::Ticker).await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gated_cadence_trades_and_shuts_down() {
        let paper = funded_paper().await;
        let executor = OrderExecutor::new(paper.clone(), "ftusdt");
        let cadence: Box<dyn TradeCadence> = Box::new(GatedCadence::new(
            paper.clone(),
            context(),
            executor,
            Duration::from_secs(2),
        ));
        assert_eq!(cadence.name(), "gated");

        let token = CancellationToken::new();
        let handle = tokio::spawn(cadence.run(token.clone()));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(paper.submitted_orders().await.len(), 2);

        token.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_wash_cycle_loop_recovers_after_fault() {
        let paper = funded_paper().await;
        paper.fail_next(Endpoint::Balance, Fault::Transport).await;
        let executor = OrderExecutor::new(paper.clone(), "ftusdt");
        let cadence: Box<dyn TradeCadence> = Box::new(WashCycleCadence::new(
            paper.clone(),
            context(),
            executor,
            Duration::from_secs(3),
        ));

        let token = CancellationToken::new();
        let handle = tokio::spawn(cadence.run(token.clone()));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(paper.call_count(Endpoint::Balance).await, 1);
        assert!(paper.submitted_orders().await.is_empty());

        // The 3s tick runs a full cycle despite the first one failing.
        tokio::time::sleep(Duration::from_millis(3400)).await;
        assert_eq!(paper.call_count(Endpoint::Balance).await, 2);
        assert_eq!(paper.submitted_orders().await.len(), 2);

        token.cancel();
        handle.await.unwrap();
    }
}

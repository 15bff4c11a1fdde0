//! Trade trigger: turns a trade-ready signal into a buy+sell pair.

use crate::exchange::{ExchangeApi, Quote};
use crate::strategy::context::ExchangeContext;
use crate::strategy::executor::OrderExecutor;
use crate::strategy::poller::current_quote;
use crate::strategy::signal::SignalReceiver;
use anyhow::Result;
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Pair price: `|best_bid + expect_value|`.
pub fn trade_price(quote: &Quote, expect_value: Decimal) -> Decimal {
    (quote.best_bid + expect_value).abs()
}

pub struct TradeTrigger {
    exchange: Arc<dyn ExchangeApi>,
    ctx: Arc<ExchangeContext>,
    executor: OrderExecutor,
}

impl TradeTrigger {
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

    /// Re-fetch the quote and submit both legs concurrently.
    pub async fn fire(&self) -> Result<[JoinHandle<()>; 2]> {
        let quote = current_quote(self.exchange.as_ref(), &self.ctx).await?;
        let params = self.ctx.params().await;
        let price = trade_price(&quote, params.expect_value);

        info!(
            %price,
            quantity = %params.sell_size,
            best_bid = %quote.best_bid,
            "Submitting trade pair"
        );
        Ok(self.executor.spawn_pair(price, params.sell_size))
    }

    /// Re-fetch the quote, then sell and buy one after the other.
    ///
    /// Only a quote failure is an error; leg failures are logged and show up
    /// as `None` ids.
    pub async fn fire_sequential(&self) -> Result<(Option<String>, Option<String>)> {
        let quote = current_quote(self.exchange.as_ref(), &self.ctx).await?;
        let params = self.ctx.params().await;
        Ok(self
            .executor
            .sell_then_buy(trade_price(&quote, params.expect_value), params.sell_size)
            .await)
    }

    pub async fn run(self, mut trade_ready: SignalReceiver, token: CancellationToken) {
        info!("Trade trigger started");

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                signal = trade_ready.recv() => {
                    if signal.is_none() {
                        break;
                    }
                }
            }

            if let Err(e) = self.fire().await {
                warn!(error = %e, "Trade skipped");
            }
        }

        info!("Trade trigger stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::{Endpoint, Fault, OrderSide, PaperExchange};
    use crate::strategy::context::{StrategyParams, TradingPair};
    use crate::strategy::signal::signal_channel;
    use rust_decimal_macros::dec;

    async fn setup(expect_value: Decimal) -> (Arc<PaperExchange>, TradeTrigger) {
        let paper = Arc::new(PaperExchange::new("ft", "usdt"));
        paper.set_ticker(dec!(0.5), dec!(0.52)).await;
        paper.set_balance("ft", dec!(100), dec!(0)).await;
        paper.set_balance("usdt", dec!(100), dec!(0)).await;

        let pair = TradingPair {
            symbol: "ftusdt".to_string(),
            base: "ft".to_string(),
            quote: "usdt".to_string(),
        };
        let params = StrategyParams {
            sell_size: dec!(10),
            expect_value,
            make_up_percent: 50,
            balance_percent: 50,
            revoke_after_ms: 60_000,
        };
        let ctx = Arc::new(ExchangeContext::new(pair, params));
        let executor = OrderExecutor::new(paper.clone(), "ftusdt");
        (paper.clone(), TradeTrigger::new(paper, ctx, executor))
    }

    #[tokio::test]
    async fn test_fire_submits_matching_pair() {
        let (paper, trigger) = setup(dec!(0.001)).await;

        for handle in trigger.fire().await.unwrap() {
            handle.await.unwrap();
        }

        let submitted = paper.submitted_orders().await;
        assert_eq!(submitted.len(), 2);
        for order in &submitted {
            assert_eq!(order.price, "0.50100000");
            assert_eq!(order.amount, "10.00");
        }
        let mut sides: Vec<_> = submitted.iter().map(|o| o.side).collect();
        sides.sort_by_key(|s| s.as_str());
        assert_eq!(sides, vec![OrderSide::Buy, OrderSide::Sell]);
    }

    #[test]
    fn test_negative_offset_takes_absolute_value() {
        let quote = Quote::from_ticker(crate::exchange::TickerData {
            kind: "ticker.ftusdt".to_string(),
            seq: 1,
            ticker: vec![dec!(0.1); 11],
        })
        .unwrap();
        assert_eq!(trade_price(&quote, dec!(-0.3)), dec!(0.2));
        assert_eq!(trade_price(&quote, dec!(0.05)), dec!(0.15));
    }

    #[tokio::test]
    async fn test_fire_aborts_without_quote() {
        let (paper, trigger) = setup(dec!(0)).await;
        paper.fail_next(Endpoint::Ticker, Fault::Status(500)).await;

        assert!(trigger.fire().await.is_err());
        assert_eq!(paper.call_count(Endpoint::CreateOrder).await, 0);
    }

    #[tokio::test]
    async fn test_fire_sequential_orders_legs() {
        let (paper, trigger) = setup(dec!(0)).await;
        let (sell_id, buy_id) = trigger.fire_sequential().await.unwrap();
        assert!(sell_id.is_some() && buy_id.is_some());

        let sides: Vec<_> = paper.submitted_orders().await.iter().map(|o| o.side).collect();
        assert_eq!(sides, vec![OrderSide::Sell, OrderSide::Buy]);
    }

    #[tokio::test]
    async fn test_fire_sequential_keeps_buy_when_sell_fails() {
        let (paper, trigger) = setup(dec!(0)).await;
        paper.fail_next(Endpoint::CreateOrder, Fault::Transport).await;

        let (sell_id, buy_id) = trigger.fire_sequential().await.unwrap();
        assert!(sell_id.is_none());
        assert!(buy_id.is_some());
        assert_eq!(paper.call_count(Endpoint::CreateOrder).await, 2);
    }

    #[tokio::test]
    async fn test_signal_drives_one_pair() {
        let (paper, trigger) = setup(dec!(0)).await;
        let (tx, rx) = signal_channel("trade_ready");
        let token = CancellationToken::new();
        let handle = tokio::spawn(trigger.run(rx, token.clone()));

        tx.notify();
        while paper.submitted_orders().await.len() < 2 {
            tokio::task::yield_now().await;
        }

        token.cancel();
        handle.await.unwrap();
        assert_eq!(paper.submitted_orders().await.len(), 2);
    }
}

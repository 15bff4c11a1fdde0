//! Fixed-interval quote and balance polling.

use crate::exchange::{ExchangeApi, Quote};
use crate::strategy::context::ExchangeContext;
use crate::strategy::signal::SignalSender;
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Fetch the pair's ticker and make it the context's current quote.
pub async fn current_quote(exchange: &dyn ExchangeApi, ctx: &ExchangeContext) -> Result<Quote> {
    let data = exchange
        .get_ticker(&ctx.pair().symbol)
        .await?
        .into_result("ticker")?;
    let quote = Quote::from_ticker(data)?;
    ctx.replace_quote(quote.clone()).await;
    Ok(quote)
}

/// Fetch account balances and merge them into the context.
///
/// Returns the number of records received.
pub async fn refresh_balances(exchange: &dyn ExchangeApi, ctx: &ExchangeContext) -> Result<usize> {
    let records = exchange.get_balance().await?.into_result("balance")?;
    let received = records.len();
    ctx.merge_balances(records).await;
    Ok(received)
}

fn ticker(period: Duration) -> tokio::time::Interval {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

/// Keeps the context quote fresh.
pub struct QuotePoller {
    exchange: Arc<dyn ExchangeApi>,
    ctx: Arc<ExchangeContext>,
    interval: Duration,
}

impl QuotePoller {
    pub fn new(exchange: Arc<dyn ExchangeApi>, ctx: Arc<ExchangeContext>, interval: Duration) -> Self {
        Self {
            exchange,
            ctx,
            interval,
        }
    }

    pub async fn poll_once(&self) -> Result<Quote> {
        current_quote(self.exchange.as_ref(), &self.ctx).await
    }

    pub async fn run(self, token: CancellationToken) {
        info!(interval_ms = self.interval.as_millis() as u64, "Quote poller started");
        let mut interval = ticker(self.interval);

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = interval.tick() => {}
            }

            match self.poll_once().await {
                Ok(quote) => debug!(
                    seq = quote.seq,
                    best_bid = %quote.best_bid,
                    best_ask = %quote.best_ask,
                    "Quote updated"
                ),
                Err(e) => warn!(error = %e, "Quote poll failed, keeping previous quote"),
            }
        }

        info!("Quote poller stopped");
    }
}

/// Keeps the balance map fresh and announces each successful refresh.
pub struct BalancePoller {
    exchange: Arc<dyn ExchangeApi>,
    ctx: Arc<ExchangeContext>,
    interval: Duration,
    balance_ready: SignalSender,
}

impl BalancePoller {
    pub fn new(
        exchange: Arc<dyn ExchangeApi>,
        ctx: Arc<ExchangeContext>,
        interval: Duration,
        balance_ready: SignalSender,
    ) -> Self {
        Self {
            exchange,
            ctx,
            interval,
            balance_ready,
        }
    }

    /// Refresh balances, signalling downstream only on success.
    pub async fn poll_once(&self) -> Result<()> {
        let received = refresh_balances(self.exchange.as_ref(), &self.ctx).await?;
        debug!(records = received, "Balances refreshed");
        self.balance_ready.notify();
        Ok(())
    }

    pub async fn run(self, token: CancellationToken) {
        info!(interval_ms = self.interval.as_millis() as u64, "Balance poller started");
        let mut interval = ticker(self.interval);

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = interval.tick() => {}
            }

            if let Err(e) = self.poll_once().await {
                warn!(error = %e, "Balance poll failed");
            }
        }

        info!("Balance poller stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::{Endpoint, Fault, PaperExchange};
    use crate::strategy::context::{StrategyParams, TradingPair};
    use crate::strategy::signal::signal_channel;
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
            revoke_after_ms: 1000,
        };
        Arc::new(ExchangeContext::new(pair, params))
    }

    #[tokio::test]
    async fn test_failed_quote_poll_keeps_previous() {
        let paper = Arc::new(PaperExchange::new("ft", "usdt"));
        paper.set_ticker(dec!(0.5), dec!(0.51)).await;
        let ctx = context();
        let poller = QuotePoller::new(paper.clone(), ctx.clone(), Duration::from_secs(1));

        poller.poll_once().await.unwrap();
        let first = ctx.quote().await.unwrap();

        paper.set_ticker(dec!(0.6), dec!(0.61)).await;
        paper.fail_next(Endpoint::Ticker, Fault::Status(500)).await;
        assert!(poller.poll_once().await.is_err());
        assert_eq!(ctx.quote().await.unwrap(), first);

        paper.fail_next(Endpoint::Ticker, Fault::Transport).await;
        assert!(poller.poll_once().await.is_err());
        assert_eq!(ctx.quote().await.unwrap().best_bid, dec!(0.5));

        poller.poll_once().await.unwrap();
        assert_eq!(ctx.quote().await.unwrap().best_bid, dec!(0.6));
    }

    #[tokio::test]
    async fn test_balance_poll_signals_only_on_success() {
        let paper = Arc::new(PaperExchange::new("ft", "usdt"));
        paper.set_balance("ft", dec!(5), dec!(0)).await;
        let ctx = context();
        let (tx, mut rx) = signal_channel("balance_ready");
        let poller = BalancePoller::new(paper.clone(), ctx.clone(), Duration::from_secs(1), tx);

        paper.fail_next(Endpoint::Balance, Fault::Transport).await;
        assert!(poller.poll_once().await.is_err());
        assert!(!rx.try_recv());
        assert!(ctx.balance("ft").await.is_none());

        poller.poll_once().await.unwrap();
        assert!(rx.try_recv());
        assert_eq!(ctx.balance("ft").await.unwrap().available().unwrap(), dec!(5));
    }

    #[tokio::test]
    async fn test_balance_burst_leaves_one_pending_signal() {
        let paper = Arc::new(PaperExchange::new("ft", "usdt"));
        let ctx = context();
        let (tx, mut rx) = signal_channel("balance_ready");
        let poller = BalancePoller::new(paper, ctx, Duration::from_secs(1), tx);

        for _ in 0..5 {
            poller.poll_once().await.unwrap();
        }

        assert!(rx.try_recv());
        assert!(!rx.try_recv());
    }

    #[tokio::test(start_paused = true)]
    async fn test_quote_loop_survives_faults_and_stops_on_cancel() {
        let paper = Arc::new(PaperExchange::new("ft", "usdt"));
        paper.set_ticker(dec!(0.5), dec!(0.51)).await;
        paper.fail_next(Endpoint::Ticker, Fault::Transport).await;
        paper.fail_next(Endpoint::Ticker, Fault::Status(1)).await;

        let ctx = context();
        let token = CancellationToken::new();
        let poller = QuotePoller::new(paper.clone(), ctx.clone(), Duration::from_secs(1));
        let handle = tokio::spawn(poller.run(token.clone()));

        // Ticks at 0s, 1s and 2s: two faults then a success.
        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert_eq!(paper.call_count(Endpoint::Ticker).await, 3);
        assert_eq!(ctx.quote().await.unwrap().best_ask, dec!(0.51));

        token.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_balance_loop_recovers_after_fault() {
        let paper = Arc::new(PaperExchange::new("ft", "usdt"));
        paper.set_balance("ft", dec!(5), dec!(0)).await;
        paper.fail_next(Endpoint::Balance, Fault::Transport).await;

        let ctx = context();
        let (tx, mut rx) = signal_channel("balance_ready");
        let token = CancellationToken::new();
        let poller = BalancePoller::new(paper.clone(), ctx.clone(), Duration::from_secs(1), tx);
        let handle = tokio::spawn(poller.run(token.clone()));

        // The 0s tick faults; the 1s tick still fires and signals.
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(paper.call_count(Endpoint::Balance).await, 2);
        assert!(rx.try_recv());
        assert_eq!(ctx.balance("ft").await.unwrap().available().unwrap(), dec!(5));

        token.cancel();
        handle.await.unwrap();
    }
}

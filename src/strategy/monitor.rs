//! Stale order revocation.

use crate::exchange::{ExchangeApi, OrderState};
use crate::strategy::context::ExchangeContext;
use crate::strategy::executor::OrderExecutor;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// An order is stale once its age strictly exceeds `revoke_after_ms`.
///
/// Age is the absolute distance to the server clock, so orders stamped ahead
/// of it count too.
pub fn is_stale(created_at: i64, server_time: i64, revoke_after_ms: i64) -> bool {
    (created_at - server_time).abs() > revoke_after_ms
}

pub struct OrderMonitor {
    exchange: Arc<dyn ExchangeApi>,
    ctx: Arc<ExchangeContext>,
    executor: OrderExecutor,
    interval: Duration,
}

impl OrderMonitor {
    pub fn new(
        exchange: Arc<dyn ExchangeApi>,
        ctx: Arc<ExchangeContext>,
        executor: OrderExecutor,
        interval: Duration,
    ) -> Self {
        Self {
            exchange,
            ctx,
            executor,
            interval,
        }
    }

    /// Exchange clock in ms, or the local clock if it cannot be read.
    async fn server_time(&self) -> i64 {
        let fetched = match self.exchange.get_server_time().await {
            Ok(response) => response.into_result("server time").map_err(anyhow::Error::from),
            Err(e) => Err(e),
        };

        fetched.unwrap_or_else(|e| {
            warn!(error = %e, "Server time unavailable, using local clock");
            chrono::Utc::now().timestamp_millis()
        })
    }

    /// One sweep over every open state. Listing failures skip that state.
    pub async fn check_once(&self) -> Vec<JoinHandle<()>> {
        let revoke_after_ms = self.ctx.params().await.revoke_after_ms;
        let mut tasks = Vec::new();

        for state in OrderState::OPEN {
            let orders = match self.executor.list_orders(state).await {
                Ok(orders) => orders,
                Err(e) => {
                    warn!(state = state.as_str(), error = %e, "Could not list orders");
                    continue;
                }
            };
            if orders.is_empty() {
                continue;
            }

            let now = self.server_time().await;
            for order in orders {
                if is_stale(order.created_at, now, revoke_after_ms) {
                    info!(
                        order_id = %order.id,
                        side = %order.side,
                        price = %order.price,
                        age_ms = (order.created_at - now).abs(),
                        "Revoking stale order"
                    );
                    tasks.push(self.executor.spawn_cancel(order.id));
                } else {
                    debug!(order_id = %order.id, "Order still fresh");
                }
            }
        }

        tasks
    }

    pub async fn run(self, token: CancellationToken) {
        info!(interval_ms = self.interval.as_millis() as u64, "Order monitor started");
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = interval.tick() => {}
            }
            self.check_once().await;
        }

        info!("Order monitor stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::{Endpoint, Fault, OrderSide, PaperExchange};
    use crate::strategy::context::{StrategyParams, TradingPair};
    use rust_decimal_macros::dec;

    const NOW: i64 = 1_700_000_000_000;

    #[test]
    fn test_stale_boundary_is_exclusive() {
        assert!(!is_stale(NOW - 1000, NOW, 1000));
        assert!(is_stale(NOW - 1001, NOW, 1000));
        assert!(!is_stale(NOW, NOW, 0));
        // Clock skew in either direction counts.
        assert!(is_stale(NOW + 1001, NOW, 1000));
    }

    fn monitor(paper: Arc<PaperExchange>) -> OrderMonitor {
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
        let ctx = Arc::new(ExchangeContext::new(pair, params));
        let executor = OrderExecutor::new(paper.clone(), "ftusdt");
        OrderMonitor::new(paper, ctx, executor, Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_only_stale_orders_are_cancelled() {
        let paper = Arc::new(PaperExchange::new("ft", "usdt"));
        paper.set_server_time(Some(NOW)).await;
        let fresh = paper.insert_order(OrderSide::Buy, dec!(0.5), dec!(1), NOW - 1000).await;
        let stale = paper.insert_order(OrderSide::Sell, dec!(0.6), dec!(1), NOW - 1001).await;

        for task in monitor(paper.clone()).check_once().await {
            task.await.unwrap();
        }

        assert_eq!(paper.cancelled_orders().await, vec![stale]);
        assert_eq!(paper.order_state(&fresh).await, Some(OrderState::Submitted));
    }

    #[tokio::test]
    async fn test_falls_back_to_local_clock() {
        let paper = Arc::new(PaperExchange::new("ft", "usdt"));
        paper.fail_next(Endpoint::ServerTime, Fault::Transport).await;
        let ancient = paper.insert_order(OrderSide::Buy, dec!(0.5), dec!(1), 0).await;

        for task in monitor(paper.clone()).check_once().await {
            task.await.unwrap();
        }

        assert_eq!(paper.cancelled_orders().await, vec![ancient]);
    }

    #[tokio::test]
    async fn test_listing_failure_skips_state() {
        let paper = Arc::new(PaperExchange::new("ft", "usdt"));
        paper.set_server_time(Some(NOW)).await;
        paper.insert_order(OrderSide::Buy, dec!(0.5), dec!(1), 0).await;
        paper.fail_next(Endpoint::ListOrders, Fault::Status(500)).await;

        let tasks = monitor(paper.clone()).check_once().await;
        assert!(tasks.is_empty());
        assert_eq!(paper.call_count(Endpoint::ListOrders).await, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_monitor_loop_recovers_after_fault() {
        let paper = Arc::new(PaperExchange::new("ft", "usdt"));
        paper.set_server_time(Some(NOW)).await;
        let stale = paper.insert_order(OrderSide::Buy, dec!(0.5), dec!(1), 0).await;
        paper.fail_next(Endpoint::ListOrders, Fault::Transport).await;

        let token = CancellationToken::new();
        let handle = tokio::spawn(monitor(paper.clone()).run(token.clone()));

        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert_eq!(paper.call_count(Endpoint::ListOrders).await, 2);
        assert!(paper.cancelled_orders().await.is_empty());

        // The 5s tick lists again and revokes the order the first sweep missed.
        tokio::time::sleep(Duration::from_millis(4500)).await;
        assert_eq!(paper.call_count(Endpoint::ListOrders).await, 4);
        assert_eq!(paper.cancelled_orders().await, vec![stale]);

        token.cancel();
        handle.await.unwrap();
    }
}

//! Engine: owns the context and runs every long-lived loop.

use crate::config::{Config, TradingMode};
use crate::exchange::ExchangeApi;
use crate::strategy::cadence::{GatedCadence, TradeCadence, WashCycleCadence};
use crate::strategy::context::ExchangeContext;
use crate::strategy::executor::OrderExecutor;
use crate::strategy::monitor::OrderMonitor;
use crate::strategy::poller::QuotePoller;
use crate::strategy::reload::ConfigReloader;
use anyhow::Result;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

pub struct Engine {
    config: Config,
    exchange: Arc<dyn ExchangeApi>,
    ctx: Arc<ExchangeContext>,
    executor: OrderExecutor,
    config_path: Option<String>,
}

impl Engine {
    /// Resolve the trading pair and build the shared context.
    ///
    /// Fails when the currency list cannot be fetched or the symbol is not
    /// made of two listed currencies.
    pub async fn new(config: Config, exchange: Arc<dyn ExchangeApi>) -> Result<Self> {
        let ctx = Arc::new(ExchangeContext::initialize(exchange.as_ref(), &config).await?);
        let executor = OrderExecutor::new(exchange.clone(), ctx.pair().symbol.clone());

        Ok(Self {
            config,
            exchange,
            ctx,
            executor,
            config_path: None,
        })
    }

    /// Reload strategy parameters from `path` every `intervals.reload_ms`.
    pub fn with_reload_path(mut self, path: impl Into<String>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    pub fn context(&self) -> Arc<ExchangeContext> {
        self.ctx.clone()
    }

    fn cadence(&self) -> Box<dyn TradeCadence> {
        let intervals = &self.config.intervals;
        match self.config.trading.mode {
            TradingMode::Gated => Box::new(GatedCadence::new(
                self.exchange.clone(),
                self.ctx.clone(),
                self.executor.clone(),
                intervals.balance(),
            )),
            TradingMode::WashCycle => Box::new(WashCycleCadence::new(
                self.exchange.clone(),
                self.ctx.clone(),
                self.executor.clone(),
                intervals.wash_cycle(),
            )),
        }
    }

    /// Run until `token` is cancelled, then wait for every loop to exit.
    pub async fn run(self, token: CancellationToken) -> Result<()> {
        let mut tasks = JoinSet::new();

        let quote_poller = QuotePoller::new(
            self.exchange.clone(),
            self.ctx.clone(),
            self.config.intervals.quote(),
        );
        tasks.spawn(quote_poller.run(token.clone()));

        let cadence = self.cadence();
        info!(cadence = cadence.name(), symbol = %self.ctx.pair().symbol, "Starting trade cadence");
        tasks.spawn(cadence.run(token.clone()));

        if self.config.order_monitor.enabled {
            let monitor = OrderMonitor::new(
                self.exchange.clone(),
                self.ctx.clone(),
                self.executor.clone(),
                self.config.intervals.check_order(),
            );
            tasks.spawn(monitor.run(token.clone()));
        } else {
            info!("Order monitor disabled");
        }

        if let (Some(path), Some(interval)) = (self.config_path, self.config.intervals.reload()) {
            let reloader = ConfigReloader::new(path, self.ctx.clone(), interval);
            tasks.spawn(reloader.run(token.clone()));
        }

        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                error!(error = %e, "Engine task panicked");
            }
        }

        info!("Engine stopped");
        Ok(())
    }
}

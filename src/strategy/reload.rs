//! Periodic configuration reload.

use crate::config::Config;
use crate::strategy::context::{ExchangeContext, StrategyParams};
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Re-reads the config file and applies strategy parameters to the context.
///
/// Only `StrategyParams` are live; symbol, mode and intervals keep their
/// startup values.
pub struct ConfigReloader {
    path: String,
    ctx: Arc<ExchangeContext>,
    interval: Duration,
}

impl ConfigReloader {
    pub fn new(path: impl Into<String>, ctx: Arc<ExchangeContext>, interval: Duration) -> Self {
        Self {
            path: path.into(),
            ctx,
            interval,
        }
    }

    pub async fn reload_once(&self) -> Result<StrategyParams> {
        let config = Config::load(&self.path)?;
        config.validate()?;

        if config.trading.symbol != self.ctx.pair().symbol {
            warn!(
                configured = %config.trading.symbol,
                running = %self.ctx.pair().symbol,
                "Symbol changes need a restart, ignoring"
            );
        }

        let params = StrategyParams::from(&config);
        self.ctx.apply_params(params.clone()).await;
        Ok(params)
    }

    pub async fn run(self, token: CancellationToken) {
        info!(path = %self.path, interval_ms = self.interval.as_millis() as u64, "Config reloader started");
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The startup load already applied the first tick's contents.
        interval.tick().await;

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = interval.tick() => {}
            }

            if let Err(e) = self.reload_once().await {
                warn!(error = %e, "Config reload failed, keeping current parameters");
            }
        }

        info!("Config reloader stopped");
    }
}

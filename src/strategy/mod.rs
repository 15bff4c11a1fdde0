//! Trading automation.
//!
//! Contains:
//! - The shared exchange context and the coalescing signal channel
//! - Quote and balance pollers
//! - The balance gate with its make-up rebalancing
//! - Order execution, the trade trigger and stale order revocation
//! - The two trade cadences and the engine that runs everything

mod cadence;
mod context;
mod engine;
mod executor;
mod monitor;
mod poller;
mod rebalancer;
mod reload;
mod signal;
mod trigger;

pub use cadence::{GatedCadence, TradeCadence, WashCycleCadence};
pub use context::{ExchangeContext, StrategyParams, TradingPair};
pub use engine::Engine;
pub use executor::{format_price, format_quantity, percent_of, OrderExecutor};
pub use monitor::{is_stale, OrderMonitor};
pub use poller::{current_quote, refresh_balances, BalancePoller, QuotePoller};
pub use rebalancer::{classify, is_ready, BalanceGate, GateDecision, MakeUpPlan};
pub use reload::ConfigReloader;
pub use signal::{signal_channel, SignalReceiver, SignalSender};
pub use trigger::{trade_price, TradeTrigger};

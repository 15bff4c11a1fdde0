//! FCoin Trader - Main Entry Point

use anyhow::Result;
use clap::{Parser, Subcommand};
use fcoin_trader::config::{Config, LoggingConfig};
use fcoin_trader::exchange::{ExchangeApi, FcoinClient, PaperExchange};
use fcoin_trader::strategy::{refresh_balances, Engine, ExchangeContext, OrderExecutor};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

/// FCoin Trader CLI
#[derive(Parser)]
#[command(name = "fcoin-trader")]
#[command(version, about = "Automated pair trading on FCoin")]
struct Cli {
    /// Config file, with or without extension
    #[arg(short, long, default_value = "config")]
    config: String,

    /// Trade against an in-memory paper exchange
    #[arg(long)]
    paper: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the pair's balances and open orders, then exit
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load(&cli.config)?;
    let _guard = init_logging(&config.logging)?;
    config.validate()?;
    log_config(&config, cli.paper);

    let exchange = build_exchange(&config, cli.paper).await?;

    if let Some(Commands::Status) = cli.command {
        return show_status(exchange, &config).await;
    }

    let engine = Engine::new(config, exchange)
        .await?
        .with_reload_path(cli.config);

    let token = CancellationToken::new();
    let shutdown = token.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        warn!("Shutdown signal received");
        shutdown.cancel();
    });

    engine.run(token).await?;
    info!("FCoin Trader shutdown complete");
    Ok(())
}

async fn build_exchange(config: &Config, paper: bool) -> Result<Arc<dyn ExchangeApi>> {
    if !paper {
        warn!("LIVE TRADING MODE - real funds at risk");
        return Ok(Arc::new(FcoinClient::new(&config.fcoin)?));
    }

    info!("PAPER TRADING MODE");
    let (base, quote) = paper_pair(&config.trading.symbol);
    Ok(Arc::new(PaperExchange::demo(&base, &quote).await))
}

/// Split a symbol for the paper exchange, which has no currency list of its
/// own to resolve against.
fn paper_pair(symbol: &str) -> (String, String) {
    const QUOTES: [&str; 5] = ["usdt", "btc", "eth", "ft", "pax"];
    QUOTES
        .iter()
        .find_map(|quote| {
            symbol
                .strip_suffix(quote)
                .filter(|base| !base.is_empty())
                .map(|base| (base.to_string(), quote.to_string()))
        })
        .unwrap_or_else(|| (symbol.to_string(), "usdt".to_string()))
}

/// One-shot account summary.
async fn show_status(exchange: Arc<dyn ExchangeApi>, config: &Config) -> Result<()> {
    let ctx = ExchangeContext::initialize(exchange.as_ref(), config).await?;
    refresh_balances(exchange.as_ref(), &ctx).await?;
    let pair = ctx.pair();

    println!("FCoin Trader status");
    println!("  Symbol: {} ({} / {})", pair.symbol, pair.base, pair.quote);

    println!("\nBalances");
    for currency in [&pair.base, &pair.quote] {
        match ctx.balance(currency).await {
            Some(record) => println!(
                "  {:<8} available {:>18}  frozen {:>18}  total {:>18}",
                currency, record.available, record.frozen, record.balance
            ),
            None => println!("  {:<8} no balance record", currency),
        }
    }

    let orders = OrderExecutor::new(exchange.clone(), pair.symbol.clone())
        .list_open_orders()
        .await?;
    println!("\nOpen orders ({})", orders.len());
    for order in &orders {
        println!(
            "  {} {:<4} {} @ {} [{}] created {}",
            order.id,
            order.side,
            order.amount,
            order.price,
            order.state.as_str(),
            order.created_at
        );
    }

    Ok(())
}

/// Initialize logging to stdout and an hourly rolling file.
///
/// The returned guard flushes the file writer on drop.
fn init_logging(config: &LoggingConfig) -> Result<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::fmt::writer::MakeWriterExt;

    std::fs::create_dir_all(&config.directory)?;

    let file_appender = tracing_appender::rolling::hourly(&config.directory, &config.file_prefix);
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&config.filter))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stdout.and(file_writer))
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .init();

    Ok(guard)
}

/// Log configuration on startup.
fn log_config(config: &Config, paper: bool) {
    info!("FCoin Trader v{}", env!("CARGO_PKG_VERSION"));
    info!(
        symbol = %config.trading.symbol,
        mode = ?config.trading.mode,
        paper,
        "Trading"
    );
    info!(
        sell_size = %config.trading.sell_size,
        expect_value = %config.trading.expect_value,
        make_up_percent = config.trading.make_up_percent,
        balance_percent = config.trading.balance_percent,
        "Strategy"
    );
    info!(
        quote_ms = config.intervals.quote_ms,
        balance_ms = config.intervals.balance_ms,
        wash_cycle_ms = config.intervals.wash_cycle_ms,
        check_order_ms = config.intervals.check_order_ms,
        reload_ms = config.intervals.reload_ms,
        "Intervals"
    );
    info!(
        enabled = config.order_monitor.enabled,
        revoke_after_ms = config.order_monitor.revoke_after_ms,
        "Order monitor"
    );
}

//! Trendpilot CLI: live trading loop, backtests, candle collection.
//!
//! Commands:
//! - `live`: run the strategy at every quarter-hour boundary
//! - `backtest`: replay candles from CSV, stored history, or a synthetic walk
//! - `collect`: append the newest closed candle to history at each boundary
//! - `orders`: list stored orders

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{TimeZone, Utc};
use clap::{ArgGroup, Parser, Subcommand};
use tracing::{info, warn};
use trendpilot_core::account::AccountSummary;
use trendpilot_core::data::{parse_interval, synthetic_candles, BinanceProvider};
use trendpilot_core::domain::OrderRecord;
use trendpilot_runner::notify::Notifier;
use trendpilot_runner::{
    candles_from_history, init_logging, load_candles_csv, run_backtest, save_report, Cadence,
    Collector, JsonStore, LiveTrader, LogNotifier, MemoryMonitor, OrderStore, Scheduler, Settings,
    TelegramNotifier,
};

#[derive(Parser)]
#[command(
    name = "trendpilot",
    about = "Trendpilot: trend-following signal bot with simulated leveraged execution"
)]
struct Cli {
    /// Settings file (TOML). Defaults apply when it does not exist.
    #[arg(long, global = true, default_value = "trendpilot.toml")]
    config: PathBuf,

    /// Log filter, e.g. `debug` or `trendpilot_runner=trace`. Overrides RUST_LOG.
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the live loop until interrupted.
    Live {
        /// Poll every few seconds instead of waiting for quarter-hour boundaries.
        #[arg(long, default_value_t = false)]
        test_mode: bool,

        /// Log trade events instead of sending them to Telegram.
        #[arg(long, default_value_t = false)]
        no_notify: bool,

        /// Report memory usage in the background.
        #[arg(long, default_value_t = false)]
        monitor: bool,
    },
    /// Replay a candle series and save summary.json + trades.csv.
    #[command(group(ArgGroup::new("source").required(true).args(["csv", "history", "synthetic"])))]
    Backtest {
        /// Candle CSV (open_time,open,high,low,close,volume[,close_time]).
        #[arg(long)]
        csv: Option<PathBuf>,

        /// Use the collected candle history in the data directory.
        #[arg(long, default_value_t = false)]
        history: bool,

        /// Generate this many synthetic candles.
        #[arg(long)]
        synthetic: Option<usize>,

        /// Output directory for artifacts.
        #[arg(long, default_value = "results")]
        out: PathBuf,
    },
    /// Collect closed candles into the history file.
    Collect {
        /// Poll every few seconds instead of waiting for quarter-hour boundaries.
        #[arg(long, default_value_t = false)]
        test_mode: bool,
    },
    /// List stored orders.
    Orders {
        /// Print the rows as JSON instead of a table.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_level.as_deref());

    let settings = Settings::load_or_default(&cli.config)
        .with_context(|| format!("failed to load settings from {}", cli.config.display()))?;

    match cli.command {
        Commands::Live {
            test_mode,
            no_notify,
            monitor,
        } => run_live(settings, test_mode, no_notify, monitor),
        Commands::Backtest {
            csv,
            history,
            synthetic,
            out,
        } => run_backtest_cmd(&settings, csv.as_deref(), history, synthetic, &out),
        Commands::Collect { test_mode } => run_collect(&settings, test_mode),
        Commands::Orders { json } => run_orders(&settings, json),
    }
}

fn cadence(settings: &Settings, test_mode: bool) -> Cadence {
    if test_mode {
        Cadence::Poll(Duration::from_secs(settings.schedule.test_poll_secs))
    } else {
        Cadence::Quarter {
            minutes: settings.schedule.quarter_minutes,
            window_secs: settings.schedule.trigger_window_secs,
        }
    }
}

fn provider(settings: &Settings) -> Result<BinanceProvider> {
    BinanceProvider::new(
        settings.market.base_url.clone(),
        Duration::from_secs(settings.market.request_timeout_secs),
    )
    .context("failed to build exchange client")
}

fn notifier(settings: &Settings, no_notify: bool) -> Result<Box<dyn Notifier>> {
    let notify = &settings.notify;
    if no_notify || !notify.enabled {
        return Ok(Box::new(LogNotifier));
    }
    match (&notify.telegram_token, &notify.telegram_chat_id) {
        (Some(token), Some(chat_id)) => {
            let telegram = TelegramNotifier::new(
                token,
                chat_id,
                Duration::from_secs(settings.market.request_timeout_secs),
            )?;
            Ok(Box::new(telegram))
        }
        _ => {
            warn!("telegram credentials missing, logging trade events instead");
            Ok(Box::new(LogNotifier))
        }
    }
}

fn run_live(settings: Settings, test_mode: bool, no_notify: bool, monitor: bool) -> Result<()> {
    let store = JsonStore::open(&settings.storage.data_dir).context("failed to open order store")?;
    if let Some(from) = store.migrated_from() {
        info!(from, "order store migrated");
    }
    let source = provider(&settings)?;
    let notifier = notifier(&settings, no_notify)?;
    let mut scheduler = Scheduler::new(cadence(&settings, test_mode))?;

    let _monitor = if monitor {
        Some(MemoryMonitor::spawn(
            Duration::from_secs(settings.monitor.interval_secs.max(1)),
            settings.monitor.warn_mb,
        )?)
    } else {
        None
    };

    info!(fingerprint = %settings.fingerprint(), test_mode, "starting live trader");
    let mut trader = LiveTrader::new(settings, source, store, notifier);
    trader.startup()?;
    trader.run(&mut scheduler);

    print_summary(&trader.summary());
    Ok(())
}

fn run_backtest_cmd(
    settings: &Settings,
    csv: Option<&Path>,
    history: bool,
    synthetic: Option<usize>,
    out: &Path,
) -> Result<()> {
    let interval = parse_interval(&settings.market.interval)?;
    let symbol = &settings.market.symbol;

    let (candles, label) = if let Some(path) = csv {
        (load_candles_csv(path, interval)?, path.display().to_string())
    } else if history {
        let store = JsonStore::open(&settings.storage.data_dir)?;
        let records = store.candle_history()?;
        (
            candles_from_history(&records, symbol, &settings.market.interval),
            store.candles_path().display().to_string(),
        )
    } else {
        let count = synthetic.unwrap_or(0);
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).single().context("invalid start")?;
        (
            synthetic_candles(symbol, start, count, interval),
            "synthetic".to_string(),
        )
    };

    if candles.len() <= settings.strategy.warmup() {
        warn!(
            candles = candles.len(),
            warmup = settings.strategy.warmup(),
            "series is shorter than the indicator warm-up; no trades possible"
        );
    }

    let report = run_backtest(&candles, settings);
    println!();
    println!("=== Backtest: {} {} ({label}) ===", report.symbol, report.interval);
    if let (Some(start), Some(end)) = (report.start, report.end) {
        println!("Period:         {start} to {end}");
    }
    println!("Candles:        {}", report.candles);
    if report.open_at_end {
        println!("Open at end:    yes (not counted)");
    }
    print_summary(&report.summary);
    for month in &report.monthly {
        println!(
            "  {}-{:02}: {:+.2}%",
            month.year, month.month, month.profit_percent
        );
    }

    let run_dir = save_report(&report, out)?;
    println!("Artifacts saved to: {}", run_dir.display());
    Ok(())
}

fn run_collect(settings: &Settings, test_mode: bool) -> Result<()> {
    let store = JsonStore::open(&settings.storage.data_dir)?;
    let mut scheduler = Scheduler::new(cadence(settings, test_mode))?;
    let mut collector = Collector::new(
        &settings.market.symbol,
        &settings.market.interval,
        provider(settings)?,
        store,
    );
    collector.run(&mut scheduler);
    Ok(())
}

fn run_orders(settings: &Settings, json: bool) -> Result<()> {
    let store = JsonStore::open(&settings.storage.data_dir)?;
    let orders = store.all_orders()?;
    if json {
        println!("{}", serde_json::to_string_pretty(&orders)?);
        return Ok(());
    }
    if orders.is_empty() {
        println!("No orders in {}", store.orders_path().display());
        return Ok(());
    }
    println!(
        "{:>5}  {:<8} {:<5} {:<6} {:>12} {:>12} {:>10} {:>9}  {}",
        "id", "symbol", "side", "status", "entry", "close", "profit", "profit%", "opened"
    );
    for order in &orders {
        println!("{}", format_order(order));
    }
    Ok(())
}

fn format_order(o: &OrderRecord) -> String {
    let opt = |v: Option<f64>, prec: usize| v.map_or_else(|| "-".to_string(), |x| format!("{x:.prec$}"));
    format!(
        "{:>5}  {:<8} {:<5} {:<6} {:>12} {:>12} {:>10} {:>9}  {}",
        o.id,
        o.symbol,
        o.side.as_str(),
        if o.is_open() { "open" } else { "closed" },
        format!("{:.2}", o.entry_price),
        opt(o.close_price, 2),
        opt(o.profit, 4),
        opt(o.profit_percent, 2),
        o.open_time,
    )
}

fn print_summary(summary: &AccountSummary) {
    println!();
    println!("--- Account ---");
    println!("First Balance:  {:.2}", summary.first_balance);
    println!("Final Balance:  {:.2}", summary.final_balance);
    println!("Without Fees:   {:.2}", summary.balance_without_fee);
    println!("Reserve:        {:.2}", summary.save_money);
    println!("Tactical:       {:.2}", summary.tactical_balance);
    println!("Net Profit:     {:.2}%", summary.net_profit_percent);
    println!("Fees Paid:      {:.4}", summary.fees_paid);
    println!();
    println!("--- Trades ---");
    println!("Closed:         {}", summary.closed_trades);
    println!(
        "Wins/Losses:    {}/{} ({:.1}%)",
        summary.wins, summary.losses, summary.win_rate
    );
    println!("Long wins:      {}/{}", summary.wins_long, summary.total_long);
    println!("Short wins:     {}/{}", summary.wins_short, summary.total_short);
    println!("Max Drawdown:   {:.2}%", summary.max_drawdown);
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn backtest_requires_exactly_one_source() {
        assert!(Cli::try_parse_from(["trendpilot", "backtest"]).is_err());
        assert!(Cli::try_parse_from(["trendpilot", "backtest", "--history", "--synthetic", "10"]).is_err());
        assert!(Cli::try_parse_from(["trendpilot", "backtest", "--synthetic", "500"]).is_ok());
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "trendpilot",
            "live",
            "--test-mode",
            "--no-notify",
            "--config",
            "x.toml",
            "--log-level",
            "debug",
        ])
        .unwrap();
        assert_eq!(cli.config, PathBuf::from("x.toml"));
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        assert!(matches!(
            cli.command,
            Commands::Live {
                test_mode: true,
                no_notify: true,
                monitor: false
            }
        ));
    }

    #[test]
    fn orders_json_flag() {
        let cli = Cli::try_parse_from(["trendpilot", "orders", "--json"]).unwrap();
        assert!(matches!(cli.command, Commands::Orders { json: true }));
    }

    #[test]
    fn test_mode_polls() {
        let settings = Settings::default();
        assert_eq!(cadence(&settings, true), Cadence::Poll(Duration::from_secs(5)));
        assert!(matches!(cadence(&settings, false), Cadence::Quarter { minutes: 15, .. }));
    }
}

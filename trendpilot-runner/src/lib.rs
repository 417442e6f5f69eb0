//! Trendpilot Runner: live loop, scheduling, persistence, notifications.
//!
//! This crate builds on `trendpilot-core` to provide:
//! - TOML settings with environment overrides and a settings fingerprint
//! - Order and candle persistence with versioned schema migration
//! - Wall-clock scheduler with Ctrl-C shutdown
//! - Live cycle orchestration and offline backtest replay
//! - Candle history collector
//! - Telegram notifications and CSV trade log
//! - Background memory reporter

pub mod backtest;
pub mod candles_csv;
pub mod collector;
pub mod live;
pub mod logging;
pub mod monitor;
pub mod notify;
pub mod scheduler;
pub mod settings;
pub mod store;
pub mod trade_log;

pub use backtest::{candles_from_history, run_backtest, save_report, BacktestReport};
pub use candles_csv::load_candles_csv;
pub use collector::Collector;
pub use live::{LiveTrader, PersistingSink};
pub use logging::init_logging;
pub use monitor::{MemoryMonitor, MemoryProbe, MemorySample};
pub use notify::{LogNotifier, Notifier, NotifyError, NullNotifier, TelegramNotifier, TradeEvent};
pub use scheduler::{in_trigger_window, next_boundary, Cadence, Scheduler, ShutdownHandle, Tick};
pub use settings::{Settings, SettingsError};
pub use store::{CandleRecord, JsonStore, MemoryStore, OrderStore, StoreError};
pub use trade_log::{TradeLog, TradeLogRow};

#[cfg(test)]
mod send_sync_checks {
    use super::*;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn stores_are_send_sync() {
        assert_send::<JsonStore>();
        assert_sync::<JsonStore>();
        assert_send::<MemoryStore>();
        assert_sync::<MemoryStore>();
    }

    #[test]
    fn settings_and_reports_are_send_sync() {
        assert_send::<Settings>();
        assert_sync::<Settings>();
        assert_send::<BacktestReport>();
        assert_sync::<BacktestReport>();
    }

    #[test]
    fn notifiers_are_send_sync() {
        assert_send::<TelegramNotifier>();
        assert_sync::<TelegramNotifier>();
        assert_send::<ShutdownHandle>();
        assert_sync::<ShutdownHandle>();
    }
}

//! Runtime settings loaded from a TOML file.
//!
//! Every field has a default, so an empty (or missing) file yields a
//! working configuration. The Telegram credentials can also be supplied via
//! `TRENDPILOT_TELEGRAM_TOKEN` / `TRENDPILOT_TELEGRAM_CHAT_ID`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use trendpilot_core::account::RiskParams;
use trendpilot_core::data::{binance::DEFAULT_BASE_URL, parse_interval};
use trendpilot_core::strategy::StrategySettings;

pub const ENV_TELEGRAM_TOKEN: &str = "TRENDPILOT_TELEGRAM_TOKEN";
pub const ENV_TELEGRAM_CHAT_ID: &str = "TRENDPILOT_TELEGRAM_CHAT_ID";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse settings file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid setting `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

fn invalid(field: &'static str, reason: impl Into<String>) -> SettingsError {
    SettingsError::Invalid {
        field,
        reason: reason.into(),
    }
}

/// Exchange and instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketSettings {
    pub symbol: String,
    pub interval: String,
    /// Candles fetched per cycle; must cover the slowest indicator.
    pub candle_limit: usize,
    pub base_url: String,
    pub request_timeout_secs: u64,
}

impl Default for MarketSettings {
    fn default() -> Self {
        Self {
            symbol: "BTCUSDT".into(),
            interval: "15m".into(),
            candle_limit: 300,
            base_url: DEFAULT_BASE_URL.into(),
            request_timeout_secs: 10,
        }
    }
}

/// Wall-clock alignment of the live loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleSettings {
    /// Boundary spacing in minutes (15 means :00, :15, :30, :45).
    pub quarter_minutes: u32,
    /// A wake-up this many seconds past a boundary still counts as on time.
    pub trigger_window_secs: u32,
    /// Poll period when running in test mode.
    pub test_poll_secs: u64,
}

impl Default for ScheduleSettings {
    fn default() -> Self {
        Self {
            quarter_minutes: 15,
            trigger_window_secs: 5,
            test_poll_secs: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub data_dir: PathBuf,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
        }
    }
}

impl StorageSettings {
    pub fn orders_path(&self) -> PathBuf {
        self.data_dir.join("orders.json")
    }

    pub fn candles_path(&self) -> PathBuf {
        self.data_dir.join("candles.jsonl")
    }

    pub fn trade_log_path(&self) -> PathBuf {
        self.data_dir.join("trades.csv")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifySettings {
    pub enabled: bool,
    pub telegram_token: Option<String>,
    pub telegram_chat_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorSettings {
    pub interval_secs: u64,
    /// Process RSS above this many megabytes is logged as a warning.
    pub warn_mb: u64,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            interval_secs: 60,
            warn_mb: 512,
        }
    }
}

/// Full settings document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub market: MarketSettings,
    pub strategy: StrategySettings,
    pub risk: RiskParams,
    pub schedule: ScheduleSettings,
    pub storage: StorageSettings,
    pub notify: NotifySettings,
    pub monitor: MonitorSettings,
}

impl Settings {
    /// Load from `path`, apply environment overrides, validate.
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let raw = std::fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut settings = Self::from_toml_str(&raw).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        settings.apply_env(|key| std::env::var(key).ok());
        settings.validate()?;
        Ok(settings)
    }

    /// Load `path` if it exists; otherwise defaults plus environment.
    pub fn load_or_default(path: &Path) -> Result<Self, SettingsError> {
        if path.exists() {
            return Self::load(path);
        }
        let mut settings = Self::default();
        settings.apply_env(|key| std::env::var(key).ok());
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }

    /// Overlay credentials from the environment. `lookup` is injectable for tests.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(token) = lookup(ENV_TELEGRAM_TOKEN).filter(|v| !v.is_empty()) {
            self.notify.telegram_token = Some(token);
        }
        if let Some(chat_id) = lookup(ENV_TELEGRAM_CHAT_ID).filter(|v| !v.is_empty()) {
            self.notify.telegram_chat_id = Some(chat_id);
        }
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.market.symbol.trim().is_empty() {
            return Err(invalid("market.symbol", "must not be empty"));
        }
        parse_interval(&self.market.interval)
            .map_err(|e| invalid("market.interval", e.to_string()))?;

        let s = &self.strategy;
        for (field, period) in [
            ("strategy.ema_period", s.ema_period),
            ("strategy.ma_period", s.ma_period),
            ("strategy.trend_fast_period", s.trend_fast_period),
            ("strategy.trend_slow_period", s.trend_slow_period),
            ("strategy.adx_period", s.adx_period),
            ("strategy.volume_lookback", s.volume_lookback),
        ] {
            if period == 0 {
                return Err(invalid(field, "must be positive"));
            }
        }
        if self.market.candle_limit <= s.warmup() {
            return Err(invalid(
                "market.candle_limit",
                format!(
                    "{} does not cover the {}-candle indicator warm-up",
                    self.market.candle_limit,
                    s.warmup()
                ),
            ));
        }

        let r = &self.risk;
        if !(r.trade_amount_percent > 0.0 && r.trade_amount_percent <= 1.0) {
            return Err(invalid(
                "risk.trade_amount_percent",
                format!("{} is outside (0, 1]", r.trade_amount_percent),
            ));
        }
        if r.first_balance <= 0.0 || r.tactical_balance <= 0.0 {
            return Err(invalid("risk.first_balance", "balances must be positive"));
        }
        if r.fee_rate < 0.0 {
            return Err(invalid("risk.fee_rate", "must not be negative"));
        }
        if r.low_leverage == 0 || r.high_leverage == 0 {
            return Err(invalid("risk.high_leverage", "leverage must be at least 1"));
        }

        if self.schedule.quarter_minutes == 0 || 60 % self.schedule.quarter_minutes != 0 {
            return Err(invalid(
                "schedule.quarter_minutes",
                "must divide the hour evenly",
            ));
        }
        if self.schedule.test_poll_secs == 0 {
            return Err(invalid("schedule.test_poll_secs", "must be positive"));
        }

        if self.notify.enabled
            && (self.notify.telegram_token.is_none() || self.notify.telegram_chat_id.is_none())
        {
            return Err(invalid(
                "notify.enabled",
                format!("telegram token and chat id are required (or set {ENV_TELEGRAM_TOKEN} / {ENV_TELEGRAM_CHAT_ID})"),
            ));
        }
        Ok(())
    }

    /// Deterministic hash of everything that affects trading decisions.
    ///
    /// Storage, notification and monitor settings are excluded so the same
    /// strategy run from another machine fingerprints identically.
    pub fn fingerprint(&self) -> String {
        #[derive(Serialize)]
        struct Canonical<'a> {
            market: (&'a str, &'a str),
            strategy: &'a StrategySettings,
            risk: &'a RiskParams,
        }
        let canonical = Canonical {
            market: (&self.market.symbol, &self.market.interval),
            strategy: &self.strategy,
            risk: &self.risk,
        };
        // Plain structs of numbers and strings always serialize.
        let json = serde_json::to_string(&canonical).unwrap_or_default();
        blake3::hash(json.as_bytes()).to_hex().to_string()
    }
}

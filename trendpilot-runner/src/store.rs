//! Order and candle persistence.
//!
//! `JsonStore` keeps two files under the data directory:
//! - `orders.json`: versioned document holding every order row, rewritten
//!   atomically (write to .tmp, rename into place) on each change
//! - `candles.jsonl`: append-only candle history, one JSON object per line,
//!   duplicates (same open time) skipped
//!
//! Older order documents are migrated forward once, when the store opens.
//!
//! Each order transition rewrites the whole `orders.json`, so a write costs
//! O(orders). The bot opens at most one position per 15-minute candle and
//! usually a few per day, which keeps the document in the kilobyte range for
//! years. Prune or archive closed rows if that stops holding.

use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};
use trendpilot_core::calendar::format_millis;
use trendpilot_core::domain::{Candle, NewOrder, OrderClose, OrderRecord};

/// Current `orders.json` schema version.
///
/// v1: the original order columns only (no balances, no fee-free shadow).
/// v2: adds balances, fee-free margin/size and `current_position`.
pub const SCHEMA_VERSION: u32 = 2;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("order store version {found} is newer than supported version {supported}")]
    UnsupportedVersion { found: u32, supported: u32 },

    #[error("order {0} not found")]
    UnknownOrder(i64),
}

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// One persisted candle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandleRecord {
    pub symbol: String,
    pub interval: String,
    /// Open time, epoch milliseconds. Unique per symbol and interval.
    pub timestamp: i64,
    /// Open time rendered for humans.
    pub datetime: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub close_timestamp: i64,
}

impl CandleRecord {
    pub fn from_candle(symbol: &str, interval: &str, candle: &Candle) -> Self {
        let timestamp = candle.open_time.timestamp_millis();
        Self {
            symbol: symbol.to_string(),
            interval: interval.to_string(),
            timestamp,
            datetime: format_millis(timestamp).unwrap_or_default(),
            open: candle.open,
            high: candle.high,
            low: candle.low,
            close: candle.close,
            volume: candle.volume,
            close_timestamp: candle.close_time.timestamp_millis(),
        }
    }

    /// `None` if either timestamp is out of range.
    pub fn to_candle(&self) -> Option<Candle> {
        Some(Candle {
            open_time: DateTime::<Utc>::from_timestamp_millis(self.timestamp)?,
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
            volume: self.volume,
            close_time: DateTime::<Utc>::from_timestamp_millis(self.close_timestamp)?,
        })
    }
}

/// Persistence port used by the live cycle.
pub trait OrderStore {
    /// Record a newly opened order and return its id.
    fn insert_open(&mut self, order: &NewOrder) -> Result<i64, StoreError>;

    /// Mark an order closed.
    fn update_close(&mut self, id: i64, close: &OrderClose) -> Result<(), StoreError>;

    /// The open order with the highest id, if any.
    fn latest_open(&self) -> Result<Option<OrderRecord>, StoreError>;

    fn all_orders(&self) -> Result<Vec<OrderRecord>, StoreError>;

    /// Append a candle to history. Returns false if that open time was already stored.
    fn append_candle(&mut self, candle: &CandleRecord) -> Result<bool, StoreError>;

    fn candle_history(&self) -> Result<Vec<CandleRecord>, StoreError>;
}

impl<T: OrderStore + ?Sized> OrderStore for Box<T> {
    fn insert_open(&mut self, order: &NewOrder) -> Result<i64, StoreError> {
        (**self).insert_open(order)
    }

    fn update_close(&mut self, id: i64, close: &OrderClose) -> Result<(), StoreError> {
        (**self).update_close(id, close)
    }

    fn latest_open(&self) -> Result<Option<OrderRecord>, StoreError> {
        (**self).latest_open()
    }

    fn all_orders(&self) -> Result<Vec<OrderRecord>, StoreError> {
        (**self).all_orders()
    }

    fn append_candle(&mut self, candle: &CandleRecord) -> Result<bool, StoreError> {
        (**self).append_candle(candle)
    }

    fn candle_history(&self) -> Result<Vec<CandleRecord>, StoreError> {
        (**self).candle_history()
    }
}

/// On-disk shape of `orders.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrdersDocument {
    #[serde(default)]
    pub version: u32,
    #[serde(default)]
    pub next_id: i64,
    pub orders: Vec<OrderRecord>,
}

impl Default for OrdersDocument {
    fn default() -> Self {
        Self {
            version: SCHEMA_VERSION,
            next_id: 1,
            orders: Vec::new(),
        }
    }
}

impl OrdersDocument {
    fn insert(&mut self, order: &NewOrder) -> i64 {
        let id = self.next_id;
        self.next_id += 1;
        self.orders.push(order.clone().into_record(id));
        id
    }

    fn close(&mut self, id: i64, close: &OrderClose) -> Result<(), StoreError> {
        let record = self
            .orders
            .iter_mut()
            .find(|o| o.id == id)
            .ok_or(StoreError::UnknownOrder(id))?;
        record.apply_close(close);
        Ok(())
    }

    fn latest_open(&self) -> Option<&OrderRecord> {
        self.orders
            .iter()
            .filter(|o| o.is_open())
            .max_by_key(|o| o.id)
    }
}

/// Schema version of a raw order document. v1 files are either a bare
/// array of order rows or an object without (or with) `"version": 1`.
pub fn document_version(raw: &Value) -> u32 {
    raw.get("version")
        .and_then(Value::as_u64)
        .map(|v| v as u32)
        .unwrap_or(1)
}

/// Upgrade a raw order document (at most [`SCHEMA_VERSION`]) to the current schema.
pub fn migrate_orders(raw: Value) -> Result<OrdersDocument, serde_json::Error> {
    let found = document_version(&raw);
    let mut doc = match raw {
        Value::Array(orders) => serde_json::json!({ "orders": orders }),
        other => other,
    };

    if found < 2 {
        upgrade_v1_to_v2(&mut doc);
    }

    let mut parsed: OrdersDocument = serde_json::from_value(doc)?;
    parsed.version = SCHEMA_VERSION;
    let max_id = parsed.orders.iter().map(|o| o.id).max().unwrap_or(0);
    parsed.next_id = parsed.next_id.max(max_id + 1);
    Ok(parsed)
}

/// v2 columns are nullable; open rows also learn which side they hold.
fn upgrade_v1_to_v2(doc: &mut Value) {
    const V2_COLUMNS: [&str; 6] = [
        "balance",
        "balance_without_fee",
        "balance_before_trade",
        "balance_before_trade_no_fee",
        "margin_no_fee",
        "position_size_no_fee",
    ];

    let Some(orders) = doc.get_mut("orders").and_then(Value::as_array_mut) else {
        return;
    };
    for order in orders.iter_mut() {
        let Some(row) = order.as_object_mut() else {
            continue;
        };
        for column in V2_COLUMNS {
            row.entry(column).or_insert(Value::Null);
        }
        let is_open = row.get("status").and_then(Value::as_str) == Some("open");
        let side = row.get("side").cloned().unwrap_or(Value::Null);
        row.entry("current_position")
            .or_insert(if is_open { side } else { Value::Null });
    }
}

/// File-backed store.
#[derive(Debug)]
pub struct JsonStore {
    orders_path: PathBuf,
    candles_path: PathBuf,
    doc: OrdersDocument,
    seen_candles: HashSet<(String, String, i64)>,
    migrated_from: Option<u32>,
}

impl JsonStore {
    /// Open (or create) the store under `data_dir`, migrating old documents.
    pub fn open(data_dir: &Path) -> Result<Self, StoreError> {
        fs::create_dir_all(data_dir).map_err(io_err(data_dir))?;
        let orders_path = data_dir.join("orders.json");
        let candles_path = data_dir.join("candles.jsonl");

        let (doc, migrated_from) = if orders_path.exists() {
            let raw = fs::read_to_string(&orders_path).map_err(io_err(&orders_path))?;
            let value: Value = serde_json::from_str(&raw).map_err(|source| StoreError::Json {
                path: orders_path.clone(),
                source,
            })?;
            let found = document_version(&value);
            if found > SCHEMA_VERSION {
                return Err(StoreError::UnsupportedVersion {
                    found,
                    supported: SCHEMA_VERSION,
                });
            }
            let doc = migrate_orders(value).map_err(|source| StoreError::Json {
                path: orders_path.clone(),
                source,
            })?;
            (doc, (found < SCHEMA_VERSION).then_some(found))
        } else {
            (OrdersDocument::default(), None)
        };

        let mut store = Self {
            orders_path,
            candles_path,
            doc,
            seen_candles: HashSet::new(),
            migrated_from,
        };

        if let Some(from) = migrated_from {
            store.persist_orders()?;
            info!(
                from,
                to = SCHEMA_VERSION,
                orders = store.doc.orders.len(),
                "migrated order store"
            );
        }

        for record in store.candle_history()? {
            store
                .seen_candles
                .insert((record.symbol, record.interval, record.timestamp));
        }

        Ok(store)
    }

    /// Schema version the order document was upgraded from at open, if any.
    pub fn migrated_from(&self) -> Option<u32> {
        self.migrated_from
    }

    pub fn orders_path(&self) -> &Path {
        &self.orders_path
    }

    pub fn candles_path(&self) -> &Path {
        &self.candles_path
    }

    fn persist_orders(&self) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(&self.doc).map_err(|source| StoreError::Json {
            path: self.orders_path.clone(),
            source,
        })?;
        let tmp_path = self.orders_path.with_extension("json.tmp");
        fs::write(&tmp_path, json).map_err(io_err(&tmp_path))?;
        fs::rename(&tmp_path, &self.orders_path).map_err(|source| {
            let _ = fs::remove_file(&tmp_path);
            StoreError::Io {
                path: self.orders_path.clone(),
                source,
            }
        })
    }
}

impl OrderStore for JsonStore {
    fn insert_open(&mut self, order: &NewOrder) -> Result<i64, StoreError> {
        let id = self.doc.insert(order);
        if let Err(e) = self.persist_orders() {
            self.doc.orders.pop();
            self.doc.next_id -= 1;
            return Err(e);
        }
        Ok(id)
    }

    fn update_close(&mut self, id: i64, close: &OrderClose) -> Result<(), StoreError> {
        self.doc.close(id, close)?;
        self.persist_orders()
    }

    fn latest_open(&self) -> Result<Option<OrderRecord>, StoreError> {
        Ok(self.doc.latest_open().cloned())
    }

    fn all_orders(&self) -> Result<Vec<OrderRecord>, StoreError> {
        Ok(self.doc.orders.clone())
    }

    fn append_candle(&mut self, candle: &CandleRecord) -> Result<bool, StoreError> {
        let key = (
            candle.symbol.clone(),
            candle.interval.clone(),
            candle.timestamp,
        );
        if self.seen_candles.contains(&key) {
            return Ok(false);
        }

        let line = serde_json::to_string(candle).map_err(|source| StoreError::Json {
            path: self.candles_path.clone(),
            source,
        })?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.candles_path)
            .map_err(io_err(&self.candles_path))?;
        writeln!(file, "{line}").map_err(io_err(&self.candles_path))?;
        file.flush().map_err(io_err(&self.candles_path))?;

        self.seen_candles.insert(key);
        Ok(true)
    }

    /// Malformed lines (e.g. a torn final write) are skipped.
    fn candle_history(&self) -> Result<Vec<CandleRecord>, StoreError> {
        if !self.candles_path.exists() {
            return Ok(Vec::new());
        }
        let file = fs::File::open(&self.candles_path).map_err(io_err(&self.candles_path))?;
        let reader = io::BufReader::new(file);

        let mut records = Vec::new();
        for (lineno, line) in reader.lines().enumerate() {
            let line = line.map_err(io_err(&self.candles_path))?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<CandleRecord>(&line) {
                Ok(record) => records.push(record),
                Err(e) => warn!(line = lineno + 1, error = %e, "skipping malformed candle row"),
            }
        }
        Ok(records)
    }
}

/// In-process store for backtests and tests.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    doc: OrdersDocument,
    candles: Vec<CandleRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl OrderStore for MemoryStore {
    fn insert_open(&mut self, order: &NewOrder) -> Result<i64, StoreError> {
        Ok(self.doc.insert(order))
    }

    fn update_close(&mut self, id: i64, close: &OrderClose) -> Result<(), StoreError> {
        self.doc.close(id, close)
    }

    fn latest_open(&self) -> Result<Option<OrderRecord>, StoreError> {
        Ok(self.doc.latest_open().cloned())
    }

    fn all_orders(&self) -> Result<Vec<OrderRecord>, StoreError> {
        Ok(self.doc.orders.clone())
    }

    fn append_candle(&mut self, candle: &CandleRecord) -> Result<bool, StoreError> {
        let duplicate = self.candles.iter().any(|c| {
            c.timestamp == candle.timestamp
                && c.symbol == candle.symbol
                && c.interval == candle.interval
        });
        if duplicate {
            return Ok(false);
        }
        self.candles.push(candle.clone());
        Ok(true)
    }

    fn candle_history(&self) -> Result<Vec<CandleRecord>, StoreError> {
        Ok(self.candles.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use trendpilot_core::domain::{OrderStatus, Side};

    fn new_order(side: Side) -> NewOrder {
        NewOrder {
            symbol: "BTCUSDT".into(),
            side,
            entry_price: 100.0,
            open_time: "2024-02-10 08:00:00.000000".into(),
            position_size: 2.5,
            position_size_no_fee: 2.5,
            margin: 50.0,
            margin_no_fee: 50.0,
            leverage: 5,
            balance: 950.0,
            balance_without_fee: 950.0,
            balance_before_trade: 1000.0,
            balance_before_trade_no_fee: 1000.0,
        }
    }

    fn close_at(price: f64) -> OrderClose {
        OrderClose {
            close_price: price,
            close_time: "2024-02-10 09:15:00.000000".into(),
            profit: 9.745,
            profit_percent: 0.9745,
            balance: 1009.745,
            balance_without_fee: 1010.0,
        }
    }

    fn candle(minutes: i64) -> Candle {
        let open_time = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::minutes(minutes);
        Candle {
            open_time,
            open: 100.0,
            high: 101.0,
            low: 99.0,
            close: 100.5,
            volume: 10.0,
            close_time: open_time + Duration::minutes(15) - Duration::milliseconds(1),
        }
    }

    #[test]
    fn memory_store_lifecycle() {
        let mut store = MemoryStore::new();
        let a = store.insert_open(&new_order(Side::Long)).unwrap();
        assert_eq!(a, 1);
        assert_eq!(store.latest_open().unwrap().unwrap().id, 1);

        store.update_close(a, &close_at(104.0)).unwrap();
        assert!(store.latest_open().unwrap().is_none());

        let b = store.insert_open(&new_order(Side::Short)).unwrap();
        assert_eq!(b, 2);
        assert_eq!(store.all_orders().unwrap().len(), 2);
        assert!(matches!(
            store.update_close(99, &close_at(1.0)),
            Err(StoreError::UnknownOrder(99))
        ));
    }

    #[test]
    fn default_memory_store_starts_ids_at_one() {
        let mut store = MemoryStore::default();
        assert_eq!(store.insert_open(&new_order(Side::Long)).unwrap(), 1);
    }

    #[test]
    fn latest_open_prefers_highest_id() {
        let mut doc = OrdersDocument::default();
        doc.insert(&new_order(Side::Long));
        doc.insert(&new_order(Side::Short));
        assert_eq!(doc.latest_open().unwrap().side, Side::Short);
    }

    #[test]
    fn candle_record_round_trips_times() {
        let c = candle(45);
        let record = CandleRecord::from_candle("BTCUSDT", "15m", &c);
        assert_eq!(record.datetime, "2024-01-01 00:45:00.000000");
        assert_eq!(record.to_candle().unwrap(), c);
    }

    #[test]
    fn json_store_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut store = JsonStore::open(dir.path()).unwrap();
            assert_eq!(store.migrated_from(), None);
            let id = store.insert_open(&new_order(Side::Long)).unwrap();
            store.update_close(id, &close_at(104.0)).unwrap();
            store.insert_open(&new_order(Side::Short)).unwrap();
        }

        let store = JsonStore::open(dir.path()).unwrap();
        let orders = store.all_orders().unwrap();
        assert_eq!(orders.len(), 2);
        assert_eq!(orders[0].status, OrderStatus::Closed);
        assert_eq!(orders[0].close_price, Some(104.0));
        let open = store.latest_open().unwrap().unwrap();
        assert_eq!((open.id, open.side), (2, Side::Short));
        assert!(!dir.path().join("orders.json.tmp").exists());
    }

    #[test]
    fn every_rewrite_keeps_the_full_document() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut store = JsonStore::open(dir.path()).unwrap();
            for i in 0..200 {
                let side = if i % 2 == 0 { Side::Long } else { Side::Short };
                let id = store.insert_open(&new_order(side)).unwrap();
                store.update_close(id, &close_at(104.0)).unwrap();
            }
        }

        let mut store = JsonStore::open(dir.path()).unwrap();
        let orders = store.all_orders().unwrap();
        assert_eq!(orders.len(), 200);
        assert!(orders.iter().all(|o| o.status == OrderStatus::Closed));
        assert!(orders.iter().map(|o| o.id).eq(1..=200));
        assert_eq!(store.insert_open(&new_order(Side::Long)).unwrap(), 201);
    }

    #[test]
    fn candle_history_skips_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = JsonStore::open(dir.path()).unwrap();
        let first = CandleRecord::from_candle("BTCUSDT", "15m", &candle(0));
        let second = CandleRecord::from_candle("BTCUSDT", "15m", &candle(15));

        assert!(store.append_candle(&first).unwrap());
        assert!(!store.append_candle(&first).unwrap());
        assert!(store.append_candle(&second).unwrap());
        drop(store);

        // Dedup survives a restart.
        let mut store = JsonStore::open(dir.path()).unwrap();
        assert!(!store.append_candle(&second).unwrap());
        assert_eq!(store.candle_history().unwrap().len(), 2);
    }

    #[test]
    fn torn_candle_line_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = JsonStore::open(dir.path()).unwrap();
        store
            .append_candle(&CandleRecord::from_candle("BTCUSDT", "15m", &candle(0)))
            .unwrap();
        let mut file = OpenOptions::new()
            .append(true)
            .open(store.candles_path())
            .unwrap();
        write!(file, "{{\"symbol\": \"BTC").unwrap();

        assert_eq!(store.candle_history().unwrap().len(), 1);
    }

    #[test]
    fn v1_array_is_migrated() {
        let dir = tempfile::tempdir().unwrap();
        let v1 = r#"[
            {"id": 1, "symbol": "BTCUSDT", "side": "long", "entry_price": 100.0,
             "open_time": "2024-01-01 00:00:00.000000", "close_price": 101.0,
             "close_time": "2024-01-01 01:00:00.000000", "position_size": 2.5,
             "margin": 50.0, "leverage": 5, "profit": 2.4, "profit_percent": 0.24,
             "status": "closed"},
            {"id": 4, "symbol": "BTCUSDT", "side": "short", "entry_price": 102.0,
             "open_time": "2024-01-02 00:00:00.000000", "close_price": null,
             "close_time": null, "position_size": 2.4, "margin": 49.0,
             "leverage": 5, "profit": null, "profit_percent": null, "status": "open"}
        ]"#;
        std::fs::write(dir.path().join("orders.json"), v1).unwrap();

        let mut store = JsonStore::open(dir.path()).unwrap();
        assert_eq!(store.migrated_from(), Some(1));

        let open = store.latest_open().unwrap().unwrap();
        assert_eq!(open.id, 4);
        assert_eq!(open.current_position, Some(Side::Short));
        assert_eq!(open.balance, None);
        assert_eq!(open.margin_no_fee, None);

        // Ids continue after the highest migrated id.
        assert_eq!(store.insert_open(&new_order(Side::Long)).unwrap(), 5);

        // The upgraded document was written back.
        let raw: Value =
            serde_json::from_str(&std::fs::read_to_string(store.orders_path()).unwrap()).unwrap();
        assert_eq!(raw["version"], SCHEMA_VERSION);
        let reopened = JsonStore::open(dir.path()).unwrap();
        assert_eq!(reopened.migrated_from(), None);
    }

    #[test]
    fn newer_version_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("orders.json"),
            r#"{"version": 9, "next_id": 1, "orders": []}"#,
        )
        .unwrap();
        assert!(matches!(
            JsonStore::open(dir.path()),
            Err(StoreError::UnsupportedVersion { found: 9, .. })
        ));
    }

    #[test]
    fn corrupt_orders_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("orders.json"), "{not json").unwrap();
        assert!(matches!(
            JsonStore::open(dir.path()),
            Err(StoreError::Json { .. })
        ));
    }
}

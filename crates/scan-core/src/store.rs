use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use crate::errors::{ErrorContext, ScanResult};
use crate::frame::parse_date;
use crate::scan_err;
use crate::source::{MarketData, SignalSink};
use crate::strategy::StrategyId;
use crate::types::{PriceBar, ResultRow, Signal, Snapshot, StockInfo};

const DATE_FMT: &str = "%Y-%m-%d";

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS stocks (
    code TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    market TEXT,
    sector TEXT,
    updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
);
CREATE TABLE IF NOT EXISTS stock_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    code TEXT NOT NULL,
    date TEXT NOT NULL,
    open REAL,
    close REAL,
    high REAL,
    low REAL,
    volume REAL,
    amount REAL,
    UNIQUE(code, date)
);
CREATE TABLE IF NOT EXISTS scan_results (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    scan_date TEXT NOT NULL,
    strategy_name TEXT NOT NULL,
    stock_code TEXT NOT NULL,
    stock_name TEXT NOT NULL,
    price REAL,
    change_percent REAL,
    signal_info TEXT,
    created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
);
CREATE TABLE IF NOT EXISTS push_records (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    scan_date TEXT NOT NULL,
    platform TEXT NOT NULL,
    status TEXT,
    message TEXT,
    created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
);
CREATE INDEX IF NOT EXISTS idx_history_code_date ON stock_history(code, date);
CREATE INDEX IF NOT EXISTS idx_results_date ON scan_results(scan_date);
CREATE INDEX IF NOT EXISTS idx_results_strategy ON scan_results(strategy_name);
";

/// 数据库中保存的一条扫描结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredScanResult {
    pub id:             i64,
    pub scan_date:      NaiveDate,
    pub strategy:       String,
    pub code:           String,
    pub name:           String,
    pub price:          f64,
    pub change_percent: f64,
    /// 旧数据或无法解析时为空
    pub signal:         Option<Signal>,
}

/// SQLite 存储：股票列表、日线、扫描结果与推送记录。
///
/// 连接放在 `Mutex` 中，可以在回测的工作线程之间共享。
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> ScanResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).context(&parent.display().to_string())?;
        }
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> ScanResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> ScanResult<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn lock(&self) -> ScanResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| scan_err!(DataProcessing, "数据库连接锁已失效"))
    }

    pub fn save_stocks(&self, stocks: &[StockInfo]) -> ScanResult<usize> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO stocks (code, name, market, sector, updated_at)
                 VALUES (?1, ?2, ?3, '', CURRENT_TIMESTAMP)",
            )?;
            for s in stocks {
                stmt.execute(params![s.code, s.name, s.market])?;
            }
        }
        tx.commit()?;
        tracing::debug!("保存 {} 只股票信息", stocks.len());
        Ok(stocks.len())
    }

    /// 按 (code, date) 覆盖写入
    pub fn save_history(&self, code: &str, bars: &[PriceBar]) -> ScanResult<usize> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO stock_history
                 (code, date, open, close, high, low, volume, amount)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )?;
            for b in bars {
                stmt.execute(params![
                    code,
                    b.date.format(DATE_FMT).to_string(),
                    b.open,
                    b.close,
                    b.high,
                    b.low,
                    b.volume,
                    b.amount
                ])?;
            }
        }
        tx.commit()?;
        Ok(bars.len())
    }

    /// 最近 `days` 根日线，按日期升序返回
    pub fn get_history(&self, code: &str, days: usize) -> ScanResult<Vec<PriceBar>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT date, open, close, high, low, volume, amount
             FROM stock_history
             WHERE code = ?1
             ORDER BY date DESC
             LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![code, days as i64], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, Option<f64>>(1)?,
                row.get::<_, f64>(2)?,
                row.get::<_, Option<f64>>(3)?,
                row.get::<_, Option<f64>>(4)?,
                row.get::<_, Option<f64>>(5)?,
                row.get::<_, Option<f64>>(6)?,
            ))
        })?;

        let mut bars = Vec::new();
        for row in rows {
            let (date, open, close, high, low, volume, amount) = row?;
            bars.push(PriceBar {
                date: parse_date(&date)?,
                open: open.unwrap_or(0.0),
                close,
                high: high.unwrap_or(0.0),
                low: low.unwrap_or(0.0),
                volume: volume.unwrap_or(0.0),
                amount: amount.unwrap_or(0.0),
            });
        }
        // 转为正序
        bars.reverse();
        Ok(bars)
    }

    pub fn get_stock_list(&self) -> ScanResult<Vec<StockInfo>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT code, name, market FROM stocks ORDER BY code")?;
        let stocks = stmt
            .query_map([], |row| {
                let code: String = row.get(0)?;
                let name: String = row.get(1)?;
                let market: Option<String> = row.get(2)?;
                Ok((code, name, market))
            })?
            .map(|r| {
                r.map(|(code, name, market)| match market.filter(|m| !m.is_empty()) {
                    Some(market) => StockInfo { code, name, market },
                    None => StockInfo::new(code, name),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(stocks)
    }

    pub fn save_scan_result(&self, scan_date: NaiveDate, strategy: StrategyId, rows: &[ResultRow]) -> ScanResult<usize> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO scan_results
                 (scan_date, strategy_name, stock_code, stock_name, price, change_percent, signal_info)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;
            let date = scan_date.format(DATE_FMT).to_string();
            for r in rows {
                let signal = serde_json::to_string(&r.signal)?;
                stmt.execute(params![
                    date,
                    strategy.as_str(),
                    r.code,
                    r.name,
                    r.price,
                    r.change_percent,
                    signal
                ])?;
            }
        }
        tx.commit()?;
        tracing::info!("保存 {} 条扫描结果 ({})", rows.len(), strategy);
        Ok(rows.len())
    }

    /// 可按日期和策略过滤，最新写入的在前
    pub fn get_scan_results(
        &self,
        scan_date: Option<NaiveDate>,
        strategy: Option<StrategyId>,
    ) -> ScanResult<Vec<StoredScanResult>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, scan_date, strategy_name, stock_code, stock_name, price, change_percent, signal_info
             FROM scan_results
             WHERE (?1 IS NULL OR scan_date = ?1)
               AND (?2 IS NULL OR strategy_name = ?2)
             ORDER BY created_at DESC, id DESC",
        )?;
        let date = scan_date.map(|d| d.format(DATE_FMT).to_string());
        let strategy = strategy.map(|s| s.as_str());
        let rows = stmt.query_map(params![date, strategy], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, Option<f64>>(5)?,
                row.get::<_, Option<f64>>(6)?,
                row.get::<_, Option<String>>(7)?,
            ))
        })?;

        let mut results = Vec::new();
        for row in rows {
            let (id, date, strategy, code, name, price, change_percent, signal) = row?;
            results.push(StoredScanResult {
                id,
                scan_date: parse_date(&date)?,
                strategy,
                code,
                name,
                price: price.unwrap_or(0.0),
                change_percent: change_percent.unwrap_or(0.0),
                signal: signal.and_then(|s| serde_json::from_str(&s).ok()),
            });
        }
        Ok(results)
    }

    pub fn save_push_record(&self, scan_date: NaiveDate, platform: &str, status: &str, message: &str) -> ScanResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO push_records (scan_date, platform, status, message) VALUES (?1, ?2, ?3, ?4)",
            params![scan_date.format(DATE_FMT).to_string(), platform, status, message],
        )?;
        Ok(())
    }

    pub fn count_push_records(&self, scan_date: NaiveDate) -> ScanResult<usize> {
        let conn = self.lock()?;
        let n: i64 = conn.query_row(
            "SELECT COUNT(*) FROM push_records WHERE scan_date = ?1",
            params![scan_date.format(DATE_FMT).to_string()],
            |row| row.get(0),
        )?;
        Ok(n as usize)
    }

    /// 最新一根日线距今超过 `max_age_days` 天，或没有数据时需要更新
    pub fn needs_update(&self, code: &str, max_age_days: i64, today: NaiveDate) -> ScanResult<bool> {
        let conn = self.lock()?;
        let last: Option<String> = conn
            .query_row(
                "SELECT MAX(date) FROM stock_history WHERE code = ?1",
                params![code],
                |row| row.get(0),
            )
            .optional()?
            .flatten();
        match last {
            None => Ok(true),
            Some(date) => Ok((today - parse_date(&date)?).num_days() >= max_age_days),
        }
    }
}

impl MarketData for SqliteStore {
    fn stock_list(&self) -> ScanResult<Vec<StockInfo>> {
        self.get_stock_list()
    }

    fn fetch_history(&self, code: &str, lookback: usize) -> ScanResult<Option<Vec<PriceBar>>> {
        let bars = self.get_history(code, lookback)?;
        Ok((!bars.is_empty()).then_some(bars))
    }

    fn fetch_snapshot(&self, _code: &str) -> Option<Snapshot> {
        None
    }
}

impl SignalSink for SqliteStore {
    fn persist_signals(&self, strategy: StrategyId, date: NaiveDate, rows: &[ResultRow]) -> ScanResult<usize> {
        self.save_scan_result(date, strategy, rows)
    }
}

//! 行情、信号存储与推送三个外部协作方的接口，以及基于内存的行情实现。

use chrono::NaiveDate;
use polars::prelude::*;
use std::collections::{HashMap, HashSet};
use std::path::Path;

use crate::aggregator::ScanReport;
use crate::errors::{ErrorContext, ScanResult};
use crate::frame::{bars_from_frame, read_frame};
use crate::scan_err;
use crate::strategy::StrategyId;
use crate::types::{market_of, PriceBar, ResultRow, Snapshot, StockInfo};

/// 行情数据来源，可能在 rayon 工作线程中并发调用
pub trait MarketData: Send + Sync {
    fn stock_list(&self) -> ScanResult<Vec<StockInfo>>;

    /// 最近 `lookback` 根日线，按日期升序；没有数据时返回 `None`
    fn fetch_history(&self, code: &str, lookback: usize) -> ScanResult<Option<Vec<PriceBar>>>;

    /// 实时报价，没有时由调用方从历史推导
    fn fetch_snapshot(&self, code: &str) -> Option<Snapshot>;
}

/// 扫描结果持久化
pub trait SignalSink {
    fn persist_signals(&self, strategy: StrategyId, date: NaiveDate, rows: &[ResultRow]) -> ScanResult<usize>;
}

/// 扫描结果推送，失败由调用方记录日志
pub trait Notifier {
    fn notify(&self, report: &ScanReport, date: NaiveDate) -> ScanResult<()>;
}

const STOCKS_FILE: &str = "stocks";
const QUOTES_FILE: &str = "quotes";

/// 全部数据都在内存中的行情源
#[derive(Debug, Clone, Default)]
pub struct InMemoryMarketData {
    stocks:    Vec<StockInfo>,
    histories: HashMap<String, Vec<PriceBar>>,
    quotes:    HashMap<String, Snapshot>,
}

impl InMemoryMarketData {
    pub fn new() -> Self {
        Self::default()
    }

    /// 添加一只股票及其日线
    pub fn with_stock(mut self, stock: StockInfo, bars: Vec<PriceBar>) -> Self {
        self.histories.insert(stock.code.clone(), bars);
        self.stocks.push(stock);
        self
    }

    pub fn with_quote(mut self, snapshot: Snapshot) -> Self {
        self.quotes.insert(snapshot.code.clone(), snapshot);
        self
    }

    pub fn len(&self) -> usize {
        self.stocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stocks.is_empty()
    }

    pub fn stocks(&self) -> &[StockInfo] {
        &self.stocks
    }

    pub fn history(&self, code: &str) -> Option<&[PriceBar]> {
        self.histories.get(code).map(Vec::as_slice)
    }

    /// 从目录加载：每只股票一个 `<code>.csv` / `<code>.feather` 文件，
    /// 可选的 `stocks.csv`（code,name[,market]）给出股票池和名称，
    /// 可选的 `quotes.csv`（code,name,price,change_percent）给出实时报价。
    ///
    /// 无法解析的单只股票文件记录告警后跳过。
    pub fn from_dir(dir: &Path) -> ScanResult<Self> {
        if !dir.is_dir() {
            return Err(scan_err!(Config, "数据目录不存在: {}", dir.display()));
        }

        let mut files: Vec<(String, std::path::PathBuf)> = Vec::new();
        for entry in std::fs::read_dir(dir).context(&dir.display().to_string())? {
            let path = entry?.path();
            let ext = path.extension().and_then(|e| e.to_str()).unwrap_or_default();
            if !matches!(ext, "csv" | "feather" | "ipc" | "arrow") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                if stem != STOCKS_FILE && stem != QUOTES_FILE {
                    files.push((stem.to_string(), path.clone()));
                }
            }
        }
        files.sort();

        let mut histories = HashMap::new();
        for (code, path) in &files {
            let loaded = read_frame(path, false).and_then(|df| bars_from_frame(&df));
            match loaded {
                Ok(bars) => {
                    histories.insert(code.clone(), bars);
                }
                Err(e) => tracing::warn!("跳过 {}: {}", path.display(), e),
            }
        }

        let stocks_path = dir.join(format!("{}.csv", STOCKS_FILE));
        let stocks = if stocks_path.exists() {
            read_stock_list(&stocks_path)?
                .into_iter()
                .filter(|s| histories.contains_key(&s.code))
                .collect()
        } else {
            files
                .iter()
                .filter(|(code, _)| histories.contains_key(code))
                .map(|(code, _)| StockInfo::new(code.clone(), code.clone()))
                .collect()
        };

        let quotes_path = dir.join(format!("{}.csv", QUOTES_FILE));
        let quotes = if quotes_path.exists() {
            read_quotes(&quotes_path)?
                .into_iter()
                .map(|q| (q.code.clone(), q))
                .collect()
        } else {
            HashMap::new()
        };

        tracing::info!("从 {} 加载 {} 只股票", dir.display(), histories.len());
        Ok(Self { stocks, histories, quotes })
    }

    /// 从一张多只股票的长表加载，需要 `code` 列，`name` 列可选；
    /// 股票顺序为首次出现的顺序。
    pub fn from_frame(df: &DataFrame) -> ScanResult<Self> {
        let code_col = df.column("code")?.cast(&DataType::String)?;
        let mut seen = HashSet::new();
        let codes: Vec<String> = code_col
            .str()?
            .into_iter()
            .flatten()
            .filter(|c| seen.insert(c.to_string()))
            .map(str::to_string)
            .collect();

        let mut data = Self::new();
        for code in codes {
            let part = df
                .clone()
                .lazy()
                .filter(col("code").cast(DataType::String).eq(lit(code.clone())))
                .collect()?;
            let bars = bars_from_frame(&part).context(&code)?;
            let name = part
                .column("name")
                .ok()
                .and_then(|c| c.str().ok()?.get(0).map(str::to_string))
                .unwrap_or_else(|| code.clone());
            data = data.with_stock(StockInfo::new(code, name), bars);
        }
        Ok(data)
    }
}

fn read_stock_list(path: &Path) -> ScanResult<Vec<StockInfo>> {
    let df = read_frame(path, true)?;
    let codes = df.column("code")?.str()?.clone();
    let names = df.column("name")?.str()?.clone();
    let markets = df.column("market").ok().and_then(|c| c.str().ok().cloned());

    let mut stocks = Vec::with_capacity(df.height());
    for i in 0..df.height() {
        let Some(code) = codes.get(i) else { continue };
        let name = names.get(i).unwrap_or(code);
        let market = markets
            .as_ref()
            .and_then(|m| m.get(i))
            .map(str::to_string)
            .unwrap_or_else(|| market_of(code).to_string());
        stocks.push(StockInfo {
            code: code.to_string(),
            name: name.to_string(),
            market,
        });
    }
    Ok(stocks)
}

fn read_quotes(path: &Path) -> ScanResult<Vec<Snapshot>> {
    let df = read_frame(path, true)?;
    let codes = df.column("code")?.str()?.clone();
    let names = df.column("name")?.str()?.clone();
    let prices = df.column("price")?.cast(&DataType::Float64)?;
    let changes = df.column("change_percent")?.cast(&DataType::Float64)?;
    let (prices, changes) = (prices.f64()?, changes.f64()?);

    let mut quotes = Vec::with_capacity(df.height());
    for i in 0..df.height() {
        let (Some(code), Some(price), Some(change_percent)) = (codes.get(i), prices.get(i), changes.get(i))
        else {
            continue;
        };
        quotes.push(Snapshot {
            code: code.to_string(),
            name: names.get(i).unwrap_or(code).to_string(),
            price,
            change_percent,
        });
    }
    Ok(quotes)
}

impl MarketData for InMemoryMarketData {
    fn stock_list(&self) -> ScanResult<Vec<StockInfo>> {
        Ok(self.stocks.clone())
    }

    fn fetch_history(&self, code: &str, lookback: usize) -> ScanResult<Option<Vec<PriceBar>>> {
        Ok(self.histories.get(code).filter(|b| !b.is_empty()).map(|bars| {
            let start = bars.len().saturating_sub(lookback);
            bars[start..].to_vec()
        }))
    }

    fn fetch_snapshot(&self, code: &str) -> Option<Snapshot> {
        self.quotes.get(code).cloned()
    }
}

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::errors::ScanResult;
use crate::scan_err;

/// 日线行情
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub date:   NaiveDate,
    pub open:   f64,
    pub close:  f64,
    pub high:   f64,
    pub low:    f64,
    pub volume: f64,
    pub amount: f64,
}

impl PriceBar {
    /// 仅收盘价有意义时使用，其余字段按收盘价填充
    pub fn from_close(date: NaiveDate, close: f64, volume: f64) -> Self {
        Self {
            date,
            open: close,
            close,
            high: close,
            low: close,
            volume,
            amount: close * volume,
        }
    }
}

/// 检查一只股票的完整行情序列：日期严格递增，收盘价为正，其余数值字段非负且有限
pub fn validate_bars(code: &str, bars: &[PriceBar]) -> ScanResult<()> {
    for (i, bar) in bars.iter().enumerate() {
        if !bar.close.is_finite() || bar.close <= 0.0 {
            return Err(scan_err!(
                Validation,
                "{} 在 {} 的收盘价无效: {}",
                code,
                bar.date,
                bar.close
            ));
        }
        let fields = [
            ("开盘价", bar.open),
            ("最高价", bar.high),
            ("最低价", bar.low),
            ("成交量", bar.volume),
            ("成交额", bar.amount),
        ];
        if let Some((name, value)) = fields.iter().find(|(_, v)| !v.is_finite() || *v < 0.0) {
            return Err(scan_err!(Validation, "{} 在 {} 的{}无效: {}", code, bar.date, name, value));
        }
        if i > 0 && bars[i - 1].date >= bar.date {
            return Err(scan_err!(
                Validation,
                "{} 的日期未严格递增: {} -> {}",
                code,
                bars[i - 1].date,
                bar.date
            ));
        }
    }
    Ok(())
}

/// 当日行情快照，可以来自实时报价，也可以由历史窗口推导
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub code:           String,
    pub name:           String,
    pub price:          f64,
    pub change_percent: f64,
}

/// 策略命中信号，产生后不可变
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    #[serde(rename = "type")]
    pub signal_type: String,
    pub values:      BTreeMap<String, f64>,
    pub description: String,
}

impl Signal {
    pub fn new(signal_type: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            signal_type: signal_type.into(),
            values: BTreeMap::new(),
            description: description.into(),
        }
    }

    pub fn with_value(mut self, key: &str, value: f64) -> Self {
        self.values.insert(key.to_string(), value);
        self
    }

    pub fn value(&self, key: &str) -> Option<f64> {
        self.values.get(key).copied()
    }
}

/// 股票池条目
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockInfo {
    pub code:   String,
    pub name:   String,
    pub market: String,
}

impl StockInfo {
    pub fn new(code: impl Into<String>, name: impl Into<String>) -> Self {
        let code = code.into();
        let market = market_of(&code).to_string();
        Self { code, name: name.into(), market }
    }
}

/// 6 开头为沪市，其余视为深市
pub fn market_of(code: &str) -> &'static str {
    if code.starts_with('6') { "沪A" } else { "深A" }
}

/// 实盘扫描的一条命中结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRow {
    pub code:           String,
    pub name:           String,
    pub price:          f64,
    pub change_percent: f64,
    pub signal:         Signal,
}

/// 回测中记录的信号
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalRecord {
    pub code:   String,
    pub name:   String,
    pub date:   NaiveDate,
    pub price:  f64,
    pub signal: Signal,
}

/// 回测交易记录：信号日收盘买入，持有 N 个交易日后收盘卖出
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub code:       String,
    pub buy_date:   NaiveDate,
    pub buy_price:  f64,
    pub sell_date:  NaiveDate,
    pub sell_price: f64,
    pub return_pct: f64,
}

impl TradeRecord {
    pub fn new(code: &str, buy: &PriceBar, sell: &PriceBar) -> Self {
        Self {
            code: code.to_string(),
            buy_date: buy.date,
            buy_price: buy.close,
            sell_date: sell.date,
            sell_price: sell.close,
            return_pct: (sell.close - buy.close) / buy.close * 100.0,
        }
    }
}

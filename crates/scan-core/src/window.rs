use crate::types::{PriceBar, Snapshot, StockInfo};

/// 截断到某个交易日的历史窗口。
///
/// 窗口只借用 `bars[..=i]`，策略在第 i 天无法读取任何更晚的 K 线。
#[derive(Debug, Clone, Copy)]
pub struct HistoryWindow<'a> {
    bars: &'a [PriceBar],
}

impl<'a> HistoryWindow<'a> {
    pub fn new(bars: &'a [PriceBar]) -> Self {
        Self { bars }
    }

    /// `bars[..=index]`，index 越界时取全部
    pub fn truncated(bars: &'a [PriceBar], index: usize) -> Self {
        let end = (index + 1).min(bars.len());
        Self { bars: &bars[..end] }
    }

    /// 最近 `lookback` 根 K 线
    pub fn tail(bars: &'a [PriceBar], lookback: usize) -> Self {
        let start = bars.len().saturating_sub(lookback);
        Self { bars: &bars[start..] }
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn bars(&self) -> &'a [PriceBar] {
        self.bars
    }

    pub fn last(&self) -> Option<&'a PriceBar> {
        self.bars.last()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.close).collect()
    }

    pub fn volumes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.volume).collect()
    }

    /// 最后一根相对前一根的涨跌幅（%），不足两根或前收为 0 时返回 0
    pub fn last_change_percent(&self) -> f64 {
        match self.bars {
            [.., prev, last] if prev.close != 0.0 => (last.close - prev.close) / prev.close * 100.0,
            _ => 0.0,
        }
    }

    /// 没有实时报价时，用窗口末尾推导快照
    pub fn derive_snapshot(&self, stock: &StockInfo) -> Snapshot {
        Snapshot {
            code: stock.code.clone(),
            name: stock.name.clone(),
            price: self.last().map(|b| b.close).unwrap_or(0.0),
            change_percent: self.last_change_percent(),
        }
    }
}

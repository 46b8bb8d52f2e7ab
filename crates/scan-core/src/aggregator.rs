use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::strategy::StrategyId;
use crate::types::{ResultRow, SignalRecord, TradeRecord};

/// 单个策略的回测统计，全部由交易记录推导
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BacktestStats {
    pub total_signals: usize,
    pub win_count:     usize,
    pub loss_count:    usize,
    /// 胜率（%）
    pub win_rate:      f64,
    pub avg_return:    f64,
    pub max_return:    f64,
    pub min_return:    f64,
    pub total_return:  f64,
    pub holding_days:  usize,
}

/// 一次回测中某个策略的全部信号与交易
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestResult {
    pub strategy: StrategyId,
    pub signals:  Vec<SignalRecord>,
    pub trades:   Vec<TradeRecord>,
    pub stats:    BacktestStats,
}

impl BacktestResult {
    pub fn new(strategy: StrategyId) -> Self {
        Self {
            strategy,
            signals: Vec::new(),
            trades: Vec::new(),
            stats: BacktestStats::default(),
        }
    }

    pub fn add_signal(&mut self, signal: SignalRecord) {
        self.signals.push(signal);
    }

    pub fn add_trade(&mut self, trade: TradeRecord) {
        self.trades.push(trade);
    }

    /// 合并另一段结果，保持追加顺序
    pub fn extend(&mut self, other: BacktestResult) {
        self.signals.extend(other.signals);
        self.trades.extend(other.trades);
    }

    /// 根据交易记录重新计算统计；重复调用结果相同
    pub fn finalize(&mut self, holding_days: usize) -> BacktestStats {
        self.stats = evaluate_trades(&self.trades, holding_days);
        self.stats.clone()
    }

    /// 按收益率从高到低排序，收益相同的保持原顺序
    pub fn ranked_trades(&self) -> Vec<&TradeRecord> {
        let mut ranked: Vec<&TradeRecord> = self.trades.iter().collect();
        ranked.sort_by(|a, b| b.return_pct.total_cmp(&a.return_pct));
        ranked
    }

    pub fn top_trades(&self, n: usize) -> Vec<&TradeRecord> {
        let mut ranked = self.ranked_trades();
        ranked.truncate(n);
        ranked
    }
}

// 盈利为收益 > 0，其余都记为亏损
pub fn evaluate_trades(trades: &[TradeRecord], holding_days: usize) -> BacktestStats {
    let mut stats = BacktestStats {
        holding_days,
        ..Default::default()
    };
    if trades.is_empty() {
        return stats;
    }

    let returns: Vec<f64> = trades.iter().map(|t| t.return_pct).collect();
    let n = returns.len();

    stats.total_signals = n;
    stats.win_count = returns.iter().filter(|&&r| r > 0.0).count();
    stats.loss_count = n - stats.win_count;
    stats.win_rate = stats.win_count as f64 / n as f64 * 100.0;
    stats.total_return = returns.iter().sum();
    stats.avg_return = stats.total_return / n as f64;
    stats.max_return = returns.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    stats.min_return = returns.iter().copied().fold(f64::INFINITY, f64::min);

    stats
}

/// 一次实盘扫描的结果，按策略分组
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanReport {
    pub results: BTreeMap<StrategyId, Vec<ResultRow>>,
}

impl ScanReport {
    /// 每个启用的策略都有一项，没有命中时为空列表
    pub fn new(strategies: &[StrategyId]) -> Self {
        Self {
            results: strategies.iter().map(|id| (*id, Vec::new())).collect(),
        }
    }

    pub fn push(&mut self, strategy: StrategyId, row: ResultRow) {
        self.results.entry(strategy).or_default().push(row);
    }

    pub fn rows(&self, strategy: StrategyId) -> &[ResultRow] {
        self.results.get(&strategy).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn total_signals(&self) -> usize {
        self.results.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total_signals() == 0
    }
}

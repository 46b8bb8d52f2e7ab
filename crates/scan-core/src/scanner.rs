use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};

use crate::strategy::{StrategyId, StrategyRegistry};
use crate::types::{Signal, Snapshot};
use crate::window::HistoryWindow;

/// 对单只股票的一个窗口运行全部策略。
///
/// 每个策略互相独立；某个策略 panic 时记录告警并视为无信号，
/// 不影响其余策略。
pub fn scan_one(
    code: &str,
    window: &HistoryWindow<'_>,
    snapshot: &Snapshot,
    strategies: &StrategyRegistry,
) -> BTreeMap<StrategyId, Option<Signal>> {
    strategies
        .iter()
        .map(|strategy| {
            let outcome = catch_unwind(AssertUnwindSafe(|| strategy.evaluate(window, snapshot)));
            let signal = match outcome {
                Ok(signal) => signal,
                Err(_) => {
                    tracing::warn!("策略 {} 在 {} 上执行异常，按无信号处理", strategy.id(), code);
                    None
                }
            };
            (strategy.id(), signal)
        })
        .collect()
}

use polars::prelude::DataFrame;
use pyo3::prelude::*;
use pyo3_polars::PyDataFrame;

use crate::config::{BacktestConfig, StrategyConfig};
use crate::engine::BacktestEngine;
use crate::errors::ScanResult;
use crate::frame::{parse_date, trades_to_frame};
use crate::source::InMemoryMarketData;
use crate::strategy::StrategyRegistry;

#[pyclass]
pub struct BacktestSummary {
    #[pyo3(get)]
    strategy:      String,
    #[pyo3(get)]
    total_signals: usize,
    #[pyo3(get)]
    win_count:     usize,
    #[pyo3(get)]
    loss_count:    usize,
    #[pyo3(get)]
    win_rate:      f64,
    #[pyo3(get)]
    avg_return:    f64,
    #[pyo3(get)]
    max_return:    f64,
    #[pyo3(get)]
    min_return:    f64,
    #[pyo3(get)]
    total_return:  f64,
    trades:        DataFrame,
}

#[pymethods]
impl BacktestSummary {
    /// 交易明细
    pub fn trades(&self) -> PyDataFrame {
        PyDataFrame(self.trades.clone())
    }

    fn __repr__(&self) -> String {
        format!(
            "BacktestSummary(strategy={}, signals={}, win_rate={:.2}%, avg_return={:.2}%)",
            self.strategy, self.total_signals, self.win_rate, self.avg_return
        )
    }
}

fn run_frame(
    df: DataFrame,
    strategy: &str,
    holding_days: usize,
    start: Option<&str>,
    end: Option<&str>,
    n_jobs: usize,
) -> ScanResult<BacktestSummary> {
    let start = start.map(parse_date).transpose()?;
    let end = end.map(parse_date).transpose()?;
    let mut config = BacktestConfig::new(holding_days, start, end, n_jobs)?;
    config.show_progress = false;
    config.history_days = usize::MAX;

    let strategies = StrategyConfig::default().with_enabled_list(strategy)?;
    let registry = StrategyRegistry::from_config(&strategies)?;
    let data = InMemoryMarketData::from_frame(&df)?;

    let engine = BacktestEngine::new(config, registry)?;
    let results = engine.run(&data)?;
    let result = results
        .into_iter()
        .next()
        .ok_or(crate::errors::ScanError::NoStrategies)?;
    let trades = trades_to_frame([&result])?;
    let s = result.stats;

    Ok(BacktestSummary {
        strategy: result.strategy.as_str().to_string(),
        total_signals: s.total_signals,
        win_count: s.win_count,
        loss_count: s.loss_count,
        win_rate: s.win_rate,
        avg_return: s.avg_return,
        max_return: s.max_return,
        min_return: s.min_return,
        total_return: s.total_return,
        trades,
    })
}

/// 对一张包含 `code, date, open, close, high, low, volume, amount` 的长表回测单个策略
#[pyfunction]
#[pyo3(signature = (df, strategy, holding_days = 5, start = None, end = None, n_jobs = 1))]
pub fn backtest_frame(
    df: PyDataFrame,
    strategy: &str,
    holding_days: usize,
    start: Option<&str>,
    end: Option<&str>,
    n_jobs: usize,
) -> PyResult<BacktestSummary> {
    Ok(run_frame(df.into(), strategy, holding_days, start, end, n_jobs)?)
}

#[pymodule]
fn scan_core(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<BacktestSummary>()?;
    m.add_function(wrap_pyfunction!(backtest_frame, m)?)?;
    Ok(())
}

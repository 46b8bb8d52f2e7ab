use chrono::{Local, NaiveDate};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use std::collections::BTreeMap;

use crate::aggregator::{BacktestResult, ScanReport};
use crate::config::{BacktestConfig, ScanConfig};
use crate::errors::{ErrorContext, ScanError, ScanResult};
use crate::scanner::scan_one;
use crate::source::{MarketData, Notifier, SignalSink};
use crate::strategy::{StrategyId, StrategyRegistry};
use crate::types::{validate_bars, ResultRow, SignalRecord, StockInfo, TradeRecord};
use crate::window::HistoryWindow;

fn progress_bar(len: usize, show: bool, label: &str) -> ProgressBar {
    if !show {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(len as u64);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} {msg} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
    {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb.set_message(label.to_string());
    pb
}

/// 逐只股票执行 `f`，结果按股票池顺序返回。
///
/// `n_jobs > 1` 时在独立的 rayon 线程池中并行执行，输出与单线程一致。
fn for_each_stock<T, F>(stocks: &[StockInfo], n_jobs: usize, pb: &ProgressBar, f: F) -> ScanResult<Vec<T>>
where
    T: Send,
    F: Fn(&StockInfo) -> T + Sync,
{
    let step = |stock: &StockInfo| {
        let out = f(stock);
        pb.inc(1);
        out
    };

    let results: Vec<T> = if n_jobs > 1 {
        // 多线程处理
        let pool = rayon::ThreadPoolBuilder::new().num_threads(n_jobs).build()?;
        pool.install(|| stocks.par_iter().map(step).collect())
    } else {
        // 单线程处理
        stocks.iter().map(step).collect()
    };
    pb.finish_and_clear();
    Ok(results)
}

fn load_universe(data: &dyn MarketData) -> ScanResult<Vec<StockInfo>> {
    let stocks = data.stock_list().context("获取股票列表")?;
    if stocks.is_empty() {
        return Err(ScanError::EmptyUniverse);
    }
    Ok(stocks)
}

/// 实盘扫描：每只股票取最近一段日线，对最后一天运行全部策略
pub struct ScanEngine {
    config:   ScanConfig,
    registry: StrategyRegistry,
}

impl ScanEngine {
    pub fn new(config: ScanConfig, registry: StrategyRegistry) -> ScanResult<Self> {
        config.validate()?;
        if registry.is_empty() {
            return Err(ScanError::NoStrategies);
        }
        Ok(Self { config, registry })
    }

    pub fn registry(&self) -> &StrategyRegistry {
        &self.registry
    }

    pub fn run_scan(&self, data: &dyn MarketData) -> ScanResult<ScanReport> {
        let stocks = load_universe(data)?;
        tracing::info!(
            "开始扫描 {} 只股票, 策略: {:?}",
            stocks.len(),
            self.registry.ids()
        );

        let pb = progress_bar(stocks.len(), self.config.show_progress, "扫描");
        let per_stock = for_each_stock(&stocks, self.config.n_jobs, &pb, |stock| {
            self.scan_stock(data, stock)
                .map_err(|e| tracing::warn!("跳过 {}: {}", stock.code, e))
                .unwrap_or_default()
        })?;

        let mut report = ScanReport::new(&self.registry.ids());
        for (strategy, row) in per_stock.into_iter().flatten() {
            report.push(strategy, row);
        }
        for (strategy, rows) in &report.results {
            tracing::info!("{} 命中 {} 只", strategy, rows.len());
        }
        Ok(report)
    }

    fn scan_stock(&self, data: &dyn MarketData, stock: &StockInfo) -> ScanResult<Vec<(StrategyId, ResultRow)>> {
        let lookback = self.config.lookback_bars;
        let Some(bars) = data.fetch_history(&stock.code, lookback)? else {
            tracing::debug!("{} 没有历史数据", stock.code);
            return Ok(Vec::new());
        };
        if bars.is_empty() {
            return Ok(Vec::new());
        }
        validate_bars(&stock.code, &bars)?;

        let window = HistoryWindow::tail(&bars, lookback);
        let snapshot = data
            .fetch_snapshot(&stock.code)
            .unwrap_or_else(|| window.derive_snapshot(stock));

        let rows = scan_one(&stock.code, &window, &snapshot, &self.registry)
            .into_iter()
            .filter_map(|(strategy, signal)| {
                signal.map(|signal| {
                    let row = ResultRow {
                        code: stock.code.clone(),
                        name: stock.name.clone(),
                        price: snapshot.price,
                        change_percent: snapshot.change_percent,
                        signal,
                    };
                    (strategy, row)
                })
            })
            .collect();
        Ok(rows)
    }

    /// 保存并推送扫描结果，任何一步失败都只记录日志。
    ///
    /// 返回推送结果，没有 `notifier` 时为 `None`。
    pub fn publish(
        &self,
        report: &ScanReport,
        date: NaiveDate,
        sink: Option<&dyn SignalSink>,
        notifier: Option<&dyn Notifier>,
    ) -> Option<ScanResult<()>> {
        if let Some(sink) = sink {
            for (strategy, rows) in &report.results {
                match sink.persist_signals(*strategy, date, rows) {
                    Ok(n) => tracing::debug!("保存 {} 的 {} 条结果", strategy, n),
                    Err(e) => tracing::warn!("保存 {} 的结果失败: {}", strategy, e),
                }
            }
        }
        notifier.map(|notifier| {
            let outcome = notifier.notify(report, date);
            match &outcome {
                Ok(()) => tracing::info!("推送成功"),
                Err(e) => tracing::warn!("推送失败: {}", e),
            }
            outcome
        })
    }
}

/// 历史回测：逐日推进窗口，信号日收盘买入，持有固定交易日后收盘卖出
pub struct BacktestEngine {
    config:   BacktestConfig,
    registry: StrategyRegistry,
}

impl BacktestEngine {
    pub fn new(config: BacktestConfig, registry: StrategyRegistry) -> ScanResult<Self> {
        config.validate()?;
        if registry.is_empty() {
            return Err(ScanError::NoStrategies);
        }
        Ok(Self { config, registry })
    }

    pub fn config(&self) -> &BacktestConfig {
        &self.config
    }

    /// 区间未配置时以今天为结束日
    pub fn run(&self, data: &dyn MarketData) -> ScanResult<Vec<BacktestResult>> {
        self.run_until(data, Local::now().date_naive())
    }

    pub fn run_until(&self, data: &dyn MarketData, today: NaiveDate) -> ScanResult<Vec<BacktestResult>> {
        let stocks = load_universe(data)?;
        let (start, end) = self.config.date_range(today);
        tracing::info!(
            "开始回测 {} 只股票, 区间 {} ~ {}, 持有 {} 天",
            stocks.len(),
            start,
            end,
            self.config.holding_days
        );

        let pb = progress_bar(stocks.len(), self.config.show_progress, "回测");
        let per_stock = for_each_stock(&stocks, self.config.n_jobs, &pb, |stock| {
            self.backtest_stock(data, stock, start, end)
                .map_err(|e| tracing::warn!("跳过 {}: {}", stock.code, e))
                .unwrap_or_default()
        })?;

        let mut merged: BTreeMap<StrategyId, BacktestResult> = self
            .registry
            .ids()
            .into_iter()
            .map(|id| (id, BacktestResult::new(id)))
            .collect();
        for stock_results in per_stock {
            for part in stock_results {
                if let Some(result) = merged.get_mut(&part.strategy) {
                    result.extend(part);
                }
            }
        }

        let mut results: Vec<BacktestResult> = merged.into_values().collect();
        for result in results.iter_mut() {
            let stats = result.finalize(self.config.holding_days);
            tracing::info!(
                "{} 信号 {} 个, 胜率 {:.2}%, 平均收益 {:.2}%",
                result.strategy,
                stats.total_signals,
                stats.win_rate,
                stats.avg_return
            );
        }
        Ok(results)
    }

    fn backtest_stock(
        &self,
        data: &dyn MarketData,
        stock: &StockInfo,
        start: NaiveDate,
        end: NaiveDate,
    ) -> ScanResult<Vec<BacktestResult>> {
        let cfg = &self.config;
        let Some(bars) = data.fetch_history(&stock.code, cfg.history_days)? else {
            tracing::debug!("{} 没有历史数据", stock.code);
            return Ok(Vec::new());
        };
        validate_bars(&stock.code, &bars)?;

        // [first, stop) 为区间内的 K 线
        let first = bars.partition_point(|b| b.date < start);
        let stop = bars.partition_point(|b| b.date <= end);
        let in_range = stop.saturating_sub(first);
        if in_range < cfg.min_history_bars {
            tracing::debug!("{} 区间内只有 {} 根 K 线, 跳过", stock.code, in_range);
            return Ok(Vec::new());
        }

        let base = if cfg.warmup_before_start { 0 } else { first };
        let bars = &bars[base..stop];
        let first = first - base;

        let mut results: BTreeMap<StrategyId, BacktestResult> = self
            .registry
            .ids()
            .into_iter()
            .map(|id| (id, BacktestResult::new(id)))
            .collect();

        let hold = cfg.holding_days;
        let begin = first.max(cfg.min_window_bars.saturating_sub(1));
        for i in begin..bars.len().saturating_sub(hold) {
            let window = HistoryWindow::truncated(bars, i);
            let snapshot = window.derive_snapshot(stock);

            for (strategy, signal) in scan_one(&stock.code, &window, &snapshot, &self.registry) {
                let Some(signal) = signal else { continue };
                let Some(result) = results.get_mut(&strategy) else { continue };
                let (buy, sell) = (&bars[i], &bars[i + hold]);
                result.add_signal(SignalRecord {
                    code: stock.code.clone(),
                    name: stock.name.clone(),
                    date: buy.date,
                    price: buy.close,
                    signal,
                });
                result.add_trade(TradeRecord::new(&stock.code, buy, sell));
            }
        }

        Ok(results.into_values().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::InMemoryMarketData;
    use crate::strategy::test_support::*;
    use crate::types::PriceBar;

    fn config(start: NaiveDate, end: NaiveDate) -> BacktestConfig {
        BacktestConfig {
            start_date: Some(start),
            end_date: Some(end),
            show_progress: false,
            ..Default::default()
        }
    }

    fn cross_bars() -> Vec<PriceBar> {
        let mut closes = vec![10.0; 30];
        closes.extend((11..=22).map(|c| c as f64));
        bars_from_closes(&closes)
    }

    fn golden_only() -> StrategyRegistry {
        let cfg = crate::config::StrategyConfig {
            enabled: vec![StrategyId::GoldenCross],
            ..Default::default()
        };
        StrategyRegistry::from_config(&cfg).unwrap()
    }

    #[test]
    fn trade_sells_after_holding_days() {
        let bars = cross_bars();
        let (start, end) = (bars[0].date, bars[bars.len() - 1].date);
        let data = InMemoryMarketData::new().with_stock(StockInfo::new("600000", "浦发银行"), bars.clone());
        let engine = BacktestEngine::new(config(start, end), golden_only()).unwrap();
        let results = engine.run_until(&data, end).unwrap();

        assert_eq!(results.len(), 1);
        let result = &results[0];
        assert_eq!(result.trades.len(), 1);
        let trade = &result.trades[0];
        assert_eq!(trade.buy_date, bars[30].date);
        assert_eq!(trade.sell_date, bars[35].date);
        assert_eq!(trade.return_pct, (16.0 - 11.0) / 11.0 * 100.0);
        assert_eq!(result.stats.total_signals, 1);
        assert_eq!(result.signals[0].price, 11.0);
    }

    fn run_golden(bars: Vec<PriceBar>) -> BacktestResult {
        let (start, end) = (bars[0].date, bars[bars.len() - 1].date);
        let data = InMemoryMarketData::new().with_stock(StockInfo::new("600000", "浦发银行"), bars);
        let engine = BacktestEngine::new(config(start, end), golden_only()).unwrap();
        engine.run_until(&data, end).unwrap().remove(0)
    }

    #[test]
    fn last_evaluated_bar_keeps_sell_in_range() {
        // 金叉在 bars[30]，共 36 根：30 = len - hold - 1，卖出日为最后一根
        let mut closes = vec![10.0; 30];
        closes.extend((11..=16).map(|c| c as f64));
        let bars = bars_from_closes(&closes);
        let result = run_golden(bars.clone());
        assert_eq!(result.trades.len(), 1);
        assert_eq!(result.trades[0].buy_date, bars[30].date);
        assert_eq!(result.trades[0].sell_date, bars[35].date);

        // 少一根时 30 = len - hold，卖出日会落在区间外
        let result = run_golden(bars[..35].to_vec());
        assert!(result.trades.is_empty());
        assert_eq!(result.stats.total_signals, 0);
    }

    #[test]
    fn short_range_is_skipped() {
        let bars = cross_bars();
        let start = bars[20].date;
        let end = bars[bars.len() - 1].date;
        let data = InMemoryMarketData::new().with_stock(StockInfo::new("600000", "浦发银行"), bars);
        let engine = BacktestEngine::new(config(start, end), golden_only()).unwrap();
        let results = engine.run_until(&data, end).unwrap();
        assert!(results[0].trades.is_empty());
    }

    #[test]
    fn warmup_uses_bars_before_start() {
        let bars = cross_bars();
        let start = bars[10].date;
        let end = bars[bars.len() - 1].date;
        let data = InMemoryMarketData::new().with_stock(StockInfo::new("600000", "浦发银行"), bars.clone());
        let cfg = BacktestConfig {
            warmup_before_start: true,
            ..config(start, end)
        };
        let engine = BacktestEngine::new(cfg, golden_only()).unwrap();
        let results = engine.run_until(&data, end).unwrap();
        assert_eq!(results[0].trades.len(), 1);
        assert_eq!(results[0].trades[0].buy_date, bars[30].date);

        // 不预热时窗口从 bars[10] 开始，金叉出现得更晚或不出现
        let engine = BacktestEngine::new(config(start, end), golden_only()).unwrap();
        let results = engine.run_until(&data, end).unwrap();
        assert!(results[0].trades.iter().all(|t| t.buy_date > bars[30].date));
    }

    #[test]
    fn empty_universe_is_fatal() {
        let data = InMemoryMarketData::new();
        let day = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let engine = BacktestEngine::new(config(day, day), golden_only()).unwrap();
        assert!(matches!(engine.run_until(&data, day), Err(ScanError::EmptyUniverse)));

        let scan = ScanEngine::new(ScanConfig::default(), golden_only()).unwrap();
        assert!(matches!(scan.run_scan(&data), Err(ScanError::EmptyUniverse)));
    }

    #[derive(Default)]
    struct Recorder {
        saved: std::sync::Mutex<Vec<(StrategyId, usize)>>,
    }

    impl SignalSink for Recorder {
        fn persist_signals(&self, strategy: StrategyId, _date: NaiveDate, rows: &[ResultRow]) -> ScanResult<usize> {
            self.saved.lock().unwrap().push((strategy, rows.len()));
            Ok(rows.len())
        }
    }

    struct Offline;

    impl Notifier for Offline {
        fn notify(&self, _report: &ScanReport, _date: NaiveDate) -> ScanResult<()> {
            Err(ScanError::Notify("网络不可用".into()))
        }
    }

    #[test]
    fn publish_saves_then_returns_push_outcome() {
        let mut report = ScanReport::new(&[StrategyId::GoldenCross, StrategyId::MacdCross]);
        report.push(
            StrategyId::GoldenCross,
            ResultRow {
                code: "600000".into(),
                name: "浦发银行".into(),
                price: 11.0,
                change_percent: 10.0,
                signal: crate::types::Signal::new("均线金叉", "测试"),
            },
        );
        let engine = ScanEngine::new(ScanConfig::default(), golden_only()).unwrap();
        let day = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let sink = Recorder::default();

        let outcome = engine.publish(&report, day, Some(&sink), Some(&Offline));
        assert!(matches!(outcome, Some(Err(ScanError::Notify(_)))));
        assert_eq!(
            *sink.saved.lock().unwrap(),
            vec![(StrategyId::GoldenCross, 1), (StrategyId::MacdCross, 0)]
        );
        assert!(engine.publish(&report, day, None, None).is_none());
    }

    #[test]
    fn live_scan_uses_quote_when_present() {
        let mut closes = vec![10.0; 30];
        closes.push(11.0);
        let bars = bars_from_closes(&closes);
        let data = InMemoryMarketData::new()
            .with_stock(StockInfo::new("600000", "浦发银行"), bars.clone())
            .with_stock(StockInfo::new("000001", "平安银行"), bars)
            .with_quote(crate::types::Snapshot {
                code: "000001".into(),
                name: "平安银行".into(),
                price: 11.05,
                change_percent: 10.5,
            });
        let config = ScanConfig {
            show_progress: false,
            ..Default::default()
        };
        let report = ScanEngine::new(config, golden_only()).unwrap().run_scan(&data).unwrap();
        let rows = report.rows(StrategyId::GoldenCross);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].code, "600000");
        assert_eq!(rows[0].change_percent, 10.0);
        assert_eq!(rows[1].price, 11.05);
        assert_eq!(rows[1].change_percent, 10.5);
    }
}

//! 用合成行情演示实盘扫描与回测。
//!
//! cargo run -p scan-core --example basic_usage

use chrono::{Days, NaiveDate};
use scan_core::report::{format_backtest_report, format_comparison, format_scan_report};
use scan_core::{
    BacktestConfig, BacktestEngine, InMemoryMarketData, PriceBar, ScanConfig, ScanEngine, ScanResult, StockInfo,
    StrategyConfig, StrategyRegistry,
};

fn wave(start: NaiveDate, n: usize, period: f64, base: f64) -> Vec<PriceBar> {
    (0..n)
        .map(|i| {
            let x = i as f64;
            let close = base * (1.0 + 0.08 * (x * std::f64::consts::TAU / period).sin());
            let volume = if i % 17 == 0 { 80_000.0 } else { 20_000.0 };
            PriceBar::from_close(start + Days::new(i as u64), close, volume)
        })
        .collect()
}

fn main() -> ScanResult<()> {
    let start = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
    let data = InMemoryMarketData::new()
        .with_stock(StockInfo::new("600000", "浦发银行"), wave(start, 160, 32.0, 10.0))
        .with_stock(StockInfo::new("000001", "平安银行"), wave(start, 160, 41.0, 12.0))
        .with_stock(StockInfo::new("300750", "宁德时代"), wave(start, 160, 27.0, 180.0));

    let strategies = StrategyConfig::default().with_enabled_list("all")?;

    let scan = ScanEngine::new(
        ScanConfig {
            show_progress: false,
            ..Default::default()
        },
        StrategyRegistry::from_config(&strategies)?,
    )?;
    let report = scan.run_scan(&data)?;
    print!("{}", format_scan_report(&report));

    let end = start + Days::new(159);
    let mut config = BacktestConfig::new(5, Some(start), Some(end), 2)?;
    config.show_progress = false;
    let engine = BacktestEngine::new(config, StrategyRegistry::from_config(&strategies)?)?;
    let results = engine.run_until(&data, end)?;
    for result in &results {
        print!("{}", format_backtest_report(result));
    }
    print!("{}", format_comparison(&results));
    Ok(())
}

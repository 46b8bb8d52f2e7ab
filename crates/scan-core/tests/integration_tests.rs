use chrono::{Days, NaiveDate};
use scan_core::{
    BacktestConfig, BacktestEngine, InMemoryMarketData, PriceBar, ScanConfig, ScanEngine, ScanError,
    SqliteStore, StockInfo, StrategyConfig, StrategyId, StrategyRegistry,
};

fn base_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2023, 1, 2).unwrap()
}

// 正弦波动叠加伪随机扰动的日线
fn synthetic_bars(seed: u64, n: usize) -> Vec<PriceBar> {
    let mut state = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
    let mut next = move || {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        ((state >> 33) as f64) / ((1u64 << 31) as f64)
    };
    let period = 30.0 + (seed % 7) as f64 * 3.0;
    (0..n)
        .map(|i| {
            let x = i as f64;
            let close = 20.0 + 4.0 * (x * std::f64::consts::TAU / period).sin() + next() * 0.8;
            let volume = 10_000.0 * (1.0 + next() * 2.5);
            PriceBar::from_close(base_date() + Days::new(i as u64), close, volume)
        })
        .collect()
}

fn universe(n: usize, bars: usize) -> InMemoryMarketData {
    (0..n).fold(InMemoryMarketData::new(), |data, i| {
        let code = if i % 2 == 0 { format!("6{:05}", i) } else { format!("0{:05}", i) };
        data.with_stock(StockInfo::new(code, format!("股票{}", i)), synthetic_bars(i as u64 + 1, bars))
    })
}

fn backtest_config(n_jobs: usize) -> BacktestConfig {
    let end = base_date() + Days::new(199);
    BacktestConfig {
        start_date: Some(base_date()),
        end_date: Some(end),
        n_jobs,
        show_progress: false,
        ..Default::default()
    }
}

fn all_strategies() -> StrategyRegistry {
    let config = StrategyConfig::default().with_enabled_list("all").unwrap();
    StrategyRegistry::from_config(&config).unwrap()
}

#[test]
fn test_trades_follow_holding_period() {
    let data = universe(6, 200);
    let config = backtest_config(1);
    let hold = config.holding_days;
    let engine = BacktestEngine::new(config, all_strategies()).unwrap();
    let results = engine.run_until(&data, base_date()).unwrap();

    assert_eq!(results.len(), StrategyId::ALL.len());
    let golden = results.iter().find(|r| r.strategy == StrategyId::GoldenCross).unwrap();
    assert!(!golden.trades.is_empty());

    for result in &results {
        assert_eq!(result.signals.len(), result.trades.len());
        assert_eq!(result.stats.total_signals, result.trades.len());
        for trade in &result.trades {
            let bars = data.history(&trade.code).unwrap();
            let buy = bars.iter().position(|b| b.date == trade.buy_date).unwrap();
            assert_eq!(bars[buy + hold].date, trade.sell_date);
            assert_eq!(bars[buy].close, trade.buy_price);
            assert_eq!(bars[buy + hold].close, trade.sell_price);
            let expected = (trade.sell_price - trade.buy_price) / trade.buy_price * 100.0;
            assert!((trade.return_pct - expected).abs() < 1e-12);
            // 窗口至少 20 根，卖出日不超过区间
            assert!(buy >= 19);
            assert!(buy + hold < bars.len());
        }
    }
}

#[test]
fn test_parallel_matches_sequential() {
    let data = universe(12, 200);
    let sequential = BacktestEngine::new(backtest_config(1), all_strategies())
        .unwrap()
        .run_until(&data, base_date())
        .unwrap();
    let parallel = BacktestEngine::new(backtest_config(4), all_strategies())
        .unwrap()
        .run_until(&data, base_date())
        .unwrap();

    assert_eq!(sequential.len(), parallel.len());
    for (a, b) in sequential.iter().zip(parallel.iter()) {
        assert_eq!(a.strategy, b.strategy);
        assert_eq!(a.trades, b.trades);
        assert_eq!(a.signals, b.signals);
        assert_eq!(a.stats, b.stats);
    }
}

#[test]
fn test_malformed_stock_is_skipped() {
    let clean = universe(3, 200);
    let mut broken = synthetic_bars(99, 200);
    broken[50].date = broken[49].date;
    let with_broken = clean
        .clone()
        .with_stock(StockInfo::new("300999", "坏数据"), broken);

    let run = |data: &InMemoryMarketData| {
        BacktestEngine::new(backtest_config(1), all_strategies())
            .unwrap()
            .run_until(data, base_date())
            .unwrap()
    };
    let expected = run(&clean);
    let actual = run(&with_broken);
    for (a, b) in expected.iter().zip(actual.iter()) {
        assert_eq!(a.trades, b.trades);
    }
}

#[test]
fn test_finalize_is_idempotent() {
    let data = universe(4, 200);
    let mut results = BacktestEngine::new(backtest_config(1), all_strategies())
        .unwrap()
        .run_until(&data, base_date())
        .unwrap();
    for result in results.iter_mut() {
        let before = result.stats.clone();
        assert_eq!(result.finalize(5), before);
        assert_eq!(result.finalize(5), before);
        let ranked = result.ranked_trades();
        assert!(ranked.windows(2).all(|w| w[0].return_pct >= w[1].return_pct));
    }
}

#[test]
fn test_short_history_produces_nothing() {
    let data = InMemoryMarketData::new().with_stock(StockInfo::new("600000", "浦发银行"), synthetic_bars(1, 5));
    let config = BacktestConfig {
        min_history_bars: 1,
        ..backtest_config(1)
    };
    let results = BacktestEngine::new(config, all_strategies())
        .unwrap()
        .run_until(&data, base_date())
        .unwrap();
    assert!(results.iter().all(|r| r.trades.is_empty()));

    let scan = ScanEngine::new(
        ScanConfig {
            show_progress: false,
            ..Default::default()
        },
        all_strategies(),
    )
    .unwrap();
    let report = scan.run_scan(&data).unwrap();
    assert_eq!(report.total_signals(), 0);
    assert_eq!(report.results.len(), StrategyId::ALL.len());
}

#[test]
fn test_empty_strategy_list_is_fatal() {
    let config = StrategyConfig {
        enabled: vec![],
        ..Default::default()
    };
    assert!(matches!(StrategyRegistry::from_config(&config), Err(ScanError::NoStrategies)));
}

#[test]
fn test_sqlite_source_matches_memory() {
    let data = universe(4, 200);
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteStore::open(&dir.path().join("stock.db")).unwrap();
    store.save_stocks(data.stocks()).unwrap();
    for stock in data.stocks() {
        store.save_history(&stock.code, data.history(&stock.code).unwrap()).unwrap();
    }

    let from_memory = BacktestEngine::new(backtest_config(1), all_strategies())
        .unwrap()
        .run_until(&data, base_date())
        .unwrap();
    let from_sqlite = BacktestEngine::new(backtest_config(2), all_strategies())
        .unwrap()
        .run_until(&store, base_date())
        .unwrap();

    // SQLite 按代码排序返回股票池，只比较每个策略的交易集合
    for (a, b) in from_memory.iter().zip(from_sqlite.iter()) {
        let mut x = a.trades.clone();
        let mut y = b.trades.clone();
        x.sort_by(|p, q| (p.code.as_str(), p.buy_date).cmp(&(q.code.as_str(), q.buy_date)));
        y.sort_by(|p, q| (p.code.as_str(), p.buy_date).cmp(&(q.code.as_str(), q.buy_date)));
        assert_eq!(x, y);
    }
}

#[test]
fn test_live_scan_persists_results() {
    let data = universe(8, 120);
    let engine = ScanEngine::new(
        ScanConfig {
            show_progress: false,
            n_jobs: 3,
            ..Default::default()
        },
        all_strategies(),
    )
    .unwrap();
    let report = engine.run_scan(&data).unwrap();

    let store = SqliteStore::open_in_memory().unwrap();
    let date = base_date() + Days::new(119);
    assert!(engine.publish(&report, date, Some(&store), None).is_none());
    let saved = store.get_scan_results(Some(date), None).unwrap();
    assert_eq!(saved.len(), report.total_signals());
}

#[test]
fn test_future_bars_do_not_change_past_trades() {
    let full = universe(5, 200);
    let cut = 150;
    let truncated = full.stocks().iter().fold(InMemoryMarketData::new(), |data, stock| {
        let bars = full.history(&stock.code).unwrap()[..cut].to_vec();
        data.with_stock(stock.clone(), bars)
    });

    let run = |data: &InMemoryMarketData| {
        BacktestEngine::new(backtest_config(1), all_strategies())
            .unwrap()
            .run_until(data, base_date())
            .unwrap()
    };
    let last_day = base_date() + Days::new(cut as u64 - 1);
    for (a, b) in run(&full).iter().zip(run(&truncated).iter()) {
        let past: Vec<_> = a.trades.iter().filter(|t| t.sell_date <= last_day).cloned().collect();
        assert_eq!(past, b.trades);
    }
}

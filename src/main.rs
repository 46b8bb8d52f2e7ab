use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use chrono::{Local, NaiveDate};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use scan_core::frame::{parse_date, write_trades_csv};
use scan_core::report::{format_backtest_report, format_comparison, format_scan_report};
use scan_core::{
    AppConfig, BacktestEngine, DingTalkNotifier, InMemoryMarketData, MarketData, Notifier, ScanEngine,
    SignalSink, SqliteStore, StrategyId, StrategyRegistry,
};

#[derive(Parser, Debug)]
#[command(name = "ashare_scan", about = "A 股策略扫描与回测", version)]
struct Cli {
    /// TOML 配置文件
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// 输出调试日志
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug, Clone)]
struct SourceArgs {
    /// SQLite 数据库路径，默认取配置中的 storage.db_path
    #[arg(long)]
    db: Option<PathBuf>,

    /// 行情目录，每只股票一个 <code>.csv / <code>.feather 文件
    #[arg(long)]
    data_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// 对最新行情运行策略扫描
    Scan {
        #[command(flatten)]
        source: SourceArgs,

        /// 逗号分隔的策略列表，all 表示全部
        #[arg(long)]
        strategies: Option<String>,

        #[arg(long)]
        n_jobs: Option<usize>,

        /// 扫描日期，默认今天
        #[arg(long)]
        date: Option<String>,

        /// 不推送钉钉消息
        #[arg(long)]
        no_notify: bool,

        /// 不保存扫描结果
        #[arg(long)]
        no_save: bool,
    },
    /// 历史回测
    Backtest {
        #[command(flatten)]
        source: SourceArgs,

        #[arg(long)]
        strategies: Option<String>,

        #[arg(long)]
        start: Option<String>,

        #[arg(long)]
        end: Option<String>,

        /// 持有交易日数
        #[arg(long)]
        hold: Option<usize>,

        #[arg(long)]
        n_jobs: Option<usize>,

        /// 区间开始前的 K 线也参与指标预热
        #[arg(long)]
        warmup: bool,

        /// 回测结果写成 JSON
        #[arg(long)]
        json: Option<PathBuf>,

        /// 交易明细写成 CSV
        #[arg(long)]
        trades_csv: Option<PathBuf>,
    },
    /// 把行情目录导入 SQLite
    Import {
        #[arg(long)]
        data_dir: PathBuf,

        #[arg(long)]
        db: Option<PathBuf>,
    },
    /// 查看已保存的扫描结果
    Results {
        #[arg(long)]
        db: Option<PathBuf>,

        #[arg(long)]
        date: Option<String>,

        #[arg(long)]
        strategy: Option<String>,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .with_target(false)
        .init();
}

fn db_path(config: &AppConfig, db: Option<&Path>) -> PathBuf {
    db.map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(&config.storage.db_path))
}

fn open_source(config: &AppConfig, source: &SourceArgs) -> Result<Box<dyn MarketData>> {
    match &source.data_dir {
        Some(dir) => Ok(Box::new(InMemoryMarketData::from_dir(dir)?)),
        None => {
            let path = db_path(config, source.db.as_deref());
            let store = SqliteStore::open(&path).with_context(|| format!("打开数据库 {}", path.display()))?;
            Ok(Box::new(store))
        }
    }
}

fn parse_opt_date(s: Option<&str>) -> Result<Option<NaiveDate>> {
    s.map(|s| parse_date(s).with_context(|| format!("无法解析日期 {}", s)))
        .transpose()
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = AppConfig::load(cli.config.as_deref())?;

    match cli.command {
        Command::Scan {
            source,
            strategies,
            n_jobs,
            date,
            no_notify,
            no_save,
        } => {
            if let Some(list) = strategies {
                config.strategies = config.strategies.with_enabled_list(&list)?;
            }
            if let Some(n) = n_jobs {
                config.scan.n_jobs = n;
            }
            let date = parse_opt_date(date.as_deref())?.unwrap_or_else(|| Local::now().date_naive());
            run_scan(&config, &source, date, !no_save, !no_notify)
        }
        Command::Backtest {
            source,
            strategies,
            start,
            end,
            hold,
            n_jobs,
            warmup,
            json,
            trades_csv,
        } => {
            if let Some(list) = strategies {
                config.strategies = config.strategies.with_enabled_list(&list)?;
            }
            let bt = &mut config.backtest;
            if let Some(start) = parse_opt_date(start.as_deref())? {
                bt.start_date = Some(start);
            }
            if let Some(end) = parse_opt_date(end.as_deref())? {
                bt.end_date = Some(end);
            }
            if let Some(hold) = hold {
                bt.holding_days = hold;
            }
            if let Some(n) = n_jobs {
                bt.n_jobs = n;
            }
            bt.warmup_before_start |= warmup;
            run_backtest(&config, &source, json.as_deref(), trades_csv.as_deref())
        }
        Command::Import { data_dir, db } => run_import(&config, &data_dir, db.as_deref()),
        Command::Results { db, date, strategy } => {
            let store = SqliteStore::open(&db_path(&config, db.as_deref()))?;
            let date = parse_opt_date(date.as_deref())?;
            let strategy = strategy.map(|s| s.parse::<StrategyId>()).transpose()?;
            let rows = store.get_scan_results(date, strategy)?;
            println!("共 {} 条记录", rows.len());
            for r in rows {
                let desc = r.signal.map(|s| s.description).unwrap_or_default();
                println!(
                    "  {} {:<18} {:<8} {:<10} {:>8.2} {:>+8.2}%  {}",
                    r.scan_date, r.strategy, r.code, r.name, r.price, r.change_percent, desc
                );
            }
            Ok(())
        }
    }
}

fn run_scan(config: &AppConfig, source: &SourceArgs, date: NaiveDate, save: bool, notify: bool) -> Result<()> {
    let outcome = (|| -> Result<_> {
        let data = open_source(config, source)?;
        let registry = StrategyRegistry::from_config(&config.strategies)?;
        let engine = ScanEngine::new(config.scan.clone(), registry)?;
        let report = engine.run_scan(data.as_ref())?;
        Ok((engine, report))
    })();

    let (engine, report) = match outcome {
        Ok(v) => v,
        Err(e) => {
            println!("扫描结果: 0");
            return Err(e);
        }
    };
    print!("{}", format_scan_report(&report));

    let store = if save {
        let path = db_path(config, source.db.as_deref());
        match SqliteStore::open(&path) {
            Ok(store) => Some(store),
            Err(e) => {
                tracing::warn!("打开数据库 {} 失败, 不保存结果: {}", path.display(), e);
                None
            }
        }
    } else {
        None
    };

    let notifier = if notify {
        let notifier = DingTalkNotifier::new(config.notify.clone())?;
        if notifier.is_configured() {
            Some(notifier)
        } else {
            tracing::warn!("未配置钉钉 Webhook URL, 跳过推送");
            None
        }
    } else {
        None
    };

    let pushed = engine.publish(
        &report,
        date,
        store.as_ref().map(|s| s as &dyn SignalSink),
        notifier.as_ref().map(|n| n as &dyn Notifier),
    );

    if let (Some(outcome), Some(store)) = (pushed, &store) {
        let (status, message) = match outcome {
            Ok(()) => ("success", String::new()),
            Err(e) => ("failed", e.to_string()),
        };
        if let Err(e) = store.save_push_record(date, "dingtalk", status, &message) {
            tracing::warn!("保存推送记录失败: {}", e);
        }
    }
    Ok(())
}

fn run_backtest(config: &AppConfig, source: &SourceArgs, json: Option<&Path>, trades_csv: Option<&Path>) -> Result<()> {
    let outcome = (|| -> Result<_> {
        let data = open_source(config, source)?;
        let registry = StrategyRegistry::from_config(&config.strategies)?;
        let engine = BacktestEngine::new(config.backtest.clone(), registry)?;
        Ok(engine.run(data.as_ref())?)
    })();

    let results = match outcome {
        Ok(results) => results,
        Err(e) => {
            println!("回测信号: 0");
            return Err(e);
        }
    };

    for result in &results {
        print!("{}", format_backtest_report(result));
    }
    print!("{}", format_comparison(&results));

    if let Some(path) = json {
        let body = serde_json::to_string_pretty(&results)?;
        std::fs::write(path, body).with_context(|| format!("写入 {}", path.display()))?;
        tracing::info!("回测结果已写入 {}", path.display());
    }
    if let Some(path) = trades_csv {
        let n = write_trades_csv(&results, path)?;
        tracing::info!("{} 笔交易已写入 {}", n, path.display());
    }
    Ok(())
}

fn run_import(config: &AppConfig, data_dir: &Path, db: Option<&Path>) -> Result<()> {
    let data = InMemoryMarketData::from_dir(data_dir)?;
    if data.is_empty() {
        bail!("{} 中没有可导入的行情文件", data_dir.display());
    }
    let path = db_path(config, db);
    let store = SqliteStore::open(&path)?;
    store.save_stocks(data.stocks())?;
    let mut rows = 0;
    for stock in data.stocks() {
        let Some(bars) = data.history(&stock.code) else { continue };
        rows += store.save_history(&stock.code, bars)?;
    }
    tracing::info!("导入 {} 只股票, {} 根 K 线到 {}", data.len(), rows, path.display());
    Ok(())
}

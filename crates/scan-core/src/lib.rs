pub mod aggregator;
pub mod config;
pub mod engine;
pub mod errors;
pub mod frame;
pub mod indicators;
pub mod notify;
pub mod report;
pub mod scanner;
pub mod source;
pub mod store;
pub mod strategy;
pub mod types;
pub mod window;

#[cfg(feature = "python")]
mod python;

pub use aggregator::{BacktestResult, BacktestStats, ScanReport};
pub use config::{AppConfig, BacktestConfig, NotifyConfig, ScanConfig, StorageConfig, StrategyConfig};
pub use engine::{BacktestEngine, ScanEngine};
pub use errors::{ErrorContext, ScanError, ScanResult};
pub use notify::DingTalkNotifier;
pub use scanner::scan_one;
pub use source::{InMemoryMarketData, MarketData, Notifier, SignalSink};
pub use store::SqliteStore;
pub use strategy::{Strategy, StrategyId, StrategyRegistry};
pub use types::{PriceBar, ResultRow, Signal, SignalRecord, Snapshot, StockInfo, TradeRecord};
pub use window::HistoryWindow;

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::errors::{ErrorContext, ScanError, ScanResult};
use crate::scan_err;
use crate::strategy::StrategyId;

pub const WEBHOOK_ENV: &str = "DINGTALK_WEBHOOK";

/// 顶层配置，对应一个 TOML 文件，所有字段都有默认值
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub scan:       ScanConfig,
    pub backtest:   BacktestConfig,
    pub strategies: StrategyConfig,
    pub notify:     NotifyConfig,
    pub storage:    StorageConfig,
}

impl AppConfig {
    pub fn from_toml_str(s: &str) -> ScanResult<Self> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// 读取配置文件并应用环境变量覆盖
    pub fn from_toml_file(path: &Path) -> ScanResult<Self> {
        let content = std::fs::read_to_string(path).context(&path.display().to_string())?;
        let mut config = Self::from_toml_str(&content)?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// 没有配置文件时使用默认值
    pub fn load(path: Option<&Path>) -> ScanResult<Self> {
        match path {
            Some(p) => Self::from_toml_file(p),
            None => {
                let mut config = Self::default();
                config.apply_env(|key| std::env::var(key).ok());
                Ok(config)
            }
        }
    }

    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(WEBHOOK_ENV).filter(|u| !u.trim().is_empty()) {
            self.notify.webhook_url = Some(url);
        }
    }

    pub fn validate(&self) -> ScanResult<()> {
        self.scan.validate()?;
        self.backtest.validate()?;
        Ok(())
    }
}

/// 实盘扫描参数
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// 每只股票读取的历史 K 线数
    pub lookback_bars: usize,
    pub n_jobs:        usize,
    pub show_progress: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            lookback_bars: 60,
            n_jobs: 1,
            show_progress: true,
        }
    }
}

impl ScanConfig {
    pub fn validate(&self) -> ScanResult<()> {
        if self.lookback_bars < 2 {
            return Err(scan_err!(Config, "lookback_bars 至少为 2, 当前 {}", self.lookback_bars));
        }
        if self.n_jobs == 0 {
            return Err(scan_err!(Config, "n_jobs 必须大于 0"));
        }
        Ok(())
    }
}

/// 回测参数
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestConfig {
    /// 持有交易日数
    pub holding_days:        usize,
    /// 每只股票读取的历史 K 线数
    pub history_days:        usize,
    /// 区间内 K 线少于该值的股票直接跳过
    pub min_history_bars:    usize,
    /// 窗口少于该值的交易日不做评估
    pub min_window_bars:     usize,
    pub start_date:          Option<NaiveDate>,
    pub end_date:            Option<NaiveDate>,
    /// 为 true 时，区间开始前的 K 线也进入窗口用于预热指标
    pub warmup_before_start: bool,
    pub n_jobs:              usize,
    pub show_progress:       bool,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            holding_days: 5,
            history_days: 365,
            min_history_bars: 30,
            min_window_bars: 20,
            start_date: None,
            end_date: None,
            warmup_before_start: false,
            n_jobs: 1,
            show_progress: true,
        }
    }
}

impl BacktestConfig {
    pub fn new(
        holding_days: usize,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
        n_jobs: usize,
    ) -> ScanResult<Self> {
        let config = BacktestConfig {
            holding_days,
            start_date,
            end_date,
            n_jobs,
            ..Default::default()
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ScanResult<()> {
        if self.holding_days == 0 {
            return Err(scan_err!(Config, "holding_days 必须大于 0"));
        }
        if self.n_jobs == 0 {
            return Err(scan_err!(Config, "n_jobs 必须大于 0"));
        }
        if let (Some(start), Some(end)) = (self.start_date, self.end_date) {
            if start > end {
                return Err(scan_err!(Config, "开始日期 {} 晚于结束日期 {}", start, end));
            }
        }
        Ok(())
    }

    /// 回测区间；未配置时结束日为 today，开始日为结束日前 180 天
    pub fn date_range(&self, today: NaiveDate) -> (NaiveDate, NaiveDate) {
        let end = self.end_date.unwrap_or(today);
        let start = self
            .start_date
            .unwrap_or_else(|| end.checked_sub_days(Days::new(180)).unwrap_or(NaiveDate::MIN));
        (start, end)
    }
}

/// 启用的策略及各策略的过滤开关
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyConfig {
    pub enabled:      Vec<StrategyId>,
    pub golden_cross: GoldenCrossParams,
    pub macd_cross:   MacdCrossParams,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            enabled: vec![StrategyId::GoldenCross, StrategyId::MacdCross],
            golden_cross: GoldenCrossParams::default(),
            macd_cross: MacdCrossParams::default(),
        }
    }
}

impl StrategyConfig {
    /// 解析命令行给出的策略列表，`all` 表示全部策略
    pub fn with_enabled_list(mut self, list: &str) -> ScanResult<Self> {
        let list = list.trim();
        self.enabled = if list.eq_ignore_ascii_case("all") {
            StrategyId::ALL.to_vec()
        } else {
            list.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::parse::<StrategyId>)
                .collect::<Result<Vec<_>, ScanError>>()?
        };
        Ok(self)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GoldenCrossParams {
    /// 要求收盘价不低于 60 日均线
    pub require_above_ma60: bool,
    /// 要求当日上涨
    pub require_rising:     bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MacdCrossParams {
    /// 要求 DIF 在零轴上方
    pub require_above_zero: bool,
    /// 要求当日上涨
    pub require_rising:     bool,
}

/// 钉钉推送配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    pub webhook_url:  Option<String>,
    pub timeout_secs: u64,
    /// 每个策略最多推送的股票数
    pub top_n:        usize,
    /// 只推送当日上涨的股票
    pub only_rising:  bool,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            timeout_secs: 10,
            top_n: 5,
            only_rising: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: "data/stock.db".to_string(),
        }
    }
}

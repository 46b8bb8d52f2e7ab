mod bollinger_rebound;
mod golden_cross;
mod macd_cross;
mod rsi_oversold;
mod volume_break;

pub use bollinger_rebound::BollingerRebound;
pub use golden_cross::GoldenCross;
pub use macd_cross::MacdCross;
pub use rsi_oversold::RsiOversold;
pub use volume_break::VolumeBreak;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::config::StrategyConfig;
use crate::errors::{ScanError, ScanResult};
use crate::scan_err;
use crate::types::{Signal, Snapshot};
use crate::window::HistoryWindow;

/// 策略标识，声明顺序即输出顺序
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyId {
    GoldenCross,
    MacdCross,
    RsiOversold,
    BollingerRebound,
    VolumeBreak,
}

impl StrategyId {
    pub const ALL: [StrategyId; 5] = [
        StrategyId::GoldenCross,
        StrategyId::MacdCross,
        StrategyId::RsiOversold,
        StrategyId::BollingerRebound,
        StrategyId::VolumeBreak,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyId::GoldenCross => "golden_cross",
            StrategyId::MacdCross => "macd_cross",
            StrategyId::RsiOversold => "rsi_oversold",
            StrategyId::BollingerRebound => "bollinger_rebound",
            StrategyId::VolumeBreak => "volume_break",
        }
    }

    /// 推送消息里使用的中文名称
    pub fn label(&self) -> &'static str {
        match self {
            StrategyId::GoldenCross => "🔺 均线金叉",
            StrategyId::MacdCross => "📊 MACD 金叉",
            StrategyId::RsiOversold => "🔄 RSI 超卖反弹",
            StrategyId::BollingerRebound => "📉 布林带下轨反弹",
            StrategyId::VolumeBreak => "📈 放量突破",
        }
    }
}

impl fmt::Display for StrategyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyId {
    type Err = ScanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StrategyId::ALL
            .into_iter()
            .find(|id| id.as_str() == s)
            .ok_or_else(|| scan_err!(Config, "未知策略: {}", s))
    }
}

/// 策略接口。
///
/// `evaluate` 必须是输入的纯函数：不读写外部状态、不做 I/O，
/// 窗口不足 `min_lookback()` 或计算出错时返回 `None`。
pub trait Strategy: Send + Sync {
    fn id(&self) -> StrategyId;

    fn description(&self) -> &'static str;

    fn version(&self) -> &'static str {
        "1.0.0"
    }

    /// 评估所需的最少 K 线数
    fn min_lookback(&self) -> usize;

    fn evaluate(&self, window: &HistoryWindow<'_>, snapshot: &Snapshot) -> Option<Signal>;
}

/// 按固定枚举组装的策略表
pub struct StrategyRegistry {
    strategies: BTreeMap<StrategyId, Box<dyn Strategy>>,
}

impl StrategyRegistry {
    pub fn from_config(config: &StrategyConfig) -> ScanResult<Self> {
        let mut strategies: BTreeMap<StrategyId, Box<dyn Strategy>> = BTreeMap::new();
        for id in &config.enabled {
            strategies.insert(*id, build_strategy(*id, config));
        }
        if strategies.is_empty() {
            return Err(ScanError::NoStrategies);
        }
        for strategy in strategies.values() {
            tracing::info!("loaded strategy {} - {}", strategy.id(), strategy.description());
        }
        Ok(Self { strategies })
    }

    /// 使用自定义实现组装；同一 id 只保留最后一个
    pub fn from_strategies(list: Vec<Box<dyn Strategy>>) -> ScanResult<Self> {
        let strategies: BTreeMap<StrategyId, Box<dyn Strategy>> =
            list.into_iter().map(|s| (s.id(), s)).collect();
        if strategies.is_empty() {
            return Err(ScanError::NoStrategies);
        }
        Ok(Self { strategies })
    }

    /// 全部策略，使用默认参数
    pub fn all() -> Self {
        let config = StrategyConfig {
            enabled: StrategyId::ALL.to_vec(),
            ..Default::default()
        };
        let strategies = StrategyId::ALL
            .into_iter()
            .map(|id| (id, build_strategy(id, &config)))
            .collect();
        Self { strategies }
    }

    pub fn get(&self, id: StrategyId) -> Option<&dyn Strategy> {
        self.strategies.get(&id).map(|s| s.as_ref())
    }

    pub fn ids(&self) -> Vec<StrategyId> {
        self.strategies.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn Strategy> {
        self.strategies.values().map(|s| s.as_ref())
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }
}

fn build_strategy(id: StrategyId, config: &StrategyConfig) -> Box<dyn Strategy> {
    match id {
        StrategyId::GoldenCross => Box::new(GoldenCross::new(config.golden_cross.clone())),
        StrategyId::MacdCross => Box::new(MacdCross::new(config.macd_cross.clone())),
        StrategyId::RsiOversold => Box::new(RsiOversold),
        StrategyId::BollingerRebound => Box::new(BollingerRebound),
        StrategyId::VolumeBreak => Box::new(VolumeBreak),
    }
}

/// 保留两位小数，用于信号中的指标值
pub(crate) fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

pub(crate) fn round4(x: f64) -> f64 {
    (x * 10000.0).round() / 10000.0
}

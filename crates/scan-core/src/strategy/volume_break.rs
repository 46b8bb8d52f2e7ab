use super::{round2, Strategy, StrategyId};
use crate::indicators::sma_at;
use crate::types::{Signal, Snapshot};
use crate::window::HistoryWindow;

/// 放量突破：量比 > 2 且涨幅 > 3%
#[derive(Debug, Clone, Copy, Default)]
pub struct VolumeBreak;

impl VolumeBreak {
    pub const MIN_LOOKBACK: usize = 10;
    const PERIOD: usize = 5;
    const MIN_RATIO: f64 = 2.0;
    const MIN_CHANGE: f64 = 3.0;
}

impl Strategy for VolumeBreak {
    fn id(&self) -> StrategyId {
        StrategyId::VolumeBreak
    }

    fn description(&self) -> &'static str {
        "放量突破（量比>2，涨幅>3%）"
    }

    fn min_lookback(&self) -> usize {
        Self::MIN_LOOKBACK
    }

    fn evaluate(&self, window: &HistoryWindow<'_>, snapshot: &Snapshot) -> Option<Signal> {
        if window.len() < Self::MIN_LOOKBACK {
            return None;
        }
        let volumes = window.volumes();
        let today = volumes.len() - 1;

        // 量比 = 今日成交量 / 5 日均量
        let vol_ma5 = sma_at(&volumes, Self::PERIOD, today)?;
        if vol_ma5 <= 0.0 {
            return None;
        }
        let volume_ratio = volumes[today] / vol_ma5;
        let change_percent = snapshot.change_percent;

        if !(volume_ratio > Self::MIN_RATIO && change_percent > Self::MIN_CHANGE) {
            return None;
        }

        Some(
            Signal::new(
                "放量突破",
                format!("量比{:.2}x，涨幅{:.2}%", volume_ratio, change_percent),
            )
            .with_value("volume_ratio", round2(volume_ratio))
            .with_value("change_percent", change_percent),
        )
    }
}

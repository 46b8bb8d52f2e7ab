use super::{round2, Strategy, StrategyId};
use crate::indicators::bollinger_at;
use crate::types::{Signal, Snapshot};
use crate::window::HistoryWindow;

/// 布林带下轨反弹：昨天触及或跌破下轨，今天回到下轨上方且上涨
#[derive(Debug, Clone, Copy, Default)]
pub struct BollingerRebound;

impl BollingerRebound {
    pub const MIN_LOOKBACK: usize = 25;
    const PERIOD: usize = 20;
    const WIDTH: f64 = 2.0;
    /// 昨收不高于下轨的 1.02 倍即视为触及
    const TOUCH: f64 = 1.02;
}

impl Strategy for BollingerRebound {
    fn id(&self) -> StrategyId {
        StrategyId::BollingerRebound
    }

    fn description(&self) -> &'static str {
        "布林带下轨反弹（触及下轨后回升）"
    }

    fn min_lookback(&self) -> usize {
        Self::MIN_LOOKBACK
    }

    fn evaluate(&self, window: &HistoryWindow<'_>, snapshot: &Snapshot) -> Option<Signal> {
        if window.len() < Self::MIN_LOOKBACK {
            return None;
        }
        let closes = window.closes();
        let today = closes.len() - 1;

        let band_today = bollinger_at(&closes, Self::PERIOD, Self::WIDTH, today)?;
        let band_yesterday = bollinger_at(&closes, Self::PERIOD, Self::WIDTH, today - 1)?;
        let (close_today, close_yesterday) = (closes[today], closes[today - 1]);

        let is_rebound = close_yesterday <= band_yesterday.lower * Self::TOUCH
            && close_today > band_today.lower
            && snapshot.change_percent > 0.0;
        if !is_rebound {
            return None;
        }

        // 下轨为 0 时距离无定义
        let distance = (close_today - band_today.lower) / band_today.lower * 100.0;
        if !distance.is_finite() {
            return None;
        }
        Some(
            Signal::new("布林带下轨反弹", format!("距下轨{:.2}%，超跌反弹", distance))
                .with_value("lower", round2(band_today.lower))
                .with_value("upper", round2(band_today.upper))
                .with_value("distance", round2(distance)),
        )
    }
}

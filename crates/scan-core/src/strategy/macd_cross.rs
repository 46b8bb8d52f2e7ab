use super::{round4, Strategy, StrategyId};
use crate::config::MacdCrossParams;
use crate::indicators::macd_series;
use crate::types::{Signal, Snapshot};
use crate::window::HistoryWindow;

/// MACD 金叉：DIF 上穿 DEA
#[derive(Debug, Clone, Default)]
pub struct MacdCross {
    params: MacdCrossParams,
}

impl MacdCross {
    pub const MIN_LOOKBACK: usize = 30;
    const FAST: usize = 12;
    const SLOW: usize = 26;
    const SIGNAL: usize = 9;

    pub fn new(params: MacdCrossParams) -> Self {
        Self { params }
    }
}

impl Strategy for MacdCross {
    fn id(&self) -> StrategyId {
        StrategyId::MacdCross
    }

    fn description(&self) -> &'static str {
        "MACD 金叉（DIF 上穿 DEA）"
    }

    fn min_lookback(&self) -> usize {
        Self::MIN_LOOKBACK
    }

    fn evaluate(&self, window: &HistoryWindow<'_>, snapshot: &Snapshot) -> Option<Signal> {
        if window.len() < Self::MIN_LOOKBACK {
            return None;
        }
        let closes = window.closes();
        let (dif, dea) = macd_series(&closes, Self::FAST, Self::SLOW, Self::SIGNAL);
        let today = closes.len() - 1;

        let (dif_today, dea_today) = (dif[today], dea[today]);
        let (dif_yesterday, dea_yesterday) = (dif[today - 1], dea[today - 1]);
        if !(dif_today.is_finite() && dea_today.is_finite()) {
            return None;
        }

        if !(dif_today > dea_today && dif_yesterday <= dea_yesterday) {
            return None;
        }
        if self.params.require_above_zero && dif_today <= 0.0 {
            return None;
        }
        if self.params.require_rising && snapshot.change_percent <= 0.0 {
            return None;
        }

        let position = if dif_today > 0.0 { "零轴上方" } else { "零轴下方" };
        Some(
            Signal::new(
                "MACD 金叉",
                format!("MACD 金叉 ({}, DIF={:.4})", position, dif_today),
            )
            .with_value("dif", round4(dif_today))
            .with_value("dea", round4(dea_today))
            .with_value("macd", round4((dif_today - dea_today) * 2.0))
            .with_value("price", snapshot.price),
        )
    }
}

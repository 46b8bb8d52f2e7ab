use super::{round2, Strategy, StrategyId};
use crate::indicators::rsi_at;
use crate::types::{Signal, Snapshot};
use crate::window::HistoryWindow;

/// RSI 超卖反弹：RSI 从 30 以下回升到 30 以上，且当日上涨
#[derive(Debug, Clone, Copy, Default)]
pub struct RsiOversold;

impl RsiOversold {
    pub const MIN_LOOKBACK: usize = 20;
    const PERIOD: usize = 14;
    const OVERSOLD: f64 = 30.0;
}

impl Strategy for RsiOversold {
    fn id(&self) -> StrategyId {
        StrategyId::RsiOversold
    }

    fn description(&self) -> &'static str {
        "RSI 超卖反弹（RSI 从<30 回升）"
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

        let rsi_today = rsi_at(&closes, Self::PERIOD, today)?;
        let rsi_yesterday = rsi_at(&closes, Self::PERIOD, today - 1)?;

        let is_rebound = rsi_yesterday < Self::OVERSOLD
            && rsi_today > Self::OVERSOLD
            && snapshot.change_percent > 0.0;
        if !is_rebound {
            return None;
        }

        Some(
            Signal::new(
                "RSI 超卖反弹",
                format!("RSI 从{:.1}回升至{:.1}", rsi_yesterday, rsi_today),
            )
            .with_value("rsi", round2(rsi_today))
            .with_value("rsi_prev", round2(rsi_yesterday)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::test_support::*;
    use crate::types::PriceBar;

    /// 5 根平盘，15 根每日下跌 0.5，最后一根大涨 4.0
    fn decline_then_rebound() -> Vec<PriceBar> {
        let mut closes = vec![20.0; 5];
        closes.extend((1..=15).map(|i| 20.0 - 0.5 * i as f64));
        closes.push(12.5 + 4.0);
        bars_from_closes(&closes)
    }

    fn evaluate_at(data: &[PriceBar], i: usize) -> Option<Signal> {
        let window = HistoryWindow::truncated(data, i);
        RsiOversold.evaluate(&window, &snapshot(window.last_change_percent()))
    }

    #[test]
    fn fires_on_rebound_bar() {
        let data = decline_then_rebound();
        let rebound = data.len() - 1;
        let signal = evaluate_at(&data, rebound).unwrap();
        // 13 个 -0.5 与 1 个 +4.0: RSI = 100 * 4 / (4 + 6.5)
        assert!((signal.value("rsi").unwrap() - 38.1).abs() < 1e-9);
        assert_eq!(signal.value("rsi_prev"), Some(0.0));
    }

    #[test]
    fn silent_during_decline() {
        let data = decline_then_rebound();
        for i in 0..data.len() - 1 {
            assert!(evaluate_at(&data, i).is_none(), "unexpected signal at {}", i);
        }
    }

    #[test]
    fn needs_a_rising_day() {
        let data = decline_then_rebound();
        let window = HistoryWindow::new(&data);
        assert!(RsiOversold.evaluate(&window, &snapshot(-0.1)).is_none());
    }
}

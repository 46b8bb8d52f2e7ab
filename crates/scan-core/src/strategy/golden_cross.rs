use super::{round2, Strategy, StrategyId};
use crate::config::GoldenCrossParams;
use crate::indicators::sma_at;
use crate::types::{Signal, Snapshot};
use crate::window::HistoryWindow;

/// 均线金叉：5 日均线上穿 20 日均线
#[derive(Debug, Clone, Default)]
pub struct GoldenCross {
    params: GoldenCrossParams,
}

impl GoldenCross {
    pub const MIN_LOOKBACK: usize = 30;
    const SHORT: usize = 5;
    const LONG: usize = 20;
    const TREND: usize = 60;

    pub fn new(params: GoldenCrossParams) -> Self {
        Self { params }
    }
}

impl Strategy for GoldenCross {
    fn id(&self) -> StrategyId {
        StrategyId::GoldenCross
    }

    fn description(&self) -> &'static str {
        "均线金叉（5 日上穿 20 日）"
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

        let ma5_today = sma_at(&closes, Self::SHORT, today)?;
        let ma20_today = sma_at(&closes, Self::LONG, today)?;
        let ma5_yesterday = sma_at(&closes, Self::SHORT, today - 1)?;
        let ma20_yesterday = sma_at(&closes, Self::LONG, today - 1)?;

        // 今天 MA5 > MA20 且昨天 MA5 <= MA20
        if !(ma5_today > ma20_today && ma5_yesterday <= ma20_yesterday) {
            return None;
        }

        if self.params.require_above_ma60 {
            let ma60 = sma_at(&closes, Self::TREND, today)?;
            if closes[today] < ma60 {
                return None;
            }
        }
        if self.params.require_rising && snapshot.change_percent <= 0.0 {
            return None;
        }

        Some(
            Signal::new(
                "均线金叉",
                format!("5 日均线 ({:.2}) 上穿 20 日均线 ({:.2})", ma5_today, ma20_today),
            )
            .with_value("ma5", round2(ma5_today))
            .with_value("ma20", round2(ma20_today))
            .with_value("price", snapshot.price),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::test_support::*;
    use crate::types::PriceBar;

    /// 24 根平盘预热 + [10,10,10,10,10,10,11,...,22]
    fn cross_history() -> Vec<PriceBar> {
        let mut closes = vec![10.0; 24];
        closes.extend([10.0; 6]);
        closes.extend((11..=22).map(|c| c as f64));
        bars_from_closes(&closes)
    }

    fn signal_indices(strategy: &GoldenCross, data: &[PriceBar]) -> Vec<usize> {
        (0..data.len())
            .filter(|&i| {
                let window = HistoryWindow::truncated(data, i);
                let snap = snapshot(window.last_change_percent());
                strategy.evaluate(&window, &snap).is_some()
            })
            .collect()
    }

    #[test]
    fn fires_once_at_the_flip() {
        let data = cross_history();
        assert_eq!(signal_indices(&GoldenCross::default(), &data), vec![30]);
    }

    #[test]
    fn signal_carries_averages() {
        let data = cross_history();
        let window = HistoryWindow::truncated(&data, 30);
        let signal = GoldenCross::default().evaluate(&window, &snapshot(10.0)).unwrap();
        assert_eq!(signal.signal_type, "均线金叉");
        assert_eq!(signal.value("ma5"), Some(10.2));
        assert_eq!(signal.value("ma20"), Some(10.05));
    }

    #[test]
    fn equal_averages_never_fire() {
        let data = bars_from_closes(&[10.0; 40]);
        assert!(signal_indices(&GoldenCross::default(), &data).is_empty());
    }

    #[test]
    fn ma60_filter_needs_sixty_bars() {
        let strategy = GoldenCross::new(GoldenCrossParams {
            require_above_ma60: true,
            require_rising: false,
        });
        assert!(signal_indices(&strategy, &cross_history()).is_empty());
    }

    #[test]
    fn ma60_filter_passes_on_long_history() {
        let strategy = GoldenCross::new(GoldenCrossParams {
            require_above_ma60: true,
            require_rising: false,
        });
        let mut closes = vec![10.0; 60];
        closes.extend([11.0, 12.0]);
        let data = bars_from_closes(&closes);
        assert_eq!(signal_indices(&strategy, &data), vec![60]);
    }

    #[test]
    fn rising_filter_checks_snapshot() {
        let strategy = GoldenCross::new(GoldenCrossParams {
            require_above_ma60: false,
            require_rising: true,
        });
        let data = cross_history();
        let window = HistoryWindow::truncated(&data, 30);
        assert!(strategy.evaluate(&window, &snapshot(0.0)).is_none());
        assert!(strategy.evaluate(&window, &snapshot(1.5)).is_some());
    }
}

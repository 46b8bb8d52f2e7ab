//! 技术指标计算。
//!
//! 所有函数都只读取 `values[..=idx]`，窗口右对齐在 idx 上；
//! 数据不足或分母为 0 时返回 `None`，由策略视为无信号。

/// 简单移动平均
pub fn sma_at(values: &[f64], period: usize, idx: usize) -> Option<f64> {
    if period == 0 || idx >= values.len() || idx + 1 < period {
        return None;
    }
    let window = &values[idx + 1 - period..=idx];
    let mean = window.iter().sum::<f64>() / period as f64;
    mean.is_finite().then_some(mean)
}

/// 滚动样本标准差 (ddof = 1)
pub fn std_at(values: &[f64], period: usize, idx: usize) -> Option<f64> {
    if period < 2 {
        return None;
    }
    let mean = sma_at(values, period, idx)?;
    let window = &values[idx + 1 - period..=idx];
    let var = window.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (period - 1) as f64;
    let std = var.sqrt();
    std.is_finite().then_some(std)
}

/// 指数移动平均，增量计算。
///
/// 第一根直接取观测值，之后 value = α·x + (1−α)·prev，α = 2/(span+1)，
/// 不做偏差修正。
#[derive(Debug, Clone)]
pub struct Ema {
    alpha: f64,
    value: f64,
    count: usize,
}

impl Ema {
    pub fn new(span: usize) -> Self {
        Self {
            alpha: 2.0 / (span as f64 + 1.0),
            value: 0.0,
            count: 0,
        }
    }

    pub fn update(&mut self, x: f64) -> f64 {
        if self.count == 0 {
            self.value = x;
        } else {
            self.value = self.alpha * x + (1.0 - self.alpha) * self.value;
        }
        self.count += 1;
        self.value
    }
}

/// 整条序列的 EMA
pub fn ema_series(values: &[f64], span: usize) -> Vec<f64> {
    let mut ema = Ema::new(span);
    values.iter().map(|&x| ema.update(x)).collect()
}

/// MACD 的 DIF 与 DEA 序列
pub fn macd_series(values: &[f64], fast: usize, slow: usize, signal: usize) -> (Vec<f64>, Vec<f64>) {
    let fast = ema_series(values, fast);
    let slow = ema_series(values, slow);
    let dif: Vec<f64> = fast.iter().zip(slow.iter()).map(|(f, s)| f - s).collect();
    let dea = ema_series(&dif, signal);
    (dif, dea)
}

/// RSI，基于最近 `period` 个收盘价差的简单平均涨幅/跌幅。
///
/// idx 之前至少要有 `period` 个差值；平均跌幅为 0 时 RS 无定义，返回 `None`。
pub fn rsi_at(values: &[f64], period: usize, idx: usize) -> Option<f64> {
    if period == 0 || idx >= values.len() || idx < period {
        return None;
    }
    let (mut gain, mut loss) = (0.0, 0.0);
    for j in idx + 1 - period..=idx {
        let delta = values[j] - values[j - 1];
        if delta > 0.0 {
            gain += delta;
        } else if delta < 0.0 {
            loss -= delta;
        }
    }
    let avg_gain = gain / period as f64;
    let avg_loss = loss / period as f64;
    if avg_loss == 0.0 {
        return None;
    }
    let rs = avg_gain / avg_loss;
    let rsi = 100.0 - 100.0 / (1.0 + rs);
    rsi.is_finite().then_some(rsi)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BollingerBand {
    pub upper:  f64,
    pub middle: f64,
    pub lower:  f64,
}

/// 布林带：均线 ± k 倍样本标准差
pub fn bollinger_at(values: &[f64], period: usize, k: f64, idx: usize) -> Option<BollingerBand> {
    let middle = sma_at(values, period, idx)?;
    let std = std_at(values, period, idx)?;
    Some(BollingerBand {
        upper: middle + k * std,
        middle,
        lower: middle - k * std,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn sma_needs_full_period() {
        let v = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(sma_at(&v, 3, 1), None);
        assert_abs_diff_eq!(sma_at(&v, 3, 2).unwrap(), 2.0);
        assert_abs_diff_eq!(sma_at(&v, 3, 3).unwrap(), 3.0);
        assert_eq!(sma_at(&v, 3, 4), None);
    }

    #[test]
    fn std_is_sample_std() {
        // pd.Series([2,4,4,4,5,5,7,9]).std() == 2.138089935299395
        let v = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert_abs_diff_eq!(std_at(&v, 8, 7).unwrap(), 2.138089935299395, epsilon = 1e-12);
    }

    #[test]
    fn ema_matches_pandas_adjust_false() {
        // pd.Series([10,11,12,13]).ewm(span=3, adjust=False).mean()
        let out = ema_series(&[10.0, 11.0, 12.0, 13.0], 3);
        assert_abs_diff_eq!(out[0], 10.0);
        assert_abs_diff_eq!(out[1], 10.5);
        assert_abs_diff_eq!(out[2], 11.25);
        assert_abs_diff_eq!(out[3], 12.125);
    }

    #[test]
    fn macd_flat_series_is_zero() {
        let (dif, dea) = macd_series(&[5.0; 40], 12, 26, 9);
        assert!(dif.iter().all(|d| d.abs() < 1e-12));
        assert!(dea.iter().all(|d| d.abs() < 1e-12));
    }

    #[test]
    fn rsi_mixed_moves() {
        // deltas: +1, -1, +2, -2 -> avg gain 0.75, avg loss 0.75 -> 50
        let v = [10.0, 11.0, 10.0, 12.0, 10.0];
        assert_abs_diff_eq!(rsi_at(&v, 4, 4).unwrap(), 50.0, epsilon = 1e-12);
        assert_eq!(rsi_at(&v, 4, 3), None);
    }

    #[test]
    fn rsi_without_losses_is_undefined() {
        let v = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(rsi_at(&v, 3, 3), None);
    }

    #[test]
    fn bollinger_is_symmetric() {
        let v: Vec<f64> = (0..20).map(|i| 10.0 + (i % 3) as f64).collect();
        let band = bollinger_at(&v, 20, 2.0, 19).unwrap();
        assert_abs_diff_eq!(band.upper - band.middle, band.middle - band.lower, epsilon = 1e-12);
        assert!(bollinger_at(&v, 20, 2.0, 18).is_none());
    }
}

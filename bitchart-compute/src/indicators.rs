//! Technical indicators over close prices.
//!
//! All functions produce a dense sequence aligned with the input; entries
//! that are undefined during the warm-up window are NaN. Multi-line
//! indicators interleave their lines per input index (MACD:
//! `(macd, signal, hist)`; Bollinger: `(upper, middle, lower)`), so their
//! output length is `3 * input.len()`.

/// Which indicator to compute, with its parameters.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum IndicatorKind {
    Sma { period: usize },
    Ema { period: usize },
    Rsi { period: usize },
    Macd { fast: usize, slow: usize, signal: usize },
    Bollinger { period: usize, k: f64 },
}

impl IndicatorKind {
    /// Output floats per input bar (1 for single-line, 3 for interleaved).
    pub fn lanes(&self) -> usize {
        match self {
            Self::Sma { .. } | Self::Ema { .. } | Self::Rsi { .. } => 1,
            Self::Macd { .. } | Self::Bollinger { .. } => 3,
        }
    }

    /// Cheap parameter validation; `Err` carries the offending description.
    pub fn validate(&self) -> Result<(), String> {
        match *self {
            Self::Sma { period } | Self::Ema { period } | Self::Rsi { period } => {
                if period == 0 {
                    return Err(format!("period must be positive, got {period}"));
                }
            }
            Self::Macd { fast, slow, signal } => {
                if fast == 0 || slow == 0 || signal == 0 {
                    return Err(format!("macd periods must be positive, got {fast}/{slow}/{signal}"));
                }
                if fast >= slow {
                    return Err(format!("macd fast period {fast} must be below slow {slow}"));
                }
            }
            Self::Bollinger { period, k } => {
                if period == 0 {
                    return Err(format!("period must be positive, got {period}"));
                }
                if !k.is_finite() || k < 0.0 {
                    return Err(format!("stddev multiplier must be finite and non-negative, got {k}"));
                }
            }
        }
        Ok(())
    }

    pub fn compute(&self, closes: &[f64]) -> Vec<f64> {
        match *self {
            Self::Sma { period } => sma(closes, period),
            Self::Ema { period } => ema(closes, period),
            Self::Rsi { period } => rsi(closes, period),
            Self::Macd { fast, slow, signal } => macd(closes, fast, slow, signal),
            Self::Bollinger { period, k } => bollinger(closes, period, k),
        }
    }
}

/// Windowed mean; entries `[0..period-1)` are NaN.
pub fn sma(data: &[f64], period: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; data.len()];
    if period == 0 || data.len() < period {
        return out;
    }
    let mut sum: f64 = data[..period].iter().sum();
    out[period - 1] = sum / period as f64;
    for i in period..data.len() {
        sum += data[i] - data[i - period];
        out[i] = sum / period as f64;
    }
    out
}

/// Exponential moving average seeded with the simple mean of the first
/// `period` values; `alpha = 2 / (period + 1)`.
pub fn ema(data: &[f64], period: usize) -> Vec<f64> {
    ema_from(data, period, 0)
}

// EMA over `data[start..]`, leaving `[0..start)` NaN. The seed lands at
// `start + period - 1`. Used directly for the MACD signal line, whose
// input carries a NaN warm-up prefix.
fn ema_from(data: &[f64], period: usize, start: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; data.len()];
    if period == 0 || start + period > data.len() {
        return out;
    }
    let alpha = 2.0 / (period as f64 + 1.0);
    let seed_at = start + period - 1;
    let seed: f64 = data[start..=seed_at].iter().sum::<f64>() / period as f64;
    out[seed_at] = seed;
    let mut prev = seed;
    for i in seed_at + 1..data.len() {
        prev = alpha * data[i] + (1.0 - alpha) * prev;
        out[i] = prev;
    }
    out
}

/// Relative strength index with Wilder smoothing. The first `period`
/// entries are NaN; an all-gain window reads 100.
pub fn rsi(data: &[f64], period: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; data.len()];
    if period == 0 || data.len() <= period {
        return out;
    }
    let mut avg_gain = 0.0;
    let mut avg_loss = 0.0;
    for i in 1..=period {
        let change = data[i] - data[i - 1];
        if change >= 0.0 {
            avg_gain += change;
        } else {
            avg_loss -= change;
        }
    }
    avg_gain /= period as f64;
    avg_loss /= period as f64;
    out[period] = rsi_value(avg_gain, avg_loss);
    for i in period + 1..data.len() {
        let change = data[i] - data[i - 1];
        let (gain, loss) = if change >= 0.0 {
            (change, 0.0)
        } else {
            (0.0, -change)
        };
        avg_gain = (avg_gain * (period as f64 - 1.0) + gain) / period as f64;
        avg_loss = (avg_loss * (period as f64 - 1.0) + loss) / period as f64;
        out[i] = rsi_value(avg_gain, avg_loss);
    }
    out
}

fn rsi_value(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        100.0
    } else {
        100.0 - 100.0 / (1.0 + avg_gain / avg_loss)
    }
}

/// MACD line, signal line and histogram, interleaved
/// `(macd, signal, hist)` per input index.
pub fn macd(data: &[f64], fast: usize, slow: usize, signal: usize) -> Vec<f64> {
    let fast_ema = ema(data, fast);
    let slow_ema = ema(data, slow);
    let macd_line: Vec<f64> = fast_ema
        .iter()
        .zip(&slow_ema)
        .map(|(f, s)| f - s)
        .collect();
    // The MACD line is NaN until the slow EMA seeds; the signal EMA starts
    // at its first defined value.
    let first_valid = macd_line.iter().position(|v| !v.is_nan());
    let signal_line = match first_valid {
        Some(start) => ema_from(&macd_line, signal, start),
        None => vec![f64::NAN; data.len()],
    };
    let mut out = vec![f64::NAN; data.len() * 3];
    for i in 0..data.len() {
        out[i * 3] = macd_line[i];
        out[i * 3 + 1] = signal_line[i];
        out[i * 3 + 2] = macd_line[i] - signal_line[i];
    }
    out
}

/// Bollinger bands, interleaved `(upper, middle, lower)` per input index.
/// The stddev is the population deviation of the window around its mean.
pub fn bollinger(data: &[f64], period: usize, k: f64) -> Vec<f64> {
    let middle = sma(data, period);
    let mut out = vec![f64::NAN; data.len() * 3];
    for i in 0..data.len() {
        let mean = middle[i];
        if mean.is_nan() {
            continue;
        }
        let window = &data[i + 1 - period..=i];
        let variance =
            window.iter().map(|x| (x - mean) * (x - mean)).sum::<f64>() / period as f64;
        let sigma = variance.sqrt();
        out[i * 3] = mean + k * sigma;
        out[i * 3 + 1] = mean;
        out[i * 3 + 2] = mean - k * sigma;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_seq(actual: &[f64], expected: &[f64]) {
        assert_eq!(actual.len(), expected.len());
        for (i, (a, e)) in actual.iter().zip(expected).enumerate() {
            if e.is_nan() {
                assert!(a.is_nan(), "index {i}: expected NaN, got {a}");
            } else {
                assert!((a - e).abs() < 1e-9, "index {i}: expected {e}, got {a}");
            }
        }
    }

    #[test]
    fn sma_3_on_ramp() {
        let out = sma(&[1.0, 2.0, 3.0, 4.0, 5.0], 3);
        assert_seq(&out, &[f64::NAN, f64::NAN, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn ema_3_on_ramp() {
        // alpha = 0.5: seed at index 2 is SMA(3) = 2, then 3, then 4
        let out = ema(&[1.0, 2.0, 3.0, 4.0, 5.0], 3);
        assert_seq(&out, &[f64::NAN, f64::NAN, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn sma_shorter_than_period_is_all_nan() {
        let out = sma(&[1.0, 2.0], 3);
        assert!(out.iter().all(|v| v.is_nan()));
    }

    #[test]
    fn rsi_monotonic_rise_is_100() {
        let data: Vec<f64> = (0..10).map(|i| i as f64).collect();
        let out = rsi(&data, 3);
        for v in &out[..3] {
            assert!(v.is_nan());
        }
        for v in &out[3..] {
            assert!((v - 100.0).abs() < 1e-9);
        }
    }

    #[test]
    fn rsi_alternating_is_bounded() {
        let data = [10.0, 11.0, 10.0, 11.0, 10.0, 11.0, 10.0, 11.0];
        let out = rsi(&data, 2);
        for v in &out[2..] {
            assert!(*v > 0.0 && *v < 100.0, "rsi out of band: {v}");
        }
    }

    #[test]
    fn rsi_wilder_smoothing_reference() {
        // period 2 over [1, 2, 3, 2]: first avg gain = 1, loss = 0 -> 100 at
        // index 2; then gain avg = (1*1 + 0)/2 = 0.5, loss avg = 0.5 -> 50.
        let out = rsi(&[1.0, 2.0, 3.0, 2.0], 2);
        assert_seq(&out, &[f64::NAN, f64::NAN, 100.0, 50.0]);
    }

    #[test]
    fn macd_interleaves_three_lanes() {
        let data: Vec<f64> = (0..40).map(|i| (i as f64 * 0.3).sin() + 10.0).collect();
        let out = macd(&data, 3, 6, 4);
        assert_eq!(out.len(), data.len() * 3);
        // before the slow EMA seeds everything is NaN
        for i in 0..5 {
            assert!(out[i * 3].is_nan());
        }
        // once the signal seeds, hist = macd - signal
        let first_signal = (5 + 3) * 3 + 1;
        assert!(!out[first_signal].is_nan());
        for i in 9..40 {
            let (m, s, h) = (out[i * 3], out[i * 3 + 1], out[i * 3 + 2]);
            assert!((h - (m - s)).abs() < 1e-9);
        }
    }

    #[test]
    fn bollinger_bands_bracket_the_mean() {
        let data = [1.0, 2.0, 3.0, 4.0, 5.0, 4.0, 3.0];
        let out = bollinger(&data, 3, 2.0);
        assert_eq!(out.len(), data.len() * 3);
        // warm-up: first period-1 entries NaN
        assert!(out[0].is_nan() && out[3].is_nan());
        for i in 2..data.len() {
            let (upper, middle, lower) = (out[i * 3], out[i * 3 + 1], out[i * 3 + 2]);
            assert!(upper >= middle && middle >= lower);
        }
        // constant window has zero deviation
        let flat = bollinger(&[2.0, 2.0, 2.0], 3, 2.0);
        assert!((flat[6] - 2.0).abs() < 1e-12 && (flat[8] - 2.0).abs() < 1e-12);
    }

    #[test]
    fn kind_validation() {
        assert!(IndicatorKind::Sma { period: 0 }.validate().is_err());
        assert!(IndicatorKind::Macd { fast: 26, slow: 12, signal: 9 }.validate().is_err());
        assert!(IndicatorKind::Bollinger { period: 20, k: -1.0 }.validate().is_err());
        assert!(IndicatorKind::Rsi { period: 14 }.validate().is_ok());
    }
}

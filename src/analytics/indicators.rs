//! Technical indicators over closing-price series.
//!
//! Every function returns one entry per input point. `None` marks positions
//! where the window has not filled yet.

use serde::{Deserialize, Serialize};

/// Simple moving average.
pub fn moving_average(prices: &[f64], period: usize) -> Vec<Option<f64>> {
    if period == 0 {
        return vec![None; prices.len()];
    }
    (0..prices.len())
        .map(|i| {
            if i + 1 < period {
                None
            } else {
                Some(mean(&prices[i + 1 - period..=i]))
            }
        })
        .collect()
}

/// Exponential moving average, seeded with the running mean of the first
/// `period` prices.
pub fn exponential_moving_average(prices: &[f64], period: usize) -> Vec<f64> {
    let period = period.max(1);
    let multiplier = 2.0 / (period as f64 + 1.0);

    let mut result = Vec::with_capacity(prices.len());
    let mut running_sum = 0.0;
    for (i, &price) in prices.iter().enumerate() {
        if i < period {
            running_sum += price;
            result.push(running_sum / (i + 1) as f64);
        } else {
            let prev = result[i - 1];
            result.push((price - prev) * multiplier + prev);
        }
    }
    result
}

/// Relative strength index over the last `period` price changes.
pub fn rsi(prices: &[f64], period: usize) -> Vec<Option<f64>> {
    if period == 0 {
        return vec![None; prices.len()];
    }
    (0..prices.len())
        .map(|i| {
            if i < period {
                return None;
            }
            let (gains, losses) = (i + 1 - period..=i).fold((0.0, 0.0), |(g, l), j| {
                let change = prices[j] - prices[j - 1];
                if change > 0.0 {
                    (g + change, l)
                } else {
                    (g, l - change)
                }
            });
            if losses == 0.0 {
                Some(100.0)
            } else {
                Some(100.0 - 100.0 / (1.0 + gains / losses))
            }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MacdSeries {
    pub macd: Vec<f64>,
    pub signal: Vec<Option<f64>>,
    pub histogram: Vec<f64>,
}

pub fn macd(prices: &[f64], fast: usize, slow: usize, signal: usize) -> MacdSeries {
    let signal = signal.max(1);
    let ema_fast = exponential_moving_average(prices, fast);
    let ema_slow = exponential_moving_average(prices, slow);
    let line: Vec<f64> = ema_fast.iter().zip(&ema_slow).map(|(f, s)| f - s).collect();

    let multiplier = 2.0 / (signal as f64 + 1.0);
    let first = (slow + signal).saturating_sub(1).max(signal - 1);

    let mut signal_line: Vec<Option<f64>> = Vec::with_capacity(line.len());
    for i in 0..line.len() {
        let value = if i < first {
            None
        } else {
            match signal_line.last().copied().flatten() {
                Some(prev) => Some((line[i] - prev) * multiplier + prev),
                None => Some(mean(&line[i + 1 - signal..=i])),
            }
        };
        signal_line.push(value);
    }

    let histogram = line
        .iter()
        .zip(&signal_line)
        .map(|(m, s)| s.map_or(0.0, |s| m - s))
        .collect();

    MacdSeries {
        macd: line,
        signal: signal_line,
        histogram,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BollingerBands {
    pub upper: Vec<Option<f64>>,
    pub middle: Vec<Option<f64>>,
    pub lower: Vec<Option<f64>>,
}

/// Bollinger bands using the population standard deviation of each window.
pub fn bollinger(prices: &[f64], period: usize, k: f64) -> BollingerBands {
    let middle = moving_average(prices, period);
    let mut upper = Vec::with_capacity(prices.len());
    let mut lower = Vec::with_capacity(prices.len());

    for (i, mid) in middle.iter().enumerate() {
        match mid {
            Some(mid) => {
                let std = population_std(&prices[i + 1 - period..=i], *mid);
                upper.push(Some(mid + k * std));
                lower.push(Some(mid - k * std));
            }
            None => {
                upper.push(None);
                lower.push(None);
            }
        }
    }

    BollingerBands {
        upper,
        middle,
        lower,
    }
}

pub(crate) fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

pub(crate) fn population_std(values: &[f64], mean: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

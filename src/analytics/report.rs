//! Indicator selection and period summaries over a price series.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::analytics::indicators::{
    bollinger, exponential_moving_average, macd, mean, moving_average, population_std, rsi,
    BollingerBands, MacdSeries,
};

pub const DEFAULT_INDICATORS: &str = "ma5,ma10,ma20,macd,rsi,boll";

/// Look-back windows reported by [`AnalyticsSummary`].
pub const SUMMARY_PERIODS: [usize; 5] = [7, 30, 90, 180, 365];

const TRADING_DAYS: f64 = 252.0;

/// One dated closing price (NAV for funds).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub date: String,
    pub close: f64,
}

impl PricePoint {
    pub fn new(date: impl Into<String>, close: f64) -> Self {
        Self {
            date: date.into(),
            close,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndicatorKind {
    Ma5,
    Ma10,
    Ma20,
    Ema12,
    Ema26,
    Rsi,
    Macd,
    Boll,
}

impl IndicatorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndicatorKind::Ma5 => "ma5",
            IndicatorKind::Ma10 => "ma10",
            IndicatorKind::Ma20 => "ma20",
            IndicatorKind::Ema12 => "ema12",
            IndicatorKind::Ema26 => "ema26",
            IndicatorKind::Rsi => "rsi",
            IndicatorKind::Macd => "macd",
            IndicatorKind::Boll => "boll",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "ma5" => Some(IndicatorKind::Ma5),
            "ma10" => Some(IndicatorKind::Ma10),
            "ma20" => Some(IndicatorKind::Ma20),
            "ema12" => Some(IndicatorKind::Ema12),
            "ema26" => Some(IndicatorKind::Ema26),
            "rsi" => Some(IndicatorKind::Rsi),
            "macd" => Some(IndicatorKind::Macd),
            "boll" => Some(IndicatorKind::Boll),
            _ => None,
        }
    }

    /// Parse a comma separated list. Unknown names are skipped, duplicates
    /// collapse.
    pub fn parse_list(list: &str) -> Vec<Self> {
        let mut kinds: Vec<Self> = list.split(',').filter_map(Self::parse).collect();
        kinds.sort();
        kinds.dedup();
        kinds
    }
}

impl fmt::Display for IndicatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output shape of one indicator. Written out only; the untagged arrays
/// cannot be told apart on the way back in.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum IndicatorSeries {
    Optional(Vec<Option<f64>>),
    Dense(Vec<f64>),
    Macd(MacdSeries),
    Bands(BollingerBands),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndicatorReport {
    pub dates: Vec<String>,
    pub prices: Vec<f64>,
    pub indicators: BTreeMap<String, IndicatorSeries>,
}

impl IndicatorReport {
    pub fn compute(points: &[PricePoint], kinds: &[IndicatorKind]) -> Self {
        let prices: Vec<f64> = points.iter().map(|p| p.close).collect();

        let indicators = kinds
            .iter()
            .map(|kind| {
                let series = match kind {
                    IndicatorKind::Ma5 => IndicatorSeries::Optional(moving_average(&prices, 5)),
                    IndicatorKind::Ma10 => IndicatorSeries::Optional(moving_average(&prices, 10)),
                    IndicatorKind::Ma20 => IndicatorSeries::Optional(moving_average(&prices, 20)),
                    IndicatorKind::Ema12 => {
                        IndicatorSeries::Dense(exponential_moving_average(&prices, 12))
                    }
                    IndicatorKind::Ema26 => {
                        IndicatorSeries::Dense(exponential_moving_average(&prices, 26))
                    }
                    IndicatorKind::Rsi => IndicatorSeries::Optional(rsi(&prices, 14)),
                    IndicatorKind::Macd => IndicatorSeries::Macd(macd(&prices, 12, 26, 9)),
                    IndicatorKind::Boll => IndicatorSeries::Bands(bollinger(&prices, 20, 2.0)),
                };
                (kind.to_string(), series)
            })
            .collect();

        Self {
            dates: points.iter().map(|p| p.date.clone()).collect(),
            prices,
            indicators,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PeriodSummary {
    pub change_percent: f64,
    /// Annualised standard deviation of daily percent changes
    pub volatility: f64,
    pub high: f64,
    pub low: f64,
    pub avg: f64,
}

impl PeriodSummary {
    /// Summarise `points` (oldest first) over a window of `days`.
    pub fn from_points(points: &[PricePoint], days: usize) -> Self {
        if points.is_empty() {
            return Self::default();
        }
        let closes: Vec<f64> = points.iter().map(|p| p.close).collect();

        Self {
            change_percent: change_percent(&closes, days),
            volatility: volatility(&closes),
            high: closes.iter().copied().fold(f64::MIN, f64::max),
            low: closes.iter().copied().fold(f64::MAX, f64::min),
            avg: mean(&closes),
        }
    }
}

fn change_percent(closes: &[f64], days: usize) -> f64 {
    if closes.len() < 2 {
        return 0.0;
    }
    let base = if days > 0 && closes.len() >= days {
        closes[closes.len() - days]
    } else {
        closes[0]
    };
    let last = closes[closes.len() - 1];
    if base == 0.0 {
        return 0.0;
    }
    (last - base) / base * 100.0
}

fn volatility(closes: &[f64]) -> f64 {
    if closes.len() < 2 {
        return 0.0;
    }
    let daily: Vec<f64> = closes
        .windows(2)
        .filter(|w| w[0] > 0.0)
        .map(|w| (w[1] - w[0]) / w[0] * 100.0)
        .collect();
    if daily.is_empty() {
        return 0.0;
    }
    population_std(&daily, mean(&daily)) * TRADING_DAYS.sqrt()
}

/// Summaries for each of [`SUMMARY_PERIODS`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsSummary {
    pub code: String,
    pub current_price: f64,
    pub current_date: Option<String>,
    pub data_points: usize,
    pub periods: BTreeMap<String, PeriodSummary>,
}

impl AnalyticsSummary {
    /// `points` must be oldest first. Each window takes the most recent
    /// `days` points.
    pub fn from_points(code: &str, points: &[PricePoint]) -> Self {
        let periods = SUMMARY_PERIODS
            .iter()
            .map(|&days| {
                let window = &points[points.len().saturating_sub(days)..];
                (format!("{}d", days), PeriodSummary::from_points(window, days))
            })
            .collect();

        let last = points.last();
        Self {
            code: code.to_string(),
            current_price: last.map_or(0.0, |p| p.close),
            current_date: last.map(|p| p.date.clone()),
            data_points: points.len(),
            periods,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(closes: &[f64]) -> Vec<PricePoint> {
        closes
            .iter()
            .enumerate()
            .map(|(i, c)| PricePoint::new(format!("2024-01-{:02}", i + 1), *c))
            .collect()
    }

    #[test]
    fn test_parse_list() {
        let kinds = IndicatorKind::parse_list("MA5, rsi,bogus,ma5,boll");
        assert_eq!(
            kinds,
            vec![IndicatorKind::Ma5, IndicatorKind::Rsi, IndicatorKind::Boll]
        );
        assert!(IndicatorKind::parse_list("").is_empty());
    }

    #[test]
    fn test_report_has_requested_series() {
        let points = series(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let report = IndicatorReport::compute(&points, &IndicatorKind::parse_list(DEFAULT_INDICATORS));

        assert_eq!(report.dates.len(), 6);
        assert_eq!(report.prices[5], 6.0);
        assert_eq!(report.indicators.len(), 6);
        match &report.indicators["ma5"] {
            IndicatorSeries::Optional(values) => assert_eq!(values[4], Some(3.0)),
            other => panic!("unexpected series {:?}", other),
        }
        assert!(!report.indicators.contains_key("ema12"));
    }

    #[test]
    fn test_report_json_shape() {
        let points = series(&[1.0, 2.0, 3.0]);
        let report = IndicatorReport::compute(&points, &[IndicatorKind::Ma5, IndicatorKind::Ema12]);
        let json = serde_json::to_value(&report).unwrap();

        assert_eq!(json["indicators"]["ma5"], serde_json::json!([null, null, null]));
        assert_eq!(json["indicators"]["ema12"], serde_json::json!([1.0, 1.5, 2.0]));
        assert_eq!(json["dates"][0], "2024-01-01");
    }

    #[test]
    fn test_period_summary() {
        let points = series(&[100.0, 110.0, 99.0, 120.0]);
        let summary = PeriodSummary::from_points(&points, 3);

        // 3 days back from the last point is 110
        assert!((summary.change_percent - (120.0 - 110.0) / 110.0 * 100.0).abs() < 1e-9);
        assert_eq!(summary.high, 120.0);
        assert_eq!(summary.low, 99.0);
        assert!((summary.avg - 107.25).abs() < 1e-9);
        assert!(summary.volatility > 0.0);

        let short = PeriodSummary::from_points(&points, 30);
        assert!((short.change_percent - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_and_single_point() {
        assert_eq!(PeriodSummary::from_points(&[], 7), PeriodSummary::default());

        let one = PeriodSummary::from_points(&series(&[5.0]), 7);
        assert_eq!(one.change_percent, 0.0);
        assert_eq!(one.volatility, 0.0);
        assert_eq!(one.high, 5.0);

        let summary = AnalyticsSummary::from_points("000001", &[]);
        assert_eq!(summary.current_price, 0.0);
        assert_eq!(summary.periods.len(), SUMMARY_PERIODS.len());
    }
}

//! Technical analysis over finance price history.

pub mod indicators;
pub mod report;

pub use indicators::{
    bollinger, exponential_moving_average, macd, moving_average, rsi, BollingerBands, MacdSeries,
};
pub use report::{
    AnalyticsSummary, IndicatorKind, IndicatorReport, IndicatorSeries, PeriodSummary, PricePoint,
    DEFAULT_INDICATORS,
};

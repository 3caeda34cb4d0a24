//! Metric engine.
//!
//! Derives `Return`, `DeltaRate` and `Volatility` on the unified table, cleans
//! it, and fits the return regression.

use crate::error::{ModelError, Result};
use crate::linalg::pearson;
use crate::regression::{RegressionSummary, fit_return_regression};
use polars::prelude::*;
use ratelens_data::schema::{ADJ_CLOSE, DATE, DELTA_RATE, RETURN, TICKER, VALUE, VOLATILITY};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Default rolling volatility window, in rows.
pub const DEFAULT_VOLATILITY_WINDOW: usize = 20;

/// Default significance level for regression comments.
pub const DEFAULT_SIGNIFICANCE_LEVEL: f64 = 0.05;

/// Parameters of the metric engine.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MetricOptions {
    /// Rolling volatility window (rows per ticker, at least 2)
    pub volatility_window: usize,
    /// p-value threshold below which a coefficient is commented as significant
    pub significance_level: f64,
}

impl Default for MetricOptions {
    fn default() -> Self {
        Self {
            volatility_window: DEFAULT_VOLATILITY_WINDOW,
            significance_level: DEFAULT_SIGNIFICANCE_LEVEL,
        }
    }
}

impl MetricOptions {
    /// Check parameter ranges.
    pub fn validate(&self) -> Result<()> {
        if self.volatility_window < 2 {
            return Err(ModelError::InvalidParameter(format!(
                "volatility window must be at least 2, got {}",
                self.volatility_window
            )));
        }
        if !(self.significance_level > 0.0 && self.significance_level < 1.0) {
            return Err(ModelError::InvalidParameter(format!(
                "significance level must lie in (0, 1), got {}",
                self.significance_level
            )));
        }
        Ok(())
    }
}

/// Output of [`compute`].
#[derive(Debug, Clone)]
pub struct MetricsOutput {
    /// Unified table with derived columns, sorted by ticker then date
    pub unified: DataFrame,
    /// Pearson correlation of `Return` and `DeltaRate`, when defined
    pub correlation: Option<f64>,
    /// Fitted return regression
    pub regression: RegressionSummary,
}

/// Derive the metrics, log the return/rate correlation and fit the regression.
///
/// A failing fit aborts with [`ModelError::Fit`].
pub fn compute(unified: &DataFrame, options: &MetricOptions) -> Result<MetricsOutput> {
    let unified = derive_metrics(unified, options)?;

    let correlation = return_rate_correlation(&unified)?;
    match correlation {
        Some(r) => info!(correlation = %format!("{r:.4}"), "Correlation between Return and DeltaRate"),
        None => info!("Correlation between Return and DeltaRate is undefined"),
    }

    let regression = fit_return_regression(&unified, options.significance_level)?;

    Ok(MetricsOutput {
        unified,
        correlation,
        regression,
    })
}

/// Add `Return`, `DeltaRate` and `Volatility` and apply the cleaning rules.
///
/// Rows are sorted by `(Ticker, Date)`. `Return` is the percentage change of
/// the adjusted close within a ticker, `DeltaRate` the difference of the rate
/// from the previous row of the whole table, and `Volatility` the sample
/// standard deviation of `Return` over a full trailing window within a ticker.
/// Exact duplicate rows are then dropped (first kept), missing `Return` and
/// `DeltaRate` become 0, and missing `Volatility` is forward filled across the
/// whole sorted table. Leading volatilities with nothing to fill from stay null.
pub fn derive_metrics(unified: &DataFrame, options: &MetricOptions) -> Result<DataFrame> {
    options.validate()?;
    for column in [DATE, TICKER, ADJ_CLOSE, VALUE] {
        if unified.get_column_index(column).is_none() {
            return Err(ModelError::MissingColumn(column.to_string()));
        }
    }

    let window = options.volatility_window;
    let rolling = RollingOptionsFixedWindow {
        window_size: window,
        min_periods: window,
        ..Default::default()
    };

    let mut df = unified
        .clone()
        .lazy()
        .with_columns([
            col(ADJ_CLOSE).cast(DataType::Float64),
            col(VALUE).cast(DataType::Float64),
        ])
        .sort(
            [TICKER, DATE],
            SortMultipleOptions::default()
                .with_maintain_order(true)
                .with_nulls_last(true),
        )
        .with_columns([
            (col(ADJ_CLOSE) / col(ADJ_CLOSE).shift(lit(1)) - lit(1.0))
                .over([col(TICKER)])
                .alias(RETURN),
            (col(VALUE) - col(VALUE).shift(lit(1))).alias(DELTA_RATE),
        ])
        .with_column(
            col(RETURN)
                .rolling_std(rolling)
                .over([col(TICKER)])
                .alias(VOLATILITY),
        )
        .unique_stable(None, UniqueKeepStrategy::First)
        .with_columns([
            col(RETURN).fill_null(lit(0.0)),
            col(DELTA_RATE).fill_null(lit(0.0)),
        ])
        .collect()?;

    let removed = unified.height() - df.height();
    if removed > 0 {
        debug!(rows = removed, "Dropped duplicate rows");
    }

    let volatility = df
        .column(VOLATILITY)?
        .as_materialized_series()
        .fill_null(FillNullStrategy::Forward(None))?;
    df.with_column(volatility)?;

    info!(
        rows = df.height(),
        window,
        undefined_volatility = df.column(VOLATILITY)?.null_count(),
        "Derived metrics"
    );
    Ok(df)
}

/// Pearson correlation of `Return` and `DeltaRate` over rows where both are
/// finite.
pub fn return_rate_correlation(df: &DataFrame) -> Result<Option<f64>> {
    let returns = df.column(RETURN)?.as_materialized_series().f64()?;
    let deltas = df.column(DELTA_RATE)?.as_materialized_series().f64()?;

    let (x, y): (Vec<f64>, Vec<f64>) = returns
        .into_iter()
        .zip(deltas)
        .filter_map(|pair| match pair {
            (Some(r), Some(d)) if r.is_finite() && d.is_finite() => Some((r, d)),
            _ => None,
        })
        .unzip();

    Ok(pearson(&x, &y))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn series(df: &DataFrame, column: &str) -> Vec<Option<f64>> {
        df.column(column)
            .unwrap()
            .as_materialized_series()
            .f64()
            .unwrap()
            .into_iter()
            .collect()
    }

    fn single_ticker(prices: &[f64], rates: &[f64]) -> DataFrame {
        let dates: Vec<String> = (0..prices.len())
            .map(|i| format!("2024-01-{:02}", i + 1))
            .collect();
        let unified = df!(
            "Date" => dates,
            "Ticker" => vec!["MC.PA"; prices.len()],
            "Adj Close" => prices,
            "Value" => rates,
            "Sector" => vec!["Luxury"; prices.len()]
        )
        .unwrap();
        ratelens_data::to_calendar_day(unified, "unified", "Date").unwrap()
    }

    #[test]
    fn test_grouped_return() {
        let df = derive_metrics(
            &single_ticker(&[100.0, 110.0, 99.0], &[1.0, 1.0, 1.0]),
            &MetricOptions::default(),
        )
        .unwrap();
        let returns = series(&df, RETURN);
        assert_relative_eq!(returns[0].unwrap(), 0.0);
        assert_relative_eq!(returns[1].unwrap(), 0.10, epsilon = 1e-12);
        assert_relative_eq!(returns[2].unwrap(), -0.10, epsilon = 1e-12);
    }

    #[test]
    fn test_delta_rate_is_global_difference() {
        let df = derive_metrics(
            &single_ticker(&[100.0, 101.0, 102.0], &[1.0, 1.2, 1.2]),
            &MetricOptions::default(),
        )
        .unwrap();
        let deltas = series(&df, DELTA_RATE);
        assert_relative_eq!(deltas[0].unwrap(), 0.0);
        assert_relative_eq!(deltas[1].unwrap(), 0.2, epsilon = 1e-12);
        assert_relative_eq!(deltas[2].unwrap(), 0.0);
    }

    #[test]
    fn test_returns_do_not_cross_tickers() {
        let unified = df!(
            "Date" => &["2024-01-02", "2024-01-02", "2024-01-03", "2024-01-03"],
            "Ticker" => &["B", "A", "B", "A"],
            "Adj Close" => &[50.0, 100.0, 55.0, 90.0],
            "Value" => &[3.0, 3.0, 3.5, 3.5]
        )
        .unwrap();
        let df = derive_metrics(&unified, &MetricOptions::default()).unwrap();

        let tickers: Vec<Option<&str>> = df
            .column(TICKER)
            .unwrap()
            .as_materialized_series()
            .str()
            .unwrap()
            .into_iter()
            .collect();
        assert_eq!(tickers, vec![Some("A"), Some("A"), Some("B"), Some("B")]);

        let returns = series(&df, RETURN);
        assert_relative_eq!(returns[0].unwrap(), 0.0);
        assert_relative_eq!(returns[1].unwrap(), -0.1, epsilon = 1e-12);
        assert_relative_eq!(returns[2].unwrap(), 0.0);
        assert_relative_eq!(returns[3].unwrap(), 0.1, epsilon = 1e-12);

        // Global differencing crosses the ticker boundary: 3.0 after 3.5.
        let deltas = series(&df, DELTA_RATE);
        assert_relative_eq!(deltas[2].unwrap(), -0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_undated_row_sorts_after_its_ticker() {
        let unified = df!(
            "Date" => &[Some("2024-01-02"), None, Some("2024-01-03")],
            "Ticker" => &["A", "A", "A"],
            "Adj Close" => &[100.0, 200.0, 110.0],
            "Value" => &[3.0, 3.0, 3.0]
        )
        .unwrap();
        let unified = ratelens_data::to_calendar_day(unified, "unified", "Date").unwrap();
        let df = derive_metrics(&unified, &MetricOptions::default()).unwrap();

        let closes = series(&df, ADJ_CLOSE);
        assert_eq!(closes, vec![Some(100.0), Some(110.0), Some(200.0)]);
        assert_eq!(df.column(DATE).unwrap().null_count(), 1);
        assert!(df.column(DATE).unwrap().get(2).unwrap().is_null());

        let returns = series(&df, RETURN);
        assert_relative_eq!(returns[0].unwrap(), 0.0);
        assert_relative_eq!(returns[1].unwrap(), 0.1, epsilon = 1e-12);
    }

    #[test]
    fn test_volatility_null_until_window_fills() {
        let prices: Vec<f64> = (0..25).map(|i| 100.0 + (i % 3) as f64).collect();
        let rates = vec![3.0; 25];
        let options = MetricOptions {
            volatility_window: 20,
            ..MetricOptions::default()
        };
        let df = derive_metrics(&single_ticker(&prices, &rates), &options).unwrap();

        let vol = series(&df, VOLATILITY);
        // The first return is undefined, so 20 defined returns exist from row 20 on.
        assert!(vol[..20].iter().all(Option::is_none));
        assert!(vol[20..].iter().all(Option::is_some));
    }

    #[test]
    fn test_volatility_forward_fill_crosses_tickers() {
        let mut dates = Vec::new();
        let mut tickers = Vec::new();
        let mut prices = Vec::new();
        for (ticker, base) in [("A", 100.0), ("B", 50.0)] {
            for i in 0..4 {
                dates.push(format!("2024-01-{:02}", i + 1));
                tickers.push(ticker);
                prices.push(base + i as f64 * if i % 2 == 0 { 1.0 } else { -0.5 });
            }
        }
        let unified = df!(
            "Date" => dates,
            "Ticker" => tickers,
            "Adj Close" => prices,
            "Value" => vec![3.0; 8]
        )
        .unwrap();
        let options = MetricOptions {
            volatility_window: 3,
            ..MetricOptions::default()
        };
        let df = derive_metrics(&unified, &options).unwrap();

        let vol = series(&df, VOLATILITY);
        assert!(vol[..3].iter().all(Option::is_none));
        assert!(vol[3].is_some());
        // B has no full window of its own; its rows inherit A's last value.
        for v in &vol[4..7] {
            assert_eq!(*v, vol[3]);
        }
        assert!(vol[7].is_some());
    }

    #[test]
    fn test_upstream_duplicate_survives_cleanup() {
        // The repeated close gets a zero return, so it no longer equals the
        // row it duplicates once metrics are derived; both rows are kept.
        let df = derive_metrics(
            &single_ticker(&[100.0, 110.0, 110.0], &[1.0, 1.0, 1.0])
                .lazy()
                .with_column(lit("2024-01-02").alias("Date"))
                .collect()
                .unwrap(),
            &MetricOptions::default(),
        )
        .unwrap();
        assert_eq!(df.height(), 3);
    }

    #[test]
    fn test_exact_duplicates_removed() {
        // Rows 2 and 3 agree on every column, derived ones included.
        let unified = df!(
            "Date" => &["2024-01-02", "2024-01-02", "2024-01-02"],
            "Ticker" => &["A", "A", "A"],
            "Adj Close" => &[10.0, 10.0, 10.0],
            "Value" => &[1.0, 1.0, 1.0]
        )
        .unwrap();

        let df = derive_metrics(&unified, &MetricOptions::default()).unwrap();
        assert_eq!(df.height(), 2);
    }

    #[test]
    fn test_invalid_window_rejected() {
        let options = MetricOptions {
            volatility_window: 1,
            ..MetricOptions::default()
        };
        assert!(matches!(
            derive_metrics(&single_ticker(&[1.0], &[1.0]), &options),
            Err(ModelError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_correlation_of_derived_columns() {
        let df = derive_metrics(
            &single_ticker(&[100.0, 110.0, 99.0, 104.0], &[1.0, 1.2, 1.0, 1.1]),
            &MetricOptions::default(),
        )
        .unwrap();
        let r = return_rate_correlation(&df).unwrap().unwrap();
        assert!((-1.0..=1.0).contains(&r));
        assert!(r > 0.9);
    }
}

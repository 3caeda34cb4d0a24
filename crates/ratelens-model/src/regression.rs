//! Ordinary least squares and the return regression summary.
//!
//! The return regression explains `Return` by `DeltaRate`, the rate level
//! `Value` and sector dummies, with an intercept. Coefficients come with
//! standard errors from σ²(XᵀX)⁻¹, t-statistics and two-sided Student-t
//! p-values.

use crate::error::{FitError, Result};
use crate::linalg::{DEFAULT_PIVOT_TOLERANCE, InversionError, gram, invert, total_sum_of_squares};
use ndarray::{Array1, Array2};
use polars::prelude::*;
use ratelens_data::schema::{DELTA_RATE, RETURN, SECTOR, VALUE};
use statrs::distribution::{ContinuousCDF, StudentsT};
use std::collections::BTreeSet;
use tracing::{debug, info};

/// Name of the intercept term.
pub const INTERCEPT: &str = "const";

/// Label of the synthetic goodness-of-fit row.
pub const R_SQUARED: &str = "R-squared";

/// Prefix of the sector dummy columns.
pub const SECTOR_PREFIX: &str = "Sector_";

/// Result of an OLS fit.
#[derive(Debug, Clone, PartialEq)]
pub struct OlsFit {
    /// Regressor names, in design-matrix order
    pub names: Vec<String>,
    /// Estimated coefficients
    pub coefficients: Array1<f64>,
    /// Standard errors of the coefficients
    pub std_errors: Array1<f64>,
    /// t-statistics
    pub t_stats: Array1<f64>,
    /// Two-sided p-values
    pub p_values: Array1<f64>,
    /// Coefficient of determination
    pub r_squared: f64,
    /// Number of observations used
    pub observations: usize,
}

/// Fit `y = X β + ε` by ordinary least squares.
///
/// # Arguments
/// * `x` - Design matrix (observations × regressors), intercept included by the caller
/// * `y` - Dependent variable
/// * `names` - One name per column of `x`
///
/// # Returns
/// * The fit, or the reason it is impossible
pub fn ols(x: &Array2<f64>, y: &Array1<f64>, names: &[String]) -> std::result::Result<OlsFit, FitError> {
    let (n, k) = x.dim();
    if n == 0 {
        return Err(FitError::NoObservations);
    }
    if y.len() != n {
        return Err(FitError::DimensionMismatch {
            expected: n,
            actual: y.len(),
        });
    }
    if names.len() != k {
        return Err(FitError::DimensionMismatch {
            expected: k,
            actual: names.len(),
        });
    }
    if n <= k {
        return Err(FitError::InsufficientDegreesOfFreedom {
            observations: n,
            parameters: k,
        });
    }

    let xtx_inv = invert(&gram(x), DEFAULT_PIVOT_TOLERANCE).map_err(|e| match e {
        InversionError::Singular { column } => FitError::RankDeficient {
            column: names[column].clone(),
        },
        InversionError::NotSquare { rows, cols } => FitError::DimensionMismatch {
            expected: rows,
            actual: cols,
        },
    })?;

    let coefficients = xtx_inv.dot(&x.t().dot(y));
    let residuals = y - &x.dot(&coefficients);
    let ssr = residuals.dot(&residuals);
    let dof = n - k;
    let sigma2 = ssr / dof as f64;

    let std_errors = xtx_inv.diag().mapv(|v| (sigma2 * v).max(0.0).sqrt());
    let t_stats = &coefficients / &std_errors;

    let dist = StudentsT::new(0.0, 1.0, dof as f64).map_err(|_| {
        FitError::InsufficientDegreesOfFreedom {
            observations: n,
            parameters: k,
        }
    })?;
    let p_values = t_stats.mapv(|t| {
        if t.is_nan() {
            f64::NAN
        } else {
            (2.0 * dist.sf(t.abs())).min(1.0)
        }
    });

    let sst = total_sum_of_squares(y);
    let r_squared = if sst > 0.0 { 1.0 - ssr / sst } else { f64::NAN };

    Ok(OlsFit {
        names: names.to_vec(),
        coefficients,
        std_errors,
        t_stats,
        p_values,
        r_squared,
        observations: n,
    })
}

/// One line of the regression summary.
#[derive(Debug, Clone, PartialEq)]
pub struct CoefficientRow {
    /// Regressor name, or [`R_SQUARED`]
    pub variable: String,
    /// Coefficient (R² on the synthetic row)
    pub coefficient: f64,
    /// p-value, absent on the R² row
    pub p_value: Option<f64>,
    /// t-statistic, absent on the R² row
    pub t_stat: Option<f64>,
}

/// Coefficient table, R² row and significance comments.
#[derive(Debug, Clone, PartialEq)]
pub struct RegressionSummary {
    /// Coefficient rows followed by the R² row
    pub rows: Vec<CoefficientRow>,
    /// One comment per significant coefficient
    pub comments: Vec<String>,
    /// Level the comments were produced at
    pub significance_level: f64,
    /// Number of observations in the fit
    pub observations: usize,
}

impl RegressionSummary {
    /// Build the summary from a fit.
    pub fn from_fit(fit: &OlsFit, significance_level: f64) -> Self {
        let mut rows: Vec<CoefficientRow> = fit
            .names
            .iter()
            .enumerate()
            .map(|(j, name)| CoefficientRow {
                variable: name.clone(),
                coefficient: fit.coefficients[j],
                p_value: Some(fit.p_values[j]),
                t_stat: Some(fit.t_stats[j]),
            })
            .collect();
        rows.push(CoefficientRow {
            variable: R_SQUARED.to_string(),
            coefficient: fit.r_squared,
            p_value: None,
            t_stat: None,
        });

        let comments = significance_comments(&rows, significance_level);
        Self {
            rows,
            comments,
            significance_level,
            observations: fit.observations,
        }
    }

    /// R² of the fit.
    pub fn r_squared(&self) -> Option<f64> {
        self.rows
            .iter()
            .find(|r| r.variable == R_SQUARED)
            .map(|r| r.coefficient)
    }

    /// Row for a regressor.
    pub fn coefficient(&self, variable: &str) -> Option<&CoefficientRow> {
        self.rows.iter().find(|r| r.variable == variable)
    }

    /// Whether a row is below the significance level.
    pub fn is_significant(&self, row: &CoefficientRow) -> bool {
        row.variable != R_SQUARED
            && row.p_value.is_some_and(|p| p < self.significance_level)
    }

    /// Regression sheet: coefficient rows and the R² row, two blank rows,
    /// then one row per comment in the `Variable` column.
    pub fn to_frame(&self) -> PolarsResult<DataFrame> {
        let blanks = 2;
        let height = self.rows.len() + blanks + self.comments.len();
        let mut variable = Vec::with_capacity(height);
        let mut coefficient = Vec::with_capacity(height);
        let mut p_value = Vec::with_capacity(height);
        let mut t_stat = Vec::with_capacity(height);

        for row in &self.rows {
            variable.push(row.variable.clone());
            coefficient.push(Some(row.coefficient));
            p_value.push(row.p_value);
            t_stat.push(row.t_stat);
        }
        let trailing = std::iter::repeat_n(String::new(), blanks).chain(self.comments.iter().cloned());
        for label in trailing {
            variable.push(label);
            coefficient.push(None);
            p_value.push(None);
            t_stat.push(None);
        }

        DataFrame::new(vec![
            Column::new("Variable".into(), variable),
            Column::new("Coefficient".into(), coefficient),
            Column::new("P-value".into(), p_value),
            Column::new("T-stat".into(), t_stat),
        ])
    }
}

/// Comment line for a significant coefficient.
pub fn significance_comment(variable: &str, p_value: f64, level: f64) -> String {
    let percent = (level * 1e4).round() / 100.0;
    format!(
        "variable '{}' is significant at the {}% level (p-value = {:.4})",
        variable, percent, p_value
    )
}

/// Comments for every row other than R² whose p-value is strictly below `level`.
pub fn significance_comments(rows: &[CoefficientRow], level: f64) -> Vec<String> {
    rows.iter()
        .filter(|r| r.variable != R_SQUARED)
        .filter_map(|r| {
            r.p_value
                .filter(|p| *p < level)
                .map(|p| significance_comment(&r.variable, p, level))
        })
        .collect()
}

/// Regress `Return` on `DeltaRate`, `Value` and sector dummies.
///
/// Rows with a missing or non-finite value in any of the four inputs are
/// excluded. Sectors are dummy-encoded in sorted order with the first one
/// dropped as the reference category.
pub fn fit_return_regression(unified: &DataFrame, significance_level: f64) -> Result<RegressionSummary> {
    let cast = |name: &str, dtype: DataType| -> PolarsResult<Series> {
        unified.column(name)?.as_materialized_series().cast(&dtype)
    };
    let returns = cast(RETURN, DataType::Float64)?;
    let deltas = cast(DELTA_RATE, DataType::Float64)?;
    let values = cast(VALUE, DataType::Float64)?;
    let sectors = cast(SECTOR, DataType::String)?;

    let returns = returns.f64()?;
    let deltas = deltas.f64()?;
    let values = values.f64()?;
    let sectors = sectors.str()?;

    let mut observations: Vec<(f64, f64, f64, &str)> = Vec::with_capacity(unified.height());
    for i in 0..unified.height() {
        if let (Some(r), Some(d), Some(v), Some(s)) =
            (returns.get(i), deltas.get(i), values.get(i), sectors.get(i))
        {
            if r.is_finite() && d.is_finite() && v.is_finite() {
                observations.push((r, d, v, s));
            }
        }
    }
    debug!(
        eligible = observations.len(),
        total = unified.height(),
        "Regression rows after dropping incomplete ones"
    );
    if observations.is_empty() {
        return Err(FitError::NoObservations.into());
    }

    let categories: Vec<&str> = observations
        .iter()
        .map(|o| o.3)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .skip(1)
        .collect();

    let mut names = vec![INTERCEPT.to_string(), DELTA_RATE.to_string(), VALUE.to_string()];
    names.extend(categories.iter().map(|s| format!("{SECTOR_PREFIX}{s}")));

    let k = names.len();
    let mut x = Array2::<f64>::zeros((observations.len(), k));
    let mut y = Array1::<f64>::zeros(observations.len());
    for (i, (r, d, v, s)) in observations.iter().enumerate() {
        y[i] = *r;
        x[[i, 0]] = 1.0;
        x[[i, 1]] = *d;
        x[[i, 2]] = *v;
        if let Some(pos) = categories.iter().position(|c| c == s) {
            x[[i, 3 + pos]] = 1.0;
        }
    }

    let fit = ols(&x, &y, &names)?;
    let summary = RegressionSummary::from_fit(&fit, significance_level);

    info!(
        observations = fit.observations,
        regressors = k,
        r_squared = fit.r_squared,
        significant = summary.comments.len(),
        "Fitted return regression"
    );
    Ok(summary)
}

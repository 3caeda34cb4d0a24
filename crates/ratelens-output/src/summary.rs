//! Console summaries of the analysis results.
//!
//! Significant coefficients and the notable sectors are flagged with text
//! markers.

use polars::prelude::*;
use ratelens_model::RegressionSummary;
use ratelens_model::regression::R_SQUARED;
use std::fmt::Write as _;

const WIDTH: usize = 80;

/// Marker appended to significant coefficient rows.
pub const SIGNIFICANT_MARKER: &str = "*";

/// Sectors singled out in the sector-means view.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SectorHighlights {
    /// Sector with the highest mean return
    pub best_return: Option<String>,
    /// Sector with the lowest mean volatility
    pub lowest_volatility: Option<String>,
}

impl SectorHighlights {
    /// Find the highlighted sectors of a `Sector, Return, Volatility` frame.
    ///
    /// Ties go to the first row; null means are ignored.
    pub fn from_frame(df: &DataFrame) -> PolarsResult<Self> {
        let sectors = df.column("Sector")?.as_materialized_series().cast(&DataType::String)?;
        let returns = df.column("Return")?.as_materialized_series().cast(&DataType::Float64)?;
        let vols = df.column("Volatility")?.as_materialized_series().cast(&DataType::Float64)?;
        let sectors = sectors.str()?;

        let pick = |values: &Float64Chunked, better: fn(f64, f64) -> bool| {
            let mut best: Option<(usize, f64)> = None;
            for (i, v) in values.into_iter().enumerate() {
                let Some(v) = v.filter(|v| !v.is_nan()) else {
                    continue;
                };
                if best.is_none_or(|(_, b)| better(v, b)) {
                    best = Some((i, v));
                }
            }
            best.and_then(|(i, _)| sectors.get(i).map(str::to_string))
        };

        Ok(Self {
            best_return: pick(returns.f64()?, |a, b| a > b),
            lowest_volatility: pick(vols.f64()?, |a, b| a < b),
        })
    }
}

/// Format the regression summary as an ASCII table.
pub fn regression_table(summary: &RegressionSummary) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "\nReturn Regression ({} observations)", summary.observations);
    output.push_str(&"=".repeat(WIDTH));
    output.push('\n');
    let _ = writeln!(
        output,
        "{:<28} {:>14} {:>14} {:>14}",
        "Variable", "Coefficient", "P-value", "T-stat"
    );
    output.push_str(&"-".repeat(WIDTH));
    output.push('\n');

    for row in &summary.rows {
        if row.variable == R_SQUARED {
            continue;
        }
        let marker = if summary.is_significant(row) {
            SIGNIFICANT_MARKER
        } else {
            ""
        };
        let _ = writeln!(
            output,
            "{:<28} {:>14.6} {:>14} {:>14}",
            format!("{}{}", row.variable, marker),
            row.coefficient,
            optional(row.p_value, 4),
            optional(row.t_stat, 3),
        );
    }

    output.push_str(&"-".repeat(WIDTH));
    output.push('\n');
    if let Some(r2) = summary.r_squared() {
        let _ = writeln!(output, "{:<28} {:>14.4}", R_SQUARED, r2);
    }

    if !summary.comments.is_empty() {
        let _ = writeln!(
            output,
            "\n{} significant at the {}% level:",
            SIGNIFICANT_MARKER,
            summary.significance_level * 100.0
        );
        for comment in &summary.comments {
            let _ = writeln!(output, "  {}", comment);
        }
    }

    output.push_str(&"=".repeat(WIDTH));
    output.push('\n');
    output
}

/// Format the sector-means view with its highlighted sectors.
pub fn sector_means_table(df: &DataFrame) -> PolarsResult<String> {
    let highlights = SectorHighlights::from_frame(df)?;
    let sectors = df.column("Sector")?.as_materialized_series().cast(&DataType::String)?;
    let returns = df.column("Return")?.as_materialized_series().cast(&DataType::Float64)?;
    let vols = df.column("Volatility")?.as_materialized_series().cast(&DataType::Float64)?;

    let mut output = String::new();
    output.push_str("\nMean Return and Volatility by Sector\n");
    output.push_str(&"=".repeat(WIDTH));
    output.push('\n');
    let _ = writeln!(
        output,
        "{:<24} {:>14} {:>14}  {}",
        "Sector", "Return", "Volatility", "Note"
    );
    output.push_str(&"-".repeat(WIDTH));
    output.push('\n');

    for ((sector, ret), vol) in sectors
        .str()?
        .into_iter()
        .zip(returns.f64()?)
        .zip(vols.f64()?)
    {
        let sector = sector.unwrap_or("");
        let mut notes = Vec::new();
        if highlights.best_return.as_deref() == Some(sector) {
            notes.push("highest return");
        }
        if highlights.lowest_volatility.as_deref() == Some(sector) {
            notes.push("lowest volatility");
        }
        let _ = writeln!(
            output,
            "{:<24} {:>13}% {:>13}%  {}",
            sector,
            optional(ret.map(|r| r * 100.0), 4),
            optional(vol.map(|v| v * 100.0), 4),
            notes.join(", ")
        );
    }

    output.push_str(&"=".repeat(WIDTH));
    output.push('\n');
    Ok(output)
}

/// Format any frame as a fixed-width table, showing at most `max_rows` rows.
pub fn frame_table(title: &str, df: &DataFrame, max_rows: usize) -> PolarsResult<String> {
    let shown = df.height().min(max_rows);
    let rendered = df
        .get_columns()
        .iter()
        .map(|c| c.as_materialized_series().cast(&DataType::String))
        .collect::<PolarsResult<Vec<_>>>()?;

    let mut cells: Vec<Vec<String>> = Vec::with_capacity(rendered.len());
    for series in &rendered {
        let values = series.str()?;
        cells.push(
            (0..shown)
                .map(|i| values.get(i).unwrap_or("").to_string())
                .collect(),
        );
    }

    let widths: Vec<usize> = df
        .get_column_names()
        .iter()
        .zip(&cells)
        .map(|(name, column)| {
            column
                .iter()
                .map(|v| v.chars().count())
                .chain([name.chars().count()])
                .max()
                .unwrap_or(0)
        })
        .collect();

    let mut output = String::new();
    let _ = writeln!(output, "\n{} ({} rows)", title, df.height());
    let header: Vec<String> = df
        .get_column_names()
        .iter()
        .zip(&widths)
        .map(|(name, w)| format!("{:<w$}", name.as_str(), w = *w))
        .collect();
    let _ = writeln!(output, "{}", header.join("  ").trim_end());
    let rule: usize = widths.iter().sum::<usize>() + 2 * widths.len().saturating_sub(1);
    output.push_str(&"-".repeat(rule));
    output.push('\n');

    for row in 0..shown {
        let line: Vec<String> = cells
            .iter()
            .zip(&widths)
            .map(|(column, w)| format!("{:<w$}", column[row], w = *w))
            .collect();
        let _ = writeln!(output, "{}", line.join("  ").trim_end());
    }
    if shown < df.height() {
        let _ = writeln!(output, "... {} more rows", df.height() - shown);
    }
    Ok(output)
}

fn optional(value: Option<f64>, precision: usize) -> String {
    match value {
        Some(v) if v.is_finite() => format!("{:.*}", precision, v),
        Some(v) => v.to_string(),
        None => "-".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratelens_model::CoefficientRow;

    fn summary() -> RegressionSummary {
        let rows = vec![
            CoefficientRow {
                variable: "const".to_string(),
                coefficient: 0.001,
                p_value: Some(0.4),
                t_stat: Some(0.8),
            },
            CoefficientRow {
                variable: "DeltaRate".to_string(),
                coefficient: 0.5,
                p_value: Some(0.0001),
                t_stat: Some(5.2),
            },
            CoefficientRow {
                variable: "R-squared".to_string(),
                coefficient: 0.31,
                p_value: None,
                t_stat: None,
            },
        ];
        RegressionSummary {
            comments: ratelens_model::regression::significance_comments(&rows, 0.05),
            rows,
            significance_level: 0.05,
            observations: 120,
        }
    }

    #[test]
    fn test_regression_table_marks_significant_rows() {
        let table = regression_table(&summary());
        assert!(table.contains("DeltaRate*"));
        assert!(!table.contains("const*"));
        assert!(table.contains("R-squared"));
        assert!(table.contains("variable 'DeltaRate' is significant at the 5% level"));
        assert!(table.contains("120 observations"));
    }

    #[test]
    fn test_sector_highlights() {
        let df = df!(
            "Sector" => &["Energy", "Banking", "Luxury"],
            "Return" => &[Some(-0.01), Some(0.002), Some(0.004)],
            "Volatility" => &[Some(0.02), None, Some(0.015)]
        )
        .unwrap();
        let highlights = SectorHighlights::from_frame(&df).unwrap();
        assert_eq!(highlights.best_return.as_deref(), Some("Luxury"));
        assert_eq!(highlights.lowest_volatility.as_deref(), Some("Luxury"));

        let table = sector_means_table(&df).unwrap();
        assert!(table.contains("highest return, lowest volatility"));
        assert!(table.contains("Banking"));
    }

    #[test]
    fn test_frame_table_truncates() {
        let df = df!("Ticker" => &["MC.PA", "BNP.PA", "TTE.PA"], "n" => &[1i64, 2, 3]).unwrap();
        let table = frame_table("tickers", &df, 2).unwrap();
        assert!(table.contains("tickers (3 rows)"));
        assert!(table.contains("BNP.PA"));
        assert!(!table.contains("TTE.PA"));
        assert!(table.contains("... 1 more rows"));
    }
}

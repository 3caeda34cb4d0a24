//! Pivot engine.
//!
//! Builds the named views listed in the configuration over the unified
//! table: the fixed sector-means view, grouped aggregations and full
//! cross-tabulations.

use crate::error::{ModelError, Result};
use polars::prelude::*;
use ratelens_data::schema::{RETURN, SECTOR, VOLATILITY};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info, warn};

const LABEL: &str = "__pivot_label";

/// Aggregation applied to the value fields of a pivot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggFunc {
    /// Arithmetic mean
    #[default]
    Mean,
    /// Sum
    Sum,
    /// Number of non-null values
    Count,
    /// Minimum
    Min,
    /// Maximum
    Max,
    /// Median
    Median,
    /// Sample standard deviation
    Std,
    /// First value in row order
    First,
    /// Last value in row order
    Last,
}

impl AggFunc {
    /// Canonical lowercase name.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Mean => "mean",
            Self::Sum => "sum",
            Self::Count => "count",
            Self::Min => "min",
            Self::Max => "max",
            Self::Median => "median",
            Self::Std => "std",
            Self::First => "first",
            Self::Last => "last",
        }
    }

    /// Aggregation expression over `column`.
    pub fn expr(&self, column: &str) -> Expr {
        let c = col(column);
        match self {
            Self::Mean => c.mean(),
            Self::Sum => c.sum(),
            Self::Count => c.count(),
            Self::Min => c.min(),
            Self::Max => c.max(),
            Self::Median => c.median(),
            Self::Std => c.std(1),
            Self::First => c.first(),
            Self::Last => c.last(),
        }
    }
}

impl fmt::Display for AggFunc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AggFunc {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mean" | "average" => Ok(Self::Mean),
            "sum" => Ok(Self::Sum),
            "count" => Ok(Self::Count),
            "min" => Ok(Self::Min),
            "max" => Ok(Self::Max),
            "median" => Ok(Self::Median),
            "std" => Ok(Self::Std),
            "first" => Ok(Self::First),
            "last" => Ok(Self::Last),
            other => Err(ModelError::InvalidParameter(format!(
                "Unknown aggregation function: {}",
                other
            ))),
        }
    }
}

/// One configured pivot view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PivotSpec {
    /// Mean `Return` and `Volatility` per sector, ascending by mean return
    SectorMeans {
        /// Sheet name
        name: String,
    },
    /// Grouped aggregation, or a cross-tabulation when `columns` is set
    Standard {
        /// Sheet name
        name: String,
        /// Row keys
        #[serde(default)]
        index: Vec<String>,
        /// Aggregated fields
        #[serde(default)]
        values: Vec<String>,
        /// Column keys
        #[serde(default)]
        columns: Vec<String>,
        /// Aggregation
        #[serde(default)]
        aggfunc: AggFunc,
    },
}

impl PivotSpec {
    /// Sheet name of the view.
    pub fn name(&self) -> &str {
        match self {
            Self::SectorMeans { name } | Self::Standard { name, .. } => name,
        }
    }
}

/// A named pivot result.
#[derive(Debug, Clone)]
pub struct PivotTable {
    /// Sheet name
    pub name: String,
    /// Aggregated view
    pub frame: DataFrame,
}

/// Build every pivot in configuration order.
///
/// Specs that cannot produce a table are skipped with a warning: no index or
/// no values, unknown fields, or distinct column keys whose `_`-joined labels
/// coincide. A later spec with an already used name replaces the
/// earlier result in place.
pub fn build_pivots(unified: &DataFrame, specs: &[PivotSpec]) -> Result<Vec<PivotTable>> {
    let mut tables: Vec<PivotTable> = Vec::with_capacity(specs.len());

    for spec in specs {
        let Some(frame) = build_pivot(unified, spec)? else {
            continue;
        };
        let table = PivotTable {
            name: spec.name().to_string(),
            frame,
        };
        debug!(name = %table.name, rows = table.frame.height(), columns = table.frame.width(), "Built pivot");
        match tables.iter_mut().find(|t| t.name == table.name) {
            Some(existing) => *existing = table,
            None => tables.push(table),
        }
    }

    info!(pivots = tables.len(), "Built pivot tables");
    Ok(tables)
}

/// Build one pivot; `None` when the spec is skipped.
pub fn build_pivot(unified: &DataFrame, spec: &PivotSpec) -> Result<Option<DataFrame>> {
    match spec {
        PivotSpec::SectorMeans { .. } => sector_means(unified).map(Some),
        PivotSpec::Standard {
            name,
            index,
            values,
            columns,
            aggfunc,
        } => {
            if index.is_empty() {
                warn!(pivot = %name, "Pivot skipped: no index fields");
                return Ok(None);
            }
            if values.is_empty() {
                warn!(pivot = %name, "Pivot skipped: no value fields");
                return Ok(None);
            }
            if let Some(unknown) = index
                .iter()
                .chain(values)
                .chain(columns)
                .find(|c| unified.get_column_index(c).is_none())
            {
                warn!(pivot = %name, field = %unknown, "Pivot skipped: unknown field");
                return Ok(None);
            }

            if columns.is_empty() {
                grouped(unified, index, values, *aggfunc).map(Some)
            } else {
                crosstab(unified, name, index, values, columns, *aggfunc)
            }
        }
    }
}

/// Mean `Return` and `Volatility` per sector.
///
/// Groups are ordered by sector name, then stably by ascending mean return,
/// so equal means keep sector-name order. Rows without a sector are ignored.
pub fn sector_means(unified: &DataFrame) -> Result<DataFrame> {
    for column in [SECTOR, RETURN, VOLATILITY] {
        if unified.get_column_index(column).is_none() {
            return Err(ModelError::MissingColumn(column.to_string()));
        }
    }

    let df = unified
        .clone()
        .lazy()
        .filter(col(SECTOR).is_not_null())
        .group_by([col(SECTOR)])
        .agg([col(RETURN).mean(), col(VOLATILITY).mean()])
        .sort([SECTOR], SortMultipleOptions::default())
        .sort(
            [RETURN],
            SortMultipleOptions::default()
                .with_maintain_order(true)
                .with_nulls_last(true),
        )
        .collect()?;
    Ok(df)
}

fn not_null(keys: &[String]) -> Expr {
    keys.iter()
        .map(|k| col(k.as_str()).is_not_null())
        .reduce(|a, b| a.and(b))
        .unwrap_or_else(|| lit(true))
}

fn key_exprs(keys: &[String]) -> Vec<Expr> {
    keys.iter().map(|k| col(k.as_str())).collect()
}

fn grouped(unified: &DataFrame, index: &[String], values: &[String], agg: AggFunc) -> Result<DataFrame> {
    let df = unified
        .clone()
        .lazy()
        .filter(not_null(index))
        .group_by(key_exprs(index))
        .agg(values.iter().map(|v| agg.expr(v)).collect::<Vec<_>>())
        .sort(index.to_vec(), SortMultipleOptions::default())
        .collect()?;
    Ok(df)
}

fn crosstab(
    unified: &DataFrame,
    name: &str,
    index: &[String],
    values: &[String],
    columns: &[String],
    agg: AggFunc,
) -> Result<Option<DataFrame>> {
    let keys: Vec<String> = index.iter().chain(columns).cloned().collect();

    let mut cells = unified
        .clone()
        .lazy()
        .filter(not_null(&keys))
        .group_by(key_exprs(&keys))
        .agg(values.iter().map(|v| agg.expr(v)).collect::<Vec<_>>())
        .sort(columns.to_vec(), SortMultipleOptions::default().with_maintain_order(true))
        .collect()?;

    let column_rows = column_keys(&cells, columns)?;
    let labels: Vec<String> = column_rows.iter().map(|k| k.join("_")).collect();

    let mut ordered: Vec<(&str, &[String])> = Vec::new();
    for (label, key) in labels.iter().zip(&column_rows) {
        match ordered.iter().find(|(seen, _)| *seen == label.as_str()) {
            Some((_, first)) if *first != key.as_slice() => {
                warn!(
                    pivot = %name,
                    label = %label,
                    "Pivot skipped: distinct column keys share a label"
                );
                return Ok(None);
            }
            Some(_) => {}
            None => ordered.push((label.as_str(), key.as_slice())),
        }
    }
    let ordered: Vec<&str> = ordered.into_iter().map(|(label, _)| label).collect();
    cells.with_column(Series::new(LABEL.into(), &labels))?;

    let index_keys = key_exprs(index);
    let mut table = cells
        .clone()
        .lazy()
        .select(index_keys.clone())
        .unique_stable(None, UniqueKeepStrategy::First);

    for value in values {
        for label in &ordered {
            let part = cells
                .clone()
                .lazy()
                .filter(col(LABEL).eq(lit(*label)))
                .select(
                    index_keys
                        .iter()
                        .cloned()
                        .chain([col(value.as_str()).alias(format!("{value}_{label}"))])
                        .collect::<Vec<_>>(),
                );
            table = table.join(
                part,
                index_keys.clone(),
                index_keys.clone(),
                JoinArgs::new(JoinType::Left),
            );
        }
    }

    let df = table
        .sort(index.to_vec(), SortMultipleOptions::default())
        .collect()?;
    Ok(Some(df))
}

/// Textual rendering of the column keys of every row.
fn column_keys(df: &DataFrame, columns: &[String]) -> Result<Vec<Vec<String>>> {
    let rendered = columns
        .iter()
        .map(|c| {
            df.column(c)?
                .as_materialized_series()
                .cast(&DataType::String)
        })
        .collect::<PolarsResult<Vec<Series>>>()?;

    let mut keys = Vec::with_capacity(df.height());
    for row in 0..df.height() {
        let mut parts = Vec::with_capacity(rendered.len());
        for series in &rendered {
            parts.push(series.str()?.get(row).unwrap_or_default().to_string());
        }
        keys.push(parts);
    }
    Ok(keys)
}

//! Join engine: prices ⟕ macro on `Date`, then ⟕ sectors on `Ticker`.

use crate::error::{ModelError, Result};
use polars::prelude::*;
use ratelens_data::schema::{DATE, SECTOR, TICKER, VALUE};
use ratelens_data::to_calendar_day;
use tracing::{info, warn};

const ROW_INDEX: &str = "__row";

/// Left-join prices with the macro series and the sector table.
///
/// Both date columns are re-truncated to calendar days first. The right-hand
/// tables are reduced to one row per key (first occurrence wins), so the
/// output always has exactly as many rows as `prices`, in the same order.
/// Unmatched keys leave the right-hand columns null.
pub fn join(prices: &DataFrame, macro_rates: &DataFrame, sectors: &DataFrame) -> Result<DataFrame> {
    require(prices, &[DATE, TICKER])?;
    require(macro_rates, &[DATE])?;
    require(sectors, &[TICKER])?;

    let prices = to_calendar_day(prices.clone(), "prices", DATE)?;
    let macro_rates = to_calendar_day(macro_rates.clone(), "macro", DATE)?;

    let macro_by_date = first_per_key(macro_rates.lazy(), DATE);
    let sector_by_ticker = first_per_key(sectors.clone().lazy(), TICKER);

    let unified = prices
        .lazy()
        .with_row_index(ROW_INDEX, None)
        .left_join(macro_by_date, col(DATE), col(DATE))
        .left_join(sector_by_ticker, col(TICKER), col(TICKER))
        .sort([ROW_INDEX], SortMultipleOptions::default())
        .collect()?
        .drop(ROW_INDEX)?;

    report_unmatched(&unified, VALUE, DATE)?;
    report_unmatched(&unified, SECTOR, TICKER)?;

    info!(
        rows = unified.height(),
        columns = unified.width(),
        "Joined prices, macro series and sectors"
    );
    Ok(unified)
}

/// Keep the first row for every non-null `key`, in order of appearance.
fn first_per_key(lf: LazyFrame, key: &str) -> LazyFrame {
    lf.filter(col(key).is_not_null())
        .group_by_stable([col(key)])
        .agg([col("*").exclude([key]).first()])
}

fn require(df: &DataFrame, columns: &[&str]) -> Result<()> {
    match columns.iter().find(|c| df.get_column_index(c).is_none()) {
        Some(missing) => Err(ModelError::MissingColumn((*missing).to_string())),
        None => Ok(()),
    }
}

fn report_unmatched(df: &DataFrame, column: &str, key: &str) -> Result<()> {
    if df.get_column_index(column).is_none() {
        return Ok(());
    }
    let unmatched = df.column(column)?.null_count();
    if unmatched > 0 {
        warn!(rows = unmatched, key, column, "Join key mismatch left nulls");
    }
    Ok(())
}

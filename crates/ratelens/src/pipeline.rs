//! Stage drivers.
//!
//! `run_etl` reads the raw sources and stages them; `run_analysis` reloads the
//! staged tables and produces the final report. [`analyze`] is the pure core of
//! the second stage and touches no files.

use crate::config::{Config, ConfigError, ResolvedPaths};
use polars::prelude::*;
use ratelens_data::{
    DataError, SanityReport, SourceFiles, TableStore, Tables, WriteMode, coerce, extract,
    sanity_check, transform,
};
use ratelens_model::{
    MetricsOutput, ModelError, PivotTable, build_pivots, compute, join,
};
use ratelens_output::{ExportError, Workbook};
use std::path::PathBuf;
use thiserror::Error;
use tracing::{info, warn};

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Any failure that aborts a run.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Ingestion, coercion or store failure.
    #[error(transparent)]
    Data(#[from] DataError),

    /// Join, metric or regression failure.
    #[error(transparent)]
    Model(#[from] ModelError),

    /// Report export failure.
    #[error(transparent)]
    Export(#[from] ExportError),

    /// DataFrame operation failure.
    #[error("Polars error: {0}")]
    Polars(#[from] PolarsError),
}

/// What the ETL stage produced.
#[derive(Debug)]
pub struct EtlOutcome {
    /// Transformed and coerced tables
    pub tables: Tables,
    /// Sanity findings
    pub sanity: SanityReport,
    /// Store file, when the store was written
    pub store: Option<PathBuf>,
    /// Staging report sheet files, when the report was written
    pub report: Vec<PathBuf>,
}

/// What the analysis stage produced.
#[derive(Debug)]
pub struct Analysis {
    /// Unified table with metrics, correlation and regression
    pub metrics: MetricsOutput,
    /// Pivot views in configured order
    pub pivots: Vec<PivotTable>,
}

impl Analysis {
    /// Pivot view by name.
    pub fn pivot(&self, name: &str) -> Option<&PivotTable> {
        self.pivots.iter().find(|p| p.name == name)
    }
}

/// Extract, transform, check and stage the raw sources.
pub fn run_etl(config: &Config, paths: &ResolvedPaths) -> Result<EtlOutcome> {
    info!(input = %paths.input_dir.display(), "Starting ETL");

    let files = SourceFiles::in_dir(
        &paths.input_dir,
        &config.sources.prices,
        &config.sources.macro_rates,
        &config.sources.sectors,
    );
    let raw = extract(&files)?;
    let transformed = transform(&raw, &config.macro_layout())?;
    let tables = Tables {
        prices: coerce(transformed.prices, &config.dtypes)?,
        macro_rates: coerce(transformed.macro_rates, &config.dtypes)?,
        sectors: coerce(transformed.sectors, &config.dtypes)?,
    };

    let names = config.table_names();
    let named = tables.named(&names);
    let sanity = sanity_check(&named, &config.mandatory_by_table())?;
    if !sanity.is_complete() {
        warn!("Sanity check found missing mandatory columns, continuing");
    }

    let store = if config.etl.write_store {
        let store = TableStore::open(&paths.staging_store)?;
        if config.etl.drop_all_tables {
            store.drop_all_tables()?;
        }
        let mode = if config.etl.append {
            WriteMode::Append
        } else {
            WriteMode::Replace
        };
        store.write_tables(named, mode)?;
        info!(path = %paths.staging_store.display(), "Staging store written");
        Some(paths.staging_store.clone())
    } else {
        None
    };

    let report = if config.etl.write_staging_report {
        let mut workbook = Workbook::new();
        for (name, df) in named {
            workbook.add(name, df.clone())?;
        }
        workbook.add(config.tables.dtype_report.as_str(), sanity.dtypes.clone())?;
        workbook.write(&paths.staging_report, config.run.format)?
    } else {
        Vec::new()
    };

    info!("ETL done");
    Ok(EtlOutcome {
        tables,
        sanity,
        store,
        report,
    })
}

/// Reload the staged tables, analyse them and write the final report.
pub fn run_analysis(config: &Config, paths: &ResolvedPaths) -> Result<(Analysis, Vec<PathBuf>)> {
    info!(store = %paths.staging_store.display(), "Starting analysis");

    let tables = {
        let store = TableStore::open(&paths.staging_store)?;
        Tables {
            prices: store.read_table(&config.tables.prices)?,
            macro_rates: store.read_table(&config.tables.macro_rates)?,
            sectors: store.read_table(&config.tables.sectors)?,
        }
    };
    info!(
        prices = tables.prices.height(),
        macro_rates = tables.macro_rates.height(),
        sectors = tables.sectors.height(),
        "Reloaded staged tables"
    );

    let analysis = analyze(&tables, config)?;
    let written = final_workbook(&analysis, config)?.write(&paths.final_report, config.run.format)?;
    info!(path = %paths.final_report.display(), sheets = written.len(), "Analysis done");
    Ok((analysis, written))
}

/// Coerce, join, compute the metrics and build the pivot views.
pub fn analyze(tables: &Tables, config: &Config) -> Result<Analysis> {
    let prices = coerce(tables.prices.clone(), &config.dtypes)?;
    let macro_rates = coerce(tables.macro_rates.clone(), &config.dtypes)?;
    let sectors = coerce(tables.sectors.clone(), &config.dtypes)?;

    let unified = join(&prices, &macro_rates, &sectors)?;
    let metrics = compute(&unified, &config.metrics)?;
    let pivots = build_pivots(&metrics.unified, &config.pivots)?;

    Ok(Analysis { metrics, pivots })
}

/// Final report: the unified table, the regression sheet, then the pivots.
///
/// A pivot named like an earlier sheet replaces it in place.
pub fn final_workbook(analysis: &Analysis, config: &Config) -> Result<Workbook> {
    let mut workbook = Workbook::new();
    workbook.add(config.tables.results.as_str(), analysis.metrics.unified.clone())?;
    workbook.add(
        config.tables.regression.as_str(),
        analysis.metrics.regression.to_frame()?,
    )?;
    for pivot in &analysis.pivots {
        workbook.add(pivot.name.as_str(), pivot.frame.clone())?;
    }
    Ok(workbook)
}

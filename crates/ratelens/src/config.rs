//! Pipeline configuration.
//!
//! A single TOML file drives both stages. Every section has defaults, so an
//! empty file is a valid configuration.
//!
//! ```toml
//! [paths]
//! input_dir = "input"
//! output_dir = "output"
//! version = "v2"
//! staging_store = "staging_{version}.sqlite"
//!
//! [metrics]
//! volatility_window = 20
//!
//! [[pivots]]
//! kind = "sector_means"
//! name = "mean_by_sector"
//! ```

use ratelens_data::schema::{ADJ_CLOSE, DATE, INDICATOR, SECTOR, TICKER, VALUE, VOLUME};
use ratelens_data::{ColumnType, MacroLayout, TableNames, TypeMap};
use ratelens_model::{MetricOptions, PivotSpec};
use ratelens_output::ExportFormat;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Placeholder substituted with [`PathsConfig::version`] in file names.
pub const VERSION_PLACEHOLDER: &str = "{version}";

/// Errors raised while loading a configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("Failed to read config {path}: {source}")]
    Io {
        /// Config file path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML for [`Config`].
    #[error("Failed to parse config: {0}")]
    Toml(#[from] toml::de::Error),

    /// A value is out of range or inconsistent.
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Input and output locations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PathsConfig {
    /// Directory holding the raw sources
    pub input_dir: PathBuf,
    /// Directory receiving the store and the reports
    pub output_dir: PathBuf,
    /// Run tag substituted for `{version}`
    pub version: String,
    /// Staging store file name
    pub staging_store: String,
    /// Staging report directory name
    pub staging_report: String,
    /// Final report directory name
    pub final_report: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("input"),
            output_dir: PathBuf::from("output"),
            version: "v1".to_string(),
            staging_store: "staging_{version}.sqlite".to_string(),
            staging_report: "staging_{version}".to_string(),
            final_report: "results_{version}".to_string(),
        }
    }
}

/// Raw source file names, relative to the input directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SourcesConfig {
    /// Price file
    pub prices: String,
    /// Macro series file
    pub macro_rates: String,
    /// Sector table file
    pub sectors: String,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            prices: "stock_data.csv".to_string(),
            macro_rates: "estr.csv".to_string(),
            sectors: "companies.csv".to_string(),
        }
    }
}

/// Store table and report sheet names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TablesConfig {
    /// Price table
    pub prices: String,
    /// Macro table
    pub macro_rates: String,
    /// Sector table
    pub sectors: String,
    /// Unified results sheet
    pub results: String,
    /// Regression sheet
    pub regression: String,
    /// Dtype report sheet of the staging report
    pub dtype_report: String,
}

impl Default for TablesConfig {
    fn default() -> Self {
        let names = TableNames::default();
        Self {
            prices: names.prices,
            macro_rates: names.macro_rates,
            sectors: names.sectors,
            results: "results".to_string(),
            regression: "regression".to_string(),
            dtype_report: "dtypes".to_string(),
        }
    }
}

/// Layout of the raw macro file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MacroSeriesConfig {
    /// Observation period column
    pub date_column: String,
    /// Observation value column
    pub value_column: String,
    /// Indicator tag
    pub indicator: String,
}

impl Default for MacroSeriesConfig {
    fn default() -> Self {
        let layout = MacroLayout::default();
        Self {
            date_column: layout.date_column,
            value_column: layout.value_column,
            indicator: layout.indicator,
        }
    }
}

/// Staging behaviour of the ETL stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EtlConfig {
    /// Write the staging report
    pub write_staging_report: bool,
    /// Write the tables to the staging store
    pub write_store: bool,
    /// Drop every store table before writing
    pub drop_all_tables: bool,
    /// Append to existing tables instead of replacing them
    pub append: bool,
}

impl Default for EtlConfig {
    fn default() -> Self {
        Self {
            write_staging_report: true,
            write_store: true,
            drop_all_tables: false,
            append: false,
        }
    }
}

/// Stage toggles of the `run` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    /// Run the ETL stage
    pub etl: bool,
    /// Run the analysis stage
    pub analysis: bool,
    /// Sheet file format of both reports
    pub format: ExportFormat,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            etl: true,
            analysis: true,
            format: ExportFormat::Csv,
        }
    }
}

/// Columns each source must carry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MandatoryColumns {
    /// Price table
    pub prices: Vec<String>,
    /// Macro table
    pub macro_rates: Vec<String>,
    /// Sector table
    pub sectors: Vec<String>,
}

impl Default for MandatoryColumns {
    fn default() -> Self {
        Self {
            prices: vec![DATE.to_string(), TICKER.to_string(), ADJ_CLOSE.to_string()],
            macro_rates: vec![DATE.to_string(), INDICATOR.to_string(), VALUE.to_string()],
            sectors: vec![TICKER.to_string(), SECTOR.to_string()],
        }
    }
}

/// Complete pipeline configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Locations
    pub paths: PathsConfig,
    /// Raw file names
    pub sources: SourcesConfig,
    /// Table and sheet names
    pub tables: TablesConfig,
    /// Raw macro layout
    pub macro_series: MacroSeriesConfig,
    /// ETL behaviour
    pub etl: EtlConfig,
    /// Stage toggles
    pub run: RunConfig,
    /// Declared column types
    pub dtypes: TypeMap,
    /// Mandatory columns per source
    pub mandatory_columns: MandatoryColumns,
    /// Metric parameters
    pub metrics: MetricOptions,
    /// Pivot views, in output order
    pub pivots: Vec<PivotSpec>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            paths: PathsConfig::default(),
            sources: SourcesConfig::default(),
            tables: TablesConfig::default(),
            macro_series: MacroSeriesConfig::default(),
            etl: EtlConfig::default(),
            run: RunConfig::default(),
            dtypes: default_dtypes(),
            mandatory_columns: MandatoryColumns::default(),
            metrics: MetricOptions::default(),
            pivots: vec![PivotSpec::SectorMeans {
                name: "mean_by_sector".to_string(),
            }],
        }
    }
}

/// Column types declared when the config leaves `[dtypes]` out.
pub fn default_dtypes() -> TypeMap {
    let mut types = TypeMap::new();
    types.insert(DATE.to_string(), ColumnType::Datetime);
    types.insert(TICKER.to_string(), ColumnType::String);
    types.insert(ADJ_CLOSE.to_string(), ColumnType::Float);
    types.insert(VOLUME.to_string(), ColumnType::Integer);
    types.insert(INDICATOR.to_string(), ColumnType::String);
    types.insert(VALUE.to_string(), ColumnType::Float);
    types.insert(SECTOR.to_string(), ColumnType::String);
    types
}

impl Config {
    /// Load and validate a config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "Loaded config file");
        Self::from_toml(&content)
    }

    /// Parse and validate a config document.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check values that the types alone cannot.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.metrics
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;

        let sheets = [
            ("tables.prices", &self.tables.prices),
            ("tables.macro_rates", &self.tables.macro_rates),
            ("tables.sectors", &self.tables.sectors),
            ("tables.results", &self.tables.results),
            ("tables.regression", &self.tables.regression),
            ("tables.dtype_report", &self.tables.dtype_report),
        ];
        for (key, name) in sheets {
            check_name(key, name)?;
        }

        let store_tables: BTreeSet<&str> = [
            self.tables.prices.as_str(),
            self.tables.macro_rates.as_str(),
            self.tables.sectors.as_str(),
        ]
        .into_iter()
        .collect();
        if store_tables.len() != 3 {
            return Err(ConfigError::Invalid(
                "tables.prices, tables.macro_rates and tables.sectors must differ".to_string(),
            ));
        }

        for spec in &self.pivots {
            check_name("pivots.name", spec.name())?;
        }

        for (key, file) in [
            ("paths.staging_store", &self.paths.staging_store),
            ("paths.staging_report", &self.paths.staging_report),
            ("paths.final_report", &self.paths.final_report),
        ] {
            if file.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("{} must not be empty", key)));
            }
        }
        Ok(())
    }

    /// Store table names of the three sources.
    pub fn table_names(&self) -> TableNames {
        TableNames {
            prices: self.tables.prices.clone(),
            macro_rates: self.tables.macro_rates.clone(),
            sectors: self.tables.sectors.clone(),
        }
    }

    /// Raw macro layout.
    pub fn macro_layout(&self) -> MacroLayout {
        MacroLayout {
            date_column: self.macro_series.date_column.clone(),
            value_column: self.macro_series.value_column.clone(),
            indicator: self.macro_series.indicator.clone(),
        }
    }

    /// Mandatory columns keyed by store table name.
    pub fn mandatory_by_table(&self) -> BTreeMap<String, Vec<String>> {
        BTreeMap::from([
            (self.tables.prices.clone(), self.mandatory_columns.prices.clone()),
            (self.tables.macro_rates.clone(), self.mandatory_columns.macro_rates.clone()),
            (self.tables.sectors.clone(), self.mandatory_columns.sectors.clone()),
        ])
    }

    /// Resolve every location against `base`, substituting the version tag.
    pub fn resolve_paths(&self, base: &Path) -> ResolvedPaths {
        let paths = &self.paths;
        let input_dir = base.join(&paths.input_dir);
        let output_dir = base.join(&paths.output_dir);
        let versioned = |name: &str| output_dir.join(name.replace(VERSION_PLACEHOLDER, &paths.version));

        ResolvedPaths {
            staging_store: versioned(&paths.staging_store),
            staging_report: versioned(&paths.staging_report),
            final_report: versioned(&paths.final_report),
            input_dir,
            output_dir,
        }
    }
}

fn check_name(key: &str, name: &str) -> Result<(), ConfigError> {
    if name.trim().is_empty() {
        return Err(ConfigError::Invalid(format!("{} must not be empty", key)));
    }
    if name.contains(['/', '\\']) {
        return Err(ConfigError::Invalid(format!(
            "{} must not contain path separators: {:?}",
            key, name
        )));
    }
    Ok(())
}

/// Absolute locations used by one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPaths {
    /// Raw source directory
    pub input_dir: PathBuf,
    /// Output directory
    pub output_dir: PathBuf,
    /// Staging store file
    pub staging_store: PathBuf,
    /// Staging report directory
    pub staging_report: PathBuf,
    /// Final report directory
    pub final_report: PathBuf,
}

//! CAC 40 subset with sector classifications.

use crate::universe::sector::Sector;
use polars::prelude::*;
use ratelens_data::ingest::FIELD_DELIMITER;
use ratelens_data::schema::{SECTOR, TICKER};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::path::Path;
use tracing::info;

/// CAC 40 constituent with its sector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Constituent {
    /// Exchange ticker.
    pub ticker: String,
    /// Sector.
    pub sector: Sector,
}

impl Constituent {
    /// Create a new constituent.
    pub fn new(ticker: impl Into<String>, sector: Sector) -> Self {
        Self {
            ticker: ticker.into(),
            sector,
        }
    }
}

/// The seeded CAC 40 universe, in a fixed order.
#[derive(Debug, Clone)]
pub struct Cac40Universe {
    constituents: Vec<Constituent>,
}

impl Cac40Universe {
    /// Create the universe with its default constituents.
    pub fn new() -> Self {
        Self {
            constituents: Self::default_constituents(),
        }
    }

    /// Get all constituents.
    pub fn constituents(&self) -> &[Constituent] {
        &self.constituents
    }

    /// Get all tickers.
    pub fn tickers(&self) -> Vec<String> {
        self.constituents.iter().map(|c| c.ticker.clone()).collect()
    }

    /// Get the sector of a ticker.
    pub fn sector(&self, ticker: &str) -> Option<Sector> {
        self.constituents
            .iter()
            .find(|c| c.ticker == ticker)
            .map(|c| c.sector)
    }

    /// Get the count of constituents per sector.
    pub fn sector_counts(&self) -> BTreeMap<Sector, usize> {
        let mut counts = BTreeMap::new();
        for constituent in &self.constituents {
            *counts.entry(constituent.sector).or_insert(0) += 1;
        }
        counts
    }

    /// The sector table, `Ticker` and `Sector` columns in constituent order.
    pub fn to_frame(&self) -> PolarsResult<DataFrame> {
        let tickers: Vec<&str> = self.constituents.iter().map(|c| c.ticker.as_str()).collect();
        let sectors: Vec<&str> = self.constituents.iter().map(|c| c.sector.label()).collect();
        DataFrame::new(vec![
            Column::new(TICKER.into(), tickers),
            Column::new(SECTOR.into(), sectors),
        ])
    }

    /// Write the sector table as a semicolon-delimited file.
    pub fn write_sector_file(&self, path: &Path) -> PolarsResult<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let mut frame = self.to_frame()?;
        let mut file = File::create(path)?;
        CsvWriter::new(&mut file)
            .include_header(true)
            .with_separator(FIELD_DELIMITER)
            .finish(&mut frame)?;
        info!(path = %path.display(), rows = frame.height(), "Wrote sector table");
        Ok(())
    }

    fn default_constituents() -> Vec<Constituent> {
        vec![
            Constituent::new("MC.PA", Sector::Luxury),
            Constituent::new("TTE.PA", Sector::Energy),
            Constituent::new("BNP.PA", Sector::Banking),
            Constituent::new("AIR.PA", Sector::Aerospace),
            Constituent::new("SAN.PA", Sector::Healthcare),
            Constituent::new("ORA.PA", Sector::Telecom),
            Constituent::new("DG.PA", Sector::Construction),
            Constituent::new("CA.PA", Sector::Retail),
        ]
    }
}

impl Default for Cac40Universe {
    fn default() -> Self {
        Self::new()
    }
}

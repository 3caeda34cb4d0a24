//! Static stock universe.
//!
//! The CAC 40 subset the pipeline is seeded with, and its sector table.

pub mod cac40;
pub mod sector;

pub use cac40::{Cac40Universe, Constituent};
pub use sector::Sector;

/// Trait for stock universes.
pub trait Universe {
    /// Get all tickers in the universe.
    fn tickers(&self) -> Vec<String>;

    /// Check if a ticker is in the universe.
    fn contains(&self, ticker: &str) -> bool {
        self.tickers().iter().any(|t| t == ticker)
    }

    /// Get the number of constituents.
    fn size(&self) -> usize {
        self.tickers().len()
    }
}

impl Universe for Cac40Universe {
    fn tickers(&self) -> Vec<String> {
        self.tickers()
    }
}

//! Sector classification of the seeded universe.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Sector of a CAC 40 constituent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Sector {
    /// Luxury goods
    Luxury,

    /// Oil and gas
    Energy,

    /// Banking
    Banking,

    /// Aerospace
    Aerospace,

    /// Pharmaceuticals and health care
    Healthcare,

    /// Telecommunications
    Telecom,

    /// Construction and concessions
    Construction,

    /// Food retail
    Retail,
}

impl Sector {
    /// Returns all sectors.
    pub fn all() -> Vec<Self> {
        vec![
            Self::Luxury,
            Self::Energy,
            Self::Banking,
            Self::Aerospace,
            Self::Healthcare,
            Self::Telecom,
            Self::Construction,
            Self::Retail,
        ]
    }

    /// Label written to the `Sector` column of the sector table.
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Luxury => "Luxe",
            Self::Energy => "Energie",
            Self::Banking => "Banque",
            Self::Aerospace => "Aeronautique",
            Self::Healthcare => "Sante",
            Self::Telecom => "Telecom",
            Self::Construction => "BTP",
            Self::Retail => "Distribution",
        }
    }

    /// Returns the English sector name.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Luxury => "Luxury",
            Self::Energy => "Energy",
            Self::Banking => "Banking",
            Self::Aerospace => "Aerospace",
            Self::Healthcare => "Healthcare",
            Self::Telecom => "Telecom",
            Self::Construction => "Construction",
            Self::Retail => "Retail",
        }
    }
}

impl fmt::Display for Sector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl FromStr for Sector {
    type Err = String;

    /// Accepts either the table label or the English name, case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Self::all()
            .into_iter()
            .find(|sector| sector.label().eq_ignore_ascii_case(s) || sector.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("Unknown sector: {}", s))
    }
}

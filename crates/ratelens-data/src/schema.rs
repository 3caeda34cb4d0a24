//! Column names shared by every pipeline stage.

/// Calendar date of an observation.
pub const DATE: &str = "Date";
/// Ticker identifier.
pub const TICKER: &str = "Ticker";
/// Adjusted close price.
pub const ADJ_CLOSE: &str = "Adj Close";
/// Traded volume.
pub const VOLUME: &str = "Volume";
/// Macro indicator tag.
pub const INDICATOR: &str = "Indicator";
/// Macro observation value (the rate level).
pub const VALUE: &str = "Value";
/// Sector of a ticker.
pub const SECTOR: &str = "Sector";
/// Per-ticker percentage change of the adjusted close.
pub const RETURN: &str = "Return";
/// Day-over-day change of the rate.
pub const DELTA_RATE: &str = "DeltaRate";
/// Rolling standard deviation of returns.
pub const VOLATILITY: &str = "Volatility";

/// Columns of the transformed macro table, in order.
pub const MACRO_COLUMNS: [&str; 3] = [DATE, INDICATOR, VALUE];

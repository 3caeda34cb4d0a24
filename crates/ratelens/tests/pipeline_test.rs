//! End-to-end runs of both stages against files on disk.

use ratelens::data::TableStore;
use ratelens::output::read_sheet_index;
use ratelens::{Cac40Universe, Config, PipelineError, run_analysis, run_etl};
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

const DAYS: u32 = 28;

fn write_inputs(input: &Path, universe: &Cac40Universe) {
    fs::create_dir_all(input).unwrap();

    let mut prices = String::from("Date;Ticker;Adj Close;Volume\n");
    for (t, ticker) in universe.tickers().iter().enumerate() {
        for d in 0..DAYS {
            let wiggle = ((d * 13 + t as u32 * 5) % 9) as f64 - 4.0;
            let close = 50.0 + t as f64 * 10.0 + d as f64 * 0.3 + wiggle * 0.7;
            writeln!(prices, "2024-02-{:02};{};{:.2};{}", d + 1, ticker, close, 1000 + d).unwrap();
        }
    }
    fs::write(input.join("stock_data.csv"), prices).unwrap();

    let mut rates = String::from("TIME_PERIOD;OBS_VALUE;TITLE\n");
    for d in 0..DAYS {
        let rate = 3.9 + ((d * 3) % 5) as f64 * 0.01;
        writeln!(rates, "2024-02-{:02} 00:00:00;{:.3};Euro short-term rate", d + 1, rate).unwrap();
    }
    fs::write(input.join("estr.csv"), rates).unwrap();

    universe
        .write_sector_file(&input.join("companies.csv"))
        .unwrap();
}

fn config() -> Config {
    Config::from_toml(
        r#"
        [paths]
        version = "test"

        [metrics]
        volatility_window = 5

        [[pivots]]
        kind = "sector_means"
        name = "mean_by_sector"

        [[pivots]]
        kind = "standard"
        name = "volume_by_sector"
        index = ["Sector"]
        values = ["Volume"]
        aggfunc = "sum"
        "#,
    )
    .unwrap()
}

#[test]
fn test_etl_then_analysis() {
    let dir = tempfile::tempdir().unwrap();
    let universe = Cac40Universe::new();
    let config = config();
    let paths = config.resolve_paths(dir.path());
    write_inputs(&paths.input_dir, &universe);

    let etl = run_etl(&config, &paths).unwrap();
    assert!(etl.sanity.is_complete());
    assert_eq!(etl.tables.prices.height(), 8 * DAYS as usize);
    assert_eq!(etl.tables.macro_rates.width(), 3);
    assert!(paths.staging_store.ends_with("staging_test.sqlite"));
    assert_eq!(etl.store.as_deref(), Some(paths.staging_store.as_path()));

    let staged = TableStore::open(&paths.staging_store).unwrap();
    assert_eq!(staged.table_names().unwrap(), vec!["companies", "macro", "stock"]);
    drop(staged);

    assert_eq!(
        read_sheet_index(&paths.staging_report).unwrap(),
        vec!["stock", "macro", "companies", "dtypes"]
    );

    let (analysis, written) = run_analysis(&config, &paths).unwrap();
    assert_eq!(analysis.metrics.unified.height(), 8 * DAYS as usize);
    assert_eq!(analysis.pivots.len(), 2);
    assert_eq!(written.len(), 4);
    assert_eq!(
        read_sheet_index(&paths.final_report).unwrap(),
        vec!["results", "regression", "mean_by_sector", "volume_by_sector"]
    );

    let regression = fs::read_to_string(paths.final_report.join("regression.csv")).unwrap();
    assert!(regression.starts_with("Variable,Coefficient,P-value,T-stat"));
    assert!(regression.contains("\nDeltaRate,"));
    assert!(regression.contains("\nR-squared,"));

    let means = analysis.pivot("mean_by_sector").unwrap();
    assert_eq!(means.frame.height(), 8);
}

#[test]
fn test_etl_append_doubles_rows() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config();
    config.etl.write_staging_report = false;
    let paths = config.resolve_paths(dir.path());
    write_inputs(&paths.input_dir, &Cac40Universe::new());

    run_etl(&config, &paths).unwrap();
    config.etl.append = true;
    let etl = run_etl(&config, &paths).unwrap();
    assert!(etl.report.is_empty());

    let store = TableStore::open(&paths.staging_store).unwrap();
    assert_eq!(store.read_table("stock").unwrap().height(), 2 * 8 * DAYS as usize);
    assert!(!paths.staging_report.exists());
}

#[test]
fn test_missing_source_aborts() {
    let dir = tempfile::tempdir().unwrap();
    let config = config();
    let paths = config.resolve_paths(dir.path());

    let err = run_etl(&config, &paths).unwrap_err();
    assert!(matches!(err, PipelineError::Data(_)));
}

#[test]
fn test_analysis_without_store_fails() {
    let dir = tempfile::tempdir().unwrap();
    let config = config();
    let paths = config.resolve_paths(dir.path());

    let err = run_analysis(&config, &paths).unwrap_err();
    assert!(matches!(err, PipelineError::Data(_)));
}

//! Integration tests for extraction, transformation and staging.

use polars::prelude::*;
use ratelens_data::{
    ColumnType, MacroLayout, SourceFiles, TableNames, TableStore, TypeMap, WriteMode, coerce,
    extract, sanity_check, transform,
};
use std::collections::BTreeMap;
use std::fs;

fn write_sources(dir: &std::path::Path) -> SourceFiles {
    fs::write(
        dir.join("stock.csv"),
        "Date;Ticker;Adj Close;Volume\n\
         2024-01-02;MC.PA;700.0;1000\n\
         2024-01-03;MC.PA;707.0;1100\n\
         2024-01-02;BNP.PA;60.0;5000\n\
         2024-01-03;BNP.PA;oops;5100\n",
    )
    .unwrap();
    fs::write(
        dir.join("estr.csv"),
        "TIME_PERIOD;OBS_VALUE;TITLE\n\
         2024-01-02 00:00:00;3.90;Euro short-term rate\n\
         2024-01-03 00:00:00;3.91;Euro short-term rate\n",
    )
    .unwrap();
    fs::write(
        dir.join("companies.csv"),
        "Ticker;Sector\nMC.PA;Luxury\nBNP.PA;Banking\n",
    )
    .unwrap();
    SourceFiles::in_dir(dir, "stock.csv", "estr.csv", "companies.csv")
}

fn declared_types() -> TypeMap {
    [
        ("Date", ColumnType::Datetime),
        ("Ticker", ColumnType::String),
        ("Adj Close", ColumnType::Float),
        ("Volume", ColumnType::Integer),
        ("Indicator", ColumnType::String),
        ("Value", ColumnType::Float),
        ("Sector", ColumnType::String),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
}

#[test]
fn test_extract_transform_stage_reload() {
    let dir = tempfile::tempdir().unwrap();
    let files = write_sources(dir.path());

    let raw = extract(&files).unwrap();
    let tables = transform(&raw, &MacroLayout::default()).unwrap();
    let names = TableNames::default();

    let mut mandatory = BTreeMap::new();
    mandatory.insert(
        names.prices.clone(),
        vec!["Date".to_string(), "Ticker".to_string(), "Adj Close".to_string()],
    );
    let report = sanity_check(&tables.named(&names), &mandatory).unwrap();
    assert!(report.is_complete());

    let store = TableStore::open(dir.path().join("staging/ratelens.db")).unwrap();
    store
        .write_tables(tables.named(&names), WriteMode::Replace)
        .unwrap();
    assert_eq!(
        store.table_names().unwrap(),
        vec!["companies", "macro", "stock"]
    );

    let types = declared_types();
    for (name, df) in tables.named(&names) {
        let expected = coerce(df.clone(), &types).unwrap();
        let reloaded = coerce(store.read_table(name).unwrap(), &types).unwrap();
        assert!(
            reloaded.equals_missing(&expected),
            "table {name} changed across the store"
        );
    }
}

#[test]
fn test_unparseable_price_becomes_null() {
    let dir = tempfile::tempdir().unwrap();
    let raw = extract(&write_sources(dir.path())).unwrap();

    let prices = coerce(raw.prices, &declared_types()).unwrap();
    let closes = prices.column("Adj Close").unwrap().as_materialized_series();
    assert_eq!(closes.dtype(), &DataType::Float64);
    assert_eq!(closes.null_count(), 1);
}

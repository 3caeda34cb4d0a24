//! Command handlers.

use ratelens::model::PivotSpec;
use ratelens::output::{frame_table, regression_table, sector_means_table};
use ratelens::{Cac40Universe, Config, ResolvedPaths, run_analysis, run_etl};
use std::path::Path;

/// Rows of the unified table echoed to the console.
const PREVIEW_ROWS: usize = 10;

pub(crate) fn etl(config: &Config, paths: &ResolvedPaths) -> ratelens::Result<()> {
    let outcome = run_etl(config, paths)?;

    println!("\nStaged tables");
    for (name, rows, columns) in &outcome.sanity.shapes {
        println!("  {:<16} {:>8} rows {:>4} columns", name, rows, columns);
    }
    for (table, missing) in &outcome.sanity.missing {
        if !missing.is_empty() {
            println!("  {} is missing: {}", table, missing.join(", "));
        }
    }
    if let Some(store) = &outcome.store {
        println!("Store:  {}", store.display());
    }
    if !outcome.report.is_empty() {
        println!("Report: {}", paths.staging_report.display());
    }
    Ok(())
}

pub(crate) fn analyze(config: &Config, paths: &ResolvedPaths) -> ratelens::Result<()> {
    let (analysis, written) = run_analysis(config, paths)?;
    let metrics = &analysis.metrics;

    print!(
        "{}",
        frame_table("Unified results", &metrics.unified, PREVIEW_ROWS)?
    );
    match metrics.correlation {
        Some(r) => println!("\nCorrelation(Return, DeltaRate) = {:.4}", r),
        None => println!("\nCorrelation(Return, DeltaRate) is undefined"),
    }
    print!("{}", regression_table(&metrics.regression));

    let sector_views = config.pivots.iter().filter_map(|spec| match spec {
        PivotSpec::SectorMeans { name } => analysis.pivot(name),
        PivotSpec::Standard { .. } => None,
    });
    for pivot in sector_views {
        print!("{}", sector_means_table(&pivot.frame)?);
    }

    println!(
        "\nReport: {} ({} sheets)",
        paths.final_report.display(),
        written.len()
    );
    Ok(())
}

pub(crate) fn sectors(output: &Path) -> ratelens::Result<()> {
    let universe = Cac40Universe::new();
    universe.write_sector_file(output)?;
    println!(
        "Wrote {} constituents to {}",
        universe.constituents().len(),
        output.display()
    );
    Ok(())
}

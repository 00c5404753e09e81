use clap::Parser;
use lib::{
    BatchOutcome, ConvertConfig, PipelineError, SimpleLogger, TimeSeriesTable, Variable,
    check_all, convert_discharge, convert_discharge_stations, convert_met, convert_met_stations,
    coverage, monthly_means, write_stations_csv, write_stations_json, write_summary_csv,
    write_table_csv, write_table_parquet, yearly_total_stats, yearly_totals,
};
use log::{debug, info, warn};
use std::fs;
use std::path::PathBuf;
use std::time::Instant;

static LOGGER: SimpleLogger = SimpleLogger;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Project data root (contains discharge/, prec/, temp/ and station_loc.txt)
    #[arg(short, long)]
    input_dir: PathBuf,

    /// Directory the converted tables are written to
    #[arg(short, long, default_value = "conv_data")]
    output_dir: PathBuf,

    /// Relative tolerance for the discharge summary check
    #[arg(long, default_value_t = 0.01)]
    rtol: f64,

    /// Also write each time-series table as Parquet
    #[arg(long, default_value_t = false)]
    parquet: bool,

    /// Check every discharge report against its printed monthly summary
    #[arg(long, default_value_t = false)]
    check: bool,

    /// Log level for output
    #[arg(long, default_value = "false")]
    debug: bool,
}

/// Writes a table with its monthly-mean and coverage summaries.
///
/// Amount-like variables (precipitation, discharge) average only positive
/// values and also get yearly totals, kept when above `yearly_min`.
fn write_series_outputs(
    config: &ConvertConfig,
    name: &str,
    table: &TimeSeriesTable,
    yearly_min: Option<f64>,
) -> Result<(), PipelineError> {
    let csv_path = config.output_path(&format!("{}.csv", name));
    write_table_csv(table, &csv_path)?;
    debug!("  - {}", csv_path.display());

    let monthly_path = config.output_path(&format!("{}_monthly.csv", name));
    write_summary_csv(&monthly_means(table, yearly_min.is_some()), &monthly_path)?;
    debug!("  - {}", monthly_path.display());

    if let Some(min_total) = yearly_min {
        let totals = yearly_totals(table, min_total);
        let yearly_path = config.output_path(&format!("{}_yearly.csv", name));
        write_summary_csv(&totals, &yearly_path)?;
        debug!("  - {}", yearly_path.display());

        let stats_path = config.output_path(&format!("{}_yearly_summary.csv", name));
        write_summary_csv(&yearly_total_stats(&totals), &stats_path)?;
        debug!("  - {}", stats_path.display());
    }

    let coverage_path = config.output_path(&format!("{}_coverage.csv", name));
    write_summary_csv(&coverage(table), &coverage_path)?;
    debug!("  - {}", coverage_path.display());

    if config.parquet {
        let parquet_path = config.output_path(&format!("{}.parquet", name));
        write_table_parquet(table, &parquet_path)?;
        debug!("  - {}", parquet_path.display());
    }
    Ok(())
}

/// Keeps the value, moves the failures into the run-wide list.
fn collect<T>(outcome: BatchOutcome<T>, failures: &mut Vec<(PathBuf, PipelineError)>) -> T {
    failures.extend(outcome.failures);
    outcome.value
}

fn main() -> Result<(), PipelineError> {
    // Initialize timer and logger
    let total_start = Instant::now();
    log::set_logger(&LOGGER).map_err(|e| PipelineError::Data(e.to_string()))?;

    // Acquire CLI args
    let args = Args::parse();
    if args.debug {
        log::set_max_level(log::LevelFilter::Debug);
    } else {
        log::set_max_level(log::LevelFilter::Info);
    }

    let config = ConvertConfig {
        rtol: args.rtol,
        parquet: args.parquet,
        check: args.check,
        ..ConvertConfig::new(&args.input_dir, &args.output_dir)
    };

    println!("Basin data conversion");
    debug!("Configuration: {:?}", config);
    fs::create_dir_all(&config.output_dir)?;

    let mut failures: Vec<(PathBuf, PipelineError)> = Vec::new();

    // Station information
    let stations_start = Instant::now();
    let met_stations = match convert_met_stations(&config.layout) {
        Ok(rows) => rows,
        Err(e) => {
            warn!("Meteorological station reference not converted: {}", e);
            failures.push((config.layout.station_reference(), e));
            Vec::new()
        }
    };
    write_stations_csv(&met_stations, &config.output_path("met_stations.csv"))?;
    let hyd_stations = collect(convert_discharge_stations(&config.layout)?, &mut failures);
    write_stations_csv(&hyd_stations, &config.output_path("hyd_stations.csv"))?;
    write_stations_json(&hyd_stations, &config.output_path("hyd_stations.json"))?;
    println!(
        "Station tables written in {:.2?} | {} meteorological, {} discharge",
        stations_start.elapsed(),
        met_stations.len(),
        hyd_stations.len()
    );

    // Station data
    for (name, variable, yearly_min) in [
        ("prec", Variable::Precipitation, Some(5.0)),
        ("temp", Variable::Temperature, None),
    ] {
        let start = Instant::now();
        let table = collect(convert_met(&config.layout, variable)?, &mut failures);
        write_series_outputs(&config, name, &table, yearly_min)?;
        println!(
            "{} converted in {:.2?} | {} columns, {} dates",
            name,
            start.elapsed(),
            table.columns.len(),
            table.rows.len()
        );
    }

    let discharge_start = Instant::now();
    let discharge = collect(convert_discharge(&config.layout)?, &mut failures);
    write_series_outputs(&config, "discharge", &discharge, Some(0.0))?;
    println!(
        "discharge converted in {:.2?} | {} stations, {} dates",
        discharge_start.elapsed(),
        discharge.columns.len(),
        discharge.rows.len()
    );

    let mut mismatches = 0;
    if config.check {
        let check_start = Instant::now();
        // Unreadable reports were already counted by the conversion above.
        let reports = check_all(&config.layout, config.rtol)?.value;
        for report in &reports {
            if !report.skipped.is_empty() {
                debug!(
                    "Station {} {}: months {:?} not checked (missing values)",
                    report.station_id, report.year, report.skipped
                );
            }
            for mismatch in &report.mismatches {
                warn!("Mismatch: {}", mismatch);
                mismatches += 1;
            }
        }
        println!(
            "Checked {} reports in {:.2?} | {} mismatches",
            reports.len(),
            check_start.elapsed(),
            mismatches
        );
    }

    println!("\nWrote files to directory: {}", config.output_dir.display());
    println!("Total runtime: {:.2?}", total_start.elapsed());

    if !failures.is_empty() {
        for (path, e) in &failures {
            warn!("{}: {}", path.display(), e);
        }
        return Err(PipelineError::Data(format!(
            "{} input files could not be converted",
            failures.len()
        )));
    }
    if mismatches > 0 {
        return Err(PipelineError::Data(format!(
            "{} statistics disagree with the report summaries",
            mismatches
        )));
    }
    info!("Conversion completed successfully");
    Ok(())
}

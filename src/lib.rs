pub mod check;
pub mod discharge;
pub mod error;
pub mod load;
pub mod met;
pub mod stations;
pub mod structs;
pub mod transform;

// Re-export public API
pub use check::{AggregateMismatch, CheckReport, check_all, check_file};
pub use discharge::{DischargeReport, convert_discharge, parse_report, read_report};
pub use error::{PipelineError, Result};
pub use load::{
    write_stations_csv, write_stations_json, write_summary_csv, write_table_csv,
    write_table_parquet,
};
pub use met::convert_met;
pub use stations::{convert_discharge_stations, convert_met_stations};
pub use structs::{
    ConvertConfig, DataLayout, DischargeRecord, MonthlyStat, Series, SimpleLogger, StationHeader,
    StationRow, Variable,
};
pub use transform::{
    BatchOutcome, SummaryTable, TimeSeriesTable, coverage, monthly_means, yearly_total_stats,
    yearly_totals,
};

use chrono::NaiveDate;
use log::{Log, Metadata, Record as LogRecord};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Simple logger implementation writing to stderr
pub struct SimpleLogger;

impl Log for SimpleLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &LogRecord) {
        if self.enabled(record.metadata()) {
            eprintln!("[{}] {}", record.level(), record.args());
        }
    }

    fn flush(&self) {}
}

/// Identity and location of a discharge gauge, taken from the first three
/// lines of a report file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationHeader {
    pub station_id: u32,
    pub station_name: String,
    pub latitude: f64,
    pub longitude: f64,
}

/// One daily discharge value. `None` means the report carried `NA`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DischargeRecord {
    pub date: NaiveDate,
    pub value: Option<f64>,
}

/// Min/max/mean of one calendar month, each absent when it cannot be known.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MonthlyStat {
    pub month: u32,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub mean: Option<f64>,
}

/// Row of a station table (`id,Name,Latitude,Longitude,Altitude`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationRow {
    pub id: String,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Latitude")]
    pub latitude: f64,
    #[serde(rename = "Longitude")]
    pub longitude: f64,
    #[serde(rename = "Altitude")]
    pub altitude: Option<f64>,
}

impl StationRow {
    /// Ordering key: numeric ids first in numeric order, anything else after.
    pub fn sort_key(&self) -> (bool, u64, &str) {
        match self.id.parse::<u64>() {
            Ok(n) => (false, n, self.id.as_str()),
            Err(_) => (true, 0, self.id.as_str()),
        }
    }
}

/// A single named column of date-keyed optional values.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Series {
    pub name: String,
    pub values: BTreeMap<NaiveDate, Option<f64>>,
}

impl Series {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            values: BTreeMap::new(),
        }
    }

    /// Appends another part of the same column (e.g. the next year's file).
    /// On overlapping dates the later part wins.
    pub fn extend(&mut self, other: Series) {
        self.values.extend(other.values);
    }

    pub fn get(&self, date: &NaiveDate) -> Option<f64> {
        self.values.get(date).copied().flatten()
    }
}

/// Meteorological variable stored under its own input sub-directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variable {
    Precipitation,
    Temperature,
}

impl Variable {
    pub fn dir_name(&self) -> &'static str {
        match self {
            Variable::Precipitation => "prec",
            Variable::Temperature => "temp",
        }
    }
}

/// Locations of the input data below a project root.
#[derive(Debug, Clone)]
pub struct DataLayout {
    pub root: PathBuf,
}

impl DataLayout {
    pub fn from_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn discharge_dir(&self) -> PathBuf {
        self.root.join("discharge")
    }

    /// Folder holding the yearly reports of one discharge station.
    pub fn daily_discharge_dir(&self, station: &str) -> PathBuf {
        self.discharge_dir().join(station).join("Daily Discharge")
    }

    pub fn met_dir(&self, variable: Variable) -> PathBuf {
        self.root.join(variable.dir_name())
    }

    pub fn station_reference(&self) -> PathBuf {
        self.root.join("station_loc.txt")
    }
}

/// Configuration for one conversion run
#[derive(Debug, Clone)]
pub struct ConvertConfig {
    pub layout: DataLayout,
    pub output_dir: PathBuf,
    pub rtol: f64,
    pub parquet: bool,
    pub check: bool,
}

impl ConvertConfig {
    pub fn output_path(&self, file_name: &str) -> PathBuf {
        self.output_dir.join(file_name)
    }

    pub fn new(input_dir: &Path, output_dir: &Path) -> Self {
        Self {
            layout: DataLayout::from_root(input_dir),
            output_dir: output_dir.to_path_buf(),
            ..Self::default()
        }
    }
}

impl Default for ConvertConfig {
    fn default() -> Self {
        Self {
            layout: DataLayout::from_root("project_data"),
            output_dir: PathBuf::from("conv_data"),
            rtol: 0.01,
            parquet: false,
            check: false,
        }
    }
}

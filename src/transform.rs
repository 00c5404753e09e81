use crate::error::{PipelineError, Result};
use crate::structs::Series;
use chrono::{Datelike, NaiveDate};
use log::{debug, warn};
use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

/// Result of a batch step that tolerates per-file failures.
#[derive(Debug)]
pub struct BatchOutcome<T> {
    pub value: T,
    pub failures: Vec<(PathBuf, PipelineError)>,
}

impl<T> BatchOutcome<T> {
    pub fn new(value: T) -> Self {
        Self {
            value,
            failures: Vec::new(),
        }
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Parses every path in parallel, keeping successes in input order.
///
/// Each file is independent and read-only, so the fan-out shares no state.
/// Failures are logged and returned next to the path that produced them
/// instead of aborting the batch.
///
/// # Arguments
/// * `paths` - Files to parse
/// * `parse` - Per-file parser
///
/// # Returns
/// A tuple of `(path, value)` successes and `(path, error)` failures.
pub fn parse_all<T, F>(
    paths: &[PathBuf],
    parse: F,
) -> (Vec<(PathBuf, T)>, Vec<(PathBuf, PipelineError)>)
where
    T: Send,
    F: Fn(&Path) -> Result<T> + Sync,
{
    let results: Vec<(PathBuf, Result<T>)> = paths
        .par_iter()
        .map(|path| (path.clone(), parse(path.as_path())))
        .collect();

    let mut parsed = Vec::with_capacity(results.len());
    let mut failures = Vec::new();
    for (path, result) in results {
        match result {
            Ok(value) => parsed.push((path, value)),
            Err(e) => {
                warn!("Failed to parse {}: {}", path.display(), e);
                failures.push((path, e));
            }
        }
    }
    (parsed, failures)
}

/// Names of the immediate sub-directories of `dir`, sorted.
pub fn list_subdirs(dir: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    names.sort();
    Ok(names)
}

/// Regular files directly inside `dir`, sorted by file name.
pub fn list_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

/// Date-indexed table with one column per series (outer union of dates).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimeSeriesTable {
    pub columns: Vec<String>,
    /// One cell per column, in `columns` order.
    pub rows: BTreeMap<NaiveDate, Vec<Option<f64>>>,
}

impl TimeSeriesTable {
    /// Unions series on the date axis. Series sharing a name are merged into
    /// one column; dates absent from a series are missing in its column.
    pub fn from_series(series: impl IntoIterator<Item = Series>) -> Self {
        let mut merged: Vec<Series> = Vec::new();
        for s in series {
            match merged.iter_mut().find(|m| m.name == s.name) {
                Some(existing) => existing.extend(s),
                None => merged.push(s),
            }
        }

        let dates: BTreeSet<NaiveDate> = merged
            .iter()
            .flat_map(|s| s.values.keys().copied())
            .collect();
        let rows = dates
            .into_iter()
            .map(|date| (date, merged.iter().map(|s| s.get(&date)).collect()))
            .collect();

        Self {
            columns: merged.into_iter().map(|s| s.name).collect(),
            rows,
        }
    }
}

/// Small labelled table (months, years or statistics by column), used for summaries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SummaryTable {
    pub index_name: String,
    pub columns: Vec<String>,
    pub rows: Vec<(String, Vec<Option<f64>>)>,
}

impl SummaryTable {
    pub fn get(&self, key: &str, column: &str) -> Option<f64> {
        let col = self.columns.iter().position(|c| c == column)?;
        let (_, cells) = self.rows.iter().find(|(k, _)| k == key)?;
        cells[col]
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Calculates the mean per calendar month for every column.
///
/// Missing cells are skipped, and so are values `<= 0` when `positive_only`
/// is set (dry days and zero flow for precipitation and discharge).
/// A month with no remaining value stays missing.
///
/// # Returns
/// A table with rows for months 1-12 across all years of the input.
pub fn monthly_means(table: &TimeSeriesTable, positive_only: bool) -> SummaryTable {
    let mut buckets: Vec<Vec<Vec<f64>>> = vec![vec![Vec::new(); table.columns.len()]; 12];
    for (date, cells) in &table.rows {
        let month = date.month0() as usize;
        for (col, cell) in cells.iter().enumerate() {
            match cell {
                Some(v) if !positive_only || *v > 0.0 => buckets[month][col].push(*v),
                _ => {}
            }
        }
    }

    let rows = buckets
        .iter()
        .enumerate()
        .map(|(month, cols)| ((month + 1).to_string(), cols.iter().map(|v| mean(v)).collect()))
        .collect();

    debug!("Computed monthly means for {} columns", table.columns.len());
    SummaryTable {
        index_name: "month".to_string(),
        columns: table.columns.clone(),
        rows,
    }
}

fn days_in_year(year: i32) -> u32 {
    NaiveDate::from_ymd_opt(year, 12, 31)
        .map(|d| d.ordinal())
        .unwrap_or(365)
}

fn year_span(table: &TimeSeriesTable) -> Option<(i32, i32)> {
    let first = table.rows.keys().next()?;
    let last = table.rows.keys().next_back()?;
    Some((first.year(), last.year()))
}

/// Fraction of calendar days with a present value, per column and year.
///
/// Years run from the first to the last year in the table; a year without any
/// row yields 0.0 for every column.
pub fn coverage(table: &TimeSeriesTable) -> SummaryTable {
    let mut counts: BTreeMap<i32, Vec<u32>> = match year_span(table) {
        Some((first, last)) => (first..=last)
            .map(|y| (y, vec![0; table.columns.len()]))
            .collect(),
        None => BTreeMap::new(),
    };
    for (date, cells) in &table.rows {
        if let Some(year_counts) = counts.get_mut(&date.year()) {
            for (count, cell) in year_counts.iter_mut().zip(cells) {
                if cell.is_some() {
                    *count += 1;
                }
            }
        }
    }

    let rows = counts
        .into_iter()
        .map(|(year, cols)| {
            let days = days_in_year(year) as f64;
            (
                year.to_string(),
                cols.into_iter().map(|c| Some(c as f64 / days)).collect(),
            )
        })
        .collect();

    SummaryTable {
        index_name: "year".to_string(),
        columns: table.columns.clone(),
        rows,
    }
}

/// Sum of present values per column and year.
///
/// Totals not above `min_total` are missing.
pub fn yearly_totals(table: &TimeSeriesTable, min_total: f64) -> SummaryTable {
    let mut sums: BTreeMap<i32, Vec<f64>> = BTreeMap::new();
    for (date, cells) in &table.rows {
        let year_sums = sums
            .entry(date.year())
            .or_insert_with(|| vec![0.0; table.columns.len()]);
        for (sum, cell) in year_sums.iter_mut().zip(cells) {
            *sum += cell.unwrap_or(0.0);
        }
    }

    let rows = sums
        .into_iter()
        .map(|(year, cols)| {
            (
                year.to_string(),
                cols.into_iter().map(|t| (t > min_total).then_some(t)).collect(),
            )
        })
        .collect();

    SummaryTable {
        index_name: "year".to_string(),
        columns: table.columns.clone(),
        rows,
    }
}

/// Mean and maximum of the yearly totals of every column, skipping missing years.
pub fn yearly_total_stats(totals: &SummaryTable) -> SummaryTable {
    let per_column: Vec<Vec<f64>> = (0..totals.columns.len())
        .map(|col| totals.rows.iter().filter_map(|(_, cells)| cells[col]).collect())
        .collect();

    let means = per_column.iter().map(|v| mean(v)).collect();
    let maxima = per_column
        .iter()
        .map(|v| v.iter().copied().reduce(f64::max))
        .collect();

    SummaryTable {
        index_name: "statistic".to_string(),
        columns: totals.columns.clone(),
        rows: vec![("mean".to_string(), means), ("max".to_string(), maxima)],
    }
}

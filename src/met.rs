use crate::error::{PipelineError, Result};
use crate::structs::{DataLayout, Series, Variable};
use crate::transform::{BatchOutcome, TimeSeriesTable, list_files, list_subdirs, parse_all};
use chrono::NaiveDate;
use log::{debug, info, warn};
use std::fs;
use std::path::{Path, PathBuf};

/// Data not available.
const NOT_AVAILABLE: &str = "DNA";
/// Trace amount of rain.
const TRACE: &str = "T";
/// Precipitation recorded for a trace.
const TRACE_PRECIPITATION: f64 = 0.2;
/// Numeric missing-value marker.
const MISSING_VALUE: f64 = -99.9;

/// Year encoded in the two-digit file extension (`.69` is 1969, `.05` is 2005).
pub fn year_from_path(path: &Path) -> Result<i32> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .ok_or_else(|| PipelineError::Data(format!("no year extension on {}", path.display())))?;
    let yy = ext
        .trim()
        .parse::<i32>()
        .map_err(|_| PipelineError::Data(format!("bad year extension '{}'", ext)))?;
    Ok(if yy < 30 { 2000 + yy } else { 1900 + yy })
}

/// Column name of a station: its directory name without leading zeros.
pub fn column_name(station: &str) -> String {
    station.trim_start_matches('0').to_string()
}

/// Data lines of a file: drops `skip` header lines and the trailing footer line.
fn body_lines(text: &str, skip: usize) -> Vec<(usize, &str)> {
    let mut lines: Vec<(usize, &str)> = text
        .lines()
        .enumerate()
        .skip(skip)
        .filter(|(_, line)| !line.trim().is_empty())
        .collect();
    lines.pop();
    lines
}

fn day_of_year(year: i32, token: &str, line: usize) -> Result<NaiveDate> {
    token
        .parse::<u32>()
        .ok()
        .and_then(|doy| NaiveDate::from_yo_opt(year, doy))
        .ok_or_else(|| PipelineError::UnexpectedToken {
            line: line + 1,
            token: token.to_string(),
        })
}

fn numeric(token: &str, line: usize) -> Result<Option<f64>> {
    let value = token
        .parse::<f64>()
        .map_err(|_| PipelineError::UnexpectedToken {
            line: line + 1,
            token: token.to_string(),
        })?;
    Ok((value != MISSING_VALUE && value.is_finite()).then_some(value))
}

fn precipitation_value(token: &str, line: usize) -> Result<Option<f64>> {
    match token {
        NOT_AVAILABLE => Ok(None),
        TRACE => Ok(Some(TRACE_PRECIPITATION)),
        _ => numeric(token, line),
    }
}

fn temperature_value(token: &str, line: usize) -> Result<Option<f64>> {
    match token {
        NOT_AVAILABLE | TRACE => Ok(None),
        _ => numeric(token, line),
    }
}

fn field<'a>(tokens: &[&'a str], idx: usize, line: usize) -> Result<&'a str> {
    tokens.get(idx).copied().ok_or_else(|| {
        PipelineError::Data(format!("line {}: expected at least {} columns", line + 1, idx + 1))
    })
}

/// Parses one yearly precipitation file: `<day-of-year> <value>` rows and a footer.
pub fn parse_precipitation(text: &str, station: &str, year: i32) -> Result<Series> {
    let mut series = Series::new(column_name(station));
    for (line, row) in body_lines(text, 0) {
        let tokens: Vec<&str> = row.split_whitespace().collect();
        let date = day_of_year(year, field(&tokens, 0, line)?, line)?;
        let value = precipitation_value(field(&tokens, 1, line)?, line)?;
        series.values.insert(date, value);
    }
    Ok(series)
}

/// Parses one yearly temperature file: two header lines, `<day-of-year> <max> <min>`
/// rows and a footer. Returns the `_max` and `_min` series.
pub fn parse_temperature(text: &str, station: &str, year: i32) -> Result<[Series; 2]> {
    let name = column_name(station);
    let mut tmax = Series::new(format!("{}_max", name));
    let mut tmin = Series::new(format!("{}_min", name));
    for (line, row) in body_lines(text, 2) {
        let tokens: Vec<&str> = row.split_whitespace().collect();
        let date = day_of_year(year, field(&tokens, 0, line)?, line)?;
        tmax.values
            .insert(date, temperature_value(field(&tokens, 1, line)?, line)?);
        tmin.values
            .insert(date, temperature_value(field(&tokens, 2, line)?, line)?);
    }
    Ok([tmax, tmin])
}

fn station_of(path: &Path) -> Result<String> {
    path.parent()
        .and_then(|p| p.file_name())
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| PipelineError::Data(format!("no station directory for {}", path.display())))
}

/// Reads one file of `variable`, station and year taken from its path.
pub fn read_met_file(path: &Path, variable: Variable) -> Result<Vec<Series>> {
    let station = station_of(path)?;
    let year = year_from_path(path)?;
    debug!("Loading {:?} - station: {}, year: {}", variable, station, year);
    let text = fs::read_to_string(path)?;
    match variable {
        Variable::Precipitation => Ok(vec![parse_precipitation(&text, &station, year)?]),
        Variable::Temperature => Ok(parse_temperature(&text, &station, year)?.into()),
    }
}

/// Converts every station of `variable` into one wide table.
///
/// Temperature stations contribute two columns each (`_max`, `_min`).
pub fn convert_met(layout: &DataLayout, variable: Variable) -> Result<BatchOutcome<TimeSeriesTable>> {
    let dir = layout.met_dir(variable);
    let mut files: Vec<PathBuf> = Vec::new();
    let mut failures = Vec::new();
    for station in list_subdirs(&dir)? {
        match list_files(&dir.join(&station)) {
            Ok(found) => files.extend(found),
            Err(e) => {
                warn!("Skipping station {}: {}", station, e);
                failures.push((dir.join(&station), e));
            }
        }
    }
    info!("Parsing {} {} files", files.len(), variable.dir_name());

    let (parsed, parse_failures) = parse_all(&files, |path| read_met_file(path, variable));
    failures.extend(parse_failures);

    let table = TimeSeriesTable::from_series(parsed.into_iter().flat_map(|(_, s)| s));
    info!(
        "{} table: {} columns, {} dates",
        variable.dir_name(),
        table.columns.len(),
        table.rows.len()
    );
    Ok(BatchOutcome {
        value: table,
        failures,
    })
}

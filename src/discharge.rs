use crate::error::{PipelineError, Result};
use crate::structs::{DataLayout, DischargeRecord, Series, StationHeader};
use crate::transform::{BatchOutcome, TimeSeriesTable, list_files, list_subdirs, parse_all};
use chrono::NaiveDate;
use log::{debug, info, warn};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Token standing in for a missing value in report files.
pub const MISSING: &str = "NA";

/// Hand-verified fill for a value absent from the source data:
/// station 450, 1977, June 17 (matches the printed monthly mean).
const CORRECTION_STATION: u32 = 450;
const CORRECTION_YEAR: i32 = 1977;
const CORRECTION_DAY: u32 = 17;
const CORRECTION_MONTH: u32 = 6;
const CORRECTION_VALUE: &str = "946";

/// One station-year discharge report after parsing.
#[derive(Debug, Clone, PartialEq)]
pub struct DischargeReport {
    pub header: StationHeader,
    pub year: i32,
    /// Sorted by date, one per calendar date of `year` covered by the day rows.
    pub records: Vec<DischargeRecord>,
}

impl DischargeReport {
    /// Column name used when the report is merged into a wide table.
    pub fn column_name(&self) -> String {
        self.header.station_id.to_string()
    }

    pub fn to_series(&self) -> Series {
        let mut series = Series::new(self.column_name());
        series
            .values
            .extend(self.records.iter().map(|r| (r.date, r.value)));
        series
    }
}

/// Leap-year test used by the report layout (every fourth year).
pub fn is_leap_year(year: i32) -> bool {
    year % 4 == 0
}

/// Whether `day` exists in `month` of `year` under the report's calendar.
pub fn is_valid_day(year: i32, month: u32, day: u32) -> bool {
    match (month, day) {
        (_, 0) | (_, 32..) => false,
        (2, 29) => is_leap_year(year),
        (2, 30..) => false,
        (4 | 6 | 9 | 11, 31) => false,
        (1..=12, _) => true,
        _ => false,
    }
}

/// Maps a report cell to a value: `NA` is missing, anything else must be a finite decimal.
pub fn parse_value(token: &str, line: usize) -> Result<Option<f64>> {
    if token == MISSING {
        return Ok(None);
    }
    match token.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(Some(v)),
        _ => Err(PipelineError::UnexpectedToken {
            line,
            token: token.to_string(),
        }),
    }
}

fn dms_to_decimal(tokens: &[&str], source: &Path, what: &str) -> Result<f64> {
    if tokens.len() < 3 {
        return Err(PipelineError::header(
            source,
            format!("{} needs degrees, minutes and seconds", what),
        ));
    }
    let parts = &tokens[tokens.len() - 3..];
    let mut values = [0.0; 3];
    for (slot, token) in values.iter_mut().zip(parts) {
        *slot = token.parse::<f64>().map_err(|_| {
            PipelineError::header(source, format!("{} component '{}' is not numeric", what, token))
        })?;
    }
    Ok(values[0] + values[1] / 60.0 + values[2] / 3600.0)
}

/// Station name on the second header line: the token after a `Station:` label,
/// or the second token when there is no such label.
fn station_name(tokens: &[&str]) -> Option<String> {
    let labelled = tokens.iter().enumerate().position(|(i, t)| {
        t.trim_end_matches(':').eq_ignore_ascii_case("station")
            && (t.ends_with(':') || tokens.get(i + 1) == Some(&":"))
    });
    if let Some(idx) = labelled {
        let rest = tokens[idx + 1..].iter().find(|t| **t != ":");
        if let Some(name) = rest {
            return Some(name.to_string());
        }
    }
    tokens.get(1).map(|t| t.to_string())
}

/// Parses station identity and coordinates from the first three lines.
pub fn parse_station_header(lines: &[&str], source: &Path) -> Result<StationHeader> {
    if lines.len() < 3 {
        return Err(PipelineError::header(source, "fewer than three header lines"));
    }

    let id_field = match lines[0].rsplit_once(':') {
        Some((_, field)) => field.trim(),
        None => lines[0].split_whitespace().last().unwrap_or(""),
    };
    let station_id = id_field
        .parse::<u32>()
        .map_err(|_| PipelineError::header(source, format!("bad station id '{}'", id_field)))?;

    let lat_tokens: Vec<&str> = lines[1].split_whitespace().collect();
    let lon_tokens: Vec<&str> = lines[2].split_whitespace().collect();
    let station_name = station_name(&lat_tokens)
        .ok_or_else(|| PipelineError::header(source, "missing station name"))?;
    let latitude = dms_to_decimal(&lat_tokens, source, "latitude")?;
    let longitude = dms_to_decimal(&lon_tokens, source, "longitude")?;

    Ok(StationHeader {
        station_id,
        station_name,
        latitude,
        longitude,
    })
}

/// Year of the report: a `Year:` labelled header line, else the colon field of line 5.
pub fn parse_year(lines: &[&str], source: &Path) -> Result<i32> {
    let header = &lines[..lines.len().min(HEADER_LINES)];
    let labelled = header.iter().find_map(|line| {
        let (label, field) = line.split_once(':')?;
        label
            .trim()
            .to_ascii_lowercase()
            .starts_with("year")
            .then(|| field.trim())
    });
    let field = match labelled {
        Some(field) => field,
        None => lines
            .get(4)
            .and_then(|line| line.rsplit_once(':'))
            .map(|(_, field)| field.trim())
            .ok_or_else(|| PipelineError::header(source, "no year field"))?,
    };
    field
        .parse::<i32>()
        .map_err(|_| PipelineError::header(source, format!("bad year '{}'", field)))
}

/// Day rows never start before the coordinate lines.
const DAILY_BLOCK_SEARCH_FROM: usize = 3;
/// Lines searched for a labelled year field.
const HEADER_LINES: usize = 10;

/// A day row of the daily block: 0-based line index, day of month, value cells.
#[derive(Debug, Clone)]
pub(crate) struct DayRow<'a> {
    pub line: usize,
    pub day: u32,
    pub cells: Vec<&'a str>,
}

/// Finds the day rows: the first row starting with day 1, then consecutive
/// days up to 31. The block ends at the first line that is not the next day.
/// Returns the rows and the index of the line after the last one.
pub(crate) fn locate_daily_block<'a>(lines: &[&'a str]) -> Result<(Vec<DayRow<'a>>, usize)> {
    let start = lines
        .iter()
        .enumerate()
        .skip(DAILY_BLOCK_SEARCH_FROM)
        .find(|(_, line)| line.split_whitespace().next() == Some("1"))
        .map(|(idx, _)| idx)
        .ok_or(PipelineError::MissingDailyBlock)?;

    let mut rows = Vec::with_capacity(31);
    let mut idx = start;
    while idx < lines.len() && rows.len() < 31 {
        let mut tokens = lines[idx].split_whitespace();
        let Some(first) = tokens.next() else {
            idx += 1;
            continue;
        };
        let expected = rows.len() as u32 + 1;
        if first.parse::<u32>().ok() != Some(expected) {
            break;
        }
        rows.push(DayRow {
            line: idx,
            day: expected,
            cells: tokens.collect(),
        });
        idx += 1;
    }

    if rows.len() < 31 {
        debug!("Daily block ends after day {} (line {})", rows.len(), idx + 1);
    }
    Ok((rows, idx))
}

/// Pairs each valid month of a day row with its cell.
///
/// Rows either keep all 12 columns or omit the months the day does not exist in.
fn month_cells<'a>(
    row: &DayRow<'a>,
    header: &StationHeader,
    year: i32,
) -> Result<Vec<(u32, &'a str)>> {
    let valid: Vec<u32> = (1..=12).filter(|&m| is_valid_day(year, m, row.day)).collect();
    let mut cells = row.cells.clone();

    if header.station_id == CORRECTION_STATION
        && year == CORRECTION_YEAR
        && row.day == CORRECTION_DAY
        && cells.len() == valid.len() - 1
    {
        debug!(
            "Filling station {} {}-{:02}-{} with {}",
            header.station_id, year, CORRECTION_MONTH, row.day, CORRECTION_VALUE
        );
        cells.insert(CORRECTION_MONTH as usize - 1, CORRECTION_VALUE);
    }

    if cells.len() == 12 {
        Ok(valid.iter().map(|&m| (m, cells[m as usize - 1])).collect())
    } else if cells.len() == valid.len() {
        Ok(valid.into_iter().zip(cells).collect())
    } else {
        Err(PipelineError::MalformedRow {
            day: row.day,
            expected: valid.len(),
            found: cells.len(),
        })
    }
}

/// Parses the full text of one station-year discharge report.
///
/// # Errors
/// `MalformedHeader` when the id, coordinates or year cannot be read,
/// `UnexpectedToken` for a cell that is neither a decimal nor `NA`,
/// `MalformedRow` for a day row with an unexpected number of cells.
pub fn parse_report(text: &str, source: &Path) -> Result<DischargeReport> {
    let lines: Vec<&str> = text.lines().collect();
    let header = parse_station_header(&lines, source)?;
    let year = parse_year(&lines, source)?;
    let (rows, _) = locate_daily_block(&lines)?;

    let mut records = Vec::with_capacity(366);
    for row in &rows {
        for (month, cell) in month_cells(row, &header, year)? {
            let value = parse_value(cell, row.line + 1)?;
            match NaiveDate::from_ymd_opt(year, month, row.day) {
                Some(date) => records.push(DischargeRecord { date, value }),
                None => continue,
            }
        }
    }
    records.sort_by_key(|r| r.date);

    Ok(DischargeReport {
        header,
        year,
        records,
    })
}

/// Reads and parses one report file.
pub fn read_report(path: &Path) -> Result<DischargeReport> {
    let text = fs::read_to_string(path)?;
    let report = parse_report(&text, path)?;
    debug!(
        "Loading data - station: {}, year: {}",
        report.header.station_id, report.year
    );
    Ok(report)
}

/// Every report file of every discharge station, sorted by station then file name.
/// Stations whose report folder cannot be listed are returned as failures.
pub fn report_files(layout: &DataLayout) -> Result<BatchOutcome<Vec<PathBuf>>> {
    let mut outcome = BatchOutcome::new(Vec::new());
    for station in list_subdirs(&layout.discharge_dir())? {
        let dir = layout.daily_discharge_dir(&station);
        match list_files(&dir) {
            Ok(files) => outcome.value.extend(files),
            Err(e) => {
                warn!("Skipping station {}: {}", station, e);
                outcome.failures.push((dir, e));
            }
        }
    }
    Ok(outcome)
}

/// Converts all discharge stations into one wide table (columns = station ids).
///
/// Files that fail to parse are reported in the outcome and left out of the table.
pub fn convert_discharge(layout: &DataLayout) -> Result<BatchOutcome<TimeSeriesTable>> {
    let BatchOutcome {
        value: files,
        mut failures,
    } = report_files(layout)?;
    info!("Parsing {} discharge reports", files.len());

    let (reports, parse_failures) = parse_all(&files, read_report);
    failures.extend(parse_failures);

    let mut by_station: BTreeMap<String, Series> = BTreeMap::new();
    for (_, report) in reports {
        let name = report.column_name();
        by_station
            .entry(name.clone())
            .or_insert_with(|| Series::new(name))
            .extend(report.to_series());
    }

    let table = TimeSeriesTable::from_series(by_station.into_values());
    info!(
        "Discharge table: {} stations, {} dates, {} failed files",
        table.columns.len(),
        table.rows.len(),
        failures.len()
    );
    Ok(BatchOutcome {
        value: table,
        failures,
    })
}

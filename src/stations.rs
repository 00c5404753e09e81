use crate::discharge::parse_station_header;
use crate::error::{PipelineError, Result};
use crate::structs::{DataLayout, StationHeader, StationRow};
use crate::transform::{BatchOutcome, list_files, list_subdirs};
use log::{debug, info, warn};
use std::fs;
use std::path::Path;

/// Gauge elevations in metres, from dhm.gov.np/hydrological-station (24.10.2019).
///
/// Lookup only: an id listed here without a station directory under
/// `discharge/` produces no row.
const STATION_ALTITUDES: &[(u32, f64)] = &[(420, 198.0), (445, 485.0), (447, 600.0), (450, 180.0)];

/// Altitude of a discharge station, if it is known.
pub fn station_altitude(id: u32) -> Option<f64> {
    STATION_ALTITUDES
        .iter()
        .find(|(station, _)| *station == id)
        .map(|(_, altitude)| *altitude)
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

/// Builds an output row from a parsed header, merging the altitude lookup.
pub fn station_row(header: &StationHeader) -> StationRow {
    let altitude = station_altitude(header.station_id);
    if altitude.is_none() {
        debug!("No altitude known for station {}", header.station_id);
    }
    StationRow {
        id: header.station_id.to_string(),
        name: header.station_name.clone(),
        latitude: round3(header.latitude),
        longitude: round3(header.longitude),
        altitude,
    }
}

fn read_header(path: &Path) -> Result<StationHeader> {
    let text = fs::read_to_string(path)?;
    let lines: Vec<&str> = text.lines().take(3).collect();
    parse_station_header(&lines, path)
}

/// Extracts one metadata row per discharge station.
///
/// The header is read from the first report by file name; every report of a
/// station is assumed to carry the same header. Rows are sorted by id.
///
/// # Errors
/// Returns error if the discharge directory cannot be listed. Stations without
/// a readable report are returned as failures.
pub fn convert_discharge_stations(layout: &DataLayout) -> Result<BatchOutcome<Vec<StationRow>>> {
    let mut outcome = BatchOutcome::new(Vec::new());

    for station in list_subdirs(&layout.discharge_dir())? {
        let dir = layout.daily_discharge_dir(&station);
        let first = match list_files(&dir) {
            Ok(files) => files.into_iter().next(),
            Err(e) => {
                warn!("Skipping station {}: {}", station, e);
                outcome.failures.push((dir, e));
                continue;
            }
        };
        let Some(path) = first else {
            warn!("Station {} has no reports", station);
            outcome.failures.push((
                dir,
                PipelineError::Data(format!("no report files for station {}", station)),
            ));
            continue;
        };

        match read_header(&path) {
            Ok(header) => outcome.value.push(station_row(&header)),
            Err(e) => {
                warn!("Skipping station {}: {}", station, e);
                outcome.failures.push((path, e));
            }
        }
    }

    outcome.value.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
    info!("Extracted metadata for {} discharge stations", outcome.value.len());
    Ok(outcome)
}

/// Reformats the tab-separated meteorological station reference.
///
/// Six columns per row: the first is dropped, the second is the id, then
/// Name, Latitude, Longitude and Altitude. The header row is skipped.
pub fn parse_met_stations(text: &str) -> Result<Vec<StationRow>> {
    let mut rows = Vec::new();
    for (idx, line) in text.lines().enumerate().skip(1) {
        if line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split('\t').map(str::trim).collect();
        if fields.len() < 6 {
            return Err(PipelineError::Data(format!(
                "station reference line {} has {} columns, expected 6",
                idx + 1,
                fields.len()
            )));
        }
        let number = |i: usize| -> Result<f64> {
            fields[i].parse::<f64>().map_err(|_| PipelineError::UnexpectedToken {
                line: idx + 1,
                token: fields[i].to_string(),
            })
        };
        rows.push(StationRow {
            id: fields[1].to_string(),
            name: fields[2].to_string(),
            latitude: number(3)?,
            longitude: number(4)?,
            altitude: Some(number(5)?),
        });
    }
    Ok(rows)
}

pub fn convert_met_stations(layout: &DataLayout) -> Result<Vec<StationRow>> {
    let path = layout.station_reference();
    let rows = parse_met_stations(&fs::read_to_string(&path)?)?;
    info!("Read {} meteorological stations from {}", rows.len(), path.display());
    Ok(rows)
}

/// End-to-end conversion of a small project tree: discharge reports for two
/// stations, precipitation and temperature files, and the station reference.
use chrono::NaiveDate;
use lib::discharge::is_valid_day;
use lib::{
    ConvertConfig, PipelineError, Variable, check_all, convert_discharge,
    convert_discharge_stations, convert_met, convert_met_stations, write_stations_csv,
    write_table_csv,
};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const DAYS: [u32; 12] = [31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];

/// Report whose value on (month, day) is `month * 10 + day`, with a summary
/// block that agrees with it. Year must not be a leap year.
fn report(station: u32, name: &str, year: i32) -> String {
    let mut text = format!(
        "Station No. : {}\nRiver: Narayani  Station: {} 27 42 0\nLongitude: 84 25 30\nDaily Discharge\nYear :{}\n\n\n\n\n",
        station, name, year
    );
    text.push_str("Day Jan. Feb. Mar. Apr. May Jun. Jul. Aug. Sep. Oct. Nov. Dec.\n");
    for day in 1..=31u32 {
        let mut row = day.to_string();
        for month in 1..=12u32 {
            if is_valid_day(year, month, day) {
                row.push_str(&format!(" {}", month * 10 + day));
            }
        }
        text.push_str(&row);
        text.push('\n');
    }
    text.push('\n');
    for label in ["Min.", "Mean", "Max."] {
        let mut row = label.to_string();
        for (i, &n) in DAYS.iter().enumerate() {
            let month = i as u32 + 1;
            let value = match label {
                "Min." => (month * 10 + 1) as f64,
                "Max." => (month * 10 + n) as f64,
                _ => (month * 10) as f64 + (n as f64 + 1.0) / 2.0,
            };
            row.push_str(&format!(" {}", value));
        }
        row.push_str(" 0\n");
        text.push_str(&row);
    }
    text
}

fn write(path: &Path, contents: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
}

fn project() -> TempDir {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    let daily = |station: &str| root.join("discharge").join(station).join("Daily Discharge");

    write(&daily("420").join("420_1990.txt"), &report(420, "Kotagaun", 1990));
    write(&daily("420").join("420_1991.txt"), &report(420, "Kotagaun", 1991));
    write(&daily("450").join("450_1990.txt"), &report(450, "Devghat", 1990));
    write(&daily("450").join("450_1991.txt"), "Station No. : 450\ntruncated\n");

    write(&root.join("prec/0601/lete.90"), "1 12.5\n2 T\n3 DNA\nTotal 12.7\n");
    write(
        &root.join("temp/0601/lete.90"),
        "Lete\nDay Max Min\n1 10.0 -2.0\n2 -99.9 -3.0\nMean 10.0 -2.5\n",
    );
    write(
        &root.join("station_loc.txt"),
        "No\tId\tName\tLat\tLon\tElev\n1\t601\tLete\t28.633\t83.6\t2384\n",
    );
    dir
}

#[test]
fn test_discharge_batch_tolerates_bad_file() {
    let dir = project();
    let config = ConvertConfig::new(dir.path(), &dir.path().join("out"));

    let outcome = convert_discharge(&config.layout).unwrap();
    assert_eq!(outcome.failures.len(), 1);
    assert!(outcome.failures[0].0.ends_with("450_1991.txt"));
    assert!(matches!(outcome.failures[0].1, PipelineError::MalformedHeader { .. }));

    let table = outcome.value;
    assert_eq!(table.columns, vec!["420", "450"]);
    // 420 covers 1990 and 1991, 450 only 1990
    assert_eq!(table.rows.len(), 365 * 2);
    let jan_1991 = NaiveDate::from_ymd_opt(1991, 1, 1).unwrap();
    assert_eq!(table.rows[&jan_1991], vec![Some(11.0), None]);
    let feb_28 = NaiveDate::from_ymd_opt(1990, 2, 28).unwrap();
    assert_eq!(table.rows[&feb_28], vec![Some(48.0), Some(48.0)]);
}

#[test]
fn test_checker_accepts_consistent_reports() {
    let dir = project();
    let config = ConvertConfig::new(dir.path(), &dir.path().join("out"));

    let outcome = check_all(&config.layout, config.rtol).unwrap();
    assert_eq!(outcome.failures.len(), 1);
    assert_eq!(outcome.value.len(), 3);
    for report in &outcome.value {
        assert!(report.is_ok(), "{:?}", report.mismatches);
        assert_eq!(report.compared.len(), 12);
    }
}

#[test]
fn test_station_tables() {
    let dir = project();
    let config = ConvertConfig::new(dir.path(), &dir.path().join("out"));
    fs::create_dir_all(&config.output_dir).unwrap();

    let hyd = convert_discharge_stations(&config.layout).unwrap();
    assert!(hyd.is_clean());
    let path = config.output_path("hyd_stations.csv");
    write_stations_csv(&hyd.value, &path).unwrap();
    assert_eq!(
        fs::read_to_string(&path).unwrap(),
        "id,Name,Latitude,Longitude,Altitude\n420,Kotagaun,27.7,84.425,198\n450,Devghat,27.7,84.425,180\n"
    );

    let met = convert_met_stations(&config.layout).unwrap();
    assert_eq!(met.len(), 1);
    assert_eq!(met[0].name, "Lete");
}

#[test]
fn test_met_tables() {
    let dir = project();
    let config = ConvertConfig::new(dir.path(), &dir.path().join("out"));
    fs::create_dir_all(&config.output_dir).unwrap();

    let prec = convert_met(&config.layout, Variable::Precipitation).unwrap();
    assert!(prec.is_clean());
    let path = config.output_path("prec.csv");
    write_table_csv(&prec.value, &path).unwrap();
    assert_eq!(
        fs::read_to_string(&path).unwrap(),
        "date,601\n1990-01-01,12.5\n1990-01-02,0.2\n1990-01-03,\n"
    );

    let temp = convert_met(&config.layout, Variable::Temperature).unwrap();
    assert_eq!(temp.value.columns, vec!["601_max", "601_min"]);
    let jan2 = NaiveDate::from_ymd_opt(1990, 1, 2).unwrap();
    assert_eq!(temp.value.rows[&jan2], vec![None, Some(-3.0)]);
}

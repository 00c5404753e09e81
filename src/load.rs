use crate::error::Result;
use crate::structs::StationRow;
use crate::transform::{SummaryTable, TimeSeriesTable};
use arrow_array::{ArrayRef, Float64Array, RecordBatch, StringArray};
use arrow_schema::{DataType, Field, Schema};
use csv::Writer;
use parquet::arrow::ArrowWriter;
use parquet::file::properties::WriterProperties;
use std::{fs::File, path::Path, sync::Arc};

const DATE_FORMAT: &str = "%Y-%m-%d";

fn cell(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// Writes a wide time-series table to CSV.
///
/// # Arguments
/// * `table` - Date-indexed table, one column per series
/// * `output_path` - Path where the CSV file will be created
///
/// The first column is `date` (ISO format); missing values are empty cells.
///
/// # Errors
/// Returns error if file cannot be created or written to.
pub fn write_table_csv(table: &TimeSeriesTable, output_path: &Path) -> Result<()> {
    let file = File::create(output_path)?;
    let mut writer = Writer::from_writer(file);

    let mut header = Vec::with_capacity(table.columns.len() + 1);
    header.push("date");
    header.extend(table.columns.iter().map(String::as_str));
    writer.write_record(&header)?;

    for (date, cells) in &table.rows {
        let mut record = Vec::with_capacity(cells.len() + 1);
        record.push(date.format(DATE_FORMAT).to_string());
        record.extend(cells.iter().map(|c| cell(*c)));
        writer.write_record(&record)?;
    }

    writer.flush()?;
    Ok(())
}

/// Writes a summary table (months, years or statistics) to CSV.
pub fn write_summary_csv(summary: &SummaryTable, output_path: &Path) -> Result<()> {
    let file = File::create(output_path)?;
    let mut writer = Writer::from_writer(file);

    let mut header = vec![summary.index_name.as_str()];
    header.extend(summary.columns.iter().map(String::as_str));
    writer.write_record(&header)?;

    for (key, cells) in &summary.rows {
        let mut record = vec![key.clone()];
        record.extend(cells.iter().map(|c| cell(*c)));
        writer.write_record(&record)?;
    }

    writer.flush()?;
    Ok(())
}

/// Writes a station table (`id,Name,Latitude,Longitude,Altitude`) to CSV.
///
/// Numbers are formatted like the time-series cells, so an altitude of 198
/// is written as `198`.
///
/// # Errors
/// Returns error if file cannot be created or written to.
pub fn write_stations_csv(rows: &[StationRow], output_path: &Path) -> Result<()> {
    let file = File::create(output_path)?;
    let mut writer = Writer::from_writer(file);
    writer.write_record(["id", "Name", "Latitude", "Longitude", "Altitude"])?;
    for row in rows {
        writer.write_record([
            row.id.clone(),
            row.name.clone(),
            row.latitude.to_string(),
            row.longitude.to_string(),
            cell(row.altitude),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

/// Writes a station table to a pretty-formatted JSON file.
pub fn write_stations_json(rows: &[StationRow], output_path: &Path) -> Result<()> {
    let file = File::create(output_path)?;
    serde_json::to_writer_pretty(file, rows)?;
    Ok(())
}

/// Writes a wide time-series table to a columnar Parquet file using Arrow format.
///
/// `date` is stored as an ISO string; every series becomes a nullable Float64 column.
///
/// # Errors
/// Returns error if file cannot be created, schema is invalid, or Arrow operations fail.
pub fn write_table_parquet(table: &TimeSeriesTable, output_path: &Path) -> Result<()> {
    let mut fields = vec![Field::new("date", DataType::Utf8, false)];
    fields.extend(
        table
            .columns
            .iter()
            .map(|name| Field::new(name, DataType::Float64, true)),
    );
    let schema = Arc::new(Schema::new(fields));

    let dates: Vec<String> = table
        .rows
        .keys()
        .map(|d| d.format(DATE_FORMAT).to_string())
        .collect();
    let mut arrays: Vec<ArrayRef> = vec![Arc::new(StringArray::from_iter_values(
        dates.iter().map(String::as_str),
    ))];
    for col in 0..table.columns.len() {
        let values: Float64Array = table.rows.values().map(|cells| cells[col]).collect();
        arrays.push(Arc::new(values));
    }

    let batch = RecordBatch::try_new(schema.clone(), arrays)?;

    let file = File::create(output_path)?;
    let props = WriterProperties::builder().build();
    let mut writer = ArrowWriter::try_new(file, schema, Some(props))?;
    writer.write(&batch)?;
    writer.close()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structs::Series;
    use chrono::NaiveDate;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_table_csv_layout() {
        let mut a = Series::new("420");
        a.values.insert(NaiveDate::from_ymd_opt(1990, 1, 1).unwrap(), Some(10.5));
        a.values.insert(NaiveDate::from_ymd_opt(1990, 1, 2).unwrap(), None);
        let mut b = Series::new("445");
        b.values.insert(NaiveDate::from_ymd_opt(1990, 1, 2).unwrap(), Some(3.0));
        let table = TimeSeriesTable::from_series([a, b]);

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("discharge.csv");
        write_table_csv(&table, &path).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text, "date,420,445\n1990-01-01,10.5,\n1990-01-02,,3\n");
    }

    #[test]
    fn test_station_csv_header() {
        let rows = vec![StationRow {
            id: "447".to_string(),
            name: "Betrawati".to_string(),
            latitude: 27.969,
            longitude: 85.186,
            altitude: None,
        }];
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("hyd_stations.csv");
        write_stations_csv(&rows, &path).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text, "id,Name,Latitude,Longitude,Altitude\n447,Betrawati,27.969,85.186,\n");
    }

    #[test]
    fn test_station_and_table_numbers_share_format() {
        let rows = vec![StationRow {
            id: "420".to_string(),
            name: "Kotagaun".to_string(),
            latitude: 28.0,
            longitude: 84.425,
            altitude: Some(198.0),
        }];
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("hyd_stations.csv");
        write_stations_csv(&rows, &path).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text, "id,Name,Latitude,Longitude,Altitude\n420,Kotagaun,28,84.425,198\n");
        assert_eq!(cell(Some(198.0)), "198");
    }

    #[test]
    fn test_summary_csv_layout() {
        let summary = SummaryTable {
            index_name: "statistic".to_string(),
            columns: vec!["601".to_string()],
            rows: vec![
                ("mean".to_string(), vec![Some(1250.5)]),
                ("max".to_string(), vec![None]),
            ],
        };
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("prec_yearly_summary.csv");
        write_summary_csv(&summary, &path).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(text, "statistic,601\nmean,1250.5\nmax,\n");
    }

    #[test]
    fn test_parquet_written() {
        let mut a = Series::new("420");
        a.values.insert(NaiveDate::from_ymd_opt(1990, 1, 1).unwrap(), Some(1.0));
        let table = TimeSeriesTable::from_series([a]);
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("discharge.parquet");
        write_table_parquet(&table, &path).unwrap();
        assert!(fs::metadata(&path).unwrap().len() > 0);
    }
}

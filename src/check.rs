//! Self-test of the discharge parser against the summary rows printed at the
//! bottom of every report (monthly minimum, mean and maximum).

use crate::discharge::{self, DischargeReport, locate_daily_block, parse_value};
use crate::error::{PipelineError, Result};
use crate::structs::{DataLayout, DischargeRecord, MonthlyStat};
use crate::transform::{BatchOutcome, parse_all};
use chrono::Datelike;
use log::{debug, info};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Label + 12 months + yearly value.
const SUMMARY_MIN_TOKENS: usize = 14;

/// Absolute floor of the tolerance, so zero compares equal to zero.
const ATOL: f64 = 1e-8;

/// A computed statistic that disagrees with the value printed in the report.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateMismatch {
    pub source: PathBuf,
    pub station_id: u32,
    pub year: i32,
    pub month: u32,
    pub statistic: &'static str,
    pub computed: f64,
    pub reference: f64,
}

impl fmt::Display for AggregateMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "station {} {}-{:02} {}: computed {} vs reported {} ({})",
            self.station_id,
            self.year,
            self.month,
            self.statistic,
            self.computed,
            self.reference,
            self.source.display()
        )
    }
}

/// Outcome of checking one report file.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckReport {
    pub source: PathBuf,
    pub station_id: u32,
    pub year: i32,
    /// Months where all six values were present and compared.
    pub compared: Vec<u32>,
    /// Months skipped because a computed or reported value was missing.
    pub skipped: Vec<u32>,
    pub mismatches: Vec<AggregateMismatch>,
}

impl CheckReport {
    pub fn is_ok(&self) -> bool {
        self.mismatches.is_empty()
    }
}

/// `|computed - reference| <= ATOL + rtol * |reference|`
pub fn is_close(computed: f64, reference: f64, rtol: f64) -> bool {
    (computed - reference).abs() <= ATOL + rtol * reference.abs()
}

/// Min/max/mean per calendar month, skipping missing values.
/// A month without any present value has all three absent.
pub fn compute_monthly(records: &[DischargeRecord]) -> Vec<MonthlyStat> {
    let mut stats: Vec<MonthlyStat> = (1..=12)
        .map(|month| MonthlyStat {
            month,
            ..MonthlyStat::default()
        })
        .collect();
    let mut sums = [0.0f64; 12];
    let mut counts = [0usize; 12];

    for record in records {
        let Some(value) = record.value else { continue };
        let idx = record.date.month0() as usize;
        let stat = &mut stats[idx];
        stat.min = Some(stat.min.map_or(value, |m| m.min(value)));
        stat.max = Some(stat.max.map_or(value, |m| m.max(value)));
        sums[idx] += value;
        counts[idx] += 1;
    }

    for (idx, stat) in stats.iter_mut().enumerate() {
        if counts[idx] > 0 {
            stat.mean = Some(sums[idx] / counts[idx] as f64);
        }
    }
    stats
}

/// Reads the min, mean and max rows that follow the daily block.
///
/// Each row is `<label> <jan> ... <dec> <yearly>`; the label and yearly
/// columns are dropped. `NA` cells become absent values.
pub fn parse_summary(text: &str) -> Result<Vec<MonthlyStat>> {
    let lines: Vec<&str> = text.lines().collect();
    let (_, block_end) = locate_daily_block(&lines)?;

    let summary: Vec<(usize, Vec<&str>)> = lines
        .iter()
        .enumerate()
        .skip(block_end)
        .map(|(idx, line)| (idx, line.split_whitespace().collect::<Vec<_>>()))
        .filter(|(_, tokens)| tokens.len() >= SUMMARY_MIN_TOKENS)
        .take(3)
        .collect();
    if summary.len() < 3 {
        return Err(PipelineError::MissingSummary);
    }

    let mut rows = Vec::with_capacity(3);
    for (idx, tokens) in &summary {
        let months = &tokens[tokens.len() - 13..tokens.len() - 1];
        let values = months
            .iter()
            .map(|t| parse_value(t, idx + 1))
            .collect::<Result<Vec<_>>>()?;
        rows.push(values);
    }

    let (min, mean, max) = (&rows[0], &rows[1], &rows[2]);
    Ok((0..12)
        .map(|i| MonthlyStat {
            month: i as u32 + 1,
            min: min[i],
            max: max[i],
            mean: mean[i],
        })
        .collect())
}

fn compare(
    report: &DischargeReport,
    source: &Path,
    computed: &[MonthlyStat],
    reference: &[MonthlyStat],
    rtol: f64,
) -> CheckReport {
    let mut outcome = CheckReport {
        source: source.to_path_buf(),
        station_id: report.header.station_id,
        year: report.year,
        compared: Vec::new(),
        skipped: Vec::new(),
        mismatches: Vec::new(),
    };

    for (c, r) in computed.iter().zip(reference) {
        let pairs = [("min", c.min, r.min), ("max", c.max, r.max), ("mean", c.mean, r.mean)];
        if pairs.iter().any(|(_, a, b)| a.is_none() || b.is_none()) {
            debug!(
                "Cannot check station {} {}-{:02}: missing values",
                outcome.station_id, outcome.year, c.month
            );
            outcome.skipped.push(c.month);
            continue;
        }

        outcome.compared.push(c.month);
        for (statistic, a, b) in pairs {
            let (Some(computed), Some(reference)) = (a, b) else { continue };
            if !is_close(computed, reference, rtol) {
                outcome.mismatches.push(AggregateMismatch {
                    source: source.to_path_buf(),
                    station_id: outcome.station_id,
                    year: outcome.year,
                    month: c.month,
                    statistic,
                    computed,
                    reference,
                });
            }
        }
    }
    outcome
}

/// Parses a report and compares its recomputed monthly statistics with the
/// printed summary rows.
pub fn check_text(text: &str, source: &Path, rtol: f64) -> Result<CheckReport> {
    let report = discharge::parse_report(text, source)?;
    let reference = parse_summary(text)?;
    let computed = compute_monthly(&report.records);
    Ok(compare(&report, source, &computed, &reference, rtol))
}

pub fn check_file(path: &Path, rtol: f64) -> Result<CheckReport> {
    let text = fs::read_to_string(path)?;
    check_text(&text, path, rtol)
}

/// Checks every discharge report under the layout.
///
/// Files that cannot be parsed are returned as failures; mismatches are kept
/// in the individual reports.
pub fn check_all(layout: &DataLayout, rtol: f64) -> Result<BatchOutcome<Vec<CheckReport>>> {
    let BatchOutcome {
        value: files,
        mut failures,
    } = discharge::report_files(layout)?;

    let (reports, parse_failures) = parse_all(&files, |path| check_file(path, rtol));
    failures.extend(parse_failures);

    let reports: Vec<CheckReport> = reports.into_iter().map(|(_, r)| r).collect();
    let mismatches: usize = reports.iter().map(|r| r.mismatches.len()).sum();
    info!(
        "Checked {} reports: {} mismatches, {} unreadable",
        reports.len(),
        mismatches,
        failures.len()
    );
    Ok(BatchOutcome {
        value: reports,
        failures,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discharge::tests::sample_report;
    use approx::assert_relative_eq;
    use chrono::NaiveDate;

    fn cell(month: u32, day: u32) -> String {
        format!("{}", month * 10 + day)
    }

    /// Appends min/mean/max rows matching `cell` for a non-leap year.
    fn with_summary(mut text: String, tweak: impl Fn(&str, u32, f64) -> String) -> String {
        let days = [31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];
        for label in ["Min", "Mean", "Max"] {
            let mut row = label.to_string();
            for (i, &n) in days.iter().enumerate() {
                let month = i as u32 + 1;
                let value = match label {
                    "Min" => (month * 10 + 1) as f64,
                    "Max" => (month * 10 + n) as f64,
                    _ => (month * 10) as f64 + (n as f64 + 1.0) / 2.0,
                };
                row.push(' ');
                row.push_str(&tweak(label, month, value));
            }
            row.push_str(" 99.9\n");
            text.push_str(&row);
        }
        text
    }

    #[test]
    fn test_matching_summary_passes() {
        let text = with_summary(sample_report(420, 1990, cell), |_, _, v| v.to_string());
        let report = check_text(&text, Path::new("420_1990.txt"), 0.01).unwrap();
        assert!(report.is_ok(), "{:?}", report.mismatches);
        assert_eq!(report.compared.len(), 12);
        assert!(report.skipped.is_empty());
    }

    #[test]
    fn test_summary_label_with_spaces_and_na_yearly() {
        let text = with_summary(sample_report(420, 1990, cell), |_, _, v| v.to_string())
            .replace("Min ", "Daily Min. ")
            .replace("Max ", "Daily Max. ")
            .replace(" 99.9\n", " NA\n");
        let reference = parse_summary(&text).unwrap();
        assert_eq!(reference.len(), 12);
        assert_eq!(reference[0].min, Some(11.0));
        assert_eq!(reference[11].max, Some(151.0));

        let report = check_text(&text, Path::new("x"), 0.01).unwrap();
        assert!(report.is_ok(), "{:?}", report.mismatches);
        assert_eq!(report.compared.len(), 12);
    }

    #[test]
    fn test_summary_after_short_block() {
        let mut text = String::from(
            "Station No. : 420\nRiver: X  Station: Demo 28 30 15\nLongitude: 83 45 10\nYear :1990\n",
        );
        text.push_str("1 10 20 30 40 50 60 70 80 90 100 110 120\n");
        text.push_str("2 12 NA 30 40 50 60 70 80 90 100 110 120\n\n");
        for label in ["Min", "Mean", "Max"] {
            let first = match label {
                "Min" => "10",
                "Mean" => "11",
                _ => "12",
            };
            text.push_str(&format!(
                "{} {} 20 30 40 50 60 70 80 90 100 110 120 0\n",
                label, first
            ));
        }
        let report = check_text(&text, Path::new("x"), 0.01).unwrap();
        assert!(report.is_ok(), "{:?}", report.mismatches);
        assert_eq!(report.compared.len(), 12);
    }

    #[test]
    fn test_na_month_is_skipped() {
        let text = with_summary(sample_report(420, 1990, cell), |label, month, v| {
            if label == "Mean" && month == 3 { "NA".to_string() } else { v.to_string() }
        });
        let report = check_text(&text, Path::new("x"), 0.01).unwrap();
        assert!(report.is_ok());
        assert_eq!(report.skipped, vec![3]);
        assert_eq!(report.compared.len(), 11);
    }

    #[test]
    fn test_mismatch_is_reported() {
        let text = with_summary(sample_report(420, 1990, cell), |label, month, v| {
            if label == "Max" && month == 7 { (v * 1.05).to_string() } else { v.to_string() }
        });
        let report = check_text(&text, Path::new("x"), 0.01).unwrap();
        assert_eq!(report.mismatches.len(), 1);
        let m = &report.mismatches[0];
        assert_eq!((m.month, m.statistic), (7, "max"));
        assert_relative_eq!(m.computed, 101.0);
    }

    #[test]
    fn test_missing_summary() {
        let text = sample_report(420, 1990, cell);
        assert!(matches!(
            check_text(&text, Path::new("x"), 0.01),
            Err(PipelineError::MissingSummary)
        ));
    }

    #[test]
    fn test_compute_monthly_skips_missing() {
        let d = |m, day| NaiveDate::from_ymd_opt(1990, m, day).unwrap();
        let records = vec![
            DischargeRecord { date: d(1, 1), value: Some(2.0) },
            DischargeRecord { date: d(1, 2), value: None },
            DischargeRecord { date: d(1, 3), value: Some(4.0) },
            DischargeRecord { date: d(2, 1), value: None },
        ];
        let stats = compute_monthly(&records);
        assert_eq!(stats[0].min, Some(2.0));
        assert_eq!(stats[0].max, Some(4.0));
        assert_eq!(stats[0].mean, Some(3.0));
        assert_eq!(stats[1], MonthlyStat { month: 2, ..MonthlyStat::default() });
    }

    #[test]
    fn test_tolerance() {
        assert!(is_close(100.9, 100.0, 0.01));
        assert!(!is_close(101.1, 100.0, 0.01));
        assert!(is_close(0.0, 0.0, 0.01));
    }
}

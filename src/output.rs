// Report assembly: one CSV per non-empty sheet, the summary sheet with its
// chart definitions, and console previews.
use crate::error::ReportError;
use crate::reports::{BUCKETS, SUMMARY_SHEET};
use crate::types::{RecordSet, Report, SummaryRow};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tabled::{builder::Builder, settings::Style, Table, Tabled};
use tracing::info;

const SERIES_COLORS: [&str; 3] = ["#3498db", "#2ecc71", "#f39c12"];

#[derive(Debug, Serialize, PartialEq)]
pub struct ChartSeries {
    pub name: String,
    pub category: String,
    pub value: usize,
    pub color: &'static str,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct ChartSpec {
    pub title: &'static str,
    pub kind: &'static str,
    pub x_axis: &'static str,
    pub y_axis: &'static str,
    pub y_min: usize,
    pub y_max: usize,
    pub series: Vec<ChartSeries>,
}

/// Column charts for the summary sheet: award turnaround first, then days
/// since closed. Both share one y-axis ceiling.
pub fn chart_specs(summary: &[SummaryRow]) -> Vec<ChartSpec> {
    let y_max = summary
        .iter()
        .flat_map(|row| [row.award_count, row.closed_unawarded_count])
        .max()
        .unwrap_or(0)
        .max(1);
    let series = |pick: fn(&SummaryRow) -> usize| -> Vec<ChartSeries> {
        summary
            .iter()
            .zip(SERIES_COLORS)
            .map(|(row, color)| ChartSeries {
                name: format!("{} days", row.range),
                category: row.range.clone(),
                value: pick(row),
                color,
            })
            .collect()
    };
    vec![
        ChartSpec {
            title: "Days to Award Distribution",
            kind: "column",
            x_axis: "Days to Award Range",
            y_axis: "Count",
            y_min: 0,
            y_max,
            series: series(|r| r.award_count),
        },
        ChartSpec {
            title: "Days Since Closed (Unawarded)",
            kind: "column",
            x_axis: "Days Since Closed Range",
            y_axis: "Count",
            y_min: 0,
            y_max,
            series: series(|r| r.closed_unawarded_count),
        },
    ]
}

pub fn write_record_set(path: &Path, set: &RecordSet) -> Result<(), ReportError> {
    let mut wtr = csv::Writer::from_path(path)?;
    wtr.write_record(set.columns())?;
    for row in set.rows() {
        wtr.write_record(row.iter().map(|cell| cell.to_string()))?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_csv<T: Serialize>(path: &Path, rows: &[T]) -> Result<(), ReportError> {
    let mut wtr = csv::Writer::from_path(path)?;
    for r in rows {
        wtr.serialize(r)?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), ReportError> {
    let s = serde_json::to_string_pretty(value)?;
    fs::write(path, s)?;
    Ok(())
}

/// Write the report under `dir`. Empty sheets are skipped; the summary
/// sheet is always written since it has a fixed three rows.
///
/// Returns the files written, in sheet order.
pub fn write_report(dir: &Path, report: &Report) -> Result<Vec<PathBuf>, ReportError> {
    fs::create_dir_all(dir)?;
    let mut written = Vec::new();
    for set in report.sheets() {
        if set.is_empty() {
            continue;
        }
        let path = dir.join(format!("{}.csv", set.sheet()));
        write_record_set(&path, set)?;
        written.push(path);
    }
    if !report.summary.is_empty() {
        let path = dir.join(format!("{}.csv", SUMMARY_SHEET));
        write_csv(&path, &report.summary)?;
        written.push(path);
        let charts = dir.join(format!("{}.charts.json", SUMMARY_SHEET));
        write_json(&charts, &chart_specs(&report.summary))?;
        written.push(charts);
    }
    info!(dir = %dir.display(), files = written.len(), "report written");
    Ok(written)
}

/// Markdown preview of the first `max_rows` rows of a sheet.
pub fn preview_record_set(set: &RecordSet, max_rows: usize) {
    if set.is_empty() {
        println!("(no rows)\n");
        return;
    }
    let mut builder = Builder::default();
    builder.push_record(set.columns().iter().map(|c| c.to_string()));
    for row in set.rows().iter().take(max_rows) {
        builder.push_record(row.iter().map(|cell| cell.to_string()));
    }
    let table_str = builder.build().with(Style::markdown()).to_string();
    println!("{}\n", table_str);
}

pub fn preview_table_rows<T>(rows: &[T], max_rows: usize)
where
    T: Tabled + Clone,
{
    let slice: Vec<T> = rows.iter().cloned().take(max_rows).collect();
    if slice.is_empty() {
        println!("(no rows)\n");
        return;
    }
    let table_str = Table::new(slice).with(Style::markdown()).to_string();
    println!("{}\n", table_str);
}

/// Print every sheet, numbered like the report's tabs.
pub fn preview_report(report: &Report, max_rows: usize) {
    println!(
        "Report generated at {}\n",
        report.generated_at.format("%Y-%m-%dT%H:%M:%S%z")
    );
    for (idx, set) in report.sheets().iter().enumerate() {
        println!("Sheet {}: {} ({} rows)\n", idx + 1, set.sheet(), set.len());
        preview_record_set(set, max_rows);
    }
    println!("Sheet {}: {}\n", report.sheets().len() + 1, SUMMARY_SHEET);
    preview_table_rows(&report.summary, BUCKETS.len());
}

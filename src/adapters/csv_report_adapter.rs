//! CSV report adapter: one file per table of an optimization run.

use crate::domain::error::PortfolioError;
use crate::domain::pipeline::OptimizationOutput;
use crate::domain::returns::ReturnSeries;
use crate::ports::report_port::ReportPort;
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const WEIGHTS_FILE: &str = "weights.csv";
pub const ALLOCATION_FILE: &str = "allocation.csv";
pub const PERFORMANCE_FILE: &str = "performance.csv";
pub const CUMULATIVE_FILE: &str = "cumulative_returns.csv";
pub const MONTHLY_FILE: &str = "monthly_returns.csv";
pub const ANNUAL_FILE: &str = "annual_returns.csv";
pub const BENCHMARK_FILE: &str = "benchmark_comparison.csv";

#[derive(Debug, Default)]
pub struct CsvReportAdapter;

impl CsvReportAdapter {
    pub fn new() -> Self {
        Self
    }
}

fn csv_error(path: &Path, e: csv::Error) -> PortfolioError {
    PortfolioError::Io(std::io::Error::other(format!(
        "failed to write {}: {}",
        path.display(),
        e
    )))
}

fn write_rows(path: &Path, header: &[&str], rows: Vec<Vec<String>>) -> Result<(), PortfolioError> {
    let mut wtr = csv::Writer::from_path(path).map_err(|e| csv_error(path, e))?;
    wtr.write_record(header).map_err(|e| csv_error(path, e))?;
    for row in rows {
        wtr.write_record(&row).map_err(|e| csv_error(path, e))?;
    }
    wtr.flush()?;
    Ok(())
}

fn series_rows(series: &ReturnSeries) -> Vec<Vec<String>> {
    series
        .points()
        .iter()
        .map(|(d, v)| vec![d.to_string(), v.to_string()])
        .collect()
}

impl ReportPort for CsvReportAdapter {
    fn write(
        &self,
        output: &OptimizationOutput,
        output_dir: &Path,
    ) -> Result<Vec<PathBuf>, PortfolioError> {
        fs::create_dir_all(output_dir)?;
        let mut written = Vec::new();

        let path = output_dir.join(WEIGHTS_FILE);
        write_rows(
            &path,
            &["ticker", "weight"],
            output
                .weights
                .iter()
                .map(|(t, w)| vec![t.to_string(), w.to_string()])
                .collect(),
        )?;
        written.push(path);

        let path = output_dir.join(ALLOCATION_FILE);
        let mut rows: Vec<Vec<String>> = output
            .allocation
            .shares
            .iter()
            .map(|(t, n)| {
                let price = output.latest_prices.get(t).copied().unwrap_or(0.0);
                vec![
                    t.to_string(),
                    n.to_string(),
                    format!("{price:.2}"),
                    format!("{:.2}", price * *n as f64),
                ]
            })
            .collect();
        rows.push(vec![
            "LEFTOVER".into(),
            String::new(),
            String::new(),
            format!("{:.2}", output.allocation.leftover),
        ]);
        write_rows(&path, &["ticker", "shares", "latest_price", "value"], rows)?;
        written.push(path);

        let path = output_dir.join(PERFORMANCE_FILE);
        write_rows(
            &path,
            &["metric", "value", "raw"],
            output
                .summary
                .rows()
                .iter()
                .map(|r| vec![r.metric.to_string(), r.value.clone(), r.raw.to_string()])
                .collect(),
        )?;
        written.push(path);

        let path = output_dir.join(CUMULATIVE_FILE);
        let per_ticker = &output.series.cumulative_per_ticker;
        let mut by_date: BTreeMap<NaiveDate, Vec<String>> = BTreeMap::new();
        for (col, (_, series)) in per_ticker.iter().enumerate() {
            for (d, v) in series.points() {
                by_date
                    .entry(*d)
                    .or_insert_with(|| vec![String::new(); per_ticker.len()])[col] = v.to_string();
            }
        }
        let mut header = vec!["date"];
        header.extend(per_ticker.iter().map(|(t, _)| t.as_str()));
        write_rows(
            &path,
            &header,
            by_date
                .into_iter()
                .map(|(d, cells)| {
                    let mut row = vec![d.to_string()];
                    row.extend(cells);
                    row
                })
                .collect(),
        )?;
        written.push(path);

        let path = output_dir.join(MONTHLY_FILE);
        write_rows(&path, &["date", "return"], series_rows(&output.series.portfolio_monthly))?;
        written.push(path);

        let path = output_dir.join(ANNUAL_FILE);
        write_rows(&path, &["date", "return"], series_rows(&output.series.portfolio_annual))?;
        written.push(path);

        if let Some(cmp) = &output.series.benchmark {
            let path = output_dir.join(BENCHMARK_FILE);
            write_rows(
                &path,
                &["date", "portfolio", cmp.benchmark.as_str()],
                cmp.portfolio
                    .points()
                    .iter()
                    .zip(cmp.benchmark_returns.points())
                    .map(|((d, p), (_, b))| vec![d.to_string(), p.to_string(), b.to_string()])
                    .collect(),
            )?;
            written.push(path);
        }

        Ok(written)
    }
}

//! Return calculus: simple, cumulative, portfolio and resampled returns.
//!
//! Every transformation returns a new series; nothing is mutated in place.

use crate::domain::price_table::PriceTable;
use crate::domain::ticker::Ticker;
use crate::domain::weights::WeightVector;
use chrono::{Datelike, Months, NaiveDate};

/// Date-ordered sequence of returns.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ReturnSeries {
    points: Vec<(NaiveDate, f64)>,
}

impl ReturnSeries {
    pub fn new(points: Vec<(NaiveDate, f64)>) -> Self {
        Self { points }
    }

    pub fn points(&self) -> &[(NaiveDate, f64)] {
        &self.points
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        self.points.iter().map(|(d, _)| *d).collect()
    }

    pub fn values(&self) -> Vec<f64> {
        self.points.iter().map(|(_, v)| *v).collect()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn last_value(&self) -> Option<f64> {
        self.points.last().map(|(_, v)| *v)
    }
}

/// Per-ticker simple returns on a shared date axis. `None` where either the
/// current or previous close is missing.
#[derive(Debug, Clone, PartialEq)]
pub struct ReturnTable {
    dates: Vec<NaiveDate>,
    tickers: Vec<Ticker>,
    rows: Vec<Vec<Option<f64>>>,
}

impl ReturnTable {
    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn tickers(&self) -> &[Ticker] {
        &self.tickers
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn row(&self, row: usize) -> &[Option<f64>] {
        &self.rows[row]
    }

    /// Defined returns of column `col`.
    pub fn column_values(&self, col: usize) -> Vec<f64> {
        self.rows.iter().filter_map(|r| r[col]).collect()
    }

    pub fn column(&self, ticker: &Ticker) -> Option<ReturnSeries> {
        let col = self.tickers.iter().position(|t| t == ticker)?;
        Some(ReturnSeries::new(
            self.dates
                .iter()
                .zip(&self.rows)
                .filter_map(|(d, r)| r[col].map(|v| (*d, v)))
                .collect(),
        ))
    }
}

/// Calendar bucket for resampling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    Month,
    Year,
}

/// Percentage change between consecutive rows; the first row is dropped.
pub fn simple_returns(table: &PriceTable) -> ReturnTable {
    let n = table.ticker_count();
    let mut dates = Vec::with_capacity(table.len().saturating_sub(1));
    let mut rows = Vec::with_capacity(table.len().saturating_sub(1));

    for i in 1..table.len() {
        let row = (0..n)
            .map(|col| match (table.get(i - 1, col), table.get(i, col)) {
                (Some(prev), Some(curr)) if prev != 0.0 => Some(curr / prev - 1.0),
                _ => None,
            })
            .collect();
        dates.push(table.dates()[i]);
        rows.push(row);
    }

    ReturnTable {
        dates,
        tickers: table.tickers().to_vec(),
        rows,
    }
}

/// Running product of `(1 + r)` minus one.
pub fn cumulative_returns(returns: &ReturnSeries) -> ReturnSeries {
    let mut growth = 1.0;
    ReturnSeries::new(
        returns
            .points()
            .iter()
            .map(|(d, r)| {
                growth *= 1.0 + r;
                (*d, growth - 1.0)
            })
            .collect(),
    )
}

/// Cumulative returns for each of `tickers` present in `table`, in the order
/// given. Tickers missing from the table are skipped.
pub fn cumulative_table(table: &PriceTable, tickers: &[Ticker]) -> Vec<(Ticker, ReturnSeries)> {
    let returns = simple_returns(table);
    tickers
        .iter()
        .filter_map(|t| returns.column(t).map(|s| (t.clone(), cumulative_returns(&s))))
        .collect()
}

/// Weighted sum of per-ticker simple returns at each date. Dates where any
/// ticker's return is undefined are dropped; unweighted tickers count as 0.
pub fn portfolio_returns(table: &PriceTable, weights: &WeightVector) -> ReturnSeries {
    let returns = simple_returns(table);
    let w: Vec<f64> = returns
        .tickers()
        .iter()
        .map(|t| weights.get(t).unwrap_or(0.0))
        .collect();

    let points = returns
        .dates()
        .iter()
        .enumerate()
        .filter_map(|(i, date)| {
            let row = returns.row(i);
            let mut total = 0.0;
            for (cell, wi) in row.iter().zip(&w) {
                total += (*cell)? * wi;
            }
            Some((*date, total))
        })
        .collect();

    ReturnSeries::new(points)
}

/// Last calendar day of the bucket containing `date`.
fn period_end(date: NaiveDate, period: Period) -> NaiveDate {
    let end = match period {
        Period::Month => date
            .with_day(1)
            .and_then(|first| first.checked_add_months(Months::new(1)))
            .and_then(|next| next.pred_opt()),
        Period::Year => NaiveDate::from_ymd_opt(date.year(), 12, 31),
    };
    end.unwrap_or(date)
}

fn bucket_key(date: NaiveDate, period: Period) -> (i32, u32) {
    match period {
        Period::Month => (date.year(), date.month()),
        Period::Year => (date.year(), 0),
    }
}

/// Compound daily returns into calendar buckets: `prod(1 + r) - 1` per bucket,
/// labelled with the bucket's calendar end date. Empty buckets are omitted.
pub fn resample(returns: &ReturnSeries, period: Period) -> ReturnSeries {
    let mut out: Vec<(NaiveDate, f64)> = Vec::new();
    let mut current: Option<((i32, u32), NaiveDate, f64)> = None;

    for (date, r) in returns.points() {
        let key = bucket_key(*date, period);
        match current.as_mut() {
            Some((k, _, growth)) if *k == key => *growth *= 1.0 + r,
            _ => {
                if let Some((_, label, growth)) = current.take() {
                    out.push((label, growth - 1.0));
                }
                current = Some((key, period_end(*date, period), 1.0 + r));
            }
        }
    }
    if let Some((_, label, growth)) = current {
        out.push((label, growth - 1.0));
    }

    ReturnSeries::new(out)
}

/// Inner join of two series on date.
pub fn align(a: &ReturnSeries, b: &ReturnSeries) -> (ReturnSeries, ReturnSeries) {
    let mut left = Vec::new();
    let mut right = Vec::new();
    let (mut i, mut j) = (0, 0);
    let (pa, pb) = (a.points(), b.points());

    while i < pa.len() && j < pb.len() {
        match pa[i].0.cmp(&pb[j].0) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                left.push(pa[i]);
                right.push(pb[j]);
                i += 1;
                j += 1;
            }
        }
    }

    (ReturnSeries::new(left), ReturnSeries::new(right))
}

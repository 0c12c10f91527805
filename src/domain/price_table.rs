//! Date-aligned closing price table.
//!
//! Per-ticker bar series are merged by an outer join on date. Cells a ticker
//! has no bar for are `None` until the table is aligned with a [`GapPolicy`].

use crate::domain::error::PortfolioError;
use crate::domain::ticker::Ticker;
use chrono::NaiveDate;
use std::collections::{BTreeSet, HashMap};
use std::str::FromStr;

/// A single daily close from a price source.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceBar {
    pub date: NaiveDate,
    pub close: f64,
}

impl PriceBar {
    pub fn new(date: NaiveDate, close: f64) -> Self {
        Self { date, close }
    }
}

/// How rows with missing cells are handled when aligning a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GapPolicy {
    /// Carry the previous close forward; leading incomplete rows are dropped.
    #[default]
    ForwardFill,
    /// Drop every row that has a missing cell.
    Drop,
}

impl FromStr for GapPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ffill" | "forward_fill" | "forward-fill" => Ok(GapPolicy::ForwardFill),
            "drop" | "dropna" => Ok(GapPolicy::Drop),
            other => Err(format!("unknown gap policy '{other}' (expected ffill or drop)")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PriceTable {
    dates: Vec<NaiveDate>,
    tickers: Vec<Ticker>,
    rows: Vec<Vec<Option<f64>>>,
}

impl PriceTable {
    /// Build a table from explicit rows. Dates must be strictly increasing and
    /// every row must have one cell per ticker.
    pub fn new(
        tickers: Vec<Ticker>,
        dates: Vec<NaiveDate>,
        rows: Vec<Vec<Option<f64>>>,
    ) -> Result<Self, PortfolioError> {
        if dates.len() != rows.len() {
            return Err(PortfolioError::InvalidRequest {
                field: "price_table".into(),
                reason: format!("{} dates but {} rows", dates.len(), rows.len()),
            });
        }
        if let Some(w) = dates.windows(2).find(|w| w[0] >= w[1]) {
            return Err(PortfolioError::InvalidRequest {
                field: "price_table".into(),
                reason: format!("dates not strictly increasing at {}", w[1]),
            });
        }
        if let Some(row) = rows.iter().find(|r| r.len() != tickers.len()) {
            return Err(PortfolioError::InvalidRequest {
                field: "price_table".into(),
                reason: format!("row has {} cells, expected {}", row.len(), tickers.len()),
            });
        }
        Ok(Self {
            dates,
            tickers,
            rows,
        })
    }

    /// Outer-join per-ticker bar series on date. Column order follows the
    /// input order; a duplicated date within one series keeps its last bar.
    /// Non-finite closes are treated as missing.
    pub fn outer_join(series: Vec<(Ticker, Vec<PriceBar>)>) -> Self {
        let dates: Vec<NaiveDate> = series
            .iter()
            .flat_map(|(_, bars)| bars.iter().map(|b| b.date))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let lookups: Vec<HashMap<NaiveDate, f64>> = series
            .iter()
            .map(|(_, bars)| {
                bars.iter()
                    .filter(|b| b.close.is_finite())
                    .map(|b| (b.date, b.close))
                    .collect()
            })
            .collect();

        let rows = dates
            .iter()
            .map(|date| lookups.iter().map(|m| m.get(date).copied()).collect())
            .collect();

        Self {
            dates,
            tickers: series.into_iter().map(|(t, _)| t).collect(),
            rows,
        }
    }

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

    pub fn ticker_count(&self) -> usize {
        self.tickers.len()
    }

    pub fn ticker_index(&self, ticker: &Ticker) -> Option<usize> {
        self.tickers.iter().position(|t| t == ticker)
    }

    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        self.rows.get(row).and_then(|r| r.get(col)).copied().flatten()
    }

    pub fn row(&self, row: usize) -> &[Option<f64>] {
        &self.rows[row]
    }

    /// Non-missing `(date, close)` pairs of one ticker.
    pub fn column(&self, ticker: &Ticker) -> Option<Vec<(NaiveDate, f64)>> {
        let col = self.ticker_index(ticker)?;
        Some(
            self.dates
                .iter()
                .zip(&self.rows)
                .filter_map(|(d, r)| r[col].map(|p| (*d, p)))
                .collect(),
        )
    }

    /// Number of non-missing closes in a column.
    pub fn observations(&self, col: usize) -> usize {
        self.rows.iter().filter(|r| r[col].is_some()).count()
    }

    pub fn is_complete(&self) -> bool {
        self.rows.iter().all(|r| r.iter().all(Option::is_some))
    }

    /// Last available close per ticker, skipping tickers with no data.
    pub fn latest_prices(&self) -> HashMap<Ticker, f64> {
        self.tickers
            .iter()
            .enumerate()
            .filter_map(|(col, t)| {
                self.rows
                    .iter()
                    .rev()
                    .find_map(|r| r[col])
                    .map(|p| (t.clone(), p))
            })
            .collect()
    }

    /// Produce a gap-free table according to `policy`.
    pub fn aligned(&self, policy: GapPolicy) -> PriceTable {
        let mut dates = Vec::with_capacity(self.dates.len());
        let mut rows = Vec::with_capacity(self.rows.len());

        match policy {
            GapPolicy::Drop => {
                for (date, row) in self.dates.iter().zip(&self.rows) {
                    if row.iter().all(Option::is_some) {
                        dates.push(*date);
                        rows.push(row.clone());
                    }
                }
            }
            GapPolicy::ForwardFill => {
                let mut last: Vec<Option<f64>> = vec![None; self.tickers.len()];
                for (date, row) in self.dates.iter().zip(&self.rows) {
                    for (slot, cell) in last.iter_mut().zip(row) {
                        if cell.is_some() {
                            *slot = *cell;
                        }
                    }
                    if last.iter().all(Option::is_some) {
                        dates.push(*date);
                        rows.push(last.clone());
                    }
                }
            }
        }

        PriceTable {
            dates,
            tickers: self.tickers.clone(),
            rows,
        }
    }
}

//! Price series repository: one range query per ticker, merged into a
//! date-aligned table. A ticker that fails or returns nothing is skipped,
//! never fatal by itself.

use crate::domain::error::PortfolioError;
use crate::domain::price_table::{PriceBar, PriceTable};
use crate::domain::ticker::Ticker;
use crate::ports::price_port::PricePort;
use chrono::NaiveDate;
use std::fmt;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    NoData,
    Upstream(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::NoData => f.write_str("no data in range"),
            SkipReason::Upstream(reason) => write!(f, "upstream error: {reason}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SkippedTicker {
    pub ticker: Ticker,
    pub reason: SkipReason,
}

#[derive(Debug, Clone)]
pub struct RepositoryFetch {
    /// Outer-joined closes of every ticker that returned data, in requested
    /// order. Gaps are still `None`.
    pub table: PriceTable,
    pub skipped: Vec<SkippedTicker>,
}

fn skip_reason(err: PortfolioError) -> SkipReason {
    match err {
        PortfolioError::UpstreamFetch { reason, .. } => SkipReason::Upstream(reason),
        _ => SkipReason::NoData,
    }
}

enum Outcome {
    Bars(Vec<PriceBar>),
    Skipped(SkipReason),
}

pub struct PriceRepository<'a> {
    port: &'a (dyn PricePort + Sync),
    parallel: bool,
}

impl<'a> PriceRepository<'a> {
    pub fn new(port: &'a (dyn PricePort + Sync)) -> Self {
        Self {
            port,
            parallel: false,
        }
    }

    /// Run per-ticker fetches on scoped threads. Merge order is unchanged.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn fetch_table(
        &self,
        tickers: &[Ticker],
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<RepositoryFetch, PortfolioError> {
        let outcomes: Vec<Result<Outcome, PortfolioError>> = if self.parallel && tickers.len() > 1 {
            std::thread::scope(|scope| {
                let handles: Vec<_> = tickers
                    .iter()
                    .map(|ticker| scope.spawn(move || self.fetch_one(ticker, start, end)))
                    .collect();
                handles
                    .into_iter()
                    .zip(tickers)
                    .map(|(handle, ticker)| {
                        handle.join().unwrap_or_else(|_| {
                            Ok(Outcome::Skipped(SkipReason::Upstream(format!(
                                "fetch thread for {ticker} panicked"
                            ))))
                        })
                    })
                    .collect()
            })
        } else {
            tickers
                .iter()
                .map(|ticker| self.fetch_one(ticker, start, end))
                .collect()
        };

        let mut series = Vec::new();
        let mut skipped = Vec::new();
        for (ticker, outcome) in tickers.iter().zip(outcomes) {
            match outcome? {
                Outcome::Bars(bars) => series.push((ticker.clone(), bars)),
                Outcome::Skipped(reason) => {
                    warn!(ticker = %ticker, %reason, "skipping ticker");
                    skipped.push(SkippedTicker {
                        ticker: ticker.clone(),
                        reason,
                    });
                }
            }
        }

        Ok(RepositoryFetch {
            table: PriceTable::outer_join(series),
            skipped,
        })
    }

    /// Fetch a single ticker, filtered to `[start, end]` and sorted.
    pub fn fetch_series(
        &self,
        ticker: &Ticker,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Option<Vec<PriceBar>>, PortfolioError> {
        match self.fetch_one(ticker, start, end)? {
            Outcome::Bars(bars) => Ok(Some(bars)),
            Outcome::Skipped(reason) => {
                warn!(ticker = %ticker, %reason, "no series");
                Ok(None)
            }
        }
    }

    fn fetch_one(
        &self,
        ticker: &Ticker,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Outcome, PortfolioError> {
        let mut bars = match self.port.fetch_closes(ticker, start, end) {
            Ok(bars) => bars,
            Err(e) if e.is_per_ticker() => return Ok(Outcome::Skipped(skip_reason(e))),
            Err(e) => return Err(e),
        };

        bars.retain(|b| b.date >= start && b.date <= end && b.close.is_finite());
        bars.sort_by_key(|b| b.date);
        if bars.is_empty() {
            return Ok(Outcome::Skipped(SkipReason::NoData));
        }
        debug!(ticker = %ticker, bars = bars.len(), "fetched closes");
        Ok(Outcome::Bars(bars))
    }
}

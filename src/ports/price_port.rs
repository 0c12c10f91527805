//! Price source port trait.

use crate::domain::error::PortfolioError;
use crate::domain::price_table::PriceBar;
use crate::domain::ticker::Ticker;
use chrono::NaiveDate;

/// A source of daily closing prices.
///
/// Implementations return bars in any order; the repository sorts and filters
/// to `[start, end]`, and a duplicated date keeps its last bar. A ticker with
/// no data should yield `PortfolioError::DataUnavailable` (or an empty
/// vector); transport and upstream failures should yield
/// `PortfolioError::UpstreamFetch`.
pub trait PricePort {
    fn fetch_closes(
        &self,
        ticker: &Ticker,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PriceBar>, PortfolioError>;
}

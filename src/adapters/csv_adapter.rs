//! CSV file price adapter: one `{TICKER}.csv` per ticker with `date` and
//! `close` columns located by header name.

use crate::domain::error::PortfolioError;
use crate::domain::price_table::PriceBar;
use crate::domain::ticker::Ticker;
use crate::ports::price_port::PricePort;
use chrono::NaiveDate;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

pub struct CsvAdapter {
    base_path: PathBuf,
}

impl CsvAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn csv_path(&self, ticker: &Ticker) -> PathBuf {
        self.base_path.join(format!("{}.csv", ticker))
    }
}

fn malformed(ticker: &Ticker, reason: String) -> PortfolioError {
    PortfolioError::UpstreamFetch {
        ticker: ticker.to_string(),
        reason,
    }
}

impl PricePort for CsvAdapter {
    fn fetch_closes(
        &self,
        ticker: &Ticker,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PriceBar>, PortfolioError> {
        let path = self.csv_path(ticker);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(PortfolioError::DataUnavailable {
                    ticker: ticker.to_string(),
                });
            }
            Err(e) => {
                return Err(malformed(
                    ticker,
                    format!("failed to read {}: {}", path.display(), e),
                ));
            }
        };

        let mut rdr = csv::Reader::from_reader(content.as_bytes());
        let headers = rdr
            .headers()
            .map_err(|e| malformed(ticker, format!("CSV header error: {}", e)))?
            .clone();
        let column = |name: &str| {
            headers
                .iter()
                .position(|h| h.trim().eq_ignore_ascii_case(name))
        };
        let date_col = column("date").unwrap_or(0);
        let close_col = column("close")
            .ok_or_else(|| malformed(ticker, "missing close column".into()))?;

        let mut bars = Vec::new();
        for result in rdr.records() {
            let record =
                result.map_err(|e| malformed(ticker, format!("CSV parse error: {}", e)))?;

            let date_str = record
                .get(date_col)
                .ok_or_else(|| malformed(ticker, "missing date column".into()))?;
            let date = NaiveDate::parse_from_str(date_str.trim(), "%Y-%m-%d")
                .map_err(|e| malformed(ticker, format!("invalid date {date_str:?}: {}", e)))?;

            if date < start || date > end {
                continue;
            }

            // Blank closes are gaps, not errors.
            let raw = record.get(close_col).unwrap_or("").trim();
            if raw.is_empty() {
                continue;
            }
            let close: f64 = raw
                .parse()
                .map_err(|e| malformed(ticker, format!("invalid close {raw:?}: {}", e)))?;

            bars.push(PriceBar::new(date, close));
        }

        bars.sort_by_key(|b| b.date);
        Ok(bars)
    }
}

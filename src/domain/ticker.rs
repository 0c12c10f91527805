//! Ticker symbols and ticker-list parsing.
//!
//! Input is case-insensitive; once normalized a `Ticker` compares
//! case-sensitively.

use std::collections::HashSet;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ticker(String);

impl Ticker {
    /// Trim and uppercase a raw symbol. Returns `None` for blank input.
    pub fn normalize(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Ticker(trimmed.to_uppercase()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Ticker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Ticker {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum TickerError {
    #[error("empty token in ticker list")]
    EmptyToken,

    #[error("duplicate ticker: {0}")]
    Duplicate(String),
}

/// Parse a comma-separated ticker list, preserving order.
pub fn parse_tickers(input: &str) -> Result<Vec<Ticker>, TickerError> {
    let mut tickers = Vec::new();
    let mut seen = HashSet::new();

    for token in input.split(',') {
        let ticker = Ticker::normalize(token).ok_or(TickerError::EmptyToken)?;
        if !seen.insert(ticker.clone()) {
            return Err(TickerError::Duplicate(ticker.0));
        }
        tickers.push(ticker);
    }

    Ok(tickers)
}

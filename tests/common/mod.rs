#![allow(dead_code)]

use chrono::{Days, NaiveDate};
use pfopt::domain::error::PortfolioError;
pub use pfopt::domain::price_table::PriceBar;
use pfopt::domain::request::OptimizationRequest;
use pfopt::domain::ticker::Ticker;
use pfopt::ports::price_port::PricePort;
use std::collections::HashMap;
use std::sync::Mutex;

pub struct MockPricePort {
    pub data: HashMap<String, Vec<PriceBar>>,
    pub errors: HashMap<String, String>,
    pub calls: Mutex<Vec<String>>,
}

impl MockPricePort {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
            errors: HashMap::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_bars(mut self, ticker: &str, bars: Vec<PriceBar>) -> Self {
        self.data.insert(ticker.to_string(), bars);
        self
    }

    pub fn with_error(mut self, ticker: &str, reason: &str) -> Self {
        self.errors.insert(ticker.to_string(), reason.to_string());
        self
    }

    pub fn call_count(&self, ticker: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.as_str() == ticker)
            .count()
    }
}

impl PricePort for MockPricePort {
    fn fetch_closes(
        &self,
        ticker: &Ticker,
        _start: NaiveDate,
        _end: NaiveDate,
    ) -> Result<Vec<PriceBar>, PortfolioError> {
        self.calls.lock().unwrap().push(ticker.to_string());
        if let Some(reason) = self.errors.get(ticker.as_str()) {
            return Err(PortfolioError::UpstreamFetch {
                ticker: ticker.to_string(),
                reason: reason.clone(),
            });
        }
        match self.data.get(ticker.as_str()) {
            Some(bars) if !bars.is_empty() => Ok(bars.clone()),
            _ => Err(PortfolioError::DataUnavailable {
                ticker: ticker.to_string(),
            }),
        }
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn ticker(s: &str) -> Ticker {
    Ticker::normalize(s).unwrap()
}

pub fn make_bar(date: &str, close: f64) -> PriceBar {
    PriceBar::new(NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(), close)
}

/// Daily closes starting at `start_price`, one per calendar day from
/// `start`, following the given per-day returns.
pub fn bars_from_returns(start: NaiveDate, start_price: f64, returns: &[f64]) -> Vec<PriceBar> {
    let mut price = start_price;
    let mut bars = vec![PriceBar::new(start, price)];
    for (i, r) in returns.iter().enumerate() {
        price *= 1.0 + r;
        bars.push(PriceBar::new(start + Days::new(i as u64 + 1), price));
    }
    bars
}

/// Returns alternating around `mean` by `amplitude`.
pub fn alternating_returns(count: usize, mean: f64, amplitude: f64) -> Vec<f64> {
    (0..count)
        .map(|i| if i % 2 == 0 { mean + amplitude } else { mean - amplitude })
        .collect()
}

/// Returns stepping through `mean + amplitude * k` for `k` in
/// `-(period-1)/2 ..= (period-1)/2`. Odd periods that are coprime give
/// uncorrelated series over whole cycles.
pub fn periodic_returns(count: usize, mean: f64, amplitude: f64, period: usize) -> Vec<f64> {
    let half = (period as f64 - 1.0) / 2.0;
    (0..count)
        .map(|i| mean + amplitude * ((i % period) as f64 - half))
        .collect()
}

pub const START: (i32, u32, u32) = (2023, 1, 1);

pub fn start() -> NaiveDate {
    date(START.0, START.1, START.2)
}

/// Three assets over ~8 months: a steady winner, a noisy laggard and a
/// middling third.
pub fn three_asset_port() -> MockPricePort {
    MockPricePort::new()
        .with_bars(
            "AAA",
            bars_from_returns(start(), 50.0, &alternating_returns(240, 0.0008, 0.003)),
        )
        .with_bars(
            "BBB",
            bars_from_returns(start(), 80.0, &periodic_returns(240, 0.0003, 0.004, 5)),
        )
        .with_bars(
            "CCC",
            bars_from_returns(start(), 120.0, &periodic_returns(240, 0.0005, 0.003, 3)),
        )
}

pub fn request(tickers: &[&str], investment: f64) -> OptimizationRequest {
    OptimizationRequest::new(
        tickers.iter().map(|t| ticker(t)).collect(),
        start(),
        date(2023, 12, 31),
        investment,
    )
}

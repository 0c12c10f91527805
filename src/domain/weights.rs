//! Portfolio weight vector.

use crate::domain::ticker::Ticker;

/// Tolerance on `sum(weights) == 1` for a valid weight vector.
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-4;

/// Ordered ticker → fraction-of-capital mapping.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WeightVector {
    entries: Vec<(Ticker, f64)>,
}

impl WeightVector {
    pub fn new(entries: Vec<(Ticker, f64)>) -> Self {
        Self { entries }
    }

    pub fn from_parts(tickers: &[Ticker], values: &[f64]) -> Self {
        Self {
            entries: tickers.iter().cloned().zip(values.iter().copied()).collect(),
        }
    }

    pub fn get(&self, ticker: &Ticker) -> Option<f64> {
        self.entries
            .iter()
            .find(|(t, _)| t == ticker)
            .map(|(_, w)| *w)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Ticker, f64)> {
        self.entries.iter().map(|(t, w)| (t, *w))
    }

    pub fn tickers(&self) -> Vec<Ticker> {
        self.entries.iter().map(|(t, _)| t.clone()).collect()
    }

    pub fn values(&self) -> Vec<f64> {
        self.entries.iter().map(|(_, w)| *w).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn sum(&self) -> f64 {
        self.entries.iter().map(|(_, w)| w).sum()
    }

    /// Tickers carrying a strictly positive weight.
    pub fn held(&self) -> impl Iterator<Item = (&Ticker, f64)> {
        self.iter().filter(|(_, w)| *w > 0.0)
    }

    pub fn sums_to_one(&self) -> bool {
        (self.sum() - 1.0).abs() <= WEIGHT_SUM_TOLERANCE
    }
}

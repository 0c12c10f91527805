//! Discrete share allocation under a cash budget.
//!
//! Greedy: one share at a time goes to the held ticker with the largest
//! remaining dollar deficit among those whose next share is still affordable.
//! While every affordable ticker stays affordable, those purchases follow
//! the merged order of per-share deficits, so whole deficit levels are bought
//! at once and single shares are only placed near an affordability edge.

use crate::domain::error::PortfolioError;
use crate::domain::ticker::Ticker;
use crate::domain::weights::WeightVector;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
pub struct AllocationResult {
    pub shares: Vec<(Ticker, u64)>,
    pub leftover: f64,
}

impl AllocationResult {
    pub fn shares_of(&self, ticker: &Ticker) -> u64 {
        self.shares
            .iter()
            .find(|(t, _)| t == ticker)
            .map(|(_, n)| *n)
            .unwrap_or(0)
    }

    pub fn total_shares(&self) -> u64 {
        self.shares.iter().map(|(_, n)| n).sum()
    }

    /// Cash spent at `prices`.
    pub fn spent(&self, prices: &HashMap<Ticker, f64>) -> f64 {
        self.shares
            .iter()
            .map(|(t, n)| prices.get(t).copied().unwrap_or(0.0) * *n as f64)
            .sum()
    }
}

struct Slot<'a> {
    ticker: &'a Ticker,
    price: f64,
    target: f64,
    shares: u64,
}

impl Slot<'_> {
    fn deficit(&self) -> f64 {
        self.deficit_after(0)
    }

    /// Deficit before buying share number `self.shares + extra`.
    fn deficit_after(&self, extra: u64) -> f64 {
        self.target - self.price * (self.shares + extra) as f64
    }

    /// Next shares whose deficit before purchase is above `level`.
    fn shares_above(&self, level: f64) -> u64 {
        let deficit = self.deficit();
        if deficit <= level {
            return 0;
        }
        let mut count = ((deficit - level) / self.price).ceil().max(1.0) as u64;
        while count > 0 && self.deficit_after(count - 1) <= level {
            count -= 1;
        }
        while self.deficit_after(count) > level {
            count += 1;
        }
        count
    }
}

const LEVEL_SEARCH_STEPS: usize = 200;

/// Buy every share of `active` whose deficit lies above the lowest level that
/// costs at most `slack`. Returns the number of shares bought.
fn buy_deficit_levels(slots: &mut [Slot<'_>], active: &[usize], slack: f64) -> u64 {
    let cost = |level: f64| -> f64 {
        active
            .iter()
            .map(|&i| slots[i].price * slots[i].shares_above(level) as f64)
            .sum()
    };
    let max_price = active.iter().map(|&i| slots[i].price).fold(0.0, f64::max);
    let mut high = active
        .iter()
        .map(|&i| slots[i].deficit())
        .fold(f64::NEG_INFINITY, f64::max);
    // The top slot alone costs more than `slack` down to here.
    let mut low = high - slack - max_price - 1.0;
    for _ in 0..LEVEL_SEARCH_STEPS {
        let mid = 0.5 * (low + high);
        if mid <= low || mid >= high {
            break;
        }
        if cost(mid) <= slack {
            high = mid;
        } else {
            low = mid;
        }
    }

    let counts: Vec<u64> = active.iter().map(|&i| slots[i].shares_above(high)).collect();
    for (&i, n) in active.iter().zip(&counts) {
        slots[i].shares += n;
    }
    counts.iter().sum()
}

/// Convert continuous weights into whole shares. Only tickers with a
/// positive weight participate.
pub fn greedy_allocation(
    weights: &WeightVector,
    latest_prices: &HashMap<Ticker, f64>,
    budget: f64,
) -> Result<AllocationResult, PortfolioError> {
    if !budget.is_finite() || budget <= 0.0 {
        return Err(PortfolioError::InvalidRequest {
            field: "investment".into(),
            reason: format!("must be positive, got {budget}"),
        });
    }

    let mut slots = Vec::new();
    for (ticker, weight) in weights.held() {
        let price = match latest_prices.get(ticker) {
            Some(p) if p.is_finite() && *p > 0.0 => *p,
            _ => {
                return Err(PortfolioError::MissingPrice {
                    ticker: ticker.to_string(),
                });
            }
        };
        slots.push(Slot {
            ticker,
            price,
            target: weight * budget,
            shares: 0,
        });
    }

    let cheapest = slots.iter().map(|s| s.price).fold(f64::INFINITY, f64::min);
    if slots.is_empty() || cheapest > budget {
        return Err(PortfolioError::BudgetTooSmall { budget, cheapest });
    }

    loop {
        let spent: f64 = slots.iter().map(|s| s.price * s.shares as f64).sum();
        let remaining = budget - spent;
        let active: Vec<usize> = (0..slots.len())
            .filter(|&i| slots[i].price <= remaining)
            .collect();
        if active.is_empty() {
            break;
        }

        // Purchases keep at least the dearest active price in hand, so no
        // active slot drops out partway through the batch.
        let max_price = active.iter().map(|&i| slots[i].price).fold(0.0, f64::max);
        if buy_deficit_levels(&mut slots, &active, remaining - max_price) > 0 {
            continue;
        }

        let mut best = active[0];
        for &i in &active[1..] {
            if slots[i].deficit() > slots[best].deficit() {
                best = i;
            }
        }
        slots[best].shares += 1;
    }

    let spent: f64 = slots.iter().map(|s| s.price * s.shares as f64).sum();
    Ok(AllocationResult {
        shares: slots
            .iter()
            .map(|s| (s.ticker.clone(), s.shares))
            .collect(),
        leftover: (budget - spent).max(0.0),
    })
}

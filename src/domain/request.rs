//! Optimization request and its validation.

use crate::domain::error::PortfolioError;
use crate::domain::optimizer::{BoxConstraints, RiskProfile};
use crate::domain::price_table::GapPolicy;
use crate::domain::ticker::Ticker;
use chrono::NaiveDate;

#[derive(Debug, Clone, PartialEq)]
pub struct OptimizationRequest {
    pub tickers: Vec<Ticker>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub investment: f64,
    pub min_weight: f64,
    pub max_weight: f64,
    pub risk_profile: RiskProfile,
    pub benchmark: Option<Ticker>,
    pub risk_free_rate: f64,
    pub gap_policy: GapPolicy,
    pub compounding: bool,
    /// Per-ticker `(ticker, min, max)` bounds replacing the uniform ones.
    pub bound_overrides: Vec<(Ticker, f64, f64)>,
}

impl OptimizationRequest {
    /// A request with the default bounds `[0, 1]`, medium risk and no
    /// benchmark.
    pub fn new(
        tickers: Vec<Ticker>,
        start_date: NaiveDate,
        end_date: NaiveDate,
        investment: f64,
    ) -> Self {
        Self {
            tickers,
            start_date,
            end_date,
            investment,
            min_weight: 0.0,
            max_weight: 1.0,
            risk_profile: RiskProfile::default(),
            benchmark: None,
            risk_free_rate: 0.0,
            gap_policy: GapPolicy::default(),
            compounding: false,
            bound_overrides: Vec::new(),
        }
    }

    pub fn validate(&self) -> Result<(), PortfolioError> {
        if self.tickers.is_empty() {
            return Err(invalid("tickers", "at least one ticker is required"));
        }
        if self.start_date >= self.end_date {
            return Err(invalid(
                "start_date",
                &format!(
                    "start {} must be before end {}",
                    self.start_date, self.end_date
                ),
            ));
        }
        if !self.investment.is_finite() || self.investment <= 0.0 {
            return Err(invalid(
                "investment",
                &format!("must be positive, got {}", self.investment),
            ));
        }
        if !self.risk_free_rate.is_finite() {
            return Err(invalid("risk_free_rate", "must be finite"));
        }
        self.constraints()?;
        Ok(())
    }

    pub fn constraints(&self) -> Result<BoxConstraints, PortfolioError> {
        self.bound_overrides.iter().try_fold(
            BoxConstraints::new(self.min_weight, self.max_weight)?,
            |constraints, (ticker, min, max)| constraints.with_override(ticker.clone(), *min, *max),
        )
    }
}

fn invalid(field: &str, reason: &str) -> PortfolioError {
    PortfolioError::InvalidRequest {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

//! Mean-variance optimizer over long-only, box-constrained weights.
//!
//! Both objectives are solved by projected gradient ascent on the feasible set
//! `{ w : sum(w) = 1, lo_i <= w_i <= hi_i }`. The projection onto that set is
//! exact: it bisects on the shift `tau` in `clamp(v_i - tau, lo_i, hi_i)`.

use crate::domain::error::PortfolioError;
use crate::domain::estimator::{CovarianceMatrix, ExpectedReturns};
use crate::domain::ticker::Ticker;
use crate::domain::weights::WeightVector;
use nalgebra::{DMatrix, DVector};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

pub const DEFAULT_CLEAN_TOLERANCE: f64 = 1e-4;
pub const LOW_RISK_AVERSION: f64 = 0.1;
pub const HIGH_RISK_AVERSION: f64 = 10.0;

const FEASIBILITY_SLACK: f64 = 1e-9;
const BISECTION_ROUNDS: usize = 200;
const ARMIJO: f64 = 1e-4;
const MAX_STEP: f64 = 1e4;
const MIN_STEP: f64 = 1e-16;
/// Step used when the objective has no curvature (zero covariance).
const LINEAR_STEP: f64 = 1e6;
/// Annualized variance below this is rounding noise from flat price paths.
const MIN_VARIANCE: f64 = 1e-18;

/// Lower/upper weight bounds, uniform with optional per-ticker overrides.
#[derive(Debug, Clone, PartialEq)]
pub struct BoxConstraints {
    pub min_weight: f64,
    pub max_weight: f64,
    overrides: Vec<(Ticker, f64, f64)>,
}

fn check_bounds(field: &str, min: f64, max: f64) -> Result<(), PortfolioError> {
    let reason = if !min.is_finite() || !max.is_finite() {
        "bounds must be finite"
    } else if min < 0.0 || max > 1.0 {
        "bounds must lie in [0, 1]"
    } else if min > max {
        "min_weight must not exceed max_weight"
    } else {
        return Ok(());
    };
    Err(PortfolioError::InvalidRequest {
        field: field.to_string(),
        reason: format!("{reason} (got [{min}, {max}])"),
    })
}

impl BoxConstraints {
    pub fn new(min_weight: f64, max_weight: f64) -> Result<Self, PortfolioError> {
        check_bounds("weight_bounds", min_weight, max_weight)?;
        Ok(Self {
            min_weight,
            max_weight,
            overrides: Vec::new(),
        })
    }

    /// Replace the uniform bounds for one ticker.
    pub fn with_override(mut self, ticker: Ticker, min: f64, max: f64) -> Result<Self, PortfolioError> {
        check_bounds(ticker.as_str(), min, max)?;
        self.overrides.retain(|(t, _, _)| *t != ticker);
        self.overrides.push((ticker, min, max));
        Ok(self)
    }

    pub fn bounds_for(&self, tickers: &[Ticker]) -> Vec<(f64, f64)> {
        tickers
            .iter()
            .map(|t| {
                self.overrides
                    .iter()
                    .find(|(o, _, _)| o == t)
                    .map(|(_, lo, hi)| (*lo, *hi))
                    .unwrap_or((self.min_weight, self.max_weight))
            })
            .collect()
    }

    /// Fails when no weight vector within the bounds can sum to one.
    pub fn check_feasible(&self, tickers: &[Ticker]) -> Result<(), PortfolioError> {
        let bounds = self.bounds_for(tickers);
        let lower: f64 = bounds.iter().map(|b| b.0).sum();
        let upper: f64 = bounds.iter().map(|b| b.1).sum();
        if tickers.is_empty() || lower > 1.0 + FEASIBILITY_SLACK || upper < 1.0 - FEASIBILITY_SLACK {
            return Err(PortfolioError::InfeasibleConstraints {
                min_weight: self.min_weight,
                max_weight: self.max_weight,
                assets: tickers.len(),
            });
        }
        Ok(())
    }
}

impl Default for BoxConstraints {
    fn default() -> Self {
        Self {
            min_weight: 0.0,
            max_weight: 1.0,
            overrides: Vec::new(),
        }
    }
}

/// User-facing risk-aversion level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RiskProfile {
    Low,
    #[default]
    Medium,
    High,
}

impl RiskProfile {
    pub fn objective(self) -> Objective {
        match self {
            RiskProfile::Low => Objective::MaxQuadraticUtility {
                risk_aversion: LOW_RISK_AVERSION,
            },
            RiskProfile::Medium => Objective::MaxSharpe,
            RiskProfile::High => Objective::MaxQuadraticUtility {
                risk_aversion: HIGH_RISK_AVERSION,
            },
        }
    }
}

impl FromStr for RiskProfile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(RiskProfile::Low),
            "medium" => Ok(RiskProfile::Medium),
            "high" => Ok(RiskProfile::High),
            other => Err(format!("unknown risk profile '{other}' (expected low, medium or high)")),
        }
    }
}

impl fmt::Display for RiskProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RiskProfile::Low => "low",
            RiskProfile::Medium => "medium",
            RiskProfile::High => "high",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Objective {
    MaxSharpe,
    MaxQuadraticUtility { risk_aversion: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolverSettings {
    pub max_iterations: usize,
    /// Convergence threshold on the max-norm of the projected gradient step.
    pub tolerance: f64,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            max_iterations: 20_000,
            tolerance: 1e-9,
        }
    }
}

/// Expected annual return, annual volatility and Sharpe ratio of a portfolio.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PortfolioPerformance {
    pub expected_return: f64,
    pub volatility: f64,
    pub sharpe_ratio: f64,
}

#[derive(Debug, Clone)]
pub struct Optimizer {
    tickers: Vec<Ticker>,
    mu: DVector<f64>,
    sigma: DMatrix<f64>,
    bounds: Vec<(f64, f64)>,
    risk_free_rate: f64,
    settings: SolverSettings,
}

impl Optimizer {
    /// Validates dimensions and constraint feasibility before any solve.
    pub fn new(
        expected: &ExpectedReturns,
        cov: &CovarianceMatrix,
        constraints: &BoxConstraints,
    ) -> Result<Self, PortfolioError> {
        if expected.tickers != cov.tickers
            || cov.matrix.nrows() != cov.tickers.len()
            || cov.matrix.ncols() != cov.tickers.len()
            || expected.values.len() != expected.tickers.len()
        {
            return Err(PortfolioError::OptimizationFailed {
                reason: "expected returns and covariance disagree on tickers".into(),
            });
        }
        constraints.check_feasible(&expected.tickers)?;

        Ok(Self {
            tickers: expected.tickers.clone(),
            mu: expected.values.clone(),
            sigma: cov.matrix.clone(),
            bounds: constraints.bounds_for(&expected.tickers),
            risk_free_rate: 0.0,
            settings: SolverSettings::default(),
        })
    }

    pub fn with_risk_free_rate(mut self, risk_free_rate: f64) -> Self {
        self.risk_free_rate = risk_free_rate;
        self
    }

    pub fn with_settings(mut self, settings: SolverSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn tickers(&self) -> &[Ticker] {
        &self.tickers
    }

    pub fn risk_free_rate(&self) -> f64 {
        self.risk_free_rate
    }

    pub fn optimize(&self, objective: Objective) -> Result<WeightVector, PortfolioError> {
        match objective {
            Objective::MaxSharpe => self.maximize_sharpe(),
            Objective::MaxQuadraticUtility { risk_aversion } => {
                self.maximize_quadratic_utility(risk_aversion)
            }
        }
    }

    /// Maximize `(mu.w - r_f) / sqrt(w' S w)`.
    pub fn maximize_sharpe(&self) -> Result<WeightVector, PortfolioError> {
        if !self.mu.iter().any(|m| *m > self.risk_free_rate) {
            return Err(PortfolioError::OptimizationFailed {
                reason: "no asset has an expected return above the risk-free rate".into(),
            });
        }

        let mut w = self.initial_weights();
        if self.excess_return(&w) <= 0.0 {
            w = self.project(&(&self.mu * LINEAR_STEP));
            if self.excess_return(&w) <= 0.0 {
                return Err(PortfolioError::OptimizationFailed {
                    reason: "no feasible portfolio beats the risk-free rate".into(),
                });
            }
        }

        let mut step = 1.0_f64;
        for iteration in 0..self.settings.max_iterations {
            let (sharpe, grad) = self.sharpe_and_gradient(&w)?;

            let mapped = self.project(&(&w + &grad));
            if (&mapped - &w).amax() < self.settings.tolerance {
                debug!(iteration, sharpe, "max sharpe converged");
                return Ok(self.to_weights(&w));
            }

            step = (step * 2.0).min(MAX_STEP);
            loop {
                let candidate = self.project(&(&w + step * &grad));
                let gain = grad.dot(&(&candidate - &w));
                if self.sharpe(&candidate) >= sharpe + ARMIJO * gain {
                    w = candidate;
                    break;
                }
                step *= 0.5;
                if step < MIN_STEP {
                    debug!(iteration, sharpe, "max sharpe stalled at numerical precision");
                    return Ok(self.to_weights(&w));
                }
            }
        }

        Err(PortfolioError::OptimizationFailed {
            reason: format!(
                "max sharpe did not converge in {} iterations",
                self.settings.max_iterations
            ),
        })
    }

    /// Maximize `mu.w - (risk_aversion / 2) w' S w`.
    pub fn maximize_quadratic_utility(&self, risk_aversion: f64) -> Result<WeightVector, PortfolioError> {
        if !risk_aversion.is_finite() || risk_aversion <= 0.0 {
            return Err(PortfolioError::InvalidRequest {
                field: "risk_aversion".into(),
                reason: format!("must be positive, got {risk_aversion}"),
            });
        }

        // Gershgorin bound on the largest eigenvalue gives a safe 1/L step.
        let max_row_sum = self
            .sigma
            .row_iter()
            .map(|r| r.iter().map(|x| x.abs()).sum::<f64>())
            .fold(0.0, f64::max);
        let lipschitz = risk_aversion * max_row_sum;
        let step = if lipschitz > 1e-12 {
            1.0 / lipschitz
        } else {
            LINEAR_STEP
        };

        let mut w = self.initial_weights();
        for iteration in 0..self.settings.max_iterations {
            let grad = &self.mu - risk_aversion * (&self.sigma * &w);
            if grad.iter().any(|g| !g.is_finite()) {
                return Err(PortfolioError::OptimizationFailed {
                    reason: "non-finite utility gradient".into(),
                });
            }
            let next = self.project(&(&w + step * &grad));
            let change = (&next - &w).amax();
            w = next;
            if change < self.settings.tolerance {
                debug!(iteration, risk_aversion, "quadratic utility converged");
                return Ok(self.to_weights(&w));
            }
        }

        Err(PortfolioError::OptimizationFailed {
            reason: format!(
                "quadratic utility did not converge in {} iterations",
                self.settings.max_iterations
            ),
        })
    }

    /// Clean `raw` without leaving this optimizer's bounds.
    pub fn clean_weights(&self, raw: &WeightVector, tolerance: f64) -> WeightVector {
        let bounds: Vec<(f64, f64)> = raw
            .tickers()
            .iter()
            .map(|t| {
                self.tickers
                    .iter()
                    .position(|known| known == t)
                    .map_or((0.0, 1.0), |i| self.bounds[i])
            })
            .collect();
        clean_weights_within(raw, tolerance, &bounds)
    }

    /// Expected return, volatility and Sharpe ratio of `weights`. Tickers the
    /// optimizer does not know are ignored; missing ones count as zero.
    pub fn portfolio_performance(&self, weights: &WeightVector) -> PortfolioPerformance {
        let w = DVector::from_iterator(
            self.tickers.len(),
            self.tickers.iter().map(|t| weights.get(t).unwrap_or(0.0)),
        );
        let expected_return = self.mu.dot(&w);
        let volatility = self.variance(&w).max(0.0).sqrt();
        let sharpe_ratio = if volatility > 0.0 {
            (expected_return - self.risk_free_rate) / volatility
        } else {
            0.0
        };
        PortfolioPerformance {
            expected_return,
            volatility,
            sharpe_ratio,
        }
    }

    fn initial_weights(&self) -> DVector<f64> {
        let n = self.tickers.len();
        self.project(&DVector::from_element(n, 1.0 / n as f64))
    }

    fn project(&self, v: &DVector<f64>) -> DVector<f64> {
        project_onto_box_simplex(v, &self.bounds)
    }

    fn variance(&self, w: &DVector<f64>) -> f64 {
        w.dot(&(&self.sigma * w))
    }

    fn excess_return(&self, w: &DVector<f64>) -> f64 {
        self.mu.dot(w) - self.risk_free_rate
    }

    fn sharpe(&self, w: &DVector<f64>) -> f64 {
        let vol = self.variance(w).max(0.0).sqrt();
        let excess = self.excess_return(w);
        if vol > 0.0 {
            excess / vol
        } else if excess > 0.0 {
            f64::INFINITY
        } else {
            f64::NEG_INFINITY
        }
    }

    fn sharpe_and_gradient(&self, w: &DVector<f64>) -> Result<(f64, DVector<f64>), PortfolioError> {
        let sigma_w = &self.sigma * w;
        let variance = w.dot(&sigma_w);
        if variance <= MIN_VARIANCE || !variance.is_finite() {
            return Err(PortfolioError::OptimizationFailed {
                reason: "portfolio volatility is zero; sharpe ratio is unbounded".into(),
            });
        }
        let vol = variance.sqrt();
        let excess = self.excess_return(w);
        let grad = (&self.mu * vol - sigma_w * (excess / vol)) / variance;
        if grad.iter().any(|g| !g.is_finite()) {
            return Err(PortfolioError::OptimizationFailed {
                reason: "non-finite sharpe gradient".into(),
            });
        }
        Ok((excess / vol, grad))
    }

    fn to_weights(&self, w: &DVector<f64>) -> WeightVector {
        WeightVector::from_parts(&self.tickers, w.as_slice())
    }
}

/// Euclidean projection of `v` onto `{ w : sum(w) = 1, lo <= w <= hi }`.
/// Bounds must be feasible.
pub fn project_onto_box_simplex(v: &DVector<f64>, bounds: &[(f64, f64)]) -> DVector<f64> {
    let shifted_sum = |tau: f64| -> f64 {
        v.iter()
            .zip(bounds)
            .map(|(x, (lo, hi))| (x - tau).clamp(*lo, *hi))
            .sum()
    };

    // At tau_lo every coordinate sits at its upper bound, at tau_hi at its lower.
    let mut tau_lo = v
        .iter()
        .zip(bounds)
        .map(|(x, (_, hi))| x - hi)
        .fold(f64::INFINITY, f64::min);
    let mut tau_hi = v
        .iter()
        .zip(bounds)
        .map(|(x, (lo, _))| x - lo)
        .fold(f64::NEG_INFINITY, f64::max);

    for _ in 0..BISECTION_ROUNDS {
        let mid = 0.5 * (tau_lo + tau_hi);
        if mid <= tau_lo || mid >= tau_hi {
            break;
        }
        if shifted_sum(mid) > 1.0 {
            tau_lo = mid;
        } else {
            tau_hi = mid;
        }
    }

    let tau = 0.5 * (tau_lo + tau_hi);
    DVector::from_iterator(
        v.len(),
        v.iter()
            .zip(bounds)
            .map(|(x, (lo, hi))| (x - tau).clamp(*lo, *hi)),
    )
}

/// Zero weights below `tolerance` in magnitude and rescale the rest to sum to
/// one. Idempotent for non-negative input.
pub fn clean_weights(raw: &WeightVector, tolerance: f64) -> WeightVector {
    clean_weights_within(raw, tolerance, &vec![(0.0, 1.0); raw.len()])
}

/// [`clean_weights`] that keeps every weight inside `bounds`. A weight whose
/// lower bound is positive is never zeroed, and when rescaling would push a
/// weight past its bounds the raw weights are returned unchanged.
pub fn clean_weights_within(
    raw: &WeightVector,
    tolerance: f64,
    bounds: &[(f64, f64)],
) -> WeightVector {
    let cleaned: Vec<(Ticker, f64)> = raw
        .iter()
        .zip(bounds)
        .map(|((t, w), (lo, _))| {
            let dust = w.abs() < tolerance && *lo <= 0.0;
            (t.clone(), if dust { 0.0 } else { w })
        })
        .collect();

    let total: f64 = cleaned.iter().map(|(_, w)| w).sum();
    if !total.is_finite() || total <= 0.0 || (total - 1.0).abs() <= 1e-12 {
        return WeightVector::new(cleaned);
    }

    let rescaled: Vec<(Ticker, f64)> = cleaned.into_iter().map(|(t, w)| (t, w / total)).collect();
    let within = rescaled.iter().zip(bounds).all(|((_, w), (lo, hi))| {
        *w == 0.0 || (*w >= lo - FEASIBILITY_SLACK && *w <= hi + FEASIBILITY_SLACK)
    });
    if !within {
        debug!("cleaning would break weight bounds, keeping raw weights");
        return raw.clone();
    }
    WeightVector::new(rescaled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn t(s: &str) -> Ticker {
        Ticker::normalize(s).unwrap()
    }

    fn inputs(mu: &[f64], cov: &[f64]) -> (ExpectedReturns, CovarianceMatrix) {
        let n = mu.len();
        let tickers: Vec<Ticker> = (0..n).map(|i| t(&format!("T{i}"))).collect();
        (
            ExpectedReturns {
                tickers: tickers.clone(),
                values: DVector::from_column_slice(mu),
            },
            CovarianceMatrix {
                tickers,
                matrix: DMatrix::from_row_slice(n, n, cov),
            },
        )
    }

    fn assert_feasible(w: &WeightVector, lo: f64, hi: f64) {
        assert_relative_eq!(w.sum(), 1.0, epsilon = 1e-6);
        for (_, x) in w.iter() {
            assert!(x >= lo - 1e-9 && x <= hi + 1e-9, "weight {x} outside [{lo}, {hi}]");
        }
    }

    #[test]
    fn infeasible_when_min_too_high() {
        let (mu, cov) = inputs(&[0.1, 0.1, 0.1], &[0.04, 0.0, 0.0, 0.0, 0.04, 0.0, 0.0, 0.0, 0.04]);
        let constraints = BoxConstraints::new(0.6, 0.6).unwrap();
        let err = Optimizer::new(&mu, &cov, &constraints).unwrap_err();
        assert!(matches!(
            err,
            PortfolioError::InfeasibleConstraints { assets: 3, .. }
        ));
    }

    #[test]
    fn infeasible_when_max_too_low() {
        let (mu, cov) = inputs(&[0.1, 0.1], &[0.04, 0.0, 0.0, 0.04]);
        let constraints = BoxConstraints::new(0.0, 0.4).unwrap();
        assert!(matches!(
            Optimizer::new(&mu, &cov, &constraints).unwrap_err(),
            PortfolioError::InfeasibleConstraints { .. }
        ));
    }

    #[test]
    fn exact_equal_bounds_are_feasible() {
        let (mu, cov) = inputs(&[0.1, 0.2], &[0.04, 0.0, 0.0, 0.09]);
        let constraints = BoxConstraints::new(0.5, 0.5).unwrap();
        let opt = Optimizer::new(&mu, &cov, &constraints).unwrap();
        let w = opt.maximize_sharpe().unwrap();
        assert_relative_eq!(w.values()[0], 0.5, epsilon = 1e-9);
        assert_relative_eq!(w.values()[1], 0.5, epsilon = 1e-9);
    }

    #[test]
    fn box_constraints_reject_bad_bounds() {
        assert!(BoxConstraints::new(0.5, 0.4).is_err());
        assert!(BoxConstraints::new(-0.1, 0.4).is_err());
        assert!(BoxConstraints::new(0.0, 1.5).is_err());
        assert!(BoxConstraints::new(f64::NAN, 1.0).is_err());
    }

    #[test]
    fn per_ticker_override_applies() {
        let c = BoxConstraints::new(0.0, 1.0)
            .unwrap()
            .with_override(t("T1"), 0.0, 0.2)
            .unwrap();
        assert_eq!(c.bounds_for(&[t("T0"), t("T1")]), vec![(0.0, 1.0), (0.0, 0.2)]);
    }

    #[test]
    fn max_sharpe_matches_closed_form_for_uncorrelated_assets() {
        // Uncorrelated: w_i ∝ mu_i / var_i when the solution is interior.
        let (mu, cov) = inputs(&[0.10, 0.20], &[0.04, 0.0, 0.0, 0.16]);
        let opt = Optimizer::new(&mu, &cov, &BoxConstraints::default()).unwrap();
        let w = opt.maximize_sharpe().unwrap();

        let a = 0.10 / 0.04;
        let b = 0.20 / 0.16;
        assert_relative_eq!(w.values()[0], a / (a + b), epsilon = 1e-5);
        assert_relative_eq!(w.values()[1], b / (a + b), epsilon = 1e-5);
    }

    #[test]
    fn max_sharpe_respects_upper_bound() {
        let (mu, cov) = inputs(&[0.10, 0.20], &[0.04, 0.0, 0.0, 0.16]);
        let constraints = BoxConstraints::new(0.0, 0.55).unwrap();
        let opt = Optimizer::new(&mu, &cov, &constraints).unwrap();
        let w = opt.maximize_sharpe().unwrap();
        assert_feasible(&w, 0.0, 0.55);
        assert_relative_eq!(w.values()[0], 0.55, epsilon = 1e-6);
    }

    #[test]
    fn max_sharpe_fails_when_nothing_beats_risk_free() {
        let (mu, cov) = inputs(&[0.01, 0.02], &[0.04, 0.0, 0.0, 0.04]);
        let opt = Optimizer::new(&mu, &cov, &BoxConstraints::default())
            .unwrap()
            .with_risk_free_rate(0.05);
        assert!(matches!(
            opt.maximize_sharpe().unwrap_err(),
            PortfolioError::OptimizationFailed { .. }
        ));
    }

    #[test]
    fn max_sharpe_reports_non_convergence() {
        let (mu, cov) = inputs(&[0.10, 0.20, 0.15], &[0.04, 0.01, 0.0, 0.01, 0.16, 0.02, 0.0, 0.02, 0.09]);
        let opt = Optimizer::new(&mu, &cov, &BoxConstraints::default())
            .unwrap()
            .with_settings(SolverSettings {
                max_iterations: 1,
                tolerance: 0.0,
            });
        assert!(matches!(
            opt.maximize_sharpe().unwrap_err(),
            PortfolioError::OptimizationFailed { .. }
        ));
    }

    #[test]
    fn quadratic_utility_low_aversion_chases_return() {
        let (mu, cov) = inputs(&[0.10, 0.30], &[0.04, 0.0, 0.0, 0.25]);
        let opt = Optimizer::new(&mu, &cov, &BoxConstraints::default()).unwrap();
        let w = opt.maximize_quadratic_utility(LOW_RISK_AVERSION).unwrap();
        assert_feasible(&w, 0.0, 1.0);
        assert_relative_eq!(w.values()[1], 1.0, epsilon = 1e-6);
    }

    #[test]
    fn quadratic_utility_high_aversion_matches_kkt_solution() {
        // Interior optimum: mu_0 - d*s0*w0 = mu_1 - d*s1*(1 - w0).
        let (mu, cov) = inputs(&[0.10, 0.30], &[0.04, 0.0, 0.0, 0.25]);
        let opt = Optimizer::new(&mu, &cov, &BoxConstraints::default()).unwrap();
        let w = opt.maximize_quadratic_utility(HIGH_RISK_AVERSION).unwrap();
        let d = HIGH_RISK_AVERSION;
        let w0 = (0.10 - 0.30 + d * 0.25) / (d * (0.04 + 0.25));
        assert_relative_eq!(w.values()[0], w0, epsilon = 1e-6);
        assert_feasible(&w, 0.0, 1.0);
    }

    #[test]
    fn quadratic_utility_with_zero_covariance_is_linear() {
        let (mu, cov) = inputs(&[0.10, 0.30, 0.20], &[0.0; 9]);
        let constraints = BoxConstraints::new(0.1, 0.6).unwrap();
        let opt = Optimizer::new(&mu, &cov, &constraints).unwrap();
        let w = opt.maximize_quadratic_utility(1.0).unwrap();
        assert_relative_eq!(w.values()[1], 0.6, epsilon = 1e-6);
        assert_relative_eq!(w.values()[2], 0.3, epsilon = 1e-6);
        assert_relative_eq!(w.values()[0], 0.1, epsilon = 1e-6);
    }

    #[test]
    fn quadratic_utility_rejects_non_positive_aversion() {
        let (mu, cov) = inputs(&[0.1, 0.2], &[0.04, 0.0, 0.0, 0.04]);
        let opt = Optimizer::new(&mu, &cov, &BoxConstraints::default()).unwrap();
        assert!(opt.maximize_quadratic_utility(0.0).is_err());
    }

    #[test]
    fn risk_profile_routes_objective() {
        assert_eq!(RiskProfile::Medium.objective(), Objective::MaxSharpe);
        assert_eq!(
            RiskProfile::Low.objective(),
            Objective::MaxQuadraticUtility { risk_aversion: 0.1 }
        );
        assert_eq!(
            RiskProfile::High.objective(),
            Objective::MaxQuadraticUtility { risk_aversion: 10.0 }
        );
        assert_eq!("HIGH".parse::<RiskProfile>(), Ok(RiskProfile::High));
        assert!("extreme".parse::<RiskProfile>().is_err());
    }

    #[test]
    fn performance_of_known_weights() {
        let (mu, cov) = inputs(&[0.10, 0.20], &[0.04, 0.0, 0.0, 0.16]);
        let opt = Optimizer::new(&mu, &cov, &BoxConstraints::default())
            .unwrap()
            .with_risk_free_rate(0.02);
        let w = WeightVector::from_parts(&[t("T0"), t("T1")], &[0.5, 0.5]);
        let perf = opt.portfolio_performance(&w);
        assert_relative_eq!(perf.expected_return, 0.15, epsilon = 1e-12);
        let vol = (0.25 * 0.04 + 0.25 * 0.16_f64).sqrt();
        assert_relative_eq!(perf.volatility, vol, epsilon = 1e-12);
        assert_relative_eq!(perf.sharpe_ratio, (0.15 - 0.02) / vol, epsilon = 1e-12);
    }

    #[test]
    fn projection_lands_on_feasible_set() {
        let v = DVector::from_vec(vec![3.0, -1.0, 0.2, 0.7]);
        let bounds = vec![(0.05, 0.5); 4];
        let p = project_onto_box_simplex(&v, &bounds);
        assert_relative_eq!(p.sum(), 1.0, epsilon = 1e-9);
        assert_relative_eq!(p[0], 0.5, epsilon = 1e-9);
        assert_relative_eq!(p[1], 0.05, epsilon = 1e-9);
    }

    #[test]
    fn projection_keeps_feasible_points() {
        let v = DVector::from_vec(vec![0.2, 0.3, 0.5]);
        let p = project_onto_box_simplex(&v, &[(0.0, 1.0); 3]);
        assert_relative_eq!(p[0], 0.2, epsilon = 1e-9);
        assert_relative_eq!(p[1], 0.3, epsilon = 1e-9);
        assert_relative_eq!(p[2], 0.5, epsilon = 1e-9);
    }

    #[test]
    fn clean_weights_zeroes_dust_and_renormalizes() {
        let raw = WeightVector::from_parts(&[t("A"), t("B"), t("C")], &[0.59995, 0.4, 0.00005]);
        let cleaned = clean_weights(&raw, DEFAULT_CLEAN_TOLERANCE);
        assert_eq!(cleaned.values()[2], 0.0);
        assert_relative_eq!(cleaned.sum(), 1.0, epsilon = 1e-12);
        assert_relative_eq!(cleaned.values()[0], 0.59995 / 0.99995, epsilon = 1e-12);
    }

    #[test]
    fn cleaning_never_pushes_a_weight_past_its_cap() {
        let raw = WeightVector::from_parts(&[t("A"), t("B"), t("C")], &[0.5, 0.49995, 0.00005]);
        let bounds = [(0.0, 0.5); 3];

        // Unbounded cleaning overshoots the cap.
        assert!(clean_weights(&raw, DEFAULT_CLEAN_TOLERANCE).values()[0] > 0.5);

        let cleaned = clean_weights_within(&raw, DEFAULT_CLEAN_TOLERANCE, &bounds);
        assert_eq!(cleaned, raw);
        assert_eq!(clean_weights_within(&cleaned, DEFAULT_CLEAN_TOLERANCE, &bounds), cleaned);
    }

    #[test]
    fn cleaning_keeps_weights_with_a_positive_floor() {
        let raw = WeightVector::from_parts(&[t("A"), t("B"), t("C")], &[0.59995, 0.4, 0.00005]);
        let cleaned = clean_weights_within(&raw, DEFAULT_CLEAN_TOLERANCE, &[(0.00001, 1.0); 3]);
        assert_eq!(cleaned, raw);
    }

    #[test]
    fn optimizer_cleaning_uses_its_bounds() {
        let (mu, cov) = inputs(&[0.10, 0.10, 0.10], &[0.04, 0.0, 0.0, 0.0, 0.04, 0.0, 0.0, 0.0, 0.04]);
        let opt = Optimizer::new(&mu, &cov, &BoxConstraints::new(0.0, 0.5).unwrap()).unwrap();
        let raw = WeightVector::from_parts(&[t("T0"), t("T1"), t("T2")], &[0.5, 0.49995, 0.00005]);

        let cleaned = opt.clean_weights(&raw, DEFAULT_CLEAN_TOLERANCE);
        assert!(cleaned.iter().all(|(_, w)| w <= 0.5 + 1e-12));
        assert_relative_eq!(cleaned.sum(), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn clean_weights_twice_is_clean_weights_once() {
        let raw = WeightVector::from_parts(&[t("A"), t("B"), t("C")], &[0.333, 0.66695, 0.00005]);
        let once = clean_weights(&raw, DEFAULT_CLEAN_TOLERANCE);
        let twice = clean_weights(&once, DEFAULT_CLEAN_TOLERANCE);
        assert_eq!(once, twice);
    }
}

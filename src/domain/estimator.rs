//! Expected-return and risk-model estimates from a price table.

use crate::domain::error::PortfolioError;
use crate::domain::price_table::PriceTable;
use crate::domain::returns::simple_returns;
use crate::domain::ticker::Ticker;
use nalgebra::{DMatrix, DVector};

pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Annualized expected return per ticker (μ).
#[derive(Debug, Clone, PartialEq)]
pub struct ExpectedReturns {
    pub tickers: Vec<Ticker>,
    pub values: DVector<f64>,
}

impl ExpectedReturns {
    pub fn get(&self, ticker: &Ticker) -> Option<f64> {
        self.tickers
            .iter()
            .position(|t| t == ticker)
            .map(|i| self.values[i])
    }
}

/// Annualized sample covariance of daily returns (Σ).
#[derive(Debug, Clone, PartialEq)]
pub struct CovarianceMatrix {
    pub tickers: Vec<Ticker>,
    pub matrix: DMatrix<f64>,
}

impl CovarianceMatrix {
    pub fn variance(&self, ticker: &Ticker) -> Option<f64> {
        self.tickers
            .iter()
            .position(|t| t == ticker)
            .map(|i| self.matrix[(i, i)])
    }
}

/// Every ticker needs at least two real closes. Run this on the joined table
/// before gap filling, since a forward-filled column hides missing history.
pub fn require_history(table: &PriceTable) -> Result<(), PortfolioError> {
    if table.ticker_count() == 0 {
        return Err(PortfolioError::InsufficientAssets {
            available: 0,
            required: 1,
        });
    }
    for (col, ticker) in table.tickers().iter().enumerate() {
        let observations = table.observations(col);
        if observations < 2 {
            return Err(PortfolioError::InsufficientHistory {
                ticker: ticker.to_string(),
                observations,
            });
        }
    }
    Ok(())
}

fn insufficient(ticker: &Ticker, returns: usize) -> PortfolioError {
    // A ticker with no defined return had fewer than two consecutive closes.
    PortfolioError::InsufficientHistory {
        ticker: ticker.to_string(),
        observations: returns + usize::from(returns > 0),
    }
}

/// Arithmetic mean of daily simple returns, annualized.
pub fn mean_historical_return(table: &PriceTable) -> Result<ExpectedReturns, PortfolioError> {
    mean_historical_return_with(table, false)
}

/// Mean historical return; with `compounding` the geometric annual rate
/// `prod(1 + r)^(252 / n) - 1` is used instead of the arithmetic mean.
pub fn mean_historical_return_with(
    table: &PriceTable,
    compounding: bool,
) -> Result<ExpectedReturns, PortfolioError> {
    require_history(table)?;
    let returns = simple_returns(table);
    let mut values = Vec::with_capacity(table.ticker_count());

    for (col, ticker) in table.tickers().iter().enumerate() {
        let column = returns.column_values(col);
        if column.is_empty() {
            return Err(insufficient(ticker, 0));
        }
        let n = column.len() as f64;
        let mu = if compounding {
            let growth: f64 = column.iter().map(|r| 1.0 + r).product();
            growth.powf(TRADING_DAYS_PER_YEAR / n) - 1.0
        } else {
            column.iter().sum::<f64>() / n * TRADING_DAYS_PER_YEAR
        };
        if !mu.is_finite() {
            return Err(PortfolioError::OptimizationFailed {
                reason: format!("non-finite expected return for {ticker}"),
            });
        }
        values.push(mu);
    }

    Ok(ExpectedReturns {
        tickers: table.tickers().to_vec(),
        values: DVector::from_vec(values),
    })
}

/// Annualized sample covariance (ddof = 1) over pairwise-complete returns.
pub fn sample_cov(table: &PriceTable) -> Result<CovarianceMatrix, PortfolioError> {
    require_history(table)?;
    let returns = simple_returns(table);
    let n = table.ticker_count();
    let mut matrix = DMatrix::zeros(n, n);

    for i in 0..n {
        for j in i..n {
            let pairs: Vec<(f64, f64)> = (0..returns.len())
                .filter_map(|k| {
                    let row = returns.row(k);
                    Some((row[i]?, row[j]?))
                })
                .collect();
            if pairs.len() < 2 {
                return Err(insufficient(&table.tickers()[j], pairs.len()));
            }
            let m = pairs.len() as f64;
            let mean_i = pairs.iter().map(|p| p.0).sum::<f64>() / m;
            let mean_j = pairs.iter().map(|p| p.1).sum::<f64>() / m;
            let cov = pairs
                .iter()
                .map(|(a, b)| (a - mean_i) * (b - mean_j))
                .sum::<f64>()
                / (m - 1.0)
                * TRADING_DAYS_PER_YEAR;
            if !cov.is_finite() {
                return Err(PortfolioError::OptimizationFailed {
                    reason: format!(
                        "non-finite covariance for {} / {}",
                        table.tickers()[i],
                        table.tickers()[j]
                    ),
                });
            }
            matrix[(i, j)] = cov;
            matrix[(j, i)] = cov;
        }
    }

    Ok(CovarianceMatrix {
        tickers: table.tickers().to_vec(),
        matrix,
    })
}

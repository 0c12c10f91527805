//! End-to-end optimization run: fetch, estimate, optimize, allocate and
//! derive the analytic series.

use crate::domain::allocation::{greedy_allocation, AllocationResult};
use crate::domain::error::PortfolioError;
use crate::domain::estimator::{mean_historical_return_with, require_history, sample_cov};
use crate::domain::optimizer::{Optimizer, PortfolioPerformance, DEFAULT_CLEAN_TOLERANCE};
use crate::domain::price_table::{PriceBar, PriceTable};
use crate::domain::repository::{PriceRepository, SkippedTicker};
use crate::domain::request::OptimizationRequest;
use crate::domain::returns::{
    align, cumulative_returns, cumulative_table, portfolio_returns, resample, simple_returns,
    Period, ReturnSeries,
};
use crate::domain::summary::PerformanceSummary;
use crate::domain::ticker::Ticker;
use crate::domain::weights::WeightVector;
use crate::ports::price_port::PricePort;
use std::collections::HashMap;
use tracing::{info, warn};

/// Fewest assets a portfolio can be optimized over.
pub const MIN_ASSETS: usize = 2;

/// Monthly cumulative returns of the portfolio and the benchmark over their
/// common dates.
#[derive(Debug, Clone, PartialEq)]
pub struct BenchmarkComparison {
    pub benchmark: Ticker,
    pub portfolio: ReturnSeries,
    pub benchmark_returns: ReturnSeries,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct AnalyticSeries {
    pub cumulative_per_ticker: Vec<(Ticker, ReturnSeries)>,
    pub portfolio_daily: ReturnSeries,
    pub portfolio_cumulative: ReturnSeries,
    pub portfolio_monthly: ReturnSeries,
    pub portfolio_annual: ReturnSeries,
    /// `None` when no benchmark was requested or it had no data.
    pub benchmark: Option<BenchmarkComparison>,
}

#[derive(Debug, Clone)]
pub struct OptimizationOutput {
    pub universe: Vec<Ticker>,
    pub weights: WeightVector,
    pub performance: PortfolioPerformance,
    pub summary: PerformanceSummary,
    pub allocation: AllocationResult,
    pub latest_prices: HashMap<Ticker, f64>,
    pub series: AnalyticSeries,
    pub skipped: Vec<SkippedTicker>,
}

/// Run a request with sequential per-ticker fetches.
pub fn run_pipeline(
    port: &(dyn PricePort + Sync),
    request: &OptimizationRequest,
) -> Result<OptimizationOutput, PortfolioError> {
    run_pipeline_with(&PriceRepository::new(port), request)
}

pub fn run_pipeline_with(
    repository: &PriceRepository<'_>,
    request: &OptimizationRequest,
) -> Result<OptimizationOutput, PortfolioError> {
    request.validate()?;
    if request.tickers.len() < MIN_ASSETS {
        return Err(PortfolioError::InsufficientAssets {
            available: request.tickers.len(),
            required: MIN_ASSETS,
        });
    }
    let constraints = request.constraints()?;
    for (ticker, _, _) in &request.bound_overrides {
        if !request.tickers.contains(ticker) {
            warn!(ticker = %ticker, "ignoring bounds for a ticker outside the request");
        }
    }

    info!(
        tickers = request.tickers.len(),
        start = %request.start_date,
        end = %request.end_date,
        "fetching prices"
    );
    let fetch = repository.fetch_table(&request.tickers, request.start_date, request.end_date)?;
    if fetch.table.ticker_count() < MIN_ASSETS {
        return Err(PortfolioError::InsufficientAssets {
            available: fetch.table.ticker_count(),
            required: MIN_ASSETS,
        });
    }
    require_history(&fetch.table)?;

    let table = fetch.table.aligned(request.gap_policy);
    info!(
        assets = table.ticker_count(),
        rows = table.len(),
        policy = ?request.gap_policy,
        "aligned price table"
    );

    let mu = mean_historical_return_with(&table, request.compounding)?;
    let cov = sample_cov(&table)?;
    let optimizer = Optimizer::new(&mu, &cov, &constraints)?
        .with_risk_free_rate(request.risk_free_rate);

    let raw = optimizer.optimize(request.risk_profile.objective())?;
    let weights = optimizer.clean_weights(&raw, DEFAULT_CLEAN_TOLERANCE);
    let performance = optimizer.portfolio_performance(&weights);
    info!(
        profile = %request.risk_profile,
        expected_return = performance.expected_return,
        volatility = performance.volatility,
        sharpe = performance.sharpe_ratio,
        "optimized weights"
    );

    let latest_prices = table.latest_prices();
    let allocation = greedy_allocation(&weights, &latest_prices, request.investment)?;
    info!(
        shares = allocation.total_shares(),
        leftover = allocation.leftover,
        "allocated shares"
    );

    let portfolio_daily = portfolio_returns(&table, &weights);
    let portfolio_cumulative = cumulative_returns(&portfolio_daily);
    let summary = PerformanceSummary::compute(&performance, &portfolio_cumulative);

    let benchmark = match &request.benchmark {
        Some(ticker) => benchmark_comparison(
            repository,
            request,
            &fetch.table,
            ticker,
            &portfolio_daily,
        )?,
        None => None,
    };

    let series = AnalyticSeries {
        cumulative_per_ticker: cumulative_table(&table, table.tickers()),
        portfolio_monthly: resample(&portfolio_daily, Period::Month),
        portfolio_annual: resample(&portfolio_daily, Period::Year),
        portfolio_daily,
        portfolio_cumulative,
        benchmark,
    };

    Ok(OptimizationOutput {
        universe: table.tickers().to_vec(),
        weights,
        performance,
        summary,
        allocation,
        latest_prices,
        series,
        skipped: fetch.skipped,
    })
}

/// The benchmark is fetched at most once; a benchmark that is also one of
/// the assets reuses the already fetched closes.
fn benchmark_comparison(
    repository: &PriceRepository<'_>,
    request: &OptimizationRequest,
    fetched: &PriceTable,
    benchmark: &Ticker,
    portfolio_daily: &ReturnSeries,
) -> Result<Option<BenchmarkComparison>, PortfolioError> {
    let bars = match fetched.column(benchmark) {
        Some(closes) => Some(
            closes
                .into_iter()
                .map(|(date, close)| PriceBar::new(date, close))
                .collect(),
        ),
        None => repository.fetch_series(benchmark, request.start_date, request.end_date)?,
    };
    let Some(bars) = bars else {
        warn!(benchmark = %benchmark, "benchmark unavailable, comparison omitted");
        return Ok(None);
    };

    let table = PriceTable::outer_join(vec![(benchmark.clone(), bars)]);
    let Some(benchmark_daily) = simple_returns(&table).column(benchmark) else {
        return Ok(None);
    };

    let (portfolio, bench) = align(portfolio_daily, &benchmark_daily);
    Ok(Some(BenchmarkComparison {
        benchmark: benchmark.clone(),
        portfolio: cumulative_returns(&resample(&portfolio, Period::Month)),
        benchmark_returns: cumulative_returns(&resample(&bench, Period::Month)),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::price_table::GapPolicy;
    use chrono::NaiveDate;

    struct NoData;

    impl PricePort for NoData {
        fn fetch_closes(
            &self,
            ticker: &Ticker,
            _start: NaiveDate,
            _end: NaiveDate,
        ) -> Result<Vec<PriceBar>, PortfolioError> {
            Err(PortfolioError::DataUnavailable {
                ticker: ticker.to_string(),
            })
        }
    }

    struct Fixed(HashMap<String, Vec<PriceBar>>);

    impl PricePort for Fixed {
        fn fetch_closes(
            &self,
            ticker: &Ticker,
            _start: NaiveDate,
            _end: NaiveDate,
        ) -> Result<Vec<PriceBar>, PortfolioError> {
            self.0
                .get(ticker.as_str())
                .cloned()
                .ok_or_else(|| PortfolioError::DataUnavailable {
                    ticker: ticker.to_string(),
                })
        }
    }

    fn daily(start_close: f64, days: u32) -> Vec<PriceBar> {
        (1..=days)
            .map(|d| {
                let wobble = if d % 2 == 0 { 0.5 } else { -0.5 };
                PriceBar::new(
                    NaiveDate::from_ymd_opt(2023, 1, d).unwrap(),
                    start_close + d as f64 * 0.1 + wobble,
                )
            })
            .collect()
    }

    fn request(tickers: &[&str]) -> OptimizationRequest {
        OptimizationRequest::new(
            tickers.iter().filter_map(|t| Ticker::normalize(t)).collect(),
            NaiveDate::from_ymd_opt(2023, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2023, 12, 31).unwrap(),
            1_000.0,
        )
    }

    #[test]
    fn single_ticker_request_is_insufficient() {
        let err = run_pipeline(&NoData, &request(&["AAPL"])).unwrap_err();
        assert!(matches!(
            err,
            PortfolioError::InsufficientAssets {
                available: 1,
                required: 2
            }
        ));
    }

    #[test]
    fn empty_universe_after_fetch_is_insufficient() {
        let err = run_pipeline(&NoData, &request(&["AAPL", "MSFT", "GOOG"])).unwrap_err();
        assert!(matches!(
            err,
            PortfolioError::InsufficientAssets {
                available: 0,
                required: 2
            }
        ));
    }

    #[test]
    fn lone_early_close_is_not_forward_filled_into_history() {
        let port = Fixed(HashMap::from([
            ("AAA".to_string(), daily(50.0, 30)),
            ("BBB".to_string(), daily(80.0, 30)),
            (
                "CCC".to_string(),
                vec![PriceBar::new(NaiveDate::from_ymd_opt(2023, 1, 1).unwrap(), 10.0)],
            ),
        ]));

        for gap_policy in [GapPolicy::ForwardFill, GapPolicy::Drop] {
            let mut req = request(&["AAA", "BBB", "CCC"]);
            req.gap_policy = gap_policy;
            let err = run_pipeline(&port, &req).unwrap_err();
            assert!(matches!(
                err,
                PortfolioError::InsufficientHistory { ref ticker, observations: 1 } if ticker == "CCC"
            ));
        }
    }

    #[test]
    fn invalid_request_fails_before_fetch() {
        let mut req = request(&["AAPL", "MSFT"]);
        req.investment = 0.0;
        assert!(matches!(
            run_pipeline(&NoData, &req).unwrap_err(),
            PortfolioError::InvalidRequest { .. }
        ));
    }
}

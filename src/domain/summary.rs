//! Human-readable performance summary.

use crate::domain::optimizer::PortfolioPerformance;
use crate::domain::returns::ReturnSeries;

pub const EXPECTED_ANNUAL_RETURN: &str = "Expected Annual Return";
pub const ANNUAL_VOLATILITY: &str = "Annual Volatility";
pub const SHARPE_RATIO: &str = "Sharpe Ratio";
pub const TOTAL_RETURN: &str = "Total Return";

#[derive(Debug, Clone, PartialEq)]
pub struct MetricRow {
    pub metric: &'static str,
    pub value: String,
    pub raw: f64,
}

/// Ordered metric rows: expected return, volatility, Sharpe, total return.
#[derive(Debug, Clone, PartialEq)]
pub struct PerformanceSummary {
    rows: Vec<MetricRow>,
}

impl PerformanceSummary {
    /// `cumulative` is the portfolio's cumulative return series; its last
    /// value is the total return (zero when empty).
    pub fn compute(performance: &PortfolioPerformance, cumulative: &ReturnSeries) -> Self {
        let total_return = cumulative.last_value().unwrap_or(0.0);
        Self {
            rows: vec![
                percent_row(EXPECTED_ANNUAL_RETURN, performance.expected_return),
                percent_row(ANNUAL_VOLATILITY, performance.volatility),
                MetricRow {
                    metric: SHARPE_RATIO,
                    value: format!("{:.2}", performance.sharpe_ratio),
                    raw: performance.sharpe_ratio,
                },
                percent_row(TOTAL_RETURN, total_return),
            ],
        }
    }

    pub fn rows(&self) -> &[MetricRow] {
        &self.rows
    }

    pub fn get(&self, metric: &str) -> Option<&MetricRow> {
        self.rows.iter().find(|r| r.metric == metric)
    }
}

fn percent_row(metric: &'static str, raw: f64) -> MetricRow {
    MetricRow {
        metric,
        value: format!("{:.2}%", raw * 100.0),
        raw,
    }
}

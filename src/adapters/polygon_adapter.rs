//! Polygon.io daily aggregates adapter.
//!
//! `GET {base_url}/v2/aggs/ticker/{T}/range/1/day/{start}/{end}` with bearer
//! auth. Each result carries `t` (epoch milliseconds, UTC) and `c` (close).

use crate::domain::error::PortfolioError;
use crate::domain::price_table::PriceBar;
use crate::domain::ticker::Ticker;
use crate::ports::price_port::PricePort;
use chrono::{DateTime, NaiveDate};
use reqwest::StatusCode;
use serde::Deserialize;
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_BASE_URL: &str = "https://api.polygon.io";

/// Connection settings, passed in explicitly; nothing is read from the
/// environment here.
#[derive(Debug, Clone)]
pub struct PolygonConfig {
    pub api_key: String,
    pub base_url: String,
    pub timeout: Duration,
    pub max_retries: u32,
    pub retry_backoff: Duration,
}

impl PolygonConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(30),
            max_retries: 2,
            retry_backoff: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Deserialize)]
struct AggregatesResponse {
    #[serde(default)]
    results: Option<Vec<Aggregate>>,
}

#[derive(Debug, Deserialize)]
struct Aggregate {
    t: i64,
    c: f64,
}

pub struct PolygonAdapter {
    config: PolygonConfig,
    client: reqwest::blocking::Client,
}

impl PolygonAdapter {
    pub fn new(config: PolygonConfig) -> Result<Self, PortfolioError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| PortfolioError::ConfigInvalid {
                section: "source".into(),
                key: "base_url".into(),
                reason: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self { config, client })
    }

    fn url(&self, ticker: &Ticker, start: NaiveDate, end: NaiveDate) -> String {
        format!(
            "{}/v2/aggs/ticker/{}/range/1/day/{}/{}",
            self.config.base_url.trim_end_matches('/'),
            ticker,
            start.format("%Y-%m-%d"),
            end.format("%Y-%m-%d")
        )
    }

    fn get_once(&self, url: &str) -> Result<(StatusCode, String), reqwest::Error> {
        let response = self
            .client
            .get(url)
            .bearer_auth(&self.config.api_key)
            .query(&[("adjusted", "true"), ("sort", "asc"), ("limit", "50000")])
            .send()?;
        let status = response.status();
        let body = response.text()?;
        Ok((status, body))
    }
}

fn retryable(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

/// Parse an aggregates body. A missing or empty `results` array means the
/// ticker has no data in range.
pub fn parse_aggregates(ticker: &Ticker, body: &str) -> Result<Vec<PriceBar>, PortfolioError> {
    let parsed: AggregatesResponse =
        serde_json::from_str(body).map_err(|e| PortfolioError::UpstreamFetch {
            ticker: ticker.to_string(),
            reason: format!("malformed response: {e}"),
        })?;

    let results = parsed.results.unwrap_or_default();
    if results.is_empty() {
        return Err(PortfolioError::DataUnavailable {
            ticker: ticker.to_string(),
        });
    }

    let mut bars = Vec::with_capacity(results.len());
    for agg in results {
        let date = DateTime::from_timestamp_millis(agg.t)
            .ok_or_else(|| PortfolioError::UpstreamFetch {
                ticker: ticker.to_string(),
                reason: format!("timestamp {} out of range", agg.t),
            })?
            .date_naive();
        bars.push(PriceBar::new(date, agg.c));
    }
    Ok(bars)
}

impl PricePort for PolygonAdapter {
    fn fetch_closes(
        &self,
        ticker: &Ticker,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PriceBar>, PortfolioError> {
        let url = self.url(ticker, start, end);
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let failure = match self.get_once(&url) {
                Ok((status, body)) if status.is_success() => {
                    debug!(ticker = %ticker, attempt, "aggregates received");
                    return parse_aggregates(ticker, &body);
                }
                Ok((status, body)) => {
                    let reason = format!("HTTP {}: {}", status.as_u16(), body.trim());
                    if !retryable(status) {
                        return Err(PortfolioError::UpstreamFetch {
                            ticker: ticker.to_string(),
                            reason,
                        });
                    }
                    reason
                }
                Err(e) => format!("request failed: {e}"),
            };

            if attempt > self.config.max_retries {
                return Err(PortfolioError::UpstreamFetch {
                    ticker: ticker.to_string(),
                    reason: failure,
                });
            }
            warn!(ticker = %ticker, attempt, reason = %failure, "retrying price fetch");
            thread::sleep(self.config.retry_backoff * attempt);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(s: &str) -> Ticker {
        Ticker::normalize(s).unwrap()
    }

    #[test]
    fn parses_results_into_utc_dates() {
        // 2023-01-03 and 2023-01-04 at 05:00 UTC
        let body = r#"{"ticker":"AAPL","status":"OK","resultsCount":2,
            "results":[{"t":1672722000000,"c":125.07,"o":130.28},
                       {"t":1672808400000,"c":126.36}]}"#;
        let bars = parse_aggregates(&t("AAPL"), body).unwrap();
        assert_eq!(
            bars,
            vec![
                PriceBar::new(NaiveDate::from_ymd_opt(2023, 1, 3).unwrap(), 125.07),
                PriceBar::new(NaiveDate::from_ymd_opt(2023, 1, 4).unwrap(), 126.36),
            ]
        );
    }

    #[test]
    fn missing_results_is_data_unavailable() {
        let err = parse_aggregates(&t("ZZZZ"), r#"{"status":"OK","resultsCount":0}"#).unwrap_err();
        assert!(matches!(err, PortfolioError::DataUnavailable { ref ticker } if ticker == "ZZZZ"));
    }

    #[test]
    fn malformed_body_is_upstream_error() {
        let err = parse_aggregates(&t("AAPL"), "<html>bad gateway</html>").unwrap_err();
        assert!(matches!(err, PortfolioError::UpstreamFetch { .. }));
    }

    #[test]
    fn url_contains_range_and_ticker() {
        let mut config = PolygonConfig::new("key");
        config.base_url = "http://localhost:9/".into();
        let adapter = PolygonAdapter::new(config).unwrap();
        let url = adapter.url(
            &t("msft"),
            NaiveDate::from_ymd_opt(2023, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2023, 6, 30).unwrap(),
        );
        assert_eq!(
            url,
            "http://localhost:9/v2/aggs/ticker/MSFT/range/1/day/2023-01-01/2023-06-30"
        );
    }

    #[test]
    fn unreachable_host_is_upstream_error_after_retries() {
        let mut config = PolygonConfig::new("key");
        config.base_url = "http://127.0.0.1:9".into();
        config.timeout = Duration::from_millis(200);
        config.max_retries = 1;
        config.retry_backoff = Duration::from_millis(1);
        let adapter = PolygonAdapter::new(config).unwrap();

        let err = adapter
            .fetch_closes(
                &t("AAPL"),
                NaiveDate::from_ymd_opt(2023, 1, 1).unwrap(),
                NaiveDate::from_ymd_opt(2023, 1, 31).unwrap(),
            )
            .unwrap_err();
        assert!(matches!(err, PortfolioError::UpstreamFetch { .. }));
    }

    #[test]
    fn retry_policy_covers_server_errors_and_rate_limits() {
        assert!(retryable(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(retryable(StatusCode::TOO_MANY_REQUESTS));
        assert!(!retryable(StatusCode::UNAUTHORIZED));
        assert!(!retryable(StatusCode::NOT_FOUND));
    }
}

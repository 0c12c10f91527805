//! Configuration validation.
//!
//! Validates every config field before a run so errors name the offending
//! section and key.

use crate::domain::error::PortfolioError;
use crate::domain::optimizer::{BoxConstraints, RiskProfile};
use crate::domain::price_table::GapPolicy;
use crate::domain::ticker::{parse_tickers, Ticker};
use crate::ports::config_port::ConfigPort;
use chrono::NaiveDate;

pub const PORTFOLIO_KEYS: &[&str] = &[
    "tickers",
    "start_date",
    "end_date",
    "investment",
    "min_weight",
    "max_weight",
    "risk_profile",
    "benchmark",
    "risk_free_rate",
    "gap_policy",
    "compounding",
];

pub const SOURCE_KEYS: &[&str] = &[
    "kind",
    "data_dir",
    "base_url",
    "api_key",
    "timeout_secs",
    "max_retries",
    "parallel",
];

pub const REPORT_KEYS: &[&str] = &["output_dir"];

/// Section of per-ticker `TICKER = min, max` weight bounds.
pub const BOUNDS_SECTION: &str = "bounds";

pub fn validate_portfolio_config(config: &dyn ConfigPort) -> Result<(), PortfolioError> {
    validate_tickers(config)?;
    validate_portfolio_settings(config)
}

/// Everything in `[portfolio]` except the ticker list, for runs whose
/// tickers come from the command line.
pub fn validate_portfolio_settings(config: &dyn ConfigPort) -> Result<(), PortfolioError> {
    validate_dates(config)?;
    validate_investment(config)?;
    validate_weight_bounds(config)?;
    validate_risk_profile(config)?;
    validate_benchmark(config)?;
    validate_risk_free_rate(config)?;
    validate_gap_policy(config)?;
    config.get_bool("portfolio", "compounding", false)?;
    validate_bound_overrides(config)
}

pub fn validate_source_config(config: &dyn ConfigPort) -> Result<(), PortfolioError> {
    let kind = config
        .get_string("source", "kind")
        .unwrap_or_else(|| "polygon".to_string());
    match kind.to_lowercase().as_str() {
        "csv" => {
            if config.get_string("source", "data_dir").is_none() {
                return Err(missing("source", "data_dir"));
            }
        }
        "polygon" => {}
        other => {
            return Err(invalid(
                "source",
                "kind",
                format!("unknown source '{other}' (expected polygon or csv)"),
            ));
        }
    }

    let timeout = config.get_int("source", "timeout_secs", 30)?;
    if timeout < 1 {
        return Err(invalid(
            "source",
            "timeout_secs",
            "timeout_secs must be at least 1".into(),
        ));
    }
    let retries = config.get_int("source", "max_retries", 2)?;
    if !(0..=10).contains(&retries) {
        return Err(invalid(
            "source",
            "max_retries",
            "max_retries must be between 0 and 10".into(),
        ));
    }
    config.get_bool("source", "parallel", false)?;
    Ok(())
}

/// Keys present in `section` that the given schema does not know about.
pub fn unknown_keys(config: &dyn ConfigPort, section: &str, known: &[&str]) -> Vec<String> {
    let mut keys: Vec<String> = config
        .section_keys(section)
        .into_iter()
        .filter(|k| !known.contains(&k.as_str()))
        .collect();
    keys.sort();
    keys
}

fn missing(section: &str, key: &str) -> PortfolioError {
    PortfolioError::ConfigMissing {
        section: section.to_string(),
        key: key.to_string(),
    }
}

fn invalid(section: &str, key: &str, reason: String) -> PortfolioError {
    PortfolioError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason,
    }
}

/// Parse `[portfolio] tickers`.
pub fn parse_ticker_list(config: &dyn ConfigPort) -> Result<Vec<Ticker>, PortfolioError> {
    let raw = config
        .get_string("portfolio", "tickers")
        .ok_or_else(|| missing("portfolio", "tickers"))?;
    parse_tickers(&raw).map_err(|e| invalid("portfolio", "tickers", e.to_string()))
}

fn validate_tickers(config: &dyn ConfigPort) -> Result<(), PortfolioError> {
    parse_ticker_list(config).map(|_| ())
}

/// Parse a required `YYYY-MM-DD` date from `[portfolio]`.
pub fn parse_date(config: &dyn ConfigPort, key: &str) -> Result<NaiveDate, PortfolioError> {
    let raw = config
        .get_string("portfolio", key)
        .ok_or_else(|| missing("portfolio", key))?;
    NaiveDate::parse_from_str(&raw, "%Y-%m-%d").map_err(|_| {
        invalid(
            "portfolio",
            key,
            format!("invalid {} format, expected YYYY-MM-DD", key),
        )
    })
}

fn validate_dates(config: &dyn ConfigPort) -> Result<(), PortfolioError> {
    let start_date = parse_date(config, "start_date")?;
    let end_date = parse_date(config, "end_date")?;
    if start_date >= end_date {
        return Err(invalid(
            "portfolio",
            "start_date",
            "start_date must be before end_date".into(),
        ));
    }
    Ok(())
}

fn validate_investment(config: &dyn ConfigPort) -> Result<(), PortfolioError> {
    if config.get_string("portfolio", "investment").is_none() {
        return Err(missing("portfolio", "investment"));
    }
    let value = config.get_double("portfolio", "investment", 0.0)?;
    if !value.is_finite() || value <= 0.0 {
        return Err(invalid(
            "portfolio",
            "investment",
            "investment must be a positive number".into(),
        ));
    }
    Ok(())
}

fn validate_weight_bounds(config: &dyn ConfigPort) -> Result<(), PortfolioError> {
    let min = config.get_double("portfolio", "min_weight", 0.0)?;
    let max = config.get_double("portfolio", "max_weight", 1.0)?;
    for (key, value) in [("min_weight", min), ("max_weight", max)] {
        if !(0.0..=1.0).contains(&value) {
            return Err(invalid(
                "portfolio",
                key,
                format!("{key} must be between 0 and 1"),
            ));
        }
    }
    if min > max {
        return Err(invalid(
            "portfolio",
            "min_weight",
            "min_weight must not exceed max_weight".into(),
        ));
    }
    Ok(())
}

/// `[portfolio] risk_profile`, defaulting to medium.
pub fn parse_risk_profile(config: &dyn ConfigPort) -> Result<RiskProfile, PortfolioError> {
    match config.get_string("portfolio", "risk_profile") {
        Some(raw) => raw
            .parse()
            .map_err(|e: String| invalid("portfolio", "risk_profile", e)),
        None => Ok(RiskProfile::default()),
    }
}

fn validate_risk_profile(config: &dyn ConfigPort) -> Result<(), PortfolioError> {
    parse_risk_profile(config).map(|_| ())
}

/// `[portfolio] benchmark`, if set.
pub fn parse_benchmark(config: &dyn ConfigPort) -> Result<Option<Ticker>, PortfolioError> {
    match config.get_string("portfolio", "benchmark") {
        Some(raw) => Ticker::normalize(&raw)
            .filter(|t| !t.as_str().contains(','))
            .map(Some)
            .ok_or_else(|| {
                invalid(
                    "portfolio",
                    "benchmark",
                    "benchmark must be a single ticker".into(),
                )
            }),
        None => Ok(None),
    }
}

fn validate_benchmark(config: &dyn ConfigPort) -> Result<(), PortfolioError> {
    parse_benchmark(config).map(|_| ())
}

fn validate_risk_free_rate(config: &dyn ConfigPort) -> Result<(), PortfolioError> {
    let value = config.get_double("portfolio", "risk_free_rate", 0.0)?;
    if !(0.0..1.0).contains(&value) {
        return Err(invalid(
            "portfolio",
            "risk_free_rate",
            "risk_free_rate must be between 0 and 1".into(),
        ));
    }
    Ok(())
}

/// `[portfolio] gap_policy`, defaulting to forward fill.
pub fn parse_gap_policy(config: &dyn ConfigPort) -> Result<GapPolicy, PortfolioError> {
    match config.get_string("portfolio", "gap_policy") {
        Some(raw) => raw
            .parse()
            .map_err(|e: String| invalid("portfolio", "gap_policy", e)),
        None => Ok(GapPolicy::default()),
    }
}

fn validate_gap_policy(config: &dyn ConfigPort) -> Result<(), PortfolioError> {
    parse_gap_policy(config).map(|_| ())
}

/// Per-ticker weight bounds from `[bounds]`, sorted by ticker.
pub fn parse_bound_overrides(
    config: &dyn ConfigPort,
) -> Result<Vec<(Ticker, f64, f64)>, PortfolioError> {
    let mut keys = config.section_keys(BOUNDS_SECTION);
    keys.sort();
    let mut overrides: Vec<(Ticker, f64, f64)> = Vec::with_capacity(keys.len());
    for key in keys {
        let ticker = Ticker::normalize(&key)
            .filter(|t| !t.as_str().contains(','))
            .ok_or_else(|| invalid(BOUNDS_SECTION, &key, "not a ticker".into()))?;
        let raw = config
            .get_string(BOUNDS_SECTION, &key)
            .ok_or_else(|| missing(BOUNDS_SECTION, &key))?;
        let (min, max) = parse_bound_pair(&raw).ok_or_else(|| {
            invalid(
                BOUNDS_SECTION,
                &key,
                format!("expected 'min, max', got '{raw}'"),
            )
        })?;
        BoxConstraints::default()
            .with_override(ticker.clone(), min, max)
            .map_err(|e| match e {
                PortfolioError::InvalidRequest { reason, .. } => {
                    invalid(BOUNDS_SECTION, &key, reason)
                }
                other => other,
            })?;
        overrides.push((ticker, min, max));
    }
    Ok(overrides)
}

fn parse_bound_pair(raw: &str) -> Option<(f64, f64)> {
    let (min, max) = raw.split_once(',')?;
    Some((min.trim().parse().ok()?, max.trim().parse().ok()?))
}

fn validate_bound_overrides(config: &dyn ConfigPort) -> Result<(), PortfolioError> {
    parse_bound_overrides(config).map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::file_config_adapter::FileConfigAdapter;

    fn make_config(content: &str) -> FileConfigAdapter {
        FileConfigAdapter::from_string(content).unwrap()
    }

    const BASE: &str = "[portfolio]\ntickers = AAPL, MSFT\nstart_date = 2023-01-01\nend_date = 2023-12-31\ninvestment = 10000\n";

    fn with(extra: &str) -> FileConfigAdapter {
        make_config(&format!("{BASE}{extra}"))
    }

    #[test]
    fn valid_portfolio_config_passes() {
        let config = make_config(
            r#"
[portfolio]
tickers = AAPL, MSFT, GOOG
start_date = 2022-01-01
end_date = 2023-12-31
investment = 25000
min_weight = 0.05
max_weight = 0.6
risk_profile = high
benchmark = spy
risk_free_rate = 0.02
gap_policy = drop
compounding = true
"#,
        );
        assert!(validate_portfolio_config(&config).is_ok());
        assert_eq!(parse_risk_profile(&config).unwrap(), RiskProfile::High);
        assert_eq!(parse_gap_policy(&config).unwrap(), GapPolicy::Drop);
        assert_eq!(
            parse_benchmark(&config).unwrap(),
            Ticker::normalize("SPY")
        );
    }

    #[test]
    fn defaults_apply_when_optional_keys_absent() {
        let config = with("");
        assert!(validate_portfolio_config(&config).is_ok());
        assert_eq!(parse_risk_profile(&config).unwrap(), RiskProfile::Medium);
        assert_eq!(parse_gap_policy(&config).unwrap(), GapPolicy::ForwardFill);
        assert_eq!(parse_benchmark(&config).unwrap(), None);
    }

    #[test]
    fn settings_validation_ignores_tickers() {
        let config = make_config(
            "[portfolio]\nstart_date = 2023-01-01\nend_date = 2023-12-31\ninvestment = 1\n",
        );
        assert!(validate_portfolio_settings(&config).is_ok());
    }

    #[test]
    fn missing_tickers_fails() {
        let config = make_config(
            "[portfolio]\nstart_date = 2023-01-01\nend_date = 2023-12-31\ninvestment = 1\n",
        );
        let err = validate_portfolio_config(&config).unwrap_err();
        assert!(matches!(err, PortfolioError::ConfigMissing { key, .. } if key == "tickers"));
    }

    #[test]
    fn duplicate_tickers_fail() {
        let config = make_config(
            "[portfolio]\ntickers = AAPL, aapl\nstart_date = 2023-01-01\nend_date = 2023-12-31\ninvestment = 1\n",
        );
        let err = validate_portfolio_config(&config).unwrap_err();
        assert!(matches!(err, PortfolioError::ConfigInvalid { key, .. } if key == "tickers"));
    }

    #[test]
    fn invalid_start_date_format_fails() {
        let config = make_config(
            "[portfolio]\ntickers = A,B\nstart_date = 2023/01/01\nend_date = 2023-12-31\ninvestment = 1\n",
        );
        let err = validate_portfolio_config(&config).unwrap_err();
        assert!(matches!(err, PortfolioError::ConfigInvalid { key, .. } if key == "start_date"));
    }

    #[test]
    fn missing_end_date_fails() {
        let config =
            make_config("[portfolio]\ntickers = A,B\nstart_date = 2023-01-01\ninvestment = 1\n");
        let err = validate_portfolio_config(&config).unwrap_err();
        assert!(matches!(err, PortfolioError::ConfigMissing { key, .. } if key == "end_date"));
    }

    #[test]
    fn start_after_end_fails() {
        let config = make_config(
            "[portfolio]\ntickers = A,B\nstart_date = 2024-01-01\nend_date = 2023-01-01\ninvestment = 1\n",
        );
        let err = validate_portfolio_config(&config).unwrap_err();
        assert!(matches!(err, PortfolioError::ConfigInvalid { key, .. } if key == "start_date"));
    }

    #[test]
    fn investment_must_be_present_and_positive() {
        let config =
            make_config("[portfolio]\ntickers = A,B\nstart_date = 2023-01-01\nend_date = 2023-12-31\n");
        let err = validate_portfolio_config(&config).unwrap_err();
        assert!(matches!(err, PortfolioError::ConfigMissing { key, .. } if key == "investment"));

        let config = make_config(
            "[portfolio]\ntickers = A,B\nstart_date = 2023-01-01\nend_date = 2023-12-31\ninvestment = -5\n",
        );
        let err = validate_portfolio_config(&config).unwrap_err();
        assert!(matches!(err, PortfolioError::ConfigInvalid { key, .. } if key == "investment"));
    }

    #[test]
    fn weight_bounds_out_of_range_fail() {
        let err = validate_portfolio_config(&with("max_weight = 1.5\n")).unwrap_err();
        assert!(matches!(err, PortfolioError::ConfigInvalid { key, .. } if key == "max_weight"));

        let err = validate_portfolio_config(&with("min_weight = 0.7\nmax_weight = 0.3\n"))
            .unwrap_err();
        assert!(matches!(err, PortfolioError::ConfigInvalid { key, .. } if key == "min_weight"));
    }

    #[test]
    fn unknown_risk_profile_fails() {
        let err = validate_portfolio_config(&with("risk_profile = extreme\n")).unwrap_err();
        assert!(matches!(err, PortfolioError::ConfigInvalid { key, .. } if key == "risk_profile"));
    }

    #[test]
    fn risk_free_rate_out_of_range_fails() {
        let err = validate_portfolio_config(&with("risk_free_rate = 1.5\n")).unwrap_err();
        assert!(
            matches!(err, PortfolioError::ConfigInvalid { key, .. } if key == "risk_free_rate")
        );
    }

    #[test]
    fn unknown_gap_policy_fails() {
        let err = validate_portfolio_config(&with("gap_policy = interpolate\n")).unwrap_err();
        assert!(matches!(err, PortfolioError::ConfigInvalid { key, .. } if key == "gap_policy"));
    }

    #[test]
    fn benchmark_must_be_single_ticker() {
        let err = validate_portfolio_config(&with("benchmark = SPY,QQQ\n")).unwrap_err();
        assert!(matches!(err, PortfolioError::ConfigInvalid { key, .. } if key == "benchmark"));
    }

    #[test]
    fn csv_source_requires_data_dir() {
        let err = validate_source_config(&make_config("[source]\nkind = csv\n")).unwrap_err();
        assert!(matches!(err, PortfolioError::ConfigMissing { key, .. } if key == "data_dir"));
        assert!(validate_source_config(&make_config("[source]\nkind = csv\ndata_dir = ./d\n")).is_ok());
    }

    #[test]
    fn source_defaults_to_polygon() {
        assert!(validate_source_config(&make_config("[portfolio]\n")).is_ok());
    }

    #[test]
    fn unknown_source_kind_fails() {
        let err = validate_source_config(&make_config("[source]\nkind = yahoo\n")).unwrap_err();
        assert!(matches!(err, PortfolioError::ConfigInvalid { key, .. } if key == "kind"));
    }

    #[test]
    fn source_limits_checked() {
        let err = validate_source_config(&make_config("[source]\ntimeout_secs = 0\n")).unwrap_err();
        assert!(matches!(err, PortfolioError::ConfigInvalid { key, .. } if key == "timeout_secs"));
        let err = validate_source_config(&make_config("[source]\nmax_retries = 50\n")).unwrap_err();
        assert!(matches!(err, PortfolioError::ConfigInvalid { key, .. } if key == "max_retries"));
    }

    #[test]
    fn unknown_keys_are_reported_sorted() {
        let config = with("max_weigth = 0.5\nfoo = 1\n");
        assert_eq!(
            unknown_keys(&config, "portfolio", PORTFOLIO_KEYS),
            vec!["foo".to_string(), "max_weigth".to_string()]
        );
    }

    #[test]
    fn malformed_numbers_are_rejected_not_defaulted() {
        let err = validate_portfolio_config(&with("min_weight = 0.6x\n")).unwrap_err();
        assert!(matches!(err, PortfolioError::ConfigInvalid { key, .. } if key == "min_weight"));

        let err = validate_portfolio_config(&with("risk_free_rate = 2%\n")).unwrap_err();
        assert!(
            matches!(err, PortfolioError::ConfigInvalid { key, .. } if key == "risk_free_rate")
        );

        let err = validate_portfolio_config(&with("compounding = sometimes\n")).unwrap_err();
        assert!(matches!(err, PortfolioError::ConfigInvalid { key, .. } if key == "compounding"));

        let err = validate_source_config(&make_config("[source]\ntimeout_secs = 30s\n"))
            .unwrap_err();
        assert!(matches!(err, PortfolioError::ConfigInvalid { key, .. } if key == "timeout_secs"));
    }

    #[test]
    fn bound_overrides_parse_sorted() {
        let config = with("[bounds]\nmsft = 0.1, 0.3\naapl = 0, 0.5\n");
        assert!(validate_portfolio_config(&config).is_ok());
        assert_eq!(
            parse_bound_overrides(&config).unwrap(),
            vec![
                (Ticker::normalize("AAPL").unwrap(), 0.0, 0.5),
                (Ticker::normalize("MSFT").unwrap(), 0.1, 0.3),
            ]
        );
        assert!(parse_bound_overrides(&with("")).unwrap().is_empty());
    }

    #[test]
    fn bad_bound_overrides_fail() {
        for bad in ["aapl = 0.5\n", "aapl = 0.6, 0.2\n", "aapl = 0, 1.5\n", "aapl = a, b\n"] {
            let err = validate_portfolio_config(&with(&format!("[bounds]\n{bad}"))).unwrap_err();
            assert!(
                matches!(&err, PortfolioError::ConfigInvalid { section, key, .. } if section == "bounds" && key == "aapl"),
                "{bad}: {err:?}"
            );
        }
    }
}

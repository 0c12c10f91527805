//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::warn;

use crate::adapters::csv_adapter::CsvAdapter;
use crate::adapters::csv_report_adapter::CsvReportAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::config_validation::{
    parse_benchmark, parse_bound_overrides, parse_date, parse_gap_policy, parse_risk_profile,
    parse_ticker_list,
    unknown_keys, validate_portfolio_config, validate_portfolio_settings, validate_source_config,
    PORTFOLIO_KEYS, REPORT_KEYS, SOURCE_KEYS,
};
use crate::domain::error::PortfolioError;
use crate::domain::pipeline::{run_pipeline_with, OptimizationOutput, MIN_ASSETS};
use crate::domain::repository::PriceRepository;
use crate::domain::request::OptimizationRequest;
use crate::domain::ticker::{parse_tickers, Ticker};
use crate::ports::config_port::ConfigPort;
use crate::ports::price_port::PricePort;
use crate::ports::report_port::ReportPort;

/// Environment variable consulted when `[source] api_key` is not set.
pub const API_KEY_ENV: &str = "POLYGON_API_KEY";

#[derive(Parser, Debug)]
#[command(name = "pfopt", about = "Mean-variance portfolio optimizer")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Optimize a portfolio and write reports
    Optimize {
        #[arg(short, long)]
        config: PathBuf,
        /// Comma-separated tickers, replacing `[portfolio] tickers`
        #[arg(long)]
        tickers: Option<String>,
        #[arg(long)]
        benchmark: Option<String>,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Validate a configuration without fetching any data
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Fetch prices and show per-ticker coverage
    Fetch {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        tickers: Option<String>,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Optimize {
            config,
            tickers,
            benchmark,
            output,
        } => run_optimize(
            &config,
            tickers.as_deref(),
            benchmark.as_deref(),
            output.as_deref(),
        ),
        Command::Validate { config } => run_validate(&config),
        Command::Fetch { config, tickers } => run_fetch(&config, tickers.as_deref()),
    }
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, ExitCode> {
    FileConfigAdapter::from_file(path).map_err(|e| {
        let err = PortfolioError::ConfigParse {
            file: path.display().to_string(),
            reason: e.to_string(),
        };
        eprintln!("error: {err}");
        ExitCode::from(&err)
    })
}

fn fail(err: PortfolioError) -> ExitCode {
    eprintln!("error: {err}");
    (&err).into()
}

/// Build a request from `[portfolio]`. `tickers` replaces the configured
/// ticker list when given.
pub fn build_request(
    adapter: &dyn ConfigPort,
    tickers: Option<&str>,
) -> Result<OptimizationRequest, PortfolioError> {
    let tickers = match tickers {
        Some(raw) => parse_tickers(raw).map_err(|e| PortfolioError::InvalidRequest {
            field: "tickers".into(),
            reason: e.to_string(),
        })?,
        None => parse_ticker_list(adapter)?,
    };
    let start_date = parse_date(adapter, "start_date")?;
    let end_date = parse_date(adapter, "end_date")?;
    let investment = adapter.get_double("portfolio", "investment", 0.0)?;

    Ok(OptimizationRequest {
        min_weight: adapter.get_double("portfolio", "min_weight", 0.0)?,
        max_weight: adapter.get_double("portfolio", "max_weight", 1.0)?,
        risk_profile: parse_risk_profile(adapter)?,
        benchmark: parse_benchmark(adapter)?,
        risk_free_rate: adapter.get_double("portfolio", "risk_free_rate", 0.0)?,
        gap_policy: parse_gap_policy(adapter)?,
        compounding: adapter.get_bool("portfolio", "compounding", false)?,
        bound_overrides: parse_bound_overrides(adapter)?,
        ..OptimizationRequest::new(tickers, start_date, end_date, investment)
    })
}

/// Apply a `--benchmark` command line override.
pub fn apply_benchmark_override(
    request: &mut OptimizationRequest,
    benchmark: Option<&str>,
) -> Result<(), PortfolioError> {
    if let Some(raw) = benchmark {
        request.benchmark = Some(Ticker::normalize(raw).ok_or_else(|| {
            PortfolioError::InvalidRequest {
                field: "benchmark".into(),
                reason: "benchmark must not be empty".into(),
            }
        })?);
    }
    Ok(())
}

/// Construct the configured price source. `env_api_key` is the value of
/// [`API_KEY_ENV`], used when the config file carries no key.
pub fn build_price_port(
    adapter: &dyn ConfigPort,
    env_api_key: Option<String>,
) -> Result<Box<dyn PricePort + Sync>, PortfolioError> {
    let kind = adapter
        .get_string("source", "kind")
        .unwrap_or_else(|| "polygon".to_string())
        .to_lowercase();

    match kind.as_str() {
        "csv" => {
            let dir = adapter.get_string("source", "data_dir").ok_or_else(|| {
                PortfolioError::ConfigMissing {
                    section: "source".into(),
                    key: "data_dir".into(),
                }
            })?;
            Ok(Box::new(CsvAdapter::new(PathBuf::from(dir))))
        }
        "polygon" => polygon_port(adapter, env_api_key),
        other => Err(PortfolioError::ConfigInvalid {
            section: "source".into(),
            key: "kind".into(),
            reason: format!("unknown source '{other}'"),
        }),
    }
}

#[cfg(feature = "polygon")]
fn polygon_port(
    adapter: &dyn ConfigPort,
    env_api_key: Option<String>,
) -> Result<Box<dyn PricePort + Sync>, PortfolioError> {
    use crate::adapters::polygon_adapter::{PolygonAdapter, PolygonConfig};
    use std::time::Duration;

    let api_key = adapter
        .get_string("source", "api_key")
        .or(env_api_key.filter(|k| !k.trim().is_empty()))
        .ok_or_else(|| PortfolioError::ConfigMissing {
            section: "source".into(),
            key: "api_key".into(),
        })?;

    let mut config = PolygonConfig::new(api_key);
    if let Some(base_url) = adapter.get_string("source", "base_url") {
        config.base_url = base_url;
    }
    config.timeout = Duration::from_secs(adapter.get_int("source", "timeout_secs", 30)?.max(1) as u64);
    config.max_retries = adapter.get_int("source", "max_retries", 2)?.clamp(0, 10) as u32;
    Ok(Box::new(PolygonAdapter::new(config)?))
}

#[cfg(not(feature = "polygon"))]
fn polygon_port(
    _adapter: &dyn ConfigPort,
    _env_api_key: Option<String>,
) -> Result<Box<dyn PricePort + Sync>, PortfolioError> {
    Err(PortfolioError::ConfigInvalid {
        section: "source".into(),
        key: "kind".into(),
        reason: "built without the polygon feature".into(),
    })
}

fn warn_unknown_keys(adapter: &dyn ConfigPort) {
    for (section, known) in [
        ("portfolio", PORTFOLIO_KEYS),
        ("source", SOURCE_KEYS),
        ("report", REPORT_KEYS),
    ] {
        for key in unknown_keys(adapter, section, known) {
            warn!(section, key = %key, "ignoring unknown config key");
        }
    }
}

/// Validate `adapter` and turn it into a request.
pub fn prepare_request(
    adapter: &dyn ConfigPort,
    tickers: Option<&str>,
    benchmark: Option<&str>,
) -> Result<OptimizationRequest, PortfolioError> {
    match tickers {
        Some(_) => validate_portfolio_settings(adapter)?,
        None => validate_portfolio_config(adapter)?,
    }
    validate_source_config(adapter)?;
    let mut request = build_request(adapter, tickers)?;
    apply_benchmark_override(&mut request, benchmark)?;
    request.validate()?;
    Ok(request)
}

fn prepare(
    config_path: &Path,
    tickers: Option<&str>,
    benchmark: Option<&str>,
) -> Result<(FileConfigAdapter, OptimizationRequest), ExitCode> {
    eprintln!("Loading config from {}", config_path.display());
    let adapter = load_config(config_path)?;
    warn_unknown_keys(&adapter);
    let request = prepare_request(&adapter, tickers, benchmark).map_err(fail)?;
    Ok((adapter, request))
}

fn run_optimize(
    config_path: &Path,
    tickers: Option<&str>,
    benchmark: Option<&str>,
    output: Option<&Path>,
) -> ExitCode {
    let (adapter, request) = match prepare(config_path, tickers, benchmark) {
        Ok(v) => v,
        Err(code) => return code,
    };

    let port = match build_price_port(&adapter, std::env::var(API_KEY_ENV).ok()) {
        Ok(p) => p,
        Err(e) => return fail(e),
    };
    let parallel = match adapter.get_bool("source", "parallel", false) {
        Ok(p) => p,
        Err(e) => return fail(e),
    };
    let repository = PriceRepository::new(&*port).with_parallel(parallel);

    eprintln!(
        "Optimizing {} tickers ({} risk), {} to {}",
        request.tickers.len(),
        request.risk_profile,
        request.start_date,
        request.end_date
    );
    let output_data = match run_pipeline_with(&repository, &request) {
        Ok(o) => o,
        Err(e) => return fail(e),
    };

    print_summary(&output_data);

    let output_dir = output
        .map(Path::to_path_buf)
        .or_else(|| adapter.get_string("report", "output_dir").map(PathBuf::from));
    if let Some(dir) = output_dir {
        match CsvReportAdapter::new().write(&output_data, &dir) {
            Ok(paths) => {
                eprintln!("\nReports written to: {}", dir.display());
                for path in paths {
                    eprintln!("  {}", path.display());
                }
            }
            Err(e) => {
                eprintln!("error: failed to write reports: {e}");
                return (&e).into();
            }
        }
    }

    ExitCode::SUCCESS
}

/// Console summary on stderr.
pub fn print_summary(output: &OptimizationOutput) {
    if !output.skipped.is_empty() {
        eprintln!("\n=== Skipped Tickers ===");
        for s in &output.skipped {
            eprintln!("  {}: {}", s.ticker, s.reason);
        }
    }

    eprintln!("\n=== Weights ===");
    for (ticker, weight) in output.weights.iter() {
        eprintln!("  {:<8} {:>7.2}%", ticker.as_str(), weight * 100.0);
    }

    eprintln!("\n=== Performance ===");
    for row in output.summary.rows() {
        eprintln!("  {:<24} {}", row.metric, row.value);
    }

    eprintln!("\n=== Allocation ===");
    for (ticker, shares) in &output.allocation.shares {
        if *shares > 0 {
            let price = output.latest_prices.get(ticker).copied().unwrap_or(0.0);
            eprintln!("  {:<8} {:>6} @ {:.2}", ticker.as_str(), shares, price);
        }
    }
    eprintln!("  Leftover cash: {:.2}", output.allocation.leftover);

    if let Some(cmp) = &output.series.benchmark {
        if let (Some(p), Some(b)) = (cmp.portfolio.last_value(), cmp.benchmark_returns.last_value()) {
            eprintln!("\n=== Benchmark ({}) ===", cmp.benchmark);
            eprintln!("  Portfolio: {:.2}%", p * 100.0);
            eprintln!("  Benchmark: {:.2}%", b * 100.0);
        }
    }
}

pub fn run_validate(config_path: &Path) -> ExitCode {
    let (_adapter, request) = match prepare(config_path, None, None) {
        Ok(v) => v,
        Err(code) => return code,
    };
    eprintln!("Config validated successfully");

    if request.tickers.len() < MIN_ASSETS {
        return fail(PortfolioError::InsufficientAssets {
            available: request.tickers.len(),
            required: MIN_ASSETS,
        });
    }
    let constraints = match request.constraints() {
        Ok(c) => c,
        Err(e) => return fail(e),
    };
    if let Err(e) = constraints.check_feasible(&request.tickers) {
        return fail(e);
    }

    eprintln!("\nRequest:");
    eprintln!(
        "  tickers:     {}",
        request
            .tickers
            .iter()
            .map(Ticker::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    );
    eprintln!("  range:       {} to {}", request.start_date, request.end_date);
    eprintln!("  investment:  {:.2}", request.investment);
    eprintln!(
        "  bounds:      [{}, {}]",
        request.min_weight, request.max_weight
    );
    for (ticker, min, max) in &request.bound_overrides {
        eprintln!("    {ticker}: [{min}, {max}]");
    }
    eprintln!("  risk:        {}", request.risk_profile);
    if let Some(b) = &request.benchmark {
        eprintln!("  benchmark:   {}", b);
    }

    eprintln!("\nDry run complete: configuration is valid");
    ExitCode::SUCCESS
}

fn run_fetch(config_path: &Path, tickers: Option<&str>) -> ExitCode {
    let (adapter, request) = match prepare(config_path, tickers, None) {
        Ok(v) => v,
        Err(code) => return code,
    };
    let port = match build_price_port(&adapter, std::env::var(API_KEY_ENV).ok()) {
        Ok(p) => p,
        Err(e) => return fail(e),
    };
    let parallel = match adapter.get_bool("source", "parallel", false) {
        Ok(p) => p,
        Err(e) => return fail(e),
    };
    let repository = PriceRepository::new(&*port).with_parallel(parallel);

    let fetch = match repository.fetch_table(&request.tickers, request.start_date, request.end_date)
    {
        Ok(f) => f,
        Err(e) => return fail(e),
    };

    eprintln!("{} rows across {} tickers", fetch.table.len(), fetch.table.ticker_count());
    for ticker in fetch.table.tickers() {
        let Some(column) = fetch.table.column(ticker) else {
            continue;
        };
        if let (Some(first), Some(last)) = (column.first(), column.last()) {
            eprintln!(
                "  {:<8} {:>5} closes  {} to {}  last {:.2}",
                ticker.as_str(),
                column.len(),
                first.0,
                last.0,
                last.1
            );
        }
    }
    for s in &fetch.skipped {
        eprintln!("  {:<8} skipped: {}", s.ticker.as_str(), s.reason);
    }

    let aligned = fetch.table.aligned(request.gap_policy);
    eprintln!(
        "Aligned ({:?}): {} rows",
        request.gap_policy,
        aligned.len()
    );

    if fetch.table.ticker_count() == 0 {
        return fail(PortfolioError::InsufficientAssets {
            available: 0,
            required: 1,
        });
    }
    ExitCode::SUCCESS
}

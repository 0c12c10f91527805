//! Domain error types.
//!
//! Per-ticker failures (`DataUnavailable`, `UpstreamFetch`) are absorbed by the
//! price repository; everything else is pipeline-fatal and reaches the caller.

/// Top-level error type for pfopt.
#[derive(Debug, thiserror::Error)]
pub enum PortfolioError {
    #[error("no price data for {ticker} in requested range")]
    DataUnavailable { ticker: String },

    #[error("price source request failed for {ticker}: {reason}")]
    UpstreamFetch { ticker: String, reason: String },

    #[error("insufficient assets: {available} usable, need at least {required}")]
    InsufficientAssets { available: usize, required: usize },

    #[error("insufficient history for {ticker}: have {observations} prices, need 2")]
    InsufficientHistory { ticker: String, observations: usize },

    #[error(
        "infeasible constraints: weights in [{min_weight}, {max_weight}] cannot sum to 1 across {assets} assets"
    )]
    InfeasibleConstraints {
        min_weight: f64,
        max_weight: f64,
        assets: usize,
    },

    #[error("optimization failed: {reason}")]
    OptimizationFailed { reason: String },

    #[error("budget {budget:.2} cannot buy a single share (cheapest {cheapest:.2})")]
    BudgetTooSmall { budget: f64, cheapest: f64 },

    #[error("no latest price for {ticker}")]
    MissingPrice { ticker: String },

    #[error("invalid request field {field}: {reason}")]
    InvalidRequest { field: String, reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl PortfolioError {
    /// True for failures the repository absorbs instead of failing the batch.
    pub fn is_per_ticker(&self) -> bool {
        matches!(
            self,
            PortfolioError::DataUnavailable { .. } | PortfolioError::UpstreamFetch { .. }
        )
    }
}

impl From<&PortfolioError> for std::process::ExitCode {
    fn from(err: &PortfolioError) -> Self {
        let code: u8 = match err {
            PortfolioError::Io(_) => 1,
            PortfolioError::ConfigParse { .. }
            | PortfolioError::ConfigMissing { .. }
            | PortfolioError::ConfigInvalid { .. }
            | PortfolioError::InvalidRequest { .. } => 2,
            PortfolioError::UpstreamFetch { .. } => 3,
            PortfolioError::DataUnavailable { .. }
            | PortfolioError::InsufficientAssets { .. }
            | PortfolioError::InsufficientHistory { .. }
            | PortfolioError::MissingPrice { .. } => 5,
            PortfolioError::InfeasibleConstraints { .. }
            | PortfolioError::OptimizationFailed { .. } => 6,
            PortfolioError::BudgetTooSmall { .. } => 7,
        };
        std::process::ExitCode::from(code)
    }
}

//! Report generation port trait.

use crate::domain::error::PortfolioError;
use crate::domain::pipeline::OptimizationOutput;
use std::path::{Path, PathBuf};

/// Port for persisting an optimization run.
pub trait ReportPort {
    /// Write every report artifact into `output_dir`, returning the paths
    /// written.
    fn write(
        &self,
        output: &OptimizationOutput,
        output_dir: &Path,
    ) -> Result<Vec<PathBuf>, PortfolioError>;
}

//! Configuration access port trait.

use crate::domain::error::PortfolioError;

/// Typed getters return `default` for an absent key and
/// [`PortfolioError::ConfigInvalid`] for a present value that does not parse.
pub trait ConfigPort {
    fn get_string(&self, section: &str, key: &str) -> Option<String>;
    fn get_int(&self, section: &str, key: &str, default: i64) -> Result<i64, PortfolioError>;
    fn get_double(&self, section: &str, key: &str, default: f64) -> Result<f64, PortfolioError>;
    fn get_bool(&self, section: &str, key: &str, default: bool) -> Result<bool, PortfolioError>;

    /// Keys present in `section`, in no particular order.
    fn section_keys(&self, section: &str) -> Vec<String>;
}

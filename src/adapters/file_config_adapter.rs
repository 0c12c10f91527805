//! INI file configuration adapter.

use crate::domain::error::PortfolioError;
use crate::ports::config_port::ConfigPort;
use configparser::ini::Ini;
use std::path::Path;
use std::str::FromStr;

pub struct FileConfigAdapter {
    config: Ini,
}

impl FileConfigAdapter {
    pub fn from_file<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        let mut config = Ini::new();
        config.load(path).map_err(std::io::Error::other)?;
        Ok(Self { config })
    }

    pub fn from_string(content: &str) -> Result<Self, String> {
        let mut config = Ini::new();
        config.read(content.to_string())?;
        Ok(Self { config })
    }

    fn parse_bool(value: &str) -> Option<bool> {
        match value.to_lowercase().as_str() {
            "true" | "yes" | "1" | "on" => Some(true),
            "false" | "no" | "0" | "off" => Some(false),
            _ => None,
        }
    }

    fn parse_value<T>(
        &self,
        section: &str,
        key: &str,
        default: T,
        parse: impl Fn(&str) -> Option<T>,
        expected: &str,
    ) -> Result<T, PortfolioError> {
        match self.get_string(section, key) {
            None => Ok(default),
            Some(raw) => parse(&raw).ok_or_else(|| PortfolioError::ConfigInvalid {
                section: section.to_string(),
                key: key.to_string(),
                reason: format!("expected {expected}, got '{raw}'"),
            }),
        }
    }
}

fn parse_number<T: FromStr>(raw: &str) -> Option<T> {
    raw.parse().ok()
}

impl ConfigPort for FileConfigAdapter {
    fn get_string(&self, section: &str, key: &str) -> Option<String> {
        self.config
            .get(section, key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn get_int(&self, section: &str, key: &str, default: i64) -> Result<i64, PortfolioError> {
        self.parse_value(section, key, default, parse_number::<i64>, "an integer")
    }

    fn get_double(&self, section: &str, key: &str, default: f64) -> Result<f64, PortfolioError> {
        self.parse_value(section, key, default, parse_number::<f64>, "a number")
    }

    fn get_bool(&self, section: &str, key: &str, default: bool) -> Result<bool, PortfolioError> {
        self.parse_value(section, key, default, Self::parse_bool, "true or false")
    }

    fn section_keys(&self, section: &str) -> Vec<String> {
        self.config
            .get_map_ref()
            .get(&section.to_lowercase())
            .map(|keys| keys.keys().cloned().collect())
            .unwrap_or_default()
    }
}

//! Runtime configuration, read from an optional YAML file.

use chrono::{Local, NaiveDate};
use log::LevelFilter;
use serde::Deserialize;
use std::{fs, path::Path, path::PathBuf, str::FromStr};

use crate::error::Result;

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    /// JSON snapshot holding clients, loans, receipts and payments.
    pub snapshot: PathBuf,
    pub log_level: String,
    /// Fixed "today", for reproducible runs.
    pub as_of: Option<NaiveDate>,
    /// Prefix printed before amounts.
    pub currency: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            snapshot: PathBuf::from("loans.json"),
            log_level: "info".to_string(),
            as_of: None,
            currency: "R$".to_string(),
        }
    }
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let s = fs::read_to_string(path)?;
        let cfg: Self = serde_yaml::from_str(&s)?;
        Ok(cfg)
    }

    /// Configured level raised by one step per `verbose` flag. Unknown level
    /// names read as `info`.
    pub fn level_filter(&self, verbose: u8) -> LevelFilter {
        let base = LevelFilter::from_str(self.log_level.trim()).unwrap_or(LevelFilter::Info);
        LevelFilter::iter()
            .skip_while(|&level| level != base)
            .nth(verbose.into())
            .unwrap_or(LevelFilter::Trace)
    }

    pub fn today(&self) -> NaiveDate {
        self.as_of.unwrap_or_else(|| Local::now().date_naive())
    }

    pub fn money(&self, amount: f64) -> String {
        format!("{} {:.2}", self.currency, amount)
    }
}

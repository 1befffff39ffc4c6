//! Runtime settings.
//!
//! Read from `PAYROLL_*` environment variables, with a `.env` file in the
//! working directory honoured when present.  Unset keys keep the values
//! from [`Settings::default`].

use crate::tax::Annualization;
use anyhow::{Context, Result};
use config::{Config, Environment};
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub bind_addr: String,
    /// Directory of per-business rule overrides.
    pub rules_dir: PathBuf,
    pub tax_year: i32,
    /// `flat-monthly` or `by-period`.
    pub annualization: Annualization,
    /// Filter used when `RUST_LOG` is unset.
    pub log_level: String,
    pub log_json: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:3000".to_string(),
            rules_dir: PathBuf::from("tax_rules"),
            tax_year: 2024,
            annualization: Annualization::FlatMonthly,
            log_level: "info".to_string(),
            log_json: false,
        }
    }
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::load(Environment::with_prefix("PAYROLL"))
    }

    fn load(env: Environment) -> Result<Self> {
        let config = Config::builder()
            .add_source(env)
            .build()
            .context("reading PAYROLL_* settings")?;
        config.try_deserialize().context("invalid PAYROLL_* settings")
    }
}

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use dotenvy::dotenv;
use serde::Deserialize;

use crate::security::permissions::Role;
use crate::totals::TaxRateTable;

/// Configuration for the billing application
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Database connection URL, only required when running against PostgreSQL
    #[serde(default)]
    pub database_url: Option<String>,

    #[serde(default)]
    pub smtp_host: Option<String>,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    #[serde(default)]
    pub smtp_username: Option<String>,
    #[serde(default)]
    pub smtp_password: Option<String>,

    #[serde(default = "default_company_name")]
    pub company_name: String,
    #[serde(default = "default_company_email")]
    pub company_email: String,

    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Shared secret for request signatures; signature checks are skipped when unset
    #[serde(default)]
    pub hmac_secret: Option<String>,
    #[serde(default = "default_signature_tolerance_secs")]
    pub signature_tolerance_secs: u64,

    /// Role granted to callers of the HTTP functions
    #[serde(default = "default_api_role")]
    pub api_role: String,
    /// Role of the person running the terminal UI
    #[serde(default = "default_operator_role")]
    pub operator_role: String,

    #[serde(default = "default_rate_limit_max")]
    pub rate_limit_max: usize,
    #[serde(default = "default_rate_limit_window_secs")]
    pub rate_limit_window_secs: u64,

    #[serde(default = "default_tax_rate_standard")]
    pub tax_rate_standard: f64,
    #[serde(default = "default_tax_rate_reduced")]
    pub tax_rate_reduced: f64,
    #[serde(default = "default_tax_rate_zero")]
    pub tax_rate_zero: f64,

    #[serde(default = "default_pandoc_path")]
    pub pandoc_path: String,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_log_file")]
    pub log_file: PathBuf,
}

/// Identity printed on documents and used as the mail sender
#[derive(Debug, Clone, PartialEq)]
pub struct CompanyInfo {
    pub name: String,
    pub email: String,
}

impl Default for CompanyInfo {
    fn default() -> Self {
        Self {
            name: default_company_name(),
            email: default_company_email(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Variables from a `.env` file are loaded first if the file exists.
    pub fn load() -> Result<Self> {
        dotenv().ok();

        let config = envy::from_env::<Config>()?;
        config.validate()?;

        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        self.api_role()?;
        self.operator_role()?;

        for (name, rate) in [
            ("TAX_RATE_STANDARD", self.tax_rate_standard),
            ("TAX_RATE_REDUCED", self.tax_rate_reduced),
            ("TAX_RATE_ZERO", self.tax_rate_zero),
        ] {
            if !rate.is_finite() || rate < 0.0 {
                anyhow::bail!("{name} must be a non-negative number, got {rate}");
            }
        }

        Ok(())
    }

    pub fn database_url(&self) -> Result<&str> {
        self.database_url
            .as_deref()
            .context("DATABASE_URL must be set unless running with --in-memory")
    }

    pub fn api_role(&self) -> Result<Role> {
        self.api_role
            .parse::<Role>()
            .map_err(anyhow::Error::msg)
            .with_context(|| format!("invalid API_ROLE '{}'", self.api_role))
    }

    pub fn operator_role(&self) -> Result<Role> {
        self.operator_role
            .parse::<Role>()
            .map_err(anyhow::Error::msg)
            .with_context(|| format!("invalid OPERATOR_ROLE '{}'", self.operator_role))
    }

    pub fn tax_rates(&self) -> TaxRateTable {
        TaxRateTable {
            standard: self.tax_rate_standard,
            reduced: self.tax_rate_reduced,
            zero: self.tax_rate_zero,
        }
    }

    pub fn company(&self) -> CompanyInfo {
        CompanyInfo {
            name: self.company_name.clone(),
            email: self.company_email.clone(),
        }
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window_secs)
    }
}

/// Initialize environment variables and load configuration
pub fn init() -> Result<Config> {
    Config::load()
}

fn default_smtp_port() -> u16 {
    587
}

fn default_company_name() -> String {
    "Your Company".to_string()
}

fn default_company_email() -> String {
    "billing@company.com".to_string()
}

fn default_bind_address() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_signature_tolerance_secs() -> u64 {
    300
}

fn default_api_role() -> String {
    "api_user".to_string()
}

fn default_operator_role() -> String {
    "billing_manager".to_string()
}

fn default_rate_limit_max() -> usize {
    100
}

fn default_rate_limit_window_secs() -> u64 {
    60
}

fn default_tax_rate_standard() -> f64 {
    0.21
}

fn default_tax_rate_reduced() -> f64 {
    0.09
}

fn default_tax_rate_zero() -> f64 {
    0.0
}

fn default_pandoc_path() -> String {
    "pandoc".to_string()
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("invoices")
}

fn default_log_file() -> PathBuf {
    PathBuf::from("billing.log")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from_pairs(pairs: &[(&str, &str)]) -> Result<Config> {
        let vars = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()));
        let config = envy::from_iter::<_, Config>(vars)?;
        config.validate()?;
        Ok(config)
    }

    #[test]
    fn defaults_apply_when_environment_is_empty() {
        let config = from_pairs(&[]).unwrap();

        assert_eq!(config.smtp_port, 587);
        assert_eq!(config.bind_address, "0.0.0.0:8080");
        assert_eq!(config.api_role().unwrap(), Role::ApiUser);
        assert_eq!(config.operator_role().unwrap(), Role::BillingManager);
        assert_eq!(config.tax_rates(), TaxRateTable::default());
        assert!(config.hmac_secret.is_none());
        assert!(config.database_url().is_err());
    }

    #[test]
    fn tax_rates_come_from_environment() {
        let config = from_pairs(&[
            ("TAX_RATE_STANDARD", "0.2"),
            ("TAX_RATE_REDUCED", "0.05"),
        ])
        .unwrap();

        let rates = config.tax_rates();
        assert_eq!(rates.standard, 0.2);
        assert_eq!(rates.reduced, 0.05);
        assert_eq!(rates.zero, 0.0);
    }

    #[test]
    fn unknown_role_is_rejected() {
        assert!(from_pairs(&[("API_ROLE", "superuser")]).is_err());
    }

    #[test]
    fn negative_tax_rate_is_rejected() {
        assert!(from_pairs(&[("TAX_RATE_REDUCED", "-0.1")]).is_err());
    }
}

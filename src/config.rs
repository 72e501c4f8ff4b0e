//! Configuration loader and validator for the booking service.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub app: App,
    pub checkout: Checkout,
}

/// App-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub bind_addr: String,
    pub data_dir: String,
}

/// Hosted-checkout provider settings. The secret key authenticates outbound
/// API calls; the webhook secret verifies inbound event signatures.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Checkout {
    pub api_base: String,
    pub secret_key: String,
    pub webhook_secret: String,
    pub currency: String,
    pub success_url: String,
    pub cancel_url: String,
}

impl Config {
    /// Ensure required directories exist (creates `app.data_dir` if missing).
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        if self.app.data_dir.trim().is_empty() {
            return Ok(());
        }
        fs::create_dir_all(&self.app.data_dir)
    }
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&content)?;
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.bind_addr.trim().is_empty() {
        return Err(ConfigError::Invalid("app.bind_addr must be non-empty"));
    }
    if cfg.app.data_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.data_dir must be non-empty"));
    }

    if cfg.checkout.api_base.trim().is_empty() {
        return Err(ConfigError::Invalid("checkout.api_base must be non-empty"));
    }
    if cfg.checkout.secret_key.trim().is_empty() {
        return Err(ConfigError::Invalid("checkout.secret_key must be non-empty"));
    }
    if cfg.checkout.webhook_secret.trim().is_empty() {
        return Err(ConfigError::Invalid(
            "checkout.webhook_secret must be non-empty",
        ));
    }
    if cfg.checkout.currency.trim().len() != 3 {
        return Err(ConfigError::Invalid(
            "checkout.currency must be a 3-letter code",
        ));
    }
    if cfg.checkout.success_url.trim().is_empty() {
        return Err(ConfigError::Invalid("checkout.success_url must be non-empty"));
    }
    if cfg.checkout.cancel_url.trim().is_empty() {
        return Err(ConfigError::Invalid("checkout.cancel_url must be non-empty"));
    }

    Ok(())
}

/// Example YAML configuration, also used by tests.
pub fn example() -> &'static str {
    r#"app:
  bind_addr: "127.0.0.1:8080"
  data_dir: "./data"

checkout:
  api_base: "https://api.checkout.example/"
  secret_key: "YOUR_CHECKOUT_SECRET_KEY"
  webhook_secret: "YOUR_WEBHOOK_SIGNING_SECRET"
  currency: "brl"
  success_url: "https://app.example/dashboard/student?success=true"
  cancel_url: "https://app.example/book?cancelled=true"
"#
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn parse_example_ok() {
        let cfg: Config = serde_yaml::from_str(example()).unwrap();
        validate(&cfg).unwrap();
    }

    #[test]
    fn invalid_secret_key() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.checkout.secret_key = "".into();
        let err = validate(&cfg).unwrap_err();
        match err {
            ConfigError::Invalid(msg) => assert!(msg.contains("checkout.secret_key")),
            _ => panic!("wrong error"),
        }
    }

    #[test]
    fn invalid_webhook_secret() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.checkout.webhook_secret = " ".into();
        let err = validate(&cfg).unwrap_err();
        match err {
            ConfigError::Invalid(msg) => assert!(msg.contains("webhook_secret")),
            _ => panic!("wrong error"),
        }
    }

    #[test]
    fn invalid_currency_code() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.checkout.currency = "reais".into();
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn invalid_urls() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.checkout.success_url = "".into();
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));

        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.checkout.cancel_url = "".into();
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn ensure_dirs_creates_data_dir() {
        let td = tempdir().unwrap();
        let data_path = td.path().join("data");
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.app.data_dir = data_path.to_string_lossy().to_string();
        cfg.ensure_dirs().unwrap();
        assert!(data_path.exists());
    }

    #[test]
    fn load_from_file_ok() {
        let td = tempdir().unwrap();
        let p = td.path().join("config.yaml");
        fs::write(&p, example()).unwrap();
        let cfg = load(Some(&p)).unwrap();
        assert_eq!(cfg.app.bind_addr, "127.0.0.1:8080");
        assert_eq!(cfg.checkout.currency, "brl");
    }
}

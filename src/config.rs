//! Configuration for Growest Connect
//!
//! CLI arguments and environment variable handling using clap.

use clap::Parser;
use std::net::SocketAddr;
use std::time::Duration;

use crate::auth::JwtValidator;
use crate::services::BillingConfig;
use crate::types::{ConnectError, Result};

/// Growest Connect - entrepreneur and investor matchmaking API
#[derive(Parser, Debug, Clone)]
#[command(name = "growest-connect")]
#[command(about = "Authorization, KYC, premium plans and connection workflow for Growest")]
pub struct Args {
    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,

    /// Enable development mode (in-memory fallbacks, dev JWT secret)
    #[arg(long, env = "DEV_MODE", default_value = "false")]
    pub dev_mode: bool,

    /// MongoDB connection URI
    #[arg(long, env = "MONGODB_URI", default_value = "mongodb://localhost:27017")]
    pub mongodb_uri: String,

    /// MongoDB database name
    #[arg(long, env = "MONGODB_DB", default_value = "growest")]
    pub mongodb_db: String,

    /// JWT secret for token signing (required in production)
    #[arg(long, env = "JWT_SECRET")]
    pub jwt_secret: Option<String>,

    /// JWT token expiry in seconds
    #[arg(long, env = "JWT_EXPIRY_SECONDS", default_value = "86400")]
    pub jwt_expiry_seconds: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log output format (text or json)
    #[arg(long, env = "LOG_FORMAT", default_value = "text")]
    pub log_format: String,

    /// Timeout for calls to file storage and remote functions, in milliseconds
    #[arg(long, env = "REQUEST_TIMEOUT_MS", default_value = "30000")]
    pub request_timeout_ms: u64,

    /// Object storage API base URL (e.g. "https://project.example.co/storage/v1")
    #[arg(long, env = "STORAGE_URL")]
    pub storage_url: Option<String>,

    /// Base URL for public object reads (defaults to {STORAGE_URL}/object/public)
    #[arg(long, env = "STORAGE_PUBLIC_URL")]
    pub storage_public_url: Option<String>,

    /// Service key sent to object storage
    #[arg(long, env = "STORAGE_SERVICE_KEY")]
    pub storage_service_key: Option<String>,

    /// Remote functions base URL (functions are invoked at {FUNCTIONS_URL}/{name})
    #[arg(long, env = "FUNCTIONS_URL")]
    pub functions_url: Option<String>,

    /// API key sent to remote functions
    #[arg(long, env = "FUNCTIONS_API_KEY")]
    pub functions_api_key: Option<String>,

    /// Currency for plan prices
    #[arg(long, env = "BILLING_CURRENCY", default_value = "XOF")]
    pub currency: String,

    /// Monthly price of the start plan
    #[arg(long, env = "PRICE_START", default_value = "5000")]
    pub price_start: f64,

    /// Monthly price of the capital plan
    #[arg(long, env = "PRICE_CAPITAL", default_value = "15000")]
    pub price_capital: f64,

    /// Monthly price of the pro_plus plan
    #[arg(long, env = "PRICE_PRO_PLUS", default_value = "35000")]
    pub price_pro_plus: f64,

    /// Length of a paid subscription period in days
    #[arg(long, env = "SUBSCRIPTION_DAYS", default_value = "30")]
    pub subscription_days: i64,

    /// Page the payment gateway redirects to after checkout
    #[arg(long, env = "PAYMENT_CALLBACK_URL")]
    pub payment_callback_url: Option<String>,

    /// Interval of the subscription expiry sweep in seconds
    #[arg(long, env = "EXPIRY_SWEEP_SECS", default_value = "3600")]
    pub expiry_sweep_secs: u64,

    /// Capacity of the change feed channel
    #[arg(long, env = "FEED_CAPACITY", default_value = "256")]
    pub feed_capacity: usize,
}

impl Args {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn expiry_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.expiry_sweep_secs.max(1))
    }

    pub fn json_logs(&self) -> bool {
        self.log_format.eq_ignore_ascii_case("json")
    }

    pub fn billing(&self) -> BillingConfig {
        BillingConfig {
            currency: self.currency.clone(),
            start_price: self.price_start,
            capital_price: self.price_capital,
            pro_plus_price: self.price_pro_plus,
            period_days: self.subscription_days,
            callback_url: self.payment_callback_url.clone(),
        }
    }

    /// Token validator for this configuration. Dev mode without a secret
    /// uses the built-in development secret.
    pub fn jwt_validator(&self) -> Result<JwtValidator> {
        match (&self.jwt_secret, self.dev_mode) {
            (Some(secret), _) => JwtValidator::new(secret.clone(), self.jwt_expiry_seconds),
            (None, true) => Ok(JwtValidator::new_dev()),
            (None, false) => Err(ConnectError::Config(
                "JWT_SECRET is required in production mode".into(),
            )),
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> std::result::Result<(), String> {
        if !self.dev_mode && self.jwt_secret.is_none() {
            return Err("JWT_SECRET is required in production mode".to_string());
        }

        if !matches!(self.log_format.to_ascii_lowercase().as_str(), "text" | "json") {
            return Err(format!("LOG_FORMAT must be text or json, got '{}'", self.log_format));
        }

        for (name, price) in [
            ("PRICE_START", self.price_start),
            ("PRICE_CAPITAL", self.price_capital),
            ("PRICE_PRO_PLUS", self.price_pro_plus),
        ] {
            if !price.is_finite() || price <= 0.0 {
                return Err(format!("{} must be a positive amount", name));
            }
        }

        if self.subscription_days <= 0 {
            return Err("SUBSCRIPTION_DAYS must be positive".to_string());
        }

        if self.feed_capacity == 0 {
            return Err("FEED_CAPACITY must be positive".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &[&str]) -> Args {
        let mut argv = vec!["growest-connect"];
        argv.extend_from_slice(extra);
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_production_requires_jwt_secret() {
        let args = parse(&[]);
        assert!(args.validate().is_err());
        assert!(args.jwt_validator().is_err());

        let args = parse(&["--jwt-secret", "0123456789abcdef0123456789abcdef"]);
        assert!(args.validate().is_ok());
        assert!(args.jwt_validator().is_ok());
    }

    #[test]
    fn test_dev_mode_defaults() {
        let args = parse(&["--dev-mode"]);
        assert!(args.validate().is_ok());
        assert!(args.jwt_validator().is_ok());
        assert!(!args.json_logs());

        let billing = args.billing();
        assert_eq!(billing.currency, "XOF");
        assert_eq!(billing.period_days, 30);
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(parse(&["--dev-mode", "--price-capital", "0"]).validate().is_err());
        assert!(parse(&["--dev-mode", "--log-format", "xml"]).validate().is_err());
        assert!(parse(&["--dev-mode", "--subscription-days", "0"]).validate().is_err());
    }
}

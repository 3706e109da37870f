//! Server configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `ZENTRO_DATABASE_URL` - `PostgreSQL` connection string
//! - `FLUTTERWAVE_SECRET_KEY` - Flutterwave API secret key
//! - `FLUTTERWAVE_WEBHOOK_HASH` - shared secret for webhook signatures
//! - `PAYSTACK_SECRET_KEY` - Paystack API secret key
//!
//! ## Optional
//! - `ZENTRO_HOST` - Bind address (default: 127.0.0.1)
//! - `ZENTRO_PORT` - Listen port (default: 8000)
//! - `FLUTTERWAVE_REDIRECT_URL` - where the hosted checkout sends the buyer
//!   back to (default: http://localhost:3000/checkout/pending)
//! - `PAYSTACK_CALLBACK_URL` - ditto for Paystack
//! - `SENTRY_DSN` - Sentry error tracking DSN

use std::net::{IpAddr, SocketAddr};

use secrecy::SecretString;
use thiserror::Error;

/// Blocklist of common placeholder patterns (case-insensitive).
const PLACEHOLDER_PATTERNS: &[&str] = &["your-", "changeme", "replace", "placeholder", "example"];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: looks like a placeholder")]
    InsecureSecret(String),
}

/// Server application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: SecretString,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Flutterwave gateway configuration
    pub flutterwave: FlutterwaveConfig,
    /// Paystack gateway configuration
    pub paystack: PaystackConfig,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
}

/// Flutterwave API configuration.
#[derive(Debug, Clone)]
pub struct FlutterwaveConfig {
    pub secret_key: SecretString,
    /// Shared secret the gateway echoes in the `verif-hash` webhook header.
    pub webhook_hash: SecretString,
    /// Where the hosted checkout redirects the buyer afterwards.
    pub redirect_url: String,
}

/// Paystack API configuration.
#[derive(Debug, Clone)]
pub struct PaystackConfig {
    pub secret_key: SecretString,
    pub callback_url: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid,
    /// or if a secret looks like an unreplaced placeholder.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let host = optional_env("ZENTRO_HOST")
            .unwrap_or_else(|| "127.0.0.1".to_owned())
            .parse::<IpAddr>()
            .map_err(|e| ConfigError::InvalidEnvVar("ZENTRO_HOST".to_owned(), e.to_string()))?;
        let port = optional_env("ZENTRO_PORT")
            .unwrap_or_else(|| "8000".to_owned())
            .parse::<u16>()
            .map_err(|e| ConfigError::InvalidEnvVar("ZENTRO_PORT".to_owned(), e.to_string()))?;

        Ok(Self {
            database_url: secret_env("ZENTRO_DATABASE_URL")?,
            host,
            port,
            flutterwave: FlutterwaveConfig {
                secret_key: secret_env("FLUTTERWAVE_SECRET_KEY")?,
                webhook_hash: secret_env("FLUTTERWAVE_WEBHOOK_HASH")?,
                redirect_url: optional_env("FLUTTERWAVE_REDIRECT_URL")
                    .unwrap_or_else(|| "http://localhost:3000/checkout/pending".to_owned()),
            },
            paystack: PaystackConfig {
                secret_key: secret_env("PAYSTACK_SECRET_KEY")?,
                callback_url: optional_env("PAYSTACK_CALLBACK_URL")
                    .unwrap_or_else(|| "http://localhost:3000/checkout/pending".to_owned()),
            },
            sentry_dsn: optional_env("SENTRY_DSN"),
        })
    }

    /// The socket address to bind.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

fn required_env(name: &str) -> Result<String, ConfigError> {
    std::env::var(name).map_err(|_| ConfigError::MissingEnvVar(name.to_owned()))
}

fn optional_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn secret_env(name: &str) -> Result<SecretString, ConfigError> {
    let value = required_env(name)?;
    let lowered = value.to_lowercase();
    if PLACEHOLDER_PATTERNS.iter().any(|p| lowered.contains(p)) {
        return Err(ConfigError::InsecureSecret(name.to_owned()));
    }
    Ok(SecretString::from(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_secrets_are_rejected() {
        let lowered = "your-secret-key-here".to_lowercase();
        assert!(PLACEHOLDER_PATTERNS.iter().any(|p| lowered.contains(p)));
    }
}

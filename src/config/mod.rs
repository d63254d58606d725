//! Runtime configuration from command-line flags and environment variables.
//!
//! Every flag has an environment fallback, and a `.env` file in the working
//! directory is loaded first by [`Config::load`].

use std::time::Duration;

use clap::Parser;
use thiserror::Error;
use tracing::{info, warn};
use url::Url;

pub const DEFAULT_PLACES_BASE_URL: &str = "https://places.googleapis.com";
pub const DEFAULT_CRM_BASE_URL: &str = "http://localhost:8080";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name} is not a valid URL ({value}): {source}")]
    InvalidUrl {
        name: &'static str,
        value: String,
        #[source]
        source: url::ParseError,
    },

    #[error("{name} must use http or https, got {scheme}")]
    UnsupportedScheme { name: &'static str, scheme: String },
}

/// Proxy configuration.
#[derive(Debug, Clone, Parser)]
#[command(name = "estate-proxy", about = "CRM and Places reverse proxy", version)]
pub struct Config {
    /// Interface to listen on.
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    #[arg(short, long, env = "PORT", default_value_t = 3001)]
    pub port: u16,

    /// Google Places key; forwarded as an empty header when unset.
    #[arg(long, env = "GOOGLE_PLACES_API_KEY", default_value = "", hide_env_values = true)]
    pub places_api_key: String,

    #[arg(long, env = "PLACES_BASE_URL", default_value = DEFAULT_PLACES_BASE_URL)]
    pub places_base_url: String,

    #[arg(long, env = "CRM_BASE_URL", default_value = DEFAULT_CRM_BASE_URL)]
    pub crm_base_url: String,

    /// CRM key; requests go out unauthenticated when unset or empty.
    #[arg(long, env = "CRM_API_KEY", hide_env_values = true)]
    pub crm_api_key: Option<String>,

    /// Lifetime of cached CRM responses, in seconds.
    #[arg(long, env = "CACHE_TTL_SECS", default_value_t = 300)]
    pub cache_ttl_secs: u64,

    /// Default log filter; `RUST_LOG` takes precedence.
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_owned(),
            port: 3001,
            places_api_key: String::new(),
            places_base_url: DEFAULT_PLACES_BASE_URL.to_owned(),
            crm_base_url: DEFAULT_CRM_BASE_URL.to_owned(),
            crm_api_key: None,
            cache_ttl_secs: 300,
            log_level: "info".to_owned(),
        }
    }
}

impl Config {
    /// Loads `.env` (if present), then parses flags and environment.
    pub fn load() -> Self {
        dotenv::dotenv().ok();
        Self::parse()
    }

    /// Checks both upstream base URLs.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_base_url("PLACES_BASE_URL", &self.places_base_url)?;
        check_base_url("CRM_BASE_URL", &self.crm_base_url)?;
        Ok(())
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    /// The CRM key, treating an empty value as absent.
    pub fn crm_key(&self) -> Option<&str> {
        self.crm_api_key.as_deref().filter(|k| !k.is_empty())
    }

    /// Logs the effective settings without revealing secrets.
    pub fn log_summary(&self) {
        info!(
            listen = %self.listen_addr(),
            places = %self.places_base_url,
            crm = %self.crm_base_url,
            cache_ttl_secs = self.cache_ttl_secs,
            "configuration loaded"
        );
        if self.places_api_key.is_empty() {
            warn!("GOOGLE_PLACES_API_KEY is not set; Places requests will be rejected upstream");
        }
        if self.crm_key().is_none() {
            warn!("CRM_API_KEY is not set; CRM requests are forwarded without credentials");
        }
    }
}

fn check_base_url(name: &'static str, value: &str) -> Result<(), ConfigError> {
    let url = Url::parse(value).map_err(|source| ConfigError::InvalidUrl {
        name,
        value: value.to_owned(),
        source,
    })?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(ConfigError::UnsupportedScheme {
            name,
            scheme: other.to_owned(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_defaults() {
        let config = Config::try_parse_from([
            "estate-proxy",
            "--port",
            "4000",
            "--crm-base-url",
            "https://crm.example.com/v2",
            "--crm-api-key",
            "secret",
            "--cache-ttl-secs",
            "60",
        ])
        .unwrap();
        assert_eq!(config.port, 4000);
        assert_eq!(config.crm_base_url, "https://crm.example.com/v2");
        assert_eq!(config.crm_key(), Some("secret"));
        assert_eq!(config.cache_ttl(), Duration::from_secs(60));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn empty_crm_key_counts_as_absent() {
        let config = Config {
            crm_api_key: Some(String::new()),
            ..Config::default()
        };
        assert_eq!(config.crm_key(), None);
    }

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.listen_addr(), "0.0.0.0:3001");
        assert_eq!(config.cache_ttl(), Duration::from_secs(300));
    }

    #[test]
    fn relative_url_is_rejected() {
        let config = Config {
            crm_base_url: "crm.local".to_owned(),
            ..Config::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidUrl { name: "CRM_BASE_URL", .. })
        ));
    }

    #[test]
    fn non_http_scheme_is_rejected() {
        let config = Config {
            places_base_url: "ftp://places.example.com".to_owned(),
            ..Config::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::UnsupportedScheme { .. })
        ));
    }
}

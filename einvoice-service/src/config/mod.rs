use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;
use std::time::Duration;

const DEFAULT_ATTEMPT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, Deserialize)]
pub struct EInvoiceConfig {
    #[serde(flatten)]
    pub common: core_config::Config,
    /// `None` runs against in-memory stores (development only).
    pub mongodb: Option<MongoConfig>,
    pub providers: ProvidersConfig,
    pub seller: SellerConfig,
    pub notification: NotificationConfig,
    pub otlp_endpoint: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MongoConfig {
    pub uri: String,
    pub database: String,
}

/// Endpoints and credentials of the three e-invoicing providers, in
/// priority order.
#[derive(Debug, Clone, Deserialize)]
pub struct ProvidersConfig {
    pub verifacti: ProviderEndpoint,
    pub facturae: ProviderEndpoint,
    pub aeat: ProviderEndpoint,
    pub attempt_timeout_secs: u64,
}

impl ProvidersConfig {
    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.attempt_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderEndpoint {
    pub api_url: String,
    pub api_key: Option<Secret<String>>,
}

impl ProviderEndpoint {
    pub fn new(api_url: impl Into<String>, api_key: Option<&str>) -> Self {
        Self {
            api_url: api_url.into(),
            api_key: api_key.map(|k| Secret::new(k.to_string())),
        }
    }

    /// The API key, unless missing or blank. A provider without one is
    /// left out of the chain.
    pub fn credential(&self) -> Option<&Secret<String>> {
        self.api_key
            .as_ref()
            .filter(|key| !key.expose_secret().trim().is_empty())
    }
}

/// Fixed identity of the issuing business, embedded in every Facturae file.
#[derive(Debug, Clone, Deserialize)]
pub struct SellerConfig {
    pub name: String,
    pub nif: String,
    pub street: String,
    pub town: String,
    pub province: String,
    pub postcode: String,
    pub country_code: String,
}

impl Default for SellerConfig {
    fn default() -> Self {
        Self {
            name: "Granada Inn".to_string(),
            nif: "B12345678".to_string(),
            street: "Carretera A-92, km 45".to_string(),
            town: "Granada".to_string(),
            province: "Granada".to_string(),
            postcode: "18015".to_string(),
            country_code: "ESP".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotificationConfig {
    /// When unset, invoice confirmations are only logged.
    pub endpoint: Option<String>,
}

impl EInvoiceConfig {
    pub fn load() -> Result<Self, AppError> {
        let common_config = core_config::Config::load()?;
        let is_prod = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string()) == "prod";
        let seller_defaults = SellerConfig::default();

        let mongodb = match env::var("MONGODB_URI") {
            Ok(uri) => Some(MongoConfig {
                uri,
                database: get_env("MONGODB_DATABASE", Some("hotel"), is_prod)?,
            }),
            Err(_) if is_prod => {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "MONGODB_URI is required in production but not set"
                )))
            }
            Err(_) => None,
        };

        Ok(EInvoiceConfig {
            common: common_config,
            mongodb,
            providers: ProvidersConfig {
                verifacti: provider_endpoint(
                    "VERIFACTI_API_URL",
                    "https://api.verifacti.com/v1",
                    "VERIFACTI_API_KEY",
                ),
                facturae: provider_endpoint(
                    "FACTURAE_API_URL",
                    "https://api.facturae.com/v1",
                    "FACTURAE_API_KEY",
                ),
                aeat: provider_endpoint(
                    "AEAT_API_URL",
                    "https://www.agenciatributaria.es/ws/facturae",
                    "AEAT_API_KEY",
                ),
                attempt_timeout_secs: parse_attempt_timeout(
                    env::var("EINVOICE_ATTEMPT_TIMEOUT_SECS").ok().as_deref(),
                )?,
            },
            seller: SellerConfig {
                name: get_env("SELLER_NAME", Some(&seller_defaults.name), is_prod)?,
                nif: get_env("SELLER_NIF", Some(&seller_defaults.nif), is_prod)?,
                street: env_or("SELLER_STREET", &seller_defaults.street),
                town: env_or("SELLER_TOWN", &seller_defaults.town),
                province: env_or("SELLER_PROVINCE", &seller_defaults.province),
                postcode: env_or("SELLER_POSTCODE", &seller_defaults.postcode),
                country_code: env_or("SELLER_COUNTRY_CODE", &seller_defaults.country_code),
            },
            notification: NotificationConfig {
                endpoint: env::var("NOTIFICATION_ENDPOINT")
                    .ok()
                    .filter(|v| !v.is_empty()),
            },
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok().filter(|v| !v.is_empty()),
        })
    }
}

fn provider_endpoint(url_key: &str, default_url: &str, api_key_key: &str) -> ProviderEndpoint {
    ProviderEndpoint {
        api_url: env_or(url_key, default_url),
        api_key: env::var(api_key_key).ok().map(Secret::new),
    }
}

/// Seconds allowed per provider attempt. Must be a positive integer; zero
/// would fail every attempt before it starts.
fn parse_attempt_timeout(raw: Option<&str>) -> Result<u64, AppError> {
    let Some(raw) = raw.map(str::trim).filter(|v| !v.is_empty()) else {
        return Ok(DEFAULT_ATTEMPT_TIMEOUT_SECS);
    };
    match raw.parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(secs),
        _ => Err(AppError::ConfigError(anyhow::anyhow!(
            "EINVOICE_ATTEMPT_TIMEOUT_SECS must be a positive number of seconds, got '{}'",
            raw
        ))),
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required in production but not set",
                    key
                )))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required but not set",
                    key
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_api_key_counts_as_missing() {
        assert!(ProviderEndpoint::new("https://x", None).credential().is_none());
        assert!(ProviderEndpoint::new("https://x", Some("  ")).credential().is_none());
        assert!(ProviderEndpoint::new("https://x", Some("key")).credential().is_some());
    }

    #[test]
    fn attempt_timeout_defaults_when_unset() {
        assert_eq!(
            parse_attempt_timeout(None).unwrap(),
            DEFAULT_ATTEMPT_TIMEOUT_SECS
        );
        assert_eq!(
            parse_attempt_timeout(Some(" ")).unwrap(),
            DEFAULT_ATTEMPT_TIMEOUT_SECS
        );
        assert_eq!(parse_attempt_timeout(Some("12")).unwrap(), 12);
    }

    #[test]
    fn zero_or_garbage_attempt_timeout_is_rejected() {
        for raw in ["0", "thirty", "-5", "1.5"] {
            assert!(
                matches!(
                    parse_attempt_timeout(Some(raw)),
                    Err(AppError::ConfigError(_))
                ),
                "accepted {}",
                raw
            );
        }
    }
}

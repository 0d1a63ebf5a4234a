use log::{info, warn};
use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_PAYMENT_GATEWAY_URL: &str = "https://payments.internal.example/v1";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

/// Service configuration, read once from the environment at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// `/Prod` behind API Gateway, empty when `REMOVE_BASE_PATH=true`.
    pub route_prefix: String,
    /// `None` disables SNS publishing (local runs and tests).
    pub sns_topic_arn: Option<String>,
    pub payment_gateway_url: String,
    pub payment_gateway_api_key: Option<String>,
    pub payment_timeout: Duration,
    /// Attempts per registration write before giving up on version conflicts.
    pub registration_max_attempts: u32,
    pub port: u16,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let remove_base_path = flag("REMOVE_BASE_PATH");
        let route_prefix = if remove_base_path { "" } else { "/Prod" }.to_string();

        let sns_topic_arn = if flag("TEST_SNS") {
            info!("TEST_SNS is set, SNS publishing disabled");
            None
        } else {
            let arn = env::var("SNS_TOPIC_ARN").ok().filter(|s| !s.is_empty());
            if arn.is_none() {
                warn!("SNS_TOPIC_ARN not set, registration events will not be published");
            }
            arn
        };

        let payment_gateway_url = env::var("PAYMENT_GATEWAY_URL").unwrap_or_else(|_| {
            warn!(
                "PAYMENT_GATEWAY_URL not set, using default: {}",
                DEFAULT_PAYMENT_GATEWAY_URL
            );
            DEFAULT_PAYMENT_GATEWAY_URL.to_string()
        });

        Ok(Config {
            route_prefix,
            sns_topic_arn,
            payment_gateway_url,
            payment_gateway_api_key: env::var("PAYMENT_GATEWAY_API_KEY").ok(),
            payment_timeout: Duration::from_secs(parse_or("PAYMENT_TIMEOUT_SECS", 15)?),
            registration_max_attempts: parse_or("REGISTRATION_MAX_ATTEMPTS", 5)?,
            port: parse_or("PORT", 3000)?,
        })
    }

    /// Local configuration with no external side effects.
    #[cfg(test)]
    pub fn local() -> Self {
        Config {
            route_prefix: String::new(),
            sns_topic_arn: None,
            payment_gateway_url: DEFAULT_PAYMENT_GATEWAY_URL.to_string(),
            payment_gateway_api_key: None,
            payment_timeout: Duration::from_secs(15),
            registration_max_attempts: 5,
            port: 3000,
        }
    }
}

fn flag(key: &str) -> bool {
    env::var(key)
        .map(|v| v.to_lowercase() == "true")
        .unwrap_or(false)
}

fn parse_or<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(value) => value
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
        Err(_) => Ok(default),
    }
}

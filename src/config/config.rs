use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use url::Url;

use crate::challenges::core::DEFAULT_STEP_DELAY;
use crate::external_deps::captcha::AwsWafCaptchaConfig;

pub const API_URL_VAR: &str = "API_URL";
pub const WAF_API_KEY_VAR: &str = "WAF_API_KEY";
pub const WAF_SCRIPT_URL_VAR: &str = "WAF_CAPTCHA_SCRIPT_URL";
pub const STEP_DELAY_VAR: &str = "STEP_DELAY_MS";
pub const SUPPRESSED_LIMIT_VAR: &str = "SUPPRESSED_CHALLENGE_LIMIT";

const DEFAULT_SUPPRESSED_LIMIT: u32 = 3;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),
    #[error("{var} is not a valid url: {source}")]
    InvalidUrl {
        var: &'static str,
        #[source]
        source: url::ParseError,
    },
    #[error("{var} must be a non-negative integer, got '{value}'")]
    InvalidNumber { var: &'static str, value: String },
    #[error("invalid json configuration: {0}")]
    Json(#[from] serde_json::Error),
}

/// Everything the runner needs from its environment.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SequenceConfig {
    /// Base API url; every step is a GET against it.
    pub api_url: Url,
    pub captcha: AwsWafCaptchaConfig,
    #[serde(default = "default_step_delay_ms")]
    pub step_delay_ms: u64,
    #[serde(default = "default_suppressed_limit")]
    pub suppressed_challenge_limit: u32,
}

fn default_step_delay_ms() -> u64 {
    DEFAULT_STEP_DELAY.as_millis() as u64
}

fn default_suppressed_limit() -> u32 {
    DEFAULT_SUPPRESSED_LIMIT
}

impl SequenceConfig {
    pub fn new(api_url: Url, captcha: AwsWafCaptchaConfig) -> Self {
        Self {
            api_url,
            captcha,
            step_delay_ms: default_step_delay_ms(),
            suppressed_challenge_limit: DEFAULT_SUPPRESSED_LIMIT,
        }
    }

    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load through an arbitrary variable lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let api_url = read(API_URL_VAR).ok_or(ConfigError::Missing(API_URL_VAR))?;
        let api_url = parse_url(API_URL_VAR, &api_url)?;
        let api_key = read(WAF_API_KEY_VAR).ok_or(ConfigError::Missing(WAF_API_KEY_VAR))?;

        let mut captcha = AwsWafCaptchaConfig::new(api_key);
        if let Some(script_url) = read(WAF_SCRIPT_URL_VAR) {
            captcha = captcha.with_script_url(parse_url(WAF_SCRIPT_URL_VAR, &script_url)?);
        }

        let mut config = SequenceConfig::new(api_url, captcha);
        if let Some(delay) = read(STEP_DELAY_VAR) {
            config.step_delay_ms = parse_number(STEP_DELAY_VAR, &delay)?;
        }
        if let Some(limit) = read(SUPPRESSED_LIMIT_VAR) {
            config.suppressed_challenge_limit = parse_number(SUPPRESSED_LIMIT_VAR, &limit)?;
        }

        Ok(config)
    }

    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn step_delay(&self) -> Duration {
        Duration::from_millis(self.step_delay_ms)
    }
}

fn parse_url(var: &'static str, raw: &str) -> Result<Url, ConfigError> {
    Url::parse(raw).map_err(|source| ConfigError::InvalidUrl { var, source })
}

fn parse_number<T: std::str::FromStr>(var: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.parse().map_err(|_| ConfigError::InvalidNumber {
        var,
        value: raw.to_string(),
    })
}

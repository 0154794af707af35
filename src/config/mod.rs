//! Settings and configuration module
//!
//! Provides the runner configuration with:
//! - Environment loading
//! - JSON loading
//! - Defaults for pacing and challenge suppression

pub mod config;

pub use config::{
    API_URL_VAR, ConfigError, STEP_DELAY_VAR, SUPPRESSED_LIMIT_VAR, SequenceConfig,
    WAF_API_KEY_VAR, WAF_SCRIPT_URL_VAR,
};

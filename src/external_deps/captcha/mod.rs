//! Human-verification widget integrations.
//!
//! The runner never talks to a widget directly. It hands a leased mount to a
//! [`ChallengeProvider`] and awaits a single resolution: a verification token,
//! or an error telling whether a fresh widget is worth showing.

mod channel;

pub use channel::{ChallengePrompt, ChannelChallengeProvider};

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use url::Url;

use crate::challenges::core::VerificationToken;
use crate::challenges::session::MountLease;

pub const CHALLENGE_VALIDATION_FAILED_MESSAGE: &str =
    "Captcha validation failed. Please try again.";
pub const CHALLENGE_SERVICE_UNAVAILABLE_MESSAGE: &str =
    "Error loading captcha service. Please refresh the page.";
pub const CHALLENGE_RENDER_FAILED_MESSAGE: &str =
    "Failed to render captcha. Please refresh the page.";
pub const CHALLENGE_INIT_FAILED_MESSAGE: &str = "Error initializing captcha";

/// Settings handed to the AWS WAF captcha widget.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AwsWafCaptchaConfig {
    pub api_key: String,
    #[serde(default)]
    pub script_url: Option<Url>,
}

impl AwsWafCaptchaConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            script_url: None,
        }
    }

    pub fn with_script_url(mut self, script_url: Url) -> Self {
        self.script_url = Some(script_url);
        self
    }
}

/// Common result type returned by challenge providers.
pub type ChallengeResult = Result<VerificationToken, ChallengeError>;

/// Contract of a human-verification widget.
///
/// `render` resolves exactly once per call. The lease guarantees nothing else
/// renders into the mount while the call is pending.
#[async_trait]
pub trait ChallengeProvider: Send + Sync {
    fn name(&self) -> &'static str;
    async fn render(&self, mount: &MountLease) -> ChallengeResult;
}

/// Errors surfaced by challenge providers.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChallengeError {
    /// The widget itself reported a failed attempt; a fresh widget may succeed.
    #[error("captcha attempt failed: {0}")]
    Rejected(String),
    /// The widget could not be loaded at all.
    #[error("captcha service unavailable: {0}")]
    Unavailable(String),
    #[error("captcha render failed: {0}")]
    RenderFailed(String),
    #[error("challenge mount '{0}' is already owned by a live session")]
    MountBusy(String),
}

impl ChallengeError {
    /// Whether refreshing the widget is the right reaction.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ChallengeError::Rejected(_))
    }

    /// Text surfaced in the error banner.
    pub fn user_message(&self) -> &'static str {
        match self {
            ChallengeError::Rejected(_) => CHALLENGE_VALIDATION_FAILED_MESSAGE,
            ChallengeError::Unavailable(_) => CHALLENGE_SERVICE_UNAVAILABLE_MESSAGE,
            ChallengeError::RenderFailed(_) => CHALLENGE_RENDER_FAILED_MESSAGE,
            ChallengeError::MountBusy(_) => CHALLENGE_INIT_FAILED_MESSAGE,
        }
    }
}

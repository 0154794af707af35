use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use url::Url;

use super::{AwsWafCaptchaConfig, ChallengeError, ChallengeProvider, ChallengeResult};
use crate::challenges::core::VerificationToken;
use crate::challenges::session::MountLease;

/// Request for the host UI to show the AWS WAF captcha in `mount_key`.
///
/// Consuming methods guarantee the widget resolves at most once.
#[derive(Debug)]
pub struct ChallengePrompt {
    pub mount_key: String,
    pub api_key: String,
    pub script_url: Option<Url>,
    reply: oneshot::Sender<ChallengeResult>,
}

impl ChallengePrompt {
    /// Deliver the token produced by the widget. Returns `false` when the
    /// runner stopped waiting (run torn down).
    pub fn resolve(self, token: impl Into<String>) -> bool {
        self.reply.send(Ok(VerificationToken::new(token))).is_ok()
    }

    /// Report a failed widget attempt; the runner shows a fresh widget.
    pub fn reject(self, reason: impl Into<String>) -> bool {
        self.reply
            .send(Err(ChallengeError::Rejected(reason.into())))
            .is_ok()
    }

    /// Report that the widget could not be shown at all.
    pub fn fail(self, error: ChallengeError) -> bool {
        self.reply.send(Err(error)).is_ok()
    }

    /// Whether the runner is still waiting on this prompt.
    pub fn is_pending(&self) -> bool {
        !self.reply.is_closed()
    }
}

/// AWS WAF captcha provider that delegates the widget to a host UI through a
/// channel of [`ChallengePrompt`]s.
#[derive(Debug, Clone)]
pub struct ChannelChallengeProvider {
    config: AwsWafCaptchaConfig,
    prompts: mpsc::Sender<ChallengePrompt>,
}

impl ChannelChallengeProvider {
    pub fn new(config: AwsWafCaptchaConfig, buffer: usize) -> (Self, mpsc::Receiver<ChallengePrompt>) {
        let (prompts, receiver) = mpsc::channel(buffer.max(1));
        (Self { config, prompts }, receiver)
    }
}

#[async_trait]
impl ChallengeProvider for ChannelChallengeProvider {
    fn name(&self) -> &'static str {
        "aws-waf-captcha"
    }

    async fn render(&self, mount: &MountLease) -> ChallengeResult {
        let (reply, resolution) = oneshot::channel();
        let prompt = ChallengePrompt {
            mount_key: mount.key().to_string(),
            api_key: self.config.api_key.clone(),
            script_url: self.config.script_url.clone(),
            reply,
        };

        self.prompts
            .send(prompt)
            .await
            .map_err(|_| ChallengeError::Unavailable("challenge host disconnected".into()))?;
        mount.attach(format!("{}:{}", self.name(), mount.key()));

        resolution.await.map_err(|_| {
            ChallengeError::RenderFailed("challenge prompt dropped without a result".into())
        })?
    }
}

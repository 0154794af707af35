//! # waf-sequence-rs
//!
//! A challenge-gated sequential request runner for endpoints protected by an
//! AWS WAF captcha.
//!
//! Given a target count N, the runner performs N dependent GET requests one at
//! a time with a fixed pause between them. Whenever the backend demands a
//! human verification the run suspends, a captcha widget is shown through a
//! [`ChallengeProvider`], and the run resumes at the interrupted step with the
//! issued token attached.
//!
//! ## Features
//!
//! - Strictly serialized steps with a fixed, cancellable inter-step delay
//! - Pause/resume around a single live challenge session
//! - Token reuse until the backend rejects it
//! - Cancellation of in-flight runs on restart or teardown
//! - Event hooks, logging, and metrics
//!
//! ## Example
//!
//! ```no_run
//! use waf_sequence_rs::{SequenceConfig, SequenceRunner};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = SequenceConfig::from_env()?;
//!     let (mut runner, mut prompts) = SequenceRunner::from_config(&config)?;
//!
//!     tokio::spawn(async move {
//!         while let Some(prompt) = prompts.recv().await {
//!             // Show the widget in `prompt.mount_key`, then hand back its token.
//!             prompt.resolve("token-from-widget");
//!         }
//!     });
//!
//!     runner.start_from_input("10").await?;
//!     if let Some(report) = runner.wait().await? {
//!         println!("{}", report.state.log().join("\n"));
//!     }
//!     Ok(())
//! }
//! ```

mod sequence;

pub mod challenges;
pub mod config;
pub mod external_deps;
pub mod modules;

pub use crate::sequence::{
    RunReport,
    RunSnapshot,
    RunnerConfig,
    SequenceError,
    SequenceResult,
    SequenceRunner,
    SequenceRunnerBuilder,
};

pub use crate::challenges::core::{
    FailureCode,
    ReqwestStepClient,
    StepClient,
    StepClientError,
    StepHttpResponse,
    StepOutcome,
    StepPacing,
    VerificationToken,
    build_step_headers,
    classify_response,
    classify_transport_error,
};

pub use crate::challenges::session::{ChallengeSession, MountLease, MountPoint};

pub use crate::challenges::state::{
    RunPhase,
    RunState,
    TargetCount,
    Transition,
    ValidationError,
    abort_run,
    apply_cancellation,
    apply_challenge_result,
    apply_step_outcome,
    begin_run,
};

pub use crate::config::{ConfigError, SequenceConfig};

pub use crate::external_deps::captcha::{
    AwsWafCaptchaConfig,
    ChallengeError,
    ChallengePrompt,
    ChallengeProvider,
    ChallengeResult,
    ChannelChallengeProvider,
};

pub use crate::modules::{
    ChallengeEvent,
    DisplayState,
    EventDispatcher,
    EventHandler,
    LoggingHandler,
    MetricsCollector,
    MetricsHandler,
    MetricsSnapshot,
    RunEvent,
    RunnerEvent,
    StepEvent,
    parse_target,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

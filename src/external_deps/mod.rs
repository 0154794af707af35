//! Integrations that rely on third-party services.
//!
//! Groups the adapters that bridge the runner with the human-verification
//! widget living outside of the process.

pub mod captcha;

pub use captcha::{ChallengeProvider, ChannelChallengeProvider};

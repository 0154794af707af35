//! Run state and the transition functions of the sequence state machine.
//!
//! Every mutation of a run goes through [`begin_run`], [`apply_step_outcome`]
//! or [`apply_challenge_result`]. They are synchronous and side-effect free
//! apart from the `&mut RunState` they receive; the async driver in
//! `sequence.rs` turns the returned [`Transition`] into I/O.

use thiserror::Error;

use crate::challenges::core::{StepOutcome, VerificationToken};
use crate::external_deps::captcha::{CHALLENGE_VALIDATION_FAILED_MESSAGE, ChallengeError};

pub const MIN_TARGET: u32 = 1;
pub const MAX_TARGET: u32 = 1000;

pub const TARGET_RANGE_MESSAGE: &str = "Please enter a number between 1 and 1000";

/// Start-command input that never reaches the runner.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{}", TARGET_RANGE_MESSAGE)]
    NotANumber(String),
    #[error("{}", TARGET_RANGE_MESSAGE)]
    OutOfRange(i64),
}

/// Number of steps requested by the operator, always within `[1, 1000]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct TargetCount(u32);

impl TargetCount {
    pub fn new(value: i64) -> Result<Self, ValidationError> {
        if (i64::from(MIN_TARGET)..=i64::from(MAX_TARGET)).contains(&value) {
            Ok(Self(value as u32))
        } else {
            Err(ValidationError::OutOfRange(value))
        }
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

impl std::str::FromStr for TargetCount {
    type Err = ValidationError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let trimmed = input.trim();
        let value: i64 = trimmed
            .parse()
            .map_err(|_| ValidationError::NotANumber(trimmed.to_string()))?;
        TargetCount::new(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Idle,
    Running,
    AwaitingChallenge,
    Completed,
    Failed,
}

impl RunPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunPhase::Completed | RunPhase::Failed)
    }
}

/// Everything known about the current run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunState {
    phase: RunPhase,
    progress: u32,
    target: u32,
    token: Option<VerificationToken>,
    awaiting_challenge: bool,
    last_error: Option<String>,
    log: Vec<String>,
    suppressed_prompts: u32,
}

impl RunState {
    pub fn idle() -> Self {
        Self {
            phase: RunPhase::Idle,
            progress: 0,
            target: 0,
            token: None,
            awaiting_challenge: false,
            last_error: None,
            log: Vec::new(),
            suppressed_prompts: 0,
        }
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    pub fn progress(&self) -> u32 {
        self.progress
    }

    pub fn target(&self) -> u32 {
        self.target
    }

    pub fn token(&self) -> Option<&VerificationToken> {
        self.token.as_ref()
    }

    /// A token is held: the backend has accepted a verification in this run.
    pub fn is_verified(&self) -> bool {
        self.token.is_some()
    }

    pub fn is_awaiting_challenge(&self) -> bool {
        self.awaiting_challenge
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Sequence log, one `"{n}. Forbidden"` entry per completed step.
    pub fn log(&self) -> &[String] {
        &self.log
    }

    pub fn is_complete(&self) -> bool {
        self.target > 0 && self.progress >= self.target
    }

    fn suspend(&mut self) {
        self.phase = RunPhase::AwaitingChallenge;
        self.awaiting_challenge = true;
        self.suppressed_prompts = 0;
    }

    fn fail(&mut self, message: String) {
        self.phase = RunPhase::Failed;
        self.awaiting_challenge = false;
        self.last_error = Some(message);
    }
}

impl Default for RunState {
    fn default() -> Self {
        Self::idle()
    }
}

/// Instruction for the async driver after a state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Wait the pacing delay, then run the step at the current progress.
    StepAfterDelay,
    /// Run the step at the current progress right away.
    StepNow,
    /// Open a fresh challenge session and wait on it.
    OpenChallenge,
    Complete,
    Fail,
    /// The input did not apply to the current phase; nothing changed.
    Ignore,
}

/// Fresh state for a new run. Replaces whatever the previous run left behind.
pub fn begin_run(target: TargetCount) -> RunState {
    RunState {
        phase: RunPhase::Running,
        target: target.get(),
        ..RunState::idle()
    }
}

/// Apply the outcome of the step at `state.progress()`.
///
/// `suppressed_limit` bounds how many consecutive challenge demands are
/// re-attempted with the held token before it is treated as rejected.
pub fn apply_step_outcome(
    state: &mut RunState,
    outcome: StepOutcome,
    suppressed_limit: u32,
) -> Transition {
    if state.phase != RunPhase::Running {
        return Transition::Ignore;
    }

    match outcome {
        StepOutcome::Success => {
            state.progress += 1;
            state.suppressed_prompts = 0;
            state.log.push(format!("{}. Forbidden", state.progress));
            if state.progress >= state.target {
                state.phase = RunPhase::Completed;
                Transition::Complete
            } else {
                Transition::StepAfterDelay
            }
        }
        StepOutcome::ChallengeRequired if state.is_verified() => {
            state.suppressed_prompts += 1;
            if state.suppressed_prompts > suppressed_limit {
                state.token = None;
                state.last_error = Some(CHALLENGE_VALIDATION_FAILED_MESSAGE.to_string());
                state.suspend();
                Transition::OpenChallenge
            } else {
                Transition::StepAfterDelay
            }
        }
        StepOutcome::ChallengeRequired => {
            state.suspend();
            Transition::OpenChallenge
        }
        StepOutcome::ChallengeRejected { reason } => {
            state.token = None;
            state.last_error = Some(reason);
            state.suspend();
            Transition::OpenChallenge
        }
        StepOutcome::Fatal { message, code } => {
            state.fail(format!("{message} (Status: {code})"));
            Transition::Fail
        }
    }
}

/// Settle a run that was torn down before reaching a terminal phase.
///
/// The run drops back to `Idle` with its log and progress kept; any pending
/// challenge and held token go with it. Terminal and idle states are left as
/// they are.
pub fn apply_cancellation(state: &mut RunState) {
    if state.phase.is_terminal() || state.phase == RunPhase::Idle {
        return;
    }
    state.phase = RunPhase::Idle;
    state.awaiting_challenge = false;
    state.token = None;
    state.suppressed_prompts = 0;
}

/// End a run whose driver lost track of it. Terminal states are kept.
pub fn abort_run(state: &mut RunState, message: &str) {
    if !state.phase.is_terminal() {
        state.fail(message.to_string());
    }
}

/// Apply the resolution of the live challenge session.
pub fn apply_challenge_result(
    state: &mut RunState,
    result: Result<VerificationToken, ChallengeError>,
) -> Transition {
    if state.phase != RunPhase::AwaitingChallenge {
        return Transition::Ignore;
    }

    match result {
        Ok(token) if token.is_blank() => {
            state.last_error = Some(CHALLENGE_VALIDATION_FAILED_MESSAGE.to_string());
            Transition::OpenChallenge
        }
        Ok(token) => {
            state.token = Some(token);
            state.awaiting_challenge = false;
            state.last_error = None;
            state.phase = RunPhase::Running;
            Transition::StepNow
        }
        Err(err) if err.is_retryable() => {
            state.last_error = Some(err.user_message().to_string());
            Transition::OpenChallenge
        }
        Err(err) => {
            state.fail(err.user_message().to_string());
            Transition::Fail
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::challenges::core::FailureCode;
    use crate::challenges::core::executor::CHALLENGE_REJECTED_MESSAGE;

    fn target(value: i64) -> TargetCount {
        TargetCount::new(value).unwrap()
    }

    #[test]
    fn target_bounds() {
        assert!(TargetCount::new(1).is_ok());
        assert!(TargetCount::new(1000).is_ok());
        assert_eq!(
            TargetCount::new(0),
            Err(ValidationError::OutOfRange(0))
        );
        assert_eq!(
            TargetCount::new(1001),
            Err(ValidationError::OutOfRange(1001))
        );
        assert!("-5".parse::<TargetCount>().is_err());
        assert!("abc".parse::<TargetCount>().is_err());
        assert_eq!(" 42 ".parse::<TargetCount>().unwrap().get(), 42);
    }

    #[test]
    fn validation_message_is_user_facing() {
        let err = "abc".parse::<TargetCount>().unwrap_err();
        assert_eq!(err.to_string(), TARGET_RANGE_MESSAGE);
    }

    #[test]
    fn begin_run_resets_everything() {
        let state = begin_run(target(3));
        assert_eq!(state.phase(), RunPhase::Running);
        assert_eq!(state.progress(), 0);
        assert_eq!(state.target(), 3);
        assert!(state.token().is_none());
        assert!(state.log().is_empty());
        assert!(state.last_error().is_none());
    }

    #[test]
    fn successes_fill_the_log_until_complete() {
        let mut state = begin_run(target(3));
        assert_eq!(
            apply_step_outcome(&mut state, StepOutcome::Success, 3),
            Transition::StepAfterDelay
        );
        assert_eq!(
            apply_step_outcome(&mut state, StepOutcome::Success, 3),
            Transition::StepAfterDelay
        );
        assert_eq!(
            apply_step_outcome(&mut state, StepOutcome::Success, 3),
            Transition::Complete
        );
        assert_eq!(state.log(), ["1. Forbidden", "2. Forbidden", "3. Forbidden"]);
        assert_eq!(state.phase(), RunPhase::Completed);
        assert!(state.is_complete());
    }

    #[test]
    fn challenge_suspends_without_advancing() {
        let mut state = begin_run(target(5));
        apply_step_outcome(&mut state, StepOutcome::Success, 3);

        let transition = apply_step_outcome(&mut state, StepOutcome::ChallengeRequired, 3);
        assert_eq!(transition, Transition::OpenChallenge);
        assert_eq!(state.phase(), RunPhase::AwaitingChallenge);
        assert!(state.is_awaiting_challenge());
        assert_eq!(state.progress(), 1);
    }

    #[test]
    fn second_challenge_while_awaiting_is_ignored() {
        let mut state = begin_run(target(5));
        apply_step_outcome(&mut state, StepOutcome::ChallengeRequired, 3);
        let before = state.clone();

        assert_eq!(
            apply_step_outcome(&mut state, StepOutcome::ChallengeRequired, 3),
            Transition::Ignore
        );
        assert_eq!(state, before);
    }

    #[test]
    fn token_resumes_at_same_progress() {
        let mut state = begin_run(target(5));
        apply_step_outcome(&mut state, StepOutcome::Success, 3);
        apply_step_outcome(&mut state, StepOutcome::ChallengeRequired, 3);

        let transition =
            apply_challenge_result(&mut state, Ok(VerificationToken::new("tok123")));
        assert_eq!(transition, Transition::StepNow);
        assert_eq!(state.phase(), RunPhase::Running);
        assert_eq!(state.progress(), 1);
        assert!(!state.is_awaiting_challenge());
        assert_eq!(state.token().map(|t| t.as_str()), Some("tok123"));
    }

    #[test]
    fn rejection_discards_token_and_reopens() {
        let mut state = begin_run(target(4));
        apply_step_outcome(&mut state, StepOutcome::ChallengeRequired, 3);
        apply_challenge_result(&mut state, Ok(VerificationToken::new("tok123")));
        apply_step_outcome(&mut state, StepOutcome::Success, 3);

        let transition = apply_step_outcome(
            &mut state,
            StepOutcome::rejected(CHALLENGE_REJECTED_MESSAGE),
            3,
        );
        assert_eq!(transition, Transition::OpenChallenge);
        assert!(state.token().is_none());
        assert_eq!(state.last_error(), Some(CHALLENGE_REJECTED_MESSAGE));
        assert_eq!(state.progress(), 1);
        assert_eq!(state.phase(), RunPhase::AwaitingChallenge);
    }

    #[test]
    fn verified_run_suppresses_challenge_prompts() {
        let mut state = begin_run(target(2));
        apply_step_outcome(&mut state, StepOutcome::ChallengeRequired, 1);
        apply_challenge_result(&mut state, Ok(VerificationToken::new("tok123")));

        assert_eq!(
            apply_step_outcome(&mut state, StepOutcome::ChallengeRequired, 1),
            Transition::StepAfterDelay
        );
        assert_eq!(state.phase(), RunPhase::Running);
        assert!(state.is_verified());

        assert_eq!(
            apply_step_outcome(&mut state, StepOutcome::ChallengeRequired, 1),
            Transition::OpenChallenge
        );
        assert!(!state.is_verified());
        assert_eq!(state.phase(), RunPhase::AwaitingChallenge);
    }

    #[test]
    fn fatal_keeps_progress_and_reports_code() {
        let mut state = begin_run(target(3));
        apply_step_outcome(&mut state, StepOutcome::Success, 3);

        let transition = apply_step_outcome(
            &mut state,
            StepOutcome::fatal("Request failed with status code 500", FailureCode::Status(500)),
            3,
        );
        assert_eq!(transition, Transition::Fail);
        assert_eq!(state.phase(), RunPhase::Failed);
        assert_eq!(state.progress(), 1);
        assert_eq!(state.log(), ["1. Forbidden"]);
        assert_eq!(
            state.last_error(),
            Some("Request failed with status code 500 (Status: 500)")
        );
    }

    #[test]
    fn widget_error_stays_suspended() {
        let mut state = begin_run(target(2));
        apply_step_outcome(&mut state, StepOutcome::ChallengeRequired, 3);

        let transition =
            apply_challenge_result(&mut state, Err(ChallengeError::Rejected("expired".into())));
        assert_eq!(transition, Transition::OpenChallenge);
        assert_eq!(state.phase(), RunPhase::AwaitingChallenge);
        assert_eq!(state.last_error(), Some(CHALLENGE_VALIDATION_FAILED_MESSAGE));
    }

    #[test]
    fn unavailable_provider_fails_the_run() {
        let mut state = begin_run(target(2));
        apply_step_outcome(&mut state, StepOutcome::ChallengeRequired, 3);

        let transition = apply_challenge_result(
            &mut state,
            Err(ChallengeError::Unavailable("script missing".into())),
        );
        assert_eq!(transition, Transition::Fail);
        assert_eq!(state.phase(), RunPhase::Failed);
        assert!(!state.is_awaiting_challenge());
    }

    #[test]
    fn challenge_result_outside_suspension_is_ignored() {
        let mut state = begin_run(target(2));
        assert_eq!(
            apply_challenge_result(&mut state, Ok(VerificationToken::new("late"))),
            Transition::Ignore
        );
        assert!(state.token().is_none());
    }

    #[test]
    fn cancellation_drops_back_to_idle_keeping_progress() {
        let mut state = begin_run(target(3));
        apply_step_outcome(&mut state, StepOutcome::Success, 3);
        apply_step_outcome(&mut state, StepOutcome::ChallengeRequired, 3);

        apply_cancellation(&mut state);
        assert_eq!(state.phase(), RunPhase::Idle);
        assert!(!state.is_awaiting_challenge());
        assert!(state.token().is_none());
        assert_eq!(state.progress(), 1);
        assert_eq!(state.log(), ["1. Forbidden"]);

        let mut failed = begin_run(target(1));
        apply_step_outcome(
            &mut failed,
            StepOutcome::fatal("boom", FailureCode::Unknown),
            3,
        );
        let before = failed.clone();
        apply_cancellation(&mut failed);
        assert_eq!(failed, before);
    }

    #[test]
    fn abort_fails_a_live_run_only() {
        let mut state = begin_run(target(2));
        apply_step_outcome(&mut state, StepOutcome::Success, 3);
        abort_run(&mut state, "lost");
        assert_eq!(state.phase(), RunPhase::Failed);
        assert_eq!(state.last_error(), Some("lost"));
        assert_eq!(state.progress(), 1);

        apply_step_outcome(&mut state, StepOutcome::Success, 3);
        abort_run(&mut state, "again");
        assert_eq!(state.last_error(), Some("lost"));
    }
}

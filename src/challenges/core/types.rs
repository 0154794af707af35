//! Core data structures shared by the step client and the sequence runner.

use std::fmt;

/// Opaque credential issued by the challenge provider once a human passed the
/// captcha. Attached to every step until the backend rejects it.
#[derive(Clone, PartialEq, Eq)]
pub struct VerificationToken(String);

impl VerificationToken {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Raw value exactly as handed over by the provider.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Value sent on the wire (surrounding whitespace stripped).
    pub fn header_value(&self) -> &str {
        self.0.trim()
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

// Tokens end up in logs through `Debug`; only the length is printed.
impl fmt::Debug for VerificationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VerificationToken(len={})", self.0.len())
    }
}

/// Status attached to a fatal step failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureCode {
    Status(u16),
    Unknown,
}

impl From<Option<u16>> for FailureCode {
    fn from(status: Option<u16>) -> Self {
        status.map(FailureCode::Status).unwrap_or(FailureCode::Unknown)
    }
}

impl fmt::Display for FailureCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureCode::Status(status) => write!(f, "{status}"),
            FailureCode::Unknown => f.write_str("unknown"),
        }
    }
}

/// Classified result of a single step attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// The backend accepted the step.
    Success,
    /// The backend wants a human verification before accepting more steps.
    ChallengeRequired,
    /// The backend refused the verification token that was attached.
    ChallengeRejected { reason: String },
    /// Anything else: transport failures and unexpected statuses.
    Fatal { message: String, code: FailureCode },
}

impl StepOutcome {
    pub fn fatal(message: impl Into<String>, code: FailureCode) -> Self {
        StepOutcome::Fatal {
            message: message.into(),
            code,
        }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        StepOutcome::ChallengeRejected {
            reason: reason.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, StepOutcome::Success)
    }

    /// Short label used in logs.
    pub fn label(&self) -> &'static str {
        match self {
            StepOutcome::Success => "success",
            StepOutcome::ChallengeRequired => "challenge_required",
            StepOutcome::ChallengeRejected { .. } => "challenge_rejected",
            StepOutcome::Fatal { .. } => "fatal",
        }
    }
}

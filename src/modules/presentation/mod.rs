//! View-facing helpers.
//!
//! Parses the operator's start command and projects a [`RunState`] into the
//! text a front end displays. Nothing here mutates run state.

use crate::challenges::state::{RunPhase, RunState, TargetCount, ValidationError};

pub const COMPLETED_MESSAGE: &str = "Sequence completed!";

/// Parse the raw target typed by the operator.
pub fn parse_target(input: &str) -> Result<TargetCount, ValidationError> {
    input.parse()
}

/// What the front end should show for a given run state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayState {
    /// Sequence log joined with newlines.
    pub sequence: String,
    /// Progress line; `None` before the first run.
    pub progress: Option<String>,
    pub error_banner: Option<String>,
    /// The start form is shown whenever no run is in flight.
    pub form_visible: bool,
    /// The challenge container is expected to hold a widget.
    pub challenge_visible: bool,
}

impl DisplayState {
    pub fn from_state(state: &RunState) -> Self {
        let progress = (state.target() > 0).then(|| progress_line(state));
        Self {
            sequence: state.log().join("\n"),
            progress,
            error_banner: state.last_error().map(str::to_string),
            form_visible: matches!(
                state.phase(),
                RunPhase::Idle | RunPhase::Completed | RunPhase::Failed
            ),
            challenge_visible: state.is_awaiting_challenge(),
        }
    }

    /// Same as [`DisplayState::from_state`] after a rejected start command:
    /// the run is untouched, only the banner changes.
    pub fn with_validation_error(state: &RunState, error: &ValidationError) -> Self {
        let mut display = Self::from_state(state);
        display.error_banner = Some(error.to_string());
        display
    }
}

fn progress_line(state: &RunState) -> String {
    if state.is_complete() {
        COMPLETED_MESSAGE.to_string()
    } else {
        format!("Progress: {}/{}", state.progress(), state.target())
    }
}

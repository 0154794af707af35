//! Fixed pacing between consecutive steps.

use std::time::Duration;

use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

/// Delay inserted after every successful step that is not the last one.
pub const DEFAULT_STEP_DELAY: Duration = Duration::from_millis(1000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepPacing {
    delay: Duration,
}

impl StepPacing {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Sleep for the configured delay. Returns `false` when `cancel` fired
    /// first; the caller must then drop whatever it was about to do.
    pub async fn pause(&self, cancel: &CancellationToken) -> bool {
        if self.delay.is_zero() {
            return !cancel.is_cancelled();
        }

        tokio::select! {
            _ = cancel.cancelled() => false,
            _ = sleep(self.delay) => true,
        }
    }
}

impl Default for StepPacing {
    fn default() -> Self {
        Self::new(DEFAULT_STEP_DELAY)
    }
}

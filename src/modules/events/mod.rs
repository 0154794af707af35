//! Event system for the sequence runner.
//!
//! Provides hooks for metrics, logging, and custom reactions around run
//! activity.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;

use super::metrics::MetricsCollector;

/// Run-level event (start and terminal transitions).
#[derive(Debug, Clone)]
pub struct RunEvent {
    pub run_id: u64,
    pub progress: u32,
    pub target: u32,
    pub message: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Structured event emitted once per step attempt that produced progress or was re-queued.
#[derive(Debug, Clone)]
pub struct StepEvent {
    pub run_id: u64,
    pub progress: u32,
    pub target: u32,
    pub latency: Duration,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ChallengeEvent {
    pub run_id: u64,
    pub session_id: u64,
    pub progress: u32,
    pub reason: Option<String>,
    pub waited: Duration,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub enum RunnerEvent {
    RunStarted(RunEvent),
    StepSucceeded(StepEvent),
    ChallengeSuppressed(StepEvent),
    ChallengeRequested(ChallengeEvent),
    ChallengeResolved(ChallengeEvent),
    ChallengeFailed(ChallengeEvent),
    RunCompleted(RunEvent),
    RunFailed(RunEvent),
    RunCancelled(RunEvent),
}

/// Trait implemented by event handlers.
pub trait EventHandler: Send + Sync {
    fn handle(&self, event: &RunnerEvent);
}

/// Dispatcher that broadcasts events to registered handlers.
#[derive(Default)]
pub struct EventDispatcher {
    handlers: Vec<Arc<dyn EventHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self { handlers: Vec::new() }
    }

    pub fn register_handler(&mut self, handler: Arc<dyn EventHandler>) {
        self.handlers.push(handler);
    }

    pub fn dispatch(&self, event: RunnerEvent) {
        for handler in &self.handlers {
            handler.handle(&event);
        }
    }
}

/// Logs events using the `log` crate.
#[derive(Debug)]
pub struct LoggingHandler;

impl EventHandler for LoggingHandler {
    fn handle(&self, event: &RunnerEvent) {
        match event {
            RunnerEvent::RunStarted(run) => {
                log::info!("run {} started (target {})", run.run_id, run.target);
            }
            RunnerEvent::StepSucceeded(step) => {
                log::debug!(
                    "run {} step {}/{} ({:.2}s)",
                    step.run_id,
                    step.progress,
                    step.target,
                    step.latency.as_secs_f64()
                );
            }
            RunnerEvent::ChallengeSuppressed(step) => {
                log::info!(
                    "run {} challenge demanded at {}/{} with a held token, retrying step",
                    step.run_id,
                    step.progress,
                    step.target
                );
            }
            RunnerEvent::ChallengeRequested(challenge) => {
                log::info!(
                    "run {} challenge session {} opened at progress {}",
                    challenge.run_id,
                    challenge.session_id,
                    challenge.progress
                );
            }
            RunnerEvent::ChallengeResolved(challenge) => {
                log::info!(
                    "run {} challenge session {} resolved after {:.2}s",
                    challenge.run_id,
                    challenge.session_id,
                    challenge.waited.as_secs_f64()
                );
            }
            RunnerEvent::ChallengeFailed(challenge) => {
                log::warn!(
                    "run {} challenge session {} failed: {}",
                    challenge.run_id,
                    challenge.session_id,
                    challenge.reason.as_deref().unwrap_or("unknown")
                );
            }
            RunnerEvent::RunCompleted(run) => {
                log::info!("run {} completed {}/{}", run.run_id, run.progress, run.target);
            }
            RunnerEvent::RunFailed(run) => {
                log::warn!(
                    "run {} failed at {}/{}: {}",
                    run.run_id,
                    run.progress,
                    run.target,
                    run.message.as_deref().unwrap_or("unknown")
                );
            }
            RunnerEvent::RunCancelled(run) => {
                log::info!("run {} cancelled at {}/{}", run.run_id, run.progress, run.target);
            }
        }
    }
}

/// Metrics handler that feeds the metrics collector.
#[derive(Clone, Debug)]
pub struct MetricsHandler {
    metrics: MetricsCollector,
}

impl MetricsHandler {
    pub fn new(metrics: MetricsCollector) -> Self {
        Self { metrics }
    }
}

impl EventHandler for MetricsHandler {
    fn handle(&self, event: &RunnerEvent) {
        match event {
            RunnerEvent::RunStarted(_) => self.metrics.record_run_started(),
            RunnerEvent::StepSucceeded(step) => self.metrics.record_step(step.latency),
            RunnerEvent::ChallengeSuppressed(_) => self.metrics.record_suppressed_challenge(),
            RunnerEvent::ChallengeRequested(_) => self.metrics.record_challenge_requested(),
            RunnerEvent::ChallengeResolved(challenge) => {
                self.metrics.record_challenge_resolved(challenge.waited)
            }
            RunnerEvent::ChallengeFailed(_) => self.metrics.record_challenge_failed(),
            RunnerEvent::RunCompleted(_) => self.metrics.record_run_completed(),
            RunnerEvent::RunFailed(_) => self.metrics.record_run_failed(),
            RunnerEvent::RunCancelled(_) => {}
        }
    }
}

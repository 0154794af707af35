//! Metrics collection utilities.
//!
//! Aggregates run, step, and challenge counters with step latency
//! percentiles for observability.

use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Point-in-time copy of the collected metrics.
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub started_at: DateTime<Utc>,
    pub runs_started: u64,
    pub runs_completed: u64,
    pub runs_failed: u64,
    pub steps: u64,
    pub challenges_requested: u64,
    pub challenges_resolved: u64,
    pub challenge_failures: u64,
    pub suppressed_challenges: u64,
    pub average_step_latency: Option<Duration>,
    pub p95_step_latency: Option<Duration>,
    pub average_challenge_wait: Option<Duration>,
}

#[derive(Debug)]
struct LatencyWindow {
    samples: VecDeque<Duration>,
    max_window: usize,
}

impl LatencyWindow {
    fn new(max_window: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(max_window),
            max_window,
        }
    }

    fn push(&mut self, latency: Duration) {
        if self.samples.len() == self.max_window {
            self.samples.pop_front();
        }
        self.samples.push_back(latency);
    }

    fn stats(&self) -> (Option<Duration>, Option<Duration>) {
        if self.samples.is_empty() {
            return (None, None);
        }
        let mut samples: Vec<_> = self.samples.iter().cloned().collect();
        samples.sort_unstable();
        let avg = samples.iter().map(|d| d.as_secs_f64()).sum::<f64>() / samples.len() as f64;
        let p95_index = ((samples.len() as f64 * 0.95).ceil() as usize).saturating_sub(1);
        (Some(Duration::from_secs_f64(avg)), Some(samples[p95_index]))
    }
}

#[derive(Debug)]
struct MetricsState {
    started_at: DateTime<Utc>,
    runs_started: u64,
    runs_completed: u64,
    runs_failed: u64,
    steps: u64,
    challenges_requested: u64,
    challenges_resolved: u64,
    challenge_failures: u64,
    suppressed_challenges: u64,
    step_latencies: LatencyWindow,
    challenge_waits: LatencyWindow,
}

impl MetricsState {
    fn new(max_window: usize) -> Self {
        Self {
            started_at: Utc::now(),
            runs_started: 0,
            runs_completed: 0,
            runs_failed: 0,
            steps: 0,
            challenges_requested: 0,
            challenges_resolved: 0,
            challenge_failures: 0,
            suppressed_challenges: 0,
            step_latencies: LatencyWindow::new(max_window),
            challenge_waits: LatencyWindow::new(max_window),
        }
    }
}

/// Thread-safe metrics collector fed by the runner's event dispatcher.
#[derive(Clone, Debug)]
pub struct MetricsCollector {
    inner: Arc<Mutex<MetricsState>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(MetricsState::new(128))),
        }
    }

    pub fn with_window(window: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(MetricsState::new(window.max(16)))),
        }
    }

    fn update(&self, apply: impl FnOnce(&mut MetricsState)) {
        let mut guard = self.inner.lock().expect("metrics lock poisoned");
        apply(&mut guard);
    }

    pub fn record_run_started(&self) {
        self.update(|state| state.runs_started += 1);
    }

    pub fn record_run_completed(&self) {
        self.update(|state| state.runs_completed += 1);
    }

    pub fn record_run_failed(&self) {
        self.update(|state| state.runs_failed += 1);
    }

    pub fn record_step(&self, latency: Duration) {
        self.update(|state| {
            state.steps += 1;
            state.step_latencies.push(latency);
        });
    }

    pub fn record_suppressed_challenge(&self) {
        self.update(|state| state.suppressed_challenges += 1);
    }

    pub fn record_challenge_requested(&self) {
        self.update(|state| state.challenges_requested += 1);
    }

    pub fn record_challenge_resolved(&self, waited: Duration) {
        self.update(|state| {
            state.challenges_resolved += 1;
            state.challenge_waits.push(waited);
        });
    }

    pub fn record_challenge_failed(&self) {
        self.update(|state| state.challenge_failures += 1);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let guard = self.inner.lock().expect("metrics lock poisoned");
        let (average_step_latency, p95_step_latency) = guard.step_latencies.stats();
        let (average_challenge_wait, _) = guard.challenge_waits.stats();
        MetricsSnapshot {
            started_at: guard.started_at,
            runs_started: guard.runs_started,
            runs_completed: guard.runs_completed,
            runs_failed: guard.runs_failed,
            steps: guard.steps,
            challenges_requested: guard.challenges_requested,
            challenges_resolved: guard.challenges_resolved,
            challenge_failures: guard.challenge_failures,
            suppressed_challenges: guard.suppressed_challenges,
            average_step_latency,
            p95_step_latency,
            average_challenge_wait,
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

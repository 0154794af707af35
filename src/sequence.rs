//! High level sequence orchestration.
//!
//! Wires the step client, the challenge provider, and the run state machine
//! into a runner that performs N dependent steps one at a time, pauses for a
//! human verification whenever the backend demands one, and resumes at the
//! step that was interrupted.

use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::challenges::core::{
	DEFAULT_STEP_DELAY, ReqwestStepClient, StepClient, StepClientError, StepOutcome, StepPacing,
	UNEXPECTED_ERROR_MESSAGE,
};
use crate::challenges::session::{ChallengeSession, DEFAULT_MOUNT_KEY, MountPoint};
use crate::challenges::state::{
	RunState, TargetCount, Transition, ValidationError, abort_run, apply_cancellation,
	apply_challenge_result, apply_step_outcome, begin_run,
};
use crate::config::{ConfigError, SequenceConfig};
use crate::external_deps::captcha::{ChallengePrompt, ChallengeProvider, ChannelChallengeProvider};
use crate::modules::events::{
	ChallengeEvent, EventDispatcher, EventHandler, LoggingHandler, MetricsHandler, RunEvent,
	RunnerEvent, StepEvent,
};
use crate::modules::metrics::{MetricsCollector, MetricsSnapshot};
use crate::modules::presentation::{DisplayState, parse_target};

/// Result alias used across the orchestration layer.
pub type SequenceResult<T> = Result<T, SequenceError>;

/// High-level error surfaced by the runner.
#[derive(Debug, Error)]
pub enum SequenceError {
	#[error("{0}")]
	Validation(#[from] ValidationError),
	#[error("step client initialisation failed: {0}")]
	Client(#[from] StepClientError),
	#[error("configuration error: {0}")]
	Config(#[from] ConfigError),
	#[error("run task aborted: {0}")]
	Join(#[from] tokio::task::JoinError),
	#[error("no step client configured")]
	MissingClient,
	#[error("no challenge provider configured")]
	MissingProvider,
}

/// Runner tuning used by the builder.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
	pub step_delay: Duration,
	/// Consecutive challenge demands retried with a held token before it is
	/// considered rejected.
	pub suppressed_challenge_limit: u32,
	pub mount_key: String,
	pub enable_metrics: bool,
}

impl Default for RunnerConfig {
	fn default() -> Self {
		Self {
			step_delay: DEFAULT_STEP_DELAY,
			suppressed_challenge_limit: 3,
			mount_key: DEFAULT_MOUNT_KEY.to_string(),
			enable_metrics: true,
		}
	}
}

/// Latest state of the most recently started run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSnapshot {
	/// 0 until the first run starts.
	pub run_id: u64,
	pub state: RunState,
}

/// Final word of a run task.
#[derive(Debug, Clone)]
pub struct RunReport {
	pub run_id: u64,
	pub state: RunState,
	/// The run was torn down before reaching `Completed` or `Failed`; its
	/// state has been settled back to `Idle`.
	pub cancelled: bool,
}

/// Fluent builder for [`SequenceRunner`].
pub struct SequenceRunnerBuilder {
	config: RunnerConfig,
	client: Option<Arc<dyn StepClient>>,
	provider: Option<Arc<dyn ChallengeProvider>>,
	handlers: Vec<Arc<dyn EventHandler>>,
}

impl SequenceRunnerBuilder {
	pub fn new() -> Self {
		Self {
			config: RunnerConfig::default(),
			client: None,
			provider: None,
			handlers: Vec::new(),
		}
	}

	pub fn with_client(mut self, client: Arc<dyn StepClient>) -> Self {
		self.client = Some(client);
		self
	}

	pub fn with_challenge_provider(mut self, provider: Arc<dyn ChallengeProvider>) -> Self {
		self.provider = Some(provider);
		self
	}

	pub fn with_step_delay(mut self, delay: Duration) -> Self {
		self.config.step_delay = delay;
		self
	}

	pub fn with_suppressed_challenge_limit(mut self, limit: u32) -> Self {
		self.config.suppressed_challenge_limit = limit;
		self
	}

	pub fn with_mount_key(mut self, key: impl Into<String>) -> Self {
		self.config.mount_key = key.into();
		self
	}

	pub fn with_event_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
		self.handlers.push(handler);
		self
	}

	pub fn disable_metrics(mut self) -> Self {
		self.config.enable_metrics = false;
		self
	}

	pub fn build(self) -> SequenceResult<SequenceRunner> {
		let client = self.client.ok_or(SequenceError::MissingClient)?;
		let provider = self.provider.ok_or(SequenceError::MissingProvider)?;
		Ok(SequenceRunner::with_parts(
			self.config,
			client,
			provider,
			self.handlers,
		))
	}
}

impl Default for SequenceRunnerBuilder {
	fn default() -> Self {
		Self::new()
	}
}

struct ActiveRun {
	run_id: u64,
	cancel: CancellationToken,
	task: JoinHandle<RunReport>,
}

/// Challenge-gated sequential runner.
///
/// At most one run is live at a time; starting a new one tears the previous
/// one down first. Dropping the runner cancels whatever is still running.
pub struct SequenceRunner {
	config: RunnerConfig,
	client: Arc<dyn StepClient>,
	provider: Arc<dyn ChallengeProvider>,
	mount: MountPoint,
	events: Arc<EventDispatcher>,
	metrics: Option<MetricsCollector>,
	state_tx: watch::Sender<RunSnapshot>,
	shutdown: CancellationToken,
	active: Option<ActiveRun>,
	last_run_id: u64,
}

impl SequenceRunner {
	/// Obtain a builder to customise the runner instance.
	pub fn builder() -> SequenceRunnerBuilder {
		SequenceRunnerBuilder::new()
	}

	/// Runner talking to `config.api_url` whose captcha widget is delegated to
	/// the host through the returned prompt receiver.
	pub fn from_config(
		config: &SequenceConfig,
	) -> SequenceResult<(Self, mpsc::Receiver<ChallengePrompt>)> {
		let client = ReqwestStepClient::new(config.api_url.clone())?;
		let (provider, prompts) = ChannelChallengeProvider::new(config.captcha.clone(), 1);
		let runner = SequenceRunnerBuilder::new()
			.with_client(Arc::new(client))
			.with_challenge_provider(Arc::new(provider))
			.with_step_delay(config.step_delay())
			.with_suppressed_challenge_limit(config.suppressed_challenge_limit)
			.build()?;
		Ok((runner, prompts))
	}

	fn with_parts(
		config: RunnerConfig,
		client: Arc<dyn StepClient>,
		provider: Arc<dyn ChallengeProvider>,
		handlers: Vec<Arc<dyn EventHandler>>,
	) -> Self {
		let metrics = config.enable_metrics.then(MetricsCollector::new);

		let mut events = EventDispatcher::new();
		events.register_handler(Arc::new(LoggingHandler));
		if let Some(ref collector) = metrics {
			events.register_handler(Arc::new(MetricsHandler::new(collector.clone())));
		}
		for handler in handlers {
			events.register_handler(handler);
		}

		let (state_tx, _) = watch::channel(RunSnapshot {
			run_id: 0,
			state: RunState::idle(),
		});

		Self {
			mount: MountPoint::new(config.mount_key.clone()),
			config,
			client,
			provider,
			events: Arc::new(events),
			metrics,
			state_tx,
			shutdown: CancellationToken::new(),
			active: None,
			last_run_id: 0,
		}
	}

	/// Start a run from raw operator input. Invalid input leaves the current
	/// run and state untouched.
	pub async fn start_from_input(&mut self, input: &str) -> SequenceResult<u64> {
		let target = parse_target(input)?;
		self.start(target).await
	}

	/// Tear down the current run (if any) and start a fresh one.
	pub async fn start(&mut self, target: TargetCount) -> SequenceResult<u64> {
		self.teardown().await?;

		self.last_run_id += 1;
		let run_id = self.last_run_id;
		let state = begin_run(target);
		self.mount.clear();
		self.state_tx.send_replace(RunSnapshot {
			run_id,
			state: state.clone(),
		});

		let cancel = self.shutdown.child_token();
		let driver = RunDriver {
			run_id,
			client: self.client.clone(),
			provider: self.provider.clone(),
			mount: self.mount.clone(),
			events: self.events.clone(),
			pacing: StepPacing::new(self.config.step_delay),
			suppressed_limit: self.config.suppressed_challenge_limit,
			state_tx: self.state_tx.clone(),
			cancel: cancel.clone(),
			next_session_id: 1,
		};
		let task = tokio::spawn(driver.drive(state));
		self.active = Some(ActiveRun {
			run_id,
			cancel,
			task,
		});

		Ok(run_id)
	}

	/// Wait for the current run to finish. `None` when nothing was started.
	pub async fn wait(&mut self) -> SequenceResult<Option<RunReport>> {
		let Some(active) = self.active.take() else {
			return Ok(None);
		};
		let mut report = active.task.await?;
		if report.cancelled {
			apply_cancellation(&mut report.state);
			self.state_tx.send_if_modified(|snapshot| {
				if snapshot.run_id != report.run_id {
					return false;
				}
				snapshot.state = report.state.clone();
				true
			});
			self.dispatch_cancelled(&report);
		}
		Ok(Some(report))
	}

	/// Request teardown of the current run without waiting for it.
	pub fn cancel(&self) {
		if let Some(active) = &self.active {
			active.cancel.cancel();
		}
	}

	/// Cancel everything and wait for the current run task to exit.
	pub async fn shutdown(mut self) -> SequenceResult<Option<RunReport>> {
		self.shutdown.cancel();
		self.wait().await
	}

	/// Observe run state; the receiver always holds the latest snapshot.
	pub fn subscribe(&self) -> watch::Receiver<RunSnapshot> {
		self.state_tx.subscribe()
	}

	pub fn snapshot(&self) -> RunSnapshot {
		self.state_tx.borrow().clone()
	}

	pub fn display(&self) -> DisplayState {
		DisplayState::from_state(&self.state_tx.borrow().state)
	}

	/// Display for a rejected start command; the run itself is untouched.
	pub fn display_validation_error(&self, error: &ValidationError) -> DisplayState {
		DisplayState::with_validation_error(&self.state_tx.borrow().state, error)
	}

	pub fn metrics(&self) -> Option<MetricsSnapshot> {
		self.metrics.as_ref().map(MetricsCollector::snapshot)
	}

	pub fn mount(&self) -> &MountPoint {
		&self.mount
	}

	pub fn active_run(&self) -> Option<u64> {
		self.active.as_ref().map(|active| active.run_id)
	}

	async fn teardown(&mut self) -> SequenceResult<()> {
		if let Some(active) = &self.active {
			active.cancel.cancel();
		}
		self.wait().await?;
		Ok(())
	}

	fn dispatch_cancelled(&self, report: &RunReport) {
		self.events.dispatch(RunnerEvent::RunCancelled(RunEvent {
			run_id: report.run_id,
			progress: report.state.progress(),
			target: report.state.target(),
			message: None,
			timestamp: chrono::Utc::now(),
		}));
	}
}

impl Drop for SequenceRunner {
	fn drop(&mut self) {
		self.shutdown.cancel();
	}
}

/// Everything a single run task owns.
struct RunDriver {
	run_id: u64,
	client: Arc<dyn StepClient>,
	provider: Arc<dyn ChallengeProvider>,
	mount: MountPoint,
	events: Arc<EventDispatcher>,
	pacing: StepPacing,
	suppressed_limit: u32,
	state_tx: watch::Sender<RunSnapshot>,
	cancel: CancellationToken,
	next_session_id: u64,
}

impl RunDriver {
	async fn drive(mut self, mut state: RunState) -> RunReport {
		self.events.dispatch(RunnerEvent::RunStarted(self.run_event(&state)));

		let mut next = Transition::StepNow;
		loop {
			let step = match next {
				Transition::StepAfterDelay => {
					if !self.pacing.pause(&self.cancel).await {
						return self.report(state, true);
					}
					self.run_step(&mut state).await
				}
				Transition::StepNow => self.run_step(&mut state).await,
				Transition::OpenChallenge => self.await_challenge(&mut state).await,
				Transition::Complete => {
					self.mount.clear();
					self.events
						.dispatch(RunnerEvent::RunCompleted(self.run_event(&state)));
					return self.report(state, false);
				}
				Transition::Fail => {
					self.events
						.dispatch(RunnerEvent::RunFailed(self.run_event(&state)));
					return self.report(state, false);
				}
				Transition::Ignore => {
					debug_assert!(false, "driver fed an input to a run in {:?}", state.phase());
					log::error!(
						"run {} received an input that does not apply to {:?}",
						self.run_id,
						state.phase()
					);
					abort_run(&mut state, UNEXPECTED_ERROR_MESSAGE);
					self.publish(&state);
					self.events
						.dispatch(RunnerEvent::RunFailed(self.run_event(&state)));
					return self.report(state, false);
				}
			};

			match step {
				Some(transition) => next = transition,
				None => return self.report(state, true),
			}
		}
	}

	/// Run the step at the current progress. `None` once the run is cancelled.
	async fn run_step(&self, state: &mut RunState) -> Option<Transition> {
		let started = Instant::now();
		let outcome = tokio::select! {
			biased;
			_ = self.cancel.cancelled() => return None,
			outcome = self.client.execute(state.token()) => outcome,
		};
		if self.cancel.is_cancelled() {
			return None;
		}
		let latency = started.elapsed();
		log::debug!(
			"run {} step {} -> {}",
			self.run_id,
			state.progress() + 1,
			outcome.label()
		);

		let suppressed = matches!(outcome, StepOutcome::ChallengeRequired) && state.is_verified();
		let success = outcome.is_success();
		let transition = apply_step_outcome(state, outcome, self.suppressed_limit);
		self.publish(state);

		if success {
			self.events
				.dispatch(RunnerEvent::StepSucceeded(self.step_event(state, latency)));
		} else if suppressed && transition == Transition::StepAfterDelay {
			self.events
				.dispatch(RunnerEvent::ChallengeSuppressed(self.step_event(state, latency)));
		}

		Some(transition)
	}

	/// Hold one challenge session until it resolves. `None` once the run is cancelled.
	async fn await_challenge(&mut self, state: &mut RunState) -> Option<Transition> {
		let session_id = self.next_session_id;
		self.next_session_id += 1;

		let session = match ChallengeSession::open(session_id, &self.mount) {
			Ok(session) => session,
			Err(err) => {
				let reason = err.to_string();
				let transition = apply_challenge_result(state, Err(err));
				self.publish(state);
				self.events.dispatch(RunnerEvent::ChallengeFailed(self.challenge_event(
					state,
					session_id,
					Some(reason),
					Duration::ZERO,
				)));
				return Some(transition);
			}
		};

		log::debug!("run {} opened challenge session {}", self.run_id, session.id());
		self.events.dispatch(RunnerEvent::ChallengeRequested(self.challenge_event(
			state,
			session_id,
			state.last_error().map(str::to_string),
			Duration::ZERO,
		)));

		let result = tokio::select! {
			biased;
			_ = self.cancel.cancelled() => return None,
			result = self.provider.render(session.lease()) => result,
		};
		let waited = session.close();
		if self.cancel.is_cancelled() {
			return None;
		}

		let reason = result.as_ref().err().map(ToString::to_string);
		let transition = apply_challenge_result(state, result);
		self.publish(state);

		let event = self.challenge_event(state, session_id, reason.clone(), waited);
		self.events.dispatch(match reason {
			None => RunnerEvent::ChallengeResolved(event),
			Some(_) => RunnerEvent::ChallengeFailed(event),
		});

		Some(transition)
	}

	/// Publish `state` unless a newer run has taken over the channel.
	fn publish(&self, state: &RunState) {
		self.state_tx.send_if_modified(|snapshot| {
			if snapshot.run_id != self.run_id || self.cancel.is_cancelled() {
				return false;
			}
			snapshot.state = state.clone();
			true
		});
	}

	fn report(&self, state: RunState, cancelled: bool) -> RunReport {
		RunReport {
			run_id: self.run_id,
			state,
			cancelled,
		}
	}

	fn run_event(&self, state: &RunState) -> RunEvent {
		RunEvent {
			run_id: self.run_id,
			progress: state.progress(),
			target: state.target(),
			message: state.last_error().map(str::to_string),
			timestamp: chrono::Utc::now(),
		}
	}

	fn step_event(&self, state: &RunState, latency: Duration) -> StepEvent {
		StepEvent {
			run_id: self.run_id,
			progress: state.progress(),
			target: state.target(),
			latency,
			timestamp: chrono::Utc::now(),
		}
	}

	fn challenge_event(
		&self,
		state: &RunState,
		session_id: u64,
		reason: Option<String>,
		waited: Duration,
	) -> ChallengeEvent {
		ChallengeEvent {
			run_id: self.run_id,
			session_id,
			progress: state.progress(),
			reason,
			waited,
			timestamp: chrono::Utc::now(),
		}
	}
}

//! Retry policy, per-request retry state, and cancellable inter-retry waits.

// std
use std::{collections::BTreeSet, sync::Mutex};
// crates.io
use async_trait::async_trait;
use http::{HeaderMap, header::RETRY_AFTER};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::time;
// self
use crate::_prelude::*;

/// Default number of retries once retrying is enabled (five attempts in total).
pub const DEFAULT_MAX_RETRIES: u32 = 4;
/// Default exponential growth factor.
pub const DEFAULT_BACKOFF_FACTOR: f64 = 2.0;
/// Default delay before the first retry.
pub const DEFAULT_INITIAL_INTERVAL: Duration = Duration::from_secs(1);
/// Largest `Retry-After` value the client is willing to wait for.
pub const DEFAULT_MAX_RETRY_AFTER: Duration = Duration::from_secs(120);

/// Supported jitter strategies for exponential backoff delays.
#[derive(Clone, Debug, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JitterStrategy {
	/// No jitter; deterministic backoff schedule.
	#[default]
	None,
	/// Randomize each delay within `[0.8 × delay, delay]`.
	Full,
}

/// Retry configuration for outbound HTTP calls.
///
/// The policy is a value type: every [`HttpClient`](crate::http::client::HttpClient) holds its
/// own copy, so adjusting one client never affects another.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
	/// Maximum number of retries performed after the initial request.
	#[serde(default = "default_max_retries")]
	pub max_retries: u32,
	/// Multiplier applied to the delay after every retry; `0` disables waiting.
	#[serde(default = "default_backoff_factor")]
	pub backoff_factor: f64,
	/// Delay before the first retry.
	#[serde(default = "default_initial_interval")]
	pub initial_interval: Duration,
	/// Upper bound on an honored `Retry-After`; longer values end the request.
	#[serde(default = "default_max_retry_after")]
	pub max_retry_after: Duration,
	/// Response status codes that trigger a retry.
	#[serde(default = "default_retry_status_codes")]
	pub retry_status_codes: BTreeSet<u16>,
	/// Whether transport-level failures trigger a retry.
	#[serde(default)]
	pub retry_on_exception: bool,
	/// Strategy used to randomize exponential delays.
	#[serde(default)]
	pub jitter: JitterStrategy,
}
impl RetryPolicy {
	/// Validate invariants for retry configuration.
	pub fn validate(&self) -> Result<()> {
		if !self.backoff_factor.is_finite() || self.backoff_factor < 0.0 {
			return Err(Error::Configuration(format!(
				"Retry backoff factor must be a finite number greater than or equal to 0; got {}.",
				self.backoff_factor
			)));
		}
		if self.retry_status_codes.iter().any(|code| !(100..=599).contains(code)) {
			return Err(Error::Configuration(
				"Retry status codes must be valid HTTP status codes (100-599).".into(),
			));
		}

		Ok(())
	}

	/// Include an additional status code in the retryable set.
	pub fn with_status_code(mut self, status: u16) -> Self {
		self.retry_status_codes.insert(status);

		self
	}

	/// Override the backoff factor.
	pub fn with_backoff_factor(mut self, factor: f64) -> Self {
		self.backoff_factor = factor;

		self
	}

	/// Override the retry budget.
	pub fn with_max_retries(mut self, max_retries: u32) -> Self {
		self.max_retries = max_retries;

		self
	}

	/// Retry transport failures as well as retryable responses.
	pub fn with_retry_on_exception(mut self, enabled: bool) -> Self {
		self.retry_on_exception = enabled;

		self
	}

	/// Exponential delay for the `retry`-th retry (1-based), before jitter.
	pub fn exponential_delay(&self, retry: u32) -> Duration {
		if self.backoff_factor == 0.0 {
			return Duration::ZERO;
		}

		let exponent = retry.saturating_sub(1).min(32) as i32;
		let seconds = self.initial_interval.as_secs_f64() * self.backoff_factor.powi(exponent);

		Duration::try_from_secs_f64(seconds).unwrap_or(Duration::MAX)
	}

	/// Backoff for the `retry`-th retry with the configured jitter applied.
	pub fn compute_backoff(&self, retry: u32) -> Duration {
		let delay = self.exponential_delay(retry);

		match self.jitter {
			JitterStrategy::None => delay,
			JitterStrategy::Full => {
				if delay.is_zero() {
					return delay;
				}

				let lower = delay.mul_f64(0.8).as_secs_f64();
				let upper = delay.as_secs_f64();

				Duration::from_secs_f64(rand::rng().random_range(lower..=upper))
			},
		}
	}

	fn is_retryable_status(&self, status: u16) -> bool {
		self.retry_status_codes.contains(&status)
	}
}
impl Default for RetryPolicy {
	fn default() -> Self {
		Self {
			max_retries: DEFAULT_MAX_RETRIES,
			backoff_factor: DEFAULT_BACKOFF_FACTOR,
			initial_interval: DEFAULT_INITIAL_INTERVAL,
			max_retry_after: DEFAULT_MAX_RETRY_AFTER,
			retry_status_codes: default_retry_status_codes(),
			retry_on_exception: false,
			jitter: JitterStrategy::None,
		}
	}
}

/// What a single attempt produced, as seen by the retry state machine.
#[derive(Clone, Copy, Debug)]
pub enum AttemptOutcome<'a> {
	/// The server answered.
	Response {
		/// Response status code.
		status: u16,
		/// Response headers.
		headers: &'a HeaderMap,
	},
	/// The request failed before a response arrived.
	TransportError,
}

/// Decision taken after an attempt completes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetryDecision {
	/// Wait for the delay, then resend.
	Retry(Duration),
	/// Surface the outcome to the caller.
	Finish,
}

/// Per-request retry bookkeeping; lives for exactly one request/response cycle.
#[derive(Debug)]
pub struct RetryState<'a> {
	policy: Option<&'a RetryPolicy>,
	attempts_made: u32,
	next_delay: Option<Duration>,
}
impl<'a> RetryState<'a> {
	/// Start a new cycle; `None` disables retries.
	pub fn new(policy: Option<&'a RetryPolicy>) -> Self {
		Self { policy, attempts_made: 0, next_delay: None }
	}

	/// Number of attempts sent so far.
	pub fn attempts_made(&self) -> u32 {
		self.attempts_made
	}

	/// Delay chosen by the most recent retry decision.
	pub fn next_delay(&self) -> Option<Duration> {
		self.next_delay
	}

	/// Record that an attempt is about to be sent.
	pub fn begin_attempt(&mut self) {
		self.attempts_made = self.attempts_made.saturating_add(1);
		self.next_delay = None;
	}

	/// Decide whether the outcome of the latest attempt warrants another one.
	pub fn evaluate(&mut self, outcome: AttemptOutcome<'_>) -> RetryDecision {
		self.evaluate_at(outcome, SystemTime::now())
	}

	/// Same as [`evaluate`](Self::evaluate) with an explicit reference time for HTTP-date
	/// `Retry-After` values.
	pub fn evaluate_at(&mut self, outcome: AttemptOutcome<'_>, now: SystemTime) -> RetryDecision {
		let Some(policy) = self.policy else {
			return RetryDecision::Finish;
		};
		let retryable = match outcome {
			AttemptOutcome::Response { status, .. } => policy.is_retryable_status(status),
			AttemptOutcome::TransportError => policy.retry_on_exception,
		};

		if !retryable {
			return RetryDecision::Finish;
		}
		if self.attempts_made > policy.max_retries {
			tracing::debug!(attempts = self.attempts_made, "retry budget exhausted");

			return RetryDecision::Finish;
		}

		let retry_after = match outcome {
			AttemptOutcome::Response { headers, .. } => retry_after(headers, now),
			AttemptOutcome::TransportError => None,
		};
		let delay = match retry_after {
			Some(delay) if delay > policy.max_retry_after => {
				tracing::debug!(
					?delay,
					limit = ?policy.max_retry_after,
					"retry-after exceeds limit"
				);

				return RetryDecision::Finish;
			},
			Some(delay) => delay,
			None => policy.compute_backoff(self.attempts_made),
		};

		self.next_delay = Some(delay);

		tracing::debug!(attempt = self.attempts_made, ?delay, "retry backoff computed");

		RetryDecision::Retry(delay)
	}
}

/// Parse a `Retry-After` header given as delta-seconds or an HTTP-date.
///
/// Dates in the past yield a zero delay.
pub fn retry_after(headers: &HeaderMap, now: SystemTime) -> Option<Duration> {
	let raw = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();

	if let Ok(seconds) = raw.parse::<u64>() {
		return Some(Duration::from_secs(seconds));
	}

	let date = httpdate::parse_http_date(raw).ok()?;

	Some(date.duration_since(now).unwrap_or(Duration::ZERO))
}

/// Suspension point between retries.
#[async_trait]
pub trait Waiter: std::fmt::Debug + Send + Sync {
	/// Wait for `delay`, returning [`Error::Cancelled`] if `cancel` fires first.
	async fn wait(&self, delay: Duration, cancel: &CancellationToken) -> Result<()>;
}

/// Waiter backed by the tokio timer.
#[derive(Clone, Copy, Debug, Default)]
pub struct TokioWaiter;
#[async_trait]
impl Waiter for TokioWaiter {
	async fn wait(&self, delay: Duration, cancel: &CancellationToken) -> Result<()> {
		if cancel.is_cancelled() {
			return Err(Error::Cancelled);
		}
		if delay.is_zero() {
			return Ok(());
		}

		tokio::select! {
			biased;
			_ = cancel.cancelled() => Err(Error::Cancelled),
			_ = time::sleep(delay) => Ok(()),
		}
	}
}

/// Waiter that records requested delays and returns immediately.
#[derive(Debug, Default)]
pub struct RecordingWaiter {
	delays: Mutex<Vec<Duration>>,
	cancel_after: Option<usize>,
}
impl RecordingWaiter {
	/// Create an empty recorder.
	pub fn new() -> Arc<Self> {
		Arc::new(Self::default())
	}

	/// Recorder that cancels `cancel` on its `n`-th wait instead of returning.
	pub fn cancelling_after(n: usize) -> Arc<Self> {
		Arc::new(Self { delays: Mutex::new(Vec::new()), cancel_after: Some(n) })
	}

	/// Delays requested so far, in order.
	pub fn delays(&self) -> Vec<Duration> {
		self.delays.lock().map(|delays| delays.clone()).unwrap_or_default()
	}
}
#[async_trait]
impl Waiter for RecordingWaiter {
	async fn wait(&self, delay: Duration, cancel: &CancellationToken) -> Result<()> {
		let count = {
			let mut delays = self.delays.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

			delays.push(delay);
			delays.len()
		};

		if self.cancel_after == Some(count) {
			cancel.cancel();
		}
		if cancel.is_cancelled() {
			return Err(Error::Cancelled);
		}

		Ok(())
	}
}

fn default_max_retries() -> u32 {
	DEFAULT_MAX_RETRIES
}

fn default_backoff_factor() -> f64 {
	DEFAULT_BACKOFF_FACTOR
}

fn default_initial_interval() -> Duration {
	DEFAULT_INITIAL_INTERVAL
}

fn default_max_retry_after() -> Duration {
	DEFAULT_MAX_RETRY_AFTER
}

fn default_retry_status_codes() -> BTreeSet<u16> {
	BTreeSet::from([503])
}

//! Retry handler: per-call state machine and the policy that drives it.
//!
//! A call moves `Attempting -> {Success, Retrying, Failed}`; `Retrying` loops back to
//! `Attempting` once the computed delay elapses (or, for expired credentials, once a
//! forced refresh completes). The client drives the machine with a loop, so long retry
//! chains never grow the stack.

// crates.io
use backon::{BackoffBuilder, ExponentialBackoff, ExponentialBuilder};
// self
use crate::{
	_prelude::*,
	error::{ServiceError, ServiceErrorKind},
};

/// Retry budgets and backoff parameters. All values are configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
	/// Retries allowed for transient, throttling, and server failures.
	pub max_retries: u32,
	/// Forced credential refreshes allowed for auth-expired failures.
	pub max_auth_retries: u32,
	/// Delay before the first retry; doubled on each subsequent one.
	pub base_delay: Duration,
	/// Upper bound for the exponential component and for Retry-After hints.
	pub max_delay: Duration,
	/// Adds a uniform random jitter, bounded by `base_delay`, to each delay.
	pub jitter: bool,
}
impl RetryPolicy {
	const BACKOFF_FACTOR: f32 = 2.;
	const DEFAULT_BASE_DELAY: Duration = Duration::milliseconds(100);
	const DEFAULT_MAX_AUTH_RETRIES: u32 = 1;
	const DEFAULT_MAX_DELAY: Duration = Duration::seconds(20);
	const DEFAULT_MAX_RETRIES: u32 = 3;

	/// Overrides the general retry budget.
	pub fn with_max_retries(mut self, max_retries: u32) -> Self {
		self.max_retries = max_retries;

		self
	}

	/// Overrides the forced-refresh budget.
	pub fn with_max_auth_retries(mut self, max_auth_retries: u32) -> Self {
		self.max_auth_retries = max_auth_retries;

		self
	}

	/// Overrides the base delay. Negative values are treated as zero.
	pub fn with_base_delay(mut self, delay: Duration) -> Self {
		self.base_delay = non_negative(delay);

		self
	}

	/// Overrides the maximum delay. Negative values are treated as zero.
	pub fn with_max_delay(mut self, delay: Duration) -> Self {
		self.max_delay = non_negative(delay);

		self
	}

	/// Enables or disables jitter.
	pub fn with_jitter(mut self, jitter: bool) -> Self {
		self.jitter = jitter;

		self
	}

	/// Builds the exponential schedule for the general budget: `max_retries` delays starting
	/// at `base_delay`, doubling up to `max_delay`.
	pub fn schedule(&self) -> ExponentialBackoff {
		let builder = ExponentialBuilder::default()
			.with_min_delay(self.base_delay.unsigned_abs())
			.with_max_delay(self.max_delay.unsigned_abs())
			.with_factor(Self::BACKOFF_FACTOR)
			.with_max_times(usize::try_from(self.max_retries).unwrap_or(usize::MAX));

		if self.jitter { builder.with_jitter().build() } else { builder.build() }
	}

	/// Returns the backoff before retry number `retry` (zero-based), or `None` once the
	/// general budget is spent.
	pub fn backoff(&self, retry: u32) -> Option<Duration> {
		let delay = self.schedule().nth(usize::try_from(retry).ok()?)?;

		Some(Duration::try_from(delay).map_or(self.max_delay, |delay| delay.min(self.max_delay)))
	}

	/// Decides what to do after a failed attempt and records the outcome in `state`.
	pub fn decide(&self, state: &mut RetryState, err: &ServiceError) -> RetryDecision {
		state.last_error_kind = Some(err.kind);

		let decision = match err.kind {
			ServiceErrorKind::AuthExpired if state.auth_retries < self.max_auth_retries => {
				state.auth_retries += 1;

				RetryDecision::RefreshCredentials
			},
			ServiceErrorKind::TransientNetwork
			| ServiceErrorKind::Throttling
			| ServiceErrorKind::ServerFault => match self.backoff(state.retries) {
				Some(delay) => {
					state.retries += 1;

					RetryDecision::Retry { delay: self.with_hint(delay, err.retry_after) }
				},
				None => RetryDecision::Fail,
			},
			_ => RetryDecision::Fail,
		};

		match decision {
			RetryDecision::Retry { delay } => {
				state.phase = CallPhase::Retrying;
				state.next_delay = Some(delay);
			},
			RetryDecision::RefreshCredentials => {
				state.phase = CallPhase::Retrying;
				state.next_delay = Some(Duration::ZERO);
			},
			RetryDecision::Fail => {
				state.phase = CallPhase::Failed;
				state.next_delay = None;
			},
		}

		decision
	}

	// Retry-After is a floor, capped like the schedule itself.
	fn with_hint(&self, delay: Duration, retry_after: Option<Duration>) -> Duration {
		match retry_after {
			Some(hint) => delay.max(hint.min(self.max_delay)),
			None => delay,
		}
	}
}
impl Default for RetryPolicy {
	fn default() -> Self {
		Self {
			max_retries: Self::DEFAULT_MAX_RETRIES,
			max_auth_retries: Self::DEFAULT_MAX_AUTH_RETRIES,
			base_delay: Self::DEFAULT_BASE_DELAY,
			max_delay: Self::DEFAULT_MAX_DELAY,
			jitter: true,
		}
	}
}

/// Outcome of [`RetryPolicy::decide`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetryDecision {
	/// Sleep for `delay`, then attempt again.
	Retry {
		/// Backoff before the next attempt.
		delay: Duration,
	},
	/// Force a credential refresh, then attempt again immediately.
	RefreshCredentials,
	/// Surface the last error to the caller.
	Fail,
}

/// Phase of the per-call retry state machine.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CallPhase {
	/// An attempt is in progress (also the initial phase).
	#[default]
	Attempting,
	/// The previous attempt failed and another one is scheduled.
	Retrying,
	/// Terminal: the call produced its result.
	Success,
	/// Terminal: the call failed with its last error.
	Failed,
}

/// Bookkeeping for one logical invocation; discarded when the call terminates.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RetryState {
	attempt_count: u32,
	retries: u32,
	auth_retries: u32,
	last_error_kind: Option<ServiceErrorKind>,
	next_delay: Option<Duration>,
	phase: CallPhase,
}
impl RetryState {
	/// Creates the state for a new call.
	pub fn new() -> Self {
		Self::default()
	}

	/// Marks the start of an attempt.
	pub fn begin_attempt(&mut self) {
		self.attempt_count += 1;
		self.phase = CallPhase::Attempting;
		self.next_delay = None;
	}

	/// Marks the call as successful.
	pub fn succeed(&mut self) {
		self.phase = CallPhase::Success;
	}

	/// Attempts started so far.
	pub fn attempt_count(&self) -> u32 {
		self.attempt_count
	}

	/// General retries consumed.
	pub fn retries(&self) -> u32 {
		self.retries
	}

	/// Forced refreshes consumed.
	pub fn auth_retries(&self) -> u32 {
		self.auth_retries
	}

	/// Kind of the most recent failure.
	pub fn last_error_kind(&self) -> Option<ServiceErrorKind> {
		self.last_error_kind
	}

	/// Delay scheduled before the next attempt.
	pub fn next_delay(&self) -> Option<Duration> {
		self.next_delay
	}

	/// Current phase.
	pub fn phase(&self) -> CallPhase {
		self.phase
	}
}

fn non_negative(value: Duration) -> Duration {
	if value.is_negative() { Duration::ZERO } else { value }
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn policy() -> RetryPolicy {
		RetryPolicy::default().with_jitter(false)
	}

	fn error(kind: ServiceErrorKind) -> ServiceError {
		ServiceError::new(kind)
	}

	// The schedule scales in floating point, so compare at millisecond precision.
	fn millis(delays: impl IntoIterator<Item = Duration>) -> Vec<i128> {
		delays.into_iter().map(|delay| delay.whole_milliseconds()).collect()
	}

	#[test]
	fn defaults_match_documented_values() {
		let policy = RetryPolicy::default();

		assert_eq!(policy.max_retries, 3);
		assert_eq!(policy.max_auth_retries, 1);
		assert_eq!(policy.base_delay, Duration::milliseconds(100));
		assert_eq!(policy.max_delay, Duration::seconds(20));
		assert!(policy.jitter);
	}

	#[test]
	fn backoff_doubles_and_caps() {
		let policy = policy().with_max_retries(100);
		let delays = [0, 1, 2, 10, 64].map(|retry| {
			policy.backoff(retry).expect("Retries within the budget should have a delay.")
		});

		assert_eq!(millis(delays), [100, 200, 400, 20_000, 20_000]);
	}

	#[test]
	fn backoff_ends_with_the_general_budget() {
		let policy = policy().with_max_retries(2);

		assert!(policy.backoff(1).is_some());
		assert_eq!(policy.backoff(2), None);
		assert_eq!(policy.with_max_retries(0).backoff(0), None);
	}

	#[test]
	fn throttling_exhausts_general_budget() {
		let policy = policy();
		let mut state = RetryState::new();
		let mut delays = Vec::new();

		loop {
			state.begin_attempt();

			match policy.decide(&mut state, &error(ServiceErrorKind::Throttling)) {
				RetryDecision::Retry { delay } => delays.push(delay),
				RetryDecision::Fail => break,
				RetryDecision::RefreshCredentials => panic!("Throttling must not refresh."),
			}
		}

		assert_eq!(state.attempt_count(), 4);
		assert_eq!(state.phase(), CallPhase::Failed);
		assert_eq!(millis(delays), [100, 200, 400]);
	}

	#[test]
	fn auth_expired_uses_separate_budget() {
		let policy = policy();
		let mut state = RetryState::new();

		assert_eq!(
			policy.decide(&mut state, &error(ServiceErrorKind::Throttling)),
			RetryDecision::Retry { delay: Duration::milliseconds(100) }
		);
		assert_eq!(
			policy.decide(&mut state, &error(ServiceErrorKind::AuthExpired)),
			RetryDecision::RefreshCredentials
		);
		assert_eq!(state.retries(), 1);
		assert_eq!(state.auth_retries(), 1);
		assert_eq!(
			policy.decide(&mut state, &error(ServiceErrorKind::AuthExpired)),
			RetryDecision::Fail
		);
		assert_eq!(state.last_error_kind(), Some(ServiceErrorKind::AuthExpired));
	}

	#[test]
	fn non_retryable_kinds_fail_immediately() {
		for kind in [ServiceErrorKind::ClientFault, ServiceErrorKind::Unknown] {
			let mut state = RetryState::new();

			assert_eq!(policy().decide(&mut state, &error(kind)), RetryDecision::Fail);
			assert_eq!(state.retries(), 0);
		}
	}

	#[test]
	fn retry_after_acts_as_capped_floor() {
		let policy = policy();
		let mut state = RetryState::new();
		let hinted =
			error(ServiceErrorKind::Throttling).with_retry_after(Some(Duration::seconds(3)));

		assert_eq!(
			policy.decide(&mut state, &hinted),
			RetryDecision::Retry { delay: Duration::seconds(3) }
		);

		let huge = error(ServiceErrorKind::ServerFault).with_retry_after(Some(Duration::hours(1)));

		assert_eq!(
			policy.decide(&mut state, &huge),
			RetryDecision::Retry { delay: Duration::seconds(20) }
		);
	}

	#[test]
	fn jitter_stays_within_bound() {
		let policy = RetryPolicy::default();

		for _ in 0..100 {
			let mut state = RetryState::new();
			let RetryDecision::Retry { delay } =
				policy.decide(&mut state, &error(ServiceErrorKind::TransientNetwork))
			else {
				panic!("Transient failures should retry.");
			};

			assert!(delay >= Duration::milliseconds(100));
			assert!(delay < Duration::milliseconds(200));
		}
	}
}

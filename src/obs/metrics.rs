// self
use crate::{
	_prelude::*,
	error::ServiceErrorKind,
	obs::{CallKind, CallOutcome},
};

/// Counts pipeline events in `cloudsign_call_total{kind, outcome}` (when enabled).
pub fn record_call_outcome(kind: CallKind, outcome: CallOutcome) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(
			"cloudsign_call_total",
			"kind" => kind.as_str(),
			"outcome" => outcome.as_str()
		)
		.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = (kind, outcome);
	}
}

/// Records a scheduled backoff in `cloudsign_retry_delay_seconds{error_kind}` (when enabled).
///
/// Immediate retries after a forced credential refresh are not recorded here.
pub fn record_retry_delay(error_kind: ServiceErrorKind, delay: Duration) {
	#[cfg(feature = "metrics")]
	{
		metrics::histogram!("cloudsign_retry_delay_seconds", "error_kind" => error_kind.as_str())
			.record(delay.as_seconds_f64());
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = (error_kind, delay);
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn recording_is_noop_without_recorder() {
		record_call_outcome(CallKind::Operation, CallOutcome::Retry);
		record_retry_delay(ServiceErrorKind::Throttling, Duration::milliseconds(100));
	}
}

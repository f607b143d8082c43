// self
use crate::{_prelude::*, error::ServiceError, retry::RetryDecision};

/// Type alias that resolves to an instrumented future when tracing is enabled.
#[cfg(feature = "tracing")]
pub type InstrumentedCall<F> = tracing::instrument::Instrumented<F>;
/// Passthrough future type when tracing is disabled.
#[cfg(not(feature = "tracing"))]
pub type InstrumentedCall<F> = F;

/// Span covering one `invoke` (every attempt and backoff) or one shared credential refresh.
///
/// Attempts are not given spans of their own; retry decisions are emitted as events inside
/// the call span instead.
#[derive(Clone, Debug)]
pub struct CallSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl CallSpan {
	/// Span for an operation sent to `service` (the descriptor's signing name).
	pub fn operation(service: &str, operation: &'static str) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span = tracing::info_span!(
				"cloudsign.call",
				kind = crate::obs::CallKind::Operation.as_str(),
				service,
				operation
			);

			Self { span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (service, operation);

			Self {}
		}
	}

	/// Span for a refresh through the named identity provider. Coalesced waiters share it.
	pub fn credential_refresh(provider: &'static str) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span = tracing::info_span!(
				"cloudsign.call",
				kind = crate::obs::CallKind::CredentialRefresh.as_str(),
				provider
			);

			Self { span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = provider;

			Self {}
		}
	}

	/// Instruments an async block without holding a guard across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> InstrumentedCall<Fut>
	where
		Fut: Future,
	{
		#[cfg(feature = "tracing")]
		{
			use tracing::Instrument;

			fut.instrument(self.span.clone())
		}
		#[cfg(not(feature = "tracing"))]
		{
			fut
		}
	}
}

/// Emits a `debug` event for the retry handler's verdict on a failed attempt.
pub fn trace_decision(attempt: u32, err: &ServiceError, decision: &RetryDecision) {
	#[cfg(feature = "tracing")]
	{
		let error_kind = err.kind.as_str();
		let status = err.http_status;
		let code = err.code.as_deref();

		match decision {
			RetryDecision::Retry { delay } => tracing::debug!(
				attempt,
				error_kind,
				status,
				code,
				delay_ms = u64::try_from(delay.whole_milliseconds()).unwrap_or(u64::MAX),
				"Backing off before the next attempt."
			),
			RetryDecision::RefreshCredentials => tracing::debug!(
				attempt,
				error_kind,
				status,
				code,
				"Credentials were rejected as expired; refreshing before the next attempt."
			),
			RetryDecision::Fail => tracing::debug!(
				attempt,
				error_kind,
				status,
				code,
				"Giving up; surfacing the last service error."
			),
		}
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = (attempt, err, decision);
	}
}

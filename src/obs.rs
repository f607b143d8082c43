//! Optional observability for the signing pipeline.
//!
//! Nothing here installs a subscriber or recorder; that is left to the application.
//!
//! # Feature Flags
//!
//! - `tracing`: each `invoke` runs inside a `cloudsign.call` span carrying the service signing
//!   name and operation; each shared credential refresh gets its own span carrying the identity
//!   provider label. Every retry verdict (backoff, forced refresh, give up) is a `debug` event
//!   with the error kind, HTTP status and service error code.
//! - `metrics`: `cloudsign_call_total{kind, outcome}` counts attempts, retries, successes and
//!   failures; `cloudsign_retry_delay_seconds{error_kind}` records every scheduled backoff.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// What a span or counter is about.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CallKind {
	/// One [`ServiceClient::invoke`](crate::client::ServiceClient::invoke), all attempts
	/// included.
	Operation,
	/// One identity-provider round-trip, however many callers were coalesced onto it.
	CredentialRefresh,
}
impl CallKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			CallKind::Operation => "operation",
			CallKind::CredentialRefresh => "credential_refresh",
		}
	}
}
impl Display for CallKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels for `cloudsign_call_total`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CallOutcome {
	/// A signed request handed to the transport, or an identity fetch started.
	Attempt,
	/// A failed attempt the retry handler scheduled again, after backoff or a forced refresh.
	Retry,
	/// The operation produced its output, or the refresh stored new credentials.
	Success,
	/// Budgets ran out or the error was not retryable; the error reached the caller.
	Failure,
}
impl CallOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			CallOutcome::Attempt => "attempt",
			CallOutcome::Retry => "retry",
			CallOutcome::Success => "success",
			CallOutcome::Failure => "failure",
		}
	}
}
impl Display for CallOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

//! Identity providers: sources of temporary (or long-term) credentials.
//!
//! Providers perform the round-trip only; caching, coalescing, and storage live in
//! [`CredentialsProvider`](crate::credential::CredentialsProvider). Identity endpoints are
//! called unsigned through the same [`HttpTransport`] and [`Operation`] machinery the
//! service client uses.

pub mod cognito;
pub mod static_keys;
pub mod web_identity;

pub use cognito::*;
pub use static_keys::*;
pub use web_identity::*;

// self
use crate::{
	_prelude::*,
	config::ServiceDescriptor,
	credential::Credentials,
	error::{IdentityProviderError, ServiceError, TransportError},
	http::HttpTransport,
	operation::{DefaultErrorClassifier, Operation},
};

/// Boxed future returned by [`IdentityProvider::fetch_or_refresh`].
pub type IdentityFuture<'a> =
	Pin<Box<dyn Future<Output = Result<Credentials, IdentityProviderError>> + 'a + Send>>;

/// Obtains fresh credentials from an external token-issuing endpoint.
pub trait IdentityProvider
where
	Self: Send + Sync,
{
	/// Short label used in errors, spans, and metrics.
	fn name(&self) -> &'static str;

	/// Performs one round-trip to the identity endpoint.
	fn fetch_or_refresh(&self) -> IdentityFuture<'_>;
}

/// Sends one unsigned identity operation and maps every failure into
/// [`IdentityProviderError`].
pub(crate) async fn call_unsigned<O>(
	provider: &'static str,
	transport: &dyn HttpTransport,
	descriptor: &ServiceDescriptor,
	operation: &O,
) -> Result<O::Output, IdentityProviderError>
where
	O: Operation,
{
	let request = operation
		.serialize(descriptor)
		.map_err(|e| malformed(provider, format!("request could not be built: {e}")))?
		.unsigned_request(descriptor)
		.map_err(|e| malformed(provider, format!("request could not be built: {e}")))?;
	let timeout = descriptor.attempt_timeout;
	let response = tokio::time::timeout(timeout.unsigned_abs(), transport.send(request))
		.await
		.map_err(|_| network_error(provider, TransportError::Timeout { elapsed: timeout }))?
		.map_err(|e| network_error(provider, e))?;

	operation
		.deserialize(&response, &DefaultErrorClassifier)
		.map_err(|e| from_service_error(provider, e))
}

pub(crate) fn network_error(provider: &'static str, err: TransportError) -> IdentityProviderError {
	let message = match StdError::source(&err) {
		Some(source) => format!("{err} ({source})"),
		None => err.to_string(),
	};

	IdentityProviderError::Network { provider, message }
}

pub(crate) fn malformed(provider: &'static str, message: impl Display) -> IdentityProviderError {
	IdentityProviderError::Malformed { provider, message: message.to_string() }
}

/// Rejections carry the service status; undecodable 2xx bodies are malformed responses.
pub(crate) fn from_service_error(
	provider: &'static str,
	err: ServiceError,
) -> IdentityProviderError {
	match err.http_status {
		Some(status) if (200..300).contains(&status) =>
			malformed(provider, err.message.unwrap_or_else(|| err.kind.to_string())),
		Some(status) => IdentityProviderError::Rejected {
			provider,
			status,
			message: err.message.clone().unwrap_or_else(|| err.to_string()),
			code: err.code,
		},
		None => IdentityProviderError::Network { provider, message: err.to_string() },
	}
}

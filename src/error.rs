//! Pipeline-level error types shared across credentials, signing, and service calls.

// self
use crate::_prelude::*;

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// The credential store was never initialized, or was invalidated.
	#[error("Credentials are unavailable; the store has not been initialized.")]
	CredentialsUnavailable,
	/// The signing context carries no credential snapshot.
	#[error("Signing context is missing credentials; refresh before signing.")]
	MissingCredentials,
	/// The credential snapshot expired before the signing instant.
	#[error("Credentials expired at {expired_at}; refresh before signing.")]
	StaleCredentials {
		/// Expiration instant carried by the stale snapshot.
		expired_at: OffsetDateTime,
	},
	/// Identity provider failed to produce credentials.
	#[error(transparent)]
	IdentityProvider(#[from] IdentityProviderError),
	/// Operation parameters failed validation before serialization.
	#[error(transparent)]
	Validation(#[from] ValidationError),
	/// The service (or the network path to it) returned a classified failure.
	#[error(transparent)]
	Service(#[from] ServiceError),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
}
impl Error {
	/// Returns the classified service error, if this is one.
	pub fn as_service(&self) -> Option<&ServiceError> {
		match self {
			Self::Service(err) => Some(err),
			_ => None,
		}
	}
}

/// Configuration failures raised while assembling clients and requests.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// Service descriptor failed validation.
	#[error(transparent)]
	Descriptor(#[from] crate::config::ServiceDescriptorError),
	/// Request URL could not be assembled from the endpoint and the operation path.
	#[error("Request URL for `{path}` is invalid.")]
	InvalidRequestUrl {
		/// Operation path that failed to join.
		path: String,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Identity provider configuration is incomplete or malformed.
	#[error("Identity provider `{provider}` is misconfigured: {reason}.")]
	IdentityProvider {
		/// Provider label.
		provider: &'static str,
		/// Human-readable reason.
		reason: String,
	},
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Failures reported by identity providers while fetching credentials.
///
/// The type is `Clone` so a single coalesced refresh can hand the same outcome to every
/// waiter.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum IdentityProviderError {
	/// The identity endpoint could not be reached.
	#[error("Identity endpoint `{provider}` is unreachable: {message}.")]
	Network {
		/// Provider label.
		provider: &'static str,
		/// Transport failure summary.
		message: String,
	},
	/// The identity endpoint refused to issue credentials.
	#[error("Identity endpoint `{provider}` rejected the request (status {status}): {message}.")]
	Rejected {
		/// Provider label.
		provider: &'static str,
		/// HTTP status returned by the endpoint.
		status: u16,
		/// Structured error code, when present.
		code: Option<String>,
		/// Human-readable message.
		message: String,
	},
	/// The identity endpoint answered with a payload that could not be interpreted.
	#[error("Identity endpoint `{provider}` returned a malformed response: {message}.")]
	Malformed {
		/// Provider label.
		provider: &'static str,
		/// Parsing failure summary.
		message: String,
	},
}

/// Single offending field reported by [`ValidationError`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldViolation {
	/// Field path as exposed on the operation input.
	pub field: String,
	/// Reason the value was rejected.
	pub reason: String,
}
impl Display for FieldViolation {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "`{}` {}", self.field, self.reason)
	}
}

/// Operation parameters were absent or malformed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
#[error("Operation `{operation}` has invalid parameters: {}.", join_violations(.violations))]
pub struct ValidationError {
	/// Operation whose input failed validation.
	pub operation: String,
	/// Every offending field, in the order they were checked.
	pub violations: Vec<FieldViolation>,
}
impl ValidationError {
	/// Returns `true` when the provided field was reported.
	pub fn has_field(&self, field: &str) -> bool {
		self.violations.iter().any(|violation| violation.field == field)
	}
}

fn join_violations(violations: &[FieldViolation]) -> String {
	violations.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
}

/// Coarse failure classes that drive retry decisions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceErrorKind {
	/// Network failure or per-attempt timeout.
	TransientNetwork,
	/// The service is rate limiting the caller.
	Throttling,
	/// Credentials were rejected as expired.
	AuthExpired,
	/// The request itself is wrong; retrying cannot help.
	ClientFault,
	/// The service failed internally.
	ServerFault,
	/// The failure could not be classified.
	Unknown,
}
impl ServiceErrorKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::TransientNetwork => "transient_network",
			Self::Throttling => "throttling",
			Self::AuthExpired => "auth_expired",
			Self::ClientFault => "client_fault",
			Self::ServerFault => "server_fault",
			Self::Unknown => "unknown",
		}
	}
}
impl Display for ServiceErrorKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Typed failure produced by deserializers (and by the pipeline for transport faults).
#[derive(Clone, PartialEq, Eq)]
pub struct ServiceError {
	/// Classification used by the retry handler.
	pub kind: ServiceErrorKind,
	/// HTTP status, absent for network-level failures.
	pub http_status: Option<u16>,
	/// Structured error code reported by the service.
	pub code: Option<String>,
	/// Human-readable message reported by the service or the pipeline.
	pub message: Option<String>,
	/// Original response body, kept when it could not be interpreted.
	pub raw_body: Option<Vec<u8>>,
	/// Retry-After hint supplied by the service.
	pub retry_after: Option<Duration>,
}
impl ServiceError {
	/// Creates an error of the provided kind with no further details.
	pub fn new(kind: ServiceErrorKind) -> Self {
		Self {
			kind,
			http_status: None,
			code: None,
			message: None,
			raw_body: None,
			retry_after: None,
		}
	}

	/// Builds a `transient-network` error from a transport failure.
	pub fn transport(err: &TransportError) -> Self {
		Self::new(ServiceErrorKind::TransientNetwork).with_message(err.to_string())
	}

	/// Adds the HTTP status.
	pub fn with_status(mut self, status: u16) -> Self {
		self.http_status = Some(status);

		self
	}

	/// Adds the structured error code.
	pub fn with_code(mut self, code: impl Into<String>) -> Self {
		self.code = Some(code.into());

		self
	}

	/// Adds a human-readable message.
	pub fn with_message(mut self, message: impl Into<String>) -> Self {
		self.message = Some(message.into());

		self
	}

	/// Keeps the original body bytes.
	pub fn with_raw_body(mut self, body: impl Into<Vec<u8>>) -> Self {
		self.raw_body = Some(body.into());

		self
	}

	/// Adds a Retry-After hint.
	pub fn with_retry_after(mut self, retry_after: Option<Duration>) -> Self {
		self.retry_after = retry_after;

		self
	}
}
impl Debug for ServiceError {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ServiceError")
			.field("kind", &self.kind)
			.field("http_status", &self.http_status)
			.field("code", &self.code)
			.field("message", &self.message)
			.field("raw_body_len", &self.raw_body.as_ref().map(Vec::len))
			.field("retry_after", &self.retry_after)
			.finish()
	}
}
impl Display for ServiceError {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "Service call failed ({})", self.kind)?;

		if let Some(status) = self.http_status {
			write!(f, " with status {status}")?;
		}
		if let Some(code) = &self.code {
			write!(f, ": {code}")?;
		}
		if let Some(message) = &self.message {
			write!(f, ": {message}")?;
		}

		f.write_str(".")
	}
}
impl StdError for ServiceError {}

/// Transport-level failures (network, IO, timeouts).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the service endpoint.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// The attempt exceeded its deadline.
	#[error("The attempt timed out after {elapsed}.")]
	Timeout {
		/// Deadline that was exceeded.
		elapsed: Duration,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling the service endpoint.")]
	Io(#[from] std::io::Error),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		Self::network(e)
	}
}

//! Error classification hooks that map failed responses onto [`ServiceErrorKind`].
//!
//! Classifiers work on crate-owned data ([`ErrorContext`]) so they stay independent of any
//! HTTP client. [`error_from_response`] extracts the structured code and message from a
//! JSON error body (or the `x-amzn-errortype` header) and asks the classifier for a kind.

// self
use crate::{
	_prelude::*,
	error::{ServiceError, ServiceErrorKind},
	http::WireResponse,
};

/// Maps failed responses into the retry taxonomy.
///
/// Implementors are required to be `Send + Sync`; a single classifier is shared by every
/// call a client makes.
pub trait ErrorClassifier
where
	Self: Send + Sync,
{
	/// Classifies a failed response or network failure.
	fn classify(&self, ctx: &ErrorContext) -> ServiceErrorKind;
}

/// Context passed to classifiers.
///
/// The struct keeps only primitive data (status code, structured code, message, body
/// preview) so classifiers never depend on transport types.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ErrorContext {
	/// HTTP status code returned by the service, when available.
	pub http_status: Option<u16>,
	/// Structured error code (`ThrottlingException`, `InvalidParameter`, ...).
	pub code: Option<String>,
	/// Service-supplied message.
	pub message: Option<String>,
	/// Preview of the response body.
	pub body_preview: Option<String>,
	/// Indicates whether the failure originated from the network/transport layer.
	pub network_error: bool,
}
impl ErrorContext {
	/// Creates an empty context.
	pub fn new() -> Self {
		Self {
			http_status: None,
			code: None,
			message: None,
			body_preview: None,
			network_error: false,
		}
	}

	/// Convenience constructor for transport-level/network failures.
	pub fn network_failure() -> Self {
		let mut ctx = Self::new();

		ctx.network_error = true;

		ctx
	}

	/// Adds an HTTP status code.
	pub fn with_http_status(mut self, status: u16) -> Self {
		self.http_status = Some(status);

		self
	}

	/// Adds the structured error code.
	pub fn with_code(mut self, code: impl Into<String>) -> Self {
		self.code = Some(code.into());

		self
	}

	/// Adds the service message.
	pub fn with_message(mut self, message: impl Into<String>) -> Self {
		self.message = Some(message.into());

		self
	}

	/// Adds a body preview.
	pub fn with_body_preview(mut self, body: impl Into<String>) -> Self {
		self.body_preview = Some(body.into());

		self
	}
}
impl Default for ErrorContext {
	fn default() -> Self {
		Self::new()
	}
}

/// Default classifier: structured code table first, then the HTTP status.
///
/// Network failures are always `transient-network`.
#[derive(Debug, Default)]
pub struct DefaultErrorClassifier;
impl Display for DefaultErrorClassifier {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("default-error-classifier")
	}
}
impl ErrorClassifier for DefaultErrorClassifier {
	fn classify(&self, ctx: &ErrorContext) -> ServiceErrorKind {
		if ctx.network_error {
			return ServiceErrorKind::TransientNetwork;
		}
		if let Some(kind) = ctx.code.as_deref().and_then(classify_code) {
			return kind;
		}

		classify_status(ctx.http_status)
	}
}

const AUTH_EXPIRED_CODES: &[&str] = &["ExpiredToken", "ExpiredTokenException", "RequestExpired"];
const THROTTLING_CODES: &[&str] = &[
	"Throttling",
	"ThrottlingException",
	"ThrottledException",
	"RequestThrottledException",
	"TooManyRequestsException",
	"ProvisionedThroughputExceededException",
	"TransactionInProgressException",
	"RequestLimitExceeded",
	"BandwidthLimitExceeded",
	"LimitExceededException",
	"RequestThrottled",
	"SlowDown",
	"PriorRequestNotComplete",
	"EC2ThrottledException",
];
const SERVER_FAULT_CODES: &[&str] = &[
	"InternalError",
	"InternalErrorException",
	"InternalFailure",
	"InternalServerError",
	"InternalServerException",
	"ServiceUnavailable",
	"ServiceUnavailableException",
	"RequestTimeout",
	"RequestTimeoutException",
];

fn classify_code(code: &str) -> Option<ServiceErrorKind> {
	if AUTH_EXPIRED_CODES.contains(&code) {
		Some(ServiceErrorKind::AuthExpired)
	} else if THROTTLING_CODES.contains(&code) {
		Some(ServiceErrorKind::Throttling)
	} else if SERVER_FAULT_CODES.contains(&code) {
		Some(ServiceErrorKind::ServerFault)
	} else {
		None
	}
}

fn classify_status(status: Option<u16>) -> ServiceErrorKind {
	match status {
		Some(401) => ServiceErrorKind::AuthExpired,
		Some(429) => ServiceErrorKind::Throttling,
		Some(status) if (500..600).contains(&status) => ServiceErrorKind::ServerFault,
		Some(status) if (400..500).contains(&status) => ServiceErrorKind::ClientFault,
		_ => ServiceErrorKind::Unknown,
	}
}

#[derive(Deserialize)]
struct JsonErrorBody {
	#[serde(rename = "__type")]
	type_name: Option<String>,
	code: Option<String>,
	#[serde(rename = "Code")]
	code_pascal: Option<String>,
	message: Option<String>,
	#[serde(rename = "Message")]
	message_pascal: Option<String>,
}

/// Builds the [`ServiceError`] for a response outside the 2xx range.
///
/// A non-empty body that is not a JSON object yields
/// [`ServiceErrorKind::Unknown`] with the original bytes, unless the
/// `x-amzn-errortype` header carries a structured code.
pub fn error_from_response(
	response: &WireResponse,
	classifier: &dyn ErrorClassifier,
) -> ServiceError {
	let header_code = response.header("x-amzn-errortype").map(normalize_code);
	let parsed = if response.body.iter().all(u8::is_ascii_whitespace) {
		None
	} else {
		match serde_json::from_slice::<JsonErrorBody>(&response.body) {
			Ok(body) => Some(body),
			Err(_) if header_code.is_none() => {
				return ServiceError::new(ServiceErrorKind::Unknown)
					.with_status(response.status)
					.with_message("Error body could not be parsed.")
					.with_raw_body(response.body.clone())
					.with_retry_after(response.retry_after());
			},
			Err(_) => None,
		}
	};
	let unparsed = parsed.is_none() && !response.body.iter().all(u8::is_ascii_whitespace);
	let (body_code, message) = match parsed {
		Some(body) => (
			body.type_name.or(body.code).or(body.code_pascal).map(|code| normalize_code(&code)),
			body.message.or(body.message_pascal),
		),
		None => (None, None),
	};
	let code = body_code.or(header_code);
	let mut ctx = ErrorContext::new().with_http_status(response.status);

	if let Some(code) = &code {
		ctx = ctx.with_code(code.clone());
	}
	if let Some(message) = &message {
		ctx = ctx.with_message(message.clone());
	}
	if !response.body.is_empty() {
		ctx = ctx.with_body_preview(response.body_preview());
	}

	let mut err = ServiceError::new(classifier.classify(&ctx))
		.with_status(response.status)
		.with_retry_after(response.retry_after());

	if let Some(code) = code {
		err = err.with_code(code);
	}
	if let Some(message) = message {
		err = err.with_message(message);
	}
	if unparsed {
		err = err.with_raw_body(response.body.clone());
	}

	err
}

/// Strips namespace prefixes (`ns#Code`) and header suffixes (`Code:uri`).
fn normalize_code(raw: &str) -> String {
	let code = raw.rsplit_once('#').map_or(raw, |(_, code)| code);
	let code = code.split_once(':').map_or(code, |(code, _)| code);

	code.trim().to_owned()
}

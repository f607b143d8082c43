//! JSON protocol helpers (`application/x-amz-json-*` with an `x-amz-target` header).

// crates.io
use serde::de::DeserializeOwned;
// self
use crate::{
	_prelude::*,
	config::ServiceDescriptor,
	error::{FieldViolation, ServiceError, ServiceErrorKind, ValidationError},
	http::{Method, WireResponse},
	operation::{ErrorClassifier, WirePayload, classify},
};

/// Renders a `POST /` payload for the provided operation input.
///
/// Fails when the descriptor has no JSON protocol configured or the input cannot be
/// encoded; the violation names the offending field path.
pub fn payload<T>(
	descriptor: &ServiceDescriptor,
	operation: &str,
	input: &T,
) -> Result<WirePayload, ValidationError>
where
	T: Serialize,
{
	let Some(json) = &descriptor.json else {
		return Err(single_violation(
			operation,
			"x-amz-target",
			"requires a JSON protocol on the service descriptor",
		));
	};
	let mut body = Vec::new();
	let mut serializer = serde_json::Serializer::new(&mut body);

	serde_path_to_error::serialize(input, &mut serializer).map_err(|e| {
		let reason = format!("cannot be encoded: {}", e.inner());

		single_violation(operation, &e.path().to_string(), &reason)
	})?;

	Ok(WirePayload::new(Method::Post, "/")
		.with_header("content-type", json.content_type())
		.with_header("x-amz-target", json.target(operation))
		.with_body(body))
}

/// Decodes a 2xx JSON body into `T`, or classifies any other status.
///
/// An empty success body decodes as `{}`. A success body that fails to decode yields a
/// [`ServiceErrorKind::Unknown`] error carrying the raw bytes and the failing JSON path.
pub fn output<T>(
	response: &WireResponse,
	classifier: &dyn ErrorClassifier,
) -> Result<T, ServiceError>
where
	T: DeserializeOwned,
{
	if !response.is_success() {
		return Err(classify::error_from_response(response, classifier));
	}

	let body: &[u8] = if response.body.is_empty() { b"{}" } else { &response.body };
	let mut deserializer = serde_json::Deserializer::from_slice(body);

	serde_path_to_error::deserialize(&mut deserializer).map_err(|e| {
		let message =
			format!("Response body could not be decoded at `{}`: {}", e.path(), e.inner());

		ServiceError::new(ServiceErrorKind::Unknown)
			.with_status(response.status)
			.with_message(message)
			.with_raw_body(response.body.clone())
	})
}

fn single_violation(operation: &str, field: &str, reason: &str) -> ValidationError {
	ValidationError {
		operation: operation.into(),
		violations: vec![FieldViolation { field: field.into(), reason: reason.into() }],
	}
}

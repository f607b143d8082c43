//! Per-operation serialization capability set.
//!
//! Each service operation implements [`Operation`]: it turns its typed input into a
//! [`WirePayload`] (validating the input first) and turns a [`WireResponse`] back into a
//! typed output or a classified [`ServiceError`]. The client selects the implementation
//! statically through the operation's type; there is no runtime type inspection.

pub mod classify;
pub mod json;
pub mod validate;

pub use classify::*;
pub use validate::*;

// self
use crate::{
	_prelude::*,
	config::ServiceDescriptor,
	error::{ConfigError, ServiceError, ValidationError},
	http::{Method, WireRequest, WireResponse},
	sign,
};

/// Serialized request produced by an operation, before signing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WirePayload {
	/// HTTP method.
	pub method: Method,
	/// Request path relative to the service endpoint.
	pub path: String,
	/// Query parameters, in insertion order.
	pub query: Vec<(String, String)>,
	/// Operation-specific headers (content type, target, ...).
	pub headers: Vec<(String, String)>,
	/// Raw request body.
	pub body: Vec<u8>,
}
impl WirePayload {
	/// Creates an empty payload for the provided method and path.
	pub fn new(method: Method, path: impl Into<String>) -> Self {
		Self { method, path: path.into(), query: Vec::new(), headers: Vec::new(), body: Vec::new() }
	}

	/// Appends a query parameter.
	pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
		self.query.push((key.into(), value.into()));

		self
	}

	/// Appends a header.
	pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.headers.push((name.into(), value.into()));

		self
	}

	/// Replaces the body.
	pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
		self.body = body.into();

		self
	}

	/// Resolves the request URL against `endpoint`, encoding the query the same way the
	/// signer canonicalizes it.
	pub fn url(&self, endpoint: &Url) -> Result<Url, ConfigError> {
		let mut url = endpoint.join(&self.path).map_err(|source| {
			ConfigError::InvalidRequestUrl { path: self.path.clone(), source }
		})?;
		let query = sign::canonical_query(&self.query);

		url.set_query((!query.is_empty()).then_some(query.as_str()));

		Ok(url)
	}

	/// Builds an unsigned request (payload headers plus `user-agent`).
	pub fn unsigned_request(
		&self,
		descriptor: &ServiceDescriptor,
	) -> Result<WireRequest, ConfigError> {
		let mut headers = self.headers.clone();

		headers.push(("user-agent".into(), descriptor.user_agent.clone()));

		Ok(WireRequest {
			method: self.method,
			url: self.url(&descriptor.endpoint)?,
			headers,
			body: self.body.clone(),
		})
	}
}

/// Capability set `{serialize, deserialize}` implemented once per service operation.
pub trait Operation
where
	Self: Send + Sync,
{
	/// Typed result returned on success.
	type Output: Send;

	/// Operation name used in validation errors, spans, and JSON targets.
	fn name(&self) -> &'static str;

	/// Validates the input and renders the wire payload.
	fn serialize(&self, descriptor: &ServiceDescriptor) -> Result<WirePayload, ValidationError>;

	/// Produces the typed output, or classifies the response into a [`ServiceError`].
	///
	/// Implementations must never surface raw parse faults: undecodable bodies become
	/// [`ServiceErrorKind::Unknown`](crate::error::ServiceErrorKind::Unknown) errors that
	/// keep the original bytes.
	fn deserialize(
		&self,
		response: &WireResponse,
		classifier: &dyn ErrorClassifier,
	) -> Result<Self::Output, ServiceError>;
}

//! Per-service configuration consumed by the pipeline.
//!
//! A [`ServiceDescriptor`] names the signing scope (service + region), the HTTPS endpoint,
//! the JSON protocol parameters used by serializers, and the per-attempt timeout.
//! Descriptors are validated once at construction so the pipeline never has to.

/// Builder API for assembling service descriptors.
pub mod builder;

pub use builder::*;

// self
use crate::_prelude::*;

/// JSON protocol parameters (`x-amz-target` prefix and content-type version).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonProtocol {
	/// Target prefix, e.g. `AWSCognitoIdentityService`.
	pub target_prefix: String,
	/// JSON version rendered into `application/x-amz-json-<version>`.
	pub version: String,
}
impl JsonProtocol {
	/// Returns the `content-type` header value.
	pub fn content_type(&self) -> String {
		format!("application/x-amz-json-{}", self.version)
	}

	/// Returns the `x-amz-target` header value for an operation.
	pub fn target(&self, operation: &str) -> String {
		format!("{}.{operation}", self.target_prefix)
	}
}

/// Immutable service descriptor consumed by clients and serializers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ServiceDescriptorConfig")]
pub struct ServiceDescriptor {
	/// Service signing name, e.g. `cognito-identity`.
	pub signing_name: String,
	/// Signing region, e.g. `us-east-1`.
	pub region: String,
	/// HTTPS endpoint requests are sent to.
	pub endpoint: Url,
	/// JSON protocol parameters, when the service speaks JSON.
	pub json: Option<JsonProtocol>,
	/// Deadline applied to each attempt; expiry counts as a transient network failure.
	pub attempt_timeout: Duration,
	/// `user-agent` header sent with every request.
	pub user_agent: String,
}
impl ServiceDescriptor {
	/// Creates a new builder for the provided signing name and region.
	pub fn builder(
		signing_name: impl Into<String>,
		region: impl Into<String>,
	) -> ServiceDescriptorBuilder {
		ServiceDescriptorBuilder::new(signing_name.into(), region.into())
	}

	/// Returns the `host` header value (host plus any non-default port).
	pub fn host(&self) -> String {
		let host = self.endpoint.host_str().unwrap_or_default();

		match self.endpoint.port() {
			Some(port) => format!("{host}:{port}"),
			None => host.to_owned(),
		}
	}
}

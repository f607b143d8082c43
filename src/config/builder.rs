// self
use crate::{
	_prelude::*,
	config::{JsonProtocol, ServiceDescriptor},
};

/// Errors raised while constructing or validating descriptors.
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum ServiceDescriptorError {
	/// The signing name is empty.
	#[error("Missing service signing name.")]
	MissingSigningName,
	/// The region is empty or contains characters outside `[a-z0-9-]`.
	#[error("Region `{region}` is invalid.")]
	InvalidRegion {
		/// Region that failed validation.
		region: String,
	},
	/// Endpoints must use HTTPS.
	#[error("The service endpoint must use HTTPS: {url}.")]
	InsecureEndpoint {
		/// Endpoint URL that failed validation.
		url: String,
	},
	/// Endpoint has no host to sign.
	#[error("The service endpoint has no host: {url}.")]
	EndpointWithoutHost {
		/// Endpoint URL that failed validation.
		url: String,
	},
	/// The default endpoint could not be derived from the signing name and region.
	#[error("The default endpoint for `{signing_name}` in `{region}` is not a valid URL.")]
	InvalidDefaultEndpoint {
		/// Signing name used to derive the endpoint.
		signing_name: String,
		/// Region used to derive the endpoint.
		region: String,
	},
	/// Attempt timeout must be positive.
	#[error("Attempt timeout must be positive.")]
	NonPositiveAttemptTimeout,
	/// JSON protocol target prefix or version is empty.
	#[error("JSON protocol requires a target prefix and a version.")]
	IncompleteJsonProtocol,
}

/// Builder for [`ServiceDescriptor`] values.
#[derive(Debug)]
pub struct ServiceDescriptorBuilder {
	/// Service signing name.
	pub signing_name: String,
	/// Signing region.
	pub region: String,
	/// Optional endpoint override; derived from the signing name and region otherwise.
	pub endpoint: Option<Url>,
	/// Optional JSON protocol parameters.
	pub json: Option<JsonProtocol>,
	/// Per-attempt deadline.
	pub attempt_timeout: Duration,
	/// `user-agent` header value.
	pub user_agent: String,
}
impl ServiceDescriptorBuilder {
	const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::seconds(30);

	/// Creates a new builder seeded with the provided signing scope.
	pub fn new(signing_name: String, region: String) -> Self {
		Self {
			signing_name,
			region,
			endpoint: None,
			json: None,
			attempt_timeout: Self::DEFAULT_ATTEMPT_TIMEOUT,
			user_agent: concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")).into(),
		}
	}

	/// Overrides the endpoint.
	pub fn endpoint(mut self, url: Url) -> Self {
		self.endpoint = Some(url);

		self
	}

	/// Enables the JSON protocol with the provided target prefix and version.
	pub fn json_protocol(
		mut self,
		target_prefix: impl Into<String>,
		version: impl Into<String>,
	) -> Self {
		self.json =
			Some(JsonProtocol { target_prefix: target_prefix.into(), version: version.into() });

		self
	}

	/// Overrides the per-attempt timeout (defaults to 30 seconds).
	pub fn attempt_timeout(mut self, timeout: Duration) -> Self {
		self.attempt_timeout = timeout;

		self
	}

	/// Overrides the `user-agent` header.
	pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
		self.user_agent = user_agent.into();

		self
	}

	/// Consumes the builder and validates the resulting descriptor.
	pub fn build(self) -> Result<ServiceDescriptor, ServiceDescriptorError> {
		if self.signing_name.trim().is_empty() {
			return Err(ServiceDescriptorError::MissingSigningName);
		}

		let endpoint = match self.endpoint {
			Some(endpoint) => endpoint,
			None => default_endpoint(&self.signing_name, &self.region)?,
		};
		let descriptor = ServiceDescriptor {
			signing_name: self.signing_name,
			region: self.region,
			endpoint,
			json: self.json,
			attempt_timeout: self.attempt_timeout,
			user_agent: self.user_agent,
		};

		descriptor.validate()?;

		Ok(descriptor)
	}
}

/// Serialized form of a [`ServiceDescriptor`]; deserialization goes through the builder so
/// loaded descriptors obey the same invariants as constructed ones.
#[derive(Clone, Debug, Deserialize)]
pub struct ServiceDescriptorConfig {
	signing_name: String,
	region: String,
	#[serde(default)]
	endpoint: Option<Url>,
	#[serde(default)]
	json: Option<JsonProtocol>,
	#[serde(default)]
	attempt_timeout: Option<Duration>,
	#[serde(default)]
	user_agent: Option<String>,
}
impl TryFrom<ServiceDescriptorConfig> for ServiceDescriptor {
	type Error = ServiceDescriptorError;

	fn try_from(config: ServiceDescriptorConfig) -> Result<Self, Self::Error> {
		let mut builder = ServiceDescriptorBuilder::new(config.signing_name, config.region);

		builder.endpoint = config.endpoint;
		builder.json = config.json;

		if let Some(timeout) = config.attempt_timeout {
			builder.attempt_timeout = timeout;
		}
		if let Some(user_agent) = config.user_agent {
			builder.user_agent = user_agent;
		}

		builder.build()
	}
}

impl ServiceDescriptor {
	/// Validates invariants for the descriptor.
	fn validate(&self) -> Result<(), ServiceDescriptorError> {
		if self.signing_name.trim().is_empty() {
			return Err(ServiceDescriptorError::MissingSigningName);
		}

		validate_region(&self.region)?;
		validate_endpoint(&self.endpoint)?;

		if !self.attempt_timeout.is_positive() {
			return Err(ServiceDescriptorError::NonPositiveAttemptTimeout);
		}
		if self
			.json
			.as_ref()
			.is_some_and(|json| json.target_prefix.is_empty() || json.version.is_empty())
		{
			return Err(ServiceDescriptorError::IncompleteJsonProtocol);
		}

		Ok(())
	}
}

fn default_endpoint(signing_name: &str, region: &str) -> Result<Url, ServiceDescriptorError> {
	validate_region(region)?;

	Url::parse(&format!("https://{signing_name}.{region}.amazonaws.com/")).map_err(|_| {
		ServiceDescriptorError::InvalidDefaultEndpoint {
			signing_name: signing_name.into(),
			region: region.into(),
		}
	})
}

pub(crate) fn validate_region(region: &str) -> Result<(), ServiceDescriptorError> {
	let valid = !region.is_empty()
		&& region.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');

	if valid {
		Ok(())
	} else {
		Err(ServiceDescriptorError::InvalidRegion { region: region.into() })
	}
}

fn validate_endpoint(url: &Url) -> Result<(), ServiceDescriptorError> {
	if url.scheme() != "https" {
		return Err(ServiceDescriptorError::InsecureEndpoint { url: url.to_string() });
	}
	if url.host_str().is_none_or(str::is_empty) {
		return Err(ServiceDescriptorError::EndpointWithoutHost { url: url.to_string() });
	}

	Ok(())
}

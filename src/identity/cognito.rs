//! Identity pool federation (`GetId` followed by `GetCredentialsForIdentity`).

// self
use crate::{
	_prelude::*,
	config::{self, ServiceDescriptor},
	credential::Credentials,
	error::{ConfigError, IdentityProviderError, ServiceError, ServiceErrorKind, ValidationError},
	http::{HttpTransport, WireResponse},
	identity::{self, IdentityFuture, IdentityProvider},
	operation::{ErrorClassifier, Operation, Validator, WirePayload, json},
};

/// Signing name of the identity pool service.
pub const COGNITO_SIGNING_NAME: &str = "cognito-identity";
/// JSON target prefix of the identity pool service.
pub const COGNITO_TARGET_PREFIX: &str = "AWSCognitoIdentityService";

const NAME: &str = "cognito";
const IDENTITY_NOT_FOUND: &str = "ResourceNotFoundException";

/// Fetches temporary credentials for an identity in an identity pool.
///
/// The identity id returned by the first `GetId` call is cached and reused by later
/// refreshes. It is dropped again when the service reports it unknown, so the next
/// refresh starts over with `GetId`.
pub struct CognitoIdentityProvider {
	identity_pool_id: String,
	account_id: Option<String>,
	logins: BTreeMap<String, String>,
	descriptor: ServiceDescriptor,
	transport: Arc<dyn HttpTransport>,
	identity_id: Mutex<Option<String>>,
}
impl CognitoIdentityProvider {
	/// Creates a provider for `identity_pool_id` (`<region>:<uuid>`).
	///
	/// The region embedded in the pool id selects the regional endpoint.
	pub fn new(
		identity_pool_id: impl Into<String>,
		transport: Arc<dyn HttpTransport>,
	) -> Result<Self, ConfigError> {
		let identity_pool_id = identity_pool_id.into();
		let region = pool_region(&identity_pool_id)?.to_owned();
		let descriptor = descriptor(region, None)?;

		Ok(Self {
			identity_pool_id,
			account_id: None,
			logins: BTreeMap::new(),
			descriptor,
			transport,
			identity_id: Mutex::new(None),
		})
	}

	/// Adds identity provider tokens (`provider name -> token`) sent with both calls.
	pub fn with_logins(mut self, logins: BTreeMap<String, String>) -> Self {
		self.logins = logins;

		self
	}

	/// Sets the account id that owns the pool.
	pub fn with_account_id(mut self, account_id: impl Into<String>) -> Self {
		self.account_id = Some(account_id.into());

		self
	}

	/// Seeds the identity id, skipping the initial `GetId` call.
	pub fn with_identity_id(self, identity_id: impl Into<String>) -> Self {
		*self.identity_id.lock() = Some(identity_id.into());

		self
	}

	/// Overrides the service endpoint (must be HTTPS).
	pub fn with_endpoint(mut self, endpoint: Url) -> Result<Self, ConfigError> {
		self.descriptor = descriptor(self.descriptor.region.clone(), Some(endpoint))?;

		Ok(self)
	}

	/// Identity pool this provider federates into.
	pub fn identity_pool_id(&self) -> &str {
		&self.identity_pool_id
	}

	/// Returns the cached identity id, if one was resolved.
	pub fn identity_id(&self) -> Option<String> {
		self.identity_id.lock().clone()
	}

	async fn resolve_identity_id(&self) -> Result<String, IdentityProviderError> {
		let cached = self.identity_id.lock().clone();

		if let Some(identity_id) = cached {
			return Ok(identity_id);
		}

		let request = GetId {
			identity_pool_id: self.identity_pool_id.clone(),
			account_id: self.account_id.clone(),
			logins: self.logins.clone(),
		};
		let identity_id =
			identity::call_unsigned(NAME, &*self.transport, &self.descriptor, &request).await?;

		*self.identity_id.lock() = Some(identity_id.clone());

		Ok(identity_id)
	}

	async fn fetch(&self) -> Result<Credentials, IdentityProviderError> {
		let identity_id = self.resolve_identity_id().await?;
		let request = GetCredentialsForIdentity {
			identity_id: identity_id.clone(),
			logins: self.logins.clone(),
		};
		let outcome =
			identity::call_unsigned(NAME, &*self.transport, &self.descriptor, &request).await;
		let identity_unknown = matches!(
			&outcome,
			Err(IdentityProviderError::Rejected { code: Some(code), .. })
				if code == IDENTITY_NOT_FOUND
		);

		if identity_unknown {
			let mut cached = self.identity_id.lock();

			if cached.as_deref() == Some(identity_id.as_str()) {
				*cached = None;
			}
		}

		outcome
	}
}
impl IdentityProvider for CognitoIdentityProvider {
	fn name(&self) -> &'static str {
		NAME
	}

	fn fetch_or_refresh(&self) -> IdentityFuture<'_> {
		Box::pin(self.fetch())
	}
}
impl Debug for CognitoIdentityProvider {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("CognitoIdentityProvider")
			.field("identity_pool_id", &self.identity_pool_id)
			.field("account_id", &self.account_id)
			.field("logins", &self.logins.keys().collect::<Vec<_>>())
			.field("endpoint", &self.descriptor.endpoint.as_str())
			.field("identity_id", &*self.identity_id.lock())
			.finish()
	}
}

/// `GetId`: resolves (or creates) the identity id for the caller.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct GetId {
	/// Identity pool id, `<region>:<uuid>`.
	pub identity_pool_id: String,
	/// Account that owns the pool.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub account_id: Option<String>,
	/// Provider tokens.
	#[serde(skip_serializing_if = "BTreeMap::is_empty")]
	pub logins: BTreeMap<String, String>,
}
impl Operation for GetId {
	type Output = String;

	fn name(&self) -> &'static str {
		"GetId"
	}

	fn serialize(&self, descriptor: &ServiceDescriptor) -> Result<WirePayload, ValidationError> {
		let account_ok = self
			.account_id
			.as_deref()
			.is_none_or(|id| id.len() == 12 && id.bytes().all(|b| b.is_ascii_digit()));

		validate_logins(
			Validator::new(self.name())
				.identifier("IdentityPoolId", &self.identity_pool_id)
				.length("IdentityPoolId", &self.identity_pool_id, 1, 55)
				.check("AccountId", account_ok, "must be 12 digits"),
			&self.logins,
		)
		.finish()?;

		json::payload(descriptor, self.name(), self)
	}

	fn deserialize(
		&self,
		response: &WireResponse,
		classifier: &dyn ErrorClassifier,
	) -> Result<String, ServiceError> {
		json::output::<GetIdOutput>(response, classifier).map(|output| output.identity_id)
	}
}

/// `GetCredentialsForIdentity`: exchanges an identity id for temporary credentials.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct GetCredentialsForIdentity {
	/// Identity id returned by [`GetId`].
	pub identity_id: String,
	/// Provider tokens.
	#[serde(skip_serializing_if = "BTreeMap::is_empty")]
	pub logins: BTreeMap<String, String>,
}
impl Operation for GetCredentialsForIdentity {
	type Output = Credentials;

	fn name(&self) -> &'static str {
		"GetCredentialsForIdentity"
	}

	fn serialize(&self, descriptor: &ServiceDescriptor) -> Result<WirePayload, ValidationError> {
		validate_logins(
			Validator::new(self.name())
				.identifier("IdentityId", &self.identity_id)
				.length("IdentityId", &self.identity_id, 1, 55),
			&self.logins,
		)
		.finish()?;

		json::payload(descriptor, self.name(), self)
	}

	fn deserialize(
		&self,
		response: &WireResponse,
		classifier: &dyn ErrorClassifier,
	) -> Result<Credentials, ServiceError> {
		let output = json::output::<GetCredentialsOutput>(response, classifier)?;
		let invalid = |reason: String| {
			ServiceError::new(ServiceErrorKind::Unknown)
				.with_status(response.status)
				.with_message(reason)
				.with_raw_body(response.body.clone())
		};
		let wire = output.credentials;
		let expiration = OffsetDateTime::from_unix_timestamp(wire.expiration.trunc() as i64)
			.map_err(|e| invalid(format!("Credential expiration is out of range: {e}")))?;
		let mut builder = Credentials::builder(wire.access_key_id)
			.secret_key(wire.secret_key)
			.expiration(expiration);

		if let Some(token) = wire.session_token {
			builder = builder.session_token(token);
		}

		builder.build().map_err(|e| invalid(e.to_string()))
	}
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GetIdOutput {
	identity_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GetCredentialsOutput {
	credentials: WireCredentials,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireCredentials {
	access_key_id: String,
	secret_key: String,
	session_token: Option<String>,
	// Epoch seconds, possibly fractional.
	expiration: f64,
}
impl Debug for WireCredentials {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("WireCredentials")
			.field("access_key_id", &self.access_key_id)
			.field("expiration", &self.expiration)
			.finish_non_exhaustive()
	}
}

fn validate_logins(validator: Validator, logins: &BTreeMap<String, String>) -> Validator {
	logins.iter().fold(validator, |validator, (provider, token)| {
		validator
			.identifier("Logins", provider)
			.check("Logins", !token.trim().is_empty(), format!("token for `{provider}` is empty"))
	})
}

fn descriptor(region: String, endpoint: Option<Url>) -> Result<ServiceDescriptor, ConfigError> {
	let mut builder = ServiceDescriptor::builder(COGNITO_SIGNING_NAME, region)
		.json_protocol(COGNITO_TARGET_PREFIX, "1.1");

	if let Some(endpoint) = endpoint {
		builder = builder.endpoint(endpoint);
	}

	Ok(builder.build()?)
}

/// Validates `<region>:<uuid>` and returns the region.
fn pool_region(identity_pool_id: &str) -> Result<&str, ConfigError> {
	let invalid = |reason: &str| ConfigError::IdentityProvider {
		provider: NAME,
		reason: format!("identity pool id `{identity_pool_id}` {reason}"),
	};
	let (region, id) = identity_pool_id
		.split_once(':')
		.ok_or_else(|| invalid("must have the form `<region>:<uuid>`"))?;

	config::validate_region(region).map_err(|_| invalid("has an invalid region"))?;

	if !is_uuid(id) {
		return Err(invalid("has an invalid id"));
	}

	Ok(region)
}

fn is_uuid(value: &str) -> bool {
	value.len() == 36
		&& value.char_indices().all(|(i, c)| match i {
			8 | 13 | 18 | 23 => c == '-',
			_ => c.is_ascii_hexdigit(),
		})
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::{error::TransportError, http::TransportFuture, operation::DefaultErrorClassifier};

	const POOL_ID: &str = "us-east-1:12345678-1234-1234-1234-123456789012";

	struct NoTransport;
	impl HttpTransport for NoTransport {
		fn send(&self, _: crate::http::WireRequest) -> TransportFuture<'_> {
			Box::pin(async { Err(TransportError::Io(std::io::ErrorKind::NotConnected.into())) })
		}
	}

	#[test]
	fn pool_id_is_validated() {
		let provider = CognitoIdentityProvider::new(POOL_ID, Arc::new(NoTransport))
			.expect("Valid pool id should be accepted.");

		assert_eq!(provider.descriptor.region, "us-east-1");
		assert_eq!(
			provider.descriptor.endpoint.as_str(),
			"https://cognito-identity.us-east-1.amazonaws.com/"
		);

		let malformed = [
			"missing-colon",
			"US_EAST:12345678-1234-1234-1234-123456789012",
			"us-east-1:nope",
		];

		for bad in malformed {
			assert!(matches!(
				CognitoIdentityProvider::new(bad, Arc::new(NoTransport)),
				Err(ConfigError::IdentityProvider { provider: "cognito", .. })
			));
		}
	}

	#[test]
	fn endpoint_override_requires_https() {
		let provider = CognitoIdentityProvider::new(POOL_ID, Arc::new(NoTransport))
			.expect("Valid pool id should be accepted.");
		let insecure = Url::parse("http://localhost:8080/").expect("Fixture URL should parse.");

		assert!(matches!(provider.with_endpoint(insecure), Err(ConfigError::Descriptor(_))));
	}

	#[test]
	fn get_id_omits_empty_optionals_and_validates_account() {
		let descriptor = descriptor("us-east-1".into(), None).expect("Descriptor should build.");
		let request = GetId {
			identity_pool_id: POOL_ID.into(),
			account_id: None,
			logins: BTreeMap::new(),
		};
		let payload =
			Operation::serialize(&request, &descriptor).expect("GetId should serialize.");

		assert_eq!(payload.body, format!(r#"{{"IdentityPoolId":"{POOL_ID}"}}"#).into_bytes());

		let short = GetId { account_id: Some("12".into()), ..request };
		let err = Operation::serialize(&short, &descriptor)
			.expect_err("Short account id should fail.");

		assert!(err.has_field("AccountId"));
	}

	#[test]
	fn credentials_decode_epoch_expiration() {
		let response = WireResponse::new(200).with_body(
			r#"{"IdentityId":"id","Credentials":{"AccessKeyId":"ASIA","SecretKey":"s",
			"SessionToken":"t","Expiration":1700000000.5}}"#,
		);
		let request =
			GetCredentialsForIdentity { identity_id: "id".into(), logins: BTreeMap::new() };
		let credentials = request
			.deserialize(&response, &DefaultErrorClassifier)
			.expect("Credentials should decode.");

		assert_eq!(credentials.access_key, "ASIA");
		assert_eq!(credentials.session_token.as_ref().map(|t| t.expose()), Some("t"));
		assert_eq!(credentials.expiration.map(OffsetDateTime::unix_timestamp), Some(1_700_000_000));

		let empty = WireResponse::new(200).with_body(
			r#"{"Credentials":{"AccessKeyId":"","SecretKey":"s","Expiration":1700000000}}"#,
		);
		let err = request
			.deserialize(&empty, &DefaultErrorClassifier)
			.expect_err("Empty access key should fail.");

		assert_eq!(err.kind, ServiceErrorKind::Unknown);
	}
}

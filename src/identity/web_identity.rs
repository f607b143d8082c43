//! Web identity federation through the token service (`AssumeRoleWithWebIdentity`).
//!
//! The request uses the query protocol (form-encoded `POST /`) and the service answers in
//! XML, including for errors.

// std
use std::path::PathBuf;
// crates.io
use time::format_description::well_known::Rfc3339;
// self
use crate::{
	_prelude::*,
	config::{self, ServiceDescriptor},
	credential::{Credentials, Secret},
	error::{ConfigError, IdentityProviderError, ServiceError, ServiceErrorKind, ValidationError},
	http::{HttpTransport, Method, WireResponse},
	identity::{self, IdentityFuture, IdentityProvider},
	operation::{ErrorClassifier, ErrorContext, Operation, Validator, WirePayload, classify},
};

/// Signing name of the token service.
pub const STS_SIGNING_NAME: &str = "sts";
/// Query protocol version of the token service.
pub const STS_VERSION: &str = "2011-06-15";

const NAME: &str = "web-identity";
const DEFAULT_SESSION_NAME: &str = "cloudsign";
const GLOBAL_REGION: &str = "us-east-1";

/// Source of the web identity token presented to the token service.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WebIdentityToken {
	/// Token supplied directly.
	Inline(Secret),
	/// Token read from a file on every refresh (projected service account tokens rotate).
	File(PathBuf),
}
impl WebIdentityToken {
	fn load(&self) -> Result<Secret, IdentityProviderError> {
		let token = match self {
			Self::Inline(token) => token.clone(),
			Self::File(path) => std::fs::read_to_string(path)
				.map(|raw| Secret::new(raw.trim()))
				.map_err(|e| {
					identity::malformed(
						NAME,
						format!("token file `{}` could not be read: {e}", path.display()),
					)
				})?,
		};

		if token.is_empty() {
			return Err(identity::malformed(NAME, "web identity token is empty"));
		}

		Ok(token)
	}
}

/// Assumes a role with a web identity token (OIDC id token, projected service account
/// token, ...).
pub struct WebIdentityProvider {
	role_arn: String,
	session_name: String,
	token: WebIdentityToken,
	duration: Option<Duration>,
	descriptor: ServiceDescriptor,
	transport: Arc<dyn HttpTransport>,
}
impl WebIdentityProvider {
	/// Creates a provider against the global token service endpoint.
	pub fn new(
		role_arn: impl Into<String>,
		token: WebIdentityToken,
		transport: Arc<dyn HttpTransport>,
	) -> Result<Self, ConfigError> {
		let role_arn = role_arn.into();

		if !role_arn.starts_with("arn:") {
			return Err(ConfigError::IdentityProvider {
				provider: NAME,
				reason: format!("role ARN `{role_arn}` must start with `arn:`"),
			});
		}

		Ok(Self {
			role_arn,
			session_name: DEFAULT_SESSION_NAME.into(),
			token,
			duration: None,
			descriptor: descriptor(GLOBAL_REGION, sts_endpoint(None))?,
			transport,
		})
	}

	/// Overrides the role session name (defaults to `cloudsign`).
	pub fn with_session_name(mut self, session_name: impl Into<String>) -> Self {
		self.session_name = session_name.into();

		self
	}

	/// Requests credentials valid for `duration` (the service accepts 15 minutes to 12
	/// hours).
	pub fn with_duration(mut self, duration: Duration) -> Self {
		self.duration = Some(duration);

		self
	}

	/// Switches to the regional endpoint of `region`.
	pub fn with_region(mut self, region: impl Into<String>) -> Result<Self, ConfigError> {
		let region = region.into();

		config::validate_region(&region)?;

		let endpoint = sts_endpoint(Some(&region));

		self.descriptor = descriptor(&region, endpoint)?;

		Ok(self)
	}

	/// Overrides the endpoint (must be HTTPS).
	pub fn with_endpoint(mut self, endpoint: Url) -> Result<Self, ConfigError> {
		let region = self.descriptor.region.clone();

		self.descriptor = descriptor(&region, Ok(endpoint))?;

		Ok(self)
	}

	/// Endpoint requests are sent to.
	pub fn endpoint(&self) -> &Url {
		&self.descriptor.endpoint
	}

	async fn fetch(&self) -> Result<Credentials, IdentityProviderError> {
		let request = AssumeRoleWithWebIdentity {
			role_arn: self.role_arn.clone(),
			role_session_name: self.session_name.clone(),
			web_identity_token: self.token.load()?,
			duration_seconds: self.duration.map(|d| d.whole_seconds()),
		};

		identity::call_unsigned(NAME, &*self.transport, &self.descriptor, &request).await
	}
}
impl IdentityProvider for WebIdentityProvider {
	fn name(&self) -> &'static str {
		NAME
	}

	fn fetch_or_refresh(&self) -> IdentityFuture<'_> {
		Box::pin(self.fetch())
	}
}
impl Debug for WebIdentityProvider {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("WebIdentityProvider")
			.field("role_arn", &self.role_arn)
			.field("session_name", &self.session_name)
			.field("token", &self.token)
			.field("duration", &self.duration)
			.field("endpoint", &self.descriptor.endpoint.as_str())
			.finish()
	}
}

/// `AssumeRoleWithWebIdentity` request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AssumeRoleWithWebIdentity {
	/// Role to assume.
	pub role_arn: String,
	/// Session name recorded by the service.
	pub role_session_name: String,
	/// Token issued by the external identity provider.
	pub web_identity_token: Secret,
	/// Requested credential lifetime in seconds.
	pub duration_seconds: Option<i64>,
}
impl Operation for AssumeRoleWithWebIdentity {
	type Output = Credentials;

	fn name(&self) -> &'static str {
		"AssumeRoleWithWebIdentity"
	}

	fn serialize(&self, _: &ServiceDescriptor) -> Result<WirePayload, ValidationError> {
		let session_ok = self
			.role_session_name
			.chars()
			.all(|c| c.is_ascii_alphanumeric() || "+=,.@-_".contains(c));
		let mut validator = Validator::new(self.name())
			.length("RoleArn", &self.role_arn, 20, 2048)
			.length("RoleSessionName", &self.role_session_name, 2, 64)
			.check("RoleSessionName", session_ok, "may only contain [A-Za-z0-9+=,.@_-]")
			.length("WebIdentityToken", self.web_identity_token.expose(), 4, 20_000);

		if let Some(duration) = self.duration_seconds {
			validator = validator.range("DurationSeconds", duration, 900, 43_200);
		}

		validator.finish()?;

		let mut form = form_urlencoded::Serializer::new(String::new());

		form.append_pair("Action", self.name())
			.append_pair("Version", STS_VERSION)
			.append_pair("RoleArn", &self.role_arn)
			.append_pair("RoleSessionName", &self.role_session_name)
			.append_pair("WebIdentityToken", self.web_identity_token.expose());

		if let Some(duration) = self.duration_seconds {
			form.append_pair("DurationSeconds", &duration.to_string());
		}

		Ok(WirePayload::new(Method::Post, "/")
			.with_header("content-type", "application/x-www-form-urlencoded")
			.with_body(form.finish()))
	}

	fn deserialize(
		&self,
		response: &WireResponse,
		classifier: &dyn ErrorClassifier,
	) -> Result<Credentials, ServiceError> {
		if !response.is_success() {
			return Err(xml_error(response, classifier));
		}

		let invalid = |reason: String| {
			ServiceError::new(ServiceErrorKind::Unknown)
				.with_status(response.status)
				.with_message(reason)
				.with_raw_body(response.body.clone())
		};
		let body = std::str::from_utf8(&response.body)
			.map_err(|e| invalid(format!("Response body is not UTF-8: {e}")))?;
		let parsed: AssumeRoleWithWebIdentityResponse = quick_xml::de::from_str(body)
			.map_err(|e| invalid(format!("Response body could not be decoded: {e}")))?;
		let wire = parsed.result.credentials;
		let expiration = OffsetDateTime::parse(&wire.expiration, &Rfc3339).map_err(|e| {
			invalid(format!("Credential expiration `{}` is invalid: {e}", wire.expiration))
		})?;

		Credentials::builder(wire.access_key_id)
			.secret_key(wire.secret_access_key)
			.session_token(wire.session_token)
			.expiration(expiration)
			.build()
			.map_err(|e| invalid(e.to_string()))
	}
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AssumeRoleWithWebIdentityResponse {
	#[serde(rename = "AssumeRoleWithWebIdentityResult")]
	result: AssumeRoleWithWebIdentityResult,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AssumeRoleWithWebIdentityResult {
	credentials: WireCredentials,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireCredentials {
	access_key_id: String,
	secret_access_key: String,
	session_token: String,
	expiration: String,
}
impl Debug for WireCredentials {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("WireCredentials")
			.field("access_key_id", &self.access_key_id)
			.field("expiration", &self.expiration)
			.finish_non_exhaustive()
	}
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct XmlErrorResponse {
	error: XmlError,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct XmlError {
	code: Option<String>,
	message: Option<String>,
}

/// Classifies an `<ErrorResponse>` body; anything else goes through the generic path.
fn xml_error(response: &WireResponse, classifier: &dyn ErrorClassifier) -> ServiceError {
	let parsed = std::str::from_utf8(&response.body)
		.ok()
		.and_then(|body| quick_xml::de::from_str::<XmlErrorResponse>(body).ok());
	let Some(XmlErrorResponse { error }) = parsed else {
		return classify::error_from_response(response, classifier);
	};
	let mut ctx = ErrorContext::new()
		.with_http_status(response.status)
		.with_body_preview(response.body_preview());
	let mut err = ServiceError::new(ServiceErrorKind::Unknown)
		.with_status(response.status)
		.with_retry_after(response.retry_after());

	if let Some(code) = error.code {
		ctx = ctx.with_code(code.clone());
		err = err.with_code(code);
	}
	if let Some(message) = error.message {
		ctx = ctx.with_message(message.clone());
		err = err.with_message(message);
	}

	err.kind = classifier.classify(&ctx);

	err
}

fn sts_endpoint(region: Option<&str>) -> Result<Url, url::ParseError> {
	match region {
		Some(region) if region.starts_with("cn-") =>
			Url::parse(&format!("https://sts.{region}.amazonaws.com.cn/")),
		Some(region) => Url::parse(&format!("https://sts.{region}.amazonaws.com/")),
		None => Url::parse("https://sts.amazonaws.com/"),
	}
}

fn descriptor(
	region: &str,
	endpoint: Result<Url, url::ParseError>,
) -> Result<ServiceDescriptor, ConfigError> {
	let endpoint = endpoint.map_err(|e| ConfigError::IdentityProvider {
		provider: NAME,
		reason: format!("endpoint for `{region}` is invalid: {e}"),
	})?;

	Ok(ServiceDescriptor::builder(STS_SIGNING_NAME, region).endpoint(endpoint).build()?)
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::{
		error::TransportError,
		http::{TransportFuture, WireRequest},
		operation::DefaultErrorClassifier,
	};

	const ROLE_ARN: &str = "arn:aws:iam::123456789012:role/web";

	struct NoTransport;
	impl HttpTransport for NoTransport {
		fn send(&self, _: WireRequest) -> TransportFuture<'_> {
			Box::pin(async { Err(TransportError::Io(std::io::ErrorKind::NotConnected.into())) })
		}
	}

	fn request() -> AssumeRoleWithWebIdentity {
		AssumeRoleWithWebIdentity {
			role_arn: ROLE_ARN.into(),
			role_session_name: "session".into(),
			web_identity_token: Secret::new("eyJ0b2tlbiI6dHJ1ZX0"),
			duration_seconds: None,
		}
	}

	fn descriptor_fixture() -> ServiceDescriptor {
		descriptor(GLOBAL_REGION, sts_endpoint(None)).expect("Descriptor should build.")
	}

	#[test]
	fn endpoints_follow_region() {
		let provider = WebIdentityProvider::new(
			ROLE_ARN,
			WebIdentityToken::Inline(Secret::new("token")),
			Arc::new(NoTransport),
		)
		.expect("Provider should build.");

		assert_eq!(provider.endpoint().as_str(), "https://sts.amazonaws.com/");

		let regional = provider.with_region("eu-west-1").expect("Region should be accepted.");

		assert_eq!(regional.endpoint().as_str(), "https://sts.eu-west-1.amazonaws.com/");
		assert_eq!(regional.descriptor.region, "eu-west-1");

		let china = regional.with_region("cn-north-1").expect("Region should be accepted.");

		assert_eq!(china.endpoint().as_str(), "https://sts.cn-north-1.amazonaws.com.cn/");
	}

	#[test]
	fn role_arn_is_checked() {
		let err = WebIdentityProvider::new(
			"role/web",
			WebIdentityToken::Inline(Secret::new("token")),
			Arc::new(NoTransport),
		)
		.expect_err("Bare role names should be rejected.");

		assert!(matches!(err, ConfigError::IdentityProvider { provider: "web-identity", .. }));
	}

	#[test]
	fn request_is_form_encoded() {
		let payload = AssumeRoleWithWebIdentity { duration_seconds: Some(3600), ..request() }
			.serialize(&descriptor_fixture())
			.expect("Request should serialize.");
		let body = String::from_utf8(payload.body).expect("Body should be UTF-8.");

		assert_eq!(payload.method, Method::Post);
		assert!(body.starts_with("Action=AssumeRoleWithWebIdentity&Version=2011-06-15&"));
		assert!(body.contains("RoleArn=arn%3Aaws%3Aiam%3A%3A123456789012%3Arole%2Fweb"));
		assert!(body.ends_with("&DurationSeconds=3600"));

		let err = AssumeRoleWithWebIdentity {
			duration_seconds: Some(60),
			role_session_name: "bad name".into(),
			..request()
		}
		.serialize(&descriptor_fixture())
		.expect_err("Invalid inputs should fail.");

		assert!(err.has_field("DurationSeconds"));
		assert!(err.has_field("RoleSessionName"));
	}

	#[test]
	fn xml_credentials_are_decoded() {
		let response = WireResponse::new(200).with_body(
			r#"<AssumeRoleWithWebIdentityResponse xmlns="https://sts.amazonaws.com/doc/2011-06-15/">
  <AssumeRoleWithWebIdentityResult>
    <SubjectFromWebIdentityToken>subject</SubjectFromWebIdentityToken>
    <Credentials>
      <SessionToken>session-token</SessionToken>
      <SecretAccessKey>secret</SecretAccessKey>
      <Expiration>2030-01-01T00:00:00Z</Expiration>
      <AccessKeyId>ASIAEXAMPLE</AccessKeyId>
    </Credentials>
  </AssumeRoleWithWebIdentityResult>
  <ResponseMetadata><RequestId>id</RequestId></ResponseMetadata>
</AssumeRoleWithWebIdentityResponse>"#,
		);
		let credentials = request()
			.deserialize(&response, &DefaultErrorClassifier)
			.expect("Credentials should decode.");

		assert_eq!(credentials.access_key, "ASIAEXAMPLE");
		assert_eq!(credentials.secret_key.expose(), "secret");
		assert_eq!(
			credentials.expiration,
			Some(time::macros::datetime!(2030-01-01 00:00:00 UTC))
		);
	}

	#[test]
	fn xml_errors_are_classified() {
		let response = WireResponse::new(400).with_body(
			"<ErrorResponse><Error><Type>Sender</Type><Code>InvalidIdentityToken</Code>\
			 <Message>Token is invalid</Message></Error><RequestId>id</RequestId></ErrorResponse>",
		);
		let err = request()
			.deserialize(&response, &DefaultErrorClassifier)
			.expect_err("Error response should fail.");

		assert_eq!(err.kind, ServiceErrorKind::ClientFault);
		assert_eq!(err.code.as_deref(), Some("InvalidIdentityToken"));
		assert_eq!(err.message.as_deref(), Some("Token is invalid"));

		let throttled = WireResponse::new(400).with_body(
			"<ErrorResponse><Error><Code>Throttling</Code><Message>Rate exceeded</Message>\
			 </Error></ErrorResponse>",
		);

		let err = request()
			.deserialize(&throttled, &DefaultErrorClassifier)
			.expect_err("Throttling response should fail.");

		assert_eq!(err.kind, ServiceErrorKind::Throttling);
	}

	#[test]
	fn empty_token_file_is_malformed() {
		let path = std::env::temp_dir().join("cloudsign-empty-web-identity-token");

		std::fs::write(&path, "\n").expect("Token fixture should be written.");

		let err =
			WebIdentityToken::File(path.clone()).load().expect_err("Empty token should fail.");

		assert!(matches!(err, IdentityProviderError::Malformed { .. }));

		let _ = std::fs::remove_file(path);
	}
}

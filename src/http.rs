//! Transport primitives for signed service calls.
//!
//! The module exposes [`HttpTransport`] alongside the crate-owned [`WireRequest`] and
//! [`WireResponse`] shapes so downstream crates can plug in custom HTTP stacks without
//! depending on reqwest. Transports report network-level failures as [`TransportError`];
//! every response that carries a status code (including 4xx/5xx) is returned as a
//! [`WireResponse`] so the deserializer can classify it.

// std
#[cfg(feature = "reqwest")] use std::ops::Deref;
// crates.io
use time::format_description::well_known::Rfc2822;
// self
use crate::{_prelude::*, error::TransportError};

/// Boxed future returned by [`HttpTransport::send`].
pub type TransportFuture<'a> =
	Pin<Box<dyn Future<Output = Result<WireResponse, TransportError>> + 'a + Send>>;

/// Abstraction over HTTP stacks capable of executing signed requests.
///
/// Implementations must be `Send + Sync + 'static` so one transport can be shared by a
/// service client and the identity providers feeding it. The returned future must be
/// `Send`, letting callers box and move pipeline futures across executors.
pub trait HttpTransport
where
	Self: 'static + Send + Sync,
{
	/// Executes a single request. Redirects must not be followed.
	fn send(&self, request: WireRequest) -> TransportFuture<'_>;
}

/// HTTP methods used by the pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
	/// `GET`
	Get,
	/// `HEAD`
	Head,
	/// `POST`
	Post,
	/// `PUT`
	Put,
	/// `PATCH`
	Patch,
	/// `DELETE`
	Delete,
}
impl Method {
	/// Returns the upper-case wire token.
	pub const fn as_str(self) -> &'static str {
		match self {
			Method::Get => "GET",
			Method::Head => "HEAD",
			Method::Post => "POST",
			Method::Put => "PUT",
			Method::Patch => "PATCH",
			Method::Delete => "DELETE",
		}
	}
}
impl Display for Method {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Fully assembled request handed to a transport.
#[derive(Clone, PartialEq, Eq)]
pub struct WireRequest {
	/// HTTP method.
	pub method: Method,
	/// Absolute request URL, query included.
	pub url: Url,
	/// Header name/value pairs, already signed.
	pub headers: Vec<(String, String)>,
	/// Raw request body.
	pub body: Vec<u8>,
}
impl WireRequest {
	/// Returns the first header matching `name` case-insensitively.
	pub fn header(&self, name: &str) -> Option<&str> {
		self.headers
			.iter()
			.find(|(key, _)| key.eq_ignore_ascii_case(name))
			.map(|(_, value)| value.as_str())
	}
}
impl Debug for WireRequest {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		let headers = self
			.headers
			.iter()
			.map(|(name, value)| {
				let value = if is_sensitive_header(name) { "<redacted>" } else { value.as_str() };

				(name.as_str(), value)
			})
			.collect::<Vec<_>>();

		f.debug_struct("WireRequest")
			.field("method", &self.method)
			.field("url", &self.url.as_str())
			.field("headers", &headers)
			.field("body_len", &self.body.len())
			.finish()
	}
}

/// Response returned by a transport: status, lower-cased headers, and the raw body.
#[derive(Clone, PartialEq, Eq)]
pub struct WireResponse {
	/// HTTP status code.
	pub status: u16,
	/// Headers keyed by lower-case name; repeated headers are joined with `,`.
	pub headers: BTreeMap<String, String>,
	/// Raw response body.
	pub body: Vec<u8>,
}
impl WireResponse {
	const BODY_PREVIEW_LIMIT: usize = 256;

	/// Creates an empty response with the provided status.
	pub fn new(status: u16) -> Self {
		Self { status, headers: BTreeMap::new(), body: Vec::new() }
	}

	/// Adds a header, joining repeated names with `,`.
	pub fn with_header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
		self.insert_header(name.as_ref(), value.into());

		self
	}

	/// Replaces the body.
	pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
		self.body = body.into();

		self
	}

	/// Returns `true` for 2xx statuses.
	pub fn is_success(&self) -> bool {
		(200..300).contains(&self.status)
	}

	/// Looks a header up case-insensitively.
	pub fn header(&self, name: &str) -> Option<&str> {
		self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
	}

	/// Parses the `Retry-After` header, if present and valid.
	pub fn retry_after(&self) -> Option<Duration> {
		self.header("retry-after").and_then(|raw| parse_retry_after(raw, OffsetDateTime::now_utc()))
	}

	/// Returns a lossy, truncated UTF-8 rendering of the body for diagnostics.
	pub fn body_preview(&self) -> String {
		let body = String::from_utf8_lossy(&self.body);

		if body.chars().count() <= Self::BODY_PREVIEW_LIMIT {
			return body.into_owned();
		}

		let mut preview = body.chars().take(Self::BODY_PREVIEW_LIMIT).collect::<String>();

		preview.push('…');

		preview
	}

	fn insert_header(&mut self, name: &str, value: String) {
		self.headers
			.entry(name.to_ascii_lowercase())
			.and_modify(|existing| {
				existing.push(',');
				existing.push_str(&value);
			})
			.or_insert(value);
	}
}
impl Debug for WireResponse {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("WireResponse")
			.field("status", &self.status)
			.field("headers", &self.headers)
			.field("body_len", &self.body.len())
			.finish()
	}
}

/// Parses a `Retry-After` value expressed as delta-seconds or an RFC 2822 date.
///
/// Dates in the past yield `None`.
pub fn parse_retry_after(raw: &str, now: OffsetDateTime) -> Option<Duration> {
	let raw = raw.trim();

	if let Ok(secs) = raw.parse::<u32>() {
		return Some(Duration::seconds(secs.into()));
	}
	if let Ok(moment) = OffsetDateTime::parse(raw, &Rfc2822) {
		let delta = moment - now;

		if delta.is_positive() {
			return Some(delta);
		}
	}

	None
}

fn is_sensitive_header(name: &str) -> bool {
	name.eq_ignore_ascii_case("authorization") || name.eq_ignore_ascii_case("x-amz-security-token")
}

/// Thin wrapper around [`ReqwestClient`] so shared HTTP behavior lives in one place.
///
/// Signed requests must not follow redirects: the signature covers the original host
/// and path. [`ReqwestTransport::new`] configures that; callers supplying their own
/// client through [`ReqwestTransport::with_client`] should disable redirects as well.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug)]
pub struct ReqwestTransport(pub ReqwestClient);
#[cfg(feature = "reqwest")]
impl ReqwestTransport {
	/// Builds a transport around a client with redirects disabled.
	pub fn new() -> Result<Self, crate::error::ConfigError> {
		let client = ReqwestClient::builder().redirect(reqwest::redirect::Policy::none()).build()?;

		Ok(Self(client))
	}

	/// Wraps an existing reqwest [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}

	fn method(method: Method) -> reqwest::Method {
		match method {
			Method::Get => reqwest::Method::GET,
			Method::Head => reqwest::Method::HEAD,
			Method::Post => reqwest::Method::POST,
			Method::Put => reqwest::Method::PUT,
			Method::Patch => reqwest::Method::PATCH,
			Method::Delete => reqwest::Method::DELETE,
		}
	}
}
#[cfg(feature = "reqwest")]
impl AsRef<ReqwestClient> for ReqwestTransport {
	fn as_ref(&self) -> &ReqwestClient {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl Deref for ReqwestTransport {
	type Target = ReqwestClient;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl HttpTransport for ReqwestTransport {
	fn send(&self, request: WireRequest) -> TransportFuture<'_> {
		Box::pin(async move {
			let WireRequest { method, url, headers, body } = request;
			let mut builder = self.0.request(Self::method(method), url);

			for (name, value) in headers {
				builder = builder.header(name, value);
			}

			let response = builder.body(body).send().await?;
			let mut wire = WireResponse::new(response.status().as_u16());

			for (name, value) in response.headers() {
				// Non-visible-ASCII values are not meaningful to the deserializer.
				if let Ok(value) = value.to_str() {
					wire.insert_header(name.as_str(), value.to_owned());
				}
			}

			wire.body = response.bytes().await?.to_vec();

			Ok(wire)
		})
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;

	#[test]
	fn retry_after_accepts_seconds_and_dates() {
		let now = macros::datetime!(2025-01-01 00:00 UTC);

		assert_eq!(parse_retry_after(" 7 ", now), Some(Duration::seconds(7)));
		assert_eq!(
			parse_retry_after("Wed, 01 Jan 2025 00:00:30 +0000", now),
			Some(Duration::seconds(30))
		);
		assert_eq!(parse_retry_after("Tue, 31 Dec 2024 23:59:00 +0000", now), None);
		assert_eq!(parse_retry_after("soon", now), None);
	}

	#[test]
	fn response_headers_are_case_insensitive_and_joined() {
		let response = WireResponse::new(429)
			.with_header("Retry-After", "3")
			.with_header("X-Amzn-ErrorType", "ThrottlingException")
			.with_header("x-amzn-errortype", "extra");

		assert_eq!(response.header("retry-after"), Some("3"));
		assert_eq!(response.header("X-AMZN-ERRORTYPE"), Some("ThrottlingException,extra"));
		assert_eq!(response.retry_after(), Some(Duration::seconds(3)));
		assert!(!response.is_success());
	}

	#[test]
	fn body_preview_truncates_long_bodies() {
		let response = WireResponse::new(500).with_body("x".repeat(300));
		let preview = response.body_preview();

		assert_eq!(preview.chars().count(), 257);
		assert!(preview.ends_with('…'));
	}

	#[test]
	fn request_debug_redacts_credentials() {
		let request = WireRequest {
			method: Method::Post,
			url: Url::parse("https://example.amazonaws.com/").expect("Fixture URL should parse."),
			headers: vec![
				("Authorization".into(), "AWS4-HMAC-SHA256 Credential=AKID/...".into()),
				("x-amz-security-token".into(), "session".into()),
				("x-amz-date".into(), "20150830T123600Z".into()),
			],
			body: Vec::new(),
		};
		let rendered = format!("{request:?}");

		assert!(!rendered.contains("AKID"));
		assert!(!rendered.contains("session"));
		assert!(rendered.contains("20150830T123600Z"));
		assert_eq!(request.header("AUTHORIZATION").map(|v| v.starts_with("AWS4")), Some(true));
	}
}

//! Per-attempt signing inputs.
//!
//! A [`SigningContext`] is built fresh for every attempt and never shared across
//! requests. It owns a snapshot of the credentials taken when it was built, so a
//! concurrent refresh cannot change the key material halfway through a signature.

// crates.io
use sha2::{Digest, Sha256};
use time::{format_description::BorrowedFormatItem, macros::format_description};
// self
use crate::{_prelude::*, credential::Credentials, http::Method};

/// Header carrying the request timestamp.
pub const X_AMZ_DATE: &str = "x-amz-date";
/// Header carrying the session token of temporary credentials.
pub const X_AMZ_SECURITY_TOKEN: &str = "x-amz-security-token";
/// Hex SHA-256 of an empty payload.
pub const EMPTY_PAYLOAD_HASH: &str =
	"e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

/// Immutable canonicalization inputs for one signed attempt.
#[derive(Clone, PartialEq, Eq)]
pub struct SigningContext {
	method: Method,
	canonical_path: String,
	query: Vec<(String, String)>,
	headers: BTreeMap<String, String>,
	payload_hash: String,
	timestamp: OffsetDateTime,
	credentials: Option<Arc<Credentials>>,
}
impl SigningContext {
	/// Starts a builder for the provided method and path.
	pub fn builder(method: Method, canonical_path: impl Into<String>) -> SigningContextBuilder {
		SigningContextBuilder::new(method, canonical_path.into())
	}

	/// HTTP method.
	pub fn method(&self) -> Method {
		self.method
	}

	/// Request path as supplied by the serializer (not yet URI-encoded).
	pub fn canonical_path(&self) -> &str {
		&self.canonical_path
	}

	/// Query parameters in insertion order.
	pub fn query(&self) -> &[(String, String)] {
		&self.query
	}

	/// Headers keyed by lower-case name, values trimmed with inner whitespace collapsed.
	pub fn headers(&self) -> &BTreeMap<String, String> {
		&self.headers
	}

	/// Hex SHA-256 of the payload.
	pub fn payload_hash(&self) -> &str {
		&self.payload_hash
	}

	/// Signing instant, in UTC.
	pub fn timestamp(&self) -> OffsetDateTime {
		self.timestamp
	}

	/// Credential snapshot captured when the context was built.
	pub fn credentials(&self) -> Option<&Arc<Credentials>> {
		self.credentials.as_ref()
	}
}
impl Debug for SigningContext {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		let headers = self
			.headers
			.iter()
			.map(|(name, value)| {
				let value =
					if name == X_AMZ_SECURITY_TOKEN { "<redacted>" } else { value.as_str() };

				(name.as_str(), value)
			})
			.collect::<Vec<_>>();

		f.debug_struct("SigningContext")
			.field("method", &self.method)
			.field("canonical_path", &self.canonical_path)
			.field("query", &self.query)
			.field("headers", &headers)
			.field("payload_hash", &self.payload_hash)
			.field("timestamp", &self.timestamp)
			.field("credentials", &self.credentials)
			.finish()
	}
}

/// Builder for [`SigningContext`].
#[derive(Clone, Debug)]
pub struct SigningContextBuilder {
	method: Method,
	canonical_path: String,
	query: Vec<(String, String)>,
	headers: BTreeMap<String, String>,
	payload_hash: Option<String>,
	timestamp: Option<OffsetDateTime>,
	credentials: Option<Arc<Credentials>>,
}
impl SigningContextBuilder {
	fn new(method: Method, canonical_path: String) -> Self {
		Self {
			method,
			canonical_path,
			query: Vec::new(),
			headers: BTreeMap::new(),
			payload_hash: None,
			timestamp: None,
			credentials: None,
		}
	}

	/// Appends a query parameter.
	pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
		self.query.push((key.into(), value.into()));

		self
	}

	/// Appends several query parameters.
	pub fn queries<I, K, V>(mut self, pairs: I) -> Self
	where
		I: IntoIterator<Item = (K, V)>,
		K: Into<String>,
		V: Into<String>,
	{
		self.query.extend(pairs.into_iter().map(|(k, v)| (k.into(), v.into())));

		self
	}

	/// Adds a header. Names are case-insensitive; repeated names are joined with `,`.
	pub fn header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Self {
		let value = normalize_header_value(value.as_ref());

		self.headers
			.entry(name.as_ref().to_ascii_lowercase())
			.and_modify(|existing| {
				existing.push(',');
				existing.push_str(&value);
			})
			.or_insert(value);

		self
	}

	/// Sets the `host` header from the endpoint authority.
	pub fn host(mut self, host: impl Into<String>) -> Self {
		self.headers.insert("host".into(), host.into());

		self
	}

	/// Hashes the provided payload. Only the digest is retained.
	pub fn payload(mut self, body: &[u8]) -> Self {
		self.payload_hash = Some(hex::encode(Sha256::digest(body)));

		self
	}

	/// Uses a precomputed hex SHA-256 payload hash.
	pub fn payload_hash(mut self, hash: impl Into<String>) -> Self {
		self.payload_hash = Some(hash.into());

		self
	}

	/// Sets the signing instant (defaults to the current clock).
	pub fn timestamp(mut self, timestamp: OffsetDateTime) -> Self {
		self.timestamp = Some(timestamp);

		self
	}

	/// Captures the credential snapshot used for this attempt.
	pub fn credentials(mut self, credentials: Arc<Credentials>) -> Self {
		self.credentials = Some(credentials);

		self
	}

	/// Finalizes the context, inserting `x-amz-date` and, for temporary credentials,
	/// `x-amz-security-token`.
	pub fn build(self) -> SigningContext {
		let Self {
			method,
			canonical_path,
			query,
			mut headers,
			payload_hash,
			timestamp,
			credentials,
		} = self;
		let timestamp =
			timestamp.unwrap_or_else(OffsetDateTime::now_utc).to_offset(time::UtcOffset::UTC);

		headers.insert(X_AMZ_DATE.into(), format_iso8601(timestamp));

		if let Some(token) = credentials.as_ref().and_then(|c| c.session_token.as_ref()) {
			headers.insert(X_AMZ_SECURITY_TOKEN.into(), token.expose().to_owned());
		}

		SigningContext {
			method,
			canonical_path,
			query,
			headers,
			payload_hash: payload_hash.unwrap_or_else(|| EMPTY_PAYLOAD_HASH.into()),
			timestamp,
			credentials,
		}
	}
}

const ISO8601: &[BorrowedFormatItem] =
	format_description!("[year][month][day]T[hour][minute][second]Z");
const DATE: &[BorrowedFormatItem] = format_description!("[year][month][day]");

/// Formats `20150830T123600Z`.
pub(crate) fn format_iso8601(t: OffsetDateTime) -> String {
	format_utc(t, ISO8601)
}

/// Formats `20150830`.
pub(crate) fn format_date(t: OffsetDateTime) -> String {
	format_utc(t, DATE)
}

fn format_utc(t: OffsetDateTime, format: &[BorrowedFormatItem]) -> String {
	// Only calendar and clock components are used; a UTC timestamp always has them.
	t.to_offset(time::UtcOffset::UTC).format(format).expect("Timestamp must be formattable.")
}

fn normalize_header_value(value: &str) -> String {
	value.split_whitespace().collect::<Vec<_>>().join(" ")
}

//! HMAC-SHA256 canonical request signer (`AWS4-HMAC-SHA256`).

// crates.io
use hmac::{Hmac, Mac};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};
use sha2::{Digest, Sha256};
// self
use crate::{
	_prelude::*,
	sign::{RequestSigner, SignatureHeaderValue, SigningContext, context},
};

/// Path encode set: every byte except unreserved characters and `/`.
pub static URI_ENCODE_SET: AsciiSet =
	NON_ALPHANUMERIC.remove(b'/').remove(b'-').remove(b'.').remove(b'_').remove(b'~');
/// Query encode set: every byte except unreserved characters.
pub static QUERY_ENCODE_SET: AsciiSet =
	NON_ALPHANUMERIC.remove(b'-').remove(b'.').remove(b'_').remove(b'~');

const ALGORITHM: &str = "AWS4-HMAC-SHA256";

/// Signer bound to one service signing name and region.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigV4Signer {
	service: String,
	region: String,
}
impl SigV4Signer {
	/// Creates a signer for the provided service signing name and region.
	pub fn new(service: impl Into<String>, region: impl Into<String>) -> Self {
		Self { service: service.into(), region: region.into() }
	}

	/// Service signing name.
	pub fn service(&self) -> &str {
		&self.service
	}

	/// Signing region.
	pub fn region(&self) -> &str {
		&self.region
	}

	/// Renders the canonical request:
	///
	/// ```text
	/// <METHOD>
	/// <encoded path>
	/// <sorted encoded query>
	/// <name:value lines, sorted by name>
	///
	/// <signed header names joined by ';'>
	/// <payload hash>
	/// ```
	pub fn canonical_request(&self, context: &SigningContext) -> String {
		let mut canonical = String::with_capacity(256);

		canonical.push_str(context.method().as_str());
		canonical.push('\n');
		canonical.push_str(&canonical_uri(context.canonical_path()));
		canonical.push('\n');
		canonical.push_str(&canonical_query(context.query()));
		canonical.push('\n');

		// BTreeMap keys are lower-case, so iteration order is the case-insensitive sort.
		for (name, value) in context.headers() {
			canonical.push_str(name);
			canonical.push(':');
			canonical.push_str(value);
			canonical.push('\n');
		}

		canonical.push('\n');
		canonical.push_str(&signed_headers(context));
		canonical.push('\n');
		canonical.push_str(context.payload_hash());

		canonical
	}

	/// Renders the string to sign: algorithm, timestamp, scope, and the hashed canonical
	/// request, one per line.
	pub fn string_to_sign(&self, context: &SigningContext) -> String {
		let hashed_request = hex::encode(Sha256::digest(self.canonical_request(context)));

		format!(
			"{ALGORITHM}\n{}\n{}\n{hashed_request}",
			context::format_iso8601(context.timestamp()),
			self.scope(context.timestamp())
		)
	}

	fn scope(&self, timestamp: OffsetDateTime) -> String {
		format!("{}/{}/{}/aws4_request", context::format_date(timestamp), self.region, self.service)
	}

	fn signing_key(&self, secret: &str, timestamp: OffsetDateTime) -> Vec<u8> {
		let date = hmac_sha256(format!("AWS4{secret}").as_bytes(), context::format_date(timestamp));
		let region = hmac_sha256(&date, &self.region);
		let service = hmac_sha256(&region, &self.service);

		hmac_sha256(&service, "aws4_request")
	}
}
impl RequestSigner for SigV4Signer {
	fn sign(&self, context: &SigningContext) -> Result<SignatureHeaderValue> {
		let credentials = context.credentials().ok_or(Error::MissingCredentials)?;

		if credentials.is_expired_at(context.timestamp()) {
			return Err(Error::StaleCredentials {
				expired_at: credentials.expiration.unwrap_or(context.timestamp()),
			});
		}

		let key = self.signing_key(credentials.secret_key.expose(), context.timestamp());
		let signature = hex::encode(hmac_sha256(&key, self.string_to_sign(context)));

		Ok(SignatureHeaderValue::new(format!(
			"{ALGORITHM} Credential={}/{}, SignedHeaders={}, Signature={signature}",
			credentials.access_key,
			self.scope(context.timestamp()),
			signed_headers(context),
		)))
	}
}

/// Encodes the request path, collapsing an empty path to `/`.
pub fn canonical_uri(path: &str) -> String {
	if path.is_empty() {
		return "/".into();
	}

	let decoded = percent_decode_str(path).decode_utf8_lossy();

	utf8_percent_encode(&decoded, &URI_ENCODE_SET).to_string()
}

/// Encodes every key and value, then sorts by key and value.
pub fn canonical_query(query: &[(String, String)]) -> String {
	let mut encoded = query
		.iter()
		.map(|(k, v)| {
			(
				utf8_percent_encode(k, &QUERY_ENCODE_SET).to_string(),
				utf8_percent_encode(v, &QUERY_ENCODE_SET).to_string(),
			)
		})
		.collect::<Vec<_>>();

	encoded.sort();

	encoded.into_iter().map(|(k, v)| format!("{k}={v}")).collect::<Vec<_>>().join("&")
}

fn signed_headers(context: &SigningContext) -> String {
	context.headers().keys().map(String::as_str).collect::<Vec<_>>().join(";")
}

fn hmac_sha256(key: &[u8], content: impl AsRef<[u8]>) -> Vec<u8> {
	// HMAC accepts keys of any length; `new_from_slice` only fails for fixed-size MACs.
	let mut mac =
		Hmac::<Sha256>::new_from_slice(key).expect("HMAC-SHA256 must accept any key length.");

	mac.update(content.as_ref());

	mac.finalize().into_bytes().to_vec()
}

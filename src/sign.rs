//! Request signing: canonicalization inputs ([`SigningContext`]) and signers.

pub mod context;
pub mod v4;

pub use context::*;
pub use v4::*;

// self
use crate::_prelude::*;

/// Computes a signature header value for one attempt.
///
/// Implementations must be pure functions of the provided context: identical contexts
/// produce identical output, so a retried attempt only differs by its fresh timestamp.
pub trait RequestSigner
where
	Self: Send + Sync,
{
	/// Signs the context, failing with [`Error::MissingCredentials`] when it carries no
	/// credential snapshot and [`Error::StaleCredentials`] when the snapshot is expired at
	/// the context timestamp.
	fn sign(&self, context: &SigningContext) -> Result<SignatureHeaderValue>;
}

/// Value placed in the `authorization` header of a signed request.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct SignatureHeaderValue(String);
impl SignatureHeaderValue {
	/// Wraps a rendered header value.
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into())
	}

	/// Returns the header value.
	pub fn as_str(&self) -> &str {
		&self.0
	}

	/// Returns the trailing hex signature, if the value carries one.
	pub fn signature(&self) -> Option<&str> {
		self.0.rsplit_once("Signature=").map(|(_, signature)| signature)
	}

	/// Consumes the wrapper and returns the owned header value.
	pub fn into_string(self) -> String {
		self.0
	}
}
impl Debug for SignatureHeaderValue {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("SignatureHeaderValue").field(&self.0).finish()
	}
}
impl Display for SignatureHeaderValue {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.0)
	}
}

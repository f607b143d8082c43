//! Immutable credential records, lifecycle helpers, and builders.

// self
use crate::{_prelude::*, credential::secret::Secret};

/// Current lifecycle status for a credential record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CredentialStatus {
	/// Credentials can be used for signing.
	Active,
	/// Credentials reached their expiration instant and must be refreshed.
	Expired,
}

/// Errors produced by [`CredentialsBuilder`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum CredentialsBuilderError {
	/// Issued when no access key was provided.
	#[error("Access key is required.")]
	MissingAccessKey,
	/// Issued when no secret key was provided.
	#[error("Secret key is required.")]
	MissingSecretKey,
}

/// Access/secret/session key material with an optional expiration.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
	/// Public access key identifier.
	pub access_key: String,
	/// Secret signing key; callers must avoid logging it.
	pub secret_key: Secret,
	/// Session token issued alongside temporary credentials.
	pub session_token: Option<Secret>,
	/// Expiration instant for temporary credentials; `None` never expires.
	pub expiration: Option<OffsetDateTime>,
}
impl Credentials {
	/// Returns a builder for the provided access key.
	pub fn builder(access_key: impl Into<String>) -> CredentialsBuilder {
		CredentialsBuilder::new(access_key)
	}

	/// Computes the lifecycle status at a given instant.
	pub fn status_at(&self, instant: OffsetDateTime) -> CredentialStatus {
		match self.expiration {
			Some(expiration) if instant >= expiration => CredentialStatus::Expired,
			_ => CredentialStatus::Active,
		}
	}

	/// Returns `true` if the credentials are expired at the provided instant.
	pub fn is_expired_at(&self, instant: OffsetDateTime) -> bool {
		matches!(self.status_at(instant), CredentialStatus::Expired)
	}

	/// Returns `true` if the credentials are expired relative to the current clock.
	pub fn is_expired(&self) -> bool {
		self.is_expired_at(OffsetDateTime::now_utc())
	}

	/// Returns `true` if the credentials expire before `instant + window`.
	pub fn expires_within(&self, instant: OffsetDateTime, window: Duration) -> bool {
		match self.expiration {
			Some(expiration) => expiration - instant <= window,
			None => false,
		}
	}
}
impl Debug for Credentials {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Credentials")
			.field("access_key", &self.access_key)
			.field("secret_key", &"<redacted>")
			.field("session_token", &self.session_token.as_ref().map(|_| "<redacted>"))
			.field("expiration", &self.expiration)
			.finish()
	}
}

/// Builder for [`Credentials`].
#[derive(Clone, Debug)]
pub struct CredentialsBuilder {
	access_key: String,
	secret_key: Option<Secret>,
	session_token: Option<Secret>,
	expiration: Option<OffsetDateTime>,
}
impl CredentialsBuilder {
	fn new(access_key: impl Into<String>) -> Self {
		Self {
			access_key: access_key.into(),
			secret_key: None,
			session_token: None,
			expiration: None,
		}
	}

	/// Provides the secret key value.
	pub fn secret_key(mut self, secret: impl Into<String>) -> Self {
		self.secret_key = Some(Secret::new(secret));

		self
	}

	/// Provides the session token issued with temporary credentials.
	pub fn session_token(mut self, token: impl Into<String>) -> Self {
		self.session_token = Some(Secret::new(token));

		self
	}

	/// Sets an absolute expiration instant.
	pub fn expiration(mut self, instant: OffsetDateTime) -> Self {
		self.expiration = Some(instant);

		self
	}

	/// Sets a relative expiration from the current clock.
	pub fn expires_in(self, duration: Duration) -> Self {
		self.expiration(OffsetDateTime::now_utc() + duration)
	}

	/// Consumes the builder and produces [`Credentials`].
	pub fn build(self) -> Result<Credentials, CredentialsBuilderError> {
		if self.access_key.is_empty() {
			return Err(CredentialsBuilderError::MissingAccessKey);
		}

		let secret_key = self
			.secret_key
			.filter(|secret| !secret.is_empty())
			.ok_or(CredentialsBuilderError::MissingSecretKey)?;

		Ok(Credentials {
			access_key: self.access_key,
			secret_key,
			session_token: self.session_token.filter(|token| !token.is_empty()),
			expiration: self.expiration,
		})
	}
}

//! Identity providers backed by key material that needs no network round-trip.

// std
use std::env;
// self
use crate::{
	_prelude::*,
	credential::Credentials,
	error::IdentityProviderError,
	identity::{IdentityFuture, IdentityProvider},
};

/// Environment variable holding the access key.
pub const ACCESS_KEY_ENV: &str = "AWS_ACCESS_KEY_ID";
/// Environment variable holding the secret key.
pub const SECRET_KEY_ENV: &str = "AWS_SECRET_ACCESS_KEY";
/// Environment variable holding the optional session token.
pub const SESSION_TOKEN_ENV: &str = "AWS_SESSION_TOKEN";

/// Always hands out the same long-term credentials.
#[derive(Clone, Debug)]
pub struct StaticIdentityProvider {
	credentials: Credentials,
}
impl StaticIdentityProvider {
	/// Wraps fixed credentials.
	pub fn new(credentials: Credentials) -> Self {
		Self { credentials }
	}
}
impl IdentityProvider for StaticIdentityProvider {
	fn name(&self) -> &'static str {
		"static"
	}

	fn fetch_or_refresh(&self) -> IdentityFuture<'_> {
		Box::pin(async move { Ok(self.credentials.clone()) })
	}
}

/// Reads credentials from `AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY`, and
/// `AWS_SESSION_TOKEN` on every refresh.
#[derive(Clone, Debug, Default)]
pub struct EnvIdentityProvider;
impl EnvIdentityProvider {
	const NAME: &str = "env";

	fn resolve<F>(lookup: F) -> Result<Credentials, IdentityProviderError>
	where
		F: Fn(&str) -> Option<String>,
	{
		let missing = |var: &str| IdentityProviderError::Malformed {
			provider: Self::NAME,
			message: format!("`{var}` is not set"),
		};
		let access_key = lookup(ACCESS_KEY_ENV).ok_or_else(|| missing(ACCESS_KEY_ENV))?;
		let secret_key = lookup(SECRET_KEY_ENV).ok_or_else(|| missing(SECRET_KEY_ENV))?;
		let mut builder = Credentials::builder(access_key).secret_key(secret_key);

		if let Some(token) = lookup(SESSION_TOKEN_ENV) {
			builder = builder.session_token(token);
		}

		builder.build().map_err(|e| IdentityProviderError::Malformed {
			provider: Self::NAME,
			message: e.to_string(),
		})
	}
}
impl IdentityProvider for EnvIdentityProvider {
	fn name(&self) -> &'static str {
		Self::NAME
	}

	fn fetch_or_refresh(&self) -> IdentityFuture<'_> {
		Box::pin(async move { Self::resolve(|var| env::var(var).ok()) })
	}
}

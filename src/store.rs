//! Credential store: the single source of truth for the current credentials.
//!
//! Readers receive `Arc<Credentials>` snapshots. [`CredentialStore::refresh`] swaps the
//! whole snapshot under a write lock, so a reader observes either the previous record or
//! the replacement, never a mix of fields from both.

// self
use crate::{_prelude::*, credential::Credentials};

/// Thread-safe holder for the current credential snapshot.
#[derive(Debug, Default)]
pub struct CredentialStore(RwLock<Option<Arc<Credentials>>>);
impl CredentialStore {
	/// Creates a store seeded with the provided credentials.
	pub fn with_credentials(credentials: Credentials) -> Self {
		Self(RwLock::new(Some(Arc::new(credentials))))
	}

	/// Returns the current snapshot.
	pub fn current_credentials(&self) -> Result<Arc<Credentials>> {
		self.0.read().clone().ok_or(Error::CredentialsUnavailable)
	}

	/// Returns the current snapshot, if any, without raising an error.
	pub fn peek(&self) -> Option<Arc<Credentials>> {
		self.0.read().clone()
	}

	/// Atomically replaces the stored credentials and returns the new snapshot.
	pub fn refresh(&self, credentials: Credentials) -> Arc<Credentials> {
		let snapshot = Arc::new(credentials);

		*self.0.write() = Some(snapshot.clone());

		snapshot
	}

	/// Returns `true` when the store is empty or its credentials are expired at `now`.
	pub fn is_expired(&self, now: OffsetDateTime) -> bool {
		self.0.read().as_ref().is_none_or(|credentials| credentials.is_expired_at(now))
	}

	/// Drops the current credentials; subsequent reads fail until the next refresh.
	pub fn invalidate(&self) {
		self.0.write().take();
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::thread;
	// crates.io
	use time::macros;
	// self
	use super::*;

	fn credentials(access: &str, secret: &str) -> Credentials {
		Credentials::builder(access)
			.secret_key(secret)
			.expiration(macros::datetime!(2030-01-01 00:00 UTC))
			.build()
			.expect("Credential fixture should build.")
	}

	#[test]
	fn empty_store_reports_unavailable_and_expired() {
		let store = CredentialStore::default();

		assert!(matches!(store.current_credentials(), Err(Error::CredentialsUnavailable)));
		assert!(store.is_expired(OffsetDateTime::now_utc()));
	}

	#[test]
	fn refresh_replaces_and_invalidate_clears() {
		let store = CredentialStore::with_credentials(credentials("AKID-1", "secret-1"));
		let before = store.current_credentials().expect("Seeded store should have credentials.");
		let after = store.refresh(credentials("AKID-2", "secret-2"));

		assert_eq!(before.access_key, "AKID-1");
		assert_eq!(after.access_key, "AKID-2");
		assert!(Arc::ptr_eq(
			&after,
			&store.current_credentials().expect("Refreshed store should have credentials.")
		));
		assert!(!store.is_expired(macros::datetime!(2029-12-31 23:59 UTC)));
		assert!(store.is_expired(macros::datetime!(2030-01-01 00:00 UTC)));

		store.invalidate();

		assert!(store.peek().is_none());
	}

	#[test]
	fn concurrent_readers_never_observe_mixed_fields() {
		let store = Arc::new(CredentialStore::with_credentials(credentials("AKID-0", "secret-0")));
		let writer = {
			let store = store.clone();

			thread::spawn(move || {
				for i in 1..500 {
					store.refresh(credentials(&format!("AKID-{i}"), &format!("secret-{i}")));
				}
			})
		};
		let readers = (0..4)
			.map(|_| {
				let store = store.clone();

				thread::spawn(move || {
					for _ in 0..500 {
						let snapshot =
							store.current_credentials().expect("Store should stay populated.");
						let suffix = snapshot.access_key.trim_start_matches("AKID-");

						assert_eq!(snapshot.secret_key.expose(), format!("secret-{suffix}"));
					}
				})
			})
			.collect::<Vec<_>>();

		writer.join().expect("Writer thread should not panic.");

		for reader in readers {
			reader.join().expect("Reader thread should not panic.");
		}
	}
}

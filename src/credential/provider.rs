//! Credentials provider: couples the store with an identity provider and coalesces refreshes.
//!
//! At most one refresh is in flight per provider. The first caller that finds the store
//! missing or near expiry creates a shared refresh future; every caller arriving while it
//! is outstanding awaits a clone of that same future. Dropping one waiter only drops its
//! clone, so a cancelled call never aborts a refresh other calls are waiting on.

mod metrics;

pub use metrics::RefreshMetrics;

// std
use std::sync::atomic::{AtomicU64, Ordering};
// crates.io
use futures::future::{BoxFuture, FutureExt, Shared};
// self
use crate::{
	_prelude::*,
	credential::Credentials,
	error::IdentityProviderError,
	identity::IdentityProvider,
	obs::{self, CallKind, CallOutcome, CallSpan},
	store::CredentialStore,
};

type RefreshOutcome = Result<Arc<Credentials>, IdentityProviderError>;
type SharedRefresh = Shared<BoxFuture<'static, RefreshOutcome>>;

#[derive(Default)]
struct InFlight {
	next_id: AtomicU64,
	slot: Mutex<Option<(u64, SharedRefresh)>>,
}

/// Reads credentials from a [`CredentialStore`], refreshing them through an
/// [`IdentityProvider`] when they are missing, expired, or about to expire.
pub struct CredentialsProvider {
	store: Arc<CredentialStore>,
	identity: Arc<dyn IdentityProvider>,
	in_flight: Arc<InFlight>,
	metrics: Arc<RefreshMetrics>,
	refresh_window: Duration,
}
impl CredentialsProvider {
	const DEFAULT_REFRESH_WINDOW: Duration = Duration::seconds(60);

	/// Creates a provider over the shared store and identity source.
	pub fn new(store: Arc<CredentialStore>, identity: Arc<dyn IdentityProvider>) -> Self {
		Self {
			store,
			identity,
			in_flight: Default::default(),
			metrics: Default::default(),
			refresh_window: Self::DEFAULT_REFRESH_WINDOW,
		}
	}

	/// Overrides how long before expiry credentials are refreshed (defaults to 60 seconds).
	pub fn with_refresh_window(mut self, window: Duration) -> Self {
		self.refresh_window = if window.is_negative() { Duration::ZERO } else { window };

		self
	}

	/// Returns the shared credential store.
	pub fn store(&self) -> &Arc<CredentialStore> {
		&self.store
	}

	/// Returns the refresh counters.
	pub fn metrics(&self) -> &Arc<RefreshMetrics> {
		&self.metrics
	}

	/// Returns the identity provider label.
	pub fn identity_name(&self) -> &'static str {
		self.identity.name()
	}

	/// Returns usable credentials, refreshing (coalesced) when the stored snapshot is
	/// missing or expires within the refresh window.
	pub async fn credentials(&self) -> Result<Arc<Credentials>> {
		match self.reusable(None) {
			Some(current) => Ok(current),
			None => self.refresh(None).await,
		}
	}

	/// Forces a refresh after the service rejected `stale` as expired.
	///
	/// When the store already holds a different, unexpired snapshot, another caller has
	/// refreshed in the meantime and that snapshot is returned without a network call.
	pub async fn force_refresh(&self, stale: &Arc<Credentials>) -> Result<Arc<Credentials>> {
		match self.reusable(Some(stale)) {
			Some(current) => Ok(current),
			None => self.refresh(Some(stale)).await,
		}
	}

	// Without `stale`, the snapshot must outlive the refresh window; with it, any unexpired
	// snapshot other than `stale` will do.
	fn reusable(&self, stale: Option<&Arc<Credentials>>) -> Option<Arc<Credentials>> {
		let now = OffsetDateTime::now_utc();

		self.store.peek().filter(|current| match stale {
			Some(stale) => !Arc::ptr_eq(current, stale) && !current.is_expired_at(now),
			None =>
				!current.is_expired_at(now) && !current.expires_within(now, self.refresh_window),
		})
	}

	async fn refresh(&self, stale: Option<&Arc<Credentials>>) -> Result<Arc<Credentials>> {
		let shared = {
			let mut slot = self.in_flight.slot.lock();

			match slot.as_ref() {
				Some((_, shared)) => {
					self.metrics.record_coalesced();

					shared.clone()
				},
				None => {
					// A refresh may have landed between the caller's check and taking the slot.
					if let Some(current) = self.reusable(stale) {
						return Ok(current);
					}

					let id = self.in_flight.next_id.fetch_add(1, Ordering::Relaxed);
					let shared = self.refresh_future(id).boxed().shared();

					*slot = Some((id, shared.clone()));

					shared
				},
			}
		};

		Ok(shared.await?)
	}

	fn refresh_future(&self, id: u64) -> impl Future<Output = RefreshOutcome> + Send + 'static {
		let store = self.store.clone();
		let identity = self.identity.clone();
		let in_flight = self.in_flight.clone();
		let metrics = self.metrics.clone();
		let span = CallSpan::credential_refresh(identity.name());

		span.instrument(async move {
			metrics.record_attempt();
			obs::record_call_outcome(CallKind::CredentialRefresh, CallOutcome::Attempt);

			let outcome = identity.fetch_or_refresh().await.map(|fresh| store.refresh(fresh));

			match &outcome {
				Ok(_) => {
					metrics.record_success();
					obs::record_call_outcome(CallKind::CredentialRefresh, CallOutcome::Success);
				},
				Err(_) => {
					metrics.record_failure();
					obs::record_call_outcome(CallKind::CredentialRefresh, CallOutcome::Failure);
				},
			}

			// Only clear our own entry; a later refresh may already occupy the slot.
			let mut slot = in_flight.slot.lock();

			if slot.as_ref().is_some_and(|(current, _)| *current == id) {
				*slot = None;
			}

			outcome
		})
	}
}
impl Debug for CredentialsProvider {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("CredentialsProvider")
			.field("identity", &self.identity.name())
			.field("refresh_window", &self.refresh_window)
			.field("metrics", &self.metrics)
			.finish()
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::sync::atomic::AtomicUsize;
	// self
	use super::*;
	use crate::identity::IdentityFuture;

	struct CountingIdentity {
		calls: AtomicUsize,
		delay: std::time::Duration,
		fail: bool,
	}
	impl CountingIdentity {
		fn new(delay_ms: u64) -> Self {
			Self {
				calls: AtomicUsize::new(0),
				delay: std::time::Duration::from_millis(delay_ms),
				fail: false,
			}
		}

		fn failing() -> Self {
			Self { fail: true, ..Self::new(10) }
		}
	}
	impl IdentityProvider for CountingIdentity {
		fn name(&self) -> &'static str {
			"counting"
		}

		fn fetch_or_refresh(&self) -> IdentityFuture<'_> {
			Box::pin(async move {
				let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;

				tokio::time::sleep(self.delay).await;

				if self.fail {
					return Err(IdentityProviderError::Network {
						provider: "counting",
						message: "unreachable".into(),
					});
				}

				Ok(Credentials::builder(format!("AKID-{call}"))
					.secret_key("secret")
					.expires_in(Duration::hours(1))
					.build()
					.expect("Credential fixture should build."))
			})
		}
	}

	fn provider(identity: Arc<CountingIdentity>) -> CredentialsProvider {
		CredentialsProvider::new(Arc::new(CredentialStore::default()), identity)
	}

	#[tokio::test(start_paused = true)]
	async fn concurrent_callers_share_one_refresh() {
		let identity = Arc::new(CountingIdentity::new(50));
		let provider = provider(identity.clone());
		let results = futures::future::join_all((0..8).map(|_| provider.credentials())).await;

		assert_eq!(identity.calls.load(Ordering::SeqCst), 1);
		assert_eq!(provider.metrics().attempts(), 1);
		assert_eq!(provider.metrics().coalesced(), 7);

		for result in results {
			assert_eq!(result.expect("Refresh should succeed.").access_key, "AKID-1");
		}

		// Fresh credentials are served from the store.
		provider.credentials().await.expect("Cached credentials should be returned.");

		assert_eq!(identity.calls.load(Ordering::SeqCst), 1);
	}

	#[tokio::test(start_paused = true)]
	async fn force_refresh_skips_when_store_moved_on() {
		let identity = Arc::new(CountingIdentity::new(0));
		let provider = provider(identity.clone());
		let first = provider.credentials().await.expect("Initial refresh should succeed.");
		let second = provider.force_refresh(&first).await.expect("Forced refresh should succeed.");

		assert_eq!(second.access_key, "AKID-2");

		// A caller still holding the first snapshot sees the newer one without a round-trip.
		let third = provider.force_refresh(&first).await.expect("Newer snapshot should win.");

		assert!(Arc::ptr_eq(&second, &third));
		assert_eq!(identity.calls.load(Ordering::SeqCst), 2);
	}

	#[tokio::test(start_paused = true)]
	async fn failures_reach_every_waiter_and_clear_the_slot() {
		let identity = Arc::new(CountingIdentity::failing());
		let provider = provider(identity.clone());
		let (a, b) = futures::join!(provider.credentials(), provider.credentials());

		assert!(matches!(a, Err(Error::IdentityProvider(IdentityProviderError::Network { .. }))));
		assert!(matches!(b, Err(Error::IdentityProvider(IdentityProviderError::Network { .. }))));
		assert_eq!(provider.metrics().failures(), 1);

		// The failed refresh no longer blocks new attempts.
		let _ = provider.credentials().await;

		assert_eq!(identity.calls.load(Ordering::SeqCst), 2);
	}

	#[tokio::test]
	async fn refresh_rechecks_the_store_under_the_slot() {
		let identity = Arc::new(CountingIdentity::new(0));
		let provider = provider(identity.clone());
		let first = provider.credentials().await.expect("Initial refresh should succeed.");

		// Callers that checked before `first` landed still reach `refresh`.
		let reused = provider.refresh(None).await.expect("Fresh snapshot should be reused.");

		assert!(Arc::ptr_eq(&first, &reused));

		let stale = Arc::new(
			Credentials::builder("AKID-stale")
				.secret_key("secret")
				.build()
				.expect("Credential fixture should build."),
		);
		let newer = provider.refresh(Some(&stale)).await.expect("Newer snapshot should win.");

		assert!(Arc::ptr_eq(&first, &newer));
		assert_eq!(identity.calls.load(Ordering::SeqCst), 1);

		// Refreshing away the snapshot that is actually stored still hits the identity.
		let second = provider.refresh(Some(&first)).await.expect("Refresh should succeed.");

		assert_eq!(second.access_key, "AKID-2");
		assert_eq!(identity.calls.load(Ordering::SeqCst), 2);
	}

	#[tokio::test]
	async fn near_expiry_triggers_refresh() {
		let identity = Arc::new(CountingIdentity::new(0));
		let store = Arc::new(CredentialStore::with_credentials(
			Credentials::builder("AKID-old")
				.secret_key("secret")
				.expires_in(Duration::seconds(30))
				.build()
				.expect("Credential fixture should build."),
		));
		let provider = CredentialsProvider::new(store, identity.clone());
		let credentials = provider.credentials().await.expect("Refresh should succeed.");

		assert_eq!(credentials.access_key, "AKID-1");
	}
}

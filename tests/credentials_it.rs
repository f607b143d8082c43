// std
use std::sync::{
	Arc,
	atomic::{AtomicUsize, Ordering},
};
// crates.io
use time::Duration;
// self
use cloudsign::{
	client::ServiceClient,
	config::ServiceDescriptor,
	credential::{Credentials, CredentialsProvider},
	error::{Error, IdentityProviderError, ServiceError, ValidationError},
	http::{HttpTransport, TransportFuture, WireRequest, WireResponse},
	identity::{IdentityFuture, IdentityProvider, StaticIdentityProvider},
	operation::{ErrorClassifier, Operation, WirePayload, json},
	store::CredentialStore,
};

struct SlowIdentity {
	calls: AtomicUsize,
	delay: std::time::Duration,
}
impl SlowIdentity {
	fn new(delay_ms: u64) -> Arc<Self> {
		Arc::new(Self {
			calls: AtomicUsize::new(0),
			delay: std::time::Duration::from_millis(delay_ms),
		})
	}

	fn calls(&self) -> usize {
		self.calls.load(Ordering::SeqCst)
	}
}
impl IdentityProvider for SlowIdentity {
	fn name(&self) -> &'static str {
		"slow"
	}

	fn fetch_or_refresh(&self) -> IdentityFuture<'_> {
		Box::pin(async move {
			self.calls.fetch_add(1, Ordering::SeqCst);
			tokio::time::sleep(self.delay).await;

			Credentials::builder("AKIDSLOW")
				.secret_key("secret")
				.expires_in(Duration::hours(1))
				.build()
				.map_err(|e| IdentityProviderError::Malformed {
					provider: "slow",
					message: e.to_string(),
				})
		})
	}
}

struct OkTransport;
impl HttpTransport for OkTransport {
	fn send(&self, _: WireRequest) -> TransportFuture<'_> {
		Box::pin(async { Ok(WireResponse::new(200)) })
	}
}

struct Ping;
impl Operation for Ping {
	type Output = serde_json::Value;

	fn name(&self) -> &'static str {
		"Ping"
	}

	fn serialize(&self, descriptor: &ServiceDescriptor) -> Result<WirePayload, ValidationError> {
		json::payload(descriptor, self.name(), &serde_json::json!({}))
	}

	fn deserialize(
		&self,
		response: &WireResponse,
		classifier: &dyn ErrorClassifier,
	) -> Result<Self::Output, ServiceError> {
		json::output(response, classifier)
	}
}

fn provider(identity: Arc<SlowIdentity>) -> Arc<CredentialsProvider> {
	Arc::new(CredentialsProvider::new(Arc::new(CredentialStore::default()), identity))
}

fn client(provider: Arc<CredentialsProvider>) -> ServiceClient<OkTransport> {
	let descriptor = ServiceDescriptor::builder("monitoring", "us-west-2")
		.json_protocol("GraniteServiceVersion20100801", "1.0")
		.build()
		.expect("Descriptor fixture should build.");

	ServiceClient::with_transport(descriptor, provider, OkTransport)
}

#[tokio::test(start_paused = true)]
async fn concurrent_invocations_share_one_refresh() {
	let identity = SlowIdentity::new(250);
	let client = client(provider(identity.clone()));
	let results = futures::future::join_all((0..16).map(|_| client.invoke(&Ping))).await;

	assert!(results.iter().all(Result::is_ok));
	assert_eq!(identity.calls(), 1);
	assert_eq!(client.credentials.metrics().coalesced(), 15);
}

#[tokio::test(start_paused = true)]
async fn cancelled_waiter_does_not_abort_the_refresh() {
	let identity = SlowIdentity::new(100);
	let provider = provider(identity.clone());
	// The cancelled call is polled first, so it is the one that starts the refresh.
	let cancelled =
		tokio::time::timeout(std::time::Duration::from_millis(10), provider.credentials());
	let (cancelled, survivor) = tokio::join!(cancelled, provider.credentials());

	assert!(cancelled.is_err());
	let survivor = survivor.expect("Remaining waiter should get the refresh result.");

	assert_eq!(survivor.access_key, "AKIDSLOW");
	assert_eq!(identity.calls(), 1);
	assert!(provider.store().peek().is_some());

	provider.credentials().await.expect("Stored credentials should be served.");

	assert_eq!(identity.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn cancelling_every_waiter_leaves_no_stuck_refresh() {
	let identity = SlowIdentity::new(100);
	let provider = provider(identity.clone());
	let abandoned =
		tokio::time::timeout(std::time::Duration::from_millis(10), provider.credentials()).await;

	assert!(abandoned.is_err());

	// The next caller resumes the abandoned refresh instead of starting another one.
	provider.credentials().await.expect("Later callers should still obtain credentials.");

	assert_eq!(identity.calls(), 1);
	assert!(provider.store().peek().is_some());
}

#[tokio::test]
async fn store_is_shared_between_clients() {
	let store = Arc::new(CredentialStore::default());
	let static_keys = Credentials::builder("AKIDSTATIC")
		.secret_key("secret")
		.build()
		.expect("Credential fixture should build.");
	let provider = Arc::new(CredentialsProvider::new(
		store.clone(),
		Arc::new(StaticIdentityProvider::new(static_keys)),
	));
	let first = client(provider.clone());
	let second = first.clone();

	first.invoke(&Ping).await.expect("First client should succeed.");

	assert_eq!(
		store.current_credentials().expect("Store should be populated.").access_key,
		"AKIDSTATIC"
	);

	store.invalidate();

	assert!(matches!(store.current_credentials(), Err(Error::CredentialsUnavailable)));

	second.invoke(&Ping).await.expect("Second client should repopulate the store.");

	assert_eq!(provider.metrics().attempts(), 2);
}

//! Demonstrates plugging a custom HTTP stack into the signing pipeline.
//!
//! 1. Implement [`HttpTransport`] over crate-owned [`WireRequest`]/[`WireResponse`] values.
//! 2. Hand the transport to [`ServiceClient::with_transport`] together with a credentials
//!    provider.
//! 3. Watch the retry handler absorb throttling responses before the call succeeds.

// std
use std::sync::{
	Arc,
	atomic::{AtomicUsize, Ordering},
};
// crates.io
use color_eyre::Result;
use time::Duration;
// self
use cloudsign::{
	client::ServiceClient,
	config::ServiceDescriptor,
	credential::{Credentials, CredentialsProvider},
	error::{ServiceError, ValidationError},
	http::{HttpTransport, TransportFuture, WireRequest, WireResponse},
	identity::StaticIdentityProvider,
	operation::{ErrorClassifier, Operation, Validator, WirePayload, json},
	retry::RetryPolicy,
	store::CredentialStore,
};

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let descriptor = ServiceDescriptor::builder("dynamodb", "eu-central-1")
		.json_protocol("DynamoDB_20120810", "1.0")
		.build()?;
	let keys = Credentials::builder("AKIDEXAMPLE")
		.secret_key("wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY")
		.build()?;
	let credentials = Arc::new(CredentialsProvider::new(
		Arc::new(CredentialStore::default()),
		Arc::new(StaticIdentityProvider::new(keys)),
	));
	let policy = RetryPolicy::default().with_base_delay(Duration::milliseconds(20));
	let client: ServiceClient<FlakyTransport> =
		ServiceClient::with_transport(descriptor, credentials, FlakyTransport::new(2))
			.with_retry_policy(policy);
	let tables = client.invoke(&ListTables { limit: 10 }).await?;

	println!(
		"Listed {tables:?} after {} attempts.",
		client.transport.attempts.load(Ordering::SeqCst)
	);

	let err = client
		.invoke(&ListTables { limit: 0 })
		.await
		.expect_err("A zero limit never reaches the transport.");

	println!("Validation stopped the second call: {err}");

	Ok(())
}

/// Throttles the first `throttles` requests, then answers with a fixed table list.
struct FlakyTransport {
	throttles: usize,
	attempts: AtomicUsize,
}
impl FlakyTransport {
	fn new(throttles: usize) -> Self {
		Self { throttles, attempts: AtomicUsize::new(0) }
	}
}
impl HttpTransport for FlakyTransport {
	fn send(&self, request: WireRequest) -> TransportFuture<'_> {
		let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);

		println!(
			"Attempt {} signed as {:?}.",
			attempt + 1,
			request.header("authorization").and_then(|value| value.split(", ").nth(2))
		);

		let response = if attempt < self.throttles {
			WireResponse::new(400)
				.with_body(r#"{"__type":"ThrottlingException","message":"Rate exceeded"}"#)
		} else {
			WireResponse::new(200).with_body(r#"{"TableNames":["orders","invoices"]}"#)
		};

		Box::pin(async move { Ok(response) })
	}
}

struct ListTables {
	limit: i64,
}
impl Operation for ListTables {
	type Output = Vec<String>;

	fn name(&self) -> &'static str {
		"ListTables"
	}

	fn serialize(&self, descriptor: &ServiceDescriptor) -> Result<WirePayload, ValidationError> {
		Validator::new(self.name()).range("Limit", self.limit, 1, 100).finish()?;

		json::payload(descriptor, self.name(), &serde_json::json!({ "Limit": self.limit }))
	}

	fn deserialize(
		&self,
		response: &WireResponse,
		classifier: &dyn ErrorClassifier,
	) -> Result<Self::Output, ServiceError> {
		#[derive(serde::Deserialize)]
		#[serde(rename_all = "PascalCase")]
		struct Output {
			table_names: Vec<String>,
		}

		json::output::<Output>(response, classifier).map(|output| output.table_names)
	}
}

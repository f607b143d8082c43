//! Demonstrates identity pool federation feeding a signed service call.
//!
//! A local mock stands in for both the identity pool service and the target service so
//! the demo runs offline. The credentials provider resolves an identity id, fetches
//! temporary credentials, stores them, and the service client signs with them.

// std
use std::sync::Arc;
// crates.io
use color_eyre::Result;
use httpmock::prelude::*;
use url::Url;
// self
use cloudsign::{
	client::ServiceClient,
	config::ServiceDescriptor,
	credential::CredentialsProvider,
	error::{ServiceError, ValidationError},
	http::{ReqwestTransport, WireResponse},
	identity::CognitoIdentityProvider,
	operation::{ErrorClassifier, Operation, WirePayload, json},
	reqwest::Client,
	store::CredentialStore,
};

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let server = MockServer::start_async().await;
	let _get_id = server
		.mock_async(|when, then| {
			when.method(POST).header("x-amz-target", "AWSCognitoIdentityService.GetId");
			then.status(200).body(r#"{"IdentityId":"eu-west-1:demo-identity"}"#);
		})
		.await;
	let _get_credentials = server
		.mock_async(|when, then| {
			when.method(POST)
				.header("x-amz-target", "AWSCognitoIdentityService.GetCredentialsForIdentity");
			then.status(200).body(
				r#"{"Credentials":{"AccessKeyId":"ASIADEMO","SecretKey":"demo-secret",
				"SessionToken":"demo-session","Expiration":4102444800}}"#,
			);
		})
		.await;
	let service = server
		.mock_async(|when, then| {
			when.method(POST)
				.header("x-amz-target", "Logs_20140328.DescribeLogGroups")
				.header("x-amz-security-token", "demo-session");
			then.status(200).body(r#"{"logGroups":[{"logGroupName":"/demo/app"}]}"#);
		})
		.await;
	let mut endpoint = Url::parse(&server.url("/"))?;

	if endpoint.set_scheme("https").is_err() {
		color_eyre::eyre::bail!("Mock server URL rejected the https scheme.");
	}

	// The mock server uses a self-signed certificate.
	let transport = Arc::new(ReqwestTransport::with_client(
		Client::builder().danger_accept_invalid_certs(true).build()?,
	));
	let identity = CognitoIdentityProvider::new(
		"eu-west-1:2f0f6a3c-4a59-4d1b-8c9e-0d2b3c4e5f60",
		transport.clone(),
	)?
	.with_endpoint(endpoint.clone())?;
	let store = Arc::new(CredentialStore::default());
	let credentials = Arc::new(CredentialsProvider::new(store.clone(), Arc::new(identity)));
	let descriptor = ServiceDescriptor::builder("logs", "eu-west-1")
		.endpoint(endpoint)
		.json_protocol("Logs_20140328", "1.1")
		.build()?;
	let client: ServiceClient<ReqwestTransport> =
		ServiceClient::with_transport(descriptor, credentials, transport);
	let groups = client.invoke(&DescribeLogGroups).await?;

	println!("Log groups: {groups:?}.");
	println!("Credentials cached for {}.", store.current_credentials()?.access_key);

	service.assert_calls_async(1).await;

	Ok(())
}

struct DescribeLogGroups;
impl Operation for DescribeLogGroups {
	type Output = Vec<String>;

	fn name(&self) -> &'static str {
		"DescribeLogGroups"
	}

	fn serialize(&self, descriptor: &ServiceDescriptor) -> Result<WirePayload, ValidationError> {
		json::payload(descriptor, self.name(), &serde_json::json!({}))
	}

	fn deserialize(
		&self,
		response: &WireResponse,
		classifier: &dyn ErrorClassifier,
	) -> Result<Self::Output, ServiceError> {
		let body = json::output::<serde_json::Value>(response, classifier)?;

		Ok(body["logGroups"]
			.as_array()
			.into_iter()
			.flatten()
			.filter_map(|group| group["logGroupName"].as_str().map(str::to_owned))
			.collect())
	}
}

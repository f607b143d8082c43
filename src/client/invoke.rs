// self
use crate::{
	_prelude::*,
	client::ServiceClient,
	credential::Credentials,
	error::{ServiceError, TransportError},
	http::{HttpTransport, WireRequest},
	obs::{self, CallKind, CallOutcome, CallSpan},
	operation::{Operation, WirePayload},
	retry::{RetryDecision, RetryState},
	sign::SigningContext,
};

impl<T> ServiceClient<T>
where
	T: ?Sized + HttpTransport,
{
	/// Invokes `operation`, retrying according to the client's [`RetryPolicy`].
	///
	/// Validation failures surface before any network activity. Every attempt signs
	/// with the credential snapshot current at that moment. When budgets run out, the
	/// last [`ServiceError`] is returned unchanged. Dropping the returned future cancels
	/// the call without aborting a credential refresh other calls share.
	///
	/// [`RetryPolicy`]: crate::retry::RetryPolicy
	pub async fn invoke<O>(&self, operation: &O) -> Result<O::Output>
	where
		O: Operation,
	{
		let span = CallSpan::operation(&self.descriptor.signing_name, operation.name());
		let result = span.instrument(self.run(operation)).await;
		let outcome = if result.is_ok() { CallOutcome::Success } else { CallOutcome::Failure };

		obs::record_call_outcome(CallKind::Operation, outcome);

		result
	}

	async fn run<O>(&self, operation: &O) -> Result<O::Output>
	where
		O: Operation,
	{
		let payload = operation.serialize(&self.descriptor)?;
		let url = payload.url(&self.descriptor.endpoint)?;
		let mut state = RetryState::new();
		let mut refreshed = None;

		loop {
			let credentials = match refreshed.take() {
				Some(credentials) => credentials,
				None => self.credentials.credentials().await?,
			};

			state.begin_attempt();
			obs::record_call_outcome(CallKind::Operation, CallOutcome::Attempt);

			let err = match self.attempt(operation, &payload, &url, credentials.clone()).await? {
				Ok(output) => {
					state.succeed();

					return Ok(output);
				},
				Err(err) => err,
			};

			let decision = self.retry_policy.decide(&mut state, &err);

			obs::trace_decision(state.attempt_count(), &err, &decision);

			match decision {
				RetryDecision::Retry { delay } => {
					obs::record_call_outcome(CallKind::Operation, CallOutcome::Retry);
					obs::record_retry_delay(err.kind, delay);
					tokio::time::sleep(delay.unsigned_abs()).await;
				},
				RetryDecision::RefreshCredentials => {
					obs::record_call_outcome(CallKind::Operation, CallOutcome::Retry);

					refreshed = Some(self.credentials.force_refresh(&credentials).await?);
				},
				RetryDecision::Fail => return Err(err.into()),
			}
		}
	}

	/// Runs one signed round-trip. The outer error is fatal; the inner one is subject to
	/// the retry policy.
	async fn attempt<O>(
		&self,
		operation: &O,
		payload: &WirePayload,
		url: &Url,
		credentials: Arc<Credentials>,
	) -> Result<Result<O::Output, ServiceError>>
	where
		O: Operation,
	{
		let context = payload
			.headers
			.iter()
			.fold(SigningContext::builder(payload.method, url.path()), |builder, (name, value)| {
				builder.header(name, value)
			})
			.queries(payload.query.iter().cloned())
			.host(self.descriptor.host())
			.payload(&payload.body)
			.credentials(credentials)
			.build();
		let signature = self.signer.sign(&context)?;
		// The transport derives `host` from the URL.
		let mut headers = context
			.headers()
			.iter()
			.filter(|(name, _)| name.as_str() != "host")
			.map(|(name, value)| (name.clone(), value.clone()))
			.collect::<Vec<_>>();

		headers.push(("authorization".into(), signature.into_string()));
		headers.push(("user-agent".into(), self.descriptor.user_agent.clone()));

		let request = WireRequest {
			method: payload.method,
			url: url.clone(),
			headers,
			body: payload.body.clone(),
		};
		let timeout = self.descriptor.attempt_timeout;
		let response =
			match tokio::time::timeout(timeout.unsigned_abs(), self.transport.send(request)).await {
				Ok(Ok(response)) => response,
				Ok(Err(e)) => return Ok(Err(ServiceError::transport(&e))),
				Err(_) =>
					return Ok(Err(ServiceError::transport(&TransportError::Timeout {
						elapsed: timeout,
					}))),
			};

		Ok(operation.deserialize(&response, &*self.classifier))
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::sync::atomic::{AtomicUsize, Ordering};
	// self
	use super::*;
	use crate::{
		config::ServiceDescriptor,
		credential::CredentialsProvider,
		error::{ServiceErrorKind, ValidationError},
		http::{Method, TransportFuture, WireResponse},
		identity::StaticIdentityProvider,
		operation::{ErrorClassifier, Validator, json},
		retry::RetryPolicy,
		store::CredentialStore,
	};

	#[derive(Default)]
	struct RecordingTransport {
		requests: Mutex<Vec<WireRequest>>,
		hang: bool,
	}
	impl HttpTransport for RecordingTransport {
		fn send(&self, request: WireRequest) -> TransportFuture<'_> {
			self.requests.lock().push(request);

			Box::pin(async move {
				if self.hang {
					futures::future::pending::<()>().await;
				}

				Ok(WireResponse::new(200).with_body(r#"{"Tables":["a"]}"#))
			})
		}
	}

	struct ListTables {
		limit: i64,
		calls: AtomicUsize,
	}
	impl Operation for ListTables {
		type Output = Vec<String>;

		fn name(&self) -> &'static str {
			"ListTables"
		}

		fn serialize(
			&self,
			descriptor: &ServiceDescriptor,
		) -> Result<WirePayload, ValidationError> {
			self.calls.fetch_add(1, Ordering::SeqCst);

			Validator::new(self.name()).range("Limit", self.limit, 1, 100).finish()?;

			json::payload(descriptor, self.name(), &serde_json::json!({ "Limit": self.limit }))
		}

		fn deserialize(
			&self,
			response: &WireResponse,
			classifier: &dyn ErrorClassifier,
		) -> Result<Self::Output, ServiceError> {
			#[derive(Deserialize)]
			#[serde(rename_all = "PascalCase")]
			struct Output {
				tables: Vec<String>,
			}

			json::output::<Output>(response, classifier).map(|output| output.tables)
		}
	}

	fn client(transport: RecordingTransport) -> ServiceClient<RecordingTransport> {
		let descriptor = ServiceDescriptor::builder("dynamodb", "us-east-1")
			.json_protocol("DynamoDB_20120810", "1.0")
			.attempt_timeout(Duration::seconds(2))
			.build()
			.expect("Descriptor fixture should build.");
		let credentials = Credentials::builder("AKIDEXAMPLE")
			.secret_key("secret")
			.session_token("session")
			.build()
			.expect("Credential fixture should build.");
		let provider = CredentialsProvider::new(
			Arc::new(CredentialStore::default()),
			Arc::new(StaticIdentityProvider::new(credentials)),
		);
		let policy = RetryPolicy::default().with_max_retries(1).with_jitter(false);
		let client: ServiceClient<RecordingTransport> =
			ServiceClient::with_transport(descriptor, Arc::new(provider), transport);

		client.with_retry_policy(policy)
	}

	#[tokio::test]
	async fn signed_request_carries_protocol_and_auth_headers() {
		let client = client(RecordingTransport::default());
		let tables = client
			.invoke(&ListTables { limit: 10, calls: AtomicUsize::new(0) })
			.await
			.expect("Call should succeed.");

		assert_eq!(tables, ["a"]);

		let requests = client.transport.requests.lock();
		let request = &requests[0];

		assert_eq!(request.method, Method::Post);
		assert_eq!(request.url.as_str(), "https://dynamodb.us-east-1.amazonaws.com/");
		assert_eq!(request.header("x-amz-target"), Some("DynamoDB_20120810.ListTables"));
		assert_eq!(request.header("x-amz-security-token"), Some("session"));
		assert!(request.header("host").is_none());
		assert!(request.header("x-amz-date").is_some());

		let authorization = request.header("authorization").expect("Request should be signed.");

		assert!(authorization.starts_with("AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/"));
		assert!(authorization.contains("/us-east-1/dynamodb/aws4_request"));
		assert!(authorization.contains(
			"SignedHeaders=content-type;host;x-amz-date;x-amz-security-token;x-amz-target"
		));
	}

	#[tokio::test]
	async fn validation_fails_before_any_request() {
		let client = client(RecordingTransport::default());
		let operation = ListTables { limit: 0, calls: AtomicUsize::new(0) };
		let err = client.invoke(&operation).await.expect_err("Invalid limit should fail.");

		assert!(matches!(err, Error::Validation(ref v) if v.has_field("Limit")));
		assert_eq!(operation.calls.load(Ordering::SeqCst), 1);
		assert!(client.transport.requests.lock().is_empty());
	}

	#[tokio::test(start_paused = true)]
	async fn attempt_timeout_is_a_transient_failure() {
		let client = client(RecordingTransport { hang: true, ..Default::default() });
		let err = client
			.invoke(&ListTables { limit: 1, calls: AtomicUsize::new(0) })
			.await
			.expect_err("Hanging transport should time out.");
		let service = err.as_service().expect("Timeout should surface as a service error.");

		assert_eq!(service.kind, ServiceErrorKind::TransientNetwork);
		assert!(service.http_status.is_none());
		assert_eq!(client.transport.requests.lock().len(), 2);
	}
}

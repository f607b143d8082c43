//! Service client facade: serialize, sign, send, classify, and retry.

mod invoke;

// self
use crate::{
	_prelude::*,
	config::ServiceDescriptor,
	credential::CredentialsProvider,
	http::HttpTransport,
	operation::{DefaultErrorClassifier, ErrorClassifier},
	retry::RetryPolicy,
	sign::{RequestSigner, SigV4Signer},
};
#[cfg(feature = "reqwest")] use crate::http::ReqwestTransport;

#[cfg(feature = "reqwest")]
/// Service client specialized for the crate's default reqwest transport.
pub type ReqwestServiceClient = ServiceClient<ReqwestTransport>;

/// Invokes operations against a single service descriptor.
///
/// The client owns shared handles only: the credentials provider (and through it the
/// credential store) is shared by every clone, while retry state and signing contexts
/// are created per call. Cloning is cheap and clones may run calls concurrently.
pub struct ServiceClient<T>
where
	T: ?Sized + HttpTransport,
{
	/// Service the client talks to.
	pub descriptor: Arc<ServiceDescriptor>,
	/// Credentials provider shared with other clients of the same identity.
	pub credentials: Arc<CredentialsProvider>,
	/// Transport used for every attempt.
	pub transport: Arc<T>,
	/// Signer applied to every attempt.
	pub signer: Arc<dyn RequestSigner>,
	/// Classifier used by deserializers for failed responses.
	pub classifier: Arc<dyn ErrorClassifier>,
	/// Retry budgets and backoff.
	pub retry_policy: RetryPolicy,
}
impl<T> ServiceClient<T>
where
	T: ?Sized + HttpTransport,
{
	/// Creates a client that reuses the caller-provided transport.
	///
	/// The default signer is scoped to the descriptor's signing name and region; the
	/// default classifier is [`DefaultErrorClassifier`].
	pub fn with_transport(
		descriptor: ServiceDescriptor,
		credentials: Arc<CredentialsProvider>,
		transport: impl Into<Arc<T>>,
	) -> Self {
		let signer = SigV4Signer::new(&descriptor.signing_name, &descriptor.region);

		Self {
			descriptor: Arc::new(descriptor),
			credentials,
			transport: transport.into(),
			signer: Arc::new(signer),
			classifier: Arc::new(DefaultErrorClassifier),
			retry_policy: RetryPolicy::default(),
		}
	}

	/// Replaces the request signer.
	pub fn with_signer(mut self, signer: Arc<dyn RequestSigner>) -> Self {
		self.signer = signer;

		self
	}

	/// Replaces the error classifier.
	pub fn with_classifier(mut self, classifier: Arc<dyn ErrorClassifier>) -> Self {
		self.classifier = classifier;

		self
	}

	/// Replaces the retry policy.
	pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
		self.retry_policy = retry_policy;

		self
	}
}
#[cfg(feature = "reqwest")]
impl ServiceClient<ReqwestTransport> {
	/// Creates a client backed by a reqwest transport with redirects disabled.
	pub fn new(
		descriptor: ServiceDescriptor,
		credentials: Arc<CredentialsProvider>,
	) -> Result<Self> {
		Ok(Self::with_transport(descriptor, credentials, ReqwestTransport::new()?))
	}
}
impl<T> Clone for ServiceClient<T>
where
	T: ?Sized + HttpTransport,
{
	fn clone(&self) -> Self {
		Self {
			descriptor: self.descriptor.clone(),
			credentials: self.credentials.clone(),
			transport: self.transport.clone(),
			signer: self.signer.clone(),
			classifier: self.classifier.clone(),
			retry_policy: self.retry_policy.clone(),
		}
	}
}
impl<T> Debug for ServiceClient<T>
where
	T: ?Sized + HttpTransport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ServiceClient")
			.field("descriptor", &self.descriptor)
			.field("credentials", &self.credentials)
			.field("retry_policy", &self.retry_policy)
			.finish()
	}
}

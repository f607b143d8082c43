//! Credential-aware request signing for cloud service SDKs: coalesced identity refresh,
//! canonical request signatures, typed error classification, and bounded retries in one
//! pipeline.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod client;
pub mod config;
pub mod credential;
pub mod error;
pub mod http;
pub mod identity;
pub mod obs;
pub mod operation;
pub mod retry;
pub mod sign;
pub mod store;
#[cfg(all(any(test, feature = "test"), feature = "reqwest"))]
pub mod _preludet {
	//! Convenience re-exports and helpers for integration tests; enabled via `cfg(test)` or the
	//! `test` crate feature.

	pub use crate::_prelude::*;

	// self
	use crate::{
		client::ServiceClient,
		config::ServiceDescriptor,
		credential::CredentialsProvider,
		http::ReqwestTransport,
		identity::IdentityProvider,
		store::CredentialStore,
	};

	/// Service client type alias used by reqwest-backed integration tests.
	pub type ReqwestTestClient = ServiceClient<ReqwestTransport>;

	/// Builds a reqwest transport that accepts the self-signed certificates produced by
	/// `httpmock` during tests.
	pub fn test_reqwest_transport() -> ReqwestTransport {
		let client = ReqwestClient::builder()
			.danger_accept_invalid_certs(true)
			.danger_accept_invalid_hostnames(true)
			.build()
			.expect("Failed to build insecure Reqwest client for tests.");

		ReqwestTransport::with_client(client)
	}

	/// Constructs a [`ServiceClient`] backed by an empty credential store, the provided
	/// identity provider, and the reqwest transport used across integration tests.
	pub fn build_reqwest_test_client(
		descriptor: ServiceDescriptor,
		identity: Arc<dyn IdentityProvider>,
	) -> (ReqwestTestClient, Arc<CredentialStore>) {
		let store = Arc::new(CredentialStore::default());
		let credentials = Arc::new(CredentialsProvider::new(store.clone(), identity));
		let client =
			ServiceClient::with_transport(descriptor, credentials, test_reqwest_transport());

		(client, store)
	}
}

mod _prelude {
	pub use std::{
		collections::BTreeMap,
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		sync::Arc,
	};

	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(all(test, feature = "reqwest"))] use {color_eyre as _, httpmock as _};

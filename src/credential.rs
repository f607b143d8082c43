//! Credential models, redacted secrets, and the coalescing credentials provider.

pub mod provider;
pub mod record;
pub mod secret;

pub use provider::*;
pub use record::*;
pub use secret::*;

//! Public keys used to verify ID tokens and session cookies.

pub mod certificate;
pub mod source;
pub mod state;

pub use source::{HttpPublicKeySource, StaticPublicKeySource};

// std
use std::fmt::{Debug, Formatter, Result as FmtResult};
// crates.io
use async_trait::async_trait;
use jsonwebtoken::DecodingKey;
// self
use crate::_prelude::*;

/// Google's X.509 certificates for Firebase ID tokens.
pub const ID_TOKEN_CERT_URL: &str =
	"https://www.googleapis.com/robot/v1/metadata/x509/securetoken@system.gserviceaccount.com";
/// Public keys for Firebase session cookies.
pub const SESSION_COOKIE_CERT_URL: &str =
	"https://www.googleapis.com/identitytoolkit/v3/relyingparty/publicKeys";

/// RSA public key together with the `kid` it is published under.
#[derive(Clone)]
pub struct SigningKey {
	/// Key identifier matched against the token's `kid` header.
	pub id: String,
	/// RSA public key material.
	pub key: DecodingKey,
}
impl SigningKey {
	/// Pair a key id with its decoding key.
	pub fn new(id: impl Into<String>, key: DecodingKey) -> Self {
		Self { id: id.into(), key }
	}
}
impl Debug for SigningKey {
	fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
		f.debug_struct("SigningKey").field("id", &self.id).finish_non_exhaustive()
	}
}

/// Source of the public keys that sign tokens.
#[async_trait]
pub trait PublicKeySource: Debug + Send + Sync {
	/// Current key set; may hit the network when the cached set has expired.
	async fn public_keys(&self, cancel: &CancellationToken) -> Result<Arc<[SigningKey]>>;
}

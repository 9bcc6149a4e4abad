//! Signer for the auth emulator, which accepts unsigned custom tokens.

// crates.io
use async_trait::async_trait;
// self
use crate::{
	_prelude::*,
	signer::{Signer, SigningAlgorithm},
};

/// Service account the emulator expects as token issuer.
pub const EMULATOR_ACCOUNT: &str = "firebase-auth-emulator@example.com";

/// Produces `alg: none` tokens with an empty signature.
#[derive(Clone, Copy, Debug, Default)]
pub struct EmulatorSigner;
#[async_trait]
impl Signer for EmulatorSigner {
	fn name(&self) -> &'static str {
		"emulator"
	}

	fn algorithm(&self) -> SigningAlgorithm {
		SigningAlgorithm::None
	}

	async fn key_id(&self, _: &CancellationToken) -> Result<String> {
		Ok(EMULATOR_ACCOUNT.into())
	}

	async fn sign(&self, _: &[u8], _: &CancellationToken) -> Result<Vec<u8>> {
		Ok(Vec::new())
	}
}

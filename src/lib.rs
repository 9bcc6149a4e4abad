//! Async admin SDK core for a cloud identity platform: custom token minting, ID token and
//! session cookie verification, and a retrying HTTP transport shared by every remote call.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod clock;
pub mod config;
pub mod hash;
pub mod http;
pub mod keys;
pub mod metrics;
pub mod signer;
pub mod token;

mod error;
mod _prelude {
	pub use std::{
		sync::Arc,
		time::{Duration, SystemTime},
	};

	pub use chrono::{DateTime, TimeDelta, Utc};
	pub use tokio_util::sync::CancellationToken;

	pub use crate::{Error, Result};
}

pub use crate::{
	auth::{Auth, AuthBuilder, RevocationSource, TenantAwareAuth},
	clock::{Clock, FixedClock, SystemClock},
	config::{AuthOptions, Credential, Endpoints, ServiceAccountKey},
	error::{AuthErrorCode, Error, ErrorCode, Result, TokenFailure},
	hash::UserImportHash,
	http::{
		client::{HttpClient, HttpClientOptions, HttpResponse},
		retry::{JitterStrategy, RetryPolicy},
	},
	keys::{HttpPublicKeySource, PublicKeySource, SigningKey, StaticPublicKeySource},
	signer::{Signer, SigningAlgorithm},
	token::{claims::TokenClaims, factory::TokenFactory, verifier::TokenVerifier},
};
#[cfg(feature = "prometheus")]
pub use crate::metrics::install_default_exporter;

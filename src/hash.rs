//! Password hash descriptions for user imports.

// std
use std::ops::RangeInclusive;
// crates.io
use base64::{Engine, engine::general_purpose::URL_SAFE};
use serde_json::{Map, Value, json};
// self
use crate::_prelude::*;

/// Hash algorithm, with its parameters, that imported password hashes were produced with.
#[derive(Clone, PartialEq, Eq)]
pub enum UserImportHash {
	/// HMAC-SHA512 keyed with `key`.
	HmacSha512 {
		/// Signer key.
		key: Vec<u8>,
	},
	/// HMAC-SHA256 keyed with `key`.
	HmacSha256 {
		/// Signer key.
		key: Vec<u8>,
	},
	/// HMAC-SHA1 keyed with `key`.
	HmacSha1 {
		/// Signer key.
		key: Vec<u8>,
	},
	/// HMAC-MD5 keyed with `key`.
	HmacMd5 {
		/// Signer key.
		key: Vec<u8>,
	},
	/// Iterated MD5.
	Md5 {
		/// Rounds, `0..=8192`.
		rounds: u32,
	},
	/// Iterated SHA-1.
	Sha1 {
		/// Rounds, `1..=8192`.
		rounds: u32,
	},
	/// Iterated SHA-256.
	Sha256 {
		/// Rounds, `1..=8192`.
		rounds: u32,
	},
	/// Iterated SHA-512.
	Sha512 {
		/// Rounds, `1..=8192`.
		rounds: u32,
	},
	/// PBKDF2 with HMAC-SHA256.
	Pbkdf2Sha256 {
		/// Rounds, `0..=120000`.
		rounds: u32,
	},
	/// PBKDF with SHA-1.
	PbkdfSha1 {
		/// Rounds, `0..=120000`.
		rounds: u32,
	},
	/// The platform's modified scrypt.
	Scrypt {
		/// Signer key.
		key: Vec<u8>,
		/// Rounds, `1..=8`.
		rounds: u32,
		/// Memory cost, `1..=14`.
		memory_cost: u32,
		/// Optional salt separator.
		salt_separator: Option<Vec<u8>>,
	},
	/// Standard scrypt.
	StandardScrypt {
		/// CPU/memory cost.
		memory_cost: u32,
		/// Parallelization.
		parallelization: u32,
		/// Block size.
		block_size: u32,
		/// Derived key length.
		derived_key_length: u32,
	},
	/// Bcrypt; parameters live in the hash itself.
	Bcrypt,
}
impl UserImportHash {
	/// `hashAlgorithm` value of the import request.
	pub fn algorithm(&self) -> &'static str {
		match self {
			Self::HmacSha512 { .. } => "HMAC_SHA512",
			Self::HmacSha256 { .. } => "HMAC_SHA256",
			Self::HmacSha1 { .. } => "HMAC_SHA1",
			Self::HmacMd5 { .. } => "HMAC_MD5",
			Self::Md5 { .. } => "MD5",
			Self::Sha1 { .. } => "SHA1",
			Self::Sha256 { .. } => "SHA256",
			Self::Sha512 { .. } => "SHA512",
			Self::Pbkdf2Sha256 { .. } => "PBKDF2_SHA256",
			Self::PbkdfSha1 { .. } => "PBKDF_SHA1",
			Self::Scrypt { .. } => "SCRYPT",
			Self::StandardScrypt { .. } => "STANDARD_SCRYPT",
			Self::Bcrypt => "BCRYPT",
		}
	}

	/// Validate the parameters and render the hash fields of an import request.
	pub fn build_hash_config(&self) -> Result<Map<String, Value>> {
		let mut config = Map::new();

		config.insert("hashAlgorithm".into(), json!(self.algorithm()));

		match self {
			Self::HmacSha512 { key }
			| Self::HmacSha256 { key }
			| Self::HmacSha1 { key }
			| Self::HmacMd5 { key } => {
				config.insert("signerKey".into(), json!(encode_key(key)?));
			},
			Self::Md5 { rounds } => {
				config.insert("rounds".into(), json!(check_range("rounds", *rounds, 0..=8192)?));
			},
			Self::Sha1 { rounds } | Self::Sha256 { rounds } | Self::Sha512 { rounds } => {
				config.insert("rounds".into(), json!(check_range("rounds", *rounds, 1..=8192)?));
			},
			Self::Pbkdf2Sha256 { rounds } | Self::PbkdfSha1 { rounds } => {
				config.insert("rounds".into(), json!(check_range("rounds", *rounds, 0..=120_000)?));
			},
			Self::Scrypt { key, rounds, memory_cost, salt_separator } => {
				config.insert("signerKey".into(), json!(encode_key(key)?));
				config.insert("rounds".into(), json!(check_range("rounds", *rounds, 1..=8)?));
				config.insert(
					"memoryCost".into(),
					json!(check_range("memory_cost", *memory_cost, 1..=14)?),
				);

				if let Some(separator) = salt_separator {
					config.insert("saltSeparator".into(), json!(URL_SAFE.encode(separator)));
				}
			},
			Self::StandardScrypt {
				memory_cost,
				parallelization,
				block_size,
				derived_key_length,
			} => {
				config.insert("cpuMemCost".into(), json!(memory_cost));
				config.insert("parallelization".into(), json!(parallelization));
				config.insert("blockSize".into(), json!(block_size));
				config.insert("dkLen".into(), json!(derived_key_length));
			},
			Self::Bcrypt => {},
		}

		Ok(config)
	}
}
impl std::fmt::Debug for UserImportHash {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		// Keys are secrets.
		f.debug_tuple("UserImportHash").field(&self.algorithm()).finish()
	}
}

fn encode_key(key: &[u8]) -> Result<String> {
	if key.is_empty() {
		return Err(Error::InvalidArgument {
			field: "key",
			reason: "A non-empty signer key is required.".into(),
		});
	}

	Ok(URL_SAFE.encode(key))
}

fn check_range(field: &'static str, value: u32, range: RangeInclusive<u32>) -> Result<u32> {
	if !range.contains(&value) {
		return Err(Error::InvalidArgument {
			field,
			reason: format!(
				"Must be between {} and {} (inclusive); got {value}.",
				range.start(),
				range.end()
			),
		});
	}

	Ok(value)
}

//! Parsing of PEM certificates and public keys into [`SigningKey`]s.

// std
use std::collections::BTreeMap;
// crates.io
use jsonwebtoken::DecodingKey;
use x509_parser::{pem, public_key::PublicKey};
// self
use crate::{_prelude::*, keys::SigningKey};

/// Extract the RSA public key from a PEM-encoded X.509 certificate.
pub fn key_from_certificate(kid: &str, pem: &str) -> Result<SigningKey> {
	let invalid = |reason: String| Error::Validation { field: "certificate", reason };
	let (_, pem) = pem::parse_x509_pem(pem.as_bytes())
		.map_err(|err| invalid(format!("Key `{kid}` is not a PEM certificate: {err}.")))?;
	let certificate = pem
		.parse_x509()
		.map_err(|err| invalid(format!("Key `{kid}` holds an unparsable certificate: {err}.")))?;
	let spki = certificate.public_key();

	match spki.parsed() {
		Ok(PublicKey::RSA(_)) => {},
		Ok(_) =>
			return Err(invalid(format!(
				"Key `{kid}` certificate does not carry an RSA public key."
			))),
		Err(err) =>
			return Err(invalid(format!("Key `{kid}` public key could not be decoded: {err}."))),
	}

	Ok(SigningKey::new(kid, DecodingKey::from_rsa_der(&spki.subject_public_key.data)))
}

/// Load an RSA public key from a `PUBLIC KEY` or `RSA PUBLIC KEY` PEM block.
pub fn key_from_public_key_pem(kid: &str, pem: &str) -> Result<SigningKey> {
	let key = DecodingKey::from_rsa_pem(pem.as_bytes()).map_err(|err| Error::Validation {
		field: "public_key",
		reason: format!("Key `{kid}` is not an RSA public key: {err}."),
	})?;

	Ok(SigningKey::new(kid, key))
}

/// Parse a `{ kid: pem_certificate }` document into signing keys.
///
/// An empty document is rejected; a key service never legitimately publishes zero keys.
pub fn parse_certificate_map(body: &str) -> Result<Vec<SigningKey>> {
	let certificates: BTreeMap<String, String> = serde_json::from_str(body)?;

	if certificates.is_empty() {
		return Err(Error::Validation {
			field: "certificates",
			reason: "Key service returned an empty key set.".into(),
		});
	}

	certificates.iter().map(|(kid, pem)| key_from_certificate(kid, pem)).collect()
}

//! Compact JWT segments.

// crates.io
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
// self
use crate::_prelude::*;

/// JOSE header fields this crate reads and writes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwtHeader {
	/// Signature algorithm.
	pub alg: String,
	/// Signing key id.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub kid: Option<String>,
	/// Media type, `JWT`.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub typ: Option<String>,
}

/// Token split into its decoded parts.
#[derive(Clone, Debug)]
pub struct DecodedJwt {
	/// Decoded header.
	pub header: JwtHeader,
	/// Decoded payload object.
	pub payload: Map<String, Value>,
	/// `header.payload` exactly as received; the signed bytes.
	pub signing_input: String,
	/// Signature segment, still base64url-encoded; empty for unsecured tokens.
	pub signature: String,
}

/// Serialize `value` to JSON and base64url-encode it without padding.
pub fn encode_segment<T>(value: &T) -> Result<String>
where
	T: Serialize,
{
	Ok(URL_SAFE_NO_PAD.encode(serde_json::to_vec(value)?))
}

/// Split and decode a compact JWT. Nothing is verified.
pub fn decode(token: &str) -> Result<DecodedJwt> {
	let mut segments = token.split('.');
	let (Some(header), Some(payload), Some(signature), None) =
		(segments.next(), segments.next(), segments.next(), segments.next())
	else {
		return Err(malformed("Expected three dot-separated segments."));
	};

	if header.is_empty() || payload.is_empty() {
		return Err(malformed("Header and payload segments must not be empty."));
	}

	let header: JwtHeader = decode_segment(header, "header")?;
	let payload: Map<String, Value> = decode_segment(payload, "payload")?;
	let signing_input = token[..token.len() - signature.len() - 1].to_owned();

	Ok(DecodedJwt { header, payload, signing_input, signature: signature.to_owned() })
}

fn decode_segment<T>(segment: &str, name: &str) -> Result<T>
where
	T: for<'de> Deserialize<'de>,
{
	let bytes = URL_SAFE_NO_PAD
		.decode(segment.trim_end_matches('='))
		.map_err(|err| malformed(&format!("The {name} is not valid base64url: {err}.")))?;

	serde_json::from_slice(&bytes)
		.map_err(|err| malformed(&format!("The {name} is not a JSON object: {err}.")))
}

fn malformed(reason: &str) -> Error {
	Error::Validation { field: "token", reason: reason.to_owned() }
}

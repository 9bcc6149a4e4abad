//! Verified token claims.

// crates.io
use serde::Serialize;
use serde_json::{Map, Value};
// self
use crate::_prelude::*;

/// Claims of a token that passed verification.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TokenClaims {
	/// `iss` claim.
	pub issuer: String,
	/// `sub` claim.
	pub subject: String,
	/// `aud` claim.
	pub audience: String,
	/// `iat` claim.
	pub issued_at: DateTime<Utc>,
	/// `exp` claim.
	pub expires_at: DateTime<Utc>,
	/// `auth_time` claim, when present.
	pub auth_time: Option<DateTime<Utc>>,
	/// User the token was issued for.
	pub uid: String,
	/// Tenant the user belongs to.
	pub tenant_id: Option<String>,
	/// Provider the user signed in with (`firebase.sign_in_provider`).
	pub sign_in_provider: Option<String>,
	/// Payload claims: the whole payload for ID tokens and session cookies, the developer
	/// claims for custom tokens.
	pub claims: Map<String, Value>,
}
impl TokenClaims {
	/// Look up a claim by name.
	pub fn get(&self, name: &str) -> Option<&Value> {
		self.claims.get(name)
	}
}

/// Read a string claim.
pub(crate) fn string_claim<'a>(payload: &'a Map<String, Value>, name: &str) -> Option<&'a str> {
	payload.get(name).and_then(Value::as_str)
}

/// Read a NumericDate claim, accepting integral and fractional seconds.
pub(crate) fn numeric_date(payload: &Map<String, Value>, name: &str) -> Option<DateTime<Utc>> {
	let value = payload.get(name)?;
	let seconds = value.as_i64().or_else(|| value.as_f64().map(|secs| secs.floor() as i64))?;

	DateTime::from_timestamp(seconds, 0)
}

/// Render a claim for error messages.
pub(crate) fn describe(value: Option<&Value>) -> String {
	match value {
		Some(Value::String(s)) => format!("\"{s}\""),
		Some(other) => other.to_string(),
		None => "nothing".into(),
	}
}

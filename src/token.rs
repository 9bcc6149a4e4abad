//! Custom token minting and ID token / session cookie verification.

pub mod claims;
pub mod factory;
pub mod jwt;
pub mod verifier;

/// Audience of every custom token.
pub const CUSTOM_TOKEN_AUDIENCE: &str =
	"https://identitytoolkit.googleapis.com/google.identity.identitytoolkit.v1.IdentityToolkit";
/// Lifetime of a custom token, in seconds.
pub const CUSTOM_TOKEN_LIFETIME_SECS: i64 = 3_600;
/// Longest accepted `uid` and `sub`, in characters.
pub const MAX_UID_LENGTH: usize = 128;
/// Claim names developer claims may not use.
pub const RESERVED_CLAIMS: [&str; 16] = [
	"acr", "amr", "at_hash", "aud", "auth_time", "azp", "cnf", "c_hash", "exp", "firebase", "iat",
	"iss", "jti", "nbf", "nonce", "sub",
];

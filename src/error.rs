//! Crate-wide error types and `Result` alias.

// std
use std::fmt::{Display, Formatter, Result as FmtResult};
// self
use crate::http::client::HttpResponse;

/// Library-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed error kept as the cause of a classified failure.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Unified error type for the identity admin crate.
#[allow(missing_docs)]
#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error(transparent)]
	Io(#[from] std::io::Error),

	#[error(transparent)]
	Http(#[from] http::Error),
	#[error(transparent)]
	Jsonwebtoken(#[from] jsonwebtoken::errors::Error),
	#[error(transparent)]
	Reqwest(#[from] reqwest::Error),
	#[error(transparent)]
	Serde(#[from] serde_json::Error),
	#[error(transparent)]
	Url(#[from] url::ParseError),

	/// Remote call failure classified into the platform taxonomy.
	#[error("{message}")]
	Platform {
		code: ErrorCode,
		auth_code: Option<AuthErrorCode>,
		message: String,
		response: Option<Box<HttpResponse>>,
		#[source]
		source: Option<BoxError>,
	},
	/// ID token or session cookie rejected during verification.
	#[error("{message}")]
	Token {
		code: AuthErrorCode,
		failure: TokenFailure,
		message: String,
		#[source]
		source: Option<Box<Error>>,
	},
	#[error("Failed to create custom token: {message}")]
	TokenCreation {
		message: String,
		#[source]
		source: Option<Box<Error>>,
	},
	#[error("Failed to fetch public key certificates from {url}: {message}")]
	KeyFetch {
		url: String,
		message: String,
		#[source]
		source: Option<Box<Error>>,
	},
	#[error("Invalid argument for {field}: {reason}")]
	InvalidArgument { field: &'static str, reason: String },
	#[error("Validation failed for {field}: {reason}")]
	Validation { field: &'static str, reason: String },
	#[error("Configuration error: {0}")]
	Configuration(String),
	#[error("Illegal state: {0}")]
	IllegalState(String),
	#[error("Operation cancelled.")]
	Cancelled,
	#[error("Metrics error: {0}")]
	Metrics(String),
}
impl Error {
	/// Project the error onto the platform-wide error code taxonomy.
	pub fn code(&self) -> ErrorCode {
		match self {
			Self::Platform { code, .. } => *code,
			Self::Token { .. } => ErrorCode::Unauthenticated,
			Self::TokenCreation { source, .. } =>
				source.as_deref().map(Error::code).unwrap_or(ErrorCode::Internal),
			Self::KeyFetch { .. } | Self::Reqwest(_) | Self::Serde(_) => ErrorCode::Unknown,
			Self::InvalidArgument { .. } | Self::Validation { .. } | Self::Url(_) =>
				ErrorCode::InvalidArgument,
			Self::Configuration(_) | Self::IllegalState(_) => ErrorCode::FailedPrecondition,
			Self::Cancelled => ErrorCode::Cancelled,
			Self::Io(_) | Self::Http(_) | Self::Jsonwebtoken(_) | Self::Metrics(_) =>
				ErrorCode::Internal,
		}
	}

	/// Auth-specific error code, when the failure has one.
	pub fn auth_code(&self) -> Option<AuthErrorCode> {
		match self {
			Self::Platform { auth_code, .. } => *auth_code,
			Self::Token { code, .. } => Some(*code),
			Self::KeyFetch { .. } => Some(AuthErrorCode::CertificateFetchFailed),
			Self::TokenCreation { source, .. } => source.as_deref().and_then(Error::auth_code),
			_ => None,
		}
	}

	/// Raw HTTP response that produced the error, kept for diagnostics.
	pub fn http_response(&self) -> Option<&HttpResponse> {
		match self {
			Self::Platform { response, .. } => response.as_deref(),
			Self::KeyFetch { source, .. } | Self::TokenCreation { source, .. } =>
				source.as_deref().and_then(Error::http_response),
			_ => None,
		}
	}

	/// Verification failure detail for token errors.
	pub fn token_failure(&self) -> Option<TokenFailure> {
		match self {
			Self::Token { failure, .. } => Some(*failure),
			_ => None,
		}
	}

	pub(crate) fn platform(code: ErrorCode, message: impl Into<String>) -> Self {
		Self::Platform {
			code,
			auth_code: None,
			message: message.into(),
			response: None,
			source: None,
		}
	}
}

/// Platform-wide error codes shared by every service of the SDK.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorCode {
	/// Client specified an invalid argument.
	InvalidArgument,
	/// Request cannot be executed in the current system state.
	FailedPrecondition,
	/// Client specified an invalid range.
	OutOfRange,
	/// Request not authenticated due to missing, invalid, or expired credentials.
	Unauthenticated,
	/// Client does not have sufficient permission.
	PermissionDenied,
	/// Specified resource was not found.
	NotFound,
	/// Concurrency conflict, such as a read-modify-write conflict.
	Conflict,
	/// Concurrency conflict detected by the server.
	Aborted,
	/// Resource the client tried to create already exists.
	AlreadyExists,
	/// Either out of resource quota or rate limited.
	ResourceExhausted,
	/// Request cancelled by the client.
	Cancelled,
	/// Unrecoverable data loss or data corruption.
	DataLoss,
	/// Unknown server error, network failure, or unparsable response.
	Unknown,
	/// Internal server error.
	Internal,
	/// Service unavailable.
	Unavailable,
	/// Request deadline exceeded.
	DeadlineExceeded,
}
impl ErrorCode {
	/// Map an HTTP status onto the closest platform code.
	pub fn from_status(status: http::StatusCode) -> Self {
		match status.as_u16() {
			400 => Self::InvalidArgument,
			401 => Self::Unauthenticated,
			403 => Self::PermissionDenied,
			404 => Self::NotFound,
			409 => Self::Conflict,
			412 => Self::FailedPrecondition,
			416 => Self::OutOfRange,
			429 => Self::ResourceExhausted,
			500 => Self::Internal,
			503 => Self::Unavailable,
			504 => Self::DeadlineExceeded,
			_ => Self::Unknown,
		}
	}

	/// Parse the `error.status` field of a platform error response.
	pub fn from_platform_status(status: &str) -> Option<Self> {
		let code = match status {
			"INVALID_ARGUMENT" => Self::InvalidArgument,
			"FAILED_PRECONDITION" => Self::FailedPrecondition,
			"OUT_OF_RANGE" => Self::OutOfRange,
			"UNAUTHENTICATED" => Self::Unauthenticated,
			"PERMISSION_DENIED" => Self::PermissionDenied,
			"NOT_FOUND" => Self::NotFound,
			"CONFLICT" => Self::Conflict,
			"ABORTED" => Self::Aborted,
			"ALREADY_EXISTS" => Self::AlreadyExists,
			"RESOURCE_EXHAUSTED" => Self::ResourceExhausted,
			"CANCELLED" => Self::Cancelled,
			"DATA_LOSS" => Self::DataLoss,
			"UNKNOWN" => Self::Unknown,
			"INTERNAL" => Self::Internal,
			"UNAVAILABLE" => Self::Unavailable,
			"DEADLINE_EXCEEDED" => Self::DeadlineExceeded,
			_ => return None,
		};

		Some(code)
	}
}

/// Auth-specific error codes carried next to the platform code.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AuthErrorCode {
	/// Failed to retrieve the public key certificates.
	CertificateFetchFailed,
	/// Identity provider configuration was not found.
	ConfigurationNotFound,
	/// User with the provided email already exists.
	EmailAlreadyExists,
	/// User with the provided email was not found.
	EmailNotFound,
	/// ID token is expired.
	ExpiredIdToken,
	/// Session cookie is expired.
	ExpiredSessionCookie,
	/// Provided ID token is invalid.
	InvalidIdToken,
	/// Provided session cookie is invalid.
	InvalidSessionCookie,
	/// Phone number is already in use.
	PhoneNumberAlreadyExists,
	/// ID token has been revoked.
	RevokedIdToken,
	/// Session cookie has been revoked.
	RevokedSessionCookie,
	/// Tenant ID in the token does not match the tenant of the client.
	TenantIdMismatch,
	/// Specified tenant was not found.
	TenantNotFound,
	/// User with the provided uid already exists.
	UidAlreadyExists,
	/// Backend API returned an unexpected response.
	UnexpectedResponse,
	/// User account is disabled.
	UserDisabled,
	/// User was not found.
	UserNotFound,
}

/// Verification check that rejected a token.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TokenFailure {
	/// Token is not a well-formed compact JWT.
	Malformed,
	/// Header names an algorithm other than the expected one.
	UnsupportedAlgorithm,
	/// No public key matches the `kid` header.
	KeyNotFound,
	/// Signature does not verify against the located key.
	InvalidSignature,
	/// `aud` claim does not match the project.
	AudienceMismatch,
	/// `iss` claim does not match the project issuer.
	IssuerMismatch,
	/// `iat` claim is in the future.
	IssuedInFuture,
	/// `exp` claim is in the past.
	Expired,
	/// `sub` claim is missing, empty, or too long.
	InvalidSubject,
	/// Token was issued before the user's tokens were revoked.
	Revoked,
	/// User account is disabled.
	UserDisabled,
	/// Token tenant differs from the expected tenant.
	TenantMismatch,
}
impl Display for TokenFailure {
	fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
		let name = match self {
			Self::Malformed => "malformed-token",
			Self::UnsupportedAlgorithm => "unsupported-algorithm",
			Self::KeyNotFound => "key-not-found",
			Self::InvalidSignature => "invalid-signature",
			Self::AudienceMismatch => "audience-mismatch",
			Self::IssuerMismatch => "issuer-mismatch",
			Self::IssuedInFuture => "issued-in-future",
			Self::Expired => "expired-token",
			Self::InvalidSubject => "invalid-subject",
			Self::Revoked => "revoked-token",
			Self::UserDisabled => "user-disabled",
			Self::TenantMismatch => "tenant-id-mismatch",
		};

		f.write_str(name)
	}
}

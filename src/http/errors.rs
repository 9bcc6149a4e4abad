//! Classification of transport failures and error responses into the [`Error`] taxonomy.

// crates.io
use serde::Deserialize;
// self
use crate::{
	_prelude::*,
	error::{AuthErrorCode, ErrorCode},
	http::client::HttpResponse,
};

/// Turns a non-2xx response into a domain error.
pub trait ErrorResponseHandler: Send + Sync {
	/// Build the error describing `response`.
	fn handle(&self, response: &HttpResponse) -> Error;
}

/// Handler for platform APIs returning `{"error": {"status": ..., "message": ...}}`.
#[derive(Clone, Copy, Debug, Default)]
pub struct PlatformErrorHandler;
impl ErrorResponseHandler for PlatformErrorHandler {
	fn handle(&self, response: &HttpResponse) -> Error {
		let detail = ErrorBody::parse(&response.body);
		let (code, message) =
			match detail.status.as_deref().and_then(ErrorCode::from_platform_status) {
				Some(code) => (
					code,
					detail.message.unwrap_or_else(|| unexpected_response_message(response)),
				),
				None => {
					let message = unexpected_response_message(response);

					(ErrorCode::from_status(response.status), message)
				},
			};

		Error::Platform {
			code,
			auth_code: None,
			message,
			response: Some(Box::new(response.clone())),
			source: None,
		}
	}
}

/// Handler for Identity Toolkit APIs, whose `error.message` starts with a service error code
/// such as `USER_NOT_FOUND` or `DUPLICATE_EMAIL : extra detail`.
#[derive(Clone, Copy, Debug, Default)]
pub struct AuthErrorHandler;
impl ErrorResponseHandler for AuthErrorHandler {
	fn handle(&self, response: &HttpResponse) -> Error {
		let detail = ErrorBody::parse(&response.body);
		let Some(raw) = detail.message.as_deref() else {
			return PlatformErrorHandler.handle(response);
		};
		let (service_code, extra) = match raw.split_once(':') {
			Some((code, extra)) => (code.trim(), Some(extra.trim())),
			None => (raw.trim(), None),
		};
		let Some((code, auth_code, message)) = auth_error_info(service_code) else {
			return PlatformErrorHandler.handle(response);
		};
		let message = match extra {
			Some(extra) if !extra.is_empty() => format!("{message} ({service_code}): {extra}"),
			_ => format!("{message} ({service_code})."),
		};

		Error::Platform {
			code,
			auth_code: Some(auth_code),
			message,
			response: Some(Box::new(response.clone())),
			source: None,
		}
	}
}

/// Classify a transport failure that survived the retry policy.
pub fn network_error(err: reqwest::Error) -> Error {
	let detail = if err.is_timeout() {
		"request timed out"
	} else if err.is_connect() {
		"connection failed"
	} else {
		"request failed"
	};

	Error::Platform {
		code: ErrorCode::Unknown,
		auth_code: None,
		message: format!("Network error while calling the remote service ({detail}): {err}"),
		response: None,
		source: Some(Box::new(err)),
	}
}

/// Classify a 2xx response whose body could not be deserialized.
pub fn parse_error(err: serde_json::Error, response: HttpResponse) -> Error {
	Error::Platform {
		code: ErrorCode::Unknown,
		auth_code: Some(AuthErrorCode::UnexpectedResponse),
		message: format!("Response parse error: {err}. Raw response body: {}", response.body),
		response: Some(Box::new(response)),
		source: Some(Box::new(err)),
	}
}

fn unexpected_response_message(response: &HttpResponse) -> String {
	format!(
		"Unexpected HTTP response with status: {}; body: {}",
		response.status.as_u16(),
		response.body
	)
}

fn auth_error_info(service_code: &str) -> Option<(ErrorCode, AuthErrorCode, &'static str)> {
	let info = match service_code {
		"CONFIGURATION_NOT_FOUND" => (
			ErrorCode::NotFound,
			AuthErrorCode::ConfigurationNotFound,
			"No identity provider configuration found for the given identifier",
		),
		"DUPLICATE_EMAIL" => (
			ErrorCode::AlreadyExists,
			AuthErrorCode::EmailAlreadyExists,
			"The user with the provided email already exists",
		),
		"DUPLICATE_LOCAL_ID" => (
			ErrorCode::AlreadyExists,
			AuthErrorCode::UidAlreadyExists,
			"The user with the provided uid already exists",
		),
		"EMAIL_EXISTS" => (
			ErrorCode::AlreadyExists,
			AuthErrorCode::EmailAlreadyExists,
			"The user with the provided email already exists",
		),
		"EMAIL_NOT_FOUND" => (
			ErrorCode::NotFound,
			AuthErrorCode::EmailNotFound,
			"No user record found for the given email",
		),
		"INVALID_ID_TOKEN" => (
			ErrorCode::InvalidArgument,
			AuthErrorCode::InvalidIdToken,
			"The provided ID token is not a valid Firebase ID token",
		),
		"PHONE_NUMBER_EXISTS" => (
			ErrorCode::AlreadyExists,
			AuthErrorCode::PhoneNumberAlreadyExists,
			"The user with the provided phone number already exists",
		),
		"TENANT_NOT_FOUND" => (
			ErrorCode::NotFound,
			AuthErrorCode::TenantNotFound,
			"No tenant found for the given identifier",
		),
		"USER_NOT_FOUND" => (
			ErrorCode::NotFound,
			AuthErrorCode::UserNotFound,
			"No user record found for the given identifier",
		),
		"USER_DISABLED" => (
			ErrorCode::InvalidArgument,
			AuthErrorCode::UserDisabled,
			"The user record is disabled",
		),
		_ => return None,
	};

	Some(info)
}

/// `{"error": {"status", "message"}}` envelope shared by platform APIs.
#[derive(Debug, Default)]
pub(crate) struct ErrorBody {
	pub(crate) status: Option<String>,
	pub(crate) message: Option<String>,
}
impl ErrorBody {
	pub(crate) fn parse(body: &str) -> Self {
		#[derive(Deserialize)]
		struct Envelope {
			error: Option<Inner>,
		}
		#[derive(Deserialize)]
		struct Inner {
			status: Option<String>,
			message: Option<String>,
		}

		match serde_json::from_str::<Envelope>(body) {
			Ok(Envelope { error: Some(inner) }) =>
				Self { status: inner.status, message: inner.message.filter(|m| !m.is_empty()) },
			_ => Self::default(),
		}
	}
}

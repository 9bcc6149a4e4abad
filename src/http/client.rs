//! Retrying HTTP client shared by every remote operation.

// crates.io
use http::{HeaderMap, StatusCode};
use reqwest::{Client, Request, redirect::Policy};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tokio::time::Instant;
// self
use crate::{
	_prelude::*,
	http::{
		errors::{self, ErrorResponseHandler},
		retry::{AttemptOutcome, RetryDecision, RetryPolicy, RetryState, TokioWaiter, Waiter},
	},
	metrics,
};

/// Default per-attempt timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Options applied when constructing an [`HttpClient`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HttpClientOptions {
	/// Retry policy; `None` disables retries.
	#[serde(default)]
	pub retry: Option<RetryPolicy>,
	/// Timeout applied to every attempt.
	#[serde(default = "default_timeout")]
	pub timeout: Duration,
	/// User agent advertised on outbound requests.
	#[serde(default = "default_user_agent")]
	pub user_agent: String,
}
impl HttpClientOptions {
	/// Enable retries with the given policy.
	pub fn with_retry(mut self, policy: RetryPolicy) -> Self {
		self.retry = Some(policy);

		self
	}

	/// Validate the options, including the embedded retry policy.
	pub fn validate(&self) -> Result<()> {
		if self.timeout.is_zero() {
			return Err(Error::Validation {
				field: "http.timeout",
				reason: "Must be greater than zero.".into(),
			});
		}
		if let Some(policy) = &self.retry {
			policy.validate()?;
		}

		Ok(())
	}
}
impl Default for HttpClientOptions {
	fn default() -> Self {
		Self { retry: None, timeout: DEFAULT_TIMEOUT, user_agent: default_user_agent() }
	}
}

/// Fully buffered HTTP response.
#[derive(Clone, Debug)]
pub struct HttpResponse {
	/// Response status.
	pub status: StatusCode,
	/// Response headers.
	pub headers: HeaderMap,
	/// Response body decoded as UTF-8 (lossy).
	pub body: String,
}
impl HttpResponse {
	/// Whether the status is in the 2xx range.
	pub fn is_success(&self) -> bool {
		self.status.is_success()
	}
}

/// HTTP client that resends retryable requests according to its [`RetryPolicy`].
#[derive(Clone, Debug)]
pub struct HttpClient {
	client: Client,
	retry: Option<RetryPolicy>,
	waiter: Arc<dyn Waiter>,
}
impl HttpClient {
	/// Build a client with a fresh reqwest connection pool.
	pub fn new(options: HttpClientOptions) -> Result<Self> {
		options.validate()?;

		let client = Client::builder()
			.redirect(Policy::limited(10))
			.user_agent(options.user_agent.clone())
			.connect_timeout(Duration::from_secs(10))
			.timeout(options.timeout)
			.build()?;

		Ok(Self { client, retry: options.retry, waiter: Arc::new(TokioWaiter) })
	}

	/// Wrap an existing reqwest client (primarily for tests).
	pub fn with_client(client: Client, retry: Option<RetryPolicy>) -> Result<Self> {
		if let Some(policy) = &retry {
			policy.validate()?;
		}

		Ok(Self { client, retry, waiter: Arc::new(TokioWaiter) })
	}

	/// Replace the waiter used between retries.
	pub fn with_waiter(mut self, waiter: Arc<dyn Waiter>) -> Self {
		self.waiter = waiter;

		self
	}

	/// Underlying reqwest client, used to build requests.
	pub fn inner(&self) -> &Client {
		&self.client
	}

	/// Retry policy copied into this client.
	pub fn retry_policy(&self) -> Option<&RetryPolicy> {
		self.retry.as_ref()
	}

	/// Send `request`, retrying per policy, and return the final response whatever its status.
	///
	/// Transport failures that survive the retry policy become an `Unknown` network error; the
	/// last observed failure is the one reported.
	pub async fn send(&self, request: Request, cancel: &CancellationToken) -> Result<HttpResponse> {
		let method = request.method().clone();
		let url = request.url().clone();
		let mut state = RetryState::new(self.retry.as_ref());

		loop {
			let attempt = request.try_clone().ok_or_else(|| Error::InvalidArgument {
				field: "request",
				reason: "Streaming request bodies cannot be resent.".into(),
			})?;

			state.begin_attempt();

			let started = Instant::now();
			let outcome = tokio::select! {
				biased;
				_ = cancel.cancelled() => return Err(Error::Cancelled),
				outcome = self.execute(attempt) => outcome,
			};
			let decision = match &outcome {
				Ok(response) => state.evaluate(AttemptOutcome::Response {
					status: response.status.as_u16(),
					headers: &response.headers,
				}),
				Err(_) => state.evaluate(AttemptOutcome::TransportError),
			};

			tracing::debug!(
				%method,
				%url,
				attempt = state.attempts_made(),
				status = outcome.as_ref().ok().map(|response| response.status.as_u16()),
				elapsed = ?started.elapsed(),
				"http attempt complete"
			);

			match decision {
				RetryDecision::Retry(delay) => {
					tracing::warn!(
						%method,
						%url,
						attempt = state.attempts_made(),
						?delay,
						"retrying http request"
					);
					metrics::record_http_retry(method.as_str());

					self.waiter.wait(delay, cancel).await?;
				},
				RetryDecision::Finish => return outcome.map_err(errors::network_error),
			}
		}
	}

	/// Send `request` and classify non-2xx responses with `handler`.
	pub async fn send_and_read<H>(
		&self,
		request: Request,
		handler: &H,
		cancel: &CancellationToken,
	) -> Result<HttpResponse>
	where
		H: ErrorResponseHandler + ?Sized,
	{
		let response = self.send(request, cancel).await?;

		if response.is_success() { Ok(response) } else { Err(handler.handle(&response)) }
	}

	/// Send `request`, classify failures with `handler`, and parse the JSON body.
	pub async fn send_and_deserialize<T, H>(
		&self,
		request: Request,
		handler: &H,
		cancel: &CancellationToken,
	) -> Result<(T, HttpResponse)>
	where
		T: DeserializeOwned,
		H: ErrorResponseHandler + ?Sized,
	{
		let response = self.send_and_read(request, handler, cancel).await?;

		match serde_json::from_str::<T>(&response.body) {
			Ok(parsed) => Ok((parsed, response)),
			Err(err) => Err(errors::parse_error(err, response)),
		}
	}

	async fn execute(&self, request: Request) -> std::result::Result<HttpResponse, reqwest::Error> {
		let response = self.client.execute(request).await?;
		let status = response.status();
		let headers = response.headers().clone();
		let bytes = response.bytes().await?;

		Ok(HttpResponse { status, headers, body: String::from_utf8_lossy(&bytes).into_owned() })
	}
}

fn default_timeout() -> Duration {
	DEFAULT_TIMEOUT
}

fn default_user_agent() -> String {
	format!("identity-admin/{}", env!("CARGO_PKG_VERSION"))
}

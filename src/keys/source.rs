//! Key sources: a remote certificate endpoint with a single-flight cache, and a fixed key set.

// crates.io
use async_trait::async_trait;
use tokio::{
	sync::{Mutex, RwLock},
	time::Instant,
};
use url::Url;
// self
use crate::{
	_prelude::*,
	clock::{Clock, SystemClock},
	http::{client::HttpClient, errors::PlatformErrorHandler, semantics},
	keys::{PublicKeySource, SigningKey, certificate, state::KeyCache},
	metrics,
};

/// Fetches `{ kid: certificate }` documents and caches them for their advertised lifetime.
///
/// Concurrent callers that find the cache expired serialise on one refresh; the ones that
/// queued behind it reuse its result instead of fetching again.
#[derive(Clone, Debug)]
pub struct HttpPublicKeySource {
	url: Url,
	client: HttpClient,
	clock: Arc<dyn Clock>,
	cache: Arc<RwLock<Option<KeyCache>>>,
	single_flight: Arc<Mutex<()>>,
}
impl HttpPublicKeySource {
	/// Source reading keys from `url` through `client`.
	pub fn new(url: Url, client: HttpClient) -> Self {
		Self {
			url,
			client,
			clock: Arc::new(SystemClock),
			cache: Arc::new(RwLock::new(None)),
			single_flight: Arc::new(Mutex::new(())),
		}
	}

	/// Replace the clock used for expiry arithmetic.
	pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
		self.clock = clock;

		self
	}

	/// Certificate endpoint.
	pub fn url(&self) -> &Url {
		&self.url
	}

	/// Current cached snapshot, fresh or not.
	pub async fn snapshot(&self) -> Option<KeyCache> {
		self.cache.read().await.clone()
	}

	async fn fresh_keys(&self) -> Option<Arc<[SigningKey]>> {
		let now = self.clock.now();
		let cache = self.cache.read().await;

		cache.as_ref().filter(|cache| !cache.is_expired(now)).map(|cache| cache.keys.clone())
	}

	async fn fetch(&self, cancel: &CancellationToken) -> Result<KeyCache> {
		let request = self.client.inner().get(self.url.clone()).build()?;
		let response = self.client.send_and_read(request, &PlatformErrorHandler, cancel).await?;
		let keys = certificate::parse_certificate_map(&response.body)?;
		let fetched_at = self.clock.now();
		let freshness =
			semantics::evaluate_freshness(&self.url, &response, SystemTime::from(fetched_at))?;
		let cache = KeyCache::new(keys.into(), fetched_at, freshness.ttl);

		tracing::debug!(
			keys = cache.keys.len(),
			expires_at = %cache.expires_at,
			explicit_max_age = freshness.explicit,
			"fetched public keys"
		);

		Ok(cache)
	}
}
#[async_trait]
impl PublicKeySource for HttpPublicKeySource {
	#[tracing::instrument(skip(self, cancel), fields(url = %self.url))]
	async fn public_keys(&self, cancel: &CancellationToken) -> Result<Arc<[SigningKey]>> {
		if let Some(keys) = self.fresh_keys().await {
			return Ok(keys);
		}

		let _guard = tokio::select! {
			biased;
			_ = cancel.cancelled() => return Err(Error::Cancelled),
			guard = self.single_flight.lock() => guard,
		};

		if let Some(keys) = self.fresh_keys().await {
			tracing::debug!("keys refreshed by a concurrent caller");

			return Ok(keys);
		}

		let started = Instant::now();

		match self.fetch(cancel).await {
			Ok(cache) => {
				let keys = cache.keys.clone();

				*self.cache.write().await = Some(cache);

				metrics::record_key_fetch_success(self.url.as_str(), started.elapsed());

				Ok(keys)
			},
			Err(Error::Cancelled) => Err(Error::Cancelled),
			Err(err) => {
				tracing::warn!(error = %err, "public key fetch failed");
				metrics::record_key_fetch_error(self.url.as_str());

				Err(Error::KeyFetch {
					url: self.url.to_string(),
					message: err.to_string(),
					source: Some(Box::new(err)),
				})
			},
		}
	}
}

/// Fixed key set, for pinned keys and tests.
#[derive(Clone, Debug)]
pub struct StaticPublicKeySource {
	keys: Arc<[SigningKey]>,
}
impl StaticPublicKeySource {
	/// Serve `keys` forever.
	pub fn new(keys: Vec<SigningKey>) -> Self {
		Self { keys: keys.into() }
	}

	/// Build a source from `(kid, pem)` pairs holding RSA public keys.
	pub fn from_public_key_pems<'a, I>(pems: I) -> Result<Self>
	where
		I: IntoIterator<Item = (&'a str, &'a str)>,
	{
		let keys = pems
			.into_iter()
			.map(|(kid, pem)| certificate::key_from_public_key_pem(kid, pem))
			.collect::<Result<Vec<_>>>()?;

		Ok(Self::new(keys))
	}
}
#[async_trait]
impl PublicKeySource for StaticPublicKeySource {
	async fn public_keys(&self, cancel: &CancellationToken) -> Result<Arc<[SigningKey]>> {
		if cancel.is_cancelled() {
			return Err(Error::Cancelled);
		}

		Ok(self.keys.clone())
	}
}

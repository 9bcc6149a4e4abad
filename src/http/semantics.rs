//! HTTP cache semantics used to derive key-set lifetimes.

// crates.io
use http::{
	HeaderMap, Method, Request, Response,
	header::{AGE, CACHE_CONTROL},
};
use http_cache_semantics::{CacheOptions, CachePolicy};
use url::Url;
// self
use crate::{_prelude::*, http::client::HttpResponse};

/// Freshness evaluation derived from response headers.
#[derive(Clone, Debug)]
pub struct Freshness {
	/// Remaining lifetime advertised by the origin; zero when no `max-age` was sent.
	pub ttl: Duration,
	/// Whether the origin sent an explicit `max-age` directive.
	pub explicit: bool,
}

/// Evaluate how long a response fetched from `url` at `now` stays fresh.
///
/// Only an explicit `max-age` (or `s-maxage`) extends the lifetime; heuristic freshness is not
/// applied, so responses without one are stale immediately. `Age` is subtracted.
pub fn evaluate_freshness(
	url: &Url,
	response: &HttpResponse,
	now: SystemTime,
) -> Result<Freshness> {
	if !has_max_age(&response.headers) {
		tracing::debug!(%url, "response carries no max-age; treating as stale");

		return Ok(Freshness { ttl: Duration::ZERO, explicit: false });
	}

	let request = Request::builder().method(Method::GET).uri(url.as_str()).body(())?;
	let mut template = Response::builder().status(response.status);

	if let Some(headers) = template.headers_mut() {
		for name in [CACHE_CONTROL, AGE] {
			for value in response.headers.get_all(&name) {
				headers.append(name.clone(), value.clone());
			}
		}
	}

	let template = template.body(())?;
	let policy = CachePolicy::new_options(
		&request,
		&template,
		now,
		CacheOptions { shared: false, ..Default::default() },
	);
	let ttl = if policy.is_storable() { policy.time_to_live(now) } else { Duration::ZERO };

	tracing::debug!(%url, ?ttl, storable = policy.is_storable(), "evaluated freshness");

	Ok(Freshness { ttl, explicit: true })
}

/// Whether the `Cache-Control` header carries a `max-age` or `s-maxage` directive.
pub fn has_max_age(headers: &HeaderMap) -> bool {
	headers
		.get_all(CACHE_CONTROL)
		.iter()
		.filter_map(|value| value.to_str().ok())
		.flat_map(|value| value.split(','))
		.map(|directive| directive.trim().to_ascii_lowercase())
		.any(|directive| directive.starts_with("max-age=") || directive.starts_with("s-maxage="))
}

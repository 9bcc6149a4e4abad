//! Metrics helpers for key fetches, retries, signing, and verification outcomes.

// crates.io
use metrics::Label;
use smallvec::SmallVec;
// self
use crate::_prelude::*;

type LabelSet = SmallVec<[Label; 4]>;

const METRIC_HTTP_RETRIES: &str = "identity_admin_http_retries_total";
const METRIC_KEY_FETCH_TOTAL: &str = "identity_admin_key_fetch_total";
const METRIC_KEY_FETCH_DURATION: &str = "identity_admin_key_fetch_duration_seconds";
const METRIC_TOKENS_SIGNED: &str = "identity_admin_tokens_signed_total";
const METRIC_TOKEN_VERIFICATIONS: &str = "identity_admin_token_verifications_total";

#[cfg(feature = "prometheus")]
static PROMETHEUS_HANDLE: std::sync::OnceLock<
	metrics_exporter_prometheus::PrometheusHandle,
> = std::sync::OnceLock::new();

/// Install the default Prometheus recorder backed by `metrics`.
///
/// Multiple invocations are safe; subsequent calls become no-ops once the recorder is installed.
#[cfg(feature = "prometheus")]
pub fn install_default_exporter() -> Result<()> {
	if PROMETHEUS_HANDLE.get().is_some() {
		return Ok(());
	}

	let handle = metrics_exporter_prometheus::PrometheusBuilder::new()
		.install_recorder()
		.map_err(|err| Error::Metrics(err.to_string()))?;
	let _ = PROMETHEUS_HANDLE.set(handle);

	Ok(())
}

/// Access the global Prometheus exporter handle when installed.
#[cfg(feature = "prometheus")]
pub fn prometheus_handle() -> Option<&'static metrics_exporter_prometheus::PrometheusHandle> {
	PROMETHEUS_HANDLE.get()
}

/// Record a retry scheduled by the HTTP client.
pub fn record_http_retry(method: &str) {
	let mut labels = LabelSet::new();

	labels.push(Label::new("method", method.to_owned()));

	metrics::counter!(METRIC_HTTP_RETRIES, labels.iter()).increment(1);
}

/// Record a successful key-set fetch along with its latency.
pub fn record_key_fetch_success(source: &str, duration: Duration) {
	metrics::counter!(METRIC_KEY_FETCH_TOTAL, status_labels(source, "success").iter()).increment(1);
	metrics::histogram!(METRIC_KEY_FETCH_DURATION, source_labels(source).iter())
		.record(duration.as_secs_f64());
}

/// Record a failed key-set fetch.
pub fn record_key_fetch_error(source: &str) {
	metrics::counter!(METRIC_KEY_FETCH_TOTAL, status_labels(source, "error").iter()).increment(1);
}

/// Record a custom token signed by the named signer.
pub fn record_token_signed(signer: &'static str) {
	let mut labels = LabelSet::new();

	labels.push(Label::new("signer", signer));

	metrics::counter!(METRIC_TOKENS_SIGNED, labels.iter()).increment(1);
}

/// Record a verification outcome (`valid` or the failure name) for a token kind.
pub fn record_token_verification(kind: &'static str, outcome: String) {
	let mut labels = LabelSet::new();

	labels.push(Label::new("kind", kind));
	labels.push(Label::new("outcome", outcome));

	metrics::counter!(METRIC_TOKEN_VERIFICATIONS, labels.iter()).increment(1);
}

fn source_labels(source: &str) -> LabelSet {
	let mut labels = LabelSet::new();

	labels.push(Label::new("source", source.to_owned()));

	labels
}

fn status_labels(source: &str, status: &'static str) -> LabelSet {
	let mut labels = source_labels(source);

	labels.push(Label::new("status", status));

	labels
}

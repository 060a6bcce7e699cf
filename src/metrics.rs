//! Prometheus metrics for the ingestion pipeline.
//!
//! Each pipeline stage owns a small zero-sized recorder type so call sites read as
//! `ScraperMetrics::page_fetched(..)` and metric names stay in one file.

use metrics::{counter, histogram};
use std::net::SocketAddr;
use std::sync::{Once, OnceLock};
use tracing::{info, warn};

static INIT: Once = Once::new();
static HANDLE: OnceLock<metrics_exporter_prometheus::PrometheusHandle> = OnceLock::new();

pub const METRICS_ADDR_ENV: &str = "METRICS_ADDR";
const DEFAULT_METRICS_ADDR: &str = "127.0.0.1:9898";

/// Installs the Prometheus recorder and its HTTP listener. Idempotent.
pub fn init_metrics() {
    INIT.call_once(|| {
        let addr_str =
            std::env::var(METRICS_ADDR_ENV).unwrap_or_else(|_| DEFAULT_METRICS_ADDR.to_string());
        let addr: SocketAddr = match addr_str.parse() {
            Ok(addr) => addr,
            Err(_) => {
                warn!("Invalid metrics addr '{}', using {}", addr_str, DEFAULT_METRICS_ADDR);
                SocketAddr::from(([127, 0, 0, 1], 9898))
            }
        };

        let builder = metrics_exporter_prometheus::PrometheusBuilder::new().with_http_listener(addr);
        match builder.install_recorder() {
            Ok(handle) => {
                let _ = HANDLE.set(handle);
                register_all_metrics();
                info!("Prometheus exporter listening on http://{}/metrics", addr);
            }
            Err(e) => {
                warn!("Prometheus recorder install failed (possibly already installed): {}", e);
            }
        }
    });
}

/// Renders the current metric values, if the recorder is installed.
pub fn render() -> Option<String> {
    HANDLE.get().map(|h| h.render())
}

fn register_all_metrics() {
    ScraperMetrics::register();
    ExtractorMetrics::register();
    GeocoderMetrics::register();
    ReviewMetrics::register();
    ImportMetrics::register();
    PublishMetrics::register();
}

pub struct ScraperMetrics;

impl ScraperMetrics {
    pub fn page_fetched(duration_secs: f64) {
        counter!("cevennes_scraper_pages_fetched_total").increment(1);
        histogram!("cevennes_scraper_fetch_duration_seconds").record(duration_secs);
    }

    pub fn page_failed(kind: &'static str) {
        counter!("cevennes_scraper_pages_failed_total", "kind" => kind).increment(1);
    }

    pub fn candidates_scraped(count: usize) {
        counter!("cevennes_scraper_candidates_total").increment(count as u64);
    }

    fn register() {
        let _ = counter!("cevennes_scraper_pages_fetched_total");
        let _ = counter!("cevennes_scraper_candidates_total");
        let _ = histogram!("cevennes_scraper_fetch_duration_seconds");
    }
}

pub struct ExtractorMetrics;

impl ExtractorMetrics {
    pub fn completion_succeeded(duration_secs: f64) {
        counter!("cevennes_completion_calls_total").increment(1);
        histogram!("cevennes_completion_duration_seconds").record(duration_secs);
    }

    pub fn completion_failed(kind: &'static str) {
        counter!("cevennes_completion_failures_total", "kind" => kind).increment(1);
    }

    pub fn parse_failed() {
        counter!("cevennes_extractor_parse_failures_total").increment(1);
    }

    pub fn count_mismatch() {
        counter!("cevennes_extractor_count_mismatch_total").increment(1);
    }

    fn register() {
        let _ = counter!("cevennes_completion_calls_total");
        let _ = counter!("cevennes_extractor_parse_failures_total");
        let _ = counter!("cevennes_extractor_count_mismatch_total");
        let _ = histogram!("cevennes_completion_duration_seconds");
    }
}

pub struct GeocoderMetrics;

impl GeocoderMetrics {
    pub fn resolved() {
        counter!("cevennes_geocode_resolved_total").increment(1);
    }

    pub fn fallback(reason: &'static str) {
        counter!("cevennes_geocode_fallback_total", "reason" => reason).increment(1);
    }

    fn register() {
        let _ = counter!("cevennes_geocode_resolved_total");
    }
}

pub struct ReviewMetrics;

impl ReviewMetrics {
    pub fn duplicates_flagged(count: usize) {
        counter!("cevennes_duplicates_flagged_total").increment(count as u64);
    }

    pub fn validated() {
        counter!("cevennes_candidates_validated_total").increment(1);
    }

    pub fn rejected() {
        counter!("cevennes_candidates_rejected_total").increment(1);
    }

    pub fn schedule_run(outcome: &'static str) {
        counter!("cevennes_schedule_runs_total", "outcome" => outcome).increment(1);
    }

    fn register() {
        let _ = counter!("cevennes_duplicates_flagged_total");
        let _ = counter!("cevennes_candidates_validated_total");
        let _ = counter!("cevennes_candidates_rejected_total");
    }
}

pub struct ImportMetrics;

impl ImportMetrics {
    pub fn created(entity: &'static str) {
        counter!("cevennes_import_created_total", "entity" => entity).increment(1);
    }

    pub fn failed(entity: &'static str) {
        counter!("cevennes_import_failed_total", "entity" => entity).increment(1);
    }

    fn register() {
        let _ = counter!("cevennes_import_created_total", "entity" => "event");
        let _ = counter!("cevennes_import_failed_total", "entity" => "event");
    }
}

pub struct PublishMetrics;

impl PublishMetrics {
    pub fn committed() {
        counter!("cevennes_publish_commits_total").increment(1);
    }

    pub fn conflict() {
        counter!("cevennes_publish_conflicts_total").increment(1);
    }

    fn register() {
        let _ = counter!("cevennes_publish_commits_total");
        let _ = counter!("cevennes_publish_conflicts_total");
    }
}

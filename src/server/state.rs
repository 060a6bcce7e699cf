use crate::config::Config;
use crate::error::Result;
use crate::infra::{
    CompletionClient, GeocodingProvider, GitHubPublisher, GoogleGeocoder, HtmlFetcher, OpenAiClient, ReqwestFetcher,
    SourceControl,
};
use crate::pipeline::{
    Catalog, Extractor, GeocoderAdapter, Ingestor, Publisher, ReviewQueue, ScheduleRegistry, Scraper,
};
use crate::storage::{InMemoryStorage, SqliteStorage, Storage};
use std::sync::Arc;
use tracing::info;

/// Collaborators a deployment plugs in. Tests pass fakes, `from_config` passes real adapters.
pub struct Collaborators {
    pub storage: Arc<dyn Storage>,
    /// Used by scraping (short timeout).
    pub scrape_fetcher: Arc<dyn HtmlFetcher>,
    /// Used by the raw-HTML proxy and URL analysis.
    pub page_fetcher: Arc<dyn HtmlFetcher>,
    pub completion: Arc<dyn CompletionClient>,
    pub geocoding: Arc<dyn GeocodingProvider>,
    pub source_control: Arc<dyn SourceControl>,
}

#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<Catalog>,
    pub ingestor: Arc<Ingestor>,
    pub review: Arc<ReviewQueue>,
    pub schedules: Arc<ScheduleRegistry>,
    pub publisher: Arc<Publisher>,
    pub completion: Arc<dyn CompletionClient>,
    pub geocoding: Arc<dyn GeocodingProvider>,
    pub page_fetcher: Arc<dyn HtmlFetcher>,
}

impl AppState {
    pub fn new(config: &Config, parts: Collaborators) -> Self {
        let geocoder = GeocoderAdapter::new(Some(parts.geocoding.clone()), &config.geocoding, &config.region);
        let scraper = Arc::new(Scraper::new(parts.scrape_fetcher));
        let extractor = Arc::new(Extractor::new(
            parts.completion.clone(),
            parts.page_fetcher.clone(),
            &config.ai,
            config.geocoding.region_hint.clone(),
        ));

        Self {
            catalog: Arc::new(Catalog::new(parts.storage.clone(), geocoder.clone())),
            ingestor: Arc::new(Ingestor::new(
                parts.storage.clone(),
                scraper.clone(),
                extractor,
                geocoder.clone(),
            )),
            review: Arc::new(ReviewQueue::new(parts.storage.clone(), geocoder)),
            schedules: Arc::new(ScheduleRegistry::new(parts.storage.clone(), scraper)),
            publisher: Arc::new(Publisher::new(parts.source_control, parts.storage, &config.publish)),
            completion: parts.completion,
            geocoding: parts.geocoding,
            page_fetcher: parts.page_fetcher,
        }
    }

    /// Real adapters. Missing secrets are tolerated here and reported by the endpoints needing them.
    pub fn from_config(config: &Config) -> Result<Self> {
        let storage: Arc<dyn Storage> = match &config.server.database_path {
            Some(path) => {
                info!("💾 Using SQLite store at {}", path);
                Arc::new(SqliteStorage::open(path)?)
            }
            None => {
                info!("💾 Using in-memory store");
                Arc::new(InMemoryStorage::new())
            }
        };
        let geocoder = GoogleGeocoder::new(config.secrets.google_maps_api_key.clone(), &config.geocoding)?;
        if !geocoder.is_configured() {
            info!("Geocoding disabled until GOOGLE_MAPS_API_KEY is set; fallback coordinates will be used");
        }

        let parts = Collaborators {
            storage,
            scrape_fetcher: Arc::new(ReqwestFetcher::new(&config.http, config.http.scrape_timeout())?),
            page_fetcher: Arc::new(ReqwestFetcher::new(&config.http, config.http.fetch_timeout())?),
            completion: Arc::new(OpenAiClient::new(config.secrets.openai_api_key.clone(), &config.ai)?),
            geocoding: Arc::new(geocoder),
            source_control: Arc::new(GitHubPublisher::new(config.secrets.github_token.clone(), &config.publish)?),
        };
        Ok(Self::new(config, parts))
    }
}

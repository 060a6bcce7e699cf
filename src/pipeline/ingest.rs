//! Ingestion flows wired together: scrape + flag, AI analysis, bulk import and the browser
//! extension's direct import.

use crate::constants::DEFAULT_EXTRACTED_TIME;
use crate::domain::{Event, EventCategory, ExtractedEvent, NewEvent, PremiumLevel, ScrapedEvent};
use crate::error::{AppError, Result};
use crate::metrics::ImportMetrics;
use crate::pipeline::dates::{parse_event_date, parse_event_time};
use crate::pipeline::dedup::{flag_extracted, flag_scraped};
use crate::pipeline::extractor::{number_field, CountMismatch, ExtractionInput, Extractor};
use crate::pipeline::geocoder::GeocoderAdapter;
use crate::pipeline::scraper::{Scraper, UrlFailure};
use crate::storage::Storage;
use chrono::{Local, NaiveDate};
use futures::future::join_all;
use jsonschema::JSONSchema;
use once_cell::sync::Lazy;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, instrument, warn};

static EXTENSION_EVENT_SCHEMA: Lazy<Value> = Lazy::new(|| {
    json!({
        "type": "object",
        "required": ["title", "date"],
        "properties": {
            "title": { "type": "string", "minLength": 1 },
            "date": { "type": "string", "minLength": 1 },
            "time": { "type": ["string", "null"] },
            "category": { "type": ["string", "null"] },
            "description": { "type": ["string", "null"] },
            "location": { "type": ["string", "null"] },
            "address": { "type": ["string", "null"] },
            "price": { "type": ["string", "null"] },
            "organizer": { "type": ["string", "null"] },
            "contact": { "type": ["string", "null"] },
            "website": { "type": ["string", "null"] },
            "sourceUrl": { "type": ["string", "null"] },
            "image": { "type": ["string", "null"] },
            "lat": { "type": ["number", "string", "null"] },
            "lng": { "type": ["number", "string", "null"] }
        }
    })
});

static EXTENSION_EVENT_VALIDATOR: Lazy<JSONSchema> = Lazy::new(|| {
    JSONSchema::options()
        .compile(&EXTENSION_EVENT_SCHEMA)
        .expect("built-in extension event schema compiles")
});

#[derive(Debug, Serialize)]
pub struct ScrapeOutcome {
    pub success: bool,
    pub events: Vec<ScrapedEvent>,
    pub duplicates: usize,
    pub failures: Vec<UrlFailure>,
    pub summary: String,
    pub log: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisOutcome {
    pub events: Vec<ExtractedEvent>,
    pub duplicates: usize,
    pub warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count_mismatch: Option<CountMismatch>,
    pub log: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ImportFailure {
    pub title: String,
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct ImportReport {
    pub created: Vec<Event>,
    pub failed: Vec<ImportFailure>,
}

pub struct Ingestor {
    storage: Arc<dyn Storage>,
    scraper: Arc<Scraper>,
    extractor: Arc<Extractor>,
    geocoder: GeocoderAdapter,
}

impl Ingestor {
    pub fn new(
        storage: Arc<dyn Storage>,
        scraper: Arc<Scraper>,
        extractor: Arc<Extractor>,
        geocoder: GeocoderAdapter,
    ) -> Self {
        Self {
            storage,
            scraper,
            extractor,
            geocoder,
        }
    }

    /// Scrapes the URLs and flags what is already published. Nothing is persisted.
    #[instrument(skip(self, urls))]
    pub async fn scrape_and_flag(&self, urls: Vec<String>, deep: bool) -> Result<ScrapeOutcome> {
        let urls: Vec<String> = urls
            .into_iter()
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty())
            .collect();
        if urls.is_empty() {
            return Err(AppError::Validation("url or urls is required".into()));
        }
        for url in &urls {
            url::Url::parse(url).map_err(|e| AppError::Validation(format!("invalid url '{url}': {e}")))?;
        }

        let mut report = self.scraper.scrape(&urls, deep).await;
        let existing = self.storage.all_events().await?;
        let duplicates = flag_scraped(&mut report.events, &existing);
        report.log.step(format!("🔁 {duplicates} doublon(s) déjà publiés"));

        let all_failed = report.pages_ok == 0 && !report.failures.is_empty();
        let summary = if all_failed {
            warn!(failures = report.failures.len(), "every URL failed");
            format!("Échec : aucune des {} page(s) n'a pu être récupérée", report.failures.len())
        } else {
            format!("{}, dont {} doublon(s)", report.summary(), duplicates)
        };

        Ok(ScrapeOutcome {
            success: !all_failed,
            summary,
            duplicates,
            events: report.events,
            failures: report.failures,
            log: report.log.into_lines(),
        })
    }

    /// Extraction → geocoding of records without coordinates → duplicate flagging.
    #[instrument(skip_all)]
    pub async fn analyze(&self, input: ExtractionInput, instructions: Option<&str>) -> Result<AnalysisOutcome> {
        let mut output = self.extractor.extract(input, instructions).await?;

        self.fill_coordinates(&mut output.events).await;
        output.log.step(format!("📍 Géocodage de {} événement(s)", output.events.len()));

        let existing = self.storage.all_events().await?;
        let duplicates = flag_extracted(&mut output.events, &existing);
        output.log.step(format!("🔁 {duplicates} doublon(s) détecté(s)"));

        Ok(AnalysisOutcome {
            events: output.events,
            duplicates,
            warnings: output.warnings,
            count_mismatch: output.count_mismatch,
            log: output.log.into_lines(),
        })
    }

    pub async fn clean_scraped(&self, events: Vec<ScrapedEvent>) -> Result<AnalysisOutcome> {
        self.analyze(ExtractionInput::Candidates(events), None).await
    }

    /// One event from a social-network page's HTML, geocoded and flagged.
    pub async fn extract_social(&self, html: &str, url: &str) -> Result<ExtractedEvent> {
        let mut events = vec![self.extractor.extract_social(html, url).await?];
        self.fill_coordinates(&mut events).await;
        let existing = self.storage.all_events().await?;
        flag_extracted(&mut events, &existing);
        events
            .pop()
            .ok_or_else(|| AppError::Validation("no event extracted".into()))
    }

    async fn fill_coordinates(&self, events: &mut [ExtractedEvent]) {
        let missing: Vec<usize> = events
            .iter()
            .enumerate()
            .filter(|(_, e)| e.lat.is_none() || e.lng.is_none())
            .map(|(i, _)| i)
            .collect();
        let addresses: Vec<String> = missing
            .iter()
            .map(|&i| {
                let e = &events[i];
                if e.address.trim().is_empty() {
                    e.location.clone()
                } else {
                    e.address.clone()
                }
            })
            .collect();
        let outcomes = self.geocoder.resolve_all(&addresses).await;
        for (i, outcome) in missing.into_iter().zip(outcomes) {
            events[i].lat = Some(outcome.lat);
            events[i].lng = Some(outcome.lng);
        }
    }

    /// Persists the selected records concurrently. A failing record is reported and skipped;
    /// records already written stay written.
    #[instrument(skip_all, fields(count = events.len()))]
    pub async fn import_batch(&self, events: Vec<ExtractedEvent>) -> Result<ImportReport> {
        let selected: Vec<ExtractedEvent> = events.into_iter().filter(|e| e.selected).collect();
        if selected.is_empty() {
            return Err(AppError::Validation("no selected events to import".into()));
        }

        let tasks = selected.into_iter().map(|event| async move {
            let result = self.import_one(&event).await;
            (event.title, result)
        });

        let mut report = ImportReport {
            created: Vec::new(),
            failed: Vec::new(),
        };
        for (title, result) in join_all(tasks).await {
            match result {
                Ok(event) => {
                    ImportMetrics::created("event");
                    report.created.push(event);
                }
                Err(e) => {
                    warn!(title = %title, error = %e, "import failed");
                    ImportMetrics::failed("event");
                    report.failed.push(ImportFailure {
                        title,
                        error: e.to_string(),
                    });
                }
            }
        }
        info!("Imported {} event(s), {} failure(s)", report.created.len(), report.failed.len());
        Ok(report)
    }

    async fn import_one(&self, event: &ExtractedEvent) -> Result<Event> {
        let mut new_event = event.to_new_event()?;
        if event.lat.is_none() || event.lng.is_none() {
            let address = if new_event.address.is_empty() {
                &new_event.location
            } else {
                &new_event.address
            };
            let outcome = self.geocoder.resolve(address).await;
            new_event.lat = outcome.lat;
            new_event.lng = outcome.lng;
        }
        self.storage.create_event(new_event).await
    }

    /// Direct insert from the browser extension; no review step.
    #[instrument(skip_all)]
    pub async fn import_extension_event(&self, payload: Value) -> Result<Event> {
        let new_event = extension_event(&payload, Local::now().date_naive())?;
        let event = self.storage.create_event(new_event).await?;
        ImportMetrics::created("extension_event");
        info!("🧩 Extension import: {} ({})", event.title, event.id);
        Ok(event)
    }
}

fn str_field(payload: &Value, key: &str) -> String {
    payload[key].as_str().map(|s| s.trim().to_string()).unwrap_or_default()
}

/// Validates an extension payload against the schema and maps it onto a `NewEvent`.
pub fn extension_event(payload: &Value, today: NaiveDate) -> Result<NewEvent> {
    if let Err(errors) = EXTENSION_EVENT_VALIDATOR.validate(payload) {
        let messages: Vec<String> = errors
            .map(|e| {
                let path = e.instance_path.to_string();
                if path.is_empty() {
                    e.to_string()
                } else {
                    format!("{e} at {path}")
                }
            })
            .collect();
        return Err(AppError::Validation(messages.join("; ")));
    }

    let title = str_field(payload, "title");
    if title.is_empty() {
        return Err(AppError::Validation("title is required".into()));
    }
    let raw_date = str_field(payload, "date");
    let date = NaiveDate::parse_from_str(raw_date.get(..10).unwrap_or(&raw_date), "%Y-%m-%d")
        .ok()
        .or_else(|| parse_event_date(&raw_date, today))
        .ok_or_else(|| AppError::Validation(format!("unrecognised date '{raw_date}'")))?;

    let mut new_event = NewEvent::new(title, date);
    new_event.category = EventCategory::from_loose(&str_field(payload, "category")).unwrap_or_default();
    new_event.time = parse_event_time(&str_field(payload, "time")).unwrap_or_else(|| DEFAULT_EXTRACTED_TIME.to_string());
    new_event.description = str_field(payload, "description");
    new_event.location = str_field(payload, "location");
    new_event.address = str_field(payload, "address");
    new_event.price = str_field(payload, "price");
    new_event.organizer = str_field(payload, "organizer");
    new_event.contact = str_field(payload, "contact");
    new_event.website = Some(str_field(payload, "website"))
        .filter(|w| !w.is_empty())
        .unwrap_or_else(|| str_field(payload, "sourceUrl"));
    new_event.image = str_field(payload, "image");
    new_event.premium_level = PremiumLevel::Standard;
    if let (Some(lat), Some(lng)) = (number_field(payload, "lat"), number_field(payload, "lng")) {
        new_event.lat = lat;
        new_event.lng = lng;
    }
    Ok(new_event)
}

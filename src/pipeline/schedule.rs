//! Named scrape targets with a recurrence and a next-due timestamp.
//!
//! Nothing here runs on its own; `run`/`run_due` are invoked by an admin action or an external
//! periodic trigger.

use crate::domain::{
    NewCandidate, NewScrapingConfig, ScrapingConfig, ScrapingConfigRequest, ScrapingConfigUpdate,
};
use crate::error::{AppError, Result};
use crate::metrics::ReviewMetrics;
use crate::pipeline::dates::parse_event_date;
use crate::pipeline::dedup::find_duplicate;
use crate::pipeline::scraper::{Scraper, UrlFailure};
use crate::storage::Storage;
use crate::util::non_blank;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, instrument};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub config_id: i64,
    pub events_scraped: usize,
    pub events_inserted: usize,
    pub duplicates_found: usize,
    pub failures: Vec<UrlFailure>,
    pub summary: String,
    pub next_run_at: DateTime<Utc>,
    pub log: Vec<String>,
}

/// Result of one config inside a `run_due` sweep.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DueRun {
    pub config_id: i64,
    pub name: String,
    pub report: Option<RunReport>,
    pub error: Option<String>,
}

struct Ingested {
    scraped: usize,
    inserted: usize,
    duplicates: usize,
    failures: Vec<UrlFailure>,
    summary: String,
    log: Vec<String>,
}

pub struct ScheduleRegistry {
    storage: Arc<dyn Storage>,
    scraper: Arc<Scraper>,
}

fn validate_url(raw: &str) -> Result<String> {
    let url = raw.trim();
    url::Url::parse(url).map_err(|e| AppError::Validation(format!("invalid url '{url}': {e}")))?;
    Ok(url.to_string())
}

impl ScheduleRegistry {
    pub fn new(storage: Arc<dyn Storage>, scraper: Arc<Scraper>) -> Self {
        Self { storage, scraper }
    }

    pub async fn list(&self) -> Result<Vec<ScrapingConfig>> {
        self.storage.list_configs().await
    }

    pub async fn get(&self, id: i64) -> Result<ScrapingConfig> {
        self.storage
            .get_config(id)
            .await?
            .ok_or_else(|| AppError::not_found("scraping config", id))
    }

    pub async fn create(&self, request: ScrapingConfigRequest) -> Result<ScrapingConfig> {
        let name = non_blank(request.name).ok_or_else(|| AppError::Validation("name is required".into()))?;
        let url = non_blank(request.url).ok_or_else(|| AppError::Validation("url is required".into()))?;
        let url = validate_url(&url)?;
        let frequency = request.frequency.unwrap_or_default();
        let next_run_at = Some(frequency.next_after(Utc::now()));

        let config = self
            .storage
            .create_config(NewScrapingConfig {
                name,
                url,
                frequency,
                active: request.active.unwrap_or(true),
                next_run_at,
            })
            .await?;
        info!("Created scraping config {} ({})", config.id, config.name);
        Ok(config)
    }

    /// Merges the supplied fields; `next_run_at` moves only when `frequency` is supplied.
    pub async fn update(&self, id: i64, request: ScrapingConfigRequest) -> Result<ScrapingConfig> {
        let url = match non_blank(request.url) {
            Some(url) => Some(validate_url(&url)?),
            None => None,
        };
        let next_run_at = request.frequency.as_ref().map(|f| f.next_after(Utc::now()));
        self.storage
            .update_config(
                id,
                ScrapingConfigUpdate {
                    name: non_blank(request.name),
                    url,
                    frequency: request.frequency,
                    active: request.active,
                    last_run_at: None,
                    next_run_at,
                },
            )
            .await
    }

    /// Deletes the config and every candidate it produced. Returns the removed candidate count.
    pub async fn delete(&self, id: i64) -> Result<usize> {
        self.get(id).await?;
        let removed = self.storage.delete_candidates_for_config(id).await?;
        self.storage.delete_config(id).await?;
        info!("Deleted scraping config {} and {} candidate(s)", id, removed);
        Ok(removed)
    }

    pub async fn run(&self, id: i64) -> Result<RunReport> {
        self.run_at(id, Utc::now()).await
    }

    /// One scrape → flag → insert cycle at `now`. The schedule advances even when ingestion
    /// fails; that error is returned afterwards.
    #[instrument(skip(self))]
    pub async fn run_at(&self, id: i64, now: DateTime<Utc>) -> Result<RunReport> {
        let config = self.get(id).await?;
        let ingested = self.ingest(&config, now).await;

        let next_run_at = config.frequency.next_after(now);
        self.storage
            .update_config(
                id,
                ScrapingConfigUpdate {
                    last_run_at: Some(now),
                    next_run_at: Some(next_run_at),
                    ..Default::default()
                },
            )
            .await?;

        match ingested {
            Ok(ingested) => {
                ReviewMetrics::schedule_run("ok");
                info!(
                    "⏱️ Config {} run: {} scraped, {} inserted, next at {}",
                    id, ingested.scraped, ingested.inserted, next_run_at
                );
                Ok(RunReport {
                    config_id: id,
                    events_scraped: ingested.scraped,
                    events_inserted: ingested.inserted,
                    duplicates_found: ingested.duplicates,
                    failures: ingested.failures,
                    summary: ingested.summary,
                    next_run_at,
                    log: ingested.log,
                })
            }
            Err(e) => {
                ReviewMetrics::schedule_run("error");
                error!(config = id, error = %e, "scheduled ingestion failed");
                Err(e)
            }
        }
    }

    async fn ingest(&self, config: &ScrapingConfig, now: DateTime<Utc>) -> Result<Ingested> {
        let report = self.scraper.scrape(std::slice::from_ref(&config.url), false).await;
        let summary = report.summary();
        let mut log = report.log;
        let existing = self.storage.all_events().await?;
        let today = now.date_naive();

        let mut duplicates = 0;
        let candidates: Vec<NewCandidate> = report
            .events
            .iter()
            .map(|scraped| {
                let date = parse_event_date(&scraped.date, today);
                let mut candidate = NewCandidate {
                    scraping_config_id: config.id,
                    title: scraped.title.clone(),
                    date,
                    raw_date: scraped.date.clone(),
                    location: scraped.location.clone(),
                    description: scraped.description.clone(),
                    image: scraped.image.clone(),
                    source_url: scraped.detail_url.clone().unwrap_or_else(|| scraped.source_url.clone()),
                    lat: None,
                    lng: None,
                    is_duplicate: false,
                    duplicate_of: None,
                };
                let probe = candidate.clone().into_candidate(0, now);
                if let Some(hit) = find_duplicate(&probe, &existing) {
                    candidate.is_duplicate = true;
                    candidate.duplicate_of = Some(hit.id);
                    duplicates += 1;
                }
                candidate
            })
            .collect();
        ReviewMetrics::duplicates_flagged(duplicates);

        let scraped = candidates.len();
        let inserted = if candidates.is_empty() {
            0
        } else {
            self.storage.insert_candidates(candidates).await?.len()
        };
        log.step(format!("📥 {inserted} candidat(s) en attente de validation, {duplicates} doublon(s)"));

        Ok(Ingested {
            scraped,
            inserted,
            duplicates,
            failures: report.failures,
            summary,
            log: log.into_lines(),
        })
    }

    /// Runs every active config whose `next_run_at` has passed. One failure does not stop the sweep.
    pub async fn run_due(&self, now: DateTime<Utc>) -> Result<Vec<DueRun>> {
        let due: Vec<ScrapingConfig> = self
            .storage
            .all_configs()
            .await?
            .into_iter()
            .filter(|c| c.is_due(now))
            .collect();
        info!("{} scraping config(s) due", due.len());

        let mut runs = Vec::with_capacity(due.len());
        for config in due {
            let outcome = self.run_at(config.id, now).await;
            runs.push(DueRun {
                config_id: config.id,
                name: config.name,
                error: outcome.as_ref().err().map(|e| e.to_string()),
                report: outcome.ok(),
            });
        }
        Ok(runs)
    }
}

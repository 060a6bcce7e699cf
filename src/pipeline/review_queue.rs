//! Pending-review queue: pending → validated | rejected, nothing out of a terminal state.

use crate::constants::{DEFAULT_VALIDATED_PRICE, DEFAULT_VALIDATED_TIME};
use crate::domain::{
    CandidateStatus, Event, EventPatch, NewEvent, Page, PageRequest, Resolution, ScrapedEventCandidate,
};
use crate::error::{AppError, Result};
use crate::metrics::ReviewMetrics;
use crate::pipeline::geocoder::GeocoderAdapter;
use crate::storage::Storage;
use crate::util::non_blank;
use chrono::{Local, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};

#[derive(Debug, Clone, Serialize)]
pub struct Validated {
    pub event: Event,
    pub candidate: ScrapedEventCandidate,
}

pub struct ReviewQueue {
    storage: Arc<dyn Storage>,
    geocoder: GeocoderAdapter,
}

fn ensure_pending(candidate: &ScrapedEventCandidate) -> Result<()> {
    match candidate.status() {
        CandidateStatus::Pending => Ok(()),
        terminal => Err(AppError::AlreadyTerminal {
            id: candidate.id,
            state: terminal.as_str(),
        }),
    }
}

fn pick(value: Option<String>, fallback: impl Into<String>) -> String {
    non_blank(value).unwrap_or_else(|| fallback.into())
}

impl ReviewQueue {
    pub fn new(storage: Arc<dyn Storage>, geocoder: GeocoderAdapter) -> Self {
        Self { storage, geocoder }
    }

    pub async fn list_pending(
        &self,
        config_id: Option<i64>,
        page: PageRequest,
    ) -> Result<Page<ScrapedEventCandidate>> {
        self.storage.list_pending_candidates(config_id, page).await
    }

    async fn load(&self, id: i64) -> Result<ScrapedEventCandidate> {
        self.storage
            .get_candidate(id)
            .await?
            .ok_or_else(|| AppError::not_found("candidate", id))
    }

    /// Builds the event from overrides, then candidate fields, then defaults.
    async fn build_event(&self, candidate: &ScrapedEventCandidate, overrides: EventPatch) -> Result<NewEvent> {
        let title = pick(overrides.title, candidate.title.clone());
        if title.trim().is_empty() {
            return Err(AppError::Validation("title is required".into()));
        }
        let location = pick(overrides.location, candidate.location.clone());
        let address = pick(overrides.address, location.clone());

        let (lat, lng) = match (overrides.lat, overrides.lng, candidate.lat, candidate.lng) {
            (Some(lat), Some(lng), _, _) => (lat, lng),
            (_, _, Some(lat), Some(lng)) => (lat, lng),
            _ => {
                let outcome = self.geocoder.resolve(&address).await;
                (outcome.lat, outcome.lng)
            }
        };

        Ok(NewEvent {
            title,
            category: overrides.category.unwrap_or_default(),
            description: pick(overrides.description, candidate.description.clone()),
            date: overrides
                .date
                .or(candidate.date)
                .unwrap_or_else(|| Local::now().date_naive()),
            time: pick(overrides.time, DEFAULT_VALIDATED_TIME),
            location,
            address,
            price: pick(overrides.price, DEFAULT_VALIDATED_PRICE),
            organizer: pick(overrides.organizer, ""),
            contact: pick(overrides.contact, ""),
            website: pick(overrides.website, candidate.source_url.clone()),
            image: pick(overrides.image, candidate.image.clone()),
            lat,
            lng,
            premium_level: overrides.premium_level.unwrap_or_default(),
        })
    }

    /// Promotes a pending candidate into a published event.
    ///
    /// The event is written first; if the candidate turns out to be resolved concurrently, the
    /// event is deleted again and `AlreadyTerminal` is returned.
    #[instrument(skip(self, overrides))]
    pub async fn validate(&self, id: i64, overrides: EventPatch) -> Result<Validated> {
        let candidate = self.load(id).await?;
        ensure_pending(&candidate)?;

        let new_event = self.build_event(&candidate, overrides).await?;
        let event = self.storage.create_event(new_event).await?;

        let resolution = Resolution::Validated {
            event_id: event.id,
            at: Utc::now(),
        };
        match self.storage.resolve_candidate(id, resolution).await {
            Ok(candidate) => {
                ReviewMetrics::validated();
                info!("✅ Candidate {} validated as event {}", id, event.id);
                Ok(Validated { event, candidate })
            }
            Err(e) => {
                warn!(candidate = id, event = event.id, error = %e, "candidate resolution failed, removing event");
                if let Err(cleanup) = self.storage.delete_event(event.id).await {
                    warn!(event = event.id, error = %cleanup, "compensating delete failed");
                }
                Err(e)
            }
        }
    }

    #[instrument(skip(self))]
    pub async fn reject(&self, id: i64, reason: Option<String>) -> Result<ScrapedEventCandidate> {
        let candidate = self.load(id).await?;
        ensure_pending(&candidate)?;
        let rejected = self
            .storage
            .resolve_candidate(
                id,
                Resolution::Rejected {
                    reason: non_blank(reason),
                    at: Utc::now(),
                },
            )
            .await?;
        ReviewMetrics::rejected();
        info!("🗑️ Candidate {} rejected", id);
        Ok(rejected)
    }
}

//! Admin CRUD over actors and events.

use crate::constants::{FALLBACK_LAT, FALLBACK_LNG};
use crate::domain::{
    Actor, ActorPatch, ActorQuery, EntityKind, Event, EventPatch, EventQuery, NewActor, NewEvent, Page,
};
use crate::error::{AppError, Result};
use crate::pipeline::dedup::{find_duplicate, find_duplicate_actor};
use crate::pipeline::geocoder::GeocoderAdapter;
use crate::storage::Storage;
use chrono::Local;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

/// A created record plus an advisory duplicate warning. Creation is never blocked.
#[derive(Debug, Clone, Serialize)]
pub struct Created<T> {
    pub record: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

pub struct Catalog {
    storage: Arc<dyn Storage>,
    geocoder: GeocoderAdapter,
}

impl Catalog {
    pub fn new(storage: Arc<dyn Storage>, geocoder: GeocoderAdapter) -> Self {
        Self { storage, geocoder }
    }

    // Actors

    pub async fn list_actors(&self, query: &ActorQuery) -> Result<Page<Actor>> {
        self.storage.list_actors(query).await
    }

    pub async fn get_actor(&self, id: &str) -> Result<Actor> {
        self.storage
            .get_actor(id)
            .await?
            .ok_or_else(|| AppError::not_found("actor", id))
    }

    pub async fn create_actor(&self, mut actor: NewActor) -> Result<Created<Actor>> {
        if actor.name.trim().is_empty() {
            return Err(AppError::Validation("name is required".into()));
        }
        let existing = self.storage.all_actors().await?;
        let warning = find_duplicate_actor(&actor, &existing).map(|dup| {
            warn!(name = %actor.name, existing = %dup.id, "possible duplicate actor");
            format!("Un acteur similaire existe déjà : {} ({})", dup.name, dup.id)
        });

        if actor.lat.is_none() || actor.lng.is_none() {
            let outcome = self.geocoder.resolve(&actor.address).await;
            actor.lat = Some(outcome.lat);
            actor.lng = Some(outcome.lng);
        }

        let record = self.storage.create_actor(actor).await?;
        info!("Created actor {} ({})", record.name, record.id);
        Ok(Created { record, warning })
    }

    pub async fn update_actor(&self, id: &str, patch: ActorPatch) -> Result<Actor> {
        self.storage.update_actor(id, patch).await
    }

    pub async fn delete_actor(&self, id: &str) -> Result<()> {
        if self.storage.delete_actor(id).await? {
            Ok(())
        } else {
            Err(AppError::not_found("actor", id))
        }
    }

    // Events

    pub async fn list_events(&self, query: &EventQuery) -> Result<Page<Event>> {
        self.storage.list_events(query, Local::now().date_naive()).await
    }

    pub async fn get_event(&self, id: i64) -> Result<Event> {
        self.storage
            .get_event(id)
            .await?
            .ok_or_else(|| AppError::not_found("event", id))
    }

    /// Coordinates still at the fallback town centre count as unknown and are geocoded.
    pub async fn create_event(&self, mut event: NewEvent) -> Result<Created<Event>> {
        if event.title.trim().is_empty() {
            return Err(AppError::Validation("title is required".into()));
        }
        let existing = self.storage.all_events().await?;
        let probe = event.clone().into_event(0, chrono::Utc::now());
        let warning = find_duplicate(&probe, &existing).map(|dup| {
            warn!(title = %event.title, existing = dup.id, "possible duplicate event");
            format!("Un événement similaire existe déjà : {} ({})", dup.title, dup.id)
        });

        if event.lat == FALLBACK_LAT && event.lng == FALLBACK_LNG {
            let address = if event.address.trim().is_empty() {
                &event.location
            } else {
                &event.address
            };
            let outcome = self.geocoder.resolve(address).await;
            event.lat = outcome.lat;
            event.lng = outcome.lng;
        }

        let record = self.storage.create_event(event).await?;
        info!("Created event {} ({})", record.title, record.id);
        Ok(Created { record, warning })
    }

    pub async fn update_event(&self, id: i64, patch: EventPatch) -> Result<Event> {
        self.storage.update_event(id, patch).await
    }

    pub async fn delete_event(&self, id: i64) -> Result<()> {
        if self.storage.delete_event(id).await? {
            Ok(())
        } else {
            Err(AppError::not_found("event", id))
        }
    }

    /// Best effort: unknown or failing ids are skipped. Returns how many records were removed.
    pub async fn bulk_delete(&self, kind: EntityKind, ids: &[String]) -> Result<usize> {
        if ids.is_empty() {
            return Err(AppError::Validation("ids must not be empty".into()));
        }
        let mut deleted = 0;
        for id in ids {
            let outcome = match kind {
                EntityKind::Actors => self.storage.delete_actor(id).await,
                EntityKind::Events => match id.trim().parse::<i64>() {
                    Ok(id) => self.storage.delete_event(id).await,
                    Err(_) => Ok(false),
                },
            };
            match outcome {
                Ok(true) => deleted += 1,
                Ok(false) => warn!(kind = kind.as_str(), id = %id, "bulk delete: id not found"),
                Err(e) => warn!(kind = kind.as_str(), id = %id, error = %e, "bulk delete: delete failed"),
            }
        }
        info!("Bulk deleted {}/{} {}", deleted, ids.len(), kind.as_str());
        Ok(deleted)
    }
}

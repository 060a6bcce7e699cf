use super::Storage;
use crate::domain::*;
use crate::error::{AppError, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;
use uuid::Uuid;

/// In-memory storage implementation for development/testing
pub struct InMemoryStorage {
    actors: Arc<Mutex<HashMap<String, Actor>>>,
    events: Arc<Mutex<BTreeMap<i64, Event>>>,
    candidates: Arc<Mutex<BTreeMap<i64, ScrapedEventCandidate>>>,
    configs: Arc<Mutex<BTreeMap<i64, ScrapingConfig>>>,
    next_id: AtomicI64,
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self {
            actors: Arc::new(Mutex::new(HashMap::new())),
            events: Arc::new(Mutex::new(BTreeMap::new())),
            candidates: Arc::new(Mutex::new(BTreeMap::new())),
            configs: Arc::new(Mutex::new(BTreeMap::new())),
            next_id: AtomicI64::new(1),
        }
    }

    fn next_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| AppError::Storage("in-memory store lock poisoned".into()))
}

#[async_trait]
impl Storage for InMemoryStorage {
    async fn all_actors(&self) -> Result<Vec<Actor>> {
        Ok(lock(&self.actors)?.values().cloned().collect())
    }

    async fn get_actor(&self, id: &str) -> Result<Option<Actor>> {
        Ok(lock(&self.actors)?.get(id).cloned())
    }

    async fn create_actor(&self, actor: NewActor) -> Result<Actor> {
        let actor = actor.into_actor(Uuid::new_v4().to_string(), Utc::now());
        lock(&self.actors)?.insert(actor.id.clone(), actor.clone());
        debug!("Created actor: {} with id {}", actor.name, actor.id);
        Ok(actor)
    }

    async fn update_actor(&self, id: &str, patch: ActorPatch) -> Result<Actor> {
        let mut actors = lock(&self.actors)?;
        let actor = actors
            .get_mut(id)
            .ok_or_else(|| AppError::not_found("actor", id))?;
        patch.apply(actor, Utc::now());
        Ok(actor.clone())
    }

    async fn delete_actor(&self, id: &str) -> Result<bool> {
        Ok(lock(&self.actors)?.remove(id).is_some())
    }

    async fn all_events(&self) -> Result<Vec<Event>> {
        Ok(lock(&self.events)?.values().cloned().collect())
    }

    async fn get_event(&self, id: i64) -> Result<Option<Event>> {
        Ok(lock(&self.events)?.get(&id).cloned())
    }

    async fn create_event(&self, event: NewEvent) -> Result<Event> {
        let event = event.into_event(self.next_id(), Utc::now());
        lock(&self.events)?.insert(event.id, event.clone());
        debug!("Created event: {} with id {}", event.title, event.id);
        Ok(event)
    }

    async fn update_event(&self, id: i64, patch: EventPatch) -> Result<Event> {
        let mut events = lock(&self.events)?;
        let event = events
            .get_mut(&id)
            .ok_or_else(|| AppError::not_found("event", id))?;
        patch.apply(event, Utc::now());
        Ok(event.clone())
    }

    async fn delete_event(&self, id: i64) -> Result<bool> {
        Ok(lock(&self.events)?.remove(&id).is_some())
    }

    async fn insert_candidates(&self, candidates: Vec<NewCandidate>) -> Result<Vec<ScrapedEventCandidate>> {
        let now = Utc::now();
        let mut stored = lock(&self.candidates)?;
        let created: Vec<ScrapedEventCandidate> = candidates
            .into_iter()
            .map(|c| c.into_candidate(self.next_id(), now))
            .collect();
        for candidate in &created {
            stored.insert(candidate.id, candidate.clone());
        }
        debug!("Inserted {} pending candidates", created.len());
        Ok(created)
    }

    async fn get_candidate(&self, id: i64) -> Result<Option<ScrapedEventCandidate>> {
        Ok(lock(&self.candidates)?.get(&id).cloned())
    }

    async fn all_candidates(&self, config_id: Option<i64>) -> Result<Vec<ScrapedEventCandidate>> {
        Ok(lock(&self.candidates)?
            .values()
            .filter(|c| config_id.map_or(true, |id| c.scraping_config_id == id))
            .cloned()
            .collect())
    }

    async fn resolve_candidate(&self, id: i64, resolution: Resolution) -> Result<ScrapedEventCandidate> {
        let mut candidates = lock(&self.candidates)?;
        let candidate = candidates
            .get_mut(&id)
            .ok_or_else(|| AppError::not_found("candidate", id))?;
        resolution.apply(candidate)?;
        Ok(candidate.clone())
    }

    async fn delete_candidates_for_config(&self, config_id: i64) -> Result<usize> {
        let mut candidates = lock(&self.candidates)?;
        let before = candidates.len();
        candidates.retain(|_, c| c.scraping_config_id != config_id);
        Ok(before - candidates.len())
    }

    async fn all_configs(&self) -> Result<Vec<ScrapingConfig>> {
        Ok(lock(&self.configs)?.values().cloned().collect())
    }

    async fn get_config(&self, id: i64) -> Result<Option<ScrapingConfig>> {
        Ok(lock(&self.configs)?.get(&id).cloned())
    }

    async fn create_config(&self, config: NewScrapingConfig) -> Result<ScrapingConfig> {
        let config = config.into_config(self.next_id(), Utc::now());
        lock(&self.configs)?.insert(config.id, config.clone());
        Ok(config)
    }

    async fn update_config(&self, id: i64, update: ScrapingConfigUpdate) -> Result<ScrapingConfig> {
        let mut configs = lock(&self.configs)?;
        let config = configs
            .get_mut(&id)
            .ok_or_else(|| AppError::not_found("scraping config", id))?;
        update.apply(config);
        Ok(config.clone())
    }

    async fn delete_config(&self, id: i64) -> Result<bool> {
        Ok(lock(&self.configs)?.remove(&id).is_some())
    }
}

//! Persistence boundary for actors, events, review candidates and scrape schedules.
//!
//! The pipeline only talks to [`Storage`]; each statement-level call is expected to be atomic,
//! nothing larger. Filtering and paging are shared default methods so every backend sorts the
//! same way.

mod in_memory;
mod sqlite;

pub use in_memory::InMemoryStorage;
pub use sqlite::SqliteStorage;

use crate::domain::*;
use crate::error::Result;
use async_trait::async_trait;
use chrono::NaiveDate;

#[async_trait]
pub trait Storage: Send + Sync {
    // Actor operations
    async fn all_actors(&self) -> Result<Vec<Actor>>;
    async fn get_actor(&self, id: &str) -> Result<Option<Actor>>;
    async fn create_actor(&self, actor: NewActor) -> Result<Actor>;
    /// Fails with `NotFound` when the actor is missing.
    async fn update_actor(&self, id: &str, patch: ActorPatch) -> Result<Actor>;
    async fn delete_actor(&self, id: &str) -> Result<bool>;

    // Event operations
    async fn all_events(&self) -> Result<Vec<Event>>;
    async fn get_event(&self, id: i64) -> Result<Option<Event>>;
    async fn create_event(&self, event: NewEvent) -> Result<Event>;
    async fn update_event(&self, id: i64, patch: EventPatch) -> Result<Event>;
    async fn delete_event(&self, id: i64) -> Result<bool>;

    // Review candidate operations
    async fn insert_candidates(&self, candidates: Vec<NewCandidate>) -> Result<Vec<ScrapedEventCandidate>>;
    async fn get_candidate(&self, id: i64) -> Result<Option<ScrapedEventCandidate>>;
    /// Every candidate, terminal or not, optionally limited to one schedule.
    async fn all_candidates(&self, config_id: Option<i64>) -> Result<Vec<ScrapedEventCandidate>>;
    /// Compare-and-set from pending to a terminal state. `NotFound` or `AlreadyTerminal` otherwise.
    async fn resolve_candidate(&self, id: i64, resolution: Resolution) -> Result<ScrapedEventCandidate>;
    async fn delete_candidates_for_config(&self, config_id: i64) -> Result<usize>;

    // Schedule operations
    async fn all_configs(&self) -> Result<Vec<ScrapingConfig>>;
    async fn get_config(&self, id: i64) -> Result<Option<ScrapingConfig>>;
    async fn create_config(&self, config: NewScrapingConfig) -> Result<ScrapingConfig>;
    async fn update_config(&self, id: i64, update: ScrapingConfigUpdate) -> Result<ScrapingConfig>;
    async fn delete_config(&self, id: i64) -> Result<bool>;

    /// Actors by name, filtered and paged.
    async fn list_actors(&self, query: &ActorQuery) -> Result<Page<Actor>> {
        let mut actors: Vec<Actor> = self
            .all_actors()
            .await?
            .into_iter()
            .filter(|a| query.matches(a))
            .collect();
        actors.sort_by_key(|a| a.name.to_lowercase());
        Ok(Page::from_sorted(actors, query.page_request()))
    }

    /// Events newest date first, filtered against `today` and paged.
    async fn list_events(&self, query: &EventQuery, today: NaiveDate) -> Result<Page<Event>> {
        let mut events: Vec<Event> = self
            .all_events()
            .await?
            .into_iter()
            .filter(|e| query.matches(e, today))
            .collect();
        events.sort_by(|a, b| b.date.cmp(&a.date).then(b.id.cmp(&a.id)));
        Ok(Page::from_sorted(events, query.page_request()))
    }

    /// The visible backlog: neither validated nor rejected, newest first.
    async fn list_pending_candidates(
        &self,
        config_id: Option<i64>,
        page: PageRequest,
    ) -> Result<Page<ScrapedEventCandidate>> {
        let mut pending: Vec<ScrapedEventCandidate> = self
            .all_candidates(config_id)
            .await?
            .into_iter()
            .filter(|c| c.status() == CandidateStatus::Pending)
            .collect();
        pending.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(Page::from_sorted(pending, page))
    }

    /// Schedules, most recently created first.
    async fn list_configs(&self) -> Result<Vec<ScrapingConfig>> {
        let mut configs = self.all_configs().await?;
        configs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(configs)
    }
}

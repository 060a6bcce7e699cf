use super::Storage;
use crate::domain::*;
use crate::error::{AppError, Result};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};
use uuid::Uuid;

const SCHEMA: &str = r#"
PRAGMA journal_mode=WAL;
CREATE TABLE IF NOT EXISTS actors (
    id    TEXT PRIMARY KEY,
    name  TEXT NOT NULL,
    data  TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS events (
    id    INTEGER PRIMARY KEY AUTOINCREMENT,
    date  TEXT NOT NULL,
    data  TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS scraping_configs (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    created_at  TEXT NOT NULL,
    data        TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS scraped_events_pending (
    id                  INTEGER PRIMARY KEY AUTOINCREMENT,
    scraping_config_id  INTEGER NOT NULL,
    validated           INTEGER NOT NULL DEFAULT 0,
    rejected            INTEGER NOT NULL DEFAULT 0,
    created_at          TEXT NOT NULL,
    data                TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_pending_config ON scraped_events_pending (scraping_config_id);
"#;

/// SQLite-backed store. Each row keeps its lookup columns plus the full record as JSON.
///
/// One connection behind a mutex, so every trait call runs as a single serialized unit.
pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

impl SqliteStorage {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path.as_ref())?;
        conn.execute_batch(SCHEMA)?;
        info!("Opened SQLite store at {}", path.as_ref().display());
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| AppError::Storage("sqlite connection lock poisoned".into()))
    }
}

fn decode<T: DeserializeOwned>(data: String) -> Result<T> {
    Ok(serde_json::from_str(&data)?)
}

fn load_all<T: DeserializeOwned>(conn: &Connection, sql: &str, args: &[&dyn rusqlite::ToSql]) -> Result<Vec<T>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(args, |row| row.get::<_, String>(0))?;
    let mut out = Vec::new();
    for row in rows {
        out.push(decode(row?)?);
    }
    Ok(out)
}

fn load_one<T: DeserializeOwned>(conn: &Connection, sql: &str, args: &[&dyn rusqlite::ToSql]) -> Result<Option<T>> {
    let data: Option<String> = conn.query_row(sql, args, |row| row.get(0)).optional()?;
    data.map(decode).transpose()
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn all_actors(&self) -> Result<Vec<Actor>> {
        let conn = self.conn()?;
        load_all(&conn, "SELECT data FROM actors", &[])
    }

    async fn get_actor(&self, id: &str) -> Result<Option<Actor>> {
        let conn = self.conn()?;
        load_one(&conn, "SELECT data FROM actors WHERE id = ?1", &[&id])
    }

    async fn create_actor(&self, actor: NewActor) -> Result<Actor> {
        let actor = actor.into_actor(Uuid::new_v4().to_string(), Utc::now());
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO actors (id, name, data) VALUES (?1, ?2, ?3)",
            params![actor.id, actor.name, serde_json::to_string(&actor)?],
        )?;
        debug!("Created actor: {} with id {}", actor.name, actor.id);
        Ok(actor)
    }

    async fn update_actor(&self, id: &str, patch: ActorPatch) -> Result<Actor> {
        let conn = self.conn()?;
        let mut actor: Actor = load_one(&conn, "SELECT data FROM actors WHERE id = ?1", &[&id])?
            .ok_or_else(|| AppError::not_found("actor", id))?;
        patch.apply(&mut actor, Utc::now());
        conn.execute(
            "UPDATE actors SET name = ?1, data = ?2 WHERE id = ?3",
            params![actor.name, serde_json::to_string(&actor)?, id],
        )?;
        Ok(actor)
    }

    async fn delete_actor(&self, id: &str) -> Result<bool> {
        let conn = self.conn()?;
        Ok(conn.execute("DELETE FROM actors WHERE id = ?1", params![id])? > 0)
    }

    async fn all_events(&self) -> Result<Vec<Event>> {
        let conn = self.conn()?;
        load_all(&conn, "SELECT data FROM events", &[])
    }

    async fn get_event(&self, id: i64) -> Result<Option<Event>> {
        let conn = self.conn()?;
        load_one(&conn, "SELECT data FROM events WHERE id = ?1", &[&id])
    }

    async fn create_event(&self, event: NewEvent) -> Result<Event> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO events (date, data) VALUES (?1, '{}')",
            params![event.date.to_string()],
        )?;
        let event = event.into_event(tx.last_insert_rowid(), Utc::now());
        tx.execute(
            "UPDATE events SET data = ?1 WHERE id = ?2",
            params![serde_json::to_string(&event)?, event.id],
        )?;
        tx.commit()?;
        debug!("Created event: {} with id {}", event.title, event.id);
        Ok(event)
    }

    async fn update_event(&self, id: i64, patch: EventPatch) -> Result<Event> {
        let conn = self.conn()?;
        let mut event: Event = load_one(&conn, "SELECT data FROM events WHERE id = ?1", &[&id])?
            .ok_or_else(|| AppError::not_found("event", id))?;
        patch.apply(&mut event, Utc::now());
        conn.execute(
            "UPDATE events SET date = ?1, data = ?2 WHERE id = ?3",
            params![event.date.to_string(), serde_json::to_string(&event)?, id],
        )?;
        Ok(event)
    }

    async fn delete_event(&self, id: i64) -> Result<bool> {
        let conn = self.conn()?;
        Ok(conn.execute("DELETE FROM events WHERE id = ?1", params![id])? > 0)
    }

    async fn insert_candidates(&self, candidates: Vec<NewCandidate>) -> Result<Vec<ScrapedEventCandidate>> {
        let now = Utc::now();
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let mut created = Vec::with_capacity(candidates.len());
        for new in candidates {
            tx.execute(
                "INSERT INTO scraped_events_pending (scraping_config_id, created_at, data) VALUES (?1, ?2, '{}')",
                params![new.scraping_config_id, now.to_rfc3339()],
            )?;
            let candidate = new.into_candidate(tx.last_insert_rowid(), now);
            tx.execute(
                "UPDATE scraped_events_pending SET data = ?1 WHERE id = ?2",
                params![serde_json::to_string(&candidate)?, candidate.id],
            )?;
            created.push(candidate);
        }
        tx.commit()?;
        debug!("Inserted {} pending candidates", created.len());
        Ok(created)
    }

    async fn get_candidate(&self, id: i64) -> Result<Option<ScrapedEventCandidate>> {
        let conn = self.conn()?;
        load_one(&conn, "SELECT data FROM scraped_events_pending WHERE id = ?1", &[&id])
    }

    async fn all_candidates(&self, config_id: Option<i64>) -> Result<Vec<ScrapedEventCandidate>> {
        let conn = self.conn()?;
        match config_id {
            Some(config_id) => load_all(
                &conn,
                "SELECT data FROM scraped_events_pending WHERE scraping_config_id = ?1",
                &[&config_id],
            ),
            None => load_all(&conn, "SELECT data FROM scraped_events_pending", &[]),
        }
    }

    async fn resolve_candidate(&self, id: i64, resolution: Resolution) -> Result<ScrapedEventCandidate> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let mut candidate: ScrapedEventCandidate =
            load_one(&tx, "SELECT data FROM scraped_events_pending WHERE id = ?1", &[&id])?
                .ok_or_else(|| AppError::not_found("candidate", id))?;
        resolution.apply(&mut candidate)?;
        let changed = tx.execute(
            "UPDATE scraped_events_pending SET validated = ?1, rejected = ?2, data = ?3
             WHERE id = ?4 AND validated = 0 AND rejected = 0",
            params![
                candidate.validated,
                candidate.rejected,
                serde_json::to_string(&candidate)?,
                id
            ],
        )?;
        if changed == 0 {
            return Err(AppError::Storage(format!("candidate {id} changed concurrently")));
        }
        tx.commit()?;
        Ok(candidate)
    }

    async fn delete_candidates_for_config(&self, config_id: i64) -> Result<usize> {
        let conn = self.conn()?;
        Ok(conn.execute(
            "DELETE FROM scraped_events_pending WHERE scraping_config_id = ?1",
            params![config_id],
        )?)
    }

    async fn all_configs(&self) -> Result<Vec<ScrapingConfig>> {
        let conn = self.conn()?;
        load_all(&conn, "SELECT data FROM scraping_configs", &[])
    }

    async fn get_config(&self, id: i64) -> Result<Option<ScrapingConfig>> {
        let conn = self.conn()?;
        load_one(&conn, "SELECT data FROM scraping_configs WHERE id = ?1", &[&id])
    }

    async fn create_config(&self, config: NewScrapingConfig) -> Result<ScrapingConfig> {
        let now = Utc::now();
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO scraping_configs (created_at, data) VALUES (?1, '{}')",
            params![now.to_rfc3339()],
        )?;
        let config = config.into_config(tx.last_insert_rowid(), now);
        tx.execute(
            "UPDATE scraping_configs SET data = ?1 WHERE id = ?2",
            params![serde_json::to_string(&config)?, config.id],
        )?;
        tx.commit()?;
        Ok(config)
    }

    async fn update_config(&self, id: i64, update: ScrapingConfigUpdate) -> Result<ScrapingConfig> {
        let conn = self.conn()?;
        let mut config: ScrapingConfig =
            load_one(&conn, "SELECT data FROM scraping_configs WHERE id = ?1", &[&id])?
                .ok_or_else(|| AppError::not_found("scraping config", id))?;
        update.apply(&mut config);
        conn.execute(
            "UPDATE scraping_configs SET data = ?1 WHERE id = ?2",
            params![serde_json::to_string(&config)?, id],
        )?;
        Ok(config)
    }

    async fn delete_config(&self, id: i64) -> Result<bool> {
        let conn = self.conn()?;
        Ok(conn.execute("DELETE FROM scraping_configs WHERE id = ?1", params![id])? > 0)
    }
}

//! Entity and request shapes shared by storage, the pipeline and the HTTP layer.

use crate::constants::{self, FALLBACK_LAT, FALLBACK_LNG};
use crate::error::{AppError, Result};
use crate::util::{fold, non_blank};
use chrono::{DateTime, Duration, Months, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

fn fallback_lat() -> f64 {
    FALLBACK_LAT
}

fn fallback_lng() -> f64 {
    FALLBACK_LNG
}

// ---------------------------------------------------------------------------
// Enumerations
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventCategory {
    Festival,
    Marche,
    #[default]
    Culture,
    Sport,
    Atelier,
    Theatre,
}

impl EventCategory {
    pub const ALL: [EventCategory; 6] = [
        EventCategory::Festival,
        EventCategory::Marche,
        EventCategory::Culture,
        EventCategory::Sport,
        EventCategory::Atelier,
        EventCategory::Theatre,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventCategory::Festival => "festival",
            EventCategory::Marche => "marche",
            EventCategory::Culture => "culture",
            EventCategory::Sport => "sport",
            EventCategory::Atelier => "atelier",
            EventCategory::Theatre => "theatre",
        }
    }

    pub fn placeholder_image(&self) -> &'static str {
        match self {
            EventCategory::Festival => constants::PLACEHOLDER_FESTIVAL,
            EventCategory::Marche => constants::PLACEHOLDER_MARCHE,
            EventCategory::Culture => constants::PLACEHOLDER_CULTURE,
            EventCategory::Sport => constants::PLACEHOLDER_SPORT,
            EventCategory::Atelier => constants::PLACEHOLDER_ATELIER,
            EventCategory::Theatre => constants::PLACEHOLDER_THEATRE,
        }
    }

    /// Maps free-form labels (accents, plurals, common synonyms) onto a category.
    pub fn from_loose(raw: &str) -> Option<Self> {
        let key = fold(raw);
        if key.is_empty() {
            return None;
        }
        if let Some(exact) = Self::ALL.iter().find(|c| c.as_str() == key) {
            return Some(*exact);
        }
        let category = if key.contains("festival") || key.contains("fete") {
            EventCategory::Festival
        } else if key.contains("marche") || key.contains("brocante") || key.contains("vide-grenier") {
            EventCategory::Marche
        } else if key.contains("theatre") || key.contains("spectacle") || key.contains("cirque") {
            EventCategory::Theatre
        } else if key.contains("sport")
            || key.contains("rando")
            || key.contains("petanque")
            || key.contains("course")
            || key.contains("trail")
        {
            EventCategory::Sport
        } else if key.contains("atelier") || key.contains("stage") || key.contains("workshop") {
            EventCategory::Atelier
        } else if key.contains("concert")
            || key.contains("expo")
            || key.contains("conference")
            || key.contains("cinema")
            || key.contains("musique")
            || key.contains("culture")
        {
            EventCategory::Culture
        } else {
            return None;
        };
        Some(category)
    }
}

impl fmt::Display for EventCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventCategory {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .find(|c| c.as_str() == s.trim())
            .copied()
            .ok_or_else(|| AppError::Validation(format!("unknown event category '{s}'")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActorCategory {
    #[default]
    Commerce,
    Restaurant,
    Artisan,
    Therapeute,
    Service,
    Association,
}

impl ActorCategory {
    pub const ALL: [ActorCategory; 6] = [
        ActorCategory::Commerce,
        ActorCategory::Restaurant,
        ActorCategory::Artisan,
        ActorCategory::Therapeute,
        ActorCategory::Service,
        ActorCategory::Association,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActorCategory::Commerce => "commerce",
            ActorCategory::Restaurant => "restaurant",
            ActorCategory::Artisan => "artisan",
            ActorCategory::Therapeute => "therapeute",
            ActorCategory::Service => "service",
            ActorCategory::Association => "association",
        }
    }
}

impl FromStr for ActorCategory {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .find(|c| c.as_str() == s.trim())
            .copied()
            .ok_or_else(|| AppError::Validation(format!("unknown actor category '{s}'")))
    }
}

/// Display tier. Stored and passed through, never branched on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PremiumLevel {
    #[default]
    #[serde(rename = "standard")]
    Standard,
    #[serde(rename = "premium")]
    Premium,
    #[serde(rename = "mega-premium")]
    MegaPremium,
}

// ---------------------------------------------------------------------------
// Actors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    pub name: String,
    pub category: ActorCategory,
    pub description: String,
    pub address: String,
    pub phone: String,
    pub email: String,
    pub website: String,
    pub horaires: String,
    pub specialites: Vec<String>,
    pub lat: f64,
    pub lng: f64,
    pub image: String,
    pub rating: Option<f64>,
    pub reviews_count: Option<u32>,
    pub premium_level: PremiumLevel,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewActor {
    pub name: String,
    #[serde(default)]
    pub category: ActorCategory,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub website: String,
    #[serde(default)]
    pub horaires: String,
    #[serde(default)]
    pub specialites: Vec<String>,
    /// Resolved from the address on create when absent.
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lng: Option<f64>,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub rating: Option<f64>,
    #[serde(default)]
    pub reviews_count: Option<u32>,
    #[serde(default)]
    pub premium_level: PremiumLevel,
}

impl NewActor {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            category: ActorCategory::default(),
            description: String::new(),
            address: String::new(),
            phone: String::new(),
            email: String::new(),
            website: String::new(),
            horaires: String::new(),
            specialites: Vec::new(),
            lat: None,
            lng: None,
            image: String::new(),
            rating: None,
            reviews_count: None,
            premium_level: PremiumLevel::default(),
        }
    }

    pub fn into_actor(self, id: String, now: DateTime<Utc>) -> Actor {
        Actor {
            id,
            name: self.name,
            category: self.category,
            description: self.description,
            address: self.address,
            phone: self.phone,
            email: self.email,
            website: self.website,
            horaires: self.horaires,
            specialites: self.specialites,
            lat: self.lat.unwrap_or(FALLBACK_LAT),
            lng: self.lng.unwrap_or(FALLBACK_LNG),
            image: if self.image.trim().is_empty() {
                constants::PLACEHOLDER_ACTOR.to_string()
            } else {
                self.image
            },
            rating: self.rating,
            reviews_count: self.reviews_count,
            premium_level: self.premium_level,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActorPatch {
    pub name: Option<String>,
    pub category: Option<ActorCategory>,
    pub description: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub website: Option<String>,
    pub horaires: Option<String>,
    pub specialites: Option<Vec<String>>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub image: Option<String>,
    pub rating: Option<f64>,
    pub reviews_count: Option<u32>,
    pub premium_level: Option<PremiumLevel>,
}

impl ActorPatch {
    pub fn apply(self, actor: &mut Actor, now: DateTime<Utc>) {
        if let Some(v) = self.name {
            actor.name = v;
        }
        if let Some(v) = self.category {
            actor.category = v;
        }
        if let Some(v) = self.description {
            actor.description = v;
        }
        if let Some(v) = self.address {
            actor.address = v;
        }
        if let Some(v) = self.phone {
            actor.phone = v;
        }
        if let Some(v) = self.email {
            actor.email = v;
        }
        if let Some(v) = self.website {
            actor.website = v;
        }
        if let Some(v) = self.horaires {
            actor.horaires = v;
        }
        if let Some(v) = self.specialites {
            actor.specialites = v;
        }
        if let Some(v) = self.lat {
            actor.lat = v;
        }
        if let Some(v) = self.lng {
            actor.lng = v;
        }
        if let Some(v) = self.image {
            actor.image = v;
        }
        if self.rating.is_some() {
            actor.rating = self.rating;
        }
        if self.reviews_count.is_some() {
            actor.reviews_count = self.reviews_count;
        }
        if let Some(v) = self.premium_level {
            actor.premium_level = v;
        }
        actor.updated_at = now;
    }
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: i64,
    pub title: String,
    pub category: EventCategory,
    pub description: String,
    pub date: NaiveDate,
    pub time: String,
    pub location: String,
    pub address: String,
    pub price: String,
    pub organizer: String,
    pub contact: String,
    pub website: String,
    pub image: String,
    pub lat: f64,
    pub lng: f64,
    pub premium_level: PremiumLevel,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A complete event ready to persist; the store assigns the id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewEvent {
    pub title: String,
    #[serde(default)]
    pub category: EventCategory,
    #[serde(default)]
    pub description: String,
    pub date: NaiveDate,
    #[serde(default)]
    pub time: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub price: String,
    #[serde(default)]
    pub organizer: String,
    #[serde(default)]
    pub contact: String,
    #[serde(default)]
    pub website: String,
    #[serde(default)]
    pub image: String,
    #[serde(default = "fallback_lat")]
    pub lat: f64,
    #[serde(default = "fallback_lng")]
    pub lng: f64,
    #[serde(default)]
    pub premium_level: PremiumLevel,
}

impl NewEvent {
    pub fn new(title: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            title: title.into(),
            category: EventCategory::default(),
            description: String::new(),
            date,
            time: String::new(),
            location: String::new(),
            address: String::new(),
            price: String::new(),
            organizer: String::new(),
            contact: String::new(),
            website: String::new(),
            image: String::new(),
            lat: FALLBACK_LAT,
            lng: FALLBACK_LNG,
            premium_level: PremiumLevel::default(),
        }
    }

    pub fn into_event(self, id: i64, now: DateTime<Utc>) -> Event {
        let image = if self.image.trim().is_empty() {
            self.category.placeholder_image().to_string()
        } else {
            self.image
        };
        Event {
            id,
            title: self.title,
            category: self.category,
            description: self.description,
            date: self.date,
            time: self.time,
            location: self.location,
            address: self.address,
            price: self.price,
            organizer: self.organizer,
            contact: self.contact,
            website: self.website,
            image,
            lat: self.lat,
            lng: self.lng,
            premium_level: self.premium_level,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Partial event. Used for edits and for validation overrides; blank strings count as absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventPatch {
    pub title: Option<String>,
    pub category: Option<EventCategory>,
    pub description: Option<String>,
    pub date: Option<NaiveDate>,
    pub time: Option<String>,
    pub location: Option<String>,
    pub address: Option<String>,
    pub price: Option<String>,
    pub organizer: Option<String>,
    pub contact: Option<String>,
    pub website: Option<String>,
    pub image: Option<String>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub premium_level: Option<PremiumLevel>,
}

impl EventPatch {
    pub fn is_empty(&self) -> bool {
        self == &EventPatch::default()
    }

    pub fn apply(self, event: &mut Event, now: DateTime<Utc>) {
        let set = |target: &mut String, value: Option<String>| {
            if let Some(v) = non_blank(value) {
                *target = v;
            }
        };
        set(&mut event.title, self.title);
        set(&mut event.description, self.description);
        set(&mut event.time, self.time);
        set(&mut event.location, self.location);
        set(&mut event.address, self.address);
        set(&mut event.price, self.price);
        set(&mut event.organizer, self.organizer);
        set(&mut event.contact, self.contact);
        set(&mut event.website, self.website);
        set(&mut event.image, self.image);
        if let Some(v) = self.category {
            event.category = v;
        }
        if let Some(v) = self.date {
            event.date = v;
        }
        if let Some(v) = self.lat {
            event.lat = v;
        }
        if let Some(v) = self.lng {
            event.lng = v;
        }
        if let Some(v) = self.premium_level {
            event.premium_level = v;
        }
        event.updated_at = now;
    }
}

// ---------------------------------------------------------------------------
// Ingestion records
// ---------------------------------------------------------------------------

/// One event block lifted from an agenda page, before any normalisation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrapedEvent {
    pub title: String,
    /// Date text as it appeared on the page.
    pub date: String,
    pub location: String,
    pub description: String,
    pub image: String,
    pub source_url: String,
    pub detail_url: Option<String>,
    pub time: Option<String>,
    pub price: Option<String>,
    pub is_duplicate: bool,
    pub duplicate_of: Option<i64>,
}

/// A normalised record produced by the extractor, awaiting a human import decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedEvent {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub category: EventCategory,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub time: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub price: String,
    #[serde(default)]
    pub organizer: String,
    #[serde(default)]
    pub contact: String,
    #[serde(default)]
    pub website: String,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lng: Option<f64>,
    #[serde(default)]
    pub premium_level: PremiumLevel,
    #[serde(default)]
    pub is_duplicate: bool,
    #[serde(default)]
    pub duplicate_of: Option<i64>,
    #[serde(default = "default_selected")]
    pub selected: bool,
}

fn default_selected() -> bool {
    true
}

impl ExtractedEvent {
    /// Converts to a persistable event. Undated records cannot be published.
    pub fn to_new_event(&self) -> Result<NewEvent> {
        let date = self
            .date
            .ok_or_else(|| AppError::Validation(format!("event '{}' has no date", self.title)))?;
        if self.title.trim().is_empty() {
            return Err(AppError::Validation("event title is required".into()));
        }
        Ok(NewEvent {
            title: self.title.trim().to_string(),
            category: self.category,
            description: self.description.clone(),
            date,
            time: self.time.clone(),
            location: self.location.clone(),
            address: self.address.clone(),
            price: self.price.clone(),
            organizer: self.organizer.clone(),
            contact: self.contact.clone(),
            website: self.website.clone(),
            image: self.image.clone(),
            lat: self.lat.unwrap_or(FALLBACK_LAT),
            lng: self.lng.unwrap_or(FALLBACK_LNG),
            premium_level: self.premium_level,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CandidateStatus {
    Pending,
    Validated,
    Rejected,
}

impl CandidateStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CandidateStatus::Pending => "pending",
            CandidateStatus::Validated => "validated",
            CandidateStatus::Rejected => "rejected",
        }
    }
}

/// A scraped record held for human review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapedEventCandidate {
    pub id: i64,
    pub scraping_config_id: i64,
    pub title: String,
    pub date: Option<NaiveDate>,
    pub raw_date: String,
    pub location: String,
    pub description: String,
    pub image: String,
    pub source_url: String,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub is_duplicate: bool,
    pub duplicate_of: Option<i64>,
    pub validated: bool,
    pub rejected: bool,
    pub validated_at: Option<DateTime<Utc>>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub validated_event_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl ScrapedEventCandidate {
    pub fn status(&self) -> CandidateStatus {
        if self.validated {
            CandidateStatus::Validated
        } else if self.rejected {
            CandidateStatus::Rejected
        } else {
            CandidateStatus::Pending
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewCandidate {
    pub scraping_config_id: i64,
    pub title: String,
    pub date: Option<NaiveDate>,
    pub raw_date: String,
    pub location: String,
    pub description: String,
    pub image: String,
    pub source_url: String,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub is_duplicate: bool,
    pub duplicate_of: Option<i64>,
}

impl NewCandidate {
    pub fn into_candidate(self, id: i64, now: DateTime<Utc>) -> ScrapedEventCandidate {
        ScrapedEventCandidate {
            id,
            scraping_config_id: self.scraping_config_id,
            title: self.title,
            date: self.date,
            raw_date: self.raw_date,
            location: self.location,
            description: self.description,
            image: self.image,
            source_url: self.source_url,
            lat: self.lat,
            lng: self.lng,
            is_duplicate: self.is_duplicate,
            duplicate_of: self.duplicate_of,
            validated: false,
            rejected: false,
            validated_at: None,
            rejected_at: None,
            rejection_reason: None,
            validated_event_id: None,
            created_at: now,
        }
    }
}

/// Terminal transition applied to a pending candidate.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Validated { event_id: i64, at: DateTime<Utc> },
    Rejected { reason: Option<String>, at: DateTime<Utc> },
}

impl Resolution {
    /// Applies the transition, refusing candidates that are already terminal.
    pub fn apply(&self, candidate: &mut ScrapedEventCandidate) -> Result<()> {
        match candidate.status() {
            CandidateStatus::Pending => {}
            terminal => {
                return Err(AppError::AlreadyTerminal {
                    id: candidate.id,
                    state: terminal.as_str(),
                })
            }
        }
        match self {
            Resolution::Validated { event_id, at } => {
                candidate.validated = true;
                candidate.validated_at = Some(*at);
                candidate.validated_event_id = Some(*event_id);
            }
            Resolution::Rejected { reason, at } => {
                candidate.rejected = true;
                candidate.rejected_at = Some(*at);
                candidate.rejection_reason = reason.clone();
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Schedules
// ---------------------------------------------------------------------------

/// Recurrence of a scrape target. Unknown labels are preserved as written.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Frequency {
    Hourly,
    #[default]
    Daily,
    Weekly,
    Monthly,
    Other(String),
}

impl Frequency {
    pub fn next_after(&self, from: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            Frequency::Hourly => from + Duration::hours(1),
            Frequency::Daily | Frequency::Other(_) => from + Duration::days(1),
            Frequency::Weekly => from + Duration::days(7),
            Frequency::Monthly => from
                .checked_add_months(Months::new(1))
                .unwrap_or_else(|| from + Duration::days(30)),
        }
    }
}

impl From<String> for Frequency {
    fn from(raw: String) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "hourly" => Frequency::Hourly,
            "daily" | "" => Frequency::Daily,
            "weekly" => Frequency::Weekly,
            "monthly" => Frequency::Monthly,
            _ => Frequency::Other(raw),
        }
    }
}

impl From<&str> for Frequency {
    fn from(raw: &str) -> Self {
        Frequency::from(raw.to_string())
    }
}

impl From<Frequency> for String {
    fn from(f: Frequency) -> Self {
        match f {
            Frequency::Hourly => "hourly".into(),
            Frequency::Daily => "daily".into(),
            Frequency::Weekly => "weekly".into(),
            Frequency::Monthly => "monthly".into(),
            Frequency::Other(s) => s,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapingConfig {
    pub id: i64,
    pub name: String,
    pub url: String,
    pub frequency: Frequency,
    pub active: bool,
    pub last_run_at: Option<DateTime<Utc>>,
    pub next_run_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl ScrapingConfig {
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.active && self.next_run_at.map(|next| next <= now).unwrap_or(true)
    }
}

/// Fully-formed schedule row handed to storage.
#[derive(Debug, Clone, PartialEq)]
pub struct NewScrapingConfig {
    pub name: String,
    pub url: String,
    pub frequency: Frequency,
    pub active: bool,
    pub next_run_at: Option<DateTime<Utc>>,
}

impl NewScrapingConfig {
    pub fn into_config(self, id: i64, now: DateTime<Utc>) -> ScrapingConfig {
        ScrapingConfig {
            id,
            name: self.name,
            url: self.url,
            frequency: self.frequency,
            active: self.active,
            last_run_at: None,
            next_run_at: self.next_run_at,
            created_at: now,
        }
    }
}

/// Create/update body for a schedule.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ScrapingConfigRequest {
    pub name: Option<String>,
    pub url: Option<String>,
    pub frequency: Option<Frequency>,
    pub active: Option<bool>,
}

/// Field changes applied by storage when updating a schedule.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScrapingConfigUpdate {
    pub name: Option<String>,
    pub url: Option<String>,
    pub frequency: Option<Frequency>,
    pub active: Option<bool>,
    pub last_run_at: Option<DateTime<Utc>>,
    pub next_run_at: Option<DateTime<Utc>>,
}

impl ScrapingConfigUpdate {
    pub fn apply(self, config: &mut ScrapingConfig) {
        if let Some(v) = self.name {
            config.name = v;
        }
        if let Some(v) = self.url {
            config.url = v;
        }
        if let Some(v) = self.frequency {
            config.frequency = v;
        }
        if let Some(v) = self.active {
            config.active = v;
        }
        if self.last_run_at.is_some() {
            config.last_run_at = self.last_run_at;
        }
        if self.next_run_at.is_some() {
            config.next_run_at = self.next_run_at;
        }
    }
}

// ---------------------------------------------------------------------------
// Queries and pagination
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeWindow {
    #[default]
    All,
    Past,
    Future,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: usize,
    pub limit: usize,
}

impl PageRequest {
    /// Clamps to page >= 1 and 1 <= limit <= 500.
    pub fn new(page: Option<usize>, limit: Option<usize>, default_limit: usize) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            limit: limit.unwrap_or(default_limit).clamp(1, 500),
        }
    }

    pub fn offset(&self) -> usize {
        (self.page - 1) * self.limit
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub page: usize,
    pub limit: usize,
    pub total_pages: usize,
}

impl<T> Page<T> {
    /// Slices an already filtered and sorted list.
    pub fn from_sorted(all: Vec<T>, request: PageRequest) -> Self {
        let total = all.len();
        let items = all
            .into_iter()
            .skip(request.offset())
            .take(request.limit)
            .collect();
        Self {
            items,
            total,
            page: request.page,
            limit: request.limit,
            total_pages: total.div_ceil(request.limit),
        }
    }
}

impl<T: Serialize> Page<T> {
    /// Listing body with the collection under `key`, e.g. `{"events": [..], "total": ..}`.
    pub fn to_json(&self, key: &str) -> serde_json::Value {
        let mut body = serde_json::json!({
            "total": self.total,
            "page": self.page,
            "limit": self.limit,
            "totalPages": self.total_pages,
        });
        body[key] = serde_json::to_value(&self.items).unwrap_or(serde_json::Value::Array(vec![]));
        body
    }
}

fn is_all(value: &Option<String>) -> Option<&str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty() && *v != "all")
}

fn contains_folded(haystack: &str, needle: &str) -> bool {
    fold(haystack).contains(needle)
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EventQuery {
    pub category: Option<String>,
    pub search: Option<String>,
    pub time: Option<TimeWindow>,
    pub page: Option<usize>,
    pub limit: Option<usize>,
}

impl EventQuery {
    pub fn page_request(&self) -> PageRequest {
        PageRequest::new(self.page, self.limit, constants::DEFAULT_PAGE_LIMIT)
    }

    pub fn matches(&self, event: &Event, today: NaiveDate) -> bool {
        if let Some(category) = is_all(&self.category) {
            if event.category.as_str() != category {
                return false;
            }
        }
        match self.time.unwrap_or_default() {
            TimeWindow::All => {}
            TimeWindow::Past if event.date >= today => return false,
            TimeWindow::Future if event.date < today => return false,
            _ => {}
        }
        if let Some(search) = is_all(&self.search) {
            let needle = fold(search);
            return contains_folded(&event.title, &needle)
                || contains_folded(&event.description, &needle)
                || contains_folded(&event.location, &needle);
        }
        true
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ActorQuery {
    pub category: Option<String>,
    pub search: Option<String>,
    pub page: Option<usize>,
    pub limit: Option<usize>,
}

impl ActorQuery {
    pub fn page_request(&self) -> PageRequest {
        PageRequest::new(self.page, self.limit, constants::DEFAULT_PAGE_LIMIT)
    }

    pub fn matches(&self, actor: &Actor) -> bool {
        if let Some(category) = is_all(&self.category) {
            if actor.category.as_str() != category {
                return false;
            }
        }
        if let Some(search) = is_all(&self.search) {
            let needle = fold(search);
            return contains_folded(&actor.name, &needle)
                || contains_folded(&actor.description, &needle)
                || contains_folded(&actor.address, &needle);
        }
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Actors,
    Events,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Actors => "actors",
            EntityKind::Events => "events",
        }
    }
}

//! AI-assisted extraction: prompt construction, JSON location and record normalisation.

use crate::config::AiConfig;
use crate::constants::{DEFAULT_EXTRACTED_TIME, GENERIC_LOCATIONS, RAW_EXCERPT_CHARS};
use crate::domain::{EventCategory, ExtractedEvent, PremiumLevel, ScrapedEvent};
use crate::error::{AppError, Result};
use crate::infra::{CompletionClient, CompletionRequest, ContentPart, HtmlFetcher};
use crate::logging::ProgressLog;
use crate::metrics::ExtractorMetrics;
use crate::pipeline::dates::{parse_event_date, parse_event_time};
use crate::util::{collapse_whitespace, fold, strip_code_blocks, truncate_chars};
use chrono::{Local, NaiveDate, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::Html;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, instrument, warn};

const DEFAULT_INSTRUCTIONS: &str = "Tu es un expert en extraction d'événements locaux des Cévennes.

RÈGLES:
1. TITLE: titre exact de l'événement, nettoyé
2. DATE: format YYYY-MM-DD (ex: \"9 octobre 2025\" → \"2025-10-09\"); sans année, prends l'année en cours
3. TIME: heure de début HH:MM si présente, sinon \"14:00\"
4. LOCATION: nom exact de la ville ou commune mentionnée (Florac, Le Vigan, Ganges, Anduze...)
   - si aucune ville n'est mentionnée, laisse \"\"
   - ne mets jamais \"Cévennes\", \"Gard\", \"France\" et n'invente rien
5. ADDRESS: adresse complète avec code postal si disponible
6. CATEGORY: festival, marche, culture, sport, atelier ou theatre
   - Marché = marche; Concert/Expo/Cinéma/Conférence = culture; Rando/Pétanque = sport
   - Atelier/Stage = atelier; Théâtre/Spectacle = theatre; Festival = festival
7. DESCRIPTION: résumé en 1 à 2 phrases
8. PRICE, ORGANIZER, CONTACT, WEBSITE, IMAGE: recopie si présent, sinon \"\"";

const SOCIAL_INSTRUCTIONS: &str = "Tu es un expert en extraction d'événements depuis des pages de réseaux sociaux.

RÈGLES:
1. TITLE: titre exact de l'événement
2. DATE: format YYYY-MM-DD
3. TIME: heure de début HH:MM (24h)
4. LOCATION: nom du lieu ou ville précise (ex: \"Salle des fêtes, Ganges\")
5. ADDRESS: adresse complète si disponible
6. DESCRIPTION: description complète (800 caractères max)
7. ORGANIZER, PRICE, CONTACT, IMAGE: si mentionnés
8. CATEGORY: festival, marche, culture, sport, atelier ou theatre

Retourne UNIQUEMENT un objet JSON valide:
{\"title\":\"...\",\"date\":\"YYYY-MM-DD\",\"time\":\"HH:MM\",\"location\":\"...\",\"address\":\"...\",\"description\":\"...\",\"organizer\":\"...\",\"price\":\"...\",\"category\":\"...\",\"contact\":\"...\",\"image\":\"...\"}";

const ARRAY_FORMAT: &str = "\n\nRetourne UNIQUEMENT un JSON array valide, sans texte avant ou après:
[{\"title\":\"...\",\"category\":\"...\",\"description\":\"...\",\"date\":\"YYYY-MM-DD\",\"time\":\"HH:MM\",\"location\":\"...\",\"address\":\"...\",\"price\":\"...\",\"organizer\":\"...\",\"contact\":\"...\",\"website\":\"...\",\"image\":\"...\"}]";

static JSON_ARRAY: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)\[\s*\{.*\}\s*\]").expect("valid regex"));
static JSON_OBJECT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)\{.*\}").expect("valid regex"));

/// What the admin handed over for analysis.
#[derive(Debug, Clone)]
pub enum ExtractionInput {
    Text(String),
    Url(String),
    /// Image URLs or `data:` URIs.
    Images(Vec<String>),
    /// A scraped batch that needs cleaning; exactly as many records must come back.
    Candidates(Vec<ScrapedEvent>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CountMismatch {
    pub expected: usize,
    pub received: usize,
}

#[derive(Debug, Default)]
pub struct ExtractionOutput {
    pub events: Vec<ExtractedEvent>,
    pub warnings: Vec<String>,
    pub count_mismatch: Option<CountMismatch>,
    pub log: ProgressLog,
}

pub struct Extractor {
    completion: Arc<dyn CompletionClient>,
    fetcher: Arc<dyn HtmlFetcher>,
    region_hint: String,
    url_text_limit: usize,
    social_html_limit: usize,
}

impl Extractor {
    pub fn new(
        completion: Arc<dyn CompletionClient>,
        fetcher: Arc<dyn HtmlFetcher>,
        ai: &AiConfig,
        region_hint: impl Into<String>,
    ) -> Self {
        Self {
            completion,
            fetcher,
            region_hint: region_hint.into(),
            url_text_limit: ai.url_text_limit,
            social_html_limit: ai.social_html_limit,
        }
    }

    /// The built-in instruction set, restorable after user edits.
    pub fn default_instructions() -> &'static str {
        DEFAULT_INSTRUCTIONS
    }

    #[instrument(skip_all)]
    pub async fn extract(&self, input: ExtractionInput, instructions: Option<&str>) -> Result<ExtractionOutput> {
        let mut log = ProgressLog::new();
        let instructions = instructions
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_INSTRUCTIONS);
        let system = format!("{instructions}{ARRAY_FORMAT}");

        let (request, expected, candidates, page_url) = match input {
            ExtractionInput::Text(text) => {
                if text.trim().is_empty() {
                    return Err(AppError::Validation("text is required".into()));
                }
                log.step(format!("📝 Analyse d'un texte de {} caractères", text.chars().count()));
                let user = format!("Extrais tous les événements de ce texte:\n\n{text}");
                (CompletionRequest::text(system, user), None, Vec::new(), None)
            }
            ExtractionInput::Url(url) => {
                url::Url::parse(&url).map_err(|e| AppError::Validation(format!("invalid url '{url}': {e}")))?;
                log.step(format!("🌐 Téléchargement de {url}"));
                let page = self.fetcher.fetch(&url).await?;
                let text = page_text(&page.body);
                let text = truncate_chars(&text, self.url_text_limit);
                log.step(format!("📄 {} caractères de texte envoyés", text.chars().count()));
                let user = format!("Extrais les événements de cette page ({url}):\n\n{text}");
                (CompletionRequest::text(system, user), None, Vec::new(), Some(url))
            }
            ExtractionInput::Images(images) => {
                if images.is_empty() {
                    return Err(AppError::Validation("at least one image is required".into()));
                }
                log.step(format!("🖼️ Analyse de {} image(s)", images.len()));
                let mut parts = vec![ContentPart::Text(
                    "Extrais les événements visibles sur ces images (affiches, captures d'écran).".into(),
                )];
                parts.extend(images.into_iter().map(ContentPart::ImageUrl));
                let request = CompletionRequest {
                    system,
                    parts,
                    temperature: 0.2,
                    max_tokens: 4096,
                };
                (request, None, Vec::new(), None)
            }
            ExtractionInput::Candidates(candidates) => {
                if candidates.is_empty() {
                    return Err(AppError::Validation("No events provided".into()));
                }
                let n = candidates.len();
                log.step(format!("🧹 Nettoyage de {n} événement(s) scrapé(s)"));
                let user = format!(
                    "Nettoie et structure ces {n} événements. Retourne EXACTEMENT {n} objets, dans le même ordre, un par événement fourni:\n\n{}",
                    serde_json::to_string_pretty(&candidates)?
                );
                let mut request = CompletionRequest::text(system, user);
                request.temperature = 0.0;
                (request, Some(n), candidates, None)
            }
        };

        log.step("🤖 Appel du service d'IA");
        let raw = self.completion.complete(request).await?;
        let records = locate_json(&raw)?;
        log.step(format!("✅ {} enregistrement(s) reçu(s)", records.len()));

        let mut output = ExtractionOutput {
            log,
            ..Default::default()
        };
        if let Some(expected) = expected {
            if records.len() != expected {
                let mismatch = CountMismatch {
                    expected,
                    received: records.len(),
                };
                warn!(expected, received = records.len(), "completion returned a different record count");
                ExtractorMetrics::count_mismatch();
                output.log.warn(format!(
                    "{expected} événements envoyés mais {} reçus",
                    records.len()
                ));
                output.warnings.push(format!(
                    "count mismatch: expected {expected} records, received {}",
                    records.len()
                ));
                output.count_mismatch = Some(mismatch);
            }
        }

        let today = Local::now().date_naive();
        let base_id = Utc::now().timestamp_millis();
        let aligned = output.count_mismatch.is_none() && !candidates.is_empty();
        for (index, record) in records.iter().enumerate() {
            let mut event = normalize_record(record, base_id + index as i64, &self.region_hint, today);
            if event.title.is_empty() {
                output.warnings.push(format!("record {index} has no title and was skipped"));
                continue;
            }
            if aligned {
                let source = &candidates[index];
                if event.image.is_empty() || event.image == event.category.placeholder_image() {
                    if !source.image.is_empty() {
                        event.image = source.image.clone();
                    }
                }
                if event.website.is_empty() {
                    event.website = source.detail_url.clone().unwrap_or_else(|| source.source_url.clone());
                }
            }
            if let Some(url) = &page_url {
                if event.website.is_empty() {
                    event.website = url.clone();
                }
            }
            if let Some(warning) = location_warning(&event) {
                output.warnings.push(warning);
            }
            output.events.push(event);
        }

        info!("Extracted {} events ({} warnings)", output.events.len(), output.warnings.len());
        Ok(output)
    }

    /// Single event from a social-network event page's raw HTML.
    #[instrument(skip(self, html), fields(html_len = html.len()))]
    pub async fn extract_social(&self, html: &str, url: &str) -> Result<ExtractedEvent> {
        if html.trim().is_empty() {
            return Err(AppError::Validation("HTML content is required".into()));
        }
        let user = format!(
            "Extrais toutes les informations de cet événement:\n\n{}",
            truncate_chars(html, self.social_html_limit)
        );
        let mut request = CompletionRequest::text(SOCIAL_INSTRUCTIONS, user);
        request.temperature = 0.0;
        let raw = self.completion.complete(request).await?;
        let record = locate_json(&raw)?
            .into_iter()
            .next()
            .ok_or_else(|| malformed(&raw))?;

        let mut event = normalize_record(
            &record,
            Utc::now().timestamp_millis(),
            &self.region_hint,
            Local::now().date_naive(),
        );
        if event.title.is_empty() {
            return Err(AppError::Validation("no event title found on the page".into()));
        }
        event.website = url.to_string();
        info!("Event extracted: {}", event.title);
        Ok(event)
    }
}

fn malformed(raw: &str) -> AppError {
    ExtractorMetrics::parse_failed();
    AppError::MalformedResponse {
        excerpt: truncate_chars(raw, RAW_EXCERPT_CHARS).to_string(),
    }
}

fn objects(value: Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items.into_iter().filter(Value::is_object).collect(),
        obj @ Value::Object(_) => vec![obj],
        _ => Vec::new(),
    }
}

/// Finds the JSON payload in a completion that may carry prose around it. An array of objects
/// is preferred; a lone object becomes a one-element array.
pub fn locate_json(raw: &str) -> Result<Vec<Value>> {
    let stripped = strip_code_blocks(raw);
    if let Ok(value) = serde_json::from_str::<Value>(stripped) {
        let found = objects(value);
        if !found.is_empty() {
            return Ok(found);
        }
    }
    if let Some(m) = JSON_ARRAY.find(stripped) {
        if let Ok(value) = serde_json::from_str::<Value>(m.as_str()) {
            return Ok(objects(value));
        }
    }
    if let Some(m) = JSON_OBJECT.find(stripped) {
        if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(m.as_str()) {
            return Ok(vec![value]);
        }
    }
    warn!("no usable JSON in completion");
    Err(malformed(raw))
}

fn text_field(record: &Value, keys: &[&str]) -> String {
    keys.iter()
        .find_map(|k| match &record[*k] {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .unwrap_or_default()
}

/// Accepts numbers or numeric strings.
pub fn number_field(record: &Value, key: &str) -> Option<f64> {
    match &record[key] {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().replace(',', ".").parse().ok(),
        _ => None,
    }
    .filter(|v: &f64| v.is_finite())
}

/// Turns one loosely-typed completion record into an [`ExtractedEvent`] with every
/// downstream-required field filled.
pub fn normalize_record(record: &Value, id: i64, region_hint: &str, today: NaiveDate) -> ExtractedEvent {
    let title = collapse_whitespace(&text_field(record, &["title", "name"]));
    let category = EventCategory::from_loose(&text_field(record, &["category"])).unwrap_or_default();

    let raw_date = text_field(record, &["date", "startDate"]);
    let date = NaiveDate::parse_from_str(&raw_date, "%Y-%m-%d")
        .ok()
        .or_else(|| parse_event_date(&raw_date, today));

    let raw_time = text_field(record, &["time", "startTime"]);
    let time = parse_event_time(&raw_time).unwrap_or_else(|| DEFAULT_EXTRACTED_TIME.to_string());

    let location = text_field(record, &["location", "city"]);
    let mut address = text_field(record, &["address"]);
    if address.is_empty() && !location.is_empty() {
        address = format!("{location}, {region_hint}");
    }

    let mut image = text_field(record, &["image", "imageUrl"]);
    if image.is_empty() {
        image = category.placeholder_image().to_string();
    }

    ExtractedEvent {
        id,
        title,
        category,
        description: text_field(record, &["description"]),
        date,
        time,
        location,
        address,
        price: text_field(record, &["price"]),
        organizer: text_field(record, &["organizer"]),
        contact: text_field(record, &["contact"]),
        website: text_field(record, &["website", "url"]),
        image,
        lat: number_field(record, "lat"),
        lng: number_field(record, "lng"),
        premium_level: PremiumLevel::Standard,
        is_duplicate: false,
        duplicate_of: None,
        selected: true,
    }
}

pub fn is_generic_location(location: &str) -> bool {
    let key = fold(location);
    key.chars().count() < 3 || GENERIC_LOCATIONS.iter().any(|g| fold(g) == key)
}

fn location_warning(event: &ExtractedEvent) -> Option<String> {
    if event.location.trim().is_empty() {
        Some(format!("\"{}\": no location found", event.title))
    } else if is_generic_location(&event.location) {
        Some(format!("\"{}\": location too vague ({})", event.title, event.location))
    } else {
        None
    }
}

/// Visible text of a page, scripts and styles skipped.
pub fn page_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut chunks: Vec<&str> = Vec::new();
    for node in document.root_element().descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node
            .parent()
            .and_then(|p| p.value().as_element().map(|e| matches!(e.name(), "script" | "style" | "noscript")))
            .unwrap_or(false);
        let text: &str = text;
        if !hidden && !text.trim().is_empty() {
            chunks.push(text.trim());
        }
    }
    collapse_whitespace(&chunks.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::PLACEHOLDER_CULTURE;
    use serde_json::json;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 5, 1).unwrap()
    }

    #[test]
    fn test_locate_json_tolerates_prose_and_fences() {
        let raw = "Voici les événements:\n```json\n[{\"title\":\"A\"},{\"title\":\"B\"}]\n```\nBonne journée";
        let found = locate_json(raw).unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[1]["title"], "B");
    }

    #[test]
    fn test_locate_json_promotes_single_object() {
        let found = locate_json("Résultat : {\"title\": \"Fête votive\"} fin").unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0]["title"], "Fête votive");
    }

    #[test]
    fn test_locate_json_reports_excerpt() {
        let raw = "Désolé, je ne peux pas ".repeat(40);
        match locate_json(&raw) {
            Err(AppError::MalformedResponse { excerpt }) => {
                assert_eq!(excerpt.chars().count(), RAW_EXCERPT_CHARS);
            }
            other => panic!("expected malformed response, got {other:?}"),
        }
    }

    #[test]
    fn test_title_only_record_gets_defaults() {
        let event = normalize_record(&json!({"title": "Bal trad"}), 42, "Cévennes, France", today());
        assert_eq!(event.id, 42);
        assert_eq!(event.category, EventCategory::Culture);
        assert_eq!(event.image, PLACEHOLDER_CULTURE);
        assert_eq!(event.time, "14:00");
        assert_eq!(event.premium_level, PremiumLevel::Standard);
        assert!(event.date.is_none());
        assert!(event.lat.is_none());
    }

    #[test]
    fn test_record_normalisation() {
        let event = normalize_record(
            &json!({
                "title": " Marché  de producteurs ",
                "category": "Marché",
                "date": "12 juin",
                "time": "8h30",
                "location": "Ganges",
                "lat": "43,93",
                "lng": 3.7
            }),
            1,
            "Cévennes, France",
            today(),
        );
        assert_eq!(event.title, "Marché de producteurs");
        assert_eq!(event.category, EventCategory::Marche);
        assert_eq!(event.date, NaiveDate::from_ymd_opt(2025, 6, 12));
        assert_eq!(event.time, "08:30");
        assert_eq!(event.address, "Ganges, Cévennes, France");
        assert_eq!(event.lat, Some(43.93));
        assert_eq!(event.lng, Some(3.7));
    }

    #[test]
    fn test_generic_locations() {
        assert!(is_generic_location("Cévennes"));
        assert!(is_generic_location(" gard "));
        assert!(is_generic_location("Région"));
        assert!(!is_generic_location("Saint-Jean-du-Gard"));
    }

    #[test]
    fn test_page_text_skips_scripts() {
        let html = "<html><head><style>p{}</style><script>var x = 1;</script></head><body><h1>Agenda</h1><p>Concert   samedi</p></body></html>";
        assert_eq!(page_text(html), "Agenda Concert samedi");
    }
}

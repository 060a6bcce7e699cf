//! Agenda page scraper: structural selectors first, keyword heuristics as a fallback.

use crate::constants::*;
use crate::domain::ScrapedEvent;
use crate::infra::HtmlFetcher;
use crate::logging::ProgressLog;
use crate::metrics::ScraperMetrics;
use crate::pipeline::dates::parse_event_time;
use crate::util::{collapse_whitespace, truncate_chars};
use futures::future::join_all;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use url::Url;

fn selector(css: &str) -> Selector {
    Selector::parse(css).unwrap_or_else(|e| panic!("invalid built-in selector {css:?}: {e:?}"))
}

static BLOCKS: Lazy<Vec<Selector>> = Lazy::new(|| EVENT_BLOCK_SELECTORS.iter().map(|s| selector(s)).collect());
static TITLE: Lazy<Selector> = Lazy::new(|| selector(TITLE_SELECTOR));
static DATE: Lazy<Selector> = Lazy::new(|| selector(DATE_SELECTOR));
static DATETIME_ATTR: Lazy<Selector> = Lazy::new(|| selector("[datetime]"));
static LOCATION: Lazy<Selector> = Lazy::new(|| selector(LOCATION_SELECTOR));
static DESCRIPTION: Lazy<Selector> = Lazy::new(|| selector(DESCRIPTION_SELECTOR));
static IMAGE: Lazy<Selector> = Lazy::new(|| selector("img[src]"));
static LINK: Lazy<Selector> = Lazy::new(|| selector("a[href]"));
static CONTAINERS: Lazy<Selector> = Lazy::new(|| selector("div, section"));
static HEADINGS: Lazy<Selector> = Lazy::new(|| selector("h1, h2, h3, h4"));
static META_DESCRIPTION: Lazy<Selector> =
    Lazy::new(|| selector("meta[name=\"description\"], meta[property=\"og:description\"]"));
static PARAGRAPHS: Lazy<Selector> = Lazy::new(|| selector("p"));
static BODY: Lazy<Selector> = Lazy::new(|| selector("body"));

static EVENT_KEYWORDS: Lazy<Regex> =
    Lazy::new(|| Regex::new(EVENT_KEYWORDS_PATTERN).expect("valid keyword regex"));
static FREE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\b(gratuit|entrée libre|entree libre)\b").expect("valid regex"));
static AMOUNT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+(?:[.,]\d{1,2})?)\s*(?:€|euros?\b)").expect("valid regex"));

#[derive(Debug, Clone, Serialize)]
pub struct UrlFailure {
    pub url: String,
    pub error: String,
}

/// Outcome of one multi-URL scrape. Failed URLs contribute nothing but never abort the run.
#[derive(Debug, Default)]
pub struct ScrapeReport {
    pub events: Vec<ScrapedEvent>,
    pub failures: Vec<UrlFailure>,
    pub pages_ok: usize,
    pub log: ProgressLog,
}

impl ScrapeReport {
    pub fn summary(&self) -> String {
        let total = self.pages_ok + self.failures.len();
        format!(
            "{} événements trouvés sur {}/{} page(s)",
            self.events.len(),
            self.pages_ok,
            total
        )
    }
}

pub struct Scraper {
    fetcher: Arc<dyn HtmlFetcher>,
}

impl Scraper {
    pub fn new(fetcher: Arc<dyn HtmlFetcher>) -> Self {
        Self { fetcher }
    }

    /// Scrapes every URL concurrently. With `deep`, each candidate's detail page is fetched too.
    #[instrument(skip(self, urls), fields(url_count = urls.len()))]
    pub async fn scrape(&self, urls: &[String], deep: bool) -> ScrapeReport {
        let mut report = ScrapeReport::default();
        report.log.step(format!("🔍 Scraping {} URL(s){}", urls.len(), if deep { " (mode approfondi)" } else { "" }));

        let fetches = urls.iter().map(|url| async move {
            let result = self.fetcher.fetch(url).await;
            (url.clone(), result)
        });

        let mut seen: HashSet<(String, String)> = HashSet::new();
        for (url, result) in join_all(fetches).await {
            match result {
                Ok(page) => {
                    report.pages_ok += 1;
                    let base = if page.final_url.is_empty() { url.clone() } else { page.final_url.clone() };
                    let found = extract_events(&page.body, &base);
                    let mut kept = 0usize;
                    for mut event in found {
                        event.source_url = url.clone();
                        if seen.insert((event.title.clone(), event.date.clone())) {
                            report.events.push(event);
                            kept += 1;
                        }
                    }
                    report.log.step(format!("✅ {url}: {kept} événement(s)"));
                }
                Err(e) => {
                    warn!(url = %url, error = %e, "scrape failed for url");
                    report.log.warn(format!("{url}: {e}"));
                    report.failures.push(UrlFailure { url, error: e.to_string() });
                }
            }
        }

        if deep && !report.events.is_empty() {
            self.enrich_all(&mut report).await;
        }

        ScraperMetrics::candidates_scraped(report.events.len());
        info!("Scraped {} events, {} url failure(s)", report.events.len(), report.failures.len());
        report
    }

    async fn enrich_all(&self, report: &mut ScrapeReport) {
        let targets: Vec<(usize, String)> = report
            .events
            .iter()
            .enumerate()
            .filter_map(|(i, e)| e.detail_url.clone().map(|u| (i, u)))
            .collect();
        report.log.step(format!("📄 Lecture de {} page(s) de détail", targets.len()));

        let fetches = targets.into_iter().map(|(i, url)| async move {
            let result = self.fetcher.fetch(&url).await;
            (i, url, result)
        });

        let mut enriched = 0usize;
        for (i, url, result) in join_all(fetches).await {
            match result {
                Ok(page) => {
                    enrich_from_detail(&mut report.events[i], &page.body);
                    enriched += 1;
                }
                Err(e) => {
                    debug!(url = %url, error = %e, "detail page failed");
                    report.log.warn(format!("détail {url}: {e}"));
                }
            }
        }
        report.log.step(format!("✨ {enriched} événement(s) enrichi(s)"));
    }
}

fn element_text(el: &ElementRef) -> String {
    collapse_whitespace(&el.text().collect::<Vec<_>>().join(" "))
}

fn first_text(el: &ElementRef, sel: &Selector) -> String {
    el.select(sel).next().map(|e| element_text(&e)).unwrap_or_default()
}

fn absolutize(base: Option<&Url>, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() || href.starts_with("javascript:") || href.starts_with('#') {
        return None;
    }
    match base {
        Some(base) => base.join(href).ok().map(|u| u.to_string()),
        None => Url::parse(href).ok().map(|u| u.to_string()),
    }
}

fn first_attr(el: &ElementRef, sel: &Selector, attr: &str, base: Option<&Url>) -> Option<String> {
    el.select(sel)
        .next()
        .and_then(|e| e.value().attr(attr))
        .and_then(|v| absolutize(base, v))
}

/// Extracts candidate events from one page, at most `MAX_CANDIDATES_PER_URL`.
pub fn extract_events(html: &str, page_url: &str) -> Vec<ScrapedEvent> {
    let document = Html::parse_document(html);
    let base = Url::parse(page_url).ok();
    let mut events: Vec<ScrapedEvent> = Vec::new();

    for block_selector in BLOCKS.iter() {
        for block in document.select(block_selector) {
            let title = first_text(&block, &TITLE);
            if title.chars().count() < MIN_TITLE_CHARS {
                continue;
            }
            let mut date = first_text(&block, &DATE);
            if date.is_empty() {
                date = block
                    .select(&DATETIME_ATTR)
                    .next()
                    .and_then(|e| e.value().attr("datetime"))
                    .unwrap_or_default()
                    .trim()
                    .to_string();
            }
            if events.iter().any(|e| e.title == title && e.date == date) {
                continue;
            }
            let description = first_text(&block, &DESCRIPTION);
            events.push(ScrapedEvent {
                time: parse_event_time(&date),
                location: first_text(&block, &LOCATION),
                description: truncate_chars(&description, BLOCK_DESCRIPTION_CHARS).to_string(),
                image: first_attr(&block, &IMAGE, "src", base.as_ref()).unwrap_or_default(),
                detail_url: first_attr(&block, &LINK, "href", base.as_ref()),
                source_url: page_url.to_string(),
                title,
                date,
                ..Default::default()
            });
        }
    }

    if events.is_empty() {
        for container in document.select(&CONTAINERS) {
            let text = element_text(&container);
            if !EVENT_KEYWORDS.is_match(&text) {
                continue;
            }
            let title = first_text(&container, &HEADINGS);
            let len = title.chars().count();
            if len < MIN_TITLE_CHARS || len >= MAX_FALLBACK_TITLE_CHARS {
                continue;
            }
            if events.iter().any(|e| e.title == title) {
                continue;
            }
            events.push(ScrapedEvent {
                description: truncate_chars(&text, FALLBACK_DESCRIPTION_CHARS).trim().to_string(),
                image: first_attr(&container, &IMAGE, "src", base.as_ref()).unwrap_or_default(),
                detail_url: first_attr(&container, &LINK, "href", base.as_ref()),
                source_url: page_url.to_string(),
                title,
                ..Default::default()
            });
        }
        if !events.is_empty() {
            debug!(url = page_url, count = events.len(), "keyword fallback used");
        }
    }

    events.truncate(MAX_CANDIDATES_PER_URL);
    events
}

/// Fills description, time and price from an event's own page.
pub fn enrich_from_detail(event: &mut ScrapedEvent, html: &str) {
    let document = Html::parse_document(html);

    let meta = document
        .select(&META_DESCRIPTION)
        .filter_map(|m| m.value().attr("content"))
        .map(collapse_whitespace)
        .find(|s| !s.is_empty());
    let description = meta.or_else(|| {
        document
            .select(&PARAGRAPHS)
            .map(|p| element_text(&p))
            .max_by_key(|t| t.chars().count())
            .filter(|t| !t.is_empty())
    });
    if let Some(description) = description {
        let description = truncate_chars(&description, DETAIL_DESCRIPTION_CHARS).to_string();
        if description.chars().count() > event.description.chars().count() {
            event.description = description;
        }
    }

    let body_text = document
        .select(&BODY)
        .next()
        .map(|b| element_text(&b))
        .unwrap_or_default();
    if event.time.is_none() {
        event.time = parse_event_time(&body_text);
    }
    if event.price.is_none() {
        event.price = if FREE.is_match(&body_text) {
            Some(DEFAULT_VALIDATED_PRICE.to_string())
        } else {
            AMOUNT
                .captures(&body_text)
                .map(|c| format!("{} €", c[1].replace('.', ",")))
        };
    }
}

use anyhow::Result;
use cevennes_connect::config::{AiConfig, GeocodingConfig, RegionConfig};
use cevennes_connect::constants::{FALLBACK_LAT, FALLBACK_LNG, PLACEHOLDER_CULTURE};
use cevennes_connect::domain::{EventCategory, NewEvent, ScrapedEvent};
use cevennes_connect::error::AppError;
use cevennes_connect::infra::ContentPart;
use cevennes_connect::pipeline::extractor::CountMismatch;
use cevennes_connect::pipeline::{ExtractionInput, Extractor, GeocoderAdapter, Ingestor, Scraper};
use cevennes_connect::storage::{InMemoryStorage, Storage};
use cevennes_connect::testing::{ScriptedCompletion, StaticFetcher, StaticGeocoder};
use chrono::NaiveDate;
use serde_json::json;
use std::sync::Arc;

struct Harness {
    storage: Arc<InMemoryStorage>,
    completion: Arc<ScriptedCompletion>,
    geocoder: Arc<StaticGeocoder>,
    ingestor: Ingestor,
}

fn harness(completion: ScriptedCompletion, fetcher: StaticFetcher) -> Harness {
    let storage = Arc::new(InMemoryStorage::new());
    let completion = Arc::new(completion);
    let geocoder = Arc::new(StaticGeocoder::new().with("Florac", 44.32, 3.59));
    let fetcher = Arc::new(fetcher);
    let extractor = Extractor::new(completion.clone(), fetcher.clone(), &AiConfig::default(), "Cévennes, France");
    let adapter = GeocoderAdapter::new(Some(geocoder.clone()), &GeocodingConfig::default(), &RegionConfig::default());
    let ingestor = Ingestor::new(
        storage.clone(),
        Arc::new(Scraper::new(fetcher)),
        Arc::new(extractor),
        adapter,
    );
    Harness {
        storage,
        completion,
        geocoder,
        ingestor,
    }
}

fn scraped(title: &str) -> ScrapedEvent {
    ScrapedEvent {
        title: title.to_string(),
        date: "12 avril 2025".to_string(),
        source_url: "https://agenda.example/".to_string(),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_title_only_record_gets_every_downstream_field() -> Result<()> {
    let h = harness(
        ScriptedCompletion::new().reply(r#"Voici le résultat : [{"title": "Veillée contée"}]"#),
        StaticFetcher::new(),
    );

    let outcome = h
        .ingestor
        .analyze(ExtractionInput::Text("Veillée contée à la bibliothèque".into()), None)
        .await?;

    let event = &outcome.events[0];
    assert_eq!(event.category, EventCategory::Culture);
    assert_eq!(event.image, PLACEHOLDER_CULTURE);
    assert_eq!((event.lat, event.lng), (Some(FALLBACK_LAT), Some(FALLBACK_LNG)));
    assert!(outcome.warnings.iter().any(|w| w.contains("no location")));
    assert_eq!(h.geocoder.calls(), 0);
    Ok(())
}

#[tokio::test]
async fn test_cleaning_reports_count_mismatch() -> Result<()> {
    let reply = json!([
        {"title": "Un", "date": "2025-04-12", "location": "Florac"},
        {"title": "Deux", "date": "2025-04-12", "location": "Florac"},
        {"title": "Trois", "date": "2025-04-12", "location": "Florac"},
        {"title": "Quatre", "date": "2025-04-12", "location": "Florac"}
    ])
    .to_string();
    let h = harness(ScriptedCompletion::new().reply(reply), StaticFetcher::new());

    let batch = ["Un", "Deux", "Trois", "Quatre", "Cinq"].map(scraped).to_vec();
    let outcome = h.ingestor.clean_scraped(batch).await?;

    assert_eq!(outcome.events.len(), 4);
    assert_eq!(outcome.count_mismatch, Some(CountMismatch { expected: 5, received: 4 }));
    assert!(outcome.warnings.iter().any(|w| w.contains("expected 5")));
    assert!(h.completion.requests()[0].user_text().contains("EXACTEMENT 5"));
    assert!(outcome.events.iter().all(|e| e.lat == Some(44.32)));
    Ok(())
}

#[tokio::test]
async fn test_cleaning_keeps_source_image_when_counts_align() -> Result<()> {
    let h = harness(
        ScriptedCompletion::new().reply(r#"```json
[{"title": "Fête du miel", "category": "Festival", "date": "2025-08-10", "location": "Florac"}]
```"#),
        StaticFetcher::new(),
    );
    let mut source = scraped("Fête du miel");
    source.image = "https://agenda.example/miel.jpg".into();

    let outcome = h.ingestor.clean_scraped(vec![source]).await?;
    let event = &outcome.events[0];
    assert!(outcome.count_mismatch.is_none());
    assert_eq!(event.category, EventCategory::Festival);
    assert_eq!(event.image, "https://agenda.example/miel.jpg");
    assert_eq!(event.website, "https://agenda.example/");
    assert_eq!(event.address, "Florac, Cévennes, France");
    Ok(())
}

#[tokio::test]
async fn test_malformed_completion_is_a_distinct_error() -> Result<()> {
    let h = harness(
        ScriptedCompletion::new().reply("Je n'ai trouvé aucun événement dans ce texte."),
        StaticFetcher::new(),
    );
    let err = h
        .ingestor
        .analyze(ExtractionInput::Text("rien".into()), None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::MalformedResponse { .. }));
    Ok(())
}

#[tokio::test]
async fn test_url_mode_sends_visible_text_and_images_mode_sends_parts() -> Result<()> {
    let page = "<html><head><script>track()</script></head><body><h1>Agenda</h1><p>Concert le 3 mai à Florac</p></body></html>";
    let h = harness(
        ScriptedCompletion::new()
            .reply(r#"[{"title": "Concert", "date": "2025-05-03", "location": "Florac"}]"#)
            .reply(r#"{"title": "Affiche expo", "date": "2025-06-01"}"#),
        StaticFetcher::new().page("https://mairie.example/agenda", page),
    );

    let outcome = h
        .ingestor
        .analyze(ExtractionInput::Url("https://mairie.example/agenda".into()), Some("Mes règles"))
        .await?;
    assert_eq!(outcome.events[0].website, "https://mairie.example/agenda");

    let images = vec!["data:image/png;base64,AAAA".to_string()];
    let outcome = h.ingestor.analyze(ExtractionInput::Images(images), None).await?;
    assert_eq!(outcome.events.len(), 1);

    let requests = h.completion.requests();
    assert!(requests[0].system.starts_with("Mes règles"));
    assert!(requests[0].user_text().contains("Concert le 3 mai à Florac"));
    assert!(!requests[0].user_text().contains("track()"));
    assert!(requests[1].system.starts_with(Extractor::default_instructions()));
    assert!(requests[1]
        .parts
        .contains(&ContentPart::ImageUrl("data:image/png;base64,AAAA".into())));
    Ok(())
}

#[tokio::test]
async fn test_analysis_flags_published_duplicates() -> Result<()> {
    let h = harness(
        ScriptedCompletion::new().reply(r#"[{"title": "Fête votive", "date": "2025-08-15", "location": "Florac"}, {"title": "Ciné plein air", "date": "2025-08-16", "location": "Florac"}]"#),
        StaticFetcher::new(),
    );
    let mut existing = NewEvent::new("Fête votive de Florac", NaiveDate::from_ymd_opt(2025, 8, 15).unwrap());
    existing.location = "florac".into();
    let existing = h.storage.create_event(existing).await?;

    let outcome = h.ingestor.analyze(ExtractionInput::Text("...".into()), None).await?;
    assert_eq!(outcome.duplicates, 1);
    assert!(outcome.events[0].is_duplicate && !outcome.events[0].selected);
    assert_eq!(outcome.events[0].duplicate_of, Some(existing.id));
    assert!(outcome.events[1].selected);
    Ok(())
}

#[tokio::test]
async fn test_import_batch_contains_per_record_failures() -> Result<()> {
    let h = harness(
        ScriptedCompletion::new().reply(r#"[{"title": "Daté", "date": "2025-09-01", "location": "Florac"}, {"title": "Sans date"}, {"title": "Ignoré", "date": "2025-09-02"}]"#),
        StaticFetcher::new(),
    );
    let mut events = h.ingestor.analyze(ExtractionInput::Text("...".into()), None).await?.events;
    events[2].selected = false;

    let report = h.ingestor.import_batch(events).await?;
    assert_eq!(report.created.len(), 1);
    assert_eq!(report.created[0].title, "Daté");
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].title, "Sans date");
    assert_eq!(h.storage.all_events().await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_social_page_extraction_uses_page_url() -> Result<()> {
    let h = harness(
        ScriptedCompletion::new().reply(r#"{"title": "Soirée jeux", "date": "2025-03-08", "time": "20:00", "location": "Florac", "category": "Atelier"}"#),
        StaticFetcher::new(),
    );
    let event = h
        .ingestor
        .extract_social("<html><body>Soirée jeux samedi</body></html>", "https://www.facebook.com/events/42")
        .await?;
    assert_eq!(event.website, "https://www.facebook.com/events/42");
    assert_eq!(event.category, EventCategory::Atelier);
    assert_eq!(event.lat, Some(44.32));
    Ok(())
}

#[tokio::test]
async fn test_scrape_reports_failure_when_every_url_fails() -> Result<()> {
    let h = harness(
        ScriptedCompletion::new(),
        StaticFetcher::new()
            .failing("https://a.example/agenda")
            .failing("https://b.example/agenda"),
    );
    let outcome = h
        .ingestor
        .scrape_and_flag(
            vec!["https://a.example/agenda".into(), "https://b.example/agenda".into()],
            false,
        )
        .await?;
    assert!(!outcome.success);
    assert_eq!(outcome.failures.len(), 2);
    assert!(outcome.summary.starts_with("Échec"));

    let h = harness(
        ScriptedCompletion::new(),
        StaticFetcher::new()
            .page("https://a.example/agenda", "<html><body><p>Rien cette semaine</p></body></html>")
            .failing("https://b.example/agenda"),
    );
    let outcome = h
        .ingestor
        .scrape_and_flag(
            vec!["https://a.example/agenda".into(), "https://b.example/agenda".into()],
            false,
        )
        .await?;
    assert!(outcome.success);
    Ok(())
}

#[tokio::test]
async fn test_extension_import_inserts_directly() -> Result<()> {
    let h = harness(ScriptedCompletion::new(), StaticFetcher::new());
    let event = h
        .ingestor
        .import_extension_event(json!({
            "title": "Nuit des étoiles",
            "date": "2025-08-09",
            "lat": 44.2,
            "lng": "3.7",
            "sourceUrl": "https://www.facebook.com/events/7"
        }))
        .await?;
    assert_eq!(event.time, "14:00");
    assert_eq!((event.lat, event.lng), (44.2, 3.7));
    assert_eq!(h.storage.get_event(event.id).await?.map(|e| e.title), Some("Nuit des étoiles".into()));
    Ok(())
}

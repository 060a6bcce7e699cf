use anyhow::Result;
use cevennes_connect::config::{GeocodingConfig, RegionConfig};
use cevennes_connect::constants::{FALLBACK_LAT, FALLBACK_LNG};
use cevennes_connect::domain::{
    CandidateStatus, EventCategory, EventPatch, NewCandidate, PageRequest, ScrapedEventCandidate,
};
use cevennes_connect::error::AppError;
use cevennes_connect::pipeline::{GeocoderAdapter, ReviewQueue};
use cevennes_connect::storage::{InMemoryStorage, Storage};
use cevennes_connect::testing::StaticGeocoder;
use chrono::NaiveDate;
use std::sync::Arc;

fn candidate(config_id: i64, title: &str, location: &str) -> NewCandidate {
    NewCandidate {
        scraping_config_id: config_id,
        title: title.to_string(),
        date: NaiveDate::from_ymd_opt(2025, 9, 20),
        raw_date: "20 septembre".to_string(),
        location: location.to_string(),
        description: "Journées du patrimoine".to_string(),
        image: String::new(),
        source_url: "https://mairie.example/agenda/patrimoine".to_string(),
        lat: None,
        lng: None,
        is_duplicate: false,
        duplicate_of: None,
    }
}

async fn setup(candidates: Vec<NewCandidate>) -> Result<(Arc<InMemoryStorage>, ReviewQueue, Vec<ScrapedEventCandidate>)> {
    let storage = Arc::new(InMemoryStorage::new());
    let inserted = storage.insert_candidates(candidates).await?;
    let geocoder = GeocoderAdapter::new(
        Some(Arc::new(StaticGeocoder::new().with("Valleraugue", 44.08, 3.64))),
        &GeocodingConfig::default(),
        &RegionConfig::default(),
    );
    let queue = ReviewQueue::new(storage.clone(), geocoder);
    Ok((storage, queue, inserted))
}

#[tokio::test]
async fn test_validate_applies_defaults_and_links_event() -> Result<()> {
    let (storage, queue, inserted) = setup(vec![candidate(1, "Visite du moulin", "Valleraugue")]).await?;
    let id = inserted[0].id;

    let validated = queue.validate(id, EventPatch::default()).await?;
    let event = validated.event;
    assert_eq!(event.title, "Visite du moulin");
    assert_eq!(event.category, EventCategory::Culture);
    assert_eq!(event.time, "00:00");
    assert_eq!(event.price, "Gratuit");
    assert_eq!(event.address, "Valleraugue");
    assert_eq!(event.website, "https://mairie.example/agenda/patrimoine");
    assert_eq!((event.lat, event.lng), (44.08, 3.64));

    let stored = storage.get_candidate(id).await?.expect("candidate kept");
    assert_eq!(stored.status(), CandidateStatus::Validated);
    assert_eq!(stored.validated_event_id, Some(event.id));
    assert!(stored.validated_at.is_some());
    Ok(())
}

#[tokio::test]
async fn test_overrides_win_over_candidate_fields() -> Result<()> {
    let (_, queue, inserted) = setup(vec![candidate(1, "Visite", "Nowhere")]).await?;
    let overrides = EventPatch {
        title: Some("Visite guidée du moulin".into()),
        category: Some(EventCategory::Festival),
        price: Some("5 €".into()),
        time: Some("  ".into()),
        ..Default::default()
    };

    let event = queue.validate(inserted[0].id, overrides).await?.event;
    assert_eq!(event.title, "Visite guidée du moulin");
    assert_eq!(event.category, EventCategory::Festival);
    assert_eq!(event.price, "5 €");
    assert_eq!(event.time, "00:00");
    assert_eq!((event.lat, event.lng), (FALLBACK_LAT, FALLBACK_LNG));
    Ok(())
}

#[tokio::test]
async fn test_validate_twice_is_a_conflict_and_creates_one_event() -> Result<()> {
    let (storage, queue, inserted) = setup(vec![candidate(1, "Loto", "Valleraugue")]).await?;
    let id = inserted[0].id;

    queue.validate(id, EventPatch::default()).await?;
    let err = queue.validate(id, EventPatch::default()).await.unwrap_err();

    assert!(matches!(err, AppError::AlreadyTerminal { state: "validated", .. }));
    assert_eq!(storage.all_events().await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_terminal_states_conflict_in_either_order() -> Result<()> {
    let (storage, queue, inserted) = setup(vec![
        candidate(1, "Bal", "Valleraugue"),
        candidate(1, "Vide-grenier", "Valleraugue"),
    ])
    .await?;

    queue.reject(inserted[0].id, Some("hors zone".into())).await?;
    let err = queue.validate(inserted[0].id, EventPatch::default()).await.unwrap_err();
    assert!(matches!(err, AppError::AlreadyTerminal { state: "rejected", .. }));
    assert!(storage.all_events().await?.is_empty());

    queue.validate(inserted[1].id, EventPatch::default()).await?;
    let err = queue.reject(inserted[1].id, None).await.unwrap_err();
    assert!(matches!(err, AppError::AlreadyTerminal { state: "validated", .. }));

    let rejected = storage.get_candidate(inserted[0].id).await?.expect("candidate kept");
    assert_eq!(rejected.rejection_reason.as_deref(), Some("hors zone"));
    Ok(())
}

#[tokio::test]
async fn test_pending_list_hides_resolved_and_filters_by_config() -> Result<()> {
    let (_, queue, inserted) = setup(vec![
        candidate(1, "Concert", "Valleraugue"),
        candidate(1, "Théâtre", "Valleraugue"),
        candidate(2, "Rando", "Valleraugue"),
    ])
    .await?;
    queue.reject(inserted[0].id, None).await?;

    let all = queue.list_pending(None, PageRequest::new(None, None, 50)).await?;
    assert_eq!(all.total, 2);
    let config_one = queue.list_pending(Some(1), PageRequest::new(None, None, 50)).await?;
    assert_eq!(config_one.total, 1);
    assert_eq!(config_one.items[0].title, "Théâtre");
    Ok(())
}

#[tokio::test]
async fn test_unknown_candidate_is_not_found() -> Result<()> {
    let (_, queue, _) = setup(Vec::new()).await?;
    let err = queue.reject(404, None).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound { entity: "candidate", .. }));
    Ok(())
}

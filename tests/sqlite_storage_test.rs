use anyhow::Result;
use cevennes_connect::domain::{
    ActorPatch, CandidateStatus, EventPatch, Frequency, NewActor, NewCandidate, NewEvent, NewScrapingConfig,
    Resolution, ScrapingConfigUpdate,
};
use cevennes_connect::error::AppError;
use cevennes_connect::storage::{SqliteStorage, Storage};
use chrono::{NaiveDate, Utc};
use tempfile::tempdir;

fn candidate(config_id: i64, title: &str) -> NewCandidate {
    NewCandidate {
        scraping_config_id: config_id,
        title: title.to_string(),
        date: NaiveDate::from_ymd_opt(2025, 7, 14),
        raw_date: "14 juillet".to_string(),
        location: "Meyrueis".to_string(),
        description: String::new(),
        image: String::new(),
        source_url: "https://meyrueis.example/agenda".to_string(),
        lat: None,
        lng: None,
        is_duplicate: false,
        duplicate_of: None,
    }
}

#[tokio::test]
async fn test_records_survive_reopen() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("cevennes.db");

    let (actor_id, event_id) = {
        let storage = SqliteStorage::open(&path)?;
        let mut actor = NewActor::named("Ferme du Mas Blanc");
        actor.specialites = vec!["pélardon".into(), "miel".into()];
        actor.lat = Some(44.18);
        actor.lng = Some(3.43);
        let actor = storage.create_actor(actor).await?;

        let mut event = NewEvent::new("Bal du 14 juillet", NaiveDate::from_ymd_opt(2025, 7, 14).unwrap());
        event.time = "21:00".into();
        let event = storage.create_event(event).await?;
        (actor.id, event.id)
    };

    let storage = SqliteStorage::open(&path)?;
    let actor = storage.get_actor(&actor_id).await?.expect("actor persisted");
    assert_eq!(actor.specialites, vec!["pélardon".to_string(), "miel".to_string()]);
    assert_eq!((actor.lat, actor.lng), (44.18, 3.43));
    let event = storage.get_event(event_id).await?.expect("event persisted");
    assert_eq!(event.time, "21:00");
    Ok(())
}

#[tokio::test]
async fn test_updates_and_deletes() -> Result<()> {
    let storage = SqliteStorage::open_in_memory()?;
    let actor = storage.create_actor(NewActor::named("Librairie")).await?;

    let updated = storage
        .update_actor(
            &actor.id,
            ActorPatch {
                phone: Some("04 66 00 00 00".into()),
                ..Default::default()
            },
        )
        .await?;
    assert_eq!(updated.name, "Librairie");
    assert_eq!(updated.phone, "04 66 00 00 00");

    let err = storage.update_actor("missing", ActorPatch::default()).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound { .. }));

    let event = storage
        .create_event(NewEvent::new("Marché", NaiveDate::from_ymd_opt(2025, 7, 3).unwrap()))
        .await?;
    let moved = storage
        .update_event(
            event.id,
            EventPatch {
                date: NaiveDate::from_ymd_opt(2025, 7, 10),
                ..Default::default()
            },
        )
        .await?;
    assert_eq!(moved.date, NaiveDate::from_ymd_opt(2025, 7, 10).unwrap());

    assert!(storage.delete_event(event.id).await?);
    assert!(!storage.delete_event(event.id).await?);
    assert!(storage.delete_actor(&actor.id).await?);
    Ok(())
}

#[tokio::test]
async fn test_candidate_resolution_is_compare_and_set() -> Result<()> {
    let storage = SqliteStorage::open_in_memory()?;
    let inserted = storage.insert_candidates(vec![candidate(1, "Bal")]).await?;
    let id = inserted[0].id;
    assert_eq!(inserted[0].status(), CandidateStatus::Pending);

    let rejected = storage
        .resolve_candidate(
            id,
            Resolution::Rejected {
                reason: Some("doublon".into()),
                at: Utc::now(),
            },
        )
        .await?;
    assert_eq!(rejected.status(), CandidateStatus::Rejected);

    let err = storage
        .resolve_candidate(id, Resolution::Validated { event_id: 1, at: Utc::now() })
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::AlreadyTerminal { state: "rejected", .. }));

    let err = storage
        .resolve_candidate(999, Resolution::Rejected { reason: None, at: Utc::now() })
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound { .. }));
    Ok(())
}

#[tokio::test]
async fn test_config_lifecycle_and_candidate_cascade() -> Result<()> {
    let storage = SqliteStorage::open_in_memory()?;
    let config = storage
        .create_config(NewScrapingConfig {
            name: "Mairie de Meyrueis".into(),
            url: "https://meyrueis.example/agenda".into(),
            frequency: Frequency::Weekly,
            active: true,
            next_run_at: None,
        })
        .await?;

    let now = Utc::now();
    let updated = storage
        .update_config(
            config.id,
            ScrapingConfigUpdate {
                last_run_at: Some(now),
                ..Default::default()
            },
        )
        .await?;
    assert_eq!(updated.frequency, Frequency::Weekly);
    assert_eq!(updated.last_run_at.map(|t| t.timestamp()), Some(now.timestamp()));

    storage
        .insert_candidates(vec![candidate(config.id, "Fête"), candidate(config.id, "Loto"), candidate(config.id + 1, "Autre")])
        .await?;
    assert_eq!(storage.delete_candidates_for_config(config.id).await?, 2);
    assert!(storage.delete_config(config.id).await?);
    assert!(storage.get_config(config.id).await?.is_none());
    assert_eq!(storage.all_candidates(None).await?.len(), 1);
    Ok(())
}

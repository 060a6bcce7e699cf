use anyhow::Result;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use cevennes_connect::config::Config;
use cevennes_connect::domain::NewCandidate;
use cevennes_connect::server::{create_router, AppState, Collaborators};
use cevennes_connect::storage::{InMemoryStorage, Storage};
use cevennes_connect::testing::{RecordingSourceControl, ScriptedCompletion, StaticFetcher, StaticGeocoder};
use chrono::NaiveDate;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

fn app_with(storage: Arc<InMemoryStorage>, source_control: RecordingSourceControl) -> Router {
    let fetcher = Arc::new(StaticFetcher::new());
    let parts = Collaborators {
        storage,
        scrape_fetcher: fetcher.clone(),
        page_fetcher: fetcher,
        completion: Arc::new(ScriptedCompletion::new()),
        geocoding: Arc::new(StaticGeocoder::new().with("Anduze", 44.05, 3.98)),
        source_control: Arc::new(source_control),
    };
    create_router(AppState::new(&Config::default(), parts))
}

fn app() -> Router {
    app_with(Arc::new(InMemoryStorage::new()), RecordingSourceControl::new())
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> Result<(StatusCode, Value)> {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))?,
        None => builder.body(Body::empty())?,
    };
    let response = app.clone().oneshot(request).await?;
    let status = response.status();
    let bytes = hyper::body::to_bytes(response.into_body()).await?;
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    Ok((status, json))
}

#[tokio::test]
async fn test_health() -> Result<()> {
    let (status, body) = send(&app(), "GET", "/health", None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    Ok(())
}

#[tokio::test]
async fn test_event_crud_and_bulk_delete() -> Result<()> {
    let app = app();
    let (status, created) = send(
        &app,
        "POST",
        "/api/events",
        Some(json!({"title": "Fête de la musique", "date": "2025-06-21", "location": "Anduze", "address": "Anduze"})),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["event"]["lat"], 44.05);
    let id = created["event"]["id"].as_i64().expect("numeric id");

    let (status, fetched) = send(&app, "GET", &format!("/api/events/{id}"), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["title"], "Fête de la musique");

    let (status, body) = send(
        &app,
        "POST",
        "/api/bulk-delete",
        Some(json!({"type": "events", "ids": [id, 9999]})),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["deleted_count"], 1);

    let (status, body) = send(&app, "GET", &format!("/api/events/{id}"), None).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().is_some());
    Ok(())
}

#[tokio::test]
async fn test_invalid_body_is_a_bad_request() -> Result<()> {
    let (status, body) = send(&app(), "POST", "/api/events", Some(json!({"date": "2025-06-21"}))).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap_or_default().contains("title"));
    Ok(())
}

#[tokio::test]
async fn test_geocode_requires_address() -> Result<()> {
    let app = app();
    let (status, _) = send(&app, "GET", "/api/geocode", None).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(&app, "GET", "/api/geocode?address=Anduze", None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "OK");
    Ok(())
}

#[tokio::test]
async fn test_validating_twice_conflicts() -> Result<()> {
    let storage = Arc::new(InMemoryStorage::new());
    let inserted = storage
        .insert_candidates(vec![NewCandidate {
            scraping_config_id: 1,
            title: "Vide-grenier".into(),
            date: NaiveDate::from_ymd_opt(2025, 5, 1),
            raw_date: "1er mai".into(),
            location: "Anduze".into(),
            description: String::new(),
            image: String::new(),
            source_url: "https://mairie.example/agenda".into(),
            lat: None,
            lng: None,
            is_duplicate: false,
            duplicate_of: None,
        }])
        .await?;
    let app = app_with(storage.clone(), RecordingSourceControl::new());
    let uri = format!("/api/scraped-events-pending/{}/validate", inserted[0].id);

    let (status, body) = send(&app, "POST", &uri, None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["event"]["title"], "Vide-grenier");

    let (status, _) = send(&app, "POST", &uri, Some(json!({}))).await?;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(storage.all_events().await?.len(), 1);

    let (_, pending) = send(&app, "GET", "/api/scraped-events-pending", None).await?;
    assert_eq!(pending["total"], 0);
    Ok(())
}

#[tokio::test]
async fn test_publish_conflict_maps_to_409() -> Result<()> {
    let app = app_with(Arc::new(InMemoryStorage::new()), RecordingSourceControl::new().conflicting());
    let (status, body) = send(&app, "POST", "/api/publish/events", None).await?;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().is_some());

    let (status, _) = send(&app, "POST", "/api/publish/venues", None).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn test_unknown_scraping_config_is_not_found() -> Result<()> {
    let (status, _) = send(&app(), "POST", "/api/scraping-configs/42/run", None).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}

use super::error::ApiResult;
use super::state::AppState;
use crate::domain::{
    ActorPatch, ActorQuery, EntityKind, EventPatch, EventQuery, ExtractedEvent, NewActor, NewEvent, PageRequest,
    ScrapedEvent, ScrapingConfigRequest,
};
use crate::constants::DEFAULT_PENDING_PAGE_LIMIT;
use crate::error::AppError;
use crate::infra::FileCommit;
use crate::pipeline::{ExtractionInput, Extractor};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

/// Body decoding with crate errors, so a bad payload answers 400 with the usual error body.
fn parse<T: DeserializeOwned>(body: Value) -> Result<T, AppError> {
    serde_json::from_value(body).map_err(|e| AppError::Validation(format!("invalid request body: {e}")))
}

fn require(value: Option<String>, field: &str) -> Result<String, AppError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::Validation(format!("{field} is required")))
}

pub async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "service": "cevennes-connect",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

pub async fn metrics() -> impl IntoResponse {
    match crate::metrics::render() {
        Some(body) => (StatusCode::OK, body),
        None => (StatusCode::SERVICE_UNAVAILABLE, "metrics recorder not installed".to_string()),
    }
}

// ---------------------------------------------------------------------------
// Actors
// ---------------------------------------------------------------------------

pub async fn list_actors(State(state): State<AppState>, Query(query): Query<ActorQuery>) -> ApiResult<Json<Value>> {
    let page = state.catalog.list_actors(&query).await?;
    Ok(Json(page.to_json("actors")))
}

pub async fn create_actor(State(state): State<AppState>, Json(body): Json<Value>) -> ApiResult<impl IntoResponse> {
    let actor: NewActor = parse(body)?;
    let created = state.catalog.create_actor(actor).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "actor": created.record, "warning": created.warning })),
    ))
}

pub async fn get_actor(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<Value>> {
    let actor = state.catalog.get_actor(&id).await?;
    Ok(Json(json!(actor)))
}

pub async fn update_actor(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> ApiResult<Json<Value>> {
    let patch: ActorPatch = parse(body)?;
    let actor = state.catalog.update_actor(&id, patch).await?;
    Ok(Json(json!({ "success": true, "actor": actor })))
}

pub async fn delete_actor(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<Value>> {
    state.catalog.delete_actor(&id).await?;
    Ok(Json(json!({ "success": true })))
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

pub async fn list_events(State(state): State<AppState>, Query(query): Query<EventQuery>) -> ApiResult<Json<Value>> {
    let page = state.catalog.list_events(&query).await?;
    Ok(Json(page.to_json("events")))
}

pub async fn create_event(State(state): State<AppState>, Json(body): Json<Value>) -> ApiResult<impl IntoResponse> {
    let event: NewEvent = parse(body)?;
    let created = state.catalog.create_event(event).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "event": created.record, "warning": created.warning })),
    ))
}

pub async fn get_event(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<Json<Value>> {
    let event = state.catalog.get_event(id).await?;
    Ok(Json(json!(event)))
}

pub async fn update_event(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<Value>,
) -> ApiResult<Json<Value>> {
    let patch: EventPatch = parse(body)?;
    let event = state.catalog.update_event(id, patch).await?;
    Ok(Json(json!({ "success": true, "event": event })))
}

pub async fn delete_event(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<Json<Value>> {
    state.catalog.delete_event(id).await?;
    Ok(Json(json!({ "success": true })))
}

#[derive(Deserialize)]
struct BulkDeleteBody {
    #[serde(rename = "type")]
    kind: EntityKind,
    ids: Vec<Value>,
}

pub async fn bulk_delete(State(state): State<AppState>, Json(body): Json<Value>) -> ApiResult<Json<Value>> {
    let body: BulkDeleteBody = parse(body)?;
    let ids: Vec<String> = body
        .ids
        .into_iter()
        .filter_map(|id| match id {
            Value::String(s) => Some(s),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .collect();
    let deleted = state.catalog.bulk_delete(body.kind, &ids).await?;
    Ok(Json(json!({ "success": true, "deleted_count": deleted })))
}

// ---------------------------------------------------------------------------
// Ingestion
// ---------------------------------------------------------------------------

#[derive(Deserialize, Default)]
#[serde(default)]
struct ScrapeBody {
    url: Option<String>,
    urls: Vec<String>,
    deep: bool,
}

pub async fn scrape_events(State(state): State<AppState>, Json(body): Json<Value>) -> ApiResult<Json<Value>> {
    let body: ScrapeBody = parse(body)?;
    let mut urls = body.urls;
    urls.extend(body.url);
    let outcome = state.ingestor.scrape_and_flag(urls, body.deep).await?;
    Ok(Json(json!(outcome)))
}

#[derive(Deserialize)]
struct CleanBody {
    #[serde(default)]
    events: Vec<ScrapedEvent>,
}

pub async fn clean_scraped_events(State(state): State<AppState>, Json(body): Json<Value>) -> ApiResult<Json<Value>> {
    let body: CleanBody = parse(body)?;
    let outcome = state.ingestor.clean_scraped(body.events).await?;
    let mut response = json!(outcome);
    response["success"] = json!(true);
    Ok(Json(response))
}

#[derive(Deserialize)]
struct ExtractBody {
    mode: String,
    text: Option<String>,
    url: Option<String>,
    #[serde(default)]
    images: Vec<String>,
    instructions: Option<String>,
}

pub async fn extract(State(state): State<AppState>, Json(body): Json<Value>) -> ApiResult<Json<Value>> {
    let body: ExtractBody = parse(body)?;
    let input = match body.mode.as_str() {
        "text" => ExtractionInput::Text(require(body.text, "text")?),
        "url" => ExtractionInput::Url(require(body.url, "url")?),
        "images" => ExtractionInput::Images(body.images),
        other => return Err(AppError::Validation(format!("unknown mode '{other}' (text, url or images)")).into()),
    };
    let outcome = state.ingestor.analyze(input, body.instructions.as_deref()).await?;
    let mut response = json!(outcome);
    response["success"] = json!(true);
    Ok(Json(response))
}

pub async fn default_instructions() -> impl IntoResponse {
    Json(json!({ "instructions": Extractor::default_instructions() }))
}

#[derive(Deserialize)]
struct ImportBody {
    events: Vec<ExtractedEvent>,
}

pub async fn import_events(State(state): State<AppState>, Json(body): Json<Value>) -> ApiResult<Json<Value>> {
    let body: ImportBody = parse(body)?;
    let report = state.ingestor.import_batch(body.events).await?;
    Ok(Json(json!({
        "success": true,
        "created_count": report.created.len(),
        "created": report.created,
        "failed": report.failed,
    })))
}

#[derive(Deserialize)]
struct SocialBody {
    html: Option<String>,
    url: Option<String>,
}

pub async fn extract_facebook_event(State(state): State<AppState>, Json(body): Json<Value>) -> ApiResult<Json<Value>> {
    let body: SocialBody = parse(body)?;
    let html = require(body.html, "html")?;
    let url = require(body.url, "url")?;
    let event = state.ingestor.extract_social(&html, &url).await?;
    Ok(Json(json!({ "success": true, "event": event })))
}

#[derive(Deserialize)]
struct FetchBody {
    url: Option<String>,
}

pub async fn fetch_url(State(state): State<AppState>, Json(body): Json<Value>) -> ApiResult<Json<Value>> {
    let body: FetchBody = parse(body)?;
    let url = require(body.url, "url")?;
    url::Url::parse(&url).map_err(|e| AppError::Validation(format!("invalid url '{url}': {e}")))?;
    let page = state.page_fetcher.fetch(&url).await?;
    info!("Fetched {} ({} bytes)", page.final_url, page.body.len());
    Ok(Json(json!({
        "success": true,
        "html": page.body,
        "url": page.final_url,
        "status": page.status,
    })))
}

pub async fn import_extension_event(State(state): State<AppState>, Json(body): Json<Value>) -> ApiResult<impl IntoResponse> {
    let event = state.ingestor.import_extension_event(body).await?;
    Ok((StatusCode::CREATED, Json(json!({ "success": true, "event": event }))))
}

// ---------------------------------------------------------------------------
// Schedules and review queue
// ---------------------------------------------------------------------------

pub async fn list_configs(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let configs = state.schedules.list().await?;
    Ok(Json(json!({ "configs": configs })))
}

pub async fn create_config(State(state): State<AppState>, Json(body): Json<Value>) -> ApiResult<impl IntoResponse> {
    let request: ScrapingConfigRequest = parse(body)?;
    let config = state.schedules.create(request).await?;
    Ok((StatusCode::CREATED, Json(json!({ "success": true, "config": config }))))
}

pub async fn get_config(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<Json<Value>> {
    let config = state.schedules.get(id).await?;
    Ok(Json(json!(config)))
}

pub async fn update_config(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<Value>,
) -> ApiResult<Json<Value>> {
    let request: ScrapingConfigRequest = parse(body)?;
    let config = state.schedules.update(id, request).await?;
    Ok(Json(json!({ "success": true, "config": config })))
}

pub async fn delete_config(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<Json<Value>> {
    let removed = state.schedules.delete(id).await?;
    Ok(Json(json!({ "success": true, "deleted_candidates": removed })))
}

pub async fn run_config(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<Json<Value>> {
    let report = state.schedules.run(id).await?;
    let mut response = json!(report);
    response["success"] = json!(true);
    Ok(Json(response))
}

#[derive(Deserialize, Default)]
#[serde(default)]
pub struct PendingQuery {
    page: Option<usize>,
    limit: Option<usize>,
    #[serde(rename = "configId")]
    config_id: Option<i64>,
}

pub async fn list_pending(State(state): State<AppState>, Query(query): Query<PendingQuery>) -> ApiResult<Json<Value>> {
    let page = PageRequest::new(query.page, query.limit, DEFAULT_PENDING_PAGE_LIMIT);
    let pending = state.review.list_pending(query.config_id, page).await?;
    Ok(Json(pending.to_json("events")))
}

pub async fn validate_pending(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    body: Option<Json<Value>>,
) -> ApiResult<Json<Value>> {
    let overrides: EventPatch = match body {
        Some(Json(Value::Null)) | None => EventPatch::default(),
        Some(Json(body)) => parse(body)?,
    };
    let validated = state.review.validate(id, overrides).await?;
    Ok(Json(json!({
        "success": true,
        "event": validated.event,
        "candidate": validated.candidate,
    })))
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RejectBody {
    reason: Option<String>,
}

pub async fn reject_pending(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    body: Option<Json<Value>>,
) -> ApiResult<Json<Value>> {
    let body: RejectBody = match body {
        Some(Json(Value::Null)) | None => RejectBody::default(),
        Some(Json(body)) => parse(body)?,
    };
    let candidate = state.review.reject(id, body.reason).await?;
    Ok(Json(json!({ "success": true, "candidate": candidate })))
}

// ---------------------------------------------------------------------------
// Collaborator pass-throughs and publication
// ---------------------------------------------------------------------------

#[derive(Deserialize, Default)]
#[serde(default)]
pub struct GeocodeParams {
    address: Option<String>,
}

async fn geocode(state: &AppState, address: Option<String>) -> ApiResult<Json<Value>> {
    let address = require(address, "address")?;
    let response = state.geocoding.geocode(&address).await?;
    Ok(Json(json!(response)))
}

pub async fn geocode_get(State(state): State<AppState>, Query(params): Query<GeocodeParams>) -> ApiResult<Json<Value>> {
    geocode(&state, params.address).await
}

pub async fn geocode_post(State(state): State<AppState>, Json(body): Json<Value>) -> ApiResult<Json<Value>> {
    let params: GeocodeParams = parse(body)?;
    geocode(&state, params.address).await
}

pub async fn github_commit(State(state): State<AppState>, Json(body): Json<Value>) -> ApiResult<Json<Value>> {
    let commit: FileCommit = parse(body)?;
    let result = state.publisher.commit_file(commit).await?;
    Ok(Json(json!({
        "success": true,
        "message": "File committed successfully",
        "created": result.created,
        "commit": { "sha": result.sha, "url": result.url },
    })))
}

pub async fn publish(State(state): State<AppState>, Path(kind): Path<String>) -> ApiResult<Json<Value>> {
    let kind = match kind.as_str() {
        "events" => EntityKind::Events,
        "actors" => EntityKind::Actors,
        other => return Err(AppError::Validation(format!("cannot publish '{other}' (events or actors)")).into()),
    };
    let result = state.publisher.publish_snapshot(kind).await?;
    Ok(Json(json!({
        "success": true,
        "created": result.created,
        "commit": { "sha": result.sha, "url": result.url },
    })))
}

pub async fn openai(State(state): State<AppState>, Json(body): Json<Value>) -> ApiResult<Json<Value>> {
    let response = state.completion.chat_raw(body).await?;
    Ok(Json(response))
}

//! In-process stand-ins for the outside collaborators, used by unit and integration tests.

use crate::error::{AppError, Result};
use crate::infra::{
    CommitResult, CompletionClient, CompletionRequest, FetchedPage, FileCommit, GeocodeResponse, GeocodeResult,
    GeocodingProvider, Geometry, HtmlFetcher, LatLng, SourceControl,
};
use crate::util::fold;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Serves canned HTML per URL. Unknown or failing URLs answer with an upstream error.
#[derive(Default)]
pub struct StaticFetcher {
    pages: HashMap<String, String>,
    failing: HashSet<String>,
    fetched: Mutex<Vec<String>>,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, url: &str, html: &str) -> Self {
        self.pages.insert(url.to_string(), html.to_string());
        self
    }

    pub fn failing(mut self, url: &str) -> Self {
        self.failing.insert(url.to_string());
        self
    }

    pub fn fetched(&self) -> Vec<String> {
        self.fetched.lock().map(|f| f.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl HtmlFetcher for StaticFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedPage> {
        if let Ok(mut fetched) = self.fetched.lock() {
            fetched.push(url.to_string());
        }
        if self.failing.contains(url) {
            return Err(AppError::Upstream {
                service: "fetch",
                status: 503,
                detail: format!("{url} unavailable"),
            });
        }
        match self.pages.get(url) {
            Some(body) => Ok(FetchedPage {
                final_url: url.to_string(),
                status: 200,
                body: body.clone(),
            }),
            None => Err(AppError::Upstream {
                service: "fetch",
                status: 404,
                detail: format!("{url} not found"),
            }),
        }
    }
}

/// Replies with queued completions in order and records every request.
#[derive(Default)]
pub struct ScriptedCompletion {
    replies: Mutex<VecDeque<String>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedCompletion {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(self, text: impl Into<String>) -> Self {
        if let Ok(mut replies) = self.replies.lock() {
            replies.push_back(text.into());
        }
        self
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    fn next_reply(&self) -> Result<String> {
        self.replies
            .lock()
            .ok()
            .and_then(|mut r| r.pop_front())
            .ok_or_else(|| AppError::Upstream {
                service: "openai",
                status: 500,
                detail: "no scripted reply left".into(),
            })
    }
}

#[async_trait]
impl CompletionClient for ScriptedCompletion {
    async fn complete(&self, request: CompletionRequest) -> Result<String> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request);
        }
        self.next_reply()
    }

    async fn chat_raw(&self, body: Value) -> Result<Value> {
        if !body["messages"].is_array() {
            return Err(AppError::Validation("messages array is required".into()));
        }
        let content = self.next_reply()?;
        Ok(json!({
            "choices": [{ "index": 0, "message": { "role": "assistant", "content": content } }]
        }))
    }
}

/// Resolves any query containing a known place name; everything else is `ZERO_RESULTS`.
#[derive(Default)]
pub struct StaticGeocoder {
    places: Vec<(String, f64, f64)>,
    fail: bool,
    calls: AtomicUsize,
}

impl StaticGeocoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, place: &str, lat: f64, lng: f64) -> Self {
        self.places.push((place.to_string(), lat, lng));
        self
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GeocodingProvider for StaticGeocoder {
    async fn geocode(&self, address: &str) -> Result<GeocodeResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(AppError::Upstream {
                service: "geocoding",
                status: 500,
                detail: "provider down".into(),
            });
        }
        let query = fold(address);
        let hit = self.places.iter().find(|(place, _, _)| query.contains(&fold(place)));
        Ok(match hit {
            Some((place, lat, lng)) => GeocodeResponse {
                status: "OK".into(),
                results: vec![GeocodeResult {
                    formatted_address: format!("{place}, France"),
                    geometry: Geometry {
                        location: LatLng { lat: *lat, lng: *lng },
                    },
                }],
                error_message: None,
            },
            None => GeocodeResponse {
                status: "ZERO_RESULTS".into(),
                results: Vec::new(),
                error_message: None,
            },
        })
    }
}

/// Keeps file revisions in memory and records the revision each write was based on.
#[derive(Default)]
pub struct RecordingSourceControl {
    files: Mutex<HashMap<String, String>>,
    prior_shas: Mutex<Vec<Option<String>>>,
    commits: AtomicUsize,
    conflict: bool,
}

impl RecordingSourceControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every write answers with a conflict.
    pub fn conflicting(mut self) -> Self {
        self.conflict = true;
        self
    }

    pub fn prior_shas(&self) -> Vec<Option<String>> {
        self.prior_shas.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl SourceControl for RecordingSourceControl {
    async fn file_sha(&self, path: &str) -> Result<Option<String>> {
        let files = self
            .files
            .lock()
            .map_err(|_| AppError::Storage("source control lock poisoned".into()))?;
        Ok(files.get(path).cloned())
    }

    async fn put_file(&self, commit: &FileCommit, prior_sha: Option<&str>) -> Result<CommitResult> {
        if let Ok(mut prior) = self.prior_shas.lock() {
            prior.push(prior_sha.map(str::to_string));
        }
        if self.conflict {
            return Err(AppError::PublishConflict(format!("{}: sha does not match", commit.path)));
        }
        let mut files = self
            .files
            .lock()
            .map_err(|_| AppError::Storage("source control lock poisoned".into()))?;
        if files.get(&commit.path).map(String::as_str) != prior_sha {
            return Err(AppError::PublishConflict(format!("{}: stale revision", commit.path)));
        }
        let n = self.commits.fetch_add(1, Ordering::SeqCst) + 1;
        let sha = format!("sha-{n}");
        files.insert(commit.path.clone(), sha.clone());
        Ok(CommitResult {
            url: format!("https://example.test/commit/{sha}"),
            sha,
            created: prior_sha.is_none(),
        })
    }
}

//! Narrow interfaces to the outside collaborators. Adapters live next to this file;
//! in-process fakes live in `crate::testing`.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

// Fetch-side ports
#[async_trait]
pub trait HtmlFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedPage>;
}

#[derive(Clone, Debug)]
pub struct FetchedPage {
    /// URL after redirects.
    pub final_url: String,
    pub status: u16,
    pub body: String,
}

// Completion-side ports
#[derive(Clone, Debug, PartialEq)]
pub enum ContentPart {
    Text(String),
    /// Remote URL or `data:` URI.
    ImageUrl(String),
}

#[derive(Clone, Debug)]
pub struct CompletionRequest {
    pub system: String,
    pub parts: Vec<ContentPart>,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl CompletionRequest {
    pub fn text(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            parts: vec![ContentPart::Text(user.into())],
            temperature: 0.3,
            max_tokens: 4096,
        }
    }

    pub fn user_text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                ContentPart::Text(t) => Some(t.as_str()),
                ContentPart::ImageUrl(_) => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// One system + user exchange; returns the assistant text.
    async fn complete(&self, request: CompletionRequest) -> Result<String>;

    /// Forwards a chat body unchanged and returns the provider's JSON.
    async fn chat_raw(&self, body: serde_json::Value) -> Result<serde_json::Value>;
}

// Geocoding port, in the provider's native response shape
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeocodeResponse {
    pub status: String,
    #[serde(default)]
    pub results: Vec<GeocodeResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeocodeResult {
    pub formatted_address: String,
    pub geometry: Geometry,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Geometry {
    pub location: LatLng,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl GeocodeResponse {
    pub fn first(&self) -> Option<&GeocodeResult> {
        if self.status == "OK" {
            self.results.first()
        } else {
            None
        }
    }
}

#[async_trait]
pub trait GeocodingProvider: Send + Sync {
    async fn geocode(&self, address: &str) -> Result<GeocodeResponse>;
}

// Source-control port
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct FileCommit {
    #[serde(rename = "filePath")]
    pub path: String,
    pub content: String,
    #[serde(rename = "commitMessage")]
    pub message: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CommitResult {
    pub sha: String,
    pub url: String,
    /// True when the file did not exist before this commit.
    pub created: bool,
}

#[async_trait]
pub trait SourceControl: Send + Sync {
    /// Current revision marker of `path`, `None` when the file does not exist.
    async fn file_sha(&self, path: &str) -> Result<Option<String>>;

    /// Creates (`prior_sha = None`) or updates the file. A stale marker is a `PublishConflict`.
    async fn put_file(&self, commit: &FileCommit, prior_sha: Option<&str>) -> Result<CommitResult>;
}

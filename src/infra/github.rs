use super::ports::{CommitResult, FileCommit, SourceControl};
use crate::config::PublishConfig;
use crate::error::{AppError, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::header::{ACCEPT, USER_AGENT};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info, warn};

const DEFAULT_REPO: &str = "gaetanSimonot/cevennes-sud-website";

/// GitHub contents API. Optimistic concurrency via the file blob sha.
pub struct GitHubPublisher {
    client: reqwest::Client,
    token: Option<String>,
    repo: String,
    branch: String,
    api_base_url: String,
}

#[derive(Deserialize)]
struct ContentsResponse {
    sha: String,
}

#[derive(Deserialize)]
struct PutResponse {
    commit: CommitInfo,
}

#[derive(Deserialize)]
struct CommitInfo {
    sha: String,
    html_url: String,
}

impl GitHubPublisher {
    pub fn new(token: Option<String>, config: &PublishConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            token,
            repo: config.repo.clone().unwrap_or_else(|| DEFAULT_REPO.to_string()),
            branch: config.branch.clone(),
            api_base_url: config.api_base_url.trim_end_matches('/').to_string(),
        })
    }

    fn token(&self) -> Result<&str> {
        self.token.as_deref().ok_or_else(|| {
            AppError::Config(
                "GitHub token not configured on server. Please set GITHUB_TOKEN in environment variables."
                    .into(),
            )
        })
    }

    fn contents_url(&self, path: &str) -> String {
        format!(
            "{}/repos/{}/contents/{}",
            self.api_base_url,
            self.repo,
            path.trim_start_matches('/')
        )
    }

    fn request(&self, method: reqwest::Method, url: &str, token: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .header("Authorization", format!("token {token}"))
            .header(ACCEPT, "application/vnd.github.v3+json")
            .header(USER_AGENT, "Cevennes-Connect-App")
    }
}

async fn error_detail(resp: reqwest::Response) -> String {
    let text = resp.text().await.unwrap_or_default();
    serde_json::from_str::<serde_json::Value>(&text)
        .ok()
        .and_then(|v| v["message"].as_str().map(str::to_string))
        .unwrap_or(text)
}

#[async_trait]
impl SourceControl for GitHubPublisher {
    async fn file_sha(&self, path: &str) -> Result<Option<String>> {
        let token = self.token()?;
        let resp = self
            .request(reqwest::Method::GET, &self.contents_url(path), token)
            .query(&[("ref", self.branch.as_str())])
            .send()
            .await?;

        match resp.status() {
            StatusCode::NOT_FOUND => {
                debug!(path, "file does not exist yet");
                Ok(None)
            }
            status if status.is_success() => {
                let body: ContentsResponse = resp.json().await?;
                debug!(path, sha = %body.sha, "file exists");
                Ok(Some(body.sha))
            }
            status => Err(AppError::Upstream {
                service: "github",
                status: status.as_u16(),
                detail: error_detail(resp).await,
            }),
        }
    }

    async fn put_file(&self, commit: &FileCommit, prior_sha: Option<&str>) -> Result<CommitResult> {
        let token = self.token()?;
        let mut payload = json!({
            "message": commit.message,
            "content": STANDARD.encode(commit.content.as_bytes()),
            "branch": self.branch,
        });
        if let Some(sha) = prior_sha {
            payload["sha"] = json!(sha);
        }

        let resp = self
            .request(reqwest::Method::PUT, &self.contents_url(&commit.path), token)
            .json(&payload)
            .send()
            .await?;

        let status = resp.status();
        if status == StatusCode::CONFLICT || status == StatusCode::UNPROCESSABLE_ENTITY {
            let detail = error_detail(resp).await;
            warn!(path = %commit.path, %detail, "publish conflict");
            return Err(AppError::PublishConflict(format!("{}: {detail}", commit.path)));
        }
        if !status.is_success() {
            return Err(AppError::Upstream {
                service: "github",
                status: status.as_u16(),
                detail: error_detail(resp).await,
            });
        }

        let body: PutResponse = resp.json().await?;
        info!(path = %commit.path, sha = %body.commit.sha, "commit successful");
        Ok(CommitResult {
            sha: body.commit.sha,
            url: body.commit.html_url,
            created: prior_sha.is_none(),
        })
    }
}

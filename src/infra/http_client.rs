use super::ports::{FetchedPage, HtmlFetcher};
use crate::config::HttpConfig;
use crate::error::{AppError, Result};
use crate::metrics::ScraperMetrics;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE};
use reqwest::redirect::Policy;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Browser-like HTML fetcher with a hard deadline and a redirect cap.
pub struct ReqwestFetcher {
    client: reqwest::Client,
}

impl ReqwestFetcher {
    pub fn new(http: &HttpConfig, timeout: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
        );
        let language = HeaderValue::from_str(&http.accept_language)
            .map_err(|e| AppError::Config(format!("invalid accept_language: {e}")))?;
        headers.insert(ACCEPT_LANGUAGE, language);

        let client = reqwest::Client::builder()
            .user_agent(http.user_agent.clone())
            .default_headers(headers)
            .timeout(timeout)
            .redirect(Policy::limited(http.max_redirects))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HtmlFetcher for ReqwestFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedPage> {
        let started = Instant::now();
        let resp = self.client.get(url).send().await.map_err(|e| {
            warn!(url, error = %e, "fetch failed");
            ScraperMetrics::page_failed("network");
            AppError::from(e)
        })?;

        let status = resp.status();
        let final_url = resp.url().to_string();
        if !status.is_success() {
            ScraperMetrics::page_failed("status");
            return Err(AppError::Upstream {
                service: "fetch",
                status: status.as_u16(),
                detail: format!("{url} answered {status}"),
            });
        }

        let body = resp.text().await?;
        ScraperMetrics::page_fetched(started.elapsed().as_secs_f64());
        debug!(url, final_url = %final_url, bytes = body.len(), "fetched page");
        Ok(FetchedPage {
            final_url,
            status: status.as_u16(),
            body,
        })
    }
}

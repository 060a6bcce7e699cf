use super::ports::{GeocodeResponse, GeocodingProvider};
use crate::config::GeocodingConfig;
use crate::error::{AppError, Result};
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

/// Google geocode JSON API.
pub struct GoogleGeocoder {
    client: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
}

impl GoogleGeocoder {
    pub fn new(api_key: Option<String>, config: &GeocodingConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            api_key,
            base_url: config.base_url.clone(),
        })
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }
}

#[async_trait]
impl GeocodingProvider for GoogleGeocoder {
    async fn geocode(&self, address: &str) -> Result<GeocodeResponse> {
        let key = self.api_key.as_deref().ok_or_else(|| {
            AppError::Config("Google Maps API key not configured on server (GOOGLE_MAPS_API_KEY)".into())
        })?;

        let resp = self
            .client
            .get(&self.base_url)
            .query(&[("address", address), ("key", key)])
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(AppError::Upstream {
                service: "geocoding",
                status: status.as_u16(),
                detail: resp.text().await.unwrap_or_default(),
            });
        }

        let body: GeocodeResponse = resp.json().await?;
        debug!(address, status = %body.status, results = body.results.len(), "geocode response");
        Ok(body)
    }
}

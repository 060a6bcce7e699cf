use crate::config::{GeocodingConfig, RegionConfig};
use crate::infra::GeocodingProvider;
use crate::metrics::GeocoderMetrics;
use crate::util::fold;
use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GeocodeSource {
    Resolved,
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeocodeOutcome {
    pub lat: f64,
    pub lng: f64,
    pub formatted_address: Option<String>,
    pub source: GeocodeSource,
}

/// Address to coordinates, never failing: every miss lands on the fallback town centre.
#[derive(Clone)]
pub struct GeocoderAdapter {
    provider: Option<Arc<dyn GeocodingProvider>>,
    region_hint: String,
    fallback: (f64, f64),
}

impl GeocoderAdapter {
    pub fn new(
        provider: Option<Arc<dyn GeocodingProvider>>,
        geocoding: &GeocodingConfig,
        region: &RegionConfig,
    ) -> Self {
        Self {
            provider,
            region_hint: geocoding.region_hint.clone(),
            fallback: (region.fallback_lat, region.fallback_lng),
        }
    }

    pub fn fallback(&self) -> GeocodeOutcome {
        GeocodeOutcome {
            lat: self.fallback.0,
            lng: self.fallback.1,
            formatted_address: None,
            source: GeocodeSource::Fallback,
        }
    }

    /// The query actually sent to the provider.
    pub fn qualified(&self, address: &str) -> String {
        let address = address.trim();
        let folded = fold(address);
        if self.region_hint.is_empty()
            || folded.contains(&fold(&self.region_hint))
            || folded.contains("france")
        {
            address.to_string()
        } else {
            format!("{address}, {}", self.region_hint)
        }
    }

    pub async fn resolve(&self, address: &str) -> GeocodeOutcome {
        if address.trim().is_empty() {
            GeocoderMetrics::fallback("empty_address");
            return self.fallback();
        }
        let Some(provider) = &self.provider else {
            GeocoderMetrics::fallback("not_configured");
            return self.fallback();
        };

        let query = self.qualified(address);
        match provider.geocode(&query).await {
            Ok(response) => match response.first() {
                Some(hit) => {
                    info!("📍 Geocoded: {} → {}", query, hit.formatted_address);
                    GeocoderMetrics::resolved();
                    GeocodeOutcome {
                        lat: hit.geometry.location.lat,
                        lng: hit.geometry.location.lng,
                        formatted_address: Some(hit.formatted_address.clone()),
                        source: GeocodeSource::Resolved,
                    }
                }
                None => {
                    warn!(address = %query, status = %response.status, "no geocoding result, using fallback");
                    GeocoderMetrics::fallback("no_result");
                    self.fallback()
                }
            },
            Err(e) => {
                warn!(address = %query, error = %e, "geocoding failed, using fallback");
                GeocoderMetrics::fallback(e.kind());
                self.fallback()
            }
        }
    }

    /// One outcome per address, same order, requests issued concurrently.
    pub async fn resolve_all(&self, addresses: &[String]) -> Vec<GeocodeOutcome> {
        join_all(addresses.iter().map(|a| self.resolve(a))).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StaticGeocoder;

    fn adapter(provider: Option<Arc<dyn GeocodingProvider>>) -> GeocoderAdapter {
        GeocoderAdapter::new(provider, &GeocodingConfig::default(), &RegionConfig::default())
    }

    #[tokio::test]
    async fn test_empty_address_skips_provider() {
        let geocoder = Arc::new(StaticGeocoder::new().with("Florac", 44.32, 3.59));
        let outcome = adapter(Some(geocoder.clone())).resolve("   ").await;
        assert_eq!(outcome.source, GeocodeSource::Fallback);
        assert_eq!((outcome.lat, outcome.lng), (RegionConfig::default().fallback_lat, RegionConfig::default().fallback_lng));
        assert_eq!(geocoder.calls(), 0);
    }

    #[tokio::test]
    async fn test_resolved_and_missed_addresses() {
        let geocoder = Arc::new(StaticGeocoder::new().with("Florac", 44.32, 3.59));
        let adapter = adapter(Some(geocoder.clone()));
        let outcomes = adapter
            .resolve_all(&["Florac".to_string(), "Nulle Part".to_string()])
            .await;
        assert_eq!(outcomes[0].source, GeocodeSource::Resolved);
        assert_eq!(outcomes[0].lat, 44.32);
        assert_eq!(outcomes[1].source, GeocodeSource::Fallback);
        assert_eq!(geocoder.calls(), 2);
    }

    #[tokio::test]
    async fn test_provider_error_falls_back() {
        let outcome = adapter(Some(Arc::new(StaticGeocoder::failing()))).resolve("Ganges").await;
        assert_eq!(outcome.source, GeocodeSource::Fallback);
    }

    #[test]
    fn test_region_hint_appended_once() {
        let adapter = adapter(None);
        assert_eq!(adapter.qualified("Sumène"), "Sumène, Cévennes, France");
        assert_eq!(adapter.qualified("Sumène, Cévennes, France"), "Sumène, Cévennes, France");
        assert_eq!(adapter.qualified("30440 Sumène, France"), "30440 Sumène, France");
    }
}

//! Place-name geocoding through an ordered chain of providers.

use crate::cache::TtlCache;
use crate::config::{Config, GeocoderConfig, GeocoderKind};
use crate::error::{AppError, Result};
use crate::fetcher::{build_url, Fetcher};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

/// A resolved coordinate pair. Construction validates the ranges, so a
/// `GeoPoint` in hand is always on the globe.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GeoPoint {
    latitude: f64,
    longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Option<Self> {
        let valid = latitude.is_finite()
            && longitude.is_finite()
            && (-90.0..=90.0).contains(&latitude)
            && (-180.0..=180.0).contains(&longitude);

        valid.then_some(Self {
            latitude,
            longitude,
        })
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    /// Stable key for caching lookups at this point (~11 m resolution).
    pub fn cache_key(&self) -> String {
        format!("{:.4},{:.4}", self.latitude, self.longitude)
    }
}

impl std::fmt::Display for GeoPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.4}, {:.4}", self.latitude, self.longitude)
    }
}

/// A geocoding provider. `Ok(None)` means the provider answered but knows no
/// such place; errors cover network, status and decoding failures.
#[async_trait]
pub trait Geocoder: Send + Sync {
    fn name(&self) -> &str;

    async fn lookup(&self, place: &str) -> Result<Option<GeoPoint>>;
}

// --- Open-Meteo geocoding ---

#[derive(Debug, Deserialize)]
struct OpenMeteoSearchResponse {
    #[serde(default)]
    results: Option<Vec<OpenMeteoPlace>>,
}

#[derive(Debug, Deserialize)]
struct OpenMeteoPlace {
    latitude: f64,
    longitude: f64,
}

pub struct OpenMeteoGeocoder {
    fetcher: Fetcher,
    base_url: String,
}

impl OpenMeteoGeocoder {
    pub fn new(fetcher: Fetcher, base_url: &str) -> Self {
        Self {
            fetcher,
            base_url: base_url.to_string(),
        }
    }
}

#[async_trait]
impl Geocoder for OpenMeteoGeocoder {
    fn name(&self) -> &str {
        "open-meteo"
    }

    async fn lookup(&self, place: &str) -> Result<Option<GeoPoint>> {
        let url = build_url(&self.base_url, &[("name", place), ("count", "1")])?;
        let response: OpenMeteoSearchResponse = self.fetcher.get_json(url).await?;

        Ok(response
            .results
            .unwrap_or_default()
            .into_iter()
            .next()
            .and_then(|p| GeoPoint::new(p.latitude, p.longitude)))
    }
}

// --- Nominatim (OpenStreetMap) search ---

#[derive(Debug, Deserialize)]
struct NominatimPlace {
    lat: String,
    lon: String,
}

pub struct NominatimGeocoder {
    fetcher: Fetcher,
    base_url: String,
}

impl NominatimGeocoder {
    pub fn new(fetcher: Fetcher, base_url: &str) -> Self {
        Self {
            fetcher,
            base_url: base_url.to_string(),
        }
    }
}

#[async_trait]
impl Geocoder for NominatimGeocoder {
    fn name(&self) -> &str {
        "nominatim"
    }

    async fn lookup(&self, place: &str) -> Result<Option<GeoPoint>> {
        let url = build_url(
            &self.base_url,
            &[("q", place), ("format", "json"), ("limit", "1")],
        )?;
        let places: Vec<NominatimPlace> = self.fetcher.get_json(url).await?;

        let Some(first) = places.into_iter().next() else {
            return Ok(None);
        };

        let lat = first
            .lat
            .trim()
            .parse::<f64>()
            .map_err(|e| AppError::Parse(format!("Invalid latitude '{}': {}", first.lat, e)))?;
        let lon = first
            .lon
            .trim()
            .parse::<f64>()
            .map_err(|e| AppError::Parse(format!("Invalid longitude '{}': {}", first.lon, e)))?;

        Ok(GeoPoint::new(lat, lon))
    }
}

/// Geocoders tried in order until one yields a point.
pub struct GeocoderChain {
    geocoders: Vec<Box<dyn Geocoder>>,
    cache: TtlCache<String, GeoPoint>,
}

impl GeocoderChain {
    pub fn new(geocoders: Vec<Box<dyn Geocoder>>, ttl: Duration) -> Self {
        Self {
            geocoders,
            cache: TtlCache::new(ttl),
        }
    }

    pub fn from_config(config: &Config, fetcher: &Fetcher) -> Self {
        let geocoders = config
            .providers
            .geocoding
            .iter()
            .map(|g| build_geocoder(g, fetcher.clone()))
            .collect();

        Self {
            geocoders,
            cache: TtlCache::with_capacity(
                Duration::from_secs(config.cache.geocode_ttl_seconds),
                config.cache.max_entries,
            ),
        }
    }

    pub fn len(&self) -> usize {
        self.geocoders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.geocoders.is_empty()
    }

    /// Resolve a free-text place name.
    ///
    /// Provider failures are logged and treated as "no result"; the only error
    /// returned is `AppError::ResolutionFailure` once every provider is exhausted.
    pub async fn resolve_location(&self, city_name: &str) -> Result<GeoPoint> {
        let place = city_name.trim();
        if place.is_empty() {
            return Err(AppError::ResolutionFailure(
                "empty place name".to_string(),
            ));
        }

        let key = place.to_lowercase();
        if let Some(point) = self.cache.get(&key).await {
            return Ok(point);
        }

        for geocoder in &self.geocoders {
            match geocoder.lookup(place).await {
                Ok(Some(point)) => {
                    info!("Resolved '{}' to {} via {}", place, point, geocoder.name());
                    self.cache.insert(key, point).await;
                    return Ok(point);
                }
                Ok(None) => {
                    debug!("{} returned no result for '{}'", geocoder.name(), place);
                }
                Err(e) => {
                    warn!("{} lookup for '{}' failed: {}", geocoder.name(), place, e);
                }
            }
        }

        Err(AppError::ResolutionFailure(place.to_string()))
    }
}

fn build_geocoder(config: &GeocoderConfig, fetcher: Fetcher) -> Box<dyn Geocoder> {
    match config.kind {
        GeocoderKind::OpenMeteo => Box::new(OpenMeteoGeocoder::new(fetcher, &config.base_url)),
        GeocoderKind::Nominatim => Box::new(NominatimGeocoder::new(fetcher, &config.base_url)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct FixedGeocoder {
        answer: std::result::Result<Option<(f64, f64)>, ()>,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Geocoder for FixedGeocoder {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn lookup(&self, _place: &str) -> Result<Option<GeoPoint>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.answer {
                Ok(Some((lat, lon))) => Ok(GeoPoint::new(lat, lon)),
                Ok(None) => Ok(None),
                Err(()) => Err(AppError::ProviderUnavailable("down".to_string())),
            }
        }
    }

    fn fixed(
        answer: std::result::Result<Option<(f64, f64)>, ()>,
    ) -> (Box<dyn Geocoder>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Box::new(FixedGeocoder {
                answer,
                calls: calls.clone(),
            }),
            calls,
        )
    }

    #[test]
    fn test_geopoint_rejects_out_of_range() {
        assert!(GeoPoint::new(91.0, 0.0).is_none());
        assert!(GeoPoint::new(0.0, -180.5).is_none());
        assert!(GeoPoint::new(f64::NAN, 0.0).is_none());
        assert!(GeoPoint::new(-90.0, 180.0).is_some());
    }

    #[test]
    fn test_geopoint_cache_key() {
        let point = GeoPoint::new(9.91923, 78.11951).unwrap();
        assert_eq!(point.cache_key(), "9.9192,78.1195");
        assert_eq!(point.to_string(), "9.9192, 78.1195");
    }

    #[tokio::test]
    async fn test_chain_falls_through_to_second_provider() {
        let (first, first_calls) = fixed(Err(()));
        let (second, second_calls) = fixed(Ok(Some((9.92, 78.12))));
        let chain = GeocoderChain::new(vec![first, second], Duration::from_secs(60));

        let point = chain.resolve_location("Madurai").await.unwrap();
        assert_eq!(point.latitude(), 9.92);
        assert_eq!(first_calls.load(Ordering::SeqCst), 1);
        assert_eq!(second_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_chain_stops_at_first_hit() {
        let (first, _) = fixed(Ok(Some((1.0, 2.0))));
        let (second, second_calls) = fixed(Ok(Some((3.0, 4.0))));
        let chain = GeocoderChain::new(vec![first, second], Duration::from_secs(60));

        let point = chain.resolve_location("Anywhere").await.unwrap();
        assert_eq!(point.longitude(), 2.0);
        assert_eq!(second_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_chain_exhausted_is_resolution_failure() {
        let (first, _) = fixed(Ok(None));
        let (second, _) = fixed(Err(()));
        let chain = GeocoderChain::new(vec![first, second], Duration::from_secs(60));

        let result = chain.resolve_location("xqzzv").await;
        assert!(matches!(result, Err(AppError::ResolutionFailure(_))));
    }

    #[tokio::test]
    async fn test_blank_name_skips_providers() {
        let (first, calls) = fixed(Ok(Some((1.0, 2.0))));
        let chain = GeocoderChain::new(vec![first], Duration::from_secs(60));

        let result = chain.resolve_location("   ").await;
        assert!(matches!(result, Err(AppError::ResolutionFailure(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cached_lookup_is_case_insensitive() {
        let (first, calls) = fixed(Ok(Some((1.0, 2.0))));
        let chain = GeocoderChain::new(vec![first], Duration::from_secs(60));

        chain.resolve_location("Madurai").await.unwrap();
        chain.resolve_location(" madurai ").await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}

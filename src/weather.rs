//! Forecast and current-conditions clients.
//!
//! Open-Meteo supplies current conditions, the hourly series and the daily
//! outlook for a coordinate pair. wttr.in is the fallback for current
//! conditions by place name when the forecast provider comes back empty.

use crate::cache::TtlCache;
use crate::config::Config;
use crate::error::{AppError, Result};
use crate::fetcher::{build_url, Fetcher};
use crate::geo::GeoPoint;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// Hourly samples kept from the end of the provider's window.
pub const HOURLY_WINDOW: usize = 24;
/// Daily rows kept from the start of the provider's window.
pub const DAILY_WINDOW: usize = 7;

const HOURLY_FIELDS: &str = "temperature_2m,relativehumidity_2m";
const DAILY_FIELDS: &str = "temperature_2m_max,temperature_2m_min,precipitation_sum,uv_index_max";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailySummary {
    pub date: NaiveDate,
    pub max_temp: Option<f64>,
    pub min_temp: Option<f64>,
    pub precipitation: Option<f64>,
    pub uv_index: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WeatherSnapshot {
    pub temperature_c: Option<f64>,
    pub windspeed_kmh: Option<f64>,
    pub humidity_pct: Option<f64>,
    /// Chronological, at most `HOURLY_WINDOW` samples.
    pub hourly_temperatures: Vec<Option<f64>>,
    pub hourly_humidity: Vec<Option<f64>>,
    pub daily_summary: Vec<DailySummary>,
}

impl WeatherSnapshot {
    pub fn has_current_conditions(&self) -> bool {
        self.temperature_c.is_some() || self.windspeed_kmh.is_some()
    }

    /// Overlay fallback current conditions onto this snapshot.
    ///
    /// The fallback humidity reading becomes a single-sample humidity series
    /// when the forecast provided none.
    pub fn apply_current(&mut self, current: &CurrentConditions) {
        self.temperature_c = current.temperature_c;
        self.windspeed_kmh = current.windspeed_kmh;
        self.humidity_pct = current.humidity_pct;
        if self.hourly_humidity.iter().all(Option::is_none) {
            self.hourly_humidity = vec![current.humidity_pct];
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CurrentConditions {
    pub temperature_c: Option<f64>,
    pub windspeed_kmh: Option<f64>,
    pub humidity_pct: Option<f64>,
}

// --- Open-Meteo forecast JSON ---

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    current_weather: Option<CurrentWeatherBlock>,
    hourly: Option<HourlyBlock>,
    daily: Option<DailyBlock>,
}

#[derive(Debug, Deserialize)]
struct CurrentWeatherBlock {
    temperature: Option<f64>,
    windspeed: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct HourlyBlock {
    #[serde(default)]
    temperature_2m: Vec<Option<f64>>,
    #[serde(default)]
    relativehumidity_2m: Vec<Option<f64>>,
}

#[derive(Debug, Deserialize)]
struct DailyBlock {
    #[serde(default)]
    time: Vec<String>,
    #[serde(default)]
    temperature_2m_max: Vec<Option<f64>>,
    #[serde(default)]
    temperature_2m_min: Vec<Option<f64>>,
    #[serde(default)]
    precipitation_sum: Vec<Option<f64>>,
    #[serde(default)]
    uv_index_max: Vec<Option<f64>>,
}

// --- wttr.in JSON (format=j1) ---

#[derive(Debug, Deserialize)]
struct WttrResponse {
    #[serde(default)]
    current_condition: Vec<HashMap<String, serde_json::Value>>,
}

pub struct WeatherClient {
    fetcher: Fetcher,
    forecast_url: String,
    wttr_url: String,
    forecast_cache: TtlCache<String, WeatherSnapshot>,
    current_cache: TtlCache<String, CurrentConditions>,
}

impl WeatherClient {
    pub fn new(fetcher: Fetcher, forecast_url: &str, wttr_url: &str, ttl: Duration) -> Self {
        Self {
            fetcher,
            forecast_url: forecast_url.to_string(),
            wttr_url: wttr_url.trim_end_matches('/').to_string(),
            forecast_cache: TtlCache::new(ttl),
            current_cache: TtlCache::new(ttl),
        }
    }

    pub fn from_config(config: &Config, fetcher: &Fetcher) -> Self {
        let ttl = Duration::from_secs(config.cache.weather_ttl_seconds);
        let capacity = config.cache.max_entries;
        Self {
            forecast_cache: TtlCache::with_capacity(ttl, capacity),
            current_cache: TtlCache::with_capacity(ttl, capacity),
            ..Self::new(
                fetcher.clone(),
                &config.providers.forecast_url,
                &config.providers.wttr_url,
                ttl,
            )
        }
    }

    /// Fetch current conditions, the trailing hourly window and the daily
    /// outlook for `point`. Any failure yields `AppError::ProviderUnavailable`.
    pub async fn fetch_weather(&self, point: &GeoPoint) -> Result<WeatherSnapshot> {
        let key = point.cache_key();
        if let Some(snapshot) = self.forecast_cache.get(&key).await {
            return Ok(snapshot);
        }

        let snapshot = self.fetch_forecast(point).await.map_err(|e| {
            warn!("Forecast lookup for {} failed: {}", point, e);
            AppError::ProviderUnavailable(format!("forecast: {}", e))
        })?;

        info!(
            "Forecast for {}: {} hourly samples, {} daily rows",
            point,
            snapshot.hourly_temperatures.len(),
            snapshot.daily_summary.len()
        );
        self.forecast_cache.insert(key, snapshot.clone()).await;
        Ok(snapshot)
    }

    /// Current conditions by place name from the fallback provider.
    pub async fn fetch_current_by_name(&self, city_name: &str) -> Result<CurrentConditions> {
        let key = city_name.trim().to_lowercase();
        if let Some(current) = self.current_cache.get(&key).await {
            return Ok(current);
        }

        let current = self.fetch_wttr(city_name.trim()).await.map_err(|e| {
            warn!("Fallback conditions lookup for '{}' failed: {}", city_name, e);
            AppError::ProviderUnavailable(format!("wttr: {}", e))
        })?;

        self.current_cache.insert(key, current.clone()).await;
        Ok(current)
    }

    async fn fetch_forecast(&self, point: &GeoPoint) -> Result<WeatherSnapshot> {
        let latitude = point.latitude().to_string();
        let longitude = point.longitude().to_string();
        let url = build_url(
            &self.forecast_url,
            &[
                ("latitude", latitude.as_str()),
                ("longitude", longitude.as_str()),
                ("hourly", HOURLY_FIELDS),
                ("daily", DAILY_FIELDS),
                ("current_weather", "true"),
                ("timezone", "auto"),
            ],
        )?;

        let response: ForecastResponse = self.fetcher.get_json(url).await?;
        Ok(snapshot_from_forecast(response))
    }

    async fn fetch_wttr(&self, city_name: &str) -> Result<CurrentConditions> {
        if city_name.is_empty() {
            return Err(AppError::InvalidData("empty place name".to_string()));
        }

        let mut url = Url::parse(&self.wttr_url)
            .map_err(|e| AppError::InvalidData(format!("Invalid wttr URL '{}': {}", self.wttr_url, e)))?;
        url.path_segments_mut()
            .map_err(|_| AppError::InvalidData(format!("wttr URL '{}' cannot take a path", self.wttr_url)))?
            .pop_if_empty()
            .push(city_name);
        url.query_pairs_mut().append_pair("format", "j1");

        let response: WttrResponse = self.fetcher.get_json(url).await?;
        let condition = response
            .current_condition
            .into_iter()
            .next()
            .unwrap_or_default();

        let current = CurrentConditions {
            temperature_c: condition.get("temp_C").and_then(safe_float),
            windspeed_kmh: condition.get("windspeedKmph").and_then(safe_float),
            humidity_pct: condition.get("humidity").and_then(safe_float),
        };
        debug!("wttr conditions for '{}': {:?}", city_name, current);
        Ok(current)
    }
}

fn snapshot_from_forecast(response: ForecastResponse) -> WeatherSnapshot {
    let (temperature_c, windspeed_kmh) = match response.current_weather {
        Some(cw) => (
            cw.temperature.filter(|v| v.is_finite()),
            cw.windspeed.filter(|v| v.is_finite()),
        ),
        None => (None, None),
    };

    let (hourly_temperatures, hourly_humidity) = match response.hourly {
        Some(hourly) => (
            last_n(&hourly.temperature_2m, HOURLY_WINDOW),
            last_n(&hourly.relativehumidity_2m, HOURLY_WINDOW),
        ),
        None => (Vec::new(), Vec::new()),
    };

    let daily_summary = response.daily.map(daily_rows).unwrap_or_default();

    WeatherSnapshot {
        temperature_c,
        windspeed_kmh,
        humidity_pct: None,
        hourly_temperatures,
        hourly_humidity,
        daily_summary,
    }
}

fn daily_rows(daily: DailyBlock) -> Vec<DailySummary> {
    let at = |series: &[Option<f64>], i: usize| series.get(i).copied().flatten();

    daily
        .time
        .iter()
        .enumerate()
        .filter_map(|(i, day)| match NaiveDate::parse_from_str(day, "%Y-%m-%d") {
            Ok(date) => Some(DailySummary {
                date,
                max_temp: at(&daily.temperature_2m_max, i),
                min_temp: at(&daily.temperature_2m_min, i),
                precipitation: at(&daily.precipitation_sum, i),
                uv_index: at(&daily.uv_index_max, i),
            }),
            Err(e) => {
                warn!("Skipping daily row with invalid date '{}': {}", day, e);
                None
            }
        })
        .take(DAILY_WINDOW)
        .collect()
}

fn last_n<T: Clone>(series: &[T], n: usize) -> Vec<T> {
    series[series.len().saturating_sub(n)..].to_vec()
}

/// Lenient numeric reading: accepts numbers and numeric strings, treating
/// null, empty, "nan" and garbage as absent.
fn safe_float(value: &serde_json::Value) -> Option<f64> {
    let parsed = match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => {
            let s = s.trim();
            if s.is_empty() || s.eq_ignore_ascii_case("nan") {
                None
            } else {
                s.parse::<f64>().ok()
            }
        }
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_safe_float() {
        assert_eq!(safe_float(&json!("31")), Some(31.0));
        assert_eq!(safe_float(&json!(" 12.5 ")), Some(12.5));
        assert_eq!(safe_float(&json!(7)), Some(7.0));
        assert_eq!(safe_float(&json!("")), None);
        assert_eq!(safe_float(&json!("NaN")), None);
        assert_eq!(safe_float(&json!("windy")), None);
        assert_eq!(safe_float(&serde_json::Value::Null), None);
    }

    #[test]
    fn test_last_n_keeps_trailing_samples() {
        let series: Vec<i32> = (0..30).collect();
        assert_eq!(last_n(&series, 24), (6..30).collect::<Vec<_>>());
        assert_eq!(last_n(&series[..3], 24), vec![0, 1, 2]);
    }

    #[test]
    fn test_snapshot_from_partial_forecast() {
        let response: ForecastResponse = serde_json::from_value(json!({
            "hourly": {
                "temperature_2m": [20.0, null, 22.0]
            },
            "daily": {
                "time": ["2024-06-01", "not-a-date", "2024-06-03"],
                "temperature_2m_max": [31.0, 32.0],
                "precipitation_sum": [null, 1.0, 2.5]
            }
        }))
        .unwrap();

        let snapshot = snapshot_from_forecast(response);
        assert!(!snapshot.has_current_conditions());
        assert_eq!(snapshot.hourly_temperatures, vec![Some(20.0), None, Some(22.0)]);
        assert!(snapshot.hourly_humidity.is_empty());
        assert_eq!(snapshot.daily_summary.len(), 2);
        assert_eq!(snapshot.daily_summary[0].max_temp, Some(31.0));
        assert_eq!(snapshot.daily_summary[0].precipitation, None);
        assert_eq!(snapshot.daily_summary[1].date.to_string(), "2024-06-03");
        assert_eq!(snapshot.daily_summary[1].max_temp, None);
        assert_eq!(snapshot.daily_summary[1].precipitation, Some(2.5));
    }

    #[test]
    fn test_daily_rows_capped_at_seven() {
        let times: Vec<String> = (1..=10).map(|d| format!("2024-06-{:02}", d)).collect();
        let response: ForecastResponse = serde_json::from_value(json!({
            "current_weather": { "temperature": 30.5, "windspeed": 4.0 },
            "daily": { "time": times }
        }))
        .unwrap();

        let snapshot = snapshot_from_forecast(response);
        assert!(snapshot.has_current_conditions());
        assert_eq!(snapshot.daily_summary.len(), DAILY_WINDOW);
    }

    #[test]
    fn test_apply_current_fills_humidity_series() {
        let mut snapshot = WeatherSnapshot::default();
        snapshot.apply_current(&CurrentConditions {
            temperature_c: Some(29.0),
            windspeed_kmh: Some(5.0),
            humidity_pct: Some(80.0),
        });
        assert_eq!(snapshot.temperature_c, Some(29.0));
        assert_eq!(snapshot.hourly_humidity, vec![Some(80.0)]);
    }
}

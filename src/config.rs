use crate::error::{AppError, Result};
use serde::{Deserialize, Deserializer};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_OPEN_METEO_GEOCODING_URL: &str = "https://geocoding-api.open-meteo.com/v1/search";
pub const DEFAULT_NOMINATIM_URL: &str = "https://nominatim.openstreetmap.org/search";
pub const DEFAULT_FORECAST_URL: &str = "https://api.open-meteo.com/v1/forecast";
pub const DEFAULT_WTTR_URL: &str = "https://wttr.in";

/// Outbound calls must time out within this window (seconds).
const MIN_TIMEOUT_SECONDS: u64 = 8;
const MAX_TIMEOUT_SECONDS: u64 = 12;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub defaults: DefaultsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct HttpConfig {
    #[serde(
        default = "default_timeout_seconds",
        deserialize_with = "deserialize_seconds"
    )]
    pub timeout_seconds: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_timeout_seconds(),
            user_agent: default_user_agent(),
        }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

fn default_timeout_seconds() -> u64 {
    10
}

fn default_user_agent() -> String {
    "aerosyn/0.1.0".to_string()
}

/// Custom deserializer that handles a duration in seconds as both number and string
///
/// Accepts:
/// - `timeout_seconds: 10` (number)
/// - `timeout_seconds: "10"` (string that parses to number)
/// - `timeout_seconds: ${HTTP_TIMEOUT}` (env var substituted to either)
fn deserialize_seconds<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum SecondsValue {
        Number(u64),
        String(String),
    }

    match SecondsValue::deserialize(deserializer)? {
        SecondsValue::Number(n) => Ok(n),
        SecondsValue::String(s) => s
            .trim()
            .parse::<u64>()
            .map_err(|_| serde::de::Error::custom(format!("Invalid number of seconds: '{}'", s))),
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GeocoderKind {
    OpenMeteo,
    Nominatim,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GeocoderConfig {
    pub kind: GeocoderKind,
    pub base_url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProvidersConfig {
    /// Geocoders in the order they are tried.
    #[serde(default = "default_geocoders")]
    pub geocoding: Vec<GeocoderConfig>,
    #[serde(default = "default_forecast_url")]
    pub forecast_url: String,
    #[serde(default = "default_wttr_url")]
    pub wttr_url: String,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            geocoding: default_geocoders(),
            forecast_url: default_forecast_url(),
            wttr_url: default_wttr_url(),
        }
    }
}

fn default_geocoders() -> Vec<GeocoderConfig> {
    vec![
        GeocoderConfig {
            kind: GeocoderKind::OpenMeteo,
            base_url: DEFAULT_OPEN_METEO_GEOCODING_URL.to_string(),
        },
        GeocoderConfig {
            kind: GeocoderKind::Nominatim,
            base_url: DEFAULT_NOMINATIM_URL.to_string(),
        },
    ]
}

fn default_forecast_url() -> String {
    DEFAULT_FORECAST_URL.to_string()
}

fn default_wttr_url() -> String {
    DEFAULT_WTTR_URL.to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    #[serde(default = "default_geocode_ttl")]
    pub geocode_ttl_seconds: u64,
    #[serde(default = "default_weather_ttl")]
    pub weather_ttl_seconds: u64,
    /// Entries kept per cache before the least recently used is evicted.
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            geocode_ttl_seconds: default_geocode_ttl(),
            weather_ttl_seconds: default_weather_ttl(),
            max_entries: default_max_entries(),
        }
    }
}

fn default_geocode_ttl() -> u64 {
    900
}

fn default_weather_ttl() -> u64 {
    600
}

fn default_max_entries() -> usize {
    crate::cache::DEFAULT_CAPACITY
}

#[derive(Debug, Deserialize, Clone)]
pub struct DefaultsConfig {
    #[serde(default = "default_city")]
    pub city: String,
    #[serde(default = "default_crop")]
    pub crop: String,
    #[serde(default = "default_show_forecast")]
    pub show_forecast: bool,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            city: default_city(),
            crop: default_crop(),
            show_forecast: default_show_forecast(),
        }
    }
}

fn default_city() -> String {
    "Madurai".to_string()
}

fn default_crop() -> String {
    "Paddy (Rice)".to_string()
}

fn default_show_forecast() -> bool {
    true
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| AppError::Config(format!("Failed to read config file: {}", e)))?;

        Self::from_yaml_str(&content)
    }

    /// Parse configuration text, substituting `${VAR}` references first.
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let expanded = expand_env_vars(content)?;

        let config: Config = if expanded.trim().is_empty() {
            Config::default()
        } else {
            serde_yaml::from_str(&expanded)
                .map_err(|e| AppError::Config(format!("Failed to parse config: {}", e)))?
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    ///
    /// Checks for:
    /// - Timeout within the allowed window
    /// - Non-empty user agent
    /// - At least one geocoder
    /// - Valid HTTPS provider URLs
    /// - A non-zero cache capacity
    pub fn validate(&self) -> Result<()> {
        if !(MIN_TIMEOUT_SECONDS..=MAX_TIMEOUT_SECONDS).contains(&self.http.timeout_seconds) {
            return Err(AppError::Config(format!(
                "http.timeout_seconds must be between {} and {}, got {}",
                MIN_TIMEOUT_SECONDS, MAX_TIMEOUT_SECONDS, self.http.timeout_seconds
            )));
        }

        if self.http.user_agent.trim().is_empty() {
            return Err(AppError::Config(
                "http.user_agent cannot be empty".to_string(),
            ));
        }

        if self.providers.geocoding.is_empty() {
            return Err(AppError::Config(
                "At least one geocoding provider must be configured".to_string(),
            ));
        }

        for geocoder in &self.providers.geocoding {
            validate_https_url("providers.geocoding.base_url", &geocoder.base_url)?;
        }
        validate_https_url("providers.forecast_url", &self.providers.forecast_url)?;
        validate_https_url("providers.wttr_url", &self.providers.wttr_url)?;

        if self.cache.geocode_ttl_seconds == 0 || self.cache.weather_ttl_seconds == 0 {
            tracing::warn!("A cache TTL of 0 seconds disables caching for that lookup");
        }

        if self.cache.max_entries == 0 {
            return Err(AppError::Config(
                "cache.max_entries must be at least 1".to_string(),
            ));
        }

        if self.defaults.city.trim().is_empty() {
            return Err(AppError::Config(
                "defaults.city cannot be empty".to_string(),
            ));
        }

        Ok(())
    }
}

fn validate_https_url(field: &str, value: &str) -> Result<()> {
    let parsed = url::Url::parse(value)
        .map_err(|e| AppError::Config(format!("Invalid {} '{}': {}", field, value, e)))?;

    if parsed.scheme() != "https" {
        return Err(AppError::Config(format!(
            "{} must use HTTPS, got: {}",
            field,
            parsed.scheme()
        )));
    }

    Ok(())
}

/// Substitute `${NAME}` references from the process environment.
///
/// Every unset name is collected so a single error lists all of them.
fn expand_env_vars(content: &str) -> Result<String> {
    let pattern = regex_lite::Regex::new(r"\$\{([^}]+)\}")
        .map_err(|e| AppError::Config(format!("Invalid expansion pattern: {}", e)))?;

    let mut unset: Vec<String> = Vec::new();
    let expanded = pattern.replace_all(content, |caps: &regex_lite::Captures<'_>| {
        let name = &caps[1];
        std::env::var(name).unwrap_or_else(|_| {
            if !unset.iter().any(|n| n == name) {
                unset.push(name.to_string());
            }
            String::new()
        })
    });

    if unset.is_empty() {
        return Ok(expanded.into_owned());
    }

    Err(AppError::Config(format!(
        "Unset environment variable(s) referenced in config: {}. \
         Export them or add them to .env (see .env.example).",
        unset.join(", ")
    )))
}

use crate::advisor::{crop_advice, spray_advice, CropAdvice, SprayAdvice};
use crate::config::Config;
use crate::error::Result;
use crate::fetcher::Fetcher;
use crate::geo::{GeoPoint, GeocoderChain};
use crate::heatmap::{heat_points, HeatPoint};
use crate::vari::{analyze_image_bytes, VariBand, VariResult};
use crate::weather::{DailySummary, WeatherClient, WeatherSnapshot};
use serde::Serialize;
use std::fmt;
use tracing::{info, warn};

/// One dashboard run's inputs.
#[derive(Debug, Clone)]
pub struct Request {
    pub city: String,
    pub crop: String,
    /// Calendar month, 1-12.
    pub month: u32,
    pub show_forecast: bool,
    /// Encoded PNG/JPEG field photo.
    pub image: Option<Vec<u8>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Success,
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    fn new(level: NoticeLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Report {
    pub city: String,
    pub location: Option<GeoPoint>,
    pub weather: WeatherSnapshot,
    pub show_forecast: bool,
    pub crop_advice: CropAdvice,
    pub spray_advice: SprayAdvice,
    pub heat_points: Vec<HeatPoint>,
    pub vari: Option<VariResult>,
    pub notices: Vec<Notice>,
}

impl Report {
    /// Daily rows to display; empty when the forecast is toggled off.
    pub fn forecast(&self) -> &[DailySummary] {
        if self.show_forecast {
            &self.weather.daily_summary
        } else {
            &[]
        }
    }

    pub fn has_notice(&self, level: NoticeLevel, fragment: &str) -> bool {
        self.notices
            .iter()
            .any(|n| n.level == level && n.message.contains(fragment))
    }
}

pub struct Dashboard {
    geocoders: GeocoderChain,
    weather: WeatherClient,
}

impl Dashboard {
    pub fn new(geocoders: GeocoderChain, weather: WeatherClient) -> Self {
        Self { geocoders, weather }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let fetcher = Fetcher::new(&config.http)?;
        Ok(Self::new(
            GeocoderChain::from_config(config, &fetcher),
            WeatherClient::from_config(config, &fetcher),
        ))
    }

    /// Run the full pipeline for one request. Every provider or analysis
    /// failure is folded into the report as a notice.
    pub async fn run(&self, request: &Request) -> Report {
        info!(
            "Dashboard run: city='{}', crop='{}', month={}",
            request.city, request.crop, request.month
        );
        let mut notices = Vec::new();

        let location = match self.geocoders.resolve_location(&request.city).await {
            Ok(point) => Some(point),
            Err(e) => {
                warn!("{}", e);
                notices.push(Notice::new(
                    NoticeLevel::Error,
                    "Invalid city - try correcting spelling.",
                ));
                None
            }
        };

        let weather = match &location {
            Some(point) => self.gather_weather(&request.city, point, &mut notices).await,
            None => WeatherSnapshot::default(),
        };

        let crop_advice = crop_advice(
            &request.crop,
            request.month,
            &weather.hourly_temperatures,
            &weather.hourly_humidity,
        );
        if crop_advice.in_season {
            notices.push(Notice::new(
                NoticeLevel::Success,
                format!("{} can be planted now.", crop_advice.crop),
            ));
        } else {
            notices.push(Notice::new(
                NoticeLevel::Warning,
                format!("Not ideal time for {}.", crop_advice.crop),
            ));
        }

        let spray_advice = spray_advice(weather.temperature_c, weather.windspeed_kmh);

        // Synthetic samples stand in for missing hourly data, so only an
        // unresolved location leaves the heatmap empty.
        let heat_points = match &location {
            Some(point) => scatter_heat_points(point, &weather),
            None => {
                notices.push(Notice::new(NoticeLevel::Info, "Heatmap data unavailable."));
                Vec::new()
            }
        };

        if request.show_forecast && weather.daily_summary.is_empty() {
            notices.push(Notice::new(NoticeLevel::Info, "Forecast not available."));
        }

        let vari = request
            .image
            .as_deref()
            .and_then(|bytes| match analyze_image_bytes(bytes) {
                Ok(result) => {
                    info!(
                        "Field VARI {:.4} ({}) from {} pixels",
                        result.average, result.classification, result.valid_pixels
                    );
                    Some(result)
                }
                Err(e) => {
                    warn!("Field image analysis failed: {}", e);
                    notices.push(Notice::new(
                        NoticeLevel::Warning,
                        format!("Could not analyze field image: {}", e),
                    ));
                    None
                }
            });

        Report {
            city: request.city.trim().to_string(),
            location,
            weather,
            show_forecast: request.show_forecast,
            crop_advice,
            spray_advice,
            heat_points,
            vari,
            notices,
        }
    }

    async fn gather_weather(
        &self,
        city: &str,
        point: &GeoPoint,
        notices: &mut Vec<Notice>,
    ) -> WeatherSnapshot {
        let mut snapshot = match self.weather.fetch_weather(point).await {
            Ok(snapshot) if snapshot.has_current_conditions() => return snapshot,
            Ok(snapshot) => snapshot,
            Err(_) => WeatherSnapshot::default(),
        };

        info!("Falling back to current conditions by name for '{}'", city);
        match self.weather.fetch_current_by_name(city).await {
            Ok(current) => snapshot.apply_current(&current),
            Err(_) => notices.push(Notice::new(
                NoticeLevel::Warning,
                "Current weather unavailable.",
            )),
        }
        snapshot
    }
}

fn scatter_heat_points(point: &GeoPoint, weather: &WeatherSnapshot) -> Vec<HeatPoint> {
    let mut rng = rand::thread_rng();
    heat_points(
        point,
        &weather.hourly_temperatures,
        weather.temperature_c,
        &mut rng,
    )
}

fn fmt_opt(value: Option<f64>) -> String {
    value
        .map(|v| format!("{:.1}", v))
        .unwrap_or_else(|| "N/A".to_string())
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "== AeroSyn - Precision Agronomy ==")?;
        match &self.location {
            Some(point) => writeln!(f, "Location: {} ({})", self.city, point)?,
            None => writeln!(f, "Location: {} (N/A)", self.city)?,
        }
        writeln!(f, "Temperature (°C): {}", fmt_opt(self.weather.temperature_c))?;
        writeln!(f, "Wind Speed (km/h): {}", fmt_opt(self.weather.windspeed_kmh))?;
        if !self.heat_points.is_empty() {
            writeln!(f, "Heat points: {}", self.heat_points.len())?;
        }

        if self.show_forecast && !self.forecast().is_empty() {
            writeln!(f)?;
            writeln!(f, "7-Day Forecast")?;
            writeln!(
                f,
                "{:<12} {:>13} {:>13} {:>18} {:>8}",
                "Date", "Max Temp (°C)", "Min Temp (°C)", "Precipitation (mm)", "UV Index"
            )?;
            for day in self.forecast() {
                writeln!(
                    f,
                    "{:<12} {:>13} {:>13} {:>18} {:>8}",
                    day.date.to_string(),
                    fmt_opt(day.max_temp),
                    fmt_opt(day.min_temp),
                    fmt_opt(day.precipitation),
                    fmt_opt(day.uv_index)
                )?;
            }
        }

        writeln!(f)?;
        writeln!(f, "Agronomy: {}", self.crop_advice.crop)?;
        writeln!(f, "  Season: {}", self.crop_advice.season_message)?;
        writeln!(f, "  Fertilizer: {}", self.crop_advice.fertilizer_plan)?;
        writeln!(f, "  Pest Risk: {}", self.crop_advice.pest_risk_message)?;
        writeln!(f, "  Spraying: {}", self.spray_advice)?;

        if let Some(vari) = &self.vari {
            writeln!(f)?;
            writeln!(f, "Field Health (VARI)")?;
            writeln!(
                f,
                "  Average: {:.4} ({}) - {}",
                vari.average,
                vari.classification,
                vari.classification.description()
            )?;
            let fractions = vari.per_pixel_map.band_fractions();
            for (band, share) in VariBand::ALL.iter().zip(fractions) {
                writeln!(f, "  {:<9} {:>5.1}%", format!("{:?}", band), share * 100.0)?;
            }
        }

        if !self.notices.is_empty() {
            writeln!(f)?;
            for notice in &self.notices {
                let tag = match notice.level {
                    NoticeLevel::Success => "ok",
                    NoticeLevel::Info => "info",
                    NoticeLevel::Warning => "warn",
                    NoticeLevel::Error => "error",
                };
                writeln!(f, "[{}] {}", tag, notice.message)?;
            }
        }

        Ok(())
    }
}

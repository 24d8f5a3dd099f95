//! Rule-based agronomy advice.
//!
//! Each crop owns one `CropRule` record in `CROP_RULES`. Free-text crop names
//! are matched against the table in declaration order, so "Paddy (Rice)"
//! resolves to rice before any later rule is considered.

use serde::Serialize;
use std::fmt;

/// Samples considered by the pest model, counted from the newest.
pub const PEST_WINDOW: usize = 24;
/// Relative humidity (%) above which an hour counts as humid.
pub const HUMID_HOUR_THRESHOLD: f64 = 90.0;

pub const SPRAY_MAX_WIND_KMH: f64 = 8.0;
pub const SPRAY_MIN_TEMP_C: f64 = 18.0;
pub const SPRAY_MAX_TEMP_C: f64 = 35.0;

pub const LOW_PEST_RISK: &str = "Low pest risk now.";
pub const INSUFFICIENT_PEST_DATA: &str = "Not enough data for pest risk.";
pub const UNKNOWN_CROP_SEASON: &str = "Unknown crop - check local extension services.";
pub const DEFAULT_FERTILIZER: &str = "Follow soil test recommendations.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Crop {
    Rice,
    Wheat,
    Cotton,
    Tomato,
    Sugarcane,
    Other,
}

impl Crop {
    pub const ALL: [Crop; 6] = [
        Crop::Rice,
        Crop::Wheat,
        Crop::Cotton,
        Crop::Tomato,
        Crop::Sugarcane,
        Crop::Other,
    ];

    /// Case-insensitive substring match against the rule table. The first
    /// matching rule wins.
    pub fn from_name(name: &str) -> Crop {
        matching_rules(name)
            .next()
            .map(|rule| rule.crop)
            .unwrap_or(Crop::Other)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Crop::Rice => "Paddy (Rice)",
            Crop::Wheat => "Wheat",
            Crop::Cotton => "Cotton",
            Crop::Tomato => "Tomato",
            Crop::Sugarcane => "Sugarcane",
            Crop::Other => "Other",
        }
    }

    fn rule(&self) -> Option<&'static CropRule> {
        CROP_RULES.iter().find(|rule| rule.crop == *self)
    }

    pub fn season(&self, month: u32) -> (bool, &'static str) {
        match self.rule() {
            Some(rule) if rule.season.months.contains(&month) => (true, rule.season.in_season),
            Some(rule) => (rule.season.off_season_viable, rule.season.off_season),
            None => (true, UNKNOWN_CROP_SEASON),
        }
    }

    pub fn fertilizer(&self) -> &'static str {
        self.rule()
            .map(|rule| rule.fertilizer)
            .unwrap_or(DEFAULT_FERTILIZER)
    }

    /// Pest risk from this crop's rules alone.
    pub fn pest_risk(&self, temperatures: &[Option<f64>], humidity: &[Option<f64>]) -> String {
        evaluate_pests(self.rule().into_iter(), temperatures, humidity)
    }
}

impl fmt::Display for Crop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

struct SeasonRule {
    months: &'static [u32],
    in_season: &'static str,
    off_season: &'static str,
    /// Rice can still go in outside kharif with irrigation.
    off_season_viable: bool,
}

struct PestRule {
    min_mean_temp: f64,
    min_humid_hours: usize,
    message: &'static str,
}

impl PestRule {
    fn fires(&self, mean_temp: f64, humid_hours: usize) -> bool {
        mean_temp >= self.min_mean_temp && humid_hours >= self.min_humid_hours
    }
}

struct CropRule {
    crop: Crop,
    keywords: &'static [&'static str],
    season: SeasonRule,
    fertilizer: &'static str,
    pests: &'static [PestRule],
}

/// Kharif window is June-August, rabi October-December.
static CROP_RULES: [CropRule; 5] = [
    CropRule {
        crop: Crop::Rice,
        keywords: &["paddy", "rice"],
        season: SeasonRule {
            months: &[6, 7, 8],
            in_season: "Kharif season - ideal for rice.",
            off_season: "Secondary Rabi rice possible with irrigation.",
            off_season_viable: true,
        },
        fertilizer: "NPK 75:30:30 kg/ha - split top dressings required.",
        pests: &[
            PestRule {
                min_mean_temp: 24.0,
                min_humid_hours: 8,
                message: "High blast risk - monitor neck/leaf spots and keep fungicide ready.",
            },
            PestRule {
                min_mean_temp: 30.0,
                min_humid_hours: 0,
                message: "Heat stress - watch for brown planthopper at the base of tillers.",
            },
        ],
    },
    CropRule {
        crop: Crop::Wheat,
        keywords: &["wheat"],
        season: SeasonRule {
            months: &[10, 11, 12],
            in_season: "Perfect Rabi season - go for wheat now.",
            off_season: "Not ideal time for wheat planting.",
            off_season_viable: false,
        },
        fertilizer: "NPK 100:40:20 kg/ha - ensure nitrogen at tillering.",
        pests: &[],
    },
    CropRule {
        crop: Crop::Cotton,
        keywords: &["cotton"],
        season: SeasonRule {
            months: &[4, 5, 6, 7],
            in_season: "Cotton planting window - good time.",
            off_season: "Not ideal for cotton sowing.",
            off_season_viable: false,
        },
        fertilizer: "NPK + micronutrients - avoid excess nitrogen.",
        pests: &[PestRule {
            min_mean_temp: 34.0,
            min_humid_hours: 0,
            message: "Whitefly risk - monitor foliage daily.",
        }],
    },
    CropRule {
        crop: Crop::Tomato,
        keywords: &["tomato"],
        season: SeasonRule {
            months: &[1, 2, 3, 9, 10, 11],
            in_season: "Good period for tomato cultivation.",
            off_season: "High temperature/humidity risk for disease.",
            off_season_viable: false,
        },
        fertilizer: "NPK 100:60:100 + calcium spray for BER.",
        pests: &[PestRule {
            min_mean_temp: 28.0,
            min_humid_hours: 6,
            message: "Blight risk - avoid overhead irrigation, use fungicide.",
        }],
    },
    CropRule {
        crop: Crop::Sugarcane,
        keywords: &["sugarcane"],
        season: SeasonRule {
            months: &[1, 2, 3, 10, 11],
            in_season: "Right season for sugarcane.",
            off_season: "Not ideal for sugarcane.",
            off_season_viable: false,
        },
        fertilizer: "Split nitrogen + potassium - trench method recommended.",
        pests: &[],
    },
];

fn matching_rules(name: &str) -> impl Iterator<Item = &'static CropRule> {
    let name = name.to_lowercase();
    CROP_RULES
        .iter()
        .filter(move |rule| rule.keywords.iter().any(|k| name.contains(k)))
}

/// Fire the pest rules of every given crop rule, in order, against the
/// trailing window of usable samples.
fn evaluate_pests<'a>(
    rules: impl Iterator<Item = &'a CropRule>,
    temperatures: &[Option<f64>],
    humidity: &[Option<f64>],
) -> String {
    let temps = trailing_usable(temperatures, PEST_WINDOW);
    let hums = trailing_usable(humidity, PEST_WINDOW);
    if temps.is_empty() || hums.is_empty() {
        return INSUFFICIENT_PEST_DATA.to_string();
    }

    let mean_temp = temps.iter().sum::<f64>() / temps.len() as f64;
    let humid_hours = hums.iter().filter(|h| **h > HUMID_HOUR_THRESHOLD).count();

    let messages: Vec<&str> = rules
        .flat_map(|rule| rule.pests.iter())
        .filter(|pest| pest.fires(mean_temp, humid_hours))
        .map(|pest| pest.message)
        .collect();

    if messages.is_empty() {
        LOW_PEST_RISK.to_string()
    } else {
        messages.join(" ")
    }
}

fn trailing_usable(series: &[Option<f64>], window: usize) -> Vec<f64> {
    let usable: Vec<f64> = series
        .iter()
        .flatten()
        .copied()
        .filter(|v| v.is_finite())
        .collect();
    usable[usable.len().saturating_sub(window)..].to_vec()
}

/// Planting-window advice for a free-text crop name and calendar month (1-12).
pub fn season_advice(crop: &str, month: u32) -> (bool, &'static str) {
    Crop::from_name(crop).season(month)
}

pub fn fertilizer_advice(crop: &str) -> &'static str {
    Crop::from_name(crop).fertilizer()
}

pub fn pest_risk_advice(
    crop: &str,
    recent_temperatures: &[Option<f64>],
    recent_humidity: &[Option<f64>],
) -> String {
    evaluate_pests(matching_rules(crop), recent_temperatures, recent_humidity)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CropAdvice {
    pub crop: Crop,
    pub in_season: bool,
    pub season_message: String,
    pub fertilizer_plan: String,
    pub pest_risk_message: String,
}

/// Season and fertilizer follow the first matching crop; pest risk draws on
/// every crop the name mentions.
pub fn crop_advice(
    name: &str,
    month: u32,
    recent_temperatures: &[Option<f64>],
    recent_humidity: &[Option<f64>],
) -> CropAdvice {
    let crop = Crop::from_name(name);
    let (in_season, season_message) = crop.season(month);

    CropAdvice {
        crop,
        in_season,
        season_message: season_message.to_string(),
        fertilizer_plan: crop.fertilizer().to_string(),
        pest_risk_message: pest_risk_advice(name, recent_temperatures, recent_humidity),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SprayAdvice {
    Safe,
    WindTooHigh,
    TemperatureOutOfRange,
    Unavailable,
}

impl SprayAdvice {
    pub fn message(&self) -> &'static str {
        match self {
            SprayAdvice::Safe => "Safe to spray pesticides now.",
            SprayAdvice::WindTooHigh => "Wind too high - avoid spraying.",
            SprayAdvice::TemperatureOutOfRange => "Temperature not ideal for spraying.",
            SprayAdvice::Unavailable => "Spray advice unavailable.",
        }
    }
}

impl fmt::Display for SprayAdvice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// Spray safety from current temperature (°C) and wind speed (km/h).
pub fn spray_advice(temperature_c: Option<f64>, windspeed_kmh: Option<f64>) -> SprayAdvice {
    let temp_ok = |t: f64| (SPRAY_MIN_TEMP_C..=SPRAY_MAX_TEMP_C).contains(&t);

    match (temperature_c, windspeed_kmh) {
        (Some(t), Some(w)) if w < SPRAY_MAX_WIND_KMH && temp_ok(t) => SprayAdvice::Safe,
        (_, Some(w)) if w >= SPRAY_MAX_WIND_KMH => SprayAdvice::WindTooHigh,
        (Some(t), _) if !temp_ok(t) => SprayAdvice::TemperatureOutOfRange,
        _ => SprayAdvice::Unavailable,
    }
}

use aerosyn::config::Config;
use aerosyn::dashboard::{Dashboard, Request};
use aerosyn::vari::{encode_png, render_map};
use chrono::Datelike;
use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "aerosyn", version, about = "Weather, crop advice and field health for a city")]
struct Args {
    /// Path to the YAML configuration file
    #[arg(long, env = "AEROSYN_CONFIG", default_value = "config/config.yaml")]
    config: PathBuf,

    /// City to look up (defaults to the configured city)
    #[arg(long)]
    city: Option<String>,

    /// Crop name, e.g. "Paddy (Rice)", "Wheat", "Cotton", "Tomato", "Sugarcane"
    #[arg(long)]
    crop: Option<String>,

    /// Calendar month for season advice (defaults to the current month)
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..=12))]
    month: Option<u32>,

    /// Hide the 7-day forecast table
    #[arg(long)]
    no_forecast: bool,

    /// Field photo (PNG/JPEG) to analyze for VARI
    #[arg(long)]
    image: Option<PathBuf>,

    /// Where to write the classified VARI map
    #[arg(long, default_value = "vari_map.png")]
    vari_map: PathBuf,

    /// Write the synthetic heat points as JSON to this path
    #[arg(long)]
    heatmap: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,aerosyn=debug,reqwest=warn")),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    let config = if args.config.exists() {
        Config::load(&args.config).map_err(|e| {
            anyhow::anyhow!(
                "Failed to load configuration from {}: {}\n\n\
                 Make sure:\n\
                 1. The file is valid YAML\n\
                 2. All referenced environment variables are set (check .env.example)\n\
                 3. Provider URLs use HTTPS and http.timeout_seconds is between 8 and 12",
                args.config.display(),
                e
            )
        })?
    } else {
        warn!(
            "Config file {} not found, using built-in defaults",
            args.config.display()
        );
        Config::default()
    };
    info!("Configuration loaded");

    let image = match &args.image {
        Some(path) => match std::fs::read(path) {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                error!("Failed to read field image {}: {}", path.display(), e);
                None
            }
        },
        None => None,
    };

    let request = Request {
        city: args.city.unwrap_or_else(|| config.defaults.city.clone()),
        crop: args.crop.unwrap_or_else(|| config.defaults.crop.clone()),
        month: args.month.unwrap_or_else(|| chrono::Local::now().month()),
        show_forecast: config.defaults.show_forecast && !args.no_forecast,
        image,
    };

    let dashboard = Dashboard::from_config(&config)?;
    let report = dashboard.run(&request).await;

    println!("{}", report);

    if let Some(vari) = &report.vari {
        let png = encode_png(&render_map(&vari.per_pixel_map))?;
        std::fs::write(&args.vari_map, png)?;
        info!("VARI map written to {}", args.vari_map.display());
    }

    if let Some(path) = &args.heatmap {
        std::fs::write(path, serde_json::to_string_pretty(&report.heat_points)?)?;
        info!(
            "{} heat points written to {}",
            report.heat_points.len(),
            path.display()
        );
    }

    Ok(())
}

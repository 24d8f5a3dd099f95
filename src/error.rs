use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Location could not be resolved: {0}")]
    ResolutionFailure(String),

    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Image decode error: {0}")]
    ImageDecode(String),
}

impl From<image::ImageError> for AppError {
    fn from(err: image::ImageError) -> Self {
        AppError::ImageDecode(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Parse(format!("Invalid JSON: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

pub mod advisor;
pub mod cache;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod fetcher;
pub mod geo;
pub mod heatmap;
pub mod vari;
pub mod weather;

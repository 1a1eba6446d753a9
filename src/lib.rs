//! Sumi-Mirror: an offline website mirror
//!
//! This crate crawls a site breadth-first from a seed URL, downloads the
//! assets its pages reference, and rewrites links so the copy on disk can be
//! browsed without a network connection.

pub mod config;
pub mod crawler;
pub mod mirror;
pub mod output;
pub mod state;
pub mod url;

use std::path::PathBuf;
use thiserror::Error;

/// Fatal errors that stop a mirror run before or while it starts
///
/// Per-URL problems never surface here; they are recorded in the
/// [`output::CrawlSummary`] instead.
#[derive(Debug, Error)]
pub enum MirrorError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid seed URL: {0}")]
    InvalidSeed(#[from] UrlError),

    #[error("Seed URL is unreachable: {0}")]
    SeedUnreachable(#[source] crawler::FetchError),

    #[error("Cannot create destination {}: {source}", path.display())]
    Destination {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Missing host in URL: {0}")]
    MissingHost(String),

    #[error("Unsupported URL scheme: {0}")]
    UnsupportedScheme(String),
}

/// Result type alias for mirror operations
pub type Result<T> = std::result::Result<T, MirrorError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use crate::config::Config;
pub use crate::crawler::{run_mirror, Coordinator, Shutdown};
pub use crate::output::CrawlSummary;
pub use crate::state::{AssetRecord, AssetStatus};
pub use crate::url::{normalize, CanonicalUrl, Normalized};

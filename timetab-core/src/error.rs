//! Error types for the timetab ecosystem.

use thiserror::Error;

/// Errors that can occur in timetab pipeline operations.
#[derive(Error, Debug)]
pub enum TimetabError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Malformed raw item: {0}")]
    MalformedItem(String),

    #[error("Scrape for group '{0}' failed: {1}")]
    Scrape(String, String),

    #[error("Scrape timed out after {0}s")]
    ScrapeTimeout(u64),

    #[error("Publish error: {0}")]
    Publish(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type alias for timetab operations.
pub type TimetabResult<T> = Result<T, TimetabError>;

//! Error types for the notification stack.

use thiserror::Error;

/// Errors that can occur while storing subscribers or delivering messages.
#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("Delivery to chat {chat_id} failed: {reason}")]
    Delivery { chat_id: i64, reason: String },

    #[error("Subscriber store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Subscriber store error: {0}")]
    Store(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type alias for notification operations.
pub type NotifyResult<T> = Result<T, NotifyError>;

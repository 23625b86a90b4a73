use thiserror::Error;

#[derive(Error, Debug)]
pub enum TrackerError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("invalid NF-e document: {0}")]
    InvalidDocument(String),

    #[error("delivery already registered for invoice key {0}")]
    DuplicateDelivery(String),

    #[error("delivery not found for invoice key {0}")]
    DeliveryNotFound(String),
}

pub type Result<T> = std::result::Result<T, TrackerError>;

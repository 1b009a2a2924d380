use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Database migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Configuration error: {0}")]
    Config(String),

    /// A computed table does not carry every column its target requires.
    #[error("Schema mismatch for {table}: missing columns {missing:?}")]
    Schema { table: String, missing: Vec<String> },

    #[error("Upstream API error: {0}")]
    Upstream(String),
}

pub type Result<T> = std::result::Result<T, AppError>;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum HairgatorError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Cannot read style table {path}: {source}")]
    StyleTable {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed JSON: {0}")]
    Json(#[from] serde_json::Error),
}

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MothballError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("UUID parsing error: {0}")]
    UuidParsing(#[from] uuid::Error),

    #[error("Trigger error: {0}")]
    Trigger(#[from] crate::trigger::TriggerError),

    #[error("Invalid settings: {0}")]
    Settings(String),

    #[error("Scheduler error: {message}")]
    Scheduler { message: String },

    #[error("Archive error: {message}")]
    Archive { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

// Add From implementations for toml errors
impl From<toml::de::Error> for MothballError {
    fn from(err: toml::de::Error) -> Self {
        MothballError::Config(format!("TOML deserialization error: {}", err))
    }
}

impl From<toml::ser::Error> for MothballError {
    fn from(err: toml::ser::Error) -> Self {
        MothballError::Config(format!("TOML serialization error: {}", err))
    }
}

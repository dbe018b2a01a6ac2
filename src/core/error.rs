use thiserror::Error;

#[derive(Error, Debug)]
pub enum BatchError {
    #[error("Malformed record at line {line}: expected {expected} fields, found {found}")]
    MalformedRecord {
        line: usize,
        expected: usize,
        found: usize,
    },

    #[error("Binding error: {0}")]
    Binding(String),

    #[error("Transform error: {0}")]
    Transform(String),

    #[error("Write error: {0}")]
    Write(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Configuration parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),
}

impl BatchError {
    pub fn is_malformed(&self) -> bool {
        matches!(self, BatchError::MalformedRecord { .. })
    }
}

pub type Result<T> = std::result::Result<T, BatchError>;

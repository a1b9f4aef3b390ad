use thiserror::Error;

#[derive(Debug, Error)]
pub enum ShowerError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("no detector station {0} in layout")]
    InvalidStation(usize),

    #[error("observable {found} paired with coincidence {expected}")]
    EventMismatch { expected: u32, found: u32 },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("fit failed: {0}")]
    Fit(String),
}

pub type ShowerResult<T> = Result<T, ShowerError>;

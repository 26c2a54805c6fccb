use std::path::PathBuf;

/// Errors raised by board queries and move application.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BoardError {
    #[error("index {0} is outside the board")]
    InvalidIndex(usize),

    #[error("'{0}' is not a playing mark")]
    InvalidMark(char),

    #[error("cell {0} is already occupied")]
    OccupiedCell(usize),
}

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("config validation error: {0}")]
    Validation(String),
}

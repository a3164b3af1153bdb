use std::error::Error;
use std::fmt;

/// Unified application error for the binary's startup path.
///
/// Engine and per-item failures have their own typed errors in
/// [`crate::maintenance::error`]; this covers config, database and server
/// bootstrap.
#[derive(Debug)]
pub enum AppError {
    Config(String),
    Database(String),
    Network(String),
    Engine(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(msg) => write!(f, "Config error: {}", msg),
            AppError::Database(msg) => write!(f, "Database error: {}", msg),
            AppError::Network(msg) => write!(f, "Network error: {}", msg),
            AppError::Engine(msg) => write!(f, "Engine error: {}", msg),
        }
    }
}

impl Error for AppError {}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Database(err.to_string())
    }
}

impl From<crate::maintenance::EngineError> for AppError {
    fn from(err: crate::maintenance::EngineError) -> Self {
        AppError::Engine(err.to_string())
    }
}

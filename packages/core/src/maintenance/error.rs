//! Error types for maintenance notification runs

use thiserror::Error;

/// Errors raised by persistence collaborators.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Store unavailable: {message}")]
    Unavailable { message: String },

    #[error("Invalid record: {message}")]
    InvalidRecord { message: String },
}

impl StoreError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable { message: message.into() }
    }

    pub fn invalid_record(message: impl Into<String>) -> Self {
        Self::InvalidRecord { message: message.into() }
    }
}

/// Errors from notification channels. Every variant is a transient,
/// per-recipient failure from the engine's point of view.
#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("Network error: {message}")]
    Network { message: String },

    #[error("Channel rejected message: HTTP {status}")]
    Rejected { status: u16 },

    #[error("Send timed out after {seconds}s")]
    Timeout { seconds: u64 },
}

impl ChannelError {
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network { message: message.into() }
    }
}

/// Per-control recipient resolution failures.
#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("Unresolved machine: machine {machine_id} not found")]
    UnresolvedMachine { machine_id: i64 },

    #[error("Machine lookup failed for machine {machine_id}: {source}")]
    Lookup {
        machine_id: i64,
        #[source]
        source: StoreError,
    },
}

/// Run-level errors. Only these abort a run.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Classification source error: {0}")]
    ClassificationSource(#[source] StoreError),

    #[error("Coordinator already ran; start a new one for every pass")]
    AlreadyRun,
}

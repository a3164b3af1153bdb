//! Maintenance-control notification engine
//!
//! Classifies pending maintenance controls as upcoming or overdue, resolves
//! who must hear about each one, sends the notifications and aggregates the
//! per-recipient outcomes into a [`RunReport`].

pub mod classifier;
pub mod config;
pub mod coordinator;
pub mod dispatcher;
pub mod error;
pub mod provider;
pub mod resolver;
pub mod types;

#[cfg(test)]
mod tests;

pub use classifier::classify;
pub use config::EngineConfig;
pub use coordinator::{NotificationEngine, RunCoordinator, RunState};
pub use error::EngineError;
pub use types::*;

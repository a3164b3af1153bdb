//! Notification channels.
//!
//! Concrete [`NotificationChannel`](crate::maintenance::provider::NotificationChannel)
//! implementations: an HTTP email relay for production, a dry-run channel
//! that only logs, and a scriptable mock used by tests.

pub mod dry_run;
pub mod email;
#[cfg(test)]
pub mod mock;

pub use dry_run::DryRunChannel;
pub use email::EmailRelayChannel;

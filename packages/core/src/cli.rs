use clap::Parser;

/// DiaCare maintenance notification service CLI arguments
#[derive(Debug, Parser)]
#[command(
    name = "diacare-maintenance",
    version,
    about = "Maintenance-control reminders and overdue escalation for hospital equipment"
)]
pub struct Cli {
    /// SQLite database URL
    #[arg(long)]
    pub database_url: Option<String>,

    /// Notification pass interval in seconds
    #[arg(long)]
    pub poll_interval: Option<u64>,

    /// Days ahead a control counts as upcoming
    #[arg(long)]
    pub horizon_days: Option<i64>,

    /// HTTP port
    #[arg(long)]
    pub port: Option<u16>,

    /// Run a single pass, print the report as JSON and exit
    #[arg(long)]
    pub once: bool,

    /// Use the built-in in-memory demo ward instead of the database controls
    #[arg(long)]
    pub demo: bool,
}

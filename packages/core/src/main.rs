use std::sync::Arc;

use chrono::Utc;
use clap::Parser;
use dotenvy::dotenv;
use tower_http::cors::CorsLayer;

use diacare_maintenance::api::{self, AppState};
use diacare_maintenance::channels::{DryRunChannel, EmailRelayChannel};
use diacare_maintenance::cli::Cli;
use diacare_maintenance::config::Config;
use diacare_maintenance::db::create_pool;
use diacare_maintenance::error::AppError;
use diacare_maintenance::logging::init_logging;
use diacare_maintenance::maintenance::provider::{
    ControlSource, MachineDirectory, NotificationChannel,
};
use diacare_maintenance::maintenance::{NotificationEngine, RunTrigger};
use diacare_maintenance::metrics::AppMetrics;
use diacare_maintenance::repository::MaintenanceRepository;
use diacare_maintenance::scheduler::{execute_run, run_notification_loop};
use diacare_maintenance::store::InMemoryMaintenanceStore;

#[tokio::main]
async fn main() {
    dotenv().ok();
    init_logging();

    let cli = Cli::parse();
    let config = Config::from_env()
        .map_err(AppError::Config)
        .and_then(|config| config.apply_cli(&cli).map_err(AppError::Config))
        .unwrap_or_else(|err| {
            tracing::error!("{}", err);
            std::process::exit(1);
        });

    if let Err(err) = run(config, &cli).await {
        tracing::error!("{}", err);
        std::process::exit(1);
    }
}

async fn run(config: Config, cli: &Cli) -> Result<(), AppError> {
    tracing::info!(
        "Starting DiaCare maintenance service (horizon: {}d, escalate: {}, admins: {})",
        config.horizon_days,
        config.escalate_on_overdue,
        config.admin_emails.len()
    );

    let pool = create_pool(&config.database_url).await?;
    let repository = Arc::new(MaintenanceRepository::new(pool));

    let (controls, machines): (
        Arc<dyn ControlSource + Send + Sync>,
        Arc<dyn MachineDirectory + Send + Sync>,
    ) = if cli.demo {
        tracing::info!("Demo mode: using the in-memory ward");
        let store = Arc::new(InMemoryMaintenanceStore::with_demo_data(Utc::now()));
        let controls: Arc<dyn ControlSource + Send + Sync> = store.clone();
        let machines: Arc<dyn MachineDirectory + Send + Sync> = store;
        (controls, machines)
    } else {
        let controls: Arc<dyn ControlSource + Send + Sync> = repository.clone();
        let machines: Arc<dyn MachineDirectory + Send + Sync> = repository.clone();
        (controls, machines)
    };

    let channel: Arc<dyn NotificationChannel + Send + Sync> = match &config.email {
        Some(email) => {
            tracing::info!("Email relay channel enabled ({})", email.relay_url);
            Arc::new(EmailRelayChannel::new(email.relay_url.clone(), email.from.clone()))
        }
        None => {
            tracing::warn!("EMAIL_RELAY_URL not set; notifications will only be logged");
            Arc::new(DryRunChannel::new())
        }
    };

    let engine = Arc::new(NotificationEngine::new(
        config.engine_config(),
        controls.clone(),
        machines,
        channel,
    ));
    let metrics = Arc::new(
        AppMetrics::new().map_err(|e| AppError::Config(format!("metrics registry: {}", e)))?,
    );

    if cli.once {
        let report = execute_run(&engine, &repository, &metrics, RunTrigger::Manual, None).await?;
        let json = serde_json::to_string_pretty(&report)
            .map_err(|e| AppError::Engine(e.to_string()))?;
        println!("{}", json);
        return Ok(());
    }

    tokio::spawn(run_notification_loop(
        engine.clone(),
        repository.clone(),
        metrics.clone(),
        config.poll_interval_seconds,
    ));

    let app = api::create_router(AppState {
        engine,
        controls,
        history: repository,
        metrics,
    })
    .layer(CorsLayer::permissive());

    let addr = format!("0.0.0.0:{}", config.api_port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| AppError::Network(format!("failed to bind {}: {}", addr, e)))?;
    tracing::info!("API listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .map_err(|e| AppError::Network(e.to_string()))
}

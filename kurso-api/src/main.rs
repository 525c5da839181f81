use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use kurso_api::collab::{LoggingCalendarPublisher, LoggingNotifier};
use kurso_api::worker::start_lifecycle_worker;
use kurso_api::{app, AppState};
use kurso_cancellation::CancellationEngine;
use kurso_catalog::{CapacityEvaluator, OfferingManager, TierManager};
use kurso_core::collab::{CalendarPublisher, CancellationNotifier, UserDirectory};
use kurso_core::repository::{
    CancellationLogRepository, OfferingRepository, PriceTierRepository, RegistrationRepository,
    SessionRepository,
};
use kurso_registration::RegistrationEngine;
use kurso_store::postgres::{
    PgCancellationLogRepository, PgOfferingRepository, PgPriceTierRepository,
    PgRegistrationRepository, PgSessionRepository, PgUserDirectory,
};
use kurso_store::DbClient;

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kurso_api=debug,tower_http=debug,axum::rejection=trace".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = kurso_store::app_config::Config::load().expect("Failed to load config");
    tracing::info!("Starting Kurso API on port {}", config.server.port);

    let db = DbClient::new(&config.database.url, config.database.max_connections)
        .await
        .expect("Failed to connect to Postgres");
    db.migrate().await.expect("Failed to run migrations");

    let offerings: Arc<dyn OfferingRepository> =
        Arc::new(PgOfferingRepository::new(db.pool.clone()));
    let sessions: Arc<dyn SessionRepository> = Arc::new(PgSessionRepository::new(db.pool.clone()));
    let tiers: Arc<dyn PriceTierRepository> = Arc::new(PgPriceTierRepository::new(db.pool.clone()));
    let registrations: Arc<dyn RegistrationRepository> =
        Arc::new(PgRegistrationRepository::new(db.pool.clone()));
    let cancellation_log: Arc<dyn CancellationLogRepository> =
        Arc::new(PgCancellationLogRepository::new(db.pool.clone()));
    let users: Arc<dyn UserDirectory> = Arc::new(PgUserDirectory::new(db.pool.clone()));

    let calendar: Arc<dyn CalendarPublisher> = Arc::new(LoggingCalendarPublisher);
    let notifier: Arc<dyn CancellationNotifier> = Arc::new(LoggingNotifier);

    let state = AppState {
        offerings: Arc::new(OfferingManager::new(
            offerings.clone(),
            sessions.clone(),
            tiers.clone(),
            registrations.clone(),
            calendar.clone(),
        )),
        tiers: Arc::new(TierManager::new(offerings.clone(), tiers.clone())),
        capacity: Arc::new(CapacityEvaluator::new(
            offerings.clone(),
            sessions.clone(),
            tiers.clone(),
            registrations.clone(),
        )),
        registration: Arc::new(RegistrationEngine::new(
            offerings.clone(),
            sessions.clone(),
            tiers.clone(),
            registrations.clone(),
        )),
        cancellation: Arc::new(CancellationEngine::new(
            offerings.clone(),
            sessions.clone(),
            tiers.clone(),
            registrations.clone(),
            cancellation_log.clone(),
            users,
            calendar,
            notifier,
        )),
        cancellation_log,
    };

    // Self-initiating; no external trigger exists for status demotion.
    tokio::spawn(start_lifecycle_worker(
        sessions.clone(),
        Duration::from_secs(config.scheduler.sweep_interval_seconds),
        config.scheduler.catch_up_on_start,
    ));

    let app = app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind listener");
    axum::serve(listener, app).await.expect("Server error");
}

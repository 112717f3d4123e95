use std::net::SocketAddr;
use std::sync::Arc;
use dotenv::dotenv;
use tokio::net::TcpListener;
use tower_http::cors::{CorsLayer, Any};
use tower_http::trace::{self, TraceLayer};
use tracing::{Level, error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod router;

use conflict_cell::models::{
    AutoRescheduleSettings, NotificationSettings, PriorityRules,
};
use conflict_cell::services::engine::ConflictEngine;
use notification_cell::{
    LogTransport, NotificationQueue, NotificationWorker, WorkerConfig,
};
use shared_config::AppConfig;
use shared_store::{MemoryAppointmentStore, MemoryAvailabilitySource, MemoryPatientHistory};

#[tokio::main]
async fn main() {
    // Loading Env Vars
    dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting MedSync scheduling API server");

    // Load configuration
    let config = AppConfig::from_env();

    // Wire up storage and the notification pipeline
    let store = Arc::new(MemoryAppointmentStore::new());
    let availability = Arc::new(MemoryAvailabilitySource::new());
    let history = Arc::new(MemoryPatientHistory::new());
    let queue = Arc::new(NotificationQueue::new());

    let worker = Arc::new(NotificationWorker::new(
        Arc::clone(&queue),
        Arc::new(LogTransport),
        WorkerConfig {
            max_attempts: config.notification_max_attempts,
            retry_backoff_ms: config.notification_retry_backoff_ms,
            ..WorkerConfig::default()
        },
    ));
    {
        let worker = Arc::clone(&worker);
        tokio::spawn(async move {
            if let Err(e) = worker.run().await {
                error!("Notification worker stopped: {}", e);
            }
        });
    }

    let settings = AutoRescheduleSettings {
        enabled: config.auto_reschedule_enabled,
        max_attempts: config.auto_reschedule_max_attempts,
        time_window_hours: config.auto_reschedule_window_hours,
        priority_rules: PriorityRules::default(),
        notification_settings: NotificationSettings {
            advance_notice_hours: config.notification_advance_notice_hours,
            ..NotificationSettings::default()
        },
    };

    let engine = Arc::new(ConflictEngine::new(
        store,
        availability,
        history,
        queue.clone(),
        settings,
    ));

    // Set up CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Build the application router
    let app = router::create_router(engine, queue)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(trace::DefaultMakeSpan::new()
                    .level(Level::INFO))
                .on_response(trace::DefaultOnResponse::new()
                    .level(Level::INFO)),
        )
        .layer(cors);

    // Run the server
    let addr: SocketAddr = match config.bind_address.parse() {
        Ok(addr) => addr,
        Err(e) => {
            error!("Invalid BIND_ADDRESS '{}': {}", config.bind_address, e);
            return;
        }
    };
    info!("Listening on {}", addr);

    let listener = match TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind {}: {}", addr, e);
            return;
        }
    };

    let serve = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal(worker));
    if let Err(e) = serve.await {
        error!("Server error: {}", e);
    }
}

async fn shutdown_signal(worker: Arc<NotificationWorker>) {
    if tokio::signal::ctrl_c().await.is_err() {
        error!("Failed to install shutdown signal handler");
        return;
    }
    info!("Shutdown signal received, draining notification worker");
    worker.shutdown().await;
}

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use keepdate_notify::{
    build_notifier, DeliveryConfig, Dispatcher, DispatcherConfig, PgEventDirectory, PgQueueStore,
    Reconciler, SystemClock,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use keepdate_api::config::ServerConfig;
use keepdate_api::router::build_app_router;
use keepdate_api::state::AppState;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "keepdate_api=debug,keepdate_notify=debug,tower_http=debug".into()
    });
    let json_logs = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    if json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // --- Database ---
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = keepdate_db::create_pool(&database_url)
        .await
        .expect("Failed to connect to database");
    tracing::info!("Database connection pool created");

    keepdate_db::health_check(&pool)
        .await
        .expect("Database health check failed");
    tracing::info!("Database health check passed");

    keepdate_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");

    // --- Scheduling engine ---
    let store = Arc::new(PgQueueStore::new(pool.clone()));
    let directory = Arc::new(PgEventDirectory::new(pool.clone()));
    let clock = Arc::new(SystemClock);
    let notifier =
        build_notifier(&DeliveryConfig::from_env()).expect("Failed to build reminder notifier");

    let reconciler = Arc::new(Reconciler::new(store.clone(), directory, clock.clone()));
    let dispatcher = Arc::new(
        Dispatcher::new(store, notifier, clock, DispatcherConfig::from_env())
            .with_rollover(Arc::clone(&reconciler)),
    );

    if config.run_dispatcher {
        dispatcher.start().await;
    } else {
        tracing::info!("RUN_DISPATCHER=false, due reminders are left to the worker");
    }

    // --- App state ---
    let state = AppState {
        pool,
        config: Arc::new(config.clone()),
        reconciler,
        dispatcher: Arc::clone(&dispatcher),
    };

    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    let grace = Duration::from_secs(config.shutdown_timeout_secs);
    if tokio::time::timeout(grace, dispatcher.stop()).await.is_err() {
        tracing::warn!(timeout_secs = config.shutdown_timeout_secs, "Dispatcher did not stop in time");
    }

    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix) so the server
/// shuts down cleanly whether stopped interactively or by a process
/// manager.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}

//! Stand-alone reminder dispatcher.
//!
//! Runs the same poll loop the API server can run in-process, for
//! deployments that keep delivery out of the request-serving process
//! (start the API with `RUN_DISPATCHER=false`). Several workers may run at
//! once; the queue's pending-gated status updates keep each reminder to a
//! single delivery.

use std::sync::Arc;

use keepdate_notify::{
    build_notifier, DeliveryConfig, Dispatcher, DispatcherConfig, PgEventDirectory, PgQueueStore,
    Reconciler, SystemClock,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "keepdate_worker=debug,keepdate_notify=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let pool = keepdate_db::create_pool(&database_url)
        .await
        .expect("Failed to connect to database");
    keepdate_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");

    let notifier =
        build_notifier(&DeliveryConfig::from_env()).expect("Failed to build reminder notifier");
    let store = Arc::new(PgQueueStore::new(pool.clone()));
    let clock = Arc::new(SystemClock);
    let reconciler = Arc::new(Reconciler::new(
        store.clone(),
        Arc::new(PgEventDirectory::new(pool)),
        clock.clone(),
    ));
    let dispatcher = Arc::new(
        Dispatcher::new(store, notifier, clock, DispatcherConfig::from_env())
            .with_rollover(reconciler),
    );

    dispatcher.start().await;
    tracing::info!("Worker started");

    shutdown_signal().await;

    dispatcher.stop().await;
    tracing::info!("Worker stopped");
}

/// Resolve on SIGINT or, on Unix, SIGTERM.
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
        () = ctrl_c => tracing::info!("Received SIGINT, shutting down"),
        () = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }
}

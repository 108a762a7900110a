//! Book Hive Server - school library lending service

use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post, put},
    Router,
};
use sqlx::postgres::PgPoolOptions;
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorLayer,
};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use book_hive_server::{
    api,
    config::{AppConfig, LoggingConfig},
    repository::Repository,
    scheduler::CronScheduler,
    services::{redis::RedisService, Services},
    AppState,
};

const BULK_IMPORT_BODY_LIMIT: usize = 10 * 1024 * 1024;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let config = AppConfig::load().context("Failed to load configuration")?;

    // Keep the guard alive so buffered file logs are flushed on exit
    let _log_guard = init_tracing(&config.logging)?;

    tracing::info!("Starting Book Hive Server v{}", env!("CARGO_PKG_VERSION"));

    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .acquire_timeout(Duration::from_secs(config.database.acquire_timeout_secs))
        .connect(&config.database.url)
        .await
        .context("Failed to connect to database")?;

    tracing::info!("Connected to database");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run database migrations")?;

    tracing::info!("Database migrations completed");

    let redis_service = RedisService::new(&config.redis.url)
        .await
        .context("Failed to connect to Redis")?;

    tracing::info!("Connected to Redis");

    let repository = Repository::new(pool);
    let services = Arc::new(Services::new(repository, &config, redis_service));

    services
        .auth
        .bootstrap()
        .await
        .context("Failed to provision the admin password")?;

    let mut scheduler = if config.scheduler.enabled {
        let scheduler = CronScheduler::new(Arc::clone(&services), config.scheduler.clone()).await?;
        scheduler.register_tasks().await?;
        scheduler.start().await?;
        Some(scheduler)
    } else {
        tracing::info!("Scheduler disabled; overdue sweep runs only on demand");
        None
    };

    let addr = SocketAddr::new(
        config.server.host.parse().context("Invalid host address")?,
        config.server.port,
    );

    let state = AppState {
        config: Arc::new(config),
        services,
    };

    let app = create_router(state)?;

    tracing::info!("Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(scheduler) = scheduler.as_mut() {
        scheduler.shutdown().await?;
    }

    tracing::info!("Server stopped");
    Ok(())
}

/// Install the global subscriber; returns the file writer guard when file logging is on
fn init_tracing(config: &LoggingConfig) -> anyhow::Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("book_hive_server={},tower_http=debug", config.level).into());

    let (file_layer, guard) = match config.directory.as_deref() {
        Some(directory) => {
            let appender = tracing_appender::rolling::daily(directory, "book-hive.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let registry = tracing_subscriber::registry().with(filter).with(file_layer);

    match config.format.as_str() {
        "json" => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        "journald" => registry
            .with(tracing_journald::layer().context("Failed to connect to journald")?)
            .init(),
        _ => registry.with(tracing_subscriber::fmt::layer().pretty()).init(),
    }

    Ok(guard)
}

/// Create the application router with all routes
fn create_router(state: AppState) -> anyhow::Result<Router> {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Per-client token bucket on the password check
    let auth = &state.config.auth;
    let login_limit = GovernorConfigBuilder::default()
        .key_extractor(SmartIpKeyExtractor)
        .per_second(auth.login_replenish_seconds)
        .burst_size(auth.login_burst_size)
        .finish()
        .context("Invalid login rate limit configuration")?;

    let login = Router::new()
        .route(
            "/functions/admin-check-password",
            post(api::functions::admin_check_password),
        )
        .layer(GovernorLayer {
            config: Arc::new(login_limit),
        });

    let api_v1 = Router::new()
        // Health check
        .route("/health", get(api::health::health_check))
        .route("/ready", get(api::health::readiness_check))
        // Administrative functions
        .route("/functions/admin-manage-book", post(api::functions::admin_manage_book))
        .route("/functions/admin-manage-copy", post(api::functions::admin_manage_copy))
        .route(
            "/functions/process-borrow-request",
            post(api::functions::process_borrow_request),
        )
        .route("/functions/admin-manage-loan", post(api::functions::admin_manage_loan))
        .route(
            "/functions/bulk-import-books",
            post(api::functions::bulk_import_books).layer(DefaultBodyLimit::max(BULK_IMPORT_BODY_LIMIT)),
        )
        .route(
            "/functions/daily-overdue-check",
            post(api::functions::daily_overdue_check),
        )
        .route("/functions/send-email", post(api::functions::send_email))
        // Catalog
        .route("/books", get(api::catalog::list_books))
        .route("/books/:id", get(api::catalog::get_book))
        .route("/categories", get(api::catalog::list_categories))
        .route("/levels", get(api::catalog::list_levels))
        // Borrow requests
        .route(
            "/borrow-requests",
            get(api::admin::list_borrow_requests).post(api::catalog::submit_borrow_request),
        )
        .route("/borrow-requests/:id", get(api::admin::get_borrow_request))
        .route("/borrow-requests/:id/notes", put(api::admin::update_request_notes))
        // Loans
        .route("/loans", get(api::admin::list_loans))
        .route("/loans/overdue", get(api::admin::list_overdue_loans))
        .route("/loans/:id", get(api::admin::get_loan))
        // Administration
        .route("/notifications", get(api::admin::list_notifications))
        .route("/activity", get(api::admin::list_activity))
        .route("/stats", get(api::admin::get_stats))
        .route("/admin/logout", post(api::admin::logout))
        // Change feed
        .route("/events", get(api::events::stream_events))
        .merge(login)
        .with_state(state);

    let openapi = api::openapi::create_openapi_router();

    Ok(Router::new()
        .nest("/api/v1", api_v1)
        .merge(openapi)
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(cors))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => tracing::error!("Failed to install SIGTERM handler: {}", e),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}

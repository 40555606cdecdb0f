mod config;
mod constants;
mod domain;
mod models;
mod routes;
mod services;
mod store;

use anyhow::{Context, Result};
use axum::{
    Router,
    http::{HeaderValue, Method, header::CONTENT_TYPE},
};
use chrono::{NaiveDate, Utc};
use sqlx::postgres::PgPoolOptions;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use config::{Config, Rules};
use constants::MAINTENANCE_INTERVAL_SECS;
use services::rate_limit::{PingRateLimiter, RateLimitConfig};
use services::recorder::ActivityRecorder;
use services::user_locks::UserLocks;
use store::{PgStore, ProgressStore};

/// Ping buckets idle this long are dropped
const PING_BUCKET_MAX_AGE: Duration = Duration::from_secs(60 * 60);

pub struct AppState {
    pub store: Arc<dyn ProgressStore>,
    pub recorder: ActivityRecorder,
    pub locks: UserLocks,
    pub ping_limiter: PingRateLimiter,
    /// Peers allowed to report the client address in forwarding headers
    pub trusted_proxies: Vec<IpAddr>,
}

impl AppState {
    pub fn new(store: Arc<dyn ProgressStore>, rules: Rules, ping_limit: RateLimitConfig) -> Self {
        let locks = UserLocks::new();
        Self {
            recorder: ActivityRecorder::new(store.clone(), rules, locks.clone()),
            store,
            locks,
            ping_limiter: PingRateLimiter::new(ping_limit),
            trusted_proxies: Vec::new(),
        }
    }

    pub fn with_trusted_proxies(mut self, proxies: Vec<IpAddr>) -> Self {
        self.trusted_proxies = proxies;
        self
    }

    /// Current calendar day in the configured offset
    pub fn today(&self) -> NaiveDate {
        Utc::now()
            .with_timezone(&self.recorder.rules().utc_offset)
            .date_naive()
    }
}

pub fn build_app(state: Arc<AppState>, cors_origin: Option<&str>) -> Router {
    let origin = match cors_origin.map(HeaderValue::from_str) {
        Some(Ok(origin)) => AllowOrigin::exact(origin),
        Some(Err(e)) => {
            warn!(error = %e, "Invalid CORS_ALLOWED_ORIGIN, allowing any origin");
            AllowOrigin::any()
        }
        None => AllowOrigin::any(),
    };
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any)
        .max_age(Duration::from_secs(3600));

    routes::build_routes()
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}

/// Drop idle per-user locks and ping buckets
async fn run_maintenance(state: Arc<AppState>) {
    let mut interval = tokio::time::interval(Duration::from_secs(MAINTENANCE_INTERVAL_SECS));
    loop {
        interval.tick().await;
        state.locks.prune();
        state.ping_limiter.cleanup(PING_BUCKET_MAX_AGE);
        debug!(
            locks = state.locks.tracked_users(),
            ping_buckets = state.ping_limiter.tracked_users(),
            "Maintenance pass"
        );
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let dotenv = dotenvy::dotenv();
    init_tracing();
    match dotenv {
        Ok(path) => info!("Loaded environment from {:?}", path),
        Err(e) => warn!("No .env file loaded ({}) - relying on environment", e),
    }

    let config = Config::from_env();

    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .acquire_timeout(config.store_timeout)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run migrations")?;

    let store: Arc<dyn ProgressStore> = Arc::new(PgStore::new(pool, config.store_timeout));
    info!(trusted_proxies = ?config.trusted_proxies, "Client address policy");
    let state = Arc::new(
        AppState::new(store, config.rules.clone(), config.ping_limit)
            .with_trusted_proxies(config.trusted_proxies.clone()),
    );

    tokio::spawn(run_maintenance(state.clone()));

    let app = build_app(state, config.cors_allowed_origin.as_deref());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!("Listening on http://{}", addr);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("Server failed")?;

    Ok(())
}

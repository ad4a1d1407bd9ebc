mod cache;
mod email;
mod error;
mod routes;
mod storage;

use axum::{
    Router,
    extract::FromRef,
    routing::{get, post},
};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use rosterframe_core::clock::SystemClock;

use cache::TtlCache;
use email::{EmailConfig, Mailer};
use storage::Db;

/// Processed webhook event ids are remembered this long.
const EVENT_CACHE_TTL_HOURS: i64 = 24;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Db,
    pub config: AppConfig,
    /// `None` when no email provider key is configured; sends are skipped
    /// with a warning.
    pub mailer: Option<Arc<Mailer>>,
    /// Dedup of provider event ids, process-local.
    pub event_cache: TtlCache<String, ()>,
}

/// Server configuration loaded from environment variables.
#[derive(Clone)]
pub struct AppConfig {
    pub webhook_secret: String,
}

impl FromRef<AppState> for Db {
    fn from_ref(state: &AppState) -> Self {
        state.db.clone()
    }
}

fn load_mailer() -> anyhow::Result<Option<Arc<Mailer>>> {
    let Some(api_key) = std::env::var("RESEND_API_KEY")
        .ok()
        .filter(|s| !s.is_empty())
    else {
        tracing::warn!("RESEND_API_KEY not set — confirmation emails disabled");
        return Ok(None);
    };
    let from = std::env::var("EMAIL_FROM")
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "Roster Frame <orders@rosterframe.shop>".into());
    let api_base = std::env::var("RESEND_API_BASE")
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| EmailConfig::DEFAULT_API_BASE.into());

    tracing::info!("email delivery enabled (from: {from})");
    let mailer = Mailer::new(EmailConfig { api_key, from, api_base })?;
    Ok(Some(Arc::new(mailer)))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rosterframe_server=info,tower_http=info".into()),
        )
        .init();

    // Data directory
    let data_dir = std::env::var("ROSTERFRAME_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("data"));

    tracing::info!("data directory: {}", data_dir.display());

    let db = storage::init_db(&data_dir)?;
    tracing::info!("database initialized");

    let base_url = std::env::var("BASE_URL")
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "http://localhost:3000".into());

    let webhook_secret = std::env::var("STRIPE_WEBHOOK_SECRET").unwrap_or_default();
    if webhook_secret.is_empty() {
        tracing::warn!("STRIPE_WEBHOOK_SECRET not set — webhook endpoint will reject all events");
    }

    let mailer = load_mailer()?;

    let state = AppState {
        db,
        config: AppConfig { webhook_secret },
        mailer,
        event_cache: TtlCache::new(
            chrono::Duration::hours(EVENT_CACHE_TTL_HOURS),
            Arc::new(SystemClock),
        ),
    };

    // Build API routes
    let api = Router::new()
        .route("/health", get(routes::health::health))
        // Orders
        .route("/orders", post(routes::orders::create_order))
        .route(
            "/orders/confirmation-email",
            post(routes::orders::send_confirmation),
        )
        .route("/orders/{id}", get(routes::orders::get_order))
        .route("/orders/{id}/history", get(routes::orders::get_order_history))
        // Payment provider webhook (raw body, signature-verified)
        .route("/webhooks/payment", post(routes::webhooks::payment_webhook));

    let app = Router::new()
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state);

    tracing::info!("starting server at {base_url}");

    let port = std::env::var("PORT").unwrap_or_else(|_| "3000".into());
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}")).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

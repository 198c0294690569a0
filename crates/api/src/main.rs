use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Html,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use stockcast_core::dashboard::{render_html, Dashboard, Page};
use stockcast_core::domain::horizon::Horizon;
use stockcast_core::ingest::yahoo::YahooClient;
use stockcast_core::storage::HistoryCache;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = stockcast_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let provider = YahooClient::from_settings(&settings).map_err(|e| {
        sentry_anyhow::capture_anyhow(&e);
        e
    })?;
    let history = HistoryCache::from_capacity(settings.history_cache_capacity);
    let dashboard = Dashboard::new(Arc::new(provider), history, settings.history_start()?);

    let state = AppState {
        dashboard: Arc::new(dashboard),
    };

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3000);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!(%addr, "dashboard listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

fn app(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/api/dashboard", get(dashboard_json))
        .route("/cache/clear", post(clear_cache))
        .route("/healthz", get(healthz))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Clone)]
struct AppState {
    dashboard: Arc<Dashboard>,
}

#[derive(Debug, Default, Deserialize)]
struct DashboardQuery {
    ticker: Option<String>,
    years: Option<String>,
}

impl DashboardQuery {
    /// Unparseable years fall back to the slider default; out-of-range ones are clamped.
    fn horizon(&self) -> Horizon {
        self.years
            .as_deref()
            .and_then(|v| v.trim().parse::<i64>().ok())
            .map(Horizon::clamped)
            .unwrap_or_default()
    }
}

async fn render_page(state: &AppState, query: &DashboardQuery) -> Page {
    let today = chrono::Local::now().date_naive();
    state
        .dashboard
        .render(query.ticker.as_deref().unwrap_or(""), query.horizon(), today)
        .await
}

async fn index(State(state): State<AppState>, Query(query): Query<DashboardQuery>) -> Html<String> {
    Html(render_html(&render_page(&state, &query).await))
}

async fn dashboard_json(
    State(state): State<AppState>,
    Query(query): Query<DashboardQuery>,
) -> Json<Page> {
    Json(render_page(&state, &query).await)
}

async fn clear_cache(State(state): State<AppState>) -> StatusCode {
    state.dashboard.history().clear();
    StatusCode::NO_CONTENT
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

fn init_sentry(settings: &stockcast_core::config::Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}

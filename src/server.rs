//! HTTP surface: the transit proxy, health check, and the arrival board.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::http::header::CONTENT_TYPE;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::clock::SystemClock;
use crate::config::Config;
use crate::error::ProxyError;
use crate::fetch::BasicClient;
use crate::orchestrator::{Orchestrator, OrchestratorSettings, RefreshSession};
use crate::page;
use crate::presentation::{Board, LiveBoard};
use crate::timer::RefreshTimer;
use crate::upstream::{FeedSource, UpstreamClient};

pub type Upstream = UpstreamClient<BasicClient>;

/// Shared by all handlers.
#[derive(Clone)]
pub struct AppState {
    /// `None` when no API key is configured.
    pub upstream: Option<Arc<Upstream>>,
    pub orchestrator: Option<Arc<Orchestrator>>,
    pub board: Arc<LiveBoard>,
    pub refresh_interval: Duration,
}

impl AppState {
    /// Wires the proxy and the in-process board from `config`. The board
    /// fetches straight from upstream; the key never leaves the process.
    pub fn from_config(config: &Config) -> Self {
        let board = Arc::new(LiveBoard::new(&config.stops));
        let upstream = config
            .api_key
            .clone()
            .map(|key| Arc::new(UpstreamClient::new(BasicClient::new(), &config.upstream_url, key)));

        let orchestrator = upstream.as_ref().map(|upstream| {
            let source: Arc<dyn FeedSource> = upstream.clone();
            Arc::new(Orchestrator::new(
                &config.stops,
                OrchestratorSettings {
                    agency: config.agency.clone(),
                    max_arrivals: config.max_arrivals,
                    display_tz: config.display_tz,
                },
                source,
                Arc::new(SystemClock),
                board.clone(),
            ))
        });

        Self {
            upstream,
            orchestrator,
            board,
            refresh_interval: config.refresh_interval,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/api/transit", get(transit))
        .route("/api/health", get(health))
        .route("/api/arrivals", get(arrivals))
        .route("/api/refresh", post(refresh))
        .with_state(state)
}

/// Serves until Ctrl-C, refreshing the board on `config.refresh_interval`.
pub async fn serve(config: Config) -> Result<()> {
    let state = AppState::from_config(&config);

    let mut timer = RefreshTimer::new();
    match &state.orchestrator {
        Some(orchestrator) => timer.start(orchestrator.clone(), config.refresh_interval),
        None => warn!("API_KEY is not set; /api/transit will answer 500 and the board stays empty"),
    }

    let listener = TcpListener::bind(("0.0.0.0", config.port)).await?;
    info!(addr = %listener.local_addr()?, "Server running");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    timer.stop();
    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}

#[derive(Debug, Deserialize)]
struct TransitQuery {
    #[serde(rename = "stopCode")]
    stop_code: Option<String>,
    agency: Option<String>,
}

#[tracing::instrument(skip_all)]
async fn transit(
    State(state): State<AppState>,
    Query(query): Query<TransitQuery>,
) -> Result<Response, ProxyError> {
    let upstream = state.upstream.as_ref().ok_or(ProxyError::MissingConfiguration)?;

    let (Some(stop_code), Some(agency)) = (
        query.stop_code.filter(|s| !s.is_empty()),
        query.agency.filter(|s| !s.is_empty()),
    ) else {
        return Err(ProxyError::MissingParameters);
    };

    let body = upstream
        .stop_monitoring(&stop_code, &agency)
        .await
        .inspect_err(|e| warn!(error = %e, "API request error"))?;

    Ok(([(CONTENT_TYPE, "application/xml")], body).into_response())
}

#[derive(Serialize)]
struct Health {
    status: &'static str,
    timestamp: String,
}

async fn health() -> Json<Health> {
    Json(Health {
        status: "ok",
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    })
}

async fn index(State(state): State<AppState>) -> Html<String> {
    if state.upstream.is_none() {
        return Html(page::render_setup_instructions());
    }
    Html(page::render_board(
        &state.board.snapshot(),
        state.refresh_interval,
    ))
}

#[derive(Serialize)]
struct ArrivalsSnapshot {
    board: Board,
    refreshing: bool,
    session: Option<RefreshSession>,
}

async fn arrivals(State(state): State<AppState>) -> Json<ArrivalsSnapshot> {
    Json(ArrivalsSnapshot {
        board: state.board.snapshot(),
        refreshing: state
            .orchestrator
            .as_ref()
            .is_some_and(|o| o.is_refreshing()),
        session: state.orchestrator.as_ref().map(|o| o.session()),
    })
}

#[derive(Serialize)]
struct RefreshReply {
    status: &'static str,
}

/// Starts a cycle in the background. A request while one is running is
/// ignored and answered with 409.
async fn refresh(State(state): State<AppState>) -> Result<Response, ProxyError> {
    let orchestrator = state.orchestrator.ok_or(ProxyError::MissingConfiguration)?;

    let (code, status) = match orchestrator.spawn_refresh() {
        Some(_) => (StatusCode::ACCEPTED, "started"),
        None => (StatusCode::CONFLICT, "already_refreshing"),
    };
    Ok((code, Json(RefreshReply { status })).into_response())
}

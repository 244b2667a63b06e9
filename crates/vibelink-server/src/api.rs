//! HTTP surface: the WebSocket endpoint plus the small REST sidecar the web
//! client hits before the socket is up (initial roster, global stats,
//! profile sync).

use std::net::SocketAddr;

use axum::{
    extract::State,
    http::Method,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use vibelink_shared::types::{PresenceRecord, SessionId};

use crate::error::ServerError;
use crate::presence;
use crate::state::{AppState, Profile};
use crate::ws::ws_handler;

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/info", get(server_info))
        .route("/ws", get(ws_handler))
        .route("/api/active-users", get(active_users))
        .route("/api/stats/monthly", get(monthly_stats))
        .route("/api/sync-user", post(sync_user))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run the HTTP server until it fails or the process shuts down.
pub async fn serve(state: AppState, addr: SocketAddr) -> anyhow::Result<()> {
    let router = build_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %addr, "HTTP server listening");
    axum::serve(listener, router).await?;
    Ok(())
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

#[derive(Serialize)]
struct ServerInfoResponse {
    name: String,
    version: &'static str,
    ping_limit: u32,
    toggle_limit: u32,
    elite_enabled: bool,
}

#[derive(Serialize)]
struct MonthlyStatsResponse {
    count: u64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SyncUserRequest {
    session_id: String,
    name: String,
    #[serde(default)]
    gender: Option<String>,
    #[serde(default)]
    is_premium: bool,
}

#[derive(Serialize)]
struct SyncUserResponse {
    ok: bool,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn server_info(State(state): State<AppState>) -> Json<ServerInfoResponse> {
    Json(ServerInfoResponse {
        name: state.config.instance_name.clone(),
        version: env!("CARGO_PKG_VERSION"),
        ping_limit: state.config.ping_limit,
        toggle_limit: state.config.toggle_limit,
        elite_enabled: state.config.elite_enabled,
    })
}

/// The roster as it stands, for the page's initial fetch; the socket pushes
/// replacements from then on.
async fn active_users(State(state): State<AppState>) -> Json<Vec<PresenceRecord>> {
    let registry = state.registry.lock().await;
    Json(registry.roster())
}

async fn monthly_stats(State(state): State<AppState>) -> Json<MonthlyStatsResponse> {
    let registry = state.registry.lock().await;
    Json(MonthlyStatsResponse { count: registry.monthly_matches })
}

async fn sync_user(
    State(state): State<AppState>,
    Json(request): Json<SyncUserRequest>,
) -> Result<Json<SyncUserResponse>, ServerError> {
    if request.session_id.is_empty() {
        return Err(ServerError::BadRequest("sessionId must not be empty".to_string()));
    }

    presence::sync_profile(
        &state,
        &SessionId(request.session_id),
        Profile {
            name: request.name,
            gender: request.gender,
            is_premium: request.is_premium,
        },
    )
    .await;

    Ok(Json(SyncUserResponse { ok: true }))
}

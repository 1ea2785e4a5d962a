use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, State},
    http::{HeaderMap, Method},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use flatchat_shared::SessionToken;
use flatchat_store::{ChatError, ChatService, PollResult};

use crate::config::ServerConfig;
use crate::error::ServerError;

#[derive(Clone)]
pub struct AppState {
    pub chat: Arc<ChatService>,
    pub config: Arc<ServerConfig>,
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/info", get(server_info))
        .route("/login", post(login))
        .route("/post", post(post_message))
        .route("/poll", get(poll))
        .route("/logout", post(logout))
        .layer(DefaultBodyLimit::max(64 * 1024))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
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
    inactivity_secs: i64,
    poll_limit: usize,
    max_message_chars: usize,
}

#[derive(Deserialize)]
struct LoginRequest {
    nickname: String,
}

#[derive(Serialize)]
struct LoginResponse {
    token: String,
    nickname: String,
    joined_at: i64,
}

#[derive(Deserialize)]
struct PostRequest {
    text: String,
}

#[derive(Serialize)]
struct OkResponse {
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
        inactivity_secs: state.chat.inactivity_secs(),
        poll_limit: state.chat.poll_limit(),
        max_message_chars: state.chat.max_message_chars(),
    })
}

async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ServerError> {
    let chat = state.chat.clone();
    let session = run_blocking(move || chat.login(&req.nickname)).await?;

    info!(nick = %session.nickname, "Login via API");

    Ok(Json(LoginResponse {
        token: session.token.to_string(),
        nickname: session.nickname.to_string(),
        joined_at: session.joined_at,
    }))
}

async fn post_message(
    headers: HeaderMap,
    State(state): State<AppState>,
    Json(req): Json<PostRequest>,
) -> Result<Json<OkResponse>, ServerError> {
    let token = session_token(&headers);
    let chat = state.chat.clone();
    run_blocking(move || chat.post(token.as_ref(), &req.text)).await?;
    Ok(Json(OkResponse { ok: true }))
}

async fn poll(
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Result<Json<PollResult>, ServerError> {
    let token = session_token(&headers);
    let chat = state.chat.clone();
    let result = run_blocking(move || chat.poll(token.as_ref())).await?;
    Ok(Json(result))
}

async fn logout(
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Result<Json<OkResponse>, ServerError> {
    let token = session_token(&headers);
    let chat = state.chat.clone();
    run_blocking(move || chat.logout(token.as_ref())).await?;
    Ok(Json(OkResponse { ok: true }))
}

/// The caller's session token from `Authorization: Bearer <token>`.
fn session_token(headers: &HeaderMap) -> Option<SessionToken> {
    let auth = headers.get("authorization")?.to_str().ok()?;
    let token = auth.strip_prefix("Bearer ").unwrap_or(auth);
    SessionToken::parse(token).ok()
}

/// Store operations block on file locks; keep them off the async workers.
async fn run_blocking<T, F>(f: F) -> Result<T, ServerError>
where
    F: FnOnce() -> Result<T, ChatError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ServerError::Internal(format!("Blocking task failed: {e}")))?
        .map_err(ServerError::from)
}

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting HTTP API server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

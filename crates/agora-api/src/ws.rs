use axum::{
    extract::{Query, State, WebSocketUpgrade},
    http::{HeaderMap, header},
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::debug;

use agora_ai::live::setup_message;
use agora_gateway::{connection, live_relay};
use agora_types::api::Claims;

use crate::error::{ApiError, ApiResult};
use crate::middleware::decode_token;
use crate::state::AppState;

/// Browsers cannot set headers on a WebSocket handshake, so the token may
/// also come as `?token=`.
#[derive(Debug, Deserialize)]
pub struct UpgradeQuery {
    pub token: Option<String>,
    pub system: Option<String>,
}

fn authenticate(state: &AppState, headers: &HeaderMap, query: &UpgradeQuery) -> ApiResult<Claims> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .or(query.token.as_deref())
        .ok_or(ApiError::Unauthorized)?;
    decode_token(token, &state.jwt_secret)
}

/// GET /gateway: Realtime channel and private-chat feeds.
pub async fn gateway_upgrade(
    State(state): State<AppState>,
    Query(query): Query<UpgradeQuery>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> ApiResult<impl IntoResponse> {
    let claims = authenticate(&state, &headers, &query)?;
    let ctx = state.gateway();

    Ok(ws.on_upgrade(move |socket| connection::handle_connection(socket, ctx, claims.sub)))
}

/// GET /ai/live: Voice session relayed to the assistant's live endpoint.
pub async fn live_upgrade(
    State(state): State<AppState>,
    Query(query): Query<UpgradeQuery>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> ApiResult<impl IntoResponse> {
    let claims = authenticate(&state, &headers, &query)?;
    let upstream_url = state.ai.live_url()?;
    let setup = setup_message(&state.live_model, query.system.as_deref());

    debug!("Live session requested by {}", claims.sub);
    Ok(ws.on_upgrade(move |socket| live_relay::relay(socket, upstream_url, setup, claims.sub)))
}

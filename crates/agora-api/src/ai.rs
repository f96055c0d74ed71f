use axum::{Extension, Json, extract::State};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;
use tracing::debug;

use agora_types::ai::{AiReply, ChatRequest, VisionRequest};
use agora_types::api::Claims;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Turns kept from the end of a conversation.
const MAX_TURNS: usize = 40;

pub async fn chat(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(mut req): Json<ChatRequest>,
) -> ApiResult<Json<AiReply>> {
    if req.messages.is_empty() {
        return Err(ApiError::bad_request("messages must not be empty"));
    }
    if req.messages.len() > MAX_TURNS {
        req.messages.drain(..req.messages.len() - MAX_TURNS);
    }

    debug!("Assistant chat for {} ({} turns)", claims.sub, req.messages.len());
    let reply = state.ai.chat(&req).await?;
    Ok(Json(AiReply { reply }))
}

pub async fn vision(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<VisionRequest>,
) -> ApiResult<Json<AiReply>> {
    let data = req
        .image_base64
        .split_once(";base64,")
        .map(|(_, d)| d)
        .unwrap_or(&req.image_base64);
    if B64.decode(data).is_err() {
        return Err(ApiError::bad_request("image_base64 is not valid base64"));
    }

    debug!("Assistant vision request for {}", claims.sub);
    let reply = state.ai.vision(&req).await?;
    Ok(Json(AiReply { reply }))
}

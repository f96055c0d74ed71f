use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;
use uuid::Uuid;

use agora_types::api::{
    ChatSummary, Claims, MarkReadResponse, OpenChatRequest, PageQuery, SendMessageRequest,
};
use agora_types::models::{NewPrivateMessage, PrivateChat, PrivateMessage};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use crate::validate;

/// The chat, when `user_id` is one of its two participants.
async fn chat_for_participant(state: &AppState, chat_id: Uuid, user_id: Uuid) -> ApiResult<PrivateChat> {
    let chat = state
        .db
        .get_chat(chat_id)
        .await?
        .ok_or(ApiError::NotFound("chat"))?;
    if !chat.has_participant(user_id) {
        return Err(ApiError::Forbidden("not a participant of this chat"));
    }
    Ok(chat)
}

pub async fn list_chats(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<Vec<ChatSummary>>> {
    let chats = state.db.chats_for_user(claims.sub).await?;
    let peer_ids: Vec<Uuid> = chats.iter().filter_map(|c| c.peer_of(claims.sub)).collect();
    let peers = state.db.profile_map(&peer_ids).await?;

    let summaries = chats
        .into_iter()
        .filter_map(|chat| {
            let peer_id = chat.peer_of(claims.sub)?;
            Some(ChatSummary {
                id: chat.id,
                peer: peers.get(&peer_id).cloned(),
                peer_id,
                created_at: chat.created_at,
            })
        })
        .collect();
    Ok(Json(summaries))
}

/// POST /chats: Returns the existing chat with the peer or opens one.
pub async fn open_chat(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<OpenChatRequest>,
) -> ApiResult<Json<ChatSummary>> {
    if req.peer_id == claims.sub {
        return Err(ApiError::bad_request("cannot open a chat with yourself"));
    }
    let peer = state
        .db
        .get_profile(req.peer_id)
        .await?
        .ok_or(ApiError::NotFound("user"))?;

    let chat = state.db.get_or_create_chat(claims.sub, req.peer_id).await?;
    info!("Chat {} open between {} and {}", chat.id, claims.sub, req.peer_id);

    Ok(Json(ChatSummary {
        id: chat.id,
        peer_id: peer.id,
        peer: Some(peer),
        created_at: chat.created_at,
    }))
}

pub async fn get_messages(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(chat_id): Path<Uuid>,
    Query(page): Query<PageQuery>,
) -> ApiResult<Json<Vec<PrivateMessage>>> {
    chat_for_participant(&state, chat_id, claims.sub).await?;
    let messages = state
        .db
        .private_messages(chat_id, validate::page_limit(page.limit), page.before)
        .await?;
    Ok(Json(messages))
}

pub async fn send_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(chat_id): Path<Uuid>,
    Json(req): Json<SendMessageRequest>,
) -> ApiResult<impl IntoResponse> {
    let content = validate::text("content", &req.content, validate::MAX_MESSAGE_LEN)?;
    chat_for_participant(&state, chat_id, claims.sub).await?;

    let message = state
        .db
        .create_private_message(&NewPrivateMessage {
            chat_id,
            sender_id: claims.sub,
            content,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(message)))
}

pub async fn mark_read(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(chat_id): Path<Uuid>,
) -> ApiResult<Json<MarkReadResponse>> {
    chat_for_participant(&state, chat_id, claims.sub).await?;
    let updated = state.db.mark_chat_read(chat_id, claims.sub).await?;
    Ok(Json(MarkReadResponse { updated }))
}

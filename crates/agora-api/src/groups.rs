use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;
use uuid::Uuid;

use agora_types::api::{
    Claims, CreateChannelRequest, CreateGroupRequest, PageQuery, SendMessageRequest,
};
use agora_types::models::{
    Channel, Group, GroupMember, MemberRole, Message, NewChannel, NewGroup, NewMessage,
};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use crate::validate;

const GROUP_LIST_LIMIT: u32 = 100;

/// Membership of `user_id` in `group_id`, or 403.
pub async fn require_member(
    state: &AppState,
    group_id: Uuid,
    user_id: Uuid,
) -> ApiResult<GroupMember> {
    state
        .db
        .get_membership(group_id, user_id)
        .await?
        .ok_or(ApiError::Forbidden("not a member of this group"))
}

/// The group, when `user_id` may read its content: anyone for public
/// groups, members only for private ones.
pub async fn require_reader(state: &AppState, group_id: Uuid, user_id: Uuid) -> ApiResult<Group> {
    let group = state
        .db
        .get_group(group_id)
        .await?
        .ok_or(ApiError::NotFound("group"))?;
    if group.is_private {
        require_member(state, group_id, user_id).await?;
    }
    Ok(group)
}

pub async fn list_groups(State(state): State<AppState>) -> ApiResult<Json<Vec<Group>>> {
    Ok(Json(state.db.list_groups(GROUP_LIST_LIMIT).await?))
}

pub async fn create_group(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateGroupRequest>,
) -> ApiResult<impl IntoResponse> {
    let name = validate::text("name", &req.name, validate::MAX_NAME_LEN)?;
    let description = validate::optional_text("description", req.description.as_deref(), 1000)?;

    let group = state
        .db
        .create_group(&NewGroup {
            name,
            description,
            created_by: claims.sub,
            is_private: req.is_private,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(group)))
}

pub async fn get_group(
    State(state): State<AppState>,
    Path(group_id): Path<Uuid>,
) -> ApiResult<Json<Group>> {
    let group = state
        .db
        .get_group(group_id)
        .await?
        .ok_or(ApiError::NotFound("group"))?;
    Ok(Json(group))
}

/// Public groups only; private groups are joined by invitation.
pub async fn join_group(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(group_id): Path<Uuid>,
) -> ApiResult<Json<GroupMember>> {
    let group = state
        .db
        .get_group(group_id)
        .await?
        .ok_or(ApiError::NotFound("group"))?;
    if group.is_private {
        return Err(ApiError::Forbidden("group is private"));
    }

    let member = state.db.join_group(group_id, claims.sub).await?;
    info!("{} joined group {}", claims.sub, group_id);
    Ok(Json(member))
}

pub async fn leave_group(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(group_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    if state.db.leave_group(group_id, claims.sub).await? {
        info!("{} left group {}", claims.sub, group_id);
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound("membership"))
    }
}

pub async fn list_members(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(group_id): Path<Uuid>,
) -> ApiResult<Json<Vec<GroupMember>>> {
    require_reader(&state, group_id, claims.sub).await?;
    Ok(Json(state.db.group_members(group_id).await?))
}

// -- Channels --

pub async fn list_channels(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(group_id): Path<Uuid>,
) -> ApiResult<Json<Vec<Channel>>> {
    require_member(&state, group_id, claims.sub).await?;
    Ok(Json(state.db.channels_for_group(group_id).await?))
}

/// Group admins create channels.
pub async fn create_channel(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(group_id): Path<Uuid>,
    Json(req): Json<CreateChannelRequest>,
) -> ApiResult<impl IntoResponse> {
    let name = validate::text("name", &req.name, validate::MAX_NAME_LEN)?;
    let description = validate::optional_text("description", req.description.as_deref(), 1000)?;

    let member = require_member(&state, group_id, claims.sub).await?;
    if member.role != MemberRole::Admin {
        return Err(ApiError::Forbidden("only group admins may create channels"));
    }

    let channel = state
        .db
        .create_channel(&NewChannel {
            group_id,
            name,
            description,
        })
        .await?;
    info!("Channel {} created in group {}", channel.id, group_id);
    Ok((StatusCode::CREATED, Json(channel)))
}

async fn channel_for_member(state: &AppState, channel_id: Uuid, user_id: Uuid) -> ApiResult<Channel> {
    let channel = state
        .db
        .get_channel(channel_id)
        .await?
        .ok_or(ApiError::NotFound("channel"))?;
    require_member(state, channel.group_id, user_id).await?;
    Ok(channel)
}

pub async fn get_messages(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(channel_id): Path<Uuid>,
    Query(page): Query<PageQuery>,
) -> ApiResult<Json<Vec<Message>>> {
    channel_for_member(&state, channel_id, claims.sub).await?;
    let messages = state
        .db
        .channel_messages(channel_id, validate::page_limit(page.limit), page.before)
        .await?;
    Ok(Json(messages))
}

/// Subscribers of the channel feed receive the row through the realtime
/// stream; nothing is broadcast from here.
pub async fn send_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(channel_id): Path<Uuid>,
    Json(req): Json<SendMessageRequest>,
) -> ApiResult<impl IntoResponse> {
    let content = validate::text("content", &req.content, validate::MAX_MESSAGE_LEN)?;
    channel_for_member(&state, channel_id, claims.sub).await?;

    let message = state
        .db
        .create_message(&NewMessage {
            channel_id,
            user_id: claims.sub,
            content,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(message)))
}

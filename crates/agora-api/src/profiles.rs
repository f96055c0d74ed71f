use axum::{
    Extension, Json,
    body::Bytes,
    extract::{Path, Query, State},
    http::HeaderMap,
    response::IntoResponse,
};
use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use agora_types::api::{Claims, ProfileSearchQuery, UpdateProfileRequest, UploadResponse};
use agora_types::models::{Bucket, Profile, ProfilePatch};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use crate::uploads::{self, UploadKind};
use crate::validate;

const SEARCH_LIMIT: u32 = 20;

pub async fn get_me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<Profile>> {
    let profile = state
        .db
        .get_profile(claims.sub)
        .await?
        .ok_or(ApiError::NotFound("profile"))?;
    Ok(Json(profile))
}

/// PUT /profiles/me: Creates the row on first save.
pub async fn update_me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdateProfileRequest>,
) -> ApiResult<Json<Profile>> {
    let existing = state.db.get_profile(claims.sub).await?;

    let username = match req.username.as_deref() {
        Some(name) => Some(validate::username(name)?),
        None if existing.is_none() => {
            return Err(ApiError::bad_request("username is required"));
        }
        None => None,
    };

    if let Some(name) = &username {
        if state.db.username_taken(name, claims.sub).await? {
            return Err(ApiError::Conflict("username already taken"));
        }
    }

    let patch = ProfilePatch {
        id: existing.is_none().then_some(claims.sub),
        username,
        full_name: validate::optional_text("full_name", req.full_name.as_deref(), validate::MAX_NAME_LEN)?,
        bio: validate::optional_text("bio", req.bio.as_deref(), 500)?,
        university: validate::optional_text("university", req.university.as_deref(), validate::MAX_NAME_LEN)?,
        updated_at: Utc::now(),
        ..Default::default()
    };

    let profile = match existing {
        Some(_) => state
            .db
            .update_profile(claims.sub, &patch)
            .await?
            .ok_or(ApiError::NotFound("profile"))?,
        None => state.db.upsert_profile(&patch).await?,
    };
    info!("Profile {} updated", profile.id);
    Ok(Json(profile))
}

pub async fn get_profile(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> ApiResult<Json<Profile>> {
    let profile = state
        .db
        .get_profile(user_id)
        .await?
        .ok_or(ApiError::NotFound("profile"))?;
    Ok(Json(profile))
}

pub async fn search_profiles(
    State(state): State<AppState>,
    Query(query): Query<ProfileSearchQuery>,
) -> ApiResult<Json<Vec<Profile>>> {
    let term = query.q.trim();
    if term.is_empty() {
        return Ok(Json(vec![]));
    }
    Ok(Json(state.db.search_profiles(term, SEARCH_LIMIT).await?))
}

/// POST /profiles/me/avatar: Raw image bytes. The previous avatar object
/// is removed once the profile points at the new one.
pub async fn upload_avatar(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    headers: HeaderMap,
    bytes: Bytes,
) -> ApiResult<impl IntoResponse> {
    let content_type = uploads::check(UploadKind::Image, &headers, &bytes)?;
    let previous = state
        .db
        .get_profile(claims.sub)
        .await?
        .ok_or(ApiError::NotFound("profile"))?
        .avatar_url;

    let size = bytes.len() as u64;
    let url = uploads::store(&state.db, Bucket::Avatars, claims.sub, bytes, &content_type).await?;

    let patch = ProfilePatch {
        avatar_url: Some(url.clone()),
        updated_at: Utc::now(),
        ..Default::default()
    };
    state.db.update_profile(claims.sub, &patch).await?;

    if let Some(old) = previous.and_then(|u| state.db.object_path_from_url(Bucket::Avatars, &u)) {
        if let Err(e) = state.db.remove(Bucket::Avatars, &[old]).await {
            warn!("Failed to remove old avatar of {}: {}", claims.sub, e);
        }
    }

    Ok(Json(UploadResponse { url, size }))
}

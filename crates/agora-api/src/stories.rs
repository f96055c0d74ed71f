use axum::{
    Extension, Json,
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use agora_db::queries::story_expiry;
use agora_types::api::{Claims, CreateStoryQuery};
use agora_types::models::{Bucket, MediaType, NewStory, Story};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use crate::uploads::{self, UploadKind};
use crate::validate;

pub async fn list_stories(State(state): State<AppState>) -> ApiResult<Json<Vec<Story>>> {
    Ok(Json(state.db.active_stories(Utc::now()).await?))
}

/// POST /stories?media_type=&caption=: Raw media bytes.
pub async fn create_story(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<CreateStoryQuery>,
    headers: HeaderMap,
    bytes: Bytes,
) -> ApiResult<impl IntoResponse> {
    let content_type = uploads::check(UploadKind::Media, &headers, &bytes)?;
    let declared_video = query.media_type == MediaType::Video;
    if declared_video != content_type.starts_with("video/") {
        return Err(ApiError::bad_request("media_type does not match content type"));
    }
    let caption = validate::optional_text("caption", query.caption.as_deref(), 500)?;

    let media_url = uploads::store(&state.db, Bucket::Stories, claims.sub, bytes, &content_type).await?;
    let story = state
        .db
        .create_story(&NewStory {
            user_id: claims.sub,
            media_url,
            media_type: query.media_type,
            caption,
            expires_at: story_expiry(Utc::now()),
        })
        .await?;
    info!("Story {} posted by {}", story.id, claims.sub);
    Ok((StatusCode::CREATED, Json(story)))
}

pub async fn delete_story(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(story_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let removed = state
        .db
        .delete_story(story_id, claims.sub)
        .await?
        .ok_or(ApiError::NotFound("story"))?;

    if let Some(path) = state.db.object_path_from_url(Bucket::Stories, &removed.media_url) {
        if let Err(e) = state.db.remove(Bucket::Stories, &[path]).await {
            warn!("Failed to remove media of story {}: {}", story_id, e);
        }
    }
    Ok(StatusCode::NO_CONTENT)
}

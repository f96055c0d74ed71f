use std::collections::{BTreeMap, HashMap};

use axum::{
    Extension, Json,
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use tracing::{info, warn};
use uuid::Uuid;

use agora_types::api::{
    Claims, CommentResponse, CreateCommentRequest, CreatePostRequest, FeedQuery, PageQuery,
    PostResponse, ReactionGroup, ToggleReactionRequest, ToggleReactionResponse, UploadResponse,
};
use agora_types::models::{Bucket, NewComment, NewPost, Post, Reaction};

use crate::error::{ApiError, ApiResult};
use crate::groups::{require_member, require_reader};
use crate::state::AppState;
use crate::uploads::{self, UploadKind};
use crate::validate;

/// Reactions per post, grouped by type in name order.
pub fn group_reactions(reactions: &[Reaction]) -> HashMap<Uuid, Vec<ReactionGroup>> {
    let mut by_post: HashMap<Uuid, BTreeMap<&str, Vec<Uuid>>> = HashMap::new();
    for r in reactions {
        by_post
            .entry(r.post_id)
            .or_default()
            .entry(r.reaction_type.as_str())
            .or_default()
            .push(r.user_id);
    }

    by_post
        .into_iter()
        .map(|(post_id, types)| {
            let groups = types
                .into_iter()
                .map(|(reaction_type, user_ids)| ReactionGroup {
                    reaction_type: reaction_type.to_string(),
                    count: user_ids.len(),
                    user_ids,
                })
                .collect();
            (post_id, groups)
        })
        .collect()
}

/// Attach authors, comment counts and reactions to a page of posts.
async fn hydrate(state: &AppState, posts: Vec<Post>) -> ApiResult<Vec<PostResponse>> {
    let post_ids: Vec<Uuid> = posts.iter().map(|p| p.id).collect();
    let author_ids: Vec<Uuid> = posts.iter().map(|p| p.user_id).collect();

    let authors = state.db.profile_map(&author_ids).await?;
    let counts = state.db.comment_counts(&post_ids).await?;
    let mut reactions = group_reactions(&state.db.reactions_for_posts(&post_ids).await?);

    Ok(posts
        .into_iter()
        .map(|post| PostResponse {
            author: authors.get(&post.user_id).cloned(),
            comment_count: counts.get(&post.id).copied().unwrap_or(0),
            reactions: reactions.remove(&post.id).unwrap_or_default(),
            post,
        })
        .collect())
}

/// The post, when `user_id` may see it. Posts in private groups are for
/// members only.
async fn post_for_viewer(state: &AppState, post_id: Uuid, user_id: Uuid) -> ApiResult<Post> {
    let post = state
        .db
        .get_post(post_id)
        .await?
        .ok_or(ApiError::NotFound("post"))?;
    if let Some(group_id) = post.group_id {
        require_reader(state, group_id, user_id).await?;
    }
    Ok(post)
}

pub async fn feed(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<FeedQuery>,
) -> ApiResult<Json<Vec<PostResponse>>> {
    if let Some(group_id) = query.group_id {
        require_reader(&state, group_id, claims.sub).await?;
    }

    let posts = state
        .db
        .feed_posts(query.group_id, validate::page_limit(query.limit), query.before)
        .await?;
    Ok(Json(hydrate(&state, posts).await?))
}

/// GET /users/{id}/posts: Skips posts in private groups the caller is not in.
pub async fn user_posts(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(user_id): Path<Uuid>,
    Query(page): Query<PageQuery>,
) -> ApiResult<Json<Vec<PostResponse>>> {
    let visible = state.db.visible_group_ids(claims.sub).await?;
    let posts = state
        .db
        .posts_by_user(user_id, &visible, validate::page_limit(page.limit), page.before)
        .await?;
    Ok(Json(hydrate(&state, posts).await?))
}

pub async fn create_post(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreatePostRequest>,
) -> ApiResult<impl IntoResponse> {
    let content = validate::text("content", &req.content, validate::MAX_POST_LEN)?;
    if let Some(group_id) = req.group_id {
        require_member(&state, group_id, claims.sub).await?;
    }

    let post = state
        .db
        .create_post(&NewPost {
            user_id: claims.sub,
            content,
            group_id: req.group_id,
        })
        .await?;
    info!("Post {} created by {}", post.id, claims.sub);

    let mut hydrated = hydrate(&state, vec![post]).await?;
    let created = hydrated.pop().ok_or(ApiError::NotFound("post"))?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn delete_post(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(post_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let post = state
        .db
        .get_post(post_id)
        .await?
        .ok_or(ApiError::NotFound("post"))?;
    if post.user_id != claims.sub {
        return Err(ApiError::Forbidden("only the author may delete a post"));
    }

    let removed = state
        .db
        .delete_post(post_id, claims.sub)
        .await?
        .ok_or(ApiError::NotFound("post"))?;

    if let Some(path) = removed
        .image_url
        .as_deref()
        .and_then(|u| state.db.object_path_from_url(Bucket::PostImages, u))
    {
        if let Err(e) = state.db.remove(Bucket::PostImages, &[path]).await {
            warn!("Failed to remove image of post {}: {}", post_id, e);
        }
    }

    Ok(StatusCode::NO_CONTENT)
}

/// POST /posts/{id}/image: Raw image bytes for a post the caller wrote.
pub async fn upload_image(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(post_id): Path<Uuid>,
    headers: HeaderMap,
    bytes: Bytes,
) -> ApiResult<impl IntoResponse> {
    let content_type = uploads::check(UploadKind::Image, &headers, &bytes)?;
    let post = state
        .db
        .get_post(post_id)
        .await?
        .ok_or(ApiError::NotFound("post"))?;
    if post.user_id != claims.sub {
        return Err(ApiError::Forbidden("only the author may attach an image"));
    }

    let size = bytes.len() as u64;
    let url = uploads::store(&state.db, Bucket::PostImages, claims.sub, bytes, &content_type).await?;
    state
        .db
        .set_post_image(post_id, &url)
        .await?
        .ok_or(ApiError::NotFound("post"))?;

    Ok((StatusCode::CREATED, Json(UploadResponse { url, size })))
}

// -- Comments --

pub async fn list_comments(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(post_id): Path<Uuid>,
) -> ApiResult<Json<Vec<CommentResponse>>> {
    post_for_viewer(&state, post_id, claims.sub).await?;
    let comments = state.db.comments_for_post(post_id).await?;
    let author_ids: Vec<Uuid> = comments.iter().map(|c| c.user_id).collect();
    let authors = state.db.profile_map(&author_ids).await?;

    Ok(Json(
        comments
            .into_iter()
            .map(|comment| CommentResponse {
                author: authors.get(&comment.user_id).cloned(),
                comment,
            })
            .collect(),
    ))
}

pub async fn create_comment(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(post_id): Path<Uuid>,
    Json(req): Json<CreateCommentRequest>,
) -> ApiResult<impl IntoResponse> {
    let content = validate::text("content", &req.content, validate::MAX_COMMENT_LEN)?;
    post_for_viewer(&state, post_id, claims.sub).await?;

    let comment = state
        .db
        .create_comment(&NewComment {
            post_id,
            user_id: claims.sub,
            content,
        })
        .await?;
    let author = state.db.get_profile(claims.sub).await?;

    Ok((StatusCode::CREATED, Json(CommentResponse { comment, author })))
}

pub async fn delete_comment(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(comment_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    if state.db.delete_comment(comment_id, claims.sub).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        // Either missing or someone else's; don't reveal which.
        Err(ApiError::NotFound("comment"))
    }
}

// -- Reactions --

pub async fn list_reactions(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(post_id): Path<Uuid>,
) -> ApiResult<Json<Vec<ReactionGroup>>> {
    post_for_viewer(&state, post_id, claims.sub).await?;
    let reactions = state.db.reactions_for_posts(&[post_id]).await?;
    let mut grouped = group_reactions(&reactions);
    Ok(Json(grouped.remove(&post_id).unwrap_or_default()))
}

pub async fn toggle_reaction(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(post_id): Path<Uuid>,
    Json(req): Json<ToggleReactionRequest>,
) -> ApiResult<Json<ToggleReactionResponse>> {
    let reaction_type = validate::reaction_type(&req.reaction_type)?;
    post_for_viewer(&state, post_id, claims.sub).await?;

    let added = state
        .db
        .toggle_reaction(post_id, claims.sub, &reaction_type)
        .await?;
    Ok(Json(ToggleReactionResponse { added }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn reaction(post_id: Uuid, user_id: Uuid, kind: &str) -> Reaction {
        Reaction {
            id: Uuid::new_v4(),
            post_id,
            user_id,
            reaction_type: kind.to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn reactions_group_per_post_and_type() {
        let (p1, p2) = (Uuid::new_v4(), Uuid::new_v4());
        let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());
        let rows = vec![
            reaction(p1, alice, "like"),
            reaction(p1, bob, "like"),
            reaction(p1, bob, "love"),
            reaction(p2, alice, "sad"),
        ];

        let grouped = group_reactions(&rows);
        let first = &grouped[&p1];
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].reaction_type, "like");
        assert_eq!(first[0].count, 2);
        assert_eq!(first[0].user_ids, vec![alice, bob]);
        assert_eq!(first[1].reaction_type, "love");
        assert_eq!(grouped[&p2][0].count, 1);
    }
}

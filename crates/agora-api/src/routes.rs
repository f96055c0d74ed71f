use axum::{
    Json, Router,
    extract::DefaultBodyLimit,
    middleware,
    routing::{delete, get, post},
};
use serde_json::{Value, json};

use crate::middleware::require_auth;
use crate::state::AppState;
use crate::uploads::MAX_MEDIA_SIZE;
use crate::{ai, books, chats, geocode, groups, posts, profiles, rides, stories, ws};

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// All HTTP and WebSocket routes. CORS and tracing layers are added by the
/// binary.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new().route("/health", get(health));

    let protected_routes = Router::new()
        // Profiles
        .route("/profiles", get(profiles::search_profiles))
        .route("/profiles/me", get(profiles::get_me).put(profiles::update_me))
        .route("/profiles/me/avatar", post(profiles::upload_avatar))
        .route("/profiles/{user_id}", get(profiles::get_profile))
        // Posts, comments, reactions
        .route("/posts", get(posts::feed).post(posts::create_post))
        .route("/posts/{post_id}", delete(posts::delete_post))
        .route("/posts/{post_id}/image", post(posts::upload_image))
        .route(
            "/posts/{post_id}/comments",
            get(posts::list_comments).post(posts::create_comment),
        )
        .route(
            "/posts/{post_id}/reactions",
            get(posts::list_reactions).post(posts::toggle_reaction),
        )
        .route("/comments/{comment_id}", delete(posts::delete_comment))
        .route("/users/{user_id}/posts", get(posts::user_posts))
        // Groups and channels
        .route("/groups", get(groups::list_groups).post(groups::create_group))
        .route("/groups/{group_id}", get(groups::get_group))
        .route("/groups/{group_id}/join", post(groups::join_group))
        .route("/groups/{group_id}/leave", post(groups::leave_group))
        .route("/groups/{group_id}/members", get(groups::list_members))
        .route(
            "/groups/{group_id}/channels",
            get(groups::list_channels).post(groups::create_channel),
        )
        .route(
            "/channels/{channel_id}/messages",
            get(groups::get_messages).post(groups::send_message),
        )
        // Private chats
        .route("/chats", get(chats::list_chats).post(chats::open_chat))
        .route(
            "/chats/{chat_id}/messages",
            get(chats::get_messages).post(chats::send_message),
        )
        .route("/chats/{chat_id}/read", post(chats::mark_read))
        // Rides
        .route(
            "/rides/requests",
            get(rides::list_requests).post(rides::create_request),
        )
        .route("/rides/requests/{request_id}", delete(rides::cancel_request))
        .route("/rides/requests/{request_id}/match", post(rides::match_request))
        .route("/rides/offers", get(rides::list_offers).post(rides::create_offer))
        .route("/rides/offers/{offer_id}", delete(rides::cancel_offer))
        .route("/rides/matches", get(rides::list_matches).post(rides::create_match))
        .route("/rides/matches/{match_id}/accept", post(rides::accept_match))
        .route("/rides/matches/{match_id}/reject", post(rides::reject_match))
        .route("/geocode/reverse", get(geocode::reverse))
        // Stories and books
        .route("/stories", get(stories::list_stories).post(stories::create_story))
        .route("/stories/{story_id}", delete(stories::delete_story))
        .route("/books", get(books::list_books).post(books::create_book))
        .route("/books/files", post(books::upload_file))
        .route("/books/{book_id}", get(books::get_book).delete(books::delete_book))
        // Assistant
        .route("/ai/chat", post(ai::chat))
        .route("/ai/vision", post(ai::vision))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth));

    // WebSocket routes authenticate at upgrade time.
    let ws_routes = Router::new()
        .route("/gateway", get(ws::gateway_upgrade))
        .route("/ai/live", get(ws::live_upgrade));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .merge(ws_routes)
        .layer(DefaultBodyLimit::max(MAX_MEDIA_SIZE))
        .with_state(state)
}

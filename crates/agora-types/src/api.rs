use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Comment, Post, Profile};

// -- JWT Claims --

/// Claims carried by access tokens issued by the hosted auth service.
/// Shared between the REST middleware and the gateway upgrade check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default = "default_role")]
    pub role: String,
    pub aud: String,
    pub exp: usize,
}

fn default_role() -> String {
    "authenticated".to_string()
}

/// Audience the auth service stamps on user tokens.
pub const TOKEN_AUDIENCE: &str = "authenticated";

// -- Errors --

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

// -- Pagination --

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
    /// Cursor: `created_at` of the oldest item of the previous page.
    pub before: Option<DateTime<Utc>>,
}

pub fn default_limit() -> u32 {
    50
}

pub const MAX_PAGE_SIZE: u32 = 100;

// -- Profiles --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateProfileRequest {
    pub username: Option<String>,
    pub full_name: Option<String>,
    pub bio: Option<String>,
    pub university: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ProfileSearchQuery {
    pub q: String,
}

// -- Posts --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreatePostRequest {
    pub content: String,
    pub group_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct FeedQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
    pub before: Option<DateTime<Utc>>,
    pub group_id: Option<Uuid>,
}

/// Post with its author and engagement counters, as the feed renders it.
#[derive(Debug, Serialize, Deserialize)]
pub struct PostResponse {
    #[serde(flatten)]
    pub post: Post,
    pub author: Option<Profile>,
    pub comment_count: usize,
    pub reactions: Vec<ReactionGroup>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateCommentRequest {
    pub content: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CommentResponse {
    #[serde(flatten)]
    pub comment: Comment,
    pub author: Option<Profile>,
}

// -- Reactions --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToggleReactionRequest {
    pub reaction_type: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ToggleReactionResponse {
    pub added: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReactionGroup {
    pub reaction_type: String,
    pub count: usize,
    pub user_ids: Vec<Uuid>,
}

// -- Groups and channels --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateGroupRequest {
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub is_private: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateChannelRequest {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageRequest {
    pub content: String,
}

// -- Private chats --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OpenChatRequest {
    pub peer_id: Uuid,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatSummary {
    pub id: Uuid,
    pub peer: Option<Profile>,
    pub peer_id: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MarkReadResponse {
    pub updated: usize,
}

// -- Rides --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateRideRequestRequest {
    pub origin: String,
    pub destination: String,
    pub departure_time: DateTime<Utc>,
    pub seats_needed: i32,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateRideOfferRequest {
    pub origin: String,
    pub destination: String,
    pub departure_time: DateTime<Utc>,
    pub seats_available: i32,
    pub price: Option<f64>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateMatchRequest {
    pub request_id: Uuid,
    pub offer_id: Uuid,
}

pub const MAX_RIDE_SEATS: i32 = 8;

// -- Geocoding --

#[derive(Debug, Deserialize)]
pub struct ReverseGeocodeQuery {
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GeocodeResponse {
    pub display_name: String,
    #[serde(default)]
    pub address: serde_json::Value,
}

// -- Stories --

#[derive(Debug, Deserialize)]
pub struct CreateStoryQuery {
    pub media_type: crate::models::MediaType,
    pub caption: Option<String>,
}

// -- Books --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateBookRequest {
    pub title: String,
    pub author: String,
    pub subject: Option<String>,
    pub description: Option<String>,
    pub file_url: Option<String>,
    pub cover_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct BookSearchQuery {
    pub q: Option<String>,
    pub subject: Option<String>,
}

// -- Uploads --

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    pub url: String,
    pub size: u64,
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Tables exposed by the hosted database. Row shapes below mirror the
/// columns one to one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Profiles,
    Posts,
    Comments,
    Reactions,
    Groups,
    GroupMembers,
    Channels,
    Messages,
    PrivateChats,
    PrivateMessages,
    RideRequests,
    RideOffers,
    RideMatches,
    Stories,
    Books,
}

impl Table {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Profiles => "profiles",
            Self::Posts => "posts",
            Self::Comments => "comments",
            Self::Reactions => "reactions",
            Self::Groups => "groups",
            Self::GroupMembers => "group_members",
            Self::Channels => "channels",
            Self::Messages => "messages",
            Self::PrivateChats => "private_chats",
            Self::PrivateMessages => "private_messages",
            Self::RideRequests => "ride_requests",
            Self::RideOffers => "ride_offers",
            Self::RideMatches => "ride_matches",
            Self::Stories => "stories",
            Self::Books => "books",
        }
    }
}

impl std::fmt::Display for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Object storage buckets. Objects are laid out as `{user_id}/{uuid}.{ext}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bucket {
    Avatars,
    PostImages,
    Stories,
    Books,
}

impl Bucket {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Avatars => "avatars",
            Self::PostImages => "post-images",
            Self::Stories => "stories",
            Self::Books => "books",
        }
    }

    pub fn object_path(&self, owner: Uuid, extension: &str) -> String {
        format!("{}/{}.{}", owner, Uuid::new_v4(), extension)
    }
}

// -- Profiles --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub id: Uuid,
    pub username: String,
    pub full_name: Option<String>,
    pub avatar_url: Option<String>,
    pub bio: Option<String>,
    pub university: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ProfilePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub university: Option<String>,
    pub updated_at: DateTime<Utc>,
}

// -- Posts, comments, reactions --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: Uuid,
    pub user_id: Uuid,
    pub content: String,
    pub image_url: Option<String>,
    pub group_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewPost {
    pub user_id: Uuid,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub id: Uuid,
    pub post_id: Uuid,
    pub user_id: Uuid,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewComment {
    pub post_id: Uuid,
    pub user_id: Uuid,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reaction {
    pub id: Uuid,
    pub post_id: Uuid,
    pub user_id: Uuid,
    pub reaction_type: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewReaction {
    pub post_id: Uuid,
    pub user_id: Uuid,
    pub reaction_type: String,
}

// -- Groups and channels --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Group {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub avatar_url: Option<String>,
    pub created_by: Uuid,
    pub is_private: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewGroup {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_by: Uuid,
    pub is_private: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberRole {
    Admin,
    Member,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupMember {
    pub id: Uuid,
    pub group_id: Uuid,
    pub user_id: Uuid,
    pub role: MemberRole,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewGroupMember {
    pub group_id: Uuid,
    pub user_id: Uuid,
    pub role: MemberRole,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Channel {
    pub id: Uuid,
    pub group_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewChannel {
    pub group_id: Uuid,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub channel_id: Uuid,
    pub user_id: Uuid,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewMessage {
    pub channel_id: Uuid,
    pub user_id: Uuid,
    pub content: String,
}

// -- Private chats --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrivateChat {
    pub id: Uuid,
    pub user1_id: Uuid,
    pub user2_id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl PrivateChat {
    pub fn has_participant(&self, user_id: Uuid) -> bool {
        self.user1_id == user_id || self.user2_id == user_id
    }

    pub fn peer_of(&self, user_id: Uuid) -> Option<Uuid> {
        if self.user1_id == user_id {
            Some(self.user2_id)
        } else if self.user2_id == user_id {
            Some(self.user1_id)
        } else {
            None
        }
    }
}

/// A participant pair in storage order: `user1_id < user2_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChatPair {
    pub user1_id: Uuid,
    pub user2_id: Uuid,
}

impl ChatPair {
    pub fn new(a: Uuid, b: Uuid) -> Self {
        if a <= b {
            Self { user1_id: a, user2_id: b }
        } else {
            Self { user1_id: b, user2_id: a }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrivateMessage {
    pub id: Uuid,
    pub chat_id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
    #[serde(default)]
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewPrivateMessage {
    pub chat_id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
}

// -- Rides --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RideStatus {
    Open,
    Matched,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RideRequest {
    pub id: Uuid,
    pub user_id: Uuid,
    pub origin: String,
    pub destination: String,
    pub departure_time: DateTime<Utc>,
    pub seats_needed: i32,
    pub status: RideStatus,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewRideRequest {
    pub user_id: Uuid,
    pub origin: String,
    pub destination: String,
    pub departure_time: DateTime<Utc>,
    pub seats_needed: i32,
    pub status: RideStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RideOffer {
    pub id: Uuid,
    pub user_id: Uuid,
    pub origin: String,
    pub destination: String,
    pub departure_time: DateTime<Utc>,
    pub seats_available: i32,
    pub price: Option<f64>,
    pub status: RideStatus,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewRideOffer {
    pub user_id: Uuid,
    pub origin: String,
    pub destination: String,
    pub departure_time: DateTime<Utc>,
    pub seats_available: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    pub status: RideStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchStatus {
    Pending,
    Accepted,
    Rejected,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RideMatch {
    pub id: Uuid,
    pub request_id: Uuid,
    pub offer_id: Uuid,
    pub status: MatchStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewRideMatch {
    pub request_id: Uuid,
    pub offer_id: Uuid,
    pub status: MatchStatus,
}

// -- Stories --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Image,
    Video,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Story {
    pub id: Uuid,
    pub user_id: Uuid,
    pub media_url: String,
    pub media_type: MediaType,
    pub caption: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewStory {
    pub user_id: Uuid,
    pub media_url: String,
    pub media_type: MediaType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    pub expires_at: DateTime<Utc>,
}

/// Stories stay visible for a day.
pub const STORY_LIFETIME_HOURS: i64 = 24;

// -- Books --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Book {
    pub id: Uuid,
    pub title: String,
    pub author: String,
    pub subject: Option<String>,
    pub description: Option<String>,
    pub file_url: Option<String>,
    pub cover_url: Option<String>,
    pub uploaded_by: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewBook {
    pub title: String,
    pub author: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cover_url: Option<String>,
    pub uploaded_by: Uuid,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_pair_is_order_independent() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        assert_eq!(ChatPair::new(a, b), ChatPair::new(b, a));
        let pair = ChatPair::new(a, b);
        assert!(pair.user1_id <= pair.user2_id);
    }

    #[test]
    fn peer_of_non_participant_is_none() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let chat = PrivateChat {
            id: Uuid::new_v4(),
            user1_id: a,
            user2_id: b,
            created_at: Utc::now(),
        };
        assert_eq!(chat.peer_of(a), Some(b));
        assert_eq!(chat.peer_of(b), Some(a));
        assert_eq!(chat.peer_of(Uuid::new_v4()), None);
    }

    #[test]
    fn enums_use_lowercase_wire_names() {
        assert_eq!(serde_json::to_string(&MatchStatus::Pending).unwrap(), "\"pending\"");
        assert_eq!(serde_json::to_string(&MemberRole::Admin).unwrap(), "\"admin\"");
        assert_eq!(serde_json::to_string(&RideStatus::Open).unwrap(), "\"open\"");
    }

    #[test]
    fn object_path_is_scoped_to_owner() {
        let owner = Uuid::new_v4();
        let path = Bucket::PostImages.object_path(owner, "png");
        assert!(path.starts_with(&owner.to_string()));
        assert!(path.ends_with(".png"));
    }

    #[test]
    fn profile_patch_skips_unset_fields() {
        let patch = ProfilePatch {
            bio: Some("hi".into()),
            updated_at: Utc::now(),
            ..Default::default()
        };
        let json = serde_json::to_value(&patch).unwrap();
        assert!(json.get("username").is_none());
        assert_eq!(json["bio"], "hi");
    }
}

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use agora_types::models::*;

use crate::query::{contains_pattern, like_literal};
use crate::{Database, Query, Result};

impl Database {
    // -- Profiles --

    pub async fn get_profile(&self, id: Uuid) -> Result<Option<Profile>> {
        self.select_one(Table::Profiles, Query::new().eq("id", id)).await
    }

    pub async fn get_profiles(&self, ids: &[Uuid]) -> Result<Vec<Profile>> {
        if ids.is_empty() {
            return Ok(vec![]);
        }
        let unique: HashSet<Uuid> = ids.iter().copied().collect();
        self.select(Table::Profiles, &Query::new().in_("id", unique)).await
    }

    /// Profiles keyed by id, for embedding authors into responses.
    pub async fn profile_map(&self, ids: &[Uuid]) -> Result<HashMap<Uuid, Profile>> {
        Ok(self
            .get_profiles(ids)
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect())
    }

    pub async fn search_profiles(&self, term: &str, limit: u32) -> Result<Vec<Profile>> {
        let pattern = contains_pattern(term);
        let query = Query::new()
            .or(&[
                format!("username.ilike.{}", pattern),
                format!("full_name.ilike.{}", pattern),
            ])
            .order("username", false)
            .limit(limit);
        self.select(Table::Profiles, &query).await
    }

    pub async fn username_taken(&self, username: &str, except: Uuid) -> Result<bool> {
        let query = Query::new().eq("username", username).neq("id", except);
        Ok(self
            .select_one::<Profile>(Table::Profiles, query)
            .await?
            .is_some())
    }

    /// `patch.id` selects the row; the row is created when missing.
    pub async fn upsert_profile(&self, patch: &ProfilePatch) -> Result<Profile> {
        self.upsert_one(Table::Profiles, patch).await
    }

    /// Patch an existing profile. `None` when the row does not exist.
    pub async fn update_profile(&self, id: Uuid, patch: &ProfilePatch) -> Result<Option<Profile>> {
        let rows: Vec<Profile> = self
            .update(Table::Profiles, &Query::new().eq("id", id), patch)
            .await?;
        Ok(rows.into_iter().next())
    }

    // -- Posts --

    /// Newest first. Without a group the feed holds only posts outside groups.
    pub async fn feed_posts(
        &self,
        group_id: Option<Uuid>,
        limit: u32,
        before: Option<DateTime<Utc>>,
    ) -> Result<Vec<Post>> {
        let mut query = match group_id {
            Some(gid) => Query::new().eq("group_id", gid),
            None => Query::new().is_null("group_id"),
        };
        if let Some(before) = before {
            query = query.lt_time("created_at", before);
        }
        self.select(Table::Posts, &query.order("created_at", true).limit(limit))
            .await
    }

    /// Newest first, limited to posts outside groups and posts in
    /// `visible_groups`.
    pub async fn posts_by_user(
        &self,
        user_id: Uuid,
        visible_groups: &HashSet<Uuid>,
        limit: u32,
        before: Option<DateTime<Utc>>,
    ) -> Result<Vec<Post>> {
        let mut query = Query::new().eq("user_id", user_id);
        query = if visible_groups.is_empty() {
            query.is_null("group_id")
        } else {
            let ids: Vec<String> = visible_groups.iter().map(Uuid::to_string).collect();
            query.or(&[
                "group_id.is.null".to_string(),
                format!("group_id.in.({})", ids.join(",")),
            ])
        };
        if let Some(before) = before {
            query = query.lt_time("created_at", before);
        }
        self.select(Table::Posts, &query.order("created_at", true).limit(limit))
            .await
    }

    pub async fn get_post(&self, id: Uuid) -> Result<Option<Post>> {
        self.select_one(Table::Posts, Query::new().eq("id", id)).await
    }

    pub async fn create_post(&self, post: &NewPost) -> Result<Post> {
        self.insert_one(Table::Posts, post).await
    }

    pub async fn set_post_image(&self, id: Uuid, image_url: &str) -> Result<Option<Post>> {
        let rows: Vec<Post> = self
            .update(
                Table::Posts,
                &Query::new().eq("id", id),
                &json!({ "image_url": image_url }),
            )
            .await?;
        Ok(rows.into_iter().next())
    }

    /// Deletes only when `owner` wrote the post. Returns the removed row.
    pub async fn delete_post(&self, id: Uuid, owner: Uuid) -> Result<Option<Post>> {
        let rows: Vec<Post> = self
            .delete(Table::Posts, &Query::new().eq("id", id).eq("user_id", owner))
            .await?;
        Ok(rows.into_iter().next())
    }

    // -- Comments --

    pub async fn comments_for_post(&self, post_id: Uuid) -> Result<Vec<Comment>> {
        let query = Query::new()
            .eq("post_id", post_id)
            .order("created_at", false);
        self.select(Table::Comments, &query).await
    }

    pub async fn comment_counts(&self, post_ids: &[Uuid]) -> Result<HashMap<Uuid, usize>> {
        let mut counts = HashMap::new();
        if post_ids.is_empty() {
            return Ok(counts);
        }

        #[derive(serde::Deserialize)]
        struct PostRef {
            post_id: Uuid,
        }

        let rows: Vec<PostRef> = self
            .select(
                Table::Comments,
                &Query::new().select("post_id").in_("post_id", post_ids),
            )
            .await?;
        for row in rows {
            *counts.entry(row.post_id).or_insert(0) += 1;
        }
        Ok(counts)
    }

    pub async fn create_comment(&self, comment: &NewComment) -> Result<Comment> {
        self.insert_one(Table::Comments, comment).await
    }

    pub async fn delete_comment(&self, id: Uuid, owner: Uuid) -> Result<bool> {
        let rows: Vec<Comment> = self
            .delete(Table::Comments, &Query::new().eq("id", id).eq("user_id", owner))
            .await?;
        Ok(!rows.is_empty())
    }

    // -- Reactions --

    pub async fn reactions_for_posts(&self, post_ids: &[Uuid]) -> Result<Vec<Reaction>> {
        if post_ids.is_empty() {
            return Ok(vec![]);
        }
        self.select(Table::Reactions, &Query::new().in_("post_id", post_ids))
            .await
    }

    /// Toggle a reaction: removes it if present, inserts it otherwise.
    /// Returns `true` when the reaction was added.
    pub async fn toggle_reaction(
        &self,
        post_id: Uuid,
        user_id: Uuid,
        reaction_type: &str,
    ) -> Result<bool> {
        let existing = Query::new()
            .eq("post_id", post_id)
            .eq("user_id", user_id)
            .eq("reaction_type", reaction_type);

        let removed: Vec<Reaction> = self.delete(Table::Reactions, &existing).await?;
        if !removed.is_empty() {
            return Ok(false);
        }

        let _: Reaction = self
            .insert_one(
                Table::Reactions,
                &NewReaction {
                    post_id,
                    user_id,
                    reaction_type: reaction_type.to_string(),
                },
            )
            .await?;
        Ok(true)
    }

    // -- Groups --

    pub async fn list_groups(&self, limit: u32) -> Result<Vec<Group>> {
        self.select(
            Table::Groups,
            &Query::new().order("created_at", true).limit(limit),
        )
        .await
    }

    pub async fn get_group(&self, id: Uuid) -> Result<Option<Group>> {
        self.select_one(Table::Groups, Query::new().eq("id", id)).await
    }

    /// Creates the group and enrols its creator as admin. The group row is
    /// removed again when the admin cannot be enrolled.
    pub async fn create_group(&self, group: &NewGroup) -> Result<Group> {
        let created: Group = self.insert_one(Table::Groups, group).await?;
        let admin = NewGroupMember {
            group_id: created.id,
            user_id: group.created_by,
            role: MemberRole::Admin,
        };

        if let Err(e) = self.insert_one::<GroupMember, _>(Table::GroupMembers, &admin).await {
            let rollback: Result<Vec<Group>> = self
                .delete(Table::Groups, &Query::new().eq("id", created.id))
                .await;
            if let Err(rb) = rollback {
                warn!("Group {} left without an admin: {}", created.id, rb);
            }
            return Err(e);
        }

        info!("Group {} created by {}", created.id, group.created_by);
        Ok(created)
    }

    pub async fn get_membership(&self, group_id: Uuid, user_id: Uuid) -> Result<Option<GroupMember>> {
        let query = Query::new().eq("group_id", group_id).eq("user_id", user_id);
        self.select_one(Table::GroupMembers, query).await
    }

    /// Idempotent: an existing membership is returned unchanged.
    pub async fn join_group(&self, group_id: Uuid, user_id: Uuid) -> Result<GroupMember> {
        if let Some(existing) = self.get_membership(group_id, user_id).await? {
            return Ok(existing);
        }
        self.insert_one(
            Table::GroupMembers,
            &NewGroupMember {
                group_id,
                user_id,
                role: MemberRole::Member,
            },
        )
        .await
    }

    pub async fn leave_group(&self, group_id: Uuid, user_id: Uuid) -> Result<bool> {
        let rows: Vec<GroupMember> = self
            .delete(
                Table::GroupMembers,
                &Query::new().eq("group_id", group_id).eq("user_id", user_id),
            )
            .await?;
        Ok(!rows.is_empty())
    }

    pub async fn group_members(&self, group_id: Uuid) -> Result<Vec<GroupMember>> {
        let query = Query::new()
            .eq("group_id", group_id)
            .order("joined_at", false);
        self.select(Table::GroupMembers, &query).await
    }

    pub async fn group_ids_for_user(&self, user_id: Uuid) -> Result<HashSet<Uuid>> {
        let rows: Vec<GroupMember> = self
            .select(Table::GroupMembers, &Query::new().eq("user_id", user_id))
            .await?;
        Ok(rows.into_iter().map(|m| m.group_id).collect())
    }

    /// Groups whose posts `viewer` may read: every public group plus the
    /// private ones they belong to.
    pub async fn visible_group_ids(&self, viewer: Uuid) -> Result<HashSet<Uuid>> {
        #[derive(serde::Deserialize)]
        struct IdRow {
            id: Uuid,
        }

        let public: Vec<IdRow> = self
            .select(
                Table::Groups,
                &Query::new().select("id").eq("is_private", false),
            )
            .await?;
        let mut ids = self.group_ids_for_user(viewer).await?;
        ids.extend(public.into_iter().map(|g| g.id));
        Ok(ids)
    }

    // -- Channels --

    pub async fn channels_for_group(&self, group_id: Uuid) -> Result<Vec<Channel>> {
        let query = Query::new()
            .eq("group_id", group_id)
            .order("created_at", false);
        self.select(Table::Channels, &query).await
    }

    pub async fn get_channel(&self, id: Uuid) -> Result<Option<Channel>> {
        self.select_one(Table::Channels, Query::new().eq("id", id)).await
    }

    pub async fn create_channel(&self, channel: &NewChannel) -> Result<Channel> {
        self.insert_one(Table::Channels, channel).await
    }

    /// The `limit` most recent messages before the cursor, oldest first.
    pub async fn channel_messages(
        &self,
        channel_id: Uuid,
        limit: u32,
        before: Option<DateTime<Utc>>,
    ) -> Result<Vec<Message>> {
        let mut query = Query::new().eq("channel_id", channel_id);
        if let Some(before) = before {
            query = query.lt_time("created_at", before);
        }
        let mut rows: Vec<Message> = self
            .select(Table::Messages, &query.order("created_at", true).limit(limit))
            .await?;
        rows.reverse();
        Ok(rows)
    }

    pub async fn get_message(&self, id: Uuid) -> Result<Option<Message>> {
        self.select_one(Table::Messages, Query::new().eq("id", id)).await
    }

    pub async fn create_message(&self, message: &NewMessage) -> Result<Message> {
        self.insert_one(Table::Messages, message).await
    }

    // -- Private chats --

    pub async fn find_chat(&self, pair: ChatPair) -> Result<Option<PrivateChat>> {
        let query = Query::new()
            .eq("user1_id", pair.user1_id)
            .eq("user2_id", pair.user2_id);
        self.select_one(Table::PrivateChats, query).await
    }

    /// One chat per unordered pair of users.
    pub async fn get_or_create_chat(&self, a: Uuid, b: Uuid) -> Result<PrivateChat> {
        let pair = ChatPair::new(a, b);
        if let Some(chat) = self.find_chat(pair).await? {
            return Ok(chat);
        }

        match self.insert_one(Table::PrivateChats, &pair).await {
            Ok(chat) => Ok(chat),
            // Lost a race with the peer opening the same chat.
            Err(e) if e.is_conflict() => self.find_chat(pair).await?.ok_or(e),
            Err(e) => Err(e),
        }
    }

    pub async fn get_chat(&self, id: Uuid) -> Result<Option<PrivateChat>> {
        self.select_one(Table::PrivateChats, Query::new().eq("id", id)).await
    }

    pub async fn chats_for_user(&self, user_id: Uuid) -> Result<Vec<PrivateChat>> {
        let query = Query::new()
            .or(&[
                format!("user1_id.eq.{}", user_id),
                format!("user2_id.eq.{}", user_id),
            ])
            .order("created_at", true);
        self.select(Table::PrivateChats, &query).await
    }

    /// The `limit` most recent messages before the cursor, oldest first.
    pub async fn private_messages(
        &self,
        chat_id: Uuid,
        limit: u32,
        before: Option<DateTime<Utc>>,
    ) -> Result<Vec<PrivateMessage>> {
        let mut query = Query::new().eq("chat_id", chat_id);
        if let Some(before) = before {
            query = query.lt_time("created_at", before);
        }
        let mut rows: Vec<PrivateMessage> = self
            .select(
                Table::PrivateMessages,
                &query.order("created_at", true).limit(limit),
            )
            .await?;
        rows.reverse();
        Ok(rows)
    }

    pub async fn get_private_message(&self, id: Uuid) -> Result<Option<PrivateMessage>> {
        self.select_one(Table::PrivateMessages, Query::new().eq("id", id))
            .await
    }

    pub async fn create_private_message(&self, message: &NewPrivateMessage) -> Result<PrivateMessage> {
        self.insert_one(Table::PrivateMessages, message).await
    }

    /// Marks the peer's unread messages as read. Returns how many changed.
    pub async fn mark_chat_read(&self, chat_id: Uuid, reader: Uuid) -> Result<usize> {
        let query = Query::new()
            .eq("chat_id", chat_id)
            .neq("sender_id", reader)
            .eq("read", false);
        let rows: Vec<PrivateMessage> = self
            .update(Table::PrivateMessages, &query, &json!({ "read": true }))
            .await?;
        Ok(rows.len())
    }

    // -- Rides --

    /// Open requests departing from `now` on, soonest first.
    pub async fn open_ride_requests(&self, now: DateTime<Utc>) -> Result<Vec<RideRequest>> {
        let query = Query::new()
            .eq("status", "open")
            .gte_time("departure_time", now)
            .order("departure_time", false);
        self.select(Table::RideRequests, &query).await
    }

    /// Open offers departing from `now` on, soonest first.
    pub async fn open_ride_offers(&self, now: DateTime<Utc>) -> Result<Vec<RideOffer>> {
        let query = Query::new()
            .eq("status", "open")
            .gte_time("departure_time", now)
            .order("departure_time", false);
        self.select(Table::RideOffers, &query).await
    }

    pub async fn get_ride_request(&self, id: Uuid) -> Result<Option<RideRequest>> {
        self.select_one(Table::RideRequests, Query::new().eq("id", id)).await
    }

    pub async fn get_ride_offer(&self, id: Uuid) -> Result<Option<RideOffer>> {
        self.select_one(Table::RideOffers, Query::new().eq("id", id)).await
    }

    pub async fn create_ride_request(&self, request: &NewRideRequest) -> Result<RideRequest> {
        self.insert_one(Table::RideRequests, request).await
    }

    pub async fn create_ride_offer(&self, offer: &NewRideOffer) -> Result<RideOffer> {
        self.insert_one(Table::RideOffers, offer).await
    }

    pub async fn cancel_ride_request(&self, id: Uuid, owner: Uuid) -> Result<bool> {
        let rows: Vec<RideRequest> = self
            .update(
                Table::RideRequests,
                &Query::new().eq("id", id).eq("user_id", owner),
                &json!({ "status": RideStatus::Cancelled }),
            )
            .await?;
        Ok(!rows.is_empty())
    }

    pub async fn cancel_ride_offer(&self, id: Uuid, owner: Uuid) -> Result<bool> {
        let rows: Vec<RideOffer> = self
            .update(
                Table::RideOffers,
                &Query::new().eq("id", id).eq("user_id", owner),
                &json!({ "status": RideStatus::Cancelled }),
            )
            .await?;
        Ok(!rows.is_empty())
    }

    pub async fn set_ride_request_status(&self, id: Uuid, status: RideStatus) -> Result<bool> {
        let rows: Vec<RideRequest> = self
            .update(
                Table::RideRequests,
                &Query::new().eq("id", id),
                &json!({ "status": status }),
            )
            .await?;
        Ok(!rows.is_empty())
    }

    pub async fn create_match(&self, request_id: Uuid, offer_id: Uuid) -> Result<RideMatch> {
        self.insert_one(
            Table::RideMatches,
            &NewRideMatch {
                request_id,
                offer_id,
                status: MatchStatus::Pending,
            },
        )
        .await
    }

    pub async fn get_match(&self, id: Uuid) -> Result<Option<RideMatch>> {
        self.select_one(Table::RideMatches, Query::new().eq("id", id)).await
    }

    /// Answer a pending match. `None` when the match is not pending (any
    /// more), so concurrent answers cannot both succeed.
    pub async fn answer_match(&self, id: Uuid, status: MatchStatus) -> Result<Option<RideMatch>> {
        let rows: Vec<RideMatch> = self
            .update(
                Table::RideMatches,
                &Query::new().eq("id", id).eq("status", "pending"),
                &json!({ "status": status }),
            )
            .await?;
        Ok(rows.into_iter().next())
    }

    /// Matches touching any request or offer `user_id` posted.
    pub async fn matches_for_user(&self, user_id: Uuid) -> Result<Vec<RideMatch>> {
        #[derive(serde::Deserialize)]
        struct IdRow {
            id: Uuid,
        }

        let owned = Query::new().select("id").eq("user_id", user_id);
        let requests: Vec<IdRow> = self.select(Table::RideRequests, &owned).await?;
        let offers: Vec<IdRow> = self.select(Table::RideOffers, &owned).await?;

        let mut conditions = Vec::new();
        if !requests.is_empty() {
            let ids: Vec<String> = requests.iter().map(|r| r.id.to_string()).collect();
            conditions.push(format!("request_id.in.({})", ids.join(",")));
        }
        if !offers.is_empty() {
            let ids: Vec<String> = offers.iter().map(|r| r.id.to_string()).collect();
            conditions.push(format!("offer_id.in.({})", ids.join(",")));
        }
        if conditions.is_empty() {
            return Ok(vec![]);
        }

        let query = Query::new().or(&conditions).order("created_at", true);
        self.select(Table::RideMatches, &query).await
    }

    /// Pairs a request with every open offer to the same destination that
    /// another user posted, skipping pairs that already exist. One pending
    /// match row per pair; no scoring.
    pub async fn match_request_with_open_offers(
        &self,
        request: &RideRequest,
        now: DateTime<Utc>,
    ) -> Result<Vec<RideMatch>> {
        let offers: Vec<RideOffer> = self
            .select(
                Table::RideOffers,
                &Query::new()
                    .eq("status", "open")
                    .ilike("destination", &like_literal(request.destination.trim()))
                    .neq("user_id", request.user_id)
                    .gte_time("departure_time", now),
            )
            .await?;
        let offers: Vec<RideOffer> = offers
            .into_iter()
            .filter(|o| same_place(&o.destination, &request.destination))
            .collect();

        let existing: Vec<RideMatch> = self
            .select(
                Table::RideMatches,
                &Query::new().eq("request_id", request.id),
            )
            .await?;
        let already: HashSet<Uuid> = existing.iter().map(|m| m.offer_id).collect();

        let new_rows: Vec<NewRideMatch> = offers
            .iter()
            .filter(|o| !already.contains(&o.id))
            .map(|o| NewRideMatch {
                request_id: request.id,
                offer_id: o.id,
                status: MatchStatus::Pending,
            })
            .collect();

        if new_rows.is_empty() {
            return Ok(vec![]);
        }

        let created: Vec<RideMatch> = self.insert(Table::RideMatches, &new_rows).await?;
        info!("Request {} matched with {} offers", request.id, created.len());
        Ok(created)
    }

    // -- Stories --

    pub async fn active_stories(&self, now: DateTime<Utc>) -> Result<Vec<Story>> {
        let query = Query::new()
            .gt_time("expires_at", now)
            .order("created_at", true);
        self.select(Table::Stories, &query).await
    }

    pub async fn create_story(&self, story: &NewStory) -> Result<Story> {
        self.insert_one(Table::Stories, story).await
    }

    pub async fn delete_story(&self, id: Uuid, owner: Uuid) -> Result<Option<Story>> {
        let rows: Vec<Story> = self
            .delete(Table::Stories, &Query::new().eq("id", id).eq("user_id", owner))
            .await?;
        Ok(rows.into_iter().next())
    }

    // -- Books --

    pub async fn search_books(
        &self,
        term: Option<&str>,
        subject: Option<&str>,
        limit: u32,
    ) -> Result<Vec<Book>> {
        let mut query = Query::new();
        if let Some(term) = term.filter(|t| !t.trim().is_empty()) {
            let pattern = contains_pattern(term);
            query = query.or(&[
                format!("title.ilike.{}", pattern),
                format!("author.ilike.{}", pattern),
            ]);
        }
        if let Some(subject) = subject.filter(|s| !s.trim().is_empty()) {
            query = query.eq("subject", subject);
        }
        self.select(Table::Books, &query.order("title", false).limit(limit))
            .await
    }

    pub async fn get_book(&self, id: Uuid) -> Result<Option<Book>> {
        self.select_one(Table::Books, Query::new().eq("id", id)).await
    }

    pub async fn create_book(&self, book: &NewBook) -> Result<Book> {
        self.insert_one(Table::Books, book).await
    }

    pub async fn delete_book(&self, id: Uuid, owner: Uuid) -> Result<bool> {
        let rows: Vec<Book> = self
            .delete(Table::Books, &Query::new().eq("id", id).eq("uploaded_by", owner))
            .await?;
        Ok(!rows.is_empty())
    }
}

/// Place names compare trimmed and case-insensitively.
fn same_place(a: &str, b: &str) -> bool {
    a.trim().to_lowercase() == b.trim().to_lowercase()
}

/// Expiry for a story created at `created_at`.
pub fn story_expiry(created_at: DateTime<Utc>) -> DateTime<Utc> {
    created_at + Duration::hours(STORY_LIFETIME_HOURS)
}

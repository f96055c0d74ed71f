use tracing::{debug, trace};
use uuid::Uuid;

use agora_db::Database;
use agora_types::events::{ChangeEvent, ChangeKind, Feed, GatewayEvent};
use agora_types::models::{Message, PrivateMessage, Table};

use crate::realtime::Subscription;

/// Rows kept in memory per feed; older ones are dropped from the front.
pub const FEED_WINDOW: usize = 500;

#[derive(Debug, Clone)]
pub enum FeedItem {
    Channel(Message),
    Private(PrivateMessage),
}

impl FeedItem {
    pub fn id(&self) -> Uuid {
        match self {
            Self::Channel(m) => m.id,
            Self::Private(m) => m.id,
        }
    }

    pub fn to_event(&self) -> GatewayEvent {
        match self {
            Self::Channel(m) => GatewayEvent::MessageCreate(m.clone()),
            Self::Private(m) => GatewayEvent::PrivateMessageCreate(m.clone()),
        }
    }

    pub fn to_update_event(&self) -> GatewayEvent {
        match self {
            Self::Channel(m) => GatewayEvent::MessageUpdate(m.clone()),
            Self::Private(m) => GatewayEvent::PrivateMessageUpdate(m.clone()),
        }
    }
}

/// What applying a change did to the feed.
#[derive(Debug)]
pub enum FeedUpdate {
    Appended(FeedItem),
    Replaced(FeedItem),
    Removed(Uuid),
}

impl FeedUpdate {
    /// Gateway event telling the client about this change.
    pub fn to_event(&self, feed: Feed) -> GatewayEvent {
        match self {
            Self::Appended(item) => item.to_event(),
            Self::Replaced(item) => item.to_update_event(),
            Self::Removed(id) => GatewayEvent::MessageDelete { feed, id: *id },
        }
    }
}

/// The messages of one channel or private chat, kept current by applying
/// change notifications: each notification names a row, which is re-fetched
/// from the database before it is appended.
pub struct MessageFeed {
    feed: Feed,
    db: Database,
    items: Vec<FeedItem>,
}

impl MessageFeed {
    pub fn new(feed: Feed, db: Database) -> Self {
        Self {
            feed,
            db,
            items: Vec::new(),
        }
    }

    pub fn feed(&self) -> Feed {
        self.feed
    }

    pub fn items(&self) -> &[FeedItem] {
        &self.items
    }

    /// Realtime subscription that reports changes to this feed's rows.
    pub fn subscription(&self) -> Subscription {
        match self.feed {
            Feed::Channel(id) => Subscription {
                table: Table::Messages,
                filter: Some(format!("channel_id=eq.{}", id)),
            },
            Feed::PrivateChat(id) => Subscription {
                table: Table::PrivateMessages,
                filter: Some(format!("chat_id=eq.{}", id)),
            },
        }
    }

    /// Replace the in-memory window with the latest `limit` rows.
    pub async fn load_history(&mut self, limit: u32) -> agora_db::Result<&[FeedItem]> {
        self.items = match self.feed {
            Feed::Channel(id) => self
                .db
                .channel_messages(id, limit, None)
                .await?
                .into_iter()
                .map(FeedItem::Channel)
                .collect(),
            Feed::PrivateChat(id) => self
                .db
                .private_messages(id, limit, None)
                .await?
                .into_iter()
                .map(FeedItem::Private)
                .collect(),
        };
        debug!("Loaded {} rows for {:?}", self.items.len(), self.feed);
        Ok(&self.items)
    }

    async fn fetch(&self, id: Uuid) -> agora_db::Result<Option<FeedItem>> {
        let item = match self.feed {
            Feed::Channel(channel_id) => self
                .db
                .get_message(id)
                .await?
                .filter(|m| m.channel_id == channel_id)
                .map(FeedItem::Channel),
            Feed::PrivateChat(chat_id) => self
                .db
                .get_private_message(id)
                .await?
                .filter(|m| m.chat_id == chat_id)
                .map(FeedItem::Private),
        };
        Ok(item)
    }

    /// Apply one change notification. Returns `None` when nothing visible
    /// changed (foreign table, repeated delivery, row already gone).
    pub async fn apply(&mut self, change: &ChangeEvent) -> agora_db::Result<Option<FeedUpdate>> {
        if change.table != self.subscription().table.as_str() {
            return Ok(None);
        }
        let Some(id) = change.row_id() else {
            trace!("Change without id on {:?}", self.feed);
            return Ok(None);
        };

        match change.kind {
            ChangeKind::Insert => {
                if self.items.last().is_some_and(|last| last.id() == id) {
                    return Ok(None);
                }
                let Some(item) = self.fetch(id).await? else {
                    return Ok(None);
                };
                self.items.push(item.clone());
                if self.items.len() > FEED_WINDOW {
                    let excess = self.items.len() - FEED_WINDOW;
                    self.items.drain(..excess);
                }
                Ok(Some(FeedUpdate::Appended(item)))
            }
            ChangeKind::Update => {
                let Some(pos) = self.items.iter().position(|i| i.id() == id) else {
                    return Ok(None);
                };
                let Some(item) = self.fetch(id).await? else {
                    return Ok(None);
                };
                self.items[pos] = item.clone();
                Ok(Some(FeedUpdate::Replaced(item)))
            }
            ChangeKind::Delete => {
                let before = self.items.len();
                self.items.retain(|i| i.id() != id);
                if self.items.len() == before {
                    Ok(None)
                } else {
                    Ok(Some(FeedUpdate::Removed(id)))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    fn message_json(id: Uuid, channel_id: Uuid) -> serde_json::Value {
        json!({
            "id": id,
            "channel_id": channel_id,
            "user_id": Uuid::new_v4(),
            "content": "see you at the lab",
            "created_at": "2024-05-01T10:00:00Z"
        })
    }

    fn insert(table: &str, id: Uuid) -> ChangeEvent {
        serde_json::from_value(json!({
            "type": "INSERT",
            "table": table,
            "record": { "id": id },
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn insert_refetches_and_appends_once() {
        let server = MockServer::start_async().await;
        let channel_id = Uuid::new_v4();
        let id = Uuid::new_v4();

        let fetch = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/rest/v1/messages")
                    .query_param("id", format!("eq.{}", id));
                then.status(200).json_body(json!([message_json(id, channel_id)]));
            })
            .await;

        let db = Database::new(&server.base_url(), "k");
        let mut feed = MessageFeed::new(Feed::Channel(channel_id), db);

        let update = feed.apply(&insert("messages", id)).await.unwrap();
        assert!(matches!(update, Some(FeedUpdate::Appended(ref item)) if item.id() == id));

        // Same notification delivered twice.
        assert!(feed.apply(&insert("messages", id)).await.unwrap().is_none());
        assert_eq!(feed.items().len(), 1);
        assert_eq!(fetch.hits_async().await, 1);
    }

    #[tokio::test]
    async fn row_from_other_channel_is_ignored() {
        let server = MockServer::start_async().await;
        let id = Uuid::new_v4();
        server
            .mock_async(|when, then| {
                when.method(GET).path("/rest/v1/messages");
                then.status(200)
                    .json_body(json!([message_json(id, Uuid::new_v4())]));
            })
            .await;

        let db = Database::new(&server.base_url(), "k");
        let mut feed = MessageFeed::new(Feed::Channel(Uuid::new_v4()), db);
        assert!(feed.apply(&insert("messages", id)).await.unwrap().is_none());
        assert!(feed.items().is_empty());
    }

    #[tokio::test]
    async fn foreign_table_and_unknown_delete_are_noops() {
        let db = Database::new("http://127.0.0.1:9", "k");
        let mut feed = MessageFeed::new(Feed::PrivateChat(Uuid::new_v4()), db);

        assert!(feed.apply(&insert("messages", Uuid::new_v4())).await.unwrap().is_none());

        let delete: ChangeEvent = serde_json::from_value(json!({
            "type": "DELETE",
            "table": "private_messages",
            "old_record": { "id": Uuid::new_v4() },
        }))
        .unwrap();
        assert!(feed.apply(&delete).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn read_receipt_becomes_an_update_event() {
        let server = MockServer::start_async().await;
        let chat_id = Uuid::new_v4();
        let id = Uuid::new_v4();
        let row = |read: bool| {
            json!({
                "id": id,
                "chat_id": chat_id,
                "sender_id": Uuid::new_v4(),
                "content": "on my way",
                "read": read,
                "created_at": "2024-05-01T10:00:00Z"
            })
        };

        server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/rest/v1/private_messages")
                    .query_param("chat_id", format!("eq.{}", chat_id));
                then.status(200).json_body(json!([row(false)]));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/rest/v1/private_messages")
                    .query_param("id", format!("eq.{}", id));
                then.status(200).json_body(json!([row(true)]));
            })
            .await;

        let db = Database::new(&server.base_url(), "k");
        let feed = Feed::PrivateChat(chat_id);
        let mut messages = MessageFeed::new(feed, db);
        messages.load_history(50).await.unwrap();

        let change: ChangeEvent = serde_json::from_value(json!({
            "type": "UPDATE",
            "table": "private_messages",
            "record": { "id": id, "read": true },
        }))
        .unwrap();
        let update = messages.apply(&change).await.unwrap().unwrap();

        match update.to_event(feed) {
            GatewayEvent::PrivateMessageUpdate(m) => assert!(m.read),
            other => panic!("unexpected event {:?}", other),
        }
        assert_eq!(messages.items().len(), 1);
    }

    #[test]
    fn subscription_filters_by_feed() {
        let chat = Uuid::new_v4();
        let feed = MessageFeed::new(Feed::PrivateChat(chat), Database::new("http://x", "k"));
        let sub = feed.subscription();
        assert_eq!(sub.table, Table::PrivateMessages);
        assert_eq!(sub.filter, Some(format!("chat_id=eq.{}", chat)));
    }
}

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Message, PrivateMessage};

/// Kind of row change reported by the hosted realtime feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// A single `postgres_changes` notification, decoded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeEvent {
    #[serde(rename = "type")]
    pub kind: ChangeKind,
    pub table: String,
    #[serde(default)]
    pub record: serde_json::Value,
    #[serde(default)]
    pub old_record: serde_json::Value,
}

impl ChangeEvent {
    /// Primary key of the affected row, taken from `record` for inserts and
    /// updates and from `old_record` for deletes.
    pub fn row_id(&self) -> Option<Uuid> {
        let source = match self.kind {
            ChangeKind::Delete => &self.old_record,
            _ => &self.record,
        };
        source.get("id")?.as_str()?.parse().ok()
    }
}

/// A realtime feed a gateway client can follow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Feed {
    Channel(Uuid),
    PrivateChat(Uuid),
}

/// Events sent over the WebSocket gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    /// Server confirms the connection is authenticated
    Ready { user_id: Uuid },

    /// Subscription accepted; history follows as individual create events
    Subscribed { feed: Feed },

    /// A message was posted in a group channel
    MessageCreate(Message),

    /// A message was posted in a private chat
    PrivateMessageCreate(PrivateMessage),

    /// A channel message already delivered changed in place
    MessageUpdate(Message),

    /// A private message already delivered changed, e.g. it was read
    PrivateMessageUpdate(PrivateMessage),

    /// A row disappeared from a followed feed
    MessageDelete { feed: Feed, id: Uuid },

    /// A command could not be honoured
    Error { message: String },
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayCommand {
    Subscribe { feed: Feed },
    Unsubscribe { feed: Feed },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn change_event_row_id_follows_kind() {
        let id = Uuid::new_v4();
        let insert: ChangeEvent = serde_json::from_value(json!({
            "type": "INSERT",
            "table": "messages",
            "record": { "id": id.to_string() },
            "old_record": null
        }))
        .unwrap();
        assert_eq!(insert.row_id(), Some(id));

        let delete: ChangeEvent = serde_json::from_value(json!({
            "type": "DELETE",
            "table": "messages",
            "record": null,
            "old_record": { "id": id.to_string() }
        }))
        .unwrap();
        assert_eq!(delete.kind, ChangeKind::Delete);
        assert_eq!(delete.row_id(), Some(id));
    }

    #[test]
    fn subscribe_command_wire_shape() {
        let id = Uuid::new_v4();
        let raw = format!(
            r#"{{"type":"Subscribe","data":{{"feed":{{"kind":"private_chat","id":"{}"}}}}}}"#,
            id
        );
        match serde_json::from_str::<GatewayCommand>(&raw).unwrap() {
            GatewayCommand::Subscribe { feed } => assert_eq!(feed, Feed::PrivateChat(id)),
            other => panic!("unexpected command {:?}", other),
        }
    }
}

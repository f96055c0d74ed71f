use std::time::Duration;

use anyhow::{Context, anyhow, bail};
use futures_util::{SinkExt, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{self, Message};
use tracing::{debug, info, warn};

use agora_types::events::ChangeEvent;
use agora_types::models::Table;

/// The hosted realtime service drops sockets that stay silent for a minute.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// How long the service gets to acknowledge a join.
const JOIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Buffered change notifications per subscription before the reader stalls.
const CHANGE_BUFFER: usize = 256;

/// Row changes to follow on one table, optionally narrowed by a filter such
/// as `chat_id=eq.<uuid>`.
#[derive(Debug, Clone)]
pub struct Subscription {
    pub table: Table,
    pub filter: Option<String>,
}

impl Subscription {
    pub fn topic(&self) -> String {
        match &self.filter {
            Some(filter) => format!("realtime:public:{}:{}", self.table, filter),
            None => format!("realtime:public:{}", self.table),
        }
    }
}

/// One frame of the realtime channel protocol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelFrame {
    pub topic: String,
    pub event: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(rename = "ref", default)]
    pub reference: Option<String>,
}

/// What an incoming frame means to us.
#[derive(Debug)]
pub enum Incoming {
    Change(ChangeEvent),
    /// Answer to the frame sent with `reference`; `Err` carries the reason.
    Reply {
        reference: Option<String>,
        result: Result<(), String>,
    },
    Closed,
    Ignored,
}

pub fn join_frame(sub: &Subscription, reference: u64) -> ChannelFrame {
    let mut change = json!({
        "event": "*",
        "schema": "public",
        "table": sub.table.as_str(),
    });
    if let Some(filter) = &sub.filter {
        change["filter"] = Value::String(filter.clone());
    }

    ChannelFrame {
        topic: sub.topic(),
        event: "phx_join".to_string(),
        payload: json!({ "config": { "postgres_changes": [change] } }),
        reference: Some(reference.to_string()),
    }
}

pub fn heartbeat_frame(reference: u64) -> ChannelFrame {
    ChannelFrame {
        topic: "phoenix".to_string(),
        event: "heartbeat".to_string(),
        payload: json!({}),
        reference: Some(reference.to_string()),
    }
}

pub fn decode_frame(text: &str) -> Incoming {
    let frame: ChannelFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            warn!("Undecodable realtime frame: {}", e);
            return Incoming::Ignored;
        }
    };

    match frame.event.as_str() {
        "postgres_changes" => {
            match serde_json::from_value::<ChangeEvent>(frame.payload["data"].clone()) {
                Ok(change) => Incoming::Change(change),
                Err(e) => {
                    warn!("Malformed change payload on {}: {}", frame.topic, e);
                    Incoming::Ignored
                }
            }
        }
        "phx_reply" => Incoming::Reply {
            reference: frame.reference,
            result: if frame.payload["status"] == "ok" {
                Ok(())
            } else {
                Err(frame.payload["response"].to_string())
            },
        },
        "phx_close" | "phx_error" if frame.topic != "phoenix" => Incoming::Closed,
        _ => Incoming::Ignored,
    }
}

/// Connects to the hosted realtime service.
#[derive(Clone)]
pub struct RealtimeClient {
    url: String,
}

impl RealtimeClient {
    pub fn new(base_url: &str, api_key: &str) -> Self {
        let base = base_url.trim_end_matches('/');
        let ws_base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            base.to_string()
        };
        Self {
            url: format!(
                "{}/realtime/v1/websocket?apikey={}&vsn=1.0.0",
                ws_base, api_key
            ),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Open a socket, join the topic for `sub` and stream its changes.
    /// Returns once the service has acknowledged the join, so every change
    /// committed after this point is delivered.
    pub async fn subscribe(&self, sub: Subscription) -> anyhow::Result<ChangeStream> {
        let (ws, _) = tokio_tungstenite::connect_async(self.url.as_str()).await?;
        let (mut sink, mut stream) = ws.split();

        let join = join_frame(&sub, 1);
        sink.send(Message::Text(serde_json::to_string(&join)?.into()))
            .await?;
        tokio::time::timeout(JOIN_TIMEOUT, await_join(&mut stream, join.reference.as_deref()))
            .await
            .with_context(|| format!("no join reply for {}", join.topic))??;
        info!("Joined realtime topic {}", join.topic);

        let (tx, rx) = mpsc::channel(CHANGE_BUFFER);
        let topic = join.topic;

        let task = tokio::spawn(async move {
            let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
            heartbeat.tick().await;
            let mut next_ref: u64 = 2;

            loop {
                tokio::select! {
                    frame = stream.next() => {
                        let text = match frame {
                            Some(Ok(Message::Text(text))) => text,
                            Some(Ok(Message::Close(_))) | None => break,
                            Some(Ok(_)) => continue,
                            Some(Err(e)) => {
                                warn!("Realtime socket error on {}: {}", topic, e);
                                break;
                            }
                        };

                        match decode_frame(&text) {
                            Incoming::Change(change) => {
                                if tx.send(change).await.is_err() {
                                    // Subscriber went away.
                                    break;
                                }
                            }
                            Incoming::Reply { result: Err(reason), .. } => {
                                warn!("Realtime request on {} rejected: {}", topic, reason);
                                break;
                            }
                            Incoming::Reply { result: Ok(()), .. } => {}
                            Incoming::Closed => break,
                            Incoming::Ignored => {}
                        }
                    }
                    _ = heartbeat.tick() => {
                        let frame = heartbeat_frame(next_ref);
                        next_ref += 1;
                        let text = match serde_json::to_string(&frame) {
                            Ok(text) => text,
                            Err(_) => break,
                        };
                        if sink.send(Message::Text(text.into())).await.is_err() {
                            break;
                        }
                    }
                }
            }

            let _ = sink.close().await;
            debug!("Realtime subscription {} closed", topic);
        });

        Ok(ChangeStream { rx, task })
    }
}

/// Read frames until the reply to the join sent with `join_ref` arrives.
pub async fn await_join<S>(stream: &mut S, join_ref: Option<&str>) -> anyhow::Result<()>
where
    S: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
{
    while let Some(frame) = stream.next().await {
        let text = match frame? {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };
        match decode_frame(&text) {
            Incoming::Reply { reference, result } if reference.as_deref() == join_ref => {
                return result.map_err(|reason| anyhow!("join rejected: {}", reason));
            }
            Incoming::Closed => break,
            _ => {}
        }
    }
    bail!("realtime socket closed before the join was acknowledged")
}

/// Receiving end of a subscription. Dropping it closes the socket.
pub struct ChangeStream {
    rx: mpsc::Receiver<ChangeEvent>,
    task: JoinHandle<()>,
}

impl ChangeStream {
    /// `None` once the upstream socket is gone.
    pub async fn next(&mut self) -> Option<ChangeEvent> {
        self.rx.recv().await
    }
}

impl Drop for ChangeStream {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_types::events::ChangeKind;

    #[test]
    fn client_url_uses_websocket_scheme() {
        let client = RealtimeClient::new("https://abc.example.co/", "anon");
        assert_eq!(
            client.url(),
            "wss://abc.example.co/realtime/v1/websocket?apikey=anon&vsn=1.0.0"
        );
    }

    #[test]
    fn join_frame_carries_filter() {
        let sub = Subscription {
            table: Table::PrivateMessages,
            filter: Some("chat_id=eq.42".into()),
        };
        let frame = join_frame(&sub, 7);
        assert_eq!(frame.event, "phx_join");
        assert_eq!(frame.reference.as_deref(), Some("7"));
        let change = &frame.payload["config"]["postgres_changes"][0];
        assert_eq!(change["table"], "private_messages");
        assert_eq!(change["filter"], "chat_id=eq.42");
        assert_eq!(change["schema"], "public");
    }

    #[test]
    fn decodes_insert_notification() {
        let text = r#"{
            "topic": "realtime:public:messages",
            "event": "postgres_changes",
            "ref": null,
            "payload": {
                "ids": [1],
                "data": {
                    "type": "INSERT",
                    "schema": "public",
                    "table": "messages",
                    "commit_timestamp": "2024-05-01T10:00:00Z",
                    "record": { "id": "8f14e45f-ceea-467a-9575-6b1d9c3c2a01", "content": "hey" },
                    "old_record": null
                }
            }
        }"#;
        match decode_frame(text) {
            Incoming::Change(change) => {
                assert_eq!(change.kind, ChangeKind::Insert);
                assert_eq!(change.table, "messages");
                assert!(change.row_id().is_some());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    const REJECTED: &str = r#"{"topic":"realtime:x","event":"phx_reply","ref":"1","payload":{"status":"error","response":{"reason":"unauthorized"}}}"#;
    const HEARTBEAT_OK: &str = r#"{"topic":"phoenix","event":"phx_reply","ref":"2","payload":{"status":"ok","response":{}}}"#;
    const JOIN_OK: &str = r#"{"topic":"realtime:x","event":"phx_reply","ref":"1","payload":{"status":"ok","response":{"postgres_changes":[]}}}"#;

    fn frames(texts: &[&str]) -> impl Stream<Item = Result<Message, tungstenite::Error>> + Unpin {
        let items: Vec<Result<Message, tungstenite::Error>> = texts
            .iter()
            .map(|t| Ok(Message::Text(t.to_string().into())))
            .collect();
        futures_util::stream::iter(items)
    }

    #[test]
    fn replies_and_noise() {
        assert!(matches!(
            decode_frame(REJECTED),
            Incoming::Reply { result: Err(_), .. }
        ));
        match decode_frame(HEARTBEAT_OK) {
            Incoming::Reply { reference, result } => {
                assert_eq!(reference.as_deref(), Some("2"));
                assert!(result.is_ok());
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(decode_frame("not json"), Incoming::Ignored));
    }

    #[tokio::test]
    async fn join_waits_for_its_own_reply() {
        let mut stream = frames(&[HEARTBEAT_OK, JOIN_OK]);
        assert!(await_join(&mut stream, Some("1")).await.is_ok());

        let mut only_heartbeat = frames(&[HEARTBEAT_OK]);
        assert!(await_join(&mut only_heartbeat, Some("1")).await.is_err());
    }

    #[tokio::test]
    async fn rejected_join_fails_subscribe() {
        let mut stream = frames(&[REJECTED]);
        let err = await_join(&mut stream, Some("1")).await.unwrap_err();
        assert!(err.to_string().contains("unauthorized"));
    }
}

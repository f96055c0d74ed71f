use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use agora_db::Database;
use agora_types::events::{Feed, GatewayCommand, GatewayEvent};

use crate::feed::MessageFeed;
use crate::realtime::RealtimeClient;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Messages replayed to a client when it subscribes to a feed.
const HISTORY_ON_SUBSCRIBE: u32 = 50;

/// Feeds one connection may follow at once.
const MAX_SUBSCRIPTIONS: usize = 32;

/// Everything a gateway connection needs from the server.
#[derive(Clone)]
pub struct GatewayContext {
    pub db: Database,
    pub realtime: RealtimeClient,
}

/// Feed tasks of one connection. Dropping it aborts them all, so a
/// connection that dies on either side never leaves upstream sockets behind.
#[derive(Default)]
struct FeedTasks(HashMap<Feed, JoinHandle<()>>);

impl FeedTasks {
    fn contains(&self, feed: &Feed) -> bool {
        self.0.contains_key(feed)
    }

    fn len(&self) -> usize {
        self.0.len()
    }

    fn insert(&mut self, feed: Feed, task: JoinHandle<()>) {
        self.0.insert(feed, task);
    }

    fn remove(&mut self, feed: &Feed) -> Option<JoinHandle<()>> {
        self.0.remove(feed)
    }

    /// Forget feeds whose upstream went away.
    fn prune_finished(&mut self) {
        self.0.retain(|_, task| !task.is_finished());
    }
}

impl Drop for FeedTasks {
    fn drop(&mut self) {
        for (_, task) in self.0.drain() {
            task.abort();
        }
    }
}

/// Handle a WebSocket connection whose token was validated at upgrade time.
pub async fn handle_connection(socket: WebSocket, ctx: GatewayContext, user_id: Uuid) {
    let (mut sender, mut receiver) = socket.split();

    info!("{} connected to gateway", user_id);

    let ready = GatewayEvent::Ready { user_id };
    if send_event(&mut sender, &ready).await.is_err() {
        return;
    }

    // Feed tasks push events here; the send task drains it to the socket.
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<GatewayEvent>();

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                event = event_rx.recv() => {
                    let Some(event) = event else { break };
                    if send_event(&mut sender, &event).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    let mut recv_task = tokio::spawn(async move {
        let mut feeds = FeedTasks::default();

        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<GatewayCommand>(&text) {
                    Ok(cmd) => {
                        handle_command(&ctx, user_id, cmd, &mut feeds, &event_tx).await;
                    }
                    Err(e) => {
                        warn!(
                            "{} bad command: {} -- raw: {}",
                            user_id,
                            e,
                            text.chars().take(200).collect::<String>()
                        );
                    }
                },
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either task to finish. Aborting the receive task drops its
    // `FeedTasks`, which stops the feeds.
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    info!("{} disconnected from gateway", user_id);
}

async fn send_event(
    sender: &mut futures_util::stream::SplitSink<WebSocket, Message>,
    event: &GatewayEvent,
) -> Result<(), ()> {
    let text = serde_json::to_string(event).map_err(|_| ())?;
    sender.send(Message::Text(text.into())).await.map_err(|_| ())
}

async fn handle_command(
    ctx: &GatewayContext,
    user_id: Uuid,
    cmd: GatewayCommand,
    feeds: &mut FeedTasks,
    events: &mpsc::UnboundedSender<GatewayEvent>,
) {
    feeds.prune_finished();

    match cmd {
        GatewayCommand::Subscribe { feed } => {
            if feeds.contains(&feed) {
                return;
            }
            if feeds.len() >= MAX_SUBSCRIPTIONS {
                let _ = events.send(GatewayEvent::Error {
                    message: "too many subscriptions".into(),
                });
                return;
            }

            match may_follow(&ctx.db, user_id, feed).await {
                Ok(true) => {}
                Ok(false) => {
                    warn!("{} denied subscription to {:?}", user_id, feed);
                    let _ = events.send(GatewayEvent::Error {
                        message: "not allowed to follow this feed".into(),
                    });
                    return;
                }
                Err(e) => {
                    warn!("Authorisation lookup for {:?} failed: {}", feed, e);
                    let _ = events.send(GatewayEvent::Error {
                        message: "subscription failed".into(),
                    });
                    return;
                }
            }

            info!("{} subscribing to {:?}", user_id, feed);
            let task = tokio::spawn(run_feed(ctx.clone(), feed, events.clone()));
            feeds.insert(feed, task);
        }

        GatewayCommand::Unsubscribe { feed } => {
            if let Some(task) = feeds.remove(&feed) {
                debug!("{} unsubscribed from {:?}", user_id, feed);
                task.abort();
            }
        }
    }
}

/// Channel feeds are open to group members, private chats to their two
/// participants.
pub async fn may_follow(db: &Database, user_id: Uuid, feed: Feed) -> agora_db::Result<bool> {
    match feed {
        Feed::Channel(channel_id) => {
            let Some(channel) = db.get_channel(channel_id).await? else {
                return Ok(false);
            };
            Ok(db.get_membership(channel.group_id, user_id).await?.is_some())
        }
        Feed::PrivateChat(chat_id) => Ok(db
            .get_chat(chat_id)
            .await?
            .is_some_and(|chat| chat.has_participant(user_id))),
    }
}

/// Replay recent history, then forward live changes until the client
/// unsubscribes or the upstream subscription ends.
async fn run_feed(ctx: GatewayContext, feed: Feed, events: mpsc::UnboundedSender<GatewayEvent>) {
    let mut messages = MessageFeed::new(feed, ctx.db.clone());

    // Subscribe before loading history so rows inserted in between are not lost.
    let mut changes = match ctx.realtime.subscribe(messages.subscription()).await {
        Ok(changes) => changes,
        Err(e) => {
            warn!("Realtime subscribe for {:?} failed: {}", feed, e);
            let _ = events.send(GatewayEvent::Error {
                message: "realtime unavailable".into(),
            });
            return;
        }
    };

    match messages.load_history(HISTORY_ON_SUBSCRIBE).await {
        Ok(history) => {
            let _ = events.send(GatewayEvent::Subscribed { feed });
            for item in history {
                if events.send(item.to_event()).is_err() {
                    return;
                }
            }
        }
        Err(e) => {
            warn!("History for {:?} failed: {}", feed, e);
            let _ = events.send(GatewayEvent::Error {
                message: "could not load history".into(),
            });
            return;
        }
    }

    while let Some(change) = changes.next().await {
        let update = match messages.apply(&change).await {
            Ok(update) => update,
            Err(e) => {
                warn!("Re-fetch for {:?} failed: {}", feed, e);
                continue;
            }
        };

        let Some(update) = update else { continue };
        if events.send(update.to_event(feed)).is_err() {
            break;
        }
    }

    debug!("Feed {:?} ended", feed);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn dropping_feed_tasks_stops_them() {
        let (alive_tx, mut alive_rx) = mpsc::channel::<()>(1);
        let task = tokio::spawn(async move {
            let _alive = alive_tx;
            std::future::pending::<()>().await;
        });

        let mut feeds = FeedTasks::default();
        feeds.insert(Feed::Channel(Uuid::new_v4()), task);
        assert_eq!(feeds.len(), 1);
        drop(feeds);

        // The sender only goes away once the aborted task is torn down.
        let closed = tokio::time::timeout(Duration::from_secs(5), alive_rx.recv()).await;
        assert!(matches!(closed, Ok(None)));
    }

    #[tokio::test]
    async fn finished_feeds_are_pruned() {
        let mut feeds = FeedTasks::default();
        let feed = Feed::PrivateChat(Uuid::new_v4());
        let task = tokio::spawn(async {});
        while !task.is_finished() {
            tokio::task::yield_now().await;
        }
        feeds.insert(feed, task);
        feeds.prune_finished();
        assert!(!feeds.contains(&feed));
        assert!(feeds.remove(&feed).is_none());
    }
}

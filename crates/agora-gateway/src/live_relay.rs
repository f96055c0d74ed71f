use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio_tungstenite::tungstenite::Message as UpstreamMessage;
use tokio_tungstenite::tungstenite::protocol::CloseFrame as UpstreamCloseFrame;
use tracing::{info, trace, warn};
use uuid::Uuid;

/// Relay a live-audio session between a client socket and the assistant's
/// streaming endpoint. `setup` is sent upstream before any client frame.
/// Returns when either side closes.
pub async fn relay(client: WebSocket, upstream_url: String, setup: Value, user_id: Uuid) {
    let (mut client_tx, mut client_rx) = client.split();

    let upstream = match tokio_tungstenite::connect_async(upstream_url.as_str()).await {
        Ok((ws, _)) => ws,
        Err(e) => {
            warn!("Live session upstream connect failed for {}: {}", user_id, e);
            let _ = client_tx
                .send(Message::Close(Some(CloseFrame {
                    code: 1011,
                    reason: String::from("assistant unavailable").into(),
                })))
                .await;
            return;
        }
    };
    let (mut upstream_tx, mut upstream_rx) = upstream.split();

    if upstream_tx
        .send(UpstreamMessage::Text(setup.to_string().into()))
        .await
        .is_err()
    {
        return;
    }
    info!("Live session opened for {}", user_id);

    let mut to_upstream = tokio::spawn(async move {
        while let Some(Ok(msg)) = client_rx.next().await {
            let Some(forward) = client_to_upstream(msg) else {
                continue;
            };
            let closing = matches!(forward, UpstreamMessage::Close(_));
            if upstream_tx.send(forward).await.is_err() || closing {
                break;
            }
        }
        let _ = upstream_tx.close().await;
    });

    let mut to_client = tokio::spawn(async move {
        while let Some(frame) = upstream_rx.next().await {
            let msg = match frame {
                Ok(msg) => msg,
                Err(e) => {
                    warn!("Live upstream error: {}", e);
                    break;
                }
            };
            let Some(forward) = upstream_to_client(msg) else {
                continue;
            };
            let closing = matches!(forward, Message::Close(_));
            if client_tx.send(forward).await.is_err() || closing {
                break;
            }
        }
        let _ = client_tx.close().await;
    });

    tokio::select! {
        _ = &mut to_upstream => to_client.abort(),
        _ = &mut to_client => to_upstream.abort(),
    }

    info!("Live session closed for {}", user_id);
}

/// Data frames pass through; pings are answered locally by each socket.
fn client_to_upstream(msg: Message) -> Option<UpstreamMessage> {
    match msg {
        Message::Text(text) => Some(UpstreamMessage::Text(text.as_str().to_string().into())),
        Message::Binary(data) => {
            trace!("client -> upstream {} bytes", data.len());
            Some(UpstreamMessage::Binary(data))
        }
        Message::Close(frame) => Some(UpstreamMessage::Close(frame.map(|f| UpstreamCloseFrame {
            code: f.code.into(),
            reason: f.reason.as_str().to_string().into(),
        }))),
        Message::Ping(_) | Message::Pong(_) => None,
    }
}

fn upstream_to_client(msg: UpstreamMessage) -> Option<Message> {
    match msg {
        UpstreamMessage::Text(text) => Some(Message::Text(text.as_str().to_string().into())),
        UpstreamMessage::Binary(data) => {
            trace!("upstream -> client {} bytes", data.len());
            Some(Message::Binary(data))
        }
        UpstreamMessage::Close(frame) => Some(Message::Close(frame.map(|f| CloseFrame {
            code: f.code.into(),
            reason: f.reason.as_str().to_string().into(),
        }))),
        _ => None,
    }
}

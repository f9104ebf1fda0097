//! Websocket push channel for event store changes.
//!
//! Speaks a Phoenix-channel style protocol: join a topic per
//! `(table, filter)`, wait for the join reply, then receive
//! `postgres_changes` frames carrying `{type, record, old_record}`.
//! A heartbeat frame keeps the socket alive.

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::time::interval;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use url::Url;

use super::traits::{PushChannel, PushMessage, PushSubscription};
use crate::domain::{ChangeEvent, ChangeKind, DeliverySource, Resource, RowFilter};
use crate::error::{CourtsideError, Result};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const HEARTBEAT_TOPIC: &str = "phoenix";
const CHANNEL_BUFFER: usize = 256;

/// Wire frame shared by every message on the socket
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Frame {
    topic: String,
    event: String,
    #[serde(default)]
    payload: Value,
    #[serde(rename = "ref", default)]
    reference: Option<String>,
}

/// What an incoming frame means for a subscription
#[derive(Debug, Clone, PartialEq)]
enum Inbound {
    JoinReply { ok: bool, reason: String },
    Change(ChangeEvent),
    ChannelError(String),
    Ignored,
}

pub struct WebSocketPushChannel {
    ws_url: String,
    api_key: Option<String>,
    heartbeat: Duration,
    next_ref: AtomicU64,
}

impl WebSocketPushChannel {
    pub fn new(ws_url: &str, api_key: Option<String>) -> Self {
        Self {
            ws_url: ws_url.to_string(),
            api_key,
            heartbeat: Duration::from_secs(30),
            next_ref: AtomicU64::new(1),
        }
    }

    pub fn with_heartbeat(mut self, heartbeat: Duration) -> Self {
        self.heartbeat = heartbeat;
        self
    }

    fn next_ref(&self) -> String {
        self.next_ref.fetch_add(1, Ordering::Relaxed).to_string()
    }

    fn endpoint(&self) -> Result<Url> {
        let mut url = Url::parse(&self.ws_url)
            .map_err(|e| CourtsideError::Connectivity(format!("invalid realtime URL: {e}")))?;
        {
            let mut pairs = url.query_pairs_mut();
            if let Some(key) = &self.api_key {
                pairs.append_pair("apikey", key);
            }
            pairs.append_pair("vsn", "1.0.0");
        }
        Ok(url)
    }
}

fn topic_for(resource: Resource, filter: &RowFilter) -> String {
    format!("realtime:public:{}:{}", resource.table(), filter.expression())
}

fn join_frame(resource: Resource, filter: &RowFilter, topic: &str, reference: &str) -> Frame {
    Frame {
        topic: topic.to_string(),
        event: "phx_join".to_string(),
        payload: json!({
            "config": {
                "postgres_changes": [{
                    "event": "*",
                    "schema": "public",
                    "table": resource.table(),
                    "filter": filter.expression(),
                }]
            }
        }),
        reference: Some(reference.to_string()),
    }
}

fn parse_inbound(text: &str, topic: &str, join_ref: &str, resource: Resource, filter: &RowFilter) -> Inbound {
    let frame: Frame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            let head: String = text.chars().take(200).collect();
            debug!("Unparseable realtime frame ({}): {}", e, head);
            return Inbound::Ignored;
        }
    };

    if frame.topic != topic {
        return Inbound::Ignored;
    }

    match frame.event.as_str() {
        "phx_reply" if frame.reference.as_deref() == Some(join_ref) => {
            let status = frame.payload.get("status").and_then(Value::as_str).unwrap_or("");
            let reason = frame
                .payload
                .get("response")
                .map(|r| r.to_string())
                .unwrap_or_default();
            Inbound::JoinReply {
                ok: status == "ok",
                reason,
            }
        }
        "phx_error" | "phx_close" | "system" if is_channel_failure(&frame) => {
            Inbound::ChannelError(format!("{} on {}: {}", frame.event, topic, frame.payload))
        }
        "postgres_changes" | "INSERT" | "UPDATE" | "DELETE" => {
            let data = frame.payload.get("data").unwrap_or(&frame.payload);
            let Some(kind) = data.get("type").and_then(Value::as_str).and_then(ChangeKind::parse) else {
                return Inbound::Ignored;
            };
            let record = data.get("record").cloned().unwrap_or(Value::Null);
            let old_record = data
                .get("old_record")
                .cloned()
                .filter(|v| !v.is_null() && v.as_object().map_or(true, |o| !o.is_empty()));

            // Deletes arrive with an empty record; the old row is what was removed.
            let record = match (kind, &record, &old_record) {
                (ChangeKind::Delete, r, Some(old)) if r.is_null() || r.as_object().map_or(false, |o| o.is_empty()) => {
                    old.clone()
                }
                _ => record,
            };

            if !filter.matches(&record) && kind != ChangeKind::Delete {
                return Inbound::Ignored;
            }

            Inbound::Change(ChangeEvent::new(
                resource,
                kind,
                record,
                old_record,
                DeliverySource::Push,
            ))
        }
        _ => Inbound::Ignored,
    }
}

fn is_channel_failure(frame: &Frame) -> bool {
    match frame.event.as_str() {
        "phx_error" | "phx_close" => true,
        // system frames report subscription status; only errors matter
        _ => frame.payload.get("status").and_then(Value::as_str) == Some("error"),
    }
}

async fn send_frame(write: &mut SplitSink<WsStream, Message>, frame: &Frame) -> Result<()> {
    let text = serde_json::to_string(frame)?;
    write.send(Message::Text(text)).await?;
    Ok(())
}

#[async_trait]
impl PushChannel for WebSocketPushChannel {
    async fn subscribe(&self, resource: Resource, filter: &RowFilter) -> Result<PushSubscription> {
        let url = self.endpoint()?;
        info!("Connecting realtime channel for {} ({})", resource, filter.expression());

        let (ws_stream, _) = connect_async(url.as_str())
            .await
            .map_err(|e| CourtsideError::Connectivity(format!("websocket connect failed: {e}")))?;
        let (mut write, mut read) = ws_stream.split();

        let topic = topic_for(resource, filter);
        let join_ref = self.next_ref();
        send_frame(&mut write, &join_frame(resource, filter, &topic, &join_ref))
            .await
            .map_err(|e| CourtsideError::Connectivity(format!("join send failed: {e}")))?;

        // Changes that race the join reply are kept and replayed after it.
        let mut early = Vec::new();
        loop {
            match read.next().await {
                Some(Ok(Message::Text(text))) => {
                    match parse_inbound(&text, &topic, &join_ref, resource, filter) {
                        Inbound::JoinReply { ok: true, .. } => break,
                        Inbound::JoinReply { ok: false, reason } => {
                            return Err(CourtsideError::Connectivity(format!(
                                "join rejected for {topic}: {reason}"
                            )));
                        }
                        Inbound::ChannelError(msg) => return Err(CourtsideError::Connectivity(msg)),
                        Inbound::Change(change) => early.push(change),
                        Inbound::Ignored => {}
                    }
                }
                Some(Ok(Message::Close(_))) | None => {
                    return Err(CourtsideError::Connectivity(
                        "socket closed before join was acknowledged".to_string(),
                    ));
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    return Err(CourtsideError::Connectivity(format!("websocket error during join: {e}")));
                }
            }
        }

        info!("Realtime channel joined: {}", topic);

        // Sized so every buffered early change fits before anyone reads.
        let (tx, rx) = mpsc::channel(CHANNEL_BUFFER.max(early.len() + 1));
        let (close_tx, close_rx) = oneshot::channel();
        for change in early {
            if let Err(e) = tx.try_send(PushMessage::Change(change)) {
                warn!("Dropped early change on {}: {}", topic, e);
            }
        }

        let session = Session {
            topic,
            join_ref,
            resource,
            filter: filter.clone(),
            heartbeat: self.heartbeat,
            heartbeat_ref: AtomicU64::new(1),
        };
        tokio::spawn(session.run(write, read, tx, close_rx));

        Ok(PushSubscription::new(rx, close_tx))
    }
}

/// Read loop for one joined topic
struct Session {
    topic: String,
    join_ref: String,
    resource: Resource,
    filter: RowFilter,
    heartbeat: Duration,
    heartbeat_ref: AtomicU64,
}

impl Session {
    async fn run(
        self,
        mut write: SplitSink<WsStream, Message>,
        mut read: SplitStream<WsStream>,
        tx: mpsc::Sender<PushMessage>,
        mut close_rx: oneshot::Receiver<()>,
    ) {
        let mut heartbeat = interval(self.heartbeat);
        heartbeat.tick().await;

        loop {
            tokio::select! {
                _ = &mut close_rx => {
                    let leave = Frame {
                        topic: self.topic.clone(),
                        event: "phx_leave".to_string(),
                        payload: json!({}),
                        reference: None,
                    };
                    let _ = send_frame(&mut write, &leave).await;
                    let _ = write.close().await;
                    debug!("Realtime channel {} closed by subscriber", self.topic);
                    return;
                }
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            match parse_inbound(&text, &self.topic, &self.join_ref, self.resource, &self.filter) {
                                Inbound::Change(change) => {
                                    if tx.send(PushMessage::Change(change)).await.is_err() {
                                        return;
                                    }
                                }
                                Inbound::ChannelError(msg) => {
                                    warn!("Realtime channel error: {}", msg);
                                    let _ = tx.send(PushMessage::Error(msg)).await;
                                    return;
                                }
                                Inbound::JoinReply { .. } | Inbound::Ignored => {}
                            }
                        }
                        Some(Ok(Message::Ping(data))) => {
                            if write.send(Message::Pong(data)).await.is_err() {
                                let _ = tx.send(PushMessage::Error("pong send failed".to_string())).await;
                                return;
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            info!("Realtime socket closed for {}", self.topic);
                            return;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            let _ = tx.send(PushMessage::Error(format!("websocket error: {e}"))).await;
                            return;
                        }
                    }
                }
                _ = heartbeat.tick() => {
                    let frame = Frame {
                        topic: HEARTBEAT_TOPIC.to_string(),
                        event: "heartbeat".to_string(),
                        payload: json!({}),
                        reference: Some(format!("hb-{}", self.heartbeat_ref.fetch_add(1, Ordering::Relaxed))),
                    };
                    if let Err(e) = send_frame(&mut write, &frame).await {
                        let _ = tx.send(PushMessage::Error(format!("heartbeat failed: {e}"))).await;
                        return;
                    }
                    debug!("Sent heartbeat");
                }
            }
        }
    }
}

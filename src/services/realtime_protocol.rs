//! Wire codec for the realtime change feed.
//!
//! The feed speaks the Phoenix channel protocol over a WebSocket: every frame
//! is a JSON object `{topic, event, payload, ref}`. A channel joins with a
//! `postgres_changes` config, is acknowledged by a `phx_reply`, then receives
//! `postgres_changes` frames carrying one row change each.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use url::Url;

use crate::types::bookmark::Bookmark;
use crate::types::errors::SubscriptionError;
use crate::types::realtime::{ChangeEvent, ChannelStatus, SubscriptionRequest};

pub const EVENT_JOIN: &str = "phx_join";
pub const EVENT_LEAVE: &str = "phx_leave";
pub const EVENT_REPLY: &str = "phx_reply";
pub const EVENT_ERROR: &str = "phx_error";
pub const EVENT_CLOSE: &str = "phx_close";
pub const EVENT_HEARTBEAT: &str = "heartbeat";
pub const EVENT_CHANGES: &str = "postgres_changes";
pub const EVENT_SYSTEM: &str = "system";
const PHOENIX_TOPIC: &str = "phoenix";
const PROTOCOL_VERSION: &str = "1.0.0";

/// One Phoenix frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhoenixMessage {
    pub topic: String,
    pub event: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(rename = "ref", default)]
    pub reference: Option<String>,
}

impl PhoenixMessage {
    /// Join frame subscribing to every change on the request's rows.
    pub fn join(request: &SubscriptionRequest, access_token: Option<&str>, reference: &str) -> Self {
        let mut payload = json!({
            "config": {
                "broadcast": { "ack": false, "self": false },
                "presence": { "key": "" },
                "postgres_changes": [{
                    "event": "*",
                    "schema": request.schema,
                    "table": request.table,
                    "filter": request.filter_expr(),
                }],
            }
        });
        if let Some(token) = access_token {
            payload["access_token"] = Value::String(token.to_string());
        }
        Self {
            topic: request.topic(),
            event: EVENT_JOIN.to_string(),
            payload,
            reference: Some(reference.to_string()),
        }
    }

    pub fn leave(topic: &str, reference: &str) -> Self {
        Self {
            topic: topic.to_string(),
            event: EVENT_LEAVE.to_string(),
            payload: json!({}),
            reference: Some(reference.to_string()),
        }
    }

    pub fn heartbeat(reference: &str) -> Self {
        Self {
            topic: PHOENIX_TOPIC.to_string(),
            event: EVENT_HEARTBEAT.to_string(),
            payload: json!({}),
            reference: Some(reference.to_string()),
        }
    }

    pub fn encode(&self) -> Result<String, SubscriptionError> {
        serde_json::to_string(self).map_err(|e| SubscriptionError::Transport(e.to_string()))
    }

    pub fn decode(text: &str) -> Result<Self, SubscriptionError> {
        serde_json::from_str(text)
            .map_err(|e| SubscriptionError::Transport(format!("malformed frame: {}", e)))
    }
}

/// What an inbound frame means for a channel.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Reply to the frame with this ref.
    Reply { reference: String, ok: bool, reason: Option<String> },
    Change(ChangeEvent),
    Status(ChannelStatus),
    /// Heartbeat acks, presence, and anything we do not act on.
    Ignored,
}

/// Interprets a frame addressed to `topic`.
///
/// Frames for other topics, and change frames whose record cannot be
/// decoded, are `Ignored` (the latter with a warning).
pub fn classify(topic: &str, message: &PhoenixMessage) -> Inbound {
    if message.event == EVENT_REPLY {
        let ok = message.payload.get("status").and_then(Value::as_str) == Some("ok");
        let reason = message
            .payload
            .pointer("/response/reason")
            .and_then(Value::as_str)
            .map(str::to_string);
        return match &message.reference {
            Some(reference) => Inbound::Reply {
                reference: reference.clone(),
                ok,
                reason,
            },
            None => Inbound::Ignored,
        };
    }
    if message.topic != topic {
        return Inbound::Ignored;
    }
    match message.event.as_str() {
        EVENT_CHANGES => match decode_change(&message.payload) {
            Ok(event) => Inbound::Change(event),
            Err(e) => {
                tracing::warn!(error = %e, "dropping undecodable change event");
                Inbound::Ignored
            }
        },
        EVENT_ERROR => Inbound::Status(ChannelStatus::ChannelError),
        EVENT_CLOSE => Inbound::Status(ChannelStatus::Closed),
        EVENT_SYSTEM => {
            if message.payload.get("status").and_then(Value::as_str) == Some("error") {
                Inbound::Status(ChannelStatus::ChannelError)
            } else {
                Inbound::Ignored
            }
        }
        _ => Inbound::Ignored,
    }
}

#[derive(Deserialize)]
struct ChangeData {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    record: Option<Value>,
    #[serde(default)]
    old_record: Option<Value>,
}

/// Decodes a `postgres_changes` payload into a [`ChangeEvent`].
pub fn decode_change(payload: &Value) -> Result<ChangeEvent, SubscriptionError> {
    let data = payload
        .get("data")
        .ok_or_else(|| SubscriptionError::Transport("change payload without data".to_string()))?;
    let data: ChangeData = serde_json::from_value(data.clone())
        .map_err(|e| SubscriptionError::Transport(e.to_string()))?;

    let record = |value: Option<Value>| -> Result<Bookmark, SubscriptionError> {
        let value = value.ok_or_else(|| SubscriptionError::Transport("missing record".to_string()))?;
        serde_json::from_value(value).map_err(|e| SubscriptionError::Transport(e.to_string()))
    };

    match data.kind.as_str() {
        "INSERT" => Ok(ChangeEvent::Insert(record(data.record)?)),
        "UPDATE" => Ok(ChangeEvent::Update(record(data.record)?)),
        "DELETE" => {
            // The old record carries at least the primary key.
            let id = data
                .old_record
                .as_ref()
                .and_then(|r| r.get("id"))
                .and_then(Value::as_str)
                .ok_or_else(|| SubscriptionError::Transport("delete without old id".to_string()))?;
            Ok(ChangeEvent::Delete { id: id.to_string() })
        }
        other => Err(SubscriptionError::Transport(format!("unknown change type '{}'", other))),
    }
}

/// Builds the WebSocket endpoint for a backend base URL.
pub fn socket_url(backend_url: &str, anon_key: &str, events_per_second: u32) -> Result<Url, SubscriptionError> {
    let mut url = Url::parse(backend_url.trim_end_matches('/'))
        .map_err(|e| SubscriptionError::Transport(format!("invalid backend url: {}", e)))?;
    let scheme = match url.scheme() {
        "https" | "wss" => "wss",
        "http" | "ws" => "ws",
        other => {
            return Err(SubscriptionError::Transport(format!(
                "unsupported backend scheme '{}'",
                other
            )))
        }
    };
    url.set_scheme(scheme)
        .map_err(|_| SubscriptionError::Transport("cannot switch to websocket scheme".to_string()))?;
    url.set_path("/realtime/v1/websocket");
    url.query_pairs_mut()
        .clear()
        .append_pair("apikey", anon_key)
        .append_pair("eventsPerSecond", &events_per_second.to_string())
        .append_pair("vsn", PROTOCOL_VERSION);
    Ok(url)
}

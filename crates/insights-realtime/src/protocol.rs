//! Phoenix channel wire format used by the hosted realtime service.

use crate::{ChangeEvent, ChangeKind, ChannelSpec, RealtimeResult};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub(crate) const PHOENIX_TOPIC: &str = "phoenix";
const TOPIC_PREFIX: &str = "realtime:";

pub(crate) const EVENT_JOIN: &str = "phx_join";
pub(crate) const EVENT_LEAVE: &str = "phx_leave";
pub(crate) const EVENT_REPLY: &str = "phx_reply";
pub(crate) const EVENT_ERROR: &str = "phx_error";
pub(crate) const EVENT_CLOSE: &str = "phx_close";
pub(crate) const EVENT_HEARTBEAT: &str = "heartbeat";
pub(crate) const EVENT_ACCESS_TOKEN: &str = "access_token";
pub(crate) const EVENT_POSTGRES_CHANGES: &str = "postgres_changes";

/// One Phoenix frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct PhoenixMessage {
    pub topic: String,
    pub event: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(rename = "ref", default)]
    pub reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join_ref: Option<String>,
}

impl PhoenixMessage {
    pub fn join(spec: &ChannelSpec, access_token: Option<&str>, reference: String) -> Self {
        let mut change = json!({
            "event": "*",
            "schema": "public",
            "table": spec.table,
        });
        if let Some(filter) = &spec.filter {
            change["filter"] = Value::String(filter.to_postgrest());
        }
        let mut payload = json!({
            "config": {
                "broadcast": { "self": false },
                "presence": { "key": "" },
                "postgres_changes": [change],
            }
        });
        if let Some(token) = access_token {
            payload["access_token"] = Value::String(token.to_string());
        }
        Self {
            topic: spec.topic(),
            event: EVENT_JOIN.to_string(),
            payload,
            reference: Some(reference.clone()),
            join_ref: Some(reference),
        }
    }

    pub fn leave(key: &str, reference: String) -> Self {
        Self {
            topic: topic_for(key),
            event: EVENT_LEAVE.to_string(),
            payload: json!({}),
            reference: Some(reference),
            join_ref: None,
        }
    }

    pub fn heartbeat(reference: String) -> Self {
        Self {
            topic: PHOENIX_TOPIC.to_string(),
            event: EVENT_HEARTBEAT.to_string(),
            payload: json!({}),
            reference: Some(reference),
            join_ref: None,
        }
    }

    pub fn access_token(key: &str, token: Option<&str>, reference: String) -> Self {
        Self {
            topic: topic_for(key),
            event: EVENT_ACCESS_TOKEN.to_string(),
            payload: json!({ "access_token": token }),
            reference: Some(reference),
            join_ref: None,
        }
    }

    pub fn to_json(&self) -> RealtimeResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// What an incoming frame means to the client.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Incoming {
    /// A row change on a joined channel.
    Change { key: String, event: ChangeEvent },
    /// Reply to a request; `ok` is false when the server rejected it.
    Reply {
        topic: String,
        ok: bool,
        response: Value,
    },
    /// The server errored or closed a channel.
    ChannelDown { topic: String, event: String },
    /// Anything else (presence, system notices, heartbeat replies).
    Other,
}

pub(crate) fn decode_incoming(text: &str) -> RealtimeResult<Incoming> {
    let message: PhoenixMessage = serde_json::from_str(text)?;

    let incoming = match message.event.as_str() {
        EVENT_POSTGRES_CHANGES | "INSERT" | "UPDATE" | "DELETE" => {
            match (key_for(&message.topic), parse_change(&message.payload)) {
                (Some(key), Some(event)) => Incoming::Change {
                    key: key.to_string(),
                    event,
                },
                _ => Incoming::Other,
            }
        }
        EVENT_REPLY => Incoming::Reply {
            ok: message.payload.get("status").and_then(Value::as_str) == Some("ok"),
            response: message.payload.get("response").cloned().unwrap_or(Value::Null),
            topic: message.topic,
        },
        EVENT_ERROR | EVENT_CLOSE => Incoming::ChannelDown {
            topic: message.topic,
            event: message.event,
        },
        _ => Incoming::Other,
    };
    Ok(incoming)
}

fn topic_for(key: &str) -> String {
    format!("{TOPIC_PREFIX}{key}")
}

fn key_for(topic: &str) -> Option<&str> {
    topic.strip_prefix(TOPIC_PREFIX)
}

/// Change payloads arrive either wrapped in `data` or bare.
fn parse_change(payload: &Value) -> Option<ChangeEvent> {
    let data = payload.get("data").unwrap_or(payload);
    let kind = data
        .get("type")
        .or_else(|| data.get("eventType"))
        .and_then(Value::as_str)
        .and_then(ChangeKind::parse)?;
    let table = data.get("table").and_then(Value::as_str)?.to_string();
    Some(ChangeEvent {
        kind,
        table,
        old: row(data.get("old_record").or_else(|| data.get("old"))),
        new: row(data.get("record").or_else(|| data.get("new"))),
    })
}

fn row(value: Option<&Value>) -> Option<Value> {
    match value {
        Some(Value::Object(map)) if !map.is_empty() => Some(Value::Object(map.clone())),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_carries_table_filter_and_token() {
        let spec = ChannelSpec::filtered("comments-a1", "comments", "blog_id", "a1");
        let msg = PhoenixMessage::join(&spec, Some("jwt"), "1".to_string());
        assert_eq!(msg.topic, "realtime:comments-a1");
        assert_eq!(msg.event, "phx_join");
        let change = &msg.payload["config"]["postgres_changes"][0];
        assert_eq!(change["table"], "comments");
        assert_eq!(change["filter"], "blog_id=eq.a1");
        assert_eq!(msg.payload["access_token"], "jwt");

        let encoded: Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();
        assert_eq!(encoded["ref"], "1");
        assert_eq!(encoded["join_ref"], "1");
    }

    #[test]
    fn unfiltered_join_omits_filter() {
        let spec = ChannelSpec::table("blogs-changes", "articles");
        let msg = PhoenixMessage::join(&spec, None, "2".to_string());
        assert!(msg.payload["config"]["postgres_changes"][0].get("filter").is_none());
        assert!(msg.payload.get("access_token").is_none());
    }

    #[test]
    fn decodes_wrapped_postgres_change() {
        let text = r#"{"topic":"realtime:likes-a1","event":"postgres_changes","ref":null,
            "payload":{"data":{"type":"DELETE","table":"likes","schema":"public",
            "record":{},"old_record":{"id":"l1"}},"ids":[1]}}"#;
        match decode_incoming(text).unwrap() {
            Incoming::Change { key, event } => {
                assert_eq!(key, "likes-a1");
                assert_eq!(event.kind, ChangeKind::Delete);
                assert!(event.new.is_none());
                assert_eq!(event.record_id(), Some("l1"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn decodes_bare_change_event() {
        let text = r#"{"topic":"realtime:blogs-changes","event":"INSERT","ref":null,
            "payload":{"type":"INSERT","table":"articles","record":{"id":"a1"}}}"#;
        assert!(matches!(decode_incoming(text).unwrap(), Incoming::Change { .. }));
    }

    #[test]
    fn decodes_rejected_reply() {
        let text = r#"{"topic":"realtime:x","event":"phx_reply","ref":"3",
            "payload":{"status":"error","response":{"reason":"unauthorized"}}}"#;
        match decode_incoming(text).unwrap() {
            Incoming::Reply { ok, response, .. } => {
                assert!(!ok);
                assert_eq!(response["reason"], "unauthorized");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn system_frames_are_other() {
        let text = r#"{"topic":"realtime:x","event":"system","payload":{"status":"ok"},"ref":null}"#;
        assert_eq!(decode_incoming(text).unwrap(), Incoming::Other);
    }
}

//! Envelope shapes from the backend and the canonical inbound message.
//!
//! The backend's envelope schema is open-ended — fields come and go across
//! backend versions, and absent or unknown fields must never be an error.
//! `Envelope` is therefore a thin wrapper over the raw JSON with total
//! accessors, and `normalize` is a pure function that cannot fail.

use serde::Serialize;
use serde_json::Value;

/// One message event as reported by the backend's receive API.
#[derive(Debug, Clone)]
pub struct Envelope(Value);

impl Envelope {
    pub fn new(raw: Value) -> Self {
        Self(raw)
    }

    /// Sender identifier, when the backend reported one.
    pub fn source(&self) -> Option<&str> {
        self.0.get("source").and_then(Value::as_str)
    }

    pub fn timestamp(&self) -> Option<i64> {
        self.0.get("timestamp").and_then(Value::as_i64)
    }

    fn data_message(&self) -> Option<&Value> {
        self.0.get("dataMessage").filter(|v| !v.is_null())
    }

    /// Message text, when the envelope carries a data message with text.
    pub fn message_text(&self) -> Option<&str> {
        self.data_message()?.get("message").and_then(Value::as_str)
    }

    /// Group metadata. An absent, null, or empty `groupInfo` object all
    /// count as "not a group message".
    fn group_info(&self) -> Option<&Value> {
        self.data_message()?
            .get("groupInfo")
            .filter(|v| v.as_object().is_some_and(|o| !o.is_empty()))
    }

    pub fn into_raw(self) -> Value {
        self.0
    }
}

/// Group metadata carried on a normalized message.
#[derive(Debug, Clone, Serialize)]
pub struct GroupInfo {
    pub id: Option<String>,
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

/// Canonical inbound message shape posted to the downstream inbox.
///
/// `raw` preserves the original envelope untouched for consumers that need
/// backend-specific fields.
#[derive(Debug, Clone, Serialize)]
pub struct NormalizedMessage {
    pub from: Option<String>,
    pub timestamp: Option<i64>,
    pub message: Option<String>,
    pub group: Option<GroupInfo>,
    pub raw: Value,
}

/// Map a raw envelope into the canonical shape. Total: missing fields
/// become `None`, never errors.
pub fn normalize(envelope: Envelope) -> NormalizedMessage {
    let from = envelope.source().map(String::from);
    let timestamp = envelope.timestamp();
    let message = envelope.message_text().map(String::from);
    let group = envelope.group_info().map(|grp| GroupInfo {
        id: grp
            .get("groupId")
            .and_then(Value::as_str)
            .map(String::from),
        name: grp.get("name").and_then(Value::as_str).map(String::from),
        kind: grp.get("type").and_then(Value::as_str).map(String::from),
    });

    NormalizedMessage {
        from,
        timestamp,
        message,
        group,
        raw: envelope.into_raw(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn normalize_full_envelope() {
        let env = Envelope::new(json!({
            "source": "+1999",
            "timestamp": 1700000000123_i64,
            "dataMessage": {"message": "hello"}
        }));

        let msg = normalize(env);
        assert_eq!(msg.from.as_deref(), Some("+1999"));
        assert_eq!(msg.timestamp, Some(1700000000123));
        assert_eq!(msg.message.as_deref(), Some("hello"));
        assert!(msg.group.is_none());
    }

    #[test]
    fn normalize_missing_data_message_is_not_an_error() {
        let env = Envelope::new(json!({"source": "+1999", "timestamp": 5}));

        let msg = normalize(env);
        assert_eq!(msg.from.as_deref(), Some("+1999"));
        assert!(msg.message.is_none());
        assert!(msg.group.is_none());
    }

    #[test]
    fn normalize_totally_empty_envelope() {
        let msg = normalize(Envelope::new(json!({})));
        assert!(msg.from.is_none());
        assert!(msg.timestamp.is_none());
        assert!(msg.message.is_none());
        assert!(msg.group.is_none());
    }

    #[test]
    fn normalize_extracts_group_info() {
        let env = Envelope::new(json!({
            "source": "+1999",
            "dataMessage": {
                "message": "hi all",
                "groupInfo": {"groupId": "g1", "name": "friends", "type": "DELIVER"}
            }
        }));

        let msg = normalize(env);
        let group = msg.group.expect("group metadata should be present");
        assert_eq!(group.id.as_deref(), Some("g1"));
        assert_eq!(group.name.as_deref(), Some("friends"));
        assert_eq!(group.kind.as_deref(), Some("DELIVER"));
    }

    #[test]
    fn empty_group_info_object_counts_as_no_group() {
        let env = Envelope::new(json!({
            "source": "+1999",
            "dataMessage": {"message": "hi", "groupInfo": {}}
        }));
        assert!(normalize(env).group.is_none());
    }

    #[test]
    fn null_data_message_treated_as_absent() {
        let env = Envelope::new(json!({"source": "+1999", "dataMessage": null}));
        assert!(env.message_text().is_none());
        assert!(normalize(env).message.is_none());
    }

    #[test]
    fn normalize_preserves_raw_envelope() {
        let raw = json!({
            "source": "+1999",
            "dataMessage": {"message": "hi"},
            "backendOnlyField": {"nested": true}
        });
        let msg = normalize(Envelope::new(raw.clone()));
        assert_eq!(msg.raw, raw);
    }

    #[test]
    fn serializes_group_as_type_and_null_when_absent() {
        let msg = normalize(Envelope::new(json!({"source": "+1999"})));
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["from"], "+1999");
        assert_eq!(value["message"], Value::Null);
        assert_eq!(value["group"], Value::Null);

        let msg = normalize(Envelope::new(json!({
            "dataMessage": {"groupInfo": {"groupId": "g1", "type": "DELIVER"}}
        })));
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["group"]["id"], "g1");
        assert_eq!(value["group"]["type"], "DELIVER");
        assert_eq!(value["group"]["name"], Value::Null);
    }

    #[test]
    fn non_string_source_is_ignored() {
        let env = Envelope::new(json!({"source": 12345}));
        assert!(env.source().is_none());
    }
}

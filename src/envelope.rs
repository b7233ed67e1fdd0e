//! The wire format exchanged over a room WebSocket: a small JSON envelope
//! wrapping an opaque `data` payload. The server stamps `id`/`from`/`timestamp`
//! on every outgoing frame; any client-supplied values for those fields are
//! discarded.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Sentinel `from` used for server-originated frames not attributable to a client.
pub const SERVER_SENTINEL: &str = "server";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    pub id: String,
    pub from: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    pub timestamp: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seq: Option<i64>,
    pub data: Value,
}

impl Envelope {
    /// Build a server-stamped envelope. `id`/`timestamp` come from the
    /// allocator and clock at call time; `from` is always set by the caller to
    /// either a ConnectionID or [`SERVER_SENTINEL`].
    pub fn new(kind: impl Into<String>, id: u64, from: impl Into<String>, data: Value) -> Self {
        Self {
            kind: kind.into(),
            id: id.to_string(),
            from: from.into(),
            to: None,
            timestamp: crate::now_epoch_millis(),
            seq: None,
            data,
        }
    }

    pub fn with_to(mut self, to: impl Into<String>) -> Self {
        self.to = Some(to.into());
        self
    }

    pub fn with_seq(mut self, seq: Option<i64>) -> Self {
        self.seq = seq;
        self
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).expect("Envelope always serializes")
    }
}

/// A decoded but not-yet-validated inbound frame. We parse loosely into a raw
/// JSON object first so malformed input (not an object, missing `type`,
/// non-numeric `seq`) can be rejected with a specific reason before we ever
/// construct a typed [`Envelope`].
#[derive(Debug)]
pub struct InboundFrame {
    pub kind: String,
    pub to: Option<String>,
    pub seq: Option<i64>,
    pub data: Value,
    pub exclude_self: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    NotAnObject,
    MissingType,
    NonNumericSeq,
}

impl DecodeError {
    pub fn reason(self) -> &'static str {
        match self {
            DecodeError::NotAnObject => "not-an-object",
            DecodeError::MissingType => "missing-type",
            DecodeError::NonNumericSeq => "non-numeric-seq",
        }
    }
}

pub fn decode_inbound(raw: &str) -> Result<InboundFrame, DecodeError> {
    let value: Value = serde_json::from_str(raw).map_err(|_| DecodeError::NotAnObject)?;
    let obj = value.as_object().ok_or(DecodeError::NotAnObject)?;

    let kind = obj
        .get("type")
        .and_then(Value::as_str)
        .ok_or(DecodeError::MissingType)?
        .to_string();

    let seq = match obj.get("seq") {
        None | Some(Value::Null) => None,
        Some(Value::Number(n)) => Some(n.as_i64().ok_or(DecodeError::NonNumericSeq)?),
        Some(_) => return Err(DecodeError::NonNumericSeq),
    };

    let to = obj
        .get("to")
        .and_then(Value::as_str)
        .map(|s| s.to_string());

    let exclude_self = obj
        .get("exclude_self")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    let data = obj.get("data").cloned().unwrap_or(Value::Object(Default::default()));

    Ok(InboundFrame {
        kind,
        to,
        seq,
        data,
        exclude_self,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_well_formed_frame() {
        let raw = r#"{"type":"broadcast","seq":1,"data":{"text":"hi"}}"#;
        let frame = decode_inbound(raw).unwrap();
        assert_eq!(frame.kind, "broadcast");
        assert_eq!(frame.seq, Some(1));
        assert_eq!(frame.data, json!({"text": "hi"}));
    }

    #[test]
    fn rejects_non_object() {
        assert_eq!(decode_inbound("[1,2,3]").unwrap_err(), DecodeError::NotAnObject);
        assert_eq!(decode_inbound("not json").unwrap_err(), DecodeError::NotAnObject);
    }

    #[test]
    fn rejects_missing_type() {
        assert_eq!(
            decode_inbound(r#"{"seq":1}"#).unwrap_err(),
            DecodeError::MissingType
        );
    }

    #[test]
    fn rejects_non_numeric_seq() {
        assert_eq!(
            decode_inbound(r#"{"type":"ping","seq":"one"}"#).unwrap_err(),
            DecodeError::NonNumericSeq
        );
    }

    #[test]
    fn server_overwrites_id_and_from() {
        let env = Envelope::new("broadcast", 7, "42", json!({"text": "hi"}));
        assert_eq!(env.id, "7");
        assert_eq!(env.from, "42");
    }
}

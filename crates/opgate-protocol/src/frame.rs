use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One self-contained protocol message.
///
/// All three variants travel over the same connection, distinguished
/// by the `"type"` tag. `params`/`payload` stay opaque here; typed
/// shapes for the known method surface live in [`crate::methods`].
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type")]
pub enum Frame {
    /// Client-to-server call, answered by exactly one `Response`.
    #[serde(rename = "req")]
    Request {
        id: String,
        method: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        params: Option<Value>,
    },

    /// Reply to a request, correlated by `id`.
    #[serde(rename = "res")]
    Response {
        id: String,
        ok: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    /// Server-pushed event, not correlated to any request.
    #[serde(rename = "event")]
    Event {
        event: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        seq: Option<u64>,
        #[serde(
            rename = "stateVersion",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        state_version: Option<u64>,
    },
}

impl Frame {
    pub fn request(id: impl Into<String>, method: impl Into<String>, params: Option<Value>) -> Self {
        Frame::Request {
            id: id.into(),
            method: method.into(),
            params,
        }
    }

    pub fn response_ok(id: impl Into<String>, payload: Option<Value>) -> Self {
        Frame::Response {
            id: id.into(),
            ok: true,
            payload,
            error: None,
        }
    }

    pub fn response_err(id: impl Into<String>, error: impl Into<String>) -> Self {
        Frame::Response {
            id: id.into(),
            ok: false,
            payload: None,
            error: Some(error.into()),
        }
    }

    pub fn event(name: impl Into<String>, payload: Option<Value>) -> Self {
        Frame::Event {
            event: name.into(),
            payload,
            seq: None,
            state_version: None,
        }
    }

    /// Decode one text frame. Returns `None` for anything malformed;
    /// callers drop such frames instead of failing the connection.
    pub fn decode(text: &str) -> Option<Frame> {
        serde_json::from_str(text).ok()
    }

    pub fn encode(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_tag_format() {
        let frame = Frame::request("1", "health", None);
        let json = frame.encode().unwrap();
        assert_eq!(json, r#"{"type":"req","id":"1","method":"health"}"#);
    }

    #[test]
    fn request_roundtrip_with_params() {
        let frame = Frame::request("req_1", "chat.send", Some(json!({"content": "hi"})));
        let decoded = Frame::decode(&frame.encode().unwrap()).unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn response_decodes_without_payload() {
        let frame = Frame::decode(r#"{"type":"res","id":"a","ok":true}"#).unwrap();
        match frame {
            Frame::Response { id, ok, payload, error } => {
                assert_eq!(id, "a");
                assert!(ok);
                assert!(payload.is_none());
                assert!(error.is_none());
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn event_decodes_state_version() {
        let frame =
            Frame::decode(r#"{"type":"event","event":"tick","seq":7,"stateVersion":12}"#).unwrap();
        match frame {
            Frame::Event { event, seq, state_version, .. } => {
                assert_eq!(event, "tick");
                assert_eq!(seq, Some(7));
                assert_eq!(state_version, Some(12));
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn malformed_frames_decode_to_none() {
        assert!(Frame::decode("not json").is_none());
        assert!(Frame::decode(r#"{"type":"nope"}"#).is_none());
        // method must be a string
        assert!(Frame::decode(r#"{"type":"req","id":"1","method":5}"#).is_none());
        // missing id
        assert!(Frame::decode(r#"{"type":"req","method":"health"}"#).is_none());
    }

    #[test]
    fn unknown_fields_are_tolerated() {
        let frame = Frame::decode(
            r#"{"type":"res","id":"1","ok":true,"payload":{},"futureField":"x"}"#,
        );
        assert!(frame.is_some());
    }

    #[test]
    fn error_response_roundtrip() {
        let frame = Frame::response_err("9", "Unknown method: nope");
        let json = frame.encode().unwrap();
        assert!(json.contains(r#""ok":false"#));
        let decoded = Frame::decode(&json).unwrap();
        assert_eq!(decoded, frame);
    }
}

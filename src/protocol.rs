//! The wire vocabulary exchanged over the persistent connection.
//!
//! Every message is a text frame containing one JSON document. The two
//! directional unions are discriminated by a `type` tag; the connect
//! handshake is its own untagged shape because it is only ever the first
//! message of a connection. An unrecognized tag is a decode error, never a
//! silent drop.

use crate::error::LiveError;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// The handshake, sent once by the client immediately after the transport
/// reaches `open`. Identifies which view to mount and with what request
/// parameters; the server re-derives state from the parameters through the
/// same init function that backs the plain-HTTP render.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connect {
    pub path: String,
    #[serde(default)]
    pub parameters: IndexMap<String, String>,
}

impl Connect {
    pub fn new(path: &str) -> Self {
        Self {
            path: path.to_string(),
            parameters: IndexMap::new(),
        }
    }

    pub fn parameter(mut self, key: &str, value: &str) -> Self {
        self.parameters.insert(key.to_string(), value.to_string());
        self
    }

    pub fn encode(&self) -> Result<String, LiveError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(text: &str) -> Result<Self, LiveError> {
        Ok(serde_json::from_str(text)?)
    }
}

/// Client-to-server messages following the handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientEvent {
    /// A bound interactive element was activated.
    Invoke { identifier: String },
    /// Explicit request for a re-render regardless of state change.
    Refresh,
}

impl ClientEvent {
    pub fn encode(&self) -> Result<String, LiveError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(text: &str) -> Result<Self, LiveError> {
        Ok(serde_json::from_str(text)?)
    }
}

/// Server-to-client messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerUpdate {
    /// The full re-rendered markup for the view root. Not a diff; diffing
    /// against the live document is the client reconciler's job.
    Render { html: String },
}

impl ServerUpdate {
    pub fn encode(&self) -> Result<String, LiveError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(text: &str) -> Result<Self, LiveError> {
        Ok(serde_json::from_str(text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn connect_round_trip() {
        let msg = Connect::new("/counter").parameter("initial", "5");
        let decoded = Connect::decode(&msg.encode().unwrap()).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn connect_parameters_default_to_empty() {
        let decoded = Connect::decode(r#"{"path":"/"}"#).unwrap();
        assert_eq!(decoded, Connect::new("/"));
    }

    #[test]
    fn invoke_round_trip() {
        let msg = ClientEvent::Invoke {
            identifier: "increment".to_string(),
        };
        let encoded = msg.encode().unwrap();
        assert_eq!(encoded, r#"{"type":"invoke","identifier":"increment"}"#);
        assert_eq!(ClientEvent::decode(&encoded).unwrap(), msg);
    }

    #[test]
    fn refresh_round_trip() {
        let encoded = ClientEvent::Refresh.encode().unwrap();
        assert_eq!(encoded, r#"{"type":"refresh"}"#);
        assert_eq!(ClientEvent::decode(&encoded).unwrap(), ClientEvent::Refresh);
    }

    #[test]
    fn render_round_trip() {
        let msg = ServerUpdate::Render {
            html: "<p>Count = 6</p>".to_string(),
        };
        let encoded = msg.encode().unwrap();
        assert_eq!(encoded, r#"{"type":"render","html":"<p>Count = 6</p>"}"#);
        assert_eq!(ServerUpdate::decode(&encoded).unwrap(), msg);
    }

    #[test]
    fn unknown_tag_is_a_decode_error() {
        let result = ClientEvent::decode(r#"{"type":"teleport"}"#);
        assert!(matches!(result, Err(LiveError::Decode(_))));
    }

    #[test]
    fn garbage_is_a_decode_error() {
        assert!(matches!(
            ServerUpdate::decode("not json"),
            Err(LiveError::Decode(_))
        ));
    }
}

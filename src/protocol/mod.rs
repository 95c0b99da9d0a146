//! Wire messages exchanged over the streaming endpoint.
//!
//! Both directions are JSON objects discriminated by a `type` field.

use serde::{Deserialize, Serialize};

/// A chunk of log output tagged with the container that produced it.
///
/// `container_id` is the origin tag: it names the tail process that emitted
/// the chunk, not whatever container happens to be selected when the message
/// is dispatched or received.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogMessage {
    pub data: String,
    #[serde(rename = "containerId")]
    pub container_id: String,
}

impl LogMessage {
    pub fn new(data: impl Into<String>, container_id: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            container_id: container_id.into(),
        }
    }
}

/// Server -> client messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamMessage {
    Log(LogMessage),
    Started {
        #[serde(rename = "containerId")]
        container_id: String,
    },
    End {
        message: String,
    },
    Error {
        message: String,
    },
    Stopped,
}

impl StreamMessage {
    pub fn log(data: impl Into<String>, container_id: impl Into<String>) -> Self {
        Self::Log(LogMessage::new(data, container_id))
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    pub fn is_log(&self) -> bool {
        matches!(self, Self::Log(_))
    }

    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Parameters of a stream-start request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartRequest {
    #[serde(rename = "containerId")]
    pub container_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tail: Option<u32>,
}

/// Client -> server messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientRequest {
    Start(StartRequest),
    Stop,
}

impl ClientRequest {
    pub fn start(container_id: impl Into<String>, filter: Option<String>, tail: Option<u32>) -> Self {
        Self::Start(StartRequest {
            container_id: container_id.into(),
            filter,
            tail,
        })
    }

    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_log_message_wire_shape() {
        let msg = StreamMessage::log("line one\nline two", "c1");
        let value: serde_json::Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({"type": "log", "data": "line one\nline two", "containerId": "c1"})
        );
    }

    #[test]
    fn test_control_messages_wire_shape() {
        let started: serde_json::Value =
            serde_json::to_value(StreamMessage::Started { container_id: "abc".into() }).unwrap();
        assert_eq!(started, json!({"type": "started", "containerId": "abc"}));

        let stopped = serde_json::to_value(StreamMessage::Stopped).unwrap();
        assert_eq!(stopped, json!({"type": "stopped"}));

        let end = serde_json::to_value(StreamMessage::End { message: "exited".into() }).unwrap();
        assert_eq!(end, json!({"type": "end", "message": "exited"}));
    }

    #[test]
    fn test_log_without_origin_tag_is_rejected() {
        let result = StreamMessage::from_json(r#"{"type":"log","data":"hello"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        assert!(StreamMessage::from_json(r#"{"type":"bogus"}"#).is_err());
        assert!(ClientRequest::from_json(r#"{"type":"restart"}"#).is_err());
        assert!(ClientRequest::from_json("not json").is_err());
    }

    #[test]
    fn test_start_request_optional_fields() {
        let req = ClientRequest::from_json(r#"{"type":"start","containerId":"web"}"#).unwrap();
        assert_eq!(req, ClientRequest::start("web", None, None));

        let req = ClientRequest::from_json(
            r#"{"type":"start","containerId":"web","filter":"ERROR","tail":50}"#,
        )
        .unwrap();
        assert_eq!(req, ClientRequest::start("web", Some("ERROR".into()), Some(50)));
    }

    #[test]
    fn test_start_request_omits_absent_fields() {
        let text = ClientRequest::start("web", None, None).to_json().unwrap();
        assert_eq!(text, r#"{"type":"start","containerId":"web"}"#);
        assert_eq!(ClientRequest::Stop.to_json().unwrap(), r#"{"type":"stop"}"#);
    }
}

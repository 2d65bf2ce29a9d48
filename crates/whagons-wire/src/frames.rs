use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::change::ChangeOp;

/// Normal closure, also used for server shutdown.
pub const CLOSE_NORMAL: u16 = 1000;
/// Authentication or negotiation failure.
pub const CLOSE_POLICY: u16 = 4001;

/// Envelope for every non-publication frame on the socket.
///
/// The `(type, operation)` pair selects the frame semantics:
/// `system/authenticated`, `system/server_shutdown`, `system/broadcast`,
/// `echo/echo`, `error/auth_error`, `ping/health_check`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemFrame {
    #[serde(rename = "type")]
    pub frame_type: String,
    pub operation: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    pub timestamp: String,
    #[serde(rename = "sessionId")]
    pub session_id: String,
}

impl SystemFrame {
    pub fn new(
        frame_type: impl Into<String>,
        operation: impl Into<String>,
        message: impl Into<String>,
        data: Option<Value>,
    ) -> Self {
        Self {
            frame_type: frame_type.into(),
            operation: operation.into(),
            message: message.into(),
            data,
            timestamp: now_rfc3339(),
            session_id: String::new(),
        }
    }

    /// Welcome frame sent once authentication succeeds, before registration.
    pub fn authenticated(domain: &str, tenant_name: &str, data: Value) -> Self {
        Self::new(
            "system",
            "authenticated",
            format!("Authenticated for domain: {domain} (tenant: {tenant_name})"),
            Some(data),
        )
    }

    pub fn echo(tenant_name: &str, received: &str) -> Self {
        Self::new(
            "echo",
            "echo",
            format!("Echo from {tenant_name}: {received}"),
            Some(Value::String(received.to_string())),
        )
    }

    pub fn auth_error(message: impl Into<String>) -> Self {
        Self::new("error", "auth_error", message, None)
    }

    pub fn health_check() -> Self {
        Self::new("ping", "health_check", "ping", None)
    }

    pub fn server_shutdown() -> Self {
        Self::new("system", "server_shutdown", "Server is shutting down", None)
    }

    /// Stamps the recipient's session id; frames are stamped per session at
    /// send time, never shared between recipients.
    pub fn with_session(mut self, session_id: &str) -> Self {
        self.session_id = session_id.to_string();
        self
    }

    pub fn to_json(&self) -> String {
        // Serialization of a plain struct with string/JSON fields cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Row-change frame delivered to sessions authorized for the event's tenant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicationMessage {
    pub tenant_name: String,
    pub table: String,
    pub operation: ChangeOp,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_data: Option<Value>,
    pub message: String,
    pub db_timestamp: f64,
    pub client_timestamp: String,
    #[serde(rename = "sessionId")]
    pub session_id: String,
}

impl PublicationMessage {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

pub(crate) fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_frame_field_names() {
        let frame = SystemFrame::new("system", "broadcast", "hello", None).with_session("s1");
        let value: Value = serde_json::from_str(&frame.to_json()).expect("json");
        assert_eq!(value["type"], "system");
        assert_eq!(value["operation"], "broadcast");
        assert_eq!(value["message"], "hello");
        assert_eq!(value["sessionId"], "s1");
        // No data field when absent.
        assert!(value.get("data").is_none());
        // RFC3339 timestamps carry a timezone designator.
        let timestamp = value["timestamp"].as_str().expect("timestamp");
        assert!(timestamp.ends_with('Z') || timestamp.contains('+'));
    }

    #[test]
    fn echo_carries_received_text_as_data() {
        let frame = SystemFrame::echo("acme", "hi").with_session("s1");
        assert_eq!(frame.data, Some(Value::String("hi".to_string())));
        assert_eq!(frame.message, "Echo from acme: hi");
    }

    #[test]
    fn welcome_message_names_domain_and_tenant() {
        let frame = SystemFrame::authenticated(
            "acme.example",
            "acme",
            serde_json::json!({"domain": "acme.example"}),
        );
        assert_eq!(frame.frame_type, "system");
        assert_eq!(frame.operation, "authenticated");
        assert!(frame.message.contains("acme.example"));
        assert!(frame.message.contains("acme"));
    }

    #[test]
    fn publication_serializes_session_id_camel_case() {
        let message = PublicationMessage {
            tenant_name: "acme".to_string(),
            table: "wh_tasks".to_string(),
            operation: ChangeOp::Insert,
            new_data: Some(serde_json::json!({"id": 1})),
            old_data: None,
            message: "New task".to_string(),
            db_timestamp: 1_700_000_000.0,
            client_timestamp: now_rfc3339(),
            session_id: "s1".to_string(),
        };
        let value: Value = serde_json::from_str(&message.to_json()).expect("json");
        assert_eq!(value["sessionId"], "s1");
        assert_eq!(value["operation"], "INSERT");
        assert!(value.get("old_data").is_none());
    }
}

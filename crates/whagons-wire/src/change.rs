use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::frames::{PublicationMessage, now_rfc3339};
use crate::task::{TASKS_TABLE, TaskRecord};
use crate::{Error, Result};

/// Row-change operation emitted by the database triggers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeOp {
    Insert,
    Update,
    Delete,
}

impl std::fmt::Display for ChangeOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ChangeOp::Insert => "INSERT",
            ChangeOp::Update => "UPDATE",
            ChangeOp::Delete => "DELETE",
        };
        f.write_str(label)
    }
}

/// NOTIFY payload shape produced by the tracked-table triggers.
#[derive(Debug, Deserialize)]
struct RawNotification {
    table: String,
    operation: ChangeOp,
    new_data: Option<Value>,
    old_data: Option<Value>,
    timestamp: f64,
}

/// A parsed row-change event, stamped with the tenant that emitted it.
///
/// Row payloads stay opaque JSON; only the task shape gets field-level
/// parsing, and only to render a human-readable message.
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    pub tenant_name: String,
    pub table: String,
    pub op: ChangeOp,
    pub new_row: Option<Value>,
    pub old_row: Option<Value>,
    pub db_timestamp: f64,
    pub received_at: DateTime<Utc>,
}

impl ChangeEvent {
    /// Parses a raw notification payload for `tenant_name`.
    ///
    /// INSERT requires `new_data` and DELETE requires `old_data`; an UPDATE
    /// is expected to carry both, but a missing half is tolerated so a
    /// partially populated trigger still propagates.
    pub fn parse(tenant_name: &str, payload: &str) -> Result<Self> {
        let raw: RawNotification = serde_json::from_str(payload)?;
        match raw.operation {
            ChangeOp::Insert if raw.new_data.is_none() => {
                return Err(Error::MissingData {
                    op: raw.operation,
                    field: "new_data",
                });
            }
            ChangeOp::Delete if raw.old_data.is_none() => {
                return Err(Error::MissingData {
                    op: raw.operation,
                    field: "old_data",
                });
            }
            _ => {}
        }
        Ok(Self {
            tenant_name: tenant_name.to_string(),
            table: raw.table,
            op: raw.operation,
            new_row: raw.new_data,
            old_row: raw.old_data,
            db_timestamp: raw.timestamp,
            received_at: Utc::now(),
        })
    }

    /// Renders the human-readable summary carried on the publication frame.
    pub fn human_message(&self) -> String {
        if self.table != TASKS_TABLE {
            return format!("{} on {} in {}", self.op, self.table, self.tenant_name);
        }
        match self.op {
            ChangeOp::Insert => format!(
                "New task '{}' created in {}",
                task_name(self.new_row.as_ref()),
                self.tenant_name
            ),
            ChangeOp::Update => format!(
                "Task '{}' updated in {}",
                task_name(self.new_row.as_ref()),
                self.tenant_name
            ),
            ChangeOp::Delete => format!(
                "Task '{}' deleted from {}",
                task_name(self.old_row.as_ref()),
                self.tenant_name
            ),
        }
    }

    /// Builds the frame delivered to one session. The session id and client
    /// timestamp are stamped here, per recipient.
    pub fn to_publication(&self, session_id: &str) -> PublicationMessage {
        PublicationMessage {
            tenant_name: self.tenant_name.clone(),
            table: self.table.clone(),
            operation: self.op,
            new_data: self.new_row.clone(),
            old_data: self.old_row.clone(),
            message: self.human_message(),
            db_timestamp: self.db_timestamp,
            client_timestamp: now_rfc3339(),
            session_id: session_id.to_string(),
        }
    }
}

fn task_name(row: Option<&Value>) -> String {
    row.and_then(|value| TaskRecord::from_value(value))
        .map(|task| task.name)
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_insert_with_new_data() {
        let payload = r#"{
            "table": "wh_tasks",
            "operation": "INSERT",
            "new_data": {"id": 1, "name": "T1"},
            "timestamp": 1700000000
        }"#;
        let event = ChangeEvent::parse("acme", payload).expect("parse");
        assert_eq!(event.op, ChangeOp::Insert);
        assert_eq!(event.table, "wh_tasks");
        assert_eq!(event.db_timestamp, 1_700_000_000.0);
        assert_eq!(event.human_message(), "New task 'T1' created in acme");
    }

    #[test]
    fn insert_without_new_data_is_rejected() {
        let payload = r#"{"table": "wh_tasks", "operation": "INSERT", "timestamp": 1}"#;
        let err = ChangeEvent::parse("acme", payload).expect_err("missing new_data");
        assert!(matches!(
            err,
            Error::MissingData {
                op: ChangeOp::Insert,
                field: "new_data"
            }
        ));
    }

    #[test]
    fn delete_without_old_data_is_rejected() {
        let payload = r#"{"table": "wh_tasks", "operation": "DELETE", "timestamp": 1}"#;
        let err = ChangeEvent::parse("acme", payload).expect_err("missing old_data");
        assert!(matches!(
            err,
            Error::MissingData {
                op: ChangeOp::Delete,
                field: "old_data"
            }
        ));
    }

    #[test]
    fn update_with_one_half_is_tolerated() {
        let payload = r#"{
            "table": "wh_tasks",
            "operation": "UPDATE",
            "new_data": {"id": 2, "name": "T2"},
            "timestamp": 2
        }"#;
        let event = ChangeEvent::parse("acme", payload).expect("parse");
        assert!(event.old_row.is_none());
        assert_eq!(event.human_message(), "Task 'T2' updated in acme");
    }

    #[test]
    fn unknown_tables_pass_through_with_generic_message() {
        let payload = r#"{
            "table": "wh_teams",
            "operation": "DELETE",
            "old_data": {"id": 9, "label": "ops"},
            "timestamp": 3
        }"#;
        let event = ChangeEvent::parse("globex", payload).expect("parse");
        assert_eq!(event.human_message(), "DELETE on wh_teams in globex");
        // Raw payload survives untouched for the client.
        assert_eq!(event.old_row.as_ref().unwrap()["label"], "ops");
    }

    #[test]
    fn malformed_payload_is_a_parse_error() {
        let err = ChangeEvent::parse("acme", "not json").expect_err("parse error");
        assert!(matches!(err, Error::Payload(_)));
    }

    #[test]
    fn unparseable_task_row_falls_back_to_unknown() {
        let payload = r#"{
            "table": "wh_tasks",
            "operation": "DELETE",
            "old_data": {"unexpected": true},
            "timestamp": 4
        }"#;
        let event = ChangeEvent::parse("acme", payload).expect("parse");
        assert_eq!(event.human_message(), "Task 'unknown' deleted from acme");
    }

    #[test]
    fn publication_stamps_session_and_client_time() {
        let payload = r#"{
            "table": "wh_tasks",
            "operation": "INSERT",
            "new_data": {"id": 1, "name": "T1"},
            "timestamp": 1700000000
        }"#;
        let event = ChangeEvent::parse("acme", payload).expect("parse");
        let publication = event.to_publication("session-7");
        assert_eq!(publication.session_id, "session-7");
        assert_eq!(publication.tenant_name, "acme");
        assert!(!publication.client_timestamp.is_empty());
        assert_eq!(publication.new_data.as_ref().unwrap()["name"], "T1");
    }
}

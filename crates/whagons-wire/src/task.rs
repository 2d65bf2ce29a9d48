use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Table whose rows get field-level parsing for readable messages.
pub const TASKS_TABLE: &str = "wh_tasks";

/// Typed view of a task row as emitted by the `wh_tasks` trigger.
///
/// Fields default so that partially populated trigger payloads still parse;
/// the gateway only ever reads `name`, the rest ride along for clients that
/// want the typed shape.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskRecord {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub workspace_id: i64,
    #[serde(default)]
    pub template_id: i64,
    #[serde(default)]
    pub spot_id: i64,
    #[serde(default)]
    pub status_id: i64,
    #[serde(default)]
    pub priority_id: i64,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub due_date: Option<String>,
    #[serde(default)]
    pub expected_duration: i64,
    #[serde(default)]
    pub response_date: Option<String>,
    #[serde(default)]
    pub resolution_date: Option<String>,
    #[serde(default)]
    pub work_duration: i64,
    #[serde(default)]
    pub pause_duration: i64,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
    #[serde(default)]
    pub team_id: i64,
}

impl TaskRecord {
    /// Best-effort parse; anything that is not an object with compatible
    /// fields yields `None`.
    pub fn from_value(value: &Value) -> Option<Self> {
        serde_json::from_value(value.clone()).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_row() {
        let row = serde_json::json!({
            "id": 12,
            "name": "Inspect boiler",
            "workspace_id": 3,
            "template_id": 1,
            "spot_id": 4,
            "status_id": 2,
            "priority_id": 1,
            "start_date": null,
            "due_date": "2026-08-03",
            "expected_duration": 30,
            "response_date": null,
            "resolution_date": null,
            "work_duration": 0,
            "pause_duration": 0,
            "created_at": "2026-08-01T10:00:00Z",
            "updated_at": "2026-08-01T10:00:00Z",
            "team_id": 7
        });
        let task = TaskRecord::from_value(&row).expect("parse");
        assert_eq!(task.name, "Inspect boiler");
        assert_eq!(task.due_date.as_deref(), Some("2026-08-03"));
        assert_eq!(task.team_id, 7);
    }

    #[test]
    fn parses_partial_row_with_defaults() {
        let row = serde_json::json!({"id": 1, "name": "T1"});
        let task = TaskRecord::from_value(&row).expect("parse");
        assert_eq!(task.id, 1);
        assert_eq!(task.workspace_id, 0);
        assert!(task.start_date.is_none());
    }

    #[test]
    fn non_object_yields_none() {
        assert!(TaskRecord::from_value(&Value::String("nope".into())).is_none());
    }
}

//! Purpose: Define a stable, structured schema for non-fatal stderr notices.
//! Exports: `Notice`, `notice_json`, `short_write_notice`.
//! Role: Shared contract helper for CLI diagnostics (non-error events such as short writes).
//! Invariants: Notices are non-fatal and never alter stdout payloads.
//! Invariants: JSON schema is stable once published; fields are additive-only.
use serde_json::{Map, Value, json};

use crate::core::source::IoWarning;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub kind: String,
    pub time: String,
    pub cmd: String,
    pub file: String,
    pub message: String,
    pub details: Map<String, Value>,
}

pub fn short_write_notice(cmd: &str, time: String, warning: &IoWarning) -> Notice {
    let mut details = Map::new();
    details.insert("expected_bytes".to_string(), json!(warning.expected));
    details.insert("written_bytes".to_string(), json!(warning.written));
    details.insert("offset".to_string(), json!(warning.offset));
    Notice {
        kind: "short_write".to_string(),
        time,
        cmd: cmd.to_string(),
        file: warning.path.display().to_string(),
        message: warning.message(),
        details,
    }
}

pub fn notice_json(notice: &Notice) -> Value {
    let mut inner = Map::new();
    inner.insert("kind".to_string(), json!(notice.kind));
    inner.insert("time".to_string(), json!(notice.time));
    inner.insert("cmd".to_string(), json!(notice.cmd));
    inner.insert("file".to_string(), json!(notice.file));
    inner.insert("message".to_string(), json!(notice.message));
    inner.insert("details".to_string(), Value::Object(notice.details.clone()));

    let mut outer = Map::new();
    outer.insert("notice".to_string(), Value::Object(inner));
    Value::Object(outer)
}

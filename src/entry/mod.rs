// SPDX-License-Identifier: Apache-2.0

mod ksuid;
mod payload;
mod priority;
mod validate;

pub use ksuid::{ENCODED_LEN as KSUID_LEN, Ksuid, KsuidError};
pub use payload::{ChangeData, DebugData, FieldChange, Payload, canonical_string};
pub use priority::{LogType, Priority, Status};
pub use validate::{DEFAULT_MAX_IDENTIFIER_LEN, ValidationError, ValidationKind, Validator};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single structured log record. One entry is encoded as one JSON line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LogEntry {
    pub id: String,
    pub app: String,
    pub system: String,
    pub module: String,
    #[serde(rename = "type")]
    pub log_type: LogType,
    pub pri: Priority,
    pub when: DateTime<Utc>,
    pub who: String,
    pub op: String,
    pub class: String,
    pub instance: String,
    pub status: Status,
    #[serde(default, skip_serializing_if = "error_is_empty")]
    pub error: Option<String>,
    pub remote_ip: String,
    pub trace_id: String,
    pub msg: String,
    pub data: Payload,
}

fn error_is_empty(err: &Option<String>) -> bool {
    err.as_deref().is_none_or(str::is_empty)
}

impl LogEntry {
    /// Encodes the entry as a newline terminated JSON line.
    pub fn to_line(&self) -> Result<Vec<u8>, serde_json::Error> {
        let mut line = serde_json::to_vec(self)?;
        line.push(b'\n');
        Ok(line)
    }

    pub fn from_line(line: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(line.trim_ascii_end())
    }
}

#[cfg(test)]
pub(crate) mod test_util {
    use super::*;
    use chrono::Duration;

    pub fn sample_entry() -> LogEntry {
        LogEntry {
            id: Ksuid::new().to_string(),
            app: "myapp".to_string(),
            system: "host1".to_string(),
            module: "auth".to_string(),
            log_type: LogType::Activity,
            pri: Priority::Info,
            when: Utc::now() - Duration::seconds(1),
            who: "john".to_string(),
            op: "login".to_string(),
            class: "session".to_string(),
            instance: "s1".to_string(),
            status: Status::Success,
            error: None,
            remote_ip: "10.1.2.3".to_string(),
            trace_id: Ksuid::new().to_string(),
            msg: "user login".to_string(),
            data: Payload::Activity("{}".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_util::sample_entry;
    use super::*;
    use serde_json::Value;

    #[test]
    fn test_line_shape() {
        let entry = sample_entry();
        let line = entry.to_line().unwrap();
        assert_eq!(line.last(), Some(&b'\n'));
        assert_eq!(line.iter().filter(|b| **b == b'\n').count(), 1);

        let v: Value = serde_json::from_slice(&line).unwrap();
        assert_eq!(v["type"], "A");
        assert_eq!(v["pri"], "Info");
        assert_eq!(v["status"], 1);
        assert!(v.get("error").is_none());

        assert_eq!(LogEntry::from_line(&line).unwrap(), entry);
    }

    #[test]
    fn test_error_omitted_only_when_empty() {
        let mut entry = sample_entry();
        entry.error = Some(String::new());
        let v: Value = serde_json::from_slice(&entry.to_line().unwrap()).unwrap();
        assert!(v.get("error").is_none());

        entry.error = Some("db: timeout".to_string());
        let v: Value = serde_json::from_slice(&entry.to_line().unwrap()).unwrap();
        assert_eq!(v["error"], "db: timeout");
    }

    #[test]
    fn test_unknown_fields_rejected() {
        let mut v = serde_json::to_value(sample_entry()).unwrap();
        v["extra"] = Value::from(1);
        assert!(serde_json::from_value::<LogEntry>(v).is_err());
    }
}

// SPDX-License-Identifier: Apache-2.0

use crate::entry::LogType;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The `data` field of a log entry. Serialized as an object with a single key
/// naming the variant, which must agree with the entry's `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Payload {
    #[serde(rename = "change_data")]
    Change(ChangeData),

    /// Canonical JSON encoding of an arbitrary key/value bag.
    #[serde(rename = "activity_data")]
    Activity(String),

    #[serde(rename = "debug_data")]
    Debug(DebugData),
}

impl Payload {
    pub fn log_type(&self) -> LogType {
        match self {
            Payload::Change(_) => LogType::Change,
            Payload::Activity(_) => LogType::Activity,
            Payload::Debug(_) => LogType::Debug,
        }
    }

    pub fn activity<T: Serialize + ?Sized>(data: &T) -> Result<Self, serde_json::Error> {
        Ok(Payload::Activity(serde_json::to_string(data)?))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FieldChange {
    pub field: String,
    pub old_value: String,
    pub new_value: String,
}

/// Describes a mutation of one entity. Built with `ChangeData::new` and
/// `with_change`, one call per modified field, in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChangeData {
    pub entity: String,
    pub op: String,
    pub changes: Vec<FieldChange>,
}

impl ChangeData {
    pub fn new(entity: impl Into<String>, op: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            op: op.into(),
            changes: Vec::new(),
        }
    }

    pub fn with_change(
        mut self,
        field: impl Into<String>,
        old_value: impl Into<Value>,
        new_value: impl Into<Value>,
    ) -> Self {
        self.changes.push(FieldChange {
            field: field.into(),
            old_value: canonical_string(&old_value.into()),
            new_value: canonical_string(&new_value.into()),
        });
        self
    }
}

/// Strings are kept as-is, everything else uses its compact JSON form.
pub fn canonical_string(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DebugData {
    pub pid: u32,
    pub runtime_version: String,
    pub file: String,
    pub line: u32,
    pub function: String,
    pub stack_trace: String,
    pub data: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_change_values_are_canonical_strings() {
        let change = ChangeData::new("user", "update")
            .with_change("name", "jon", "john")
            .with_change("age", 41, 42)
            .with_change("tags", json!(["a"]), Value::Null);

        assert_eq!(change.changes.len(), 3);
        assert_eq!(change.changes[0].old_value, "jon");
        assert_eq!(change.changes[1].new_value, "42");
        assert_eq!(change.changes[2].old_value, r#"["a"]"#);
        assert_eq!(change.changes[2].new_value, "");
    }

    #[test]
    fn test_single_key_object() {
        let p = Payload::activity(&json!({"username": "john"})).unwrap();
        let v = serde_json::to_value(&p).unwrap();
        assert_eq!(v, json!({"activity_data": "{\"username\":\"john\"}"}));
        assert_eq!(p.log_type(), LogType::Activity);

        let bad = json!({"activity_data": "{}", "debug_data": {}});
        assert!(serde_json::from_value::<Payload>(bad).is_err());
    }

    #[test]
    fn test_change_rejects_unknown_fields() {
        let v = json!({"change_data": {"entity": "u", "op": "x", "changes": [], "extra": 1}});
        assert!(serde_json::from_value::<Payload>(v).is_err());
    }
}

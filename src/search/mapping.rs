// SPDX-License-Identifier: Apache-2.0

use serde_json::{Value, json};

/// Index body for log entries.
pub fn index_mapping() -> Value {
    let keyword = json!({"type": "keyword"});

    json!({
        "mappings": {
            "dynamic": "strict",
            "properties": {
                "id": keyword,
                "app": keyword,
                "system": keyword,
                "module": keyword,
                "type": keyword,
                "pri": keyword,
                "when": {"type": "date"},
                "who": keyword,
                "op": keyword,
                "class": keyword,
                "instance": keyword,
                "status": {"type": "integer"},
                "error": {"type": "text"},
                "remote_ip": {"type": "ip"},
                "trace_id": keyword,
                "msg": {"type": "text"},
                "data": {
                    "properties": {
                        "change_data": {
                            "properties": {
                                "entity": keyword,
                                "op": keyword,
                                "changes": {
                                    "type": "nested",
                                    "properties": {
                                        "field": keyword,
                                        "old_value": {"type": "text"},
                                        "new_value": {"type": "text"}
                                    }
                                }
                            }
                        },
                        "activity_data": {"type": "text"},
                        "debug_data": {
                            "properties": {
                                "pid": {"type": "integer"},
                                "runtime_version": keyword,
                                "file": keyword,
                                "line": {"type": "integer"},
                                "function": keyword,
                                "stack_trace": {"type": "text"},
                                "data": {"type": "object", "enabled": false}
                            }
                        }
                    }
                }
            }
        }
    })
}

// SPDX-License-Identifier: Apache-2.0

//! Translation of [`LogFilter`]s into search request bodies.

use crate::entry::LogType;
use crate::query::errors::{QueryError, Result};
use crate::query::filter::{Cursor, LogFilter};
use chrono::SecondsFormat;
use regex::Regex;
use serde_json::{Value, json};
use std::sync::LazyLock;

/// Attributes `get_set` may facet on.
pub const SET_ATTRIBUTES: [&str; 10] = [
    "app",
    "type",
    "op",
    "instance",
    "module",
    "pri",
    "status",
    "remote_ip",
    "system",
    "who",
];

pub(crate) const MAX_BUCKETS: usize = 1000;
pub(crate) const SET_AGGREGATION: &str = "set";

static ATTRIBUTE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z]{1,9}$").expect("Hardcoded regex pattern is valid"));

pub(crate) fn validate_attribute(attr: &str) -> Result<()> {
    if !SET_ATTRIBUTES.contains(&attr) || !ATTRIBUTE_PATTERN.is_match(attr) {
        return Err(QueryError::InvalidAttribute(attr.to_string()));
    }
    Ok(())
}

fn term(field: &str, value: &str) -> Value {
    json!({ "term": { field: value } })
}

fn terms<'a>(field: &str, values: impl IntoIterator<Item = &'a str>) -> Value {
    let values: Vec<&str> = values.into_iter().collect();
    json!({ "terms": { field: values } })
}

fn time_window(filter: &LogFilter) -> Result<Option<Value>> {
    let format = |t: &chrono::DateTime<chrono::Utc>| t.to_rfc3339_opts(SecondsFormat::Millis, true);

    let range = match (&filter.from, &filter.to, filter.last_n_days) {
        (Some(from), Some(to), _) => {
            if to <= from {
                return Err(QueryError::InvalidTimeWindow("tots must be after fromts"));
            }
            json!({ "gte": format(from), "lte": format(to) })
        }
        (Some(from), None, _) => json!({ "gte": format(from) }),
        (None, Some(to), _) => json!({ "lte": format(to) }),
        (None, None, Some(days)) => json!({ "gte": format!("now-{}d/d", days) }),
        (None, None, None) => return Ok(None),
    };

    Ok(Some(json!({ "range": { "when": range } })))
}

/// Identity clauses. With `instance_needs_class`, `instance` is ignored
/// unless `class` is also set.
fn identity_clauses(filter: &LogFilter, instance_needs_class: bool, clauses: &mut Vec<Value>) {
    let instance = match (&filter.instance, &filter.class) {
        (Some(_), None) if instance_needs_class => None,
        (instance, _) => instance.as_ref(),
    };

    let fields = [
        ("app", filter.app.as_ref()),
        ("who", filter.who.as_ref()),
        ("class", filter.class.as_ref()),
        ("instance", instance),
        ("op", filter.op.as_ref()),
        ("remote_ip", filter.remote_ip.as_ref()),
        ("module", filter.module.as_ref()),
    ];
    for (field, value) in fields {
        if let Some(value) = value {
            clauses.push(term(field, value));
        }
    }
}

fn equality_priority_clauses(filter: &LogFilter, clauses: &mut Vec<Value>) {
    if let Some(log_type) = filter.log_type {
        clauses.push(term("type", log_type.as_str()));
    }
    if let Some(priority) = filter.priority {
        clauses.push(term("pri", priority.as_str()));
    }
}

/// Priority as a threshold. Without a type, a priority restricts the search
/// to activity and debug entries. Data changes keep equality semantics.
fn threshold_priority_clauses(filter: &LogFilter, clauses: &mut Vec<Value>) {
    match (filter.log_type, filter.priority) {
        (Some(log_type), _) => clauses.push(term("type", log_type.as_str())),
        (None, Some(_)) => clauses.push(terms(
            "type",
            [LogType::Activity.as_str(), LogType::Debug.as_str()],
        )),
        (None, None) => {}
    }

    if let Some(priority) = filter.priority {
        if filter.log_type == Some(LogType::Change) {
            clauses.push(term("pri", priority.as_str()));
        } else {
            clauses.push(terms("pri", priority.at_or_above().map(|p| p.as_str())));
        }
    }
}

fn search_after(cursor: &Cursor) -> (Vec<Value>, Vec<Value>) {
    let when = cursor.when.as_ref().map(|w| match w.parse::<i64>() {
        Ok(millis) => Value::from(millis),
        Err(_) => Value::from(w.as_str()),
    });

    let mut sort = Vec::with_capacity(2);
    let mut after = Vec::with_capacity(2);
    if let Some(when) = when {
        sort.push(json!({ "when": "desc" }));
        after.push(when);
    }
    if let Some(id) = &cursor.id {
        sort.push(json!({ "id": "desc" }));
        after.push(Value::from(id.as_str()));
    }
    (sort, after)
}

/// A page of entries sorted newest first. A cursor with only one component
/// sorts and resumes on that component alone.
pub(crate) fn logs_query(
    filter: &LogFilter,
    cursor: Option<&Cursor>,
    size: usize,
    threshold: bool,
) -> Result<Value> {
    let mut clauses = Vec::new();
    if let Some(window) = time_window(filter)? {
        clauses.push(window);
    }
    identity_clauses(filter, false, &mut clauses);
    if threshold {
        threshold_priority_clauses(filter, &mut clauses);
    } else {
        equality_priority_clauses(filter, &mut clauses);
    }

    let mut body = json!({
        "size": size,
        "track_total_hits": true,
        "query": { "bool": { "filter": clauses } },
        "sort": [{ "when": "desc" }, { "id": "desc" }],
    });

    if let Some(cursor) = cursor.filter(|c| !c.is_empty()) {
        let (sort, after) = search_after(cursor);
        body["sort"] = Value::from(sort);
        body["search_after"] = Value::from(after);
    }

    Ok(body)
}

/// A terms aggregation over `field`, named [`SET_AGGREGATION`].
pub(crate) fn set_query(field: &str, filter: &LogFilter) -> Result<Value> {
    let mut clauses = Vec::new();
    if let Some(window) = time_window(filter)? {
        clauses.push(window);
    }
    identity_clauses(filter, true, &mut clauses);
    threshold_priority_clauses(filter, &mut clauses);

    Ok(json!({
        "size": 0,
        "query": { "bool": { "filter": clauses } },
        "aggs": {
            SET_AGGREGATION: { "terms": { "field": field, "size": MAX_BUCKETS } }
        },
    }))
}

// SPDX-License-Identifier: Apache-2.0

//! Request bodies accepted by the query endpoints and their validation.

use crate::entry::{LogType, Priority};
use crate::query::{Cursor, LogFilter};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

pub const MAX_IDENTIFIER_LEN: usize = 64;
pub const MAX_CURSOR_LEN: usize = 128;
pub const MIN_DAYS: i64 = 1;
pub const MAX_DAYS: i64 = 365;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    Required,
    TooLong,
    NotAlphanumeric,
    OutOfRange,
    BadFormat,
    UnknownValue,
    InvalidJson,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: &'static str,
    pub code: ErrorCode,
}

impl FieldError {
    fn new(field: &'static str, code: ErrorCode) -> Self {
        Self { field, code }
    }
}

/// The JSON filter body shared by every endpoint. All fields are optional,
/// `set_attr` is required by `get_set` only. Empty strings count as absent.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct QueryRequest {
    pub fromts: Option<String>,
    pub tots: Option<String>,
    pub days: Option<i64>,
    pub app: Option<String>,
    pub who: Option<String>,
    pub class: Option<String>,
    pub instance: Option<String>,
    pub op: Option<String>,
    pub module: Option<String>,
    pub remote_ip: Option<String>,
    #[serde(rename = "type")]
    pub log_type: Option<String>,
    pub pri: Option<String>,
    pub cursor_when: Option<String>,
    pub cursor_id: Option<String>,
    pub set_attr: Option<String>,
}

/// A validated request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidQuery {
    pub filter: LogFilter,
    pub cursor: Option<Cursor>,
    pub set_attr: Option<String>,
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn parse_time(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(t) = DateTime::parse_from_rfc3339(value) {
        return Some(t.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|t| t.and_utc())
}

struct Checker {
    errors: Vec<FieldError>,
}

impl Checker {
    fn identifier(&mut self, field: &'static str, value: &Option<String>) -> Option<String> {
        let value = present(value)?;
        if value.len() > MAX_IDENTIFIER_LEN {
            self.errors.push(FieldError::new(field, ErrorCode::TooLong));
            return None;
        }
        if !value.chars().all(|c| c.is_ascii_alphanumeric()) {
            self.errors
                .push(FieldError::new(field, ErrorCode::NotAlphanumeric));
            return None;
        }
        Some(value.to_string())
    }

    fn time(&mut self, field: &'static str, value: &Option<String>) -> Option<DateTime<Utc>> {
        let value = present(value)?;
        let parsed = parse_time(value);
        if parsed.is_none() {
            self.errors.push(FieldError::new(field, ErrorCode::BadFormat));
        }
        parsed
    }

    fn parsed<T: std::str::FromStr>(&mut self, field: &'static str, value: &Option<String>) -> Option<T> {
        let value = present(value)?;
        let parsed = value.parse().ok();
        if parsed.is_none() {
            self.errors
                .push(FieldError::new(field, ErrorCode::UnknownValue));
        }
        parsed
    }

    fn cursor_part(&mut self, field: &'static str, value: &Option<String>) -> Option<String> {
        let value = present(value)?;
        if value.len() > MAX_CURSOR_LEN {
            self.errors.push(FieldError::new(field, ErrorCode::TooLong));
            return None;
        }
        Some(value.to_string())
    }
}

impl QueryRequest {
    /// Checks every field and reports all failures at once.
    pub fn validate(&self, requires_set_attr: bool) -> Result<ValidQuery, Vec<FieldError>> {
        let mut check = Checker { errors: Vec::new() };

        let from = check.time("fromts", &self.fromts);
        let to = check.time("tots", &self.tots);

        let last_n_days = match self.days {
            Some(days) if !(MIN_DAYS..=MAX_DAYS).contains(&days) => {
                check
                    .errors
                    .push(FieldError::new("days", ErrorCode::OutOfRange));
                None
            }
            Some(days) => Some(days as u32),
            None => None,
        };

        let remote_ip = present(&self.remote_ip).and_then(|ip| match ip.parse::<IpAddr>() {
            Ok(_) => Some(ip.to_string()),
            Err(_) => {
                check
                    .errors
                    .push(FieldError::new("remote_ip", ErrorCode::BadFormat));
                None
            }
        });

        let filter = LogFilter {
            from,
            to,
            last_n_days,
            app: check.identifier("app", &self.app),
            who: check.identifier("who", &self.who),
            class: check.identifier("class", &self.class),
            instance: check.identifier("instance", &self.instance),
            op: check.identifier("op", &self.op),
            remote_ip,
            module: check.identifier("module", &self.module),
            log_type: check.parsed::<LogType>("type", &self.log_type),
            priority: check.parsed::<Priority>("pri", &self.pri),
        };

        let cursor = Cursor {
            when: check.cursor_part("cursor_when", &self.cursor_when),
            id: check.cursor_part("cursor_id", &self.cursor_id),
        };

        let set_attr = present(&self.set_attr).map(str::to_string);
        if requires_set_attr && set_attr.is_none() {
            check
                .errors
                .push(FieldError::new("set_attr", ErrorCode::Required));
        }

        if !check.errors.is_empty() {
            return Err(check.errors);
        }

        Ok(ValidQuery {
            filter,
            cursor: (!cursor.is_empty()).then_some(cursor),
            set_attr,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn request(body: serde_json::Value) -> QueryRequest {
        serde_json::from_value(body).unwrap()
    }

    #[test]
    fn test_valid_request() {
        let valid = request(serde_json::json!({
            "fromts": "2024-02-01",
            "tots": "2024-05-01T12:30:00+02:00",
            "app": "myapp",
            "instance": "s1",
            "remote_ip": "10.1.2.3",
            "type": "A",
            "pri": "Warn",
            "cursor_when": "1714521600000",
            "cursor_id": "2abc"
        }))
        .validate(false)
        .unwrap();

        assert_eq!(
            valid.filter.from,
            Some(Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap())
        );
        assert_eq!(
            valid.filter.to,
            Some(Utc.with_ymd_and_hms(2024, 5, 1, 10, 30, 0).unwrap())
        );
        assert_eq!(valid.filter.app.as_deref(), Some("myapp"));
        assert_eq!(valid.filter.log_type, Some(LogType::Activity));
        assert_eq!(valid.filter.priority, Some(Priority::Warn));
        assert_eq!(valid.cursor, Some(Cursor::new("1714521600000", "2abc")));
        assert!(valid.set_attr.is_none());
    }

    #[test]
    fn test_empty_request() {
        let valid = QueryRequest::default().validate(false).unwrap();
        assert_eq!(valid, ValidQuery::default());

        let valid = request(serde_json::json!({ "app": "", "cursor_id": " " }))
            .validate(false)
            .unwrap();
        assert_eq!(valid, ValidQuery::default());
    }

    #[test]
    fn test_reports_every_failure() {
        let errors = request(serde_json::json!({
            "fromts": "yesterday",
            "days": 400,
            "app": "my app",
            "who": "x".repeat(65),
            "remote_ip": "10.1.2",
            "type": "Z",
            "pri": "Loud"
        }))
        .validate(true)
        .unwrap_err();

        assert_eq!(
            errors,
            vec![
                FieldError::new("fromts", ErrorCode::BadFormat),
                FieldError::new("days", ErrorCode::OutOfRange),
                FieldError::new("remote_ip", ErrorCode::BadFormat),
                FieldError::new("app", ErrorCode::NotAlphanumeric),
                FieldError::new("who", ErrorCode::TooLong),
                FieldError::new("type", ErrorCode::UnknownValue),
                FieldError::new("pri", ErrorCode::UnknownValue),
                FieldError::new("set_attr", ErrorCode::Required),
            ]
        );
    }

    #[test]
    fn test_day_bounds() {
        for days in [1, 365] {
            let body = QueryRequest {
                days: Some(days),
                ..Default::default()
            };
            assert_eq!(body.validate(false).unwrap().filter.last_n_days, Some(days as u32));
        }
        for days in [0, -3, 366] {
            let body = QueryRequest {
                days: Some(days),
                ..Default::default()
            };
            assert!(body.validate(false).is_err());
        }
    }

    #[test]
    fn test_unknown_field_rejected() {
        let parsed = serde_json::from_str::<QueryRequest>(r#"{"application":"x"}"#);
        assert!(parsed.is_err());
    }
}

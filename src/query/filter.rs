// SPDX-License-Identifier: Apache-2.0

use crate::entry::{LogType, Priority};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// A multi-axis log filter. Every set field narrows the result (AND).
/// Explicit `from`/`to` take precedence over `last_n_days`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogFilter {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub last_n_days: Option<u32>,
    pub app: Option<String>,
    pub who: Option<String>,
    pub class: Option<String>,
    pub instance: Option<String>,
    pub op: Option<String>,
    pub remote_ip: Option<String>,
    pub module: Option<String>,
    pub log_type: Option<LogType>,
    pub priority: Option<Priority>,
}

impl LogFilter {
    pub fn with_window(mut self, from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> Self {
        self.from = from;
        self.to = to;
        self
    }

    pub fn with_last_n_days(mut self, days: u32) -> Self {
        self.last_n_days = Some(days);
        self
    }

    pub fn with_app(mut self, app: impl Into<String>) -> Self {
        self.app = Some(app.into());
        self
    }

    pub fn with_type(mut self, log_type: LogType) -> Self {
        self.log_type = Some(log_type);
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub(crate) fn has_window(&self) -> bool {
        self.from.is_some() || self.to.is_some() || self.last_n_days.is_some()
    }
}

/// Pagination position: the sort values of the last entry of the previous
/// page. `when` holds epoch milliseconds as returned in hit sort values, or a
/// date string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Cursor {
    pub when: Option<String>,
    pub id: Option<String>,
}

impl Cursor {
    pub fn new(when: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            when: Some(when.into()),
            id: Some(id.into()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.when.is_none() && self.id.is_none()
    }
}

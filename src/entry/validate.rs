// SPDX-License-Identifier: Apache-2.0

use crate::entry::{Ksuid, LogEntry};
use chrono::{DateTime, Utc};
use std::fmt;
use std::net::IpAddr;
use thiserror::Error;

pub const DEFAULT_MAX_IDENTIFIER_LEN: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationKind {
    MissingRequired,
    OutOfRange,
    BadFormat,
    FutureTimestamp,
}

impl fmt::Display for ValidationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationKind::MissingRequired => write!(f, "missing required value"),
            ValidationKind::OutOfRange => write!(f, "value out of range"),
            ValidationKind::BadFormat => write!(f, "bad format"),
            ValidationKind::FutureTimestamp => write!(f, "timestamp is in the future"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid log entry field {field}: {kind}")]
pub struct ValidationError {
    pub field: &'static str,
    pub kind: ValidationKind,
}

impl ValidationError {
    fn new(field: &'static str, kind: ValidationKind) -> Self {
        Self { field, kind }
    }
}

/// Field level checks for a finished entry. Validation never mutates the
/// entry and has no side effects.
#[derive(Debug, Clone)]
pub struct Validator {
    max_identifier_len: usize,
}

impl Default for Validator {
    fn default() -> Self {
        Self {
            max_identifier_len: DEFAULT_MAX_IDENTIFIER_LEN,
        }
    }
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_identifier_len(mut self, max: usize) -> Self {
        self.max_identifier_len = max;
        self
    }

    pub fn validate(&self, entry: &LogEntry) -> Result<(), ValidationError> {
        self.validate_at(entry, Utc::now())
    }

    pub fn validate_at(&self, entry: &LogEntry, now: DateTime<Utc>) -> Result<(), ValidationError> {
        use ValidationKind::*;

        if entry.id.is_empty() {
            return Err(ValidationError::new("id", MissingRequired));
        }
        if Ksuid::parse(&entry.id).is_err() {
            return Err(ValidationError::new("id", BadFormat));
        }

        let required = [
            ("app", &entry.app),
            ("who", &entry.who),
            ("op", &entry.op),
            ("class", &entry.class),
            ("instance", &entry.instance),
        ];
        for (field, value) in required {
            self.identifier(field, value, true)?;
        }
        self.identifier("system", &entry.system, false)?;
        self.identifier("module", &entry.module, false)?;

        if entry.remote_ip.is_empty() {
            return Err(ValidationError::new("remote_ip", MissingRequired));
        }
        if entry.remote_ip.parse::<IpAddr>().is_err() {
            return Err(ValidationError::new("remote_ip", BadFormat));
        }

        if entry.msg.is_empty() {
            return Err(ValidationError::new("msg", MissingRequired));
        }

        if entry.when > now {
            return Err(ValidationError::new("when", FutureTimestamp));
        }

        if entry.data.log_type() != entry.log_type {
            return Err(ValidationError::new("data", OutOfRange));
        }

        Ok(())
    }

    fn identifier(
        &self,
        field: &'static str,
        value: &str,
        required: bool,
    ) -> Result<(), ValidationError> {
        if required && value.is_empty() {
            return Err(ValidationError::new(field, ValidationKind::MissingRequired));
        }
        if value.len() > self.max_identifier_len {
            return Err(ValidationError::new(field, ValidationKind::OutOfRange));
        }
        Ok(())
    }
}

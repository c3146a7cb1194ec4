// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};
use std::fmt;

/// Priority of a log entry. The derived ordering is the gating order, with
/// `Debug2` the most verbose and `Sec` the most severe.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub enum Priority {
    Debug2,
    Debug1,
    Debug0,
    #[default]
    Info,
    Warn,
    Err,
    Crit,
    /// Security relevant events
    Sec,
}

impl Priority {
    pub const ALL: [Priority; 8] = [
        Priority::Debug2,
        Priority::Debug1,
        Priority::Debug0,
        Priority::Info,
        Priority::Warn,
        Priority::Err,
        Priority::Crit,
        Priority::Sec,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Debug2 => "Debug2",
            Priority::Debug1 => "Debug1",
            Priority::Debug0 => "Debug0",
            Priority::Info => "Info",
            Priority::Warn => "Warn",
            Priority::Err => "Err",
            Priority::Crit => "Crit",
            Priority::Sec => "Sec",
        }
    }

    /// All priorities greater than or equal to this one, lowest first.
    pub fn at_or_above(self) -> impl Iterator<Item = Priority> {
        Self::ALL.into_iter().filter(move |p| *p >= self)
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, <Self as std::str::FromStr>::Err> {
        match s.to_lowercase().as_str() {
            "debug2" => Ok(Priority::Debug2),
            "debug1" => Ok(Priority::Debug1),
            "debug0" => Ok(Priority::Debug0),
            "info" => Ok(Priority::Info),
            "warn" | "warning" => Ok(Priority::Warn),
            "err" | "error" => Ok(Priority::Err),
            "crit" | "critical" => Ok(Priority::Crit),
            "sec" | "security" => Ok(Priority::Sec),
            _ => Err(format!("unknown priority: {}", s)),
        }
    }
}

/// Selects the shape of the `data` payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LogType {
    #[serde(rename = "C")]
    Change,
    #[serde(rename = "A")]
    Activity,
    #[serde(rename = "D")]
    Debug,
}

impl LogType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Change => "C",
            Self::Activity => "A",
            Self::Debug => "D",
        }
    }
}

impl fmt::Display for LogType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LogType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "c" | "change" => Ok(Self::Change),
            "a" | "activity" => Ok(Self::Activity),
            "d" | "debug" => Ok(Self::Debug),
            _ => Err(format!("unknown log type: {}", s)),
        }
    }
}

/// Outcome of the logged operation, serialized as an integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
#[repr(u8)]
pub enum Status {
    #[default]
    Success = 1,
    Failure = 2,
}

impl TryFrom<u8> for Status {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Success),
            2 => Ok(Self::Failure),
            _ => Err(format!("invalid status value: {}", value)),
        }
    }
}

impl From<Status> for u8 {
    fn from(s: Status) -> Self {
        s as u8
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Failure => write!(f, "failure"),
        }
    }
}

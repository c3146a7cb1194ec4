// SPDX-License-Identifier: Apache-2.0

//! K-sortable unique identifiers: a 32 bit timestamp followed by 128 random
//! bits, rendered as 27 base62 characters. Lexicographic order of the encoded
//! form follows creation time at second granularity.

use chrono::{DateTime, TimeZone, Utc};
use std::fmt;
use std::str::FromStr;
use svix_ksuid::KsuidLike;
use thiserror::Error;

/// Seconds between the Unix epoch and the KSUID epoch (2014-05-13T16:53:20Z).
const EPOCH: i64 = svix_ksuid::KSUID_EPOCH;

pub const ENCODED_LEN: usize = 27;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum KsuidError {
    #[error("ksuid must be {ENCODED_LEN} characters, got {0}")]
    Length(usize),

    #[error("invalid base62 character {0:?}")]
    Character(char),

    #[error("ksuid value out of range")]
    Overflow,
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ksuid(svix_ksuid::Ksuid);

impl Ksuid {
    pub fn new() -> Self {
        Self::with_timestamp(Utc::now())
    }

    pub fn with_timestamp(ts: DateTime<Utc>) -> Self {
        let secs = (ts.timestamp() - EPOCH).clamp(0, u32::MAX as i64) as u32;
        Self(svix_ksuid::Ksuid::new_raw(secs, None))
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.0.timestamp_seconds(), 0)
            .single()
            .unwrap_or_default()
    }

    pub fn payload(&self) -> &[u8] {
        self.0.payload()
    }

    pub fn parse(s: &str) -> Result<Self, KsuidError> {
        if s.len() != ENCODED_LEN {
            return Err(KsuidError::Length(s.len()));
        }
        if let Some(c) = s.chars().find(|c| !c.is_ascii_alphanumeric()) {
            return Err(KsuidError::Character(c));
        }

        // values above 2^160 decode to their low 20 bytes, so they no longer
        // encode back to the input
        let id = svix_ksuid::Ksuid::from_base62(s).map_err(|_| KsuidError::Overflow)?;
        if id.to_base62() != s {
            return Err(KsuidError::Overflow);
        }
        Ok(Self(id))
    }
}

impl Default for Ksuid {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Ksuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.to_base62())
    }
}

impl fmt::Debug for Ksuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ksuid({})", self)
    }
}

impl FromStr for Ksuid {
    type Err = KsuidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

// SPDX-License-Identifier: Apache-2.0

use crate::search::errors::{Result, SearchError};
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct SearchConfig {
    /// Base URL of the search engine, e.g. https://localhost:9200
    pub address: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Hex SHA-256 of the server certificate, colons optional. When set, the
    /// certificate is pinned instead of checked against the system roots.
    pub cert_fingerprint: Option<String>,
    pub index: String,
    pub timeout: Duration,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            address: "http://localhost:9200".to_string(),
            username: None,
            password: None,
            cert_fingerprint: None,
            index: "logs".to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

impl SearchConfig {
    pub fn new(address: String) -> Self {
        Self {
            address,
            ..Default::default()
        }
    }

    pub fn with_basic_auth(mut self, username: String, password: String) -> Self {
        self.username = Some(username);
        self.password = Some(password);
        self
    }

    pub fn with_cert_fingerprint(mut self, fingerprint: String) -> Self {
        self.cert_fingerprint = Some(fingerprint);
        self
    }

    pub fn with_index(mut self, index: String) -> Self {
        self.index = index;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub(crate) fn parsed_fingerprint(&self) -> Result<Option<Vec<u8>>> {
        self.cert_fingerprint
            .as_deref()
            .map(parse_fingerprint)
            .transpose()
    }
}

/// Parses `AB:CD:...` or `abcd...` into the 32 digest bytes.
pub fn parse_fingerprint(s: &str) -> Result<Vec<u8>> {
    let cleaned: String = s
        .chars()
        .filter(|c| *c != ':' && !c.is_whitespace())
        .collect();
    let bytes = hex::decode(&cleaned)
        .map_err(|e| SearchError::Configuration(format!("invalid certificate fingerprint: {}", e)))?;
    if bytes.len() != 32 {
        return Err(SearchError::Configuration(format!(
            "certificate fingerprint must be a SHA-256 digest, got {} bytes",
            bytes.len()
        )));
    }
    Ok(bytes)
}

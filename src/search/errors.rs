// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Failed to build request: {0}")]
    Request(String),

    #[error("Search engine request failed: {0}")]
    Transport(String),

    #[error("Search engine request timed out")]
    Timeout,

    #[error("Search engine returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Failed to decode search engine response: {0}")]
    Decode(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SearchError>;

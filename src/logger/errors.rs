// SPDX-License-Identifier: Apache-2.0

use crate::entry::ValidationError;
use crate::producer::SinkError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LoggerError {
    /// The entry was written to the fallback sink instead of the primary.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Failed to encode log entry: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Failed to write log entry: {0}")]
    Write(#[from] SinkError),
}

pub type Result<T> = std::result::Result<T, LoggerError>;

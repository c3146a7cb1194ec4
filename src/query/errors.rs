// SPDX-License-Identifier: Apache-2.0

use crate::search::SearchError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum QueryError {
    #[error("invalid set attribute: {0}")]
    InvalidAttribute(String),

    #[error("{0}")]
    InvalidTimeWindow(&'static str),

    #[error("unknown aggregation type: {0}")]
    UnknownAggregation(String),

    #[error(transparent)]
    Backend(#[from] SearchError),

    #[error("search timed out")]
    Timeout,

    #[error("unexpected search response: {0}")]
    Decode(String),
}

impl QueryError {
    /// Caller errors, as opposed to backend failures.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            QueryError::InvalidAttribute(_) | QueryError::InvalidTimeWindow(_)
        )
    }
}

impl From<serde_json::Error> for QueryError {
    fn from(e: serde_json::Error) -> Self {
        QueryError::Decode(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, QueryError>;

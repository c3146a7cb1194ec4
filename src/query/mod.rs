// SPDX-License-Identifier: Apache-2.0

//! Log search: filters, pagination and facets over the indexed entries.

mod builder;
mod engine;
pub mod errors;
mod filter;
pub mod geo;

pub use builder::SET_ATTRIBUTES;
pub use engine::{
    DEFAULT_HIGH_PRIORITY, DEFAULT_PAGE_SIZE, DEFAULT_SEARCH_TIMEOUT, LogPage, QueryEngine,
    UNUSUAL_IP_WINDOW_DAYS, UnusualIp,
};
pub use errors::QueryError;
pub use filter::{Cursor, LogFilter};
pub use geo::{CidrGeoLookup, GeoLookup};

#[cfg(test)]
pub(crate) use engine::test_util;

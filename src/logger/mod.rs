// SPDX-License-Identifier: Apache-2.0

//! Immutable, composable application loggers.
//!
//! A [`LoggerContext`] holds the process wide gate (minimum priority and debug
//! mode). [`Logger`] values derive from a root logger with `with_*` calls and
//! end in one of the `log*` methods, which build, validate and write exactly
//! one JSON line.

mod context;
mod debug;
pub mod errors;
mod instance;
mod request;

pub use context::LoggerContext;
pub use debug::RUNTIME_VERSION;
pub use errors::LoggerError;
pub use instance::Logger;
pub use request::{TRACE_ID_HEADER, client_ip, request_trace_id};

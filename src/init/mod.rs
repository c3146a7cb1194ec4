// SPDX-License-Identifier: Apache-2.0

//! Command line arguments and task helpers shared by the binaries.

pub mod args;
pub mod parse;
pub mod wait;

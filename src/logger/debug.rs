// SPDX-License-Identifier: Apache-2.0

use crate::entry::DebugData;
use std::backtrace::Backtrace;
use std::panic::Location;

pub const RUNTIME_VERSION: &str = match option_env!("LOGPIPE_RUSTC_VERSION") {
    Some(v) => v,
    None => "unknown",
};

const MAX_FRAMES: usize = 8;

/// Builds the debug payload for a call site. `location` is the caller of the
/// public logging method, carried through `#[track_caller]`.
pub(crate) fn capture(location: &'static Location<'static>, data: String) -> DebugData {
    let rendered = Backtrace::force_capture().to_string();
    let (function, stack_trace) = caller_frames(&rendered, location.file(), location.line());

    DebugData {
        pid: std::process::id(),
        runtime_version: RUNTIME_VERSION.to_string(),
        file: location.file().to_string(),
        line: location.line(),
        function,
        stack_trace,
        data,
    }
}

#[derive(Debug)]
struct Frame<'a> {
    name: &'a str,
    location: Option<&'a str>,
}

impl Frame<'_> {
    fn is_at(&self, file: &str, line: u32) -> bool {
        let Some(loc) = self.location else {
            return false;
        };
        let mut parts = loc.rsplitn(3, ':');
        let (_col, frame_line, path) = (parts.next(), parts.next(), parts.next());
        match (frame_line, path) {
            (Some(l), Some(p)) => l.parse::<u32>().ok() == Some(line) && p.ends_with(file),
            _ => false,
        }
    }

    fn is_internal(&self) -> bool {
        self.name.starts_with("std::backtrace")
            || self.name.contains("logpipe::logger::debug::")
            || self.name.contains("logpipe::logger::instance::")
    }
}

// Parses the std backtrace rendering:
//    3: app::handler
//              at ./src/main.rs:12:5
// Inlined symbols share a frame index and are printed without one.
fn parse_frames(rendered: &str) -> Vec<Frame<'_>> {
    let mut frames: Vec<Frame<'_>> = Vec::new();
    for line in rendered.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(loc) = line.strip_prefix("at ") {
            if let Some(last) = frames.last_mut() {
                last.location.get_or_insert(loc);
            }
            continue;
        }
        let name = match line.split_once(": ") {
            Some((idx, name)) if !idx.is_empty() && idx.bytes().all(|b| b.is_ascii_digit()) => name,
            _ => line,
        };
        frames.push(Frame {
            name,
            location: None,
        });
    }
    frames
}

fn clean_symbol(name: &str) -> String {
    match name.rsplit_once("::h") {
        Some((base, hash)) if hash.len() == 16 && hash.bytes().all(|b| b.is_ascii_hexdigit()) => {
            base.to_string()
        }
        _ => name.to_string(),
    }
}

/// Returns the function name at the call site and a short stack starting at
/// it. Without symbol locations the first frame outside the logger is used.
fn caller_frames(rendered: &str, file: &str, line: u32) -> (String, String) {
    let frames = parse_frames(rendered);
    let start = frames
        .iter()
        .position(|f| f.is_at(file, line))
        .or_else(|| frames.iter().rposition(Frame::is_internal).map(|i| i + 1))
        .unwrap_or(0);

    let function = frames
        .get(start)
        .map(|f| clean_symbol(f.name))
        .unwrap_or_default();

    let stack = frames
        .iter()
        .skip(start)
        .take(MAX_FRAMES)
        .map(|f| match f.location {
            Some(loc) => format!("{}\n\tat {}", clean_symbol(f.name), loc),
            None => clean_symbol(f.name),
        })
        .collect::<Vec<_>>()
        .join("\n");

    (function, stack)
}

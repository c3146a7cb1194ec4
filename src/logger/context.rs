// SPDX-License-Identifier: Apache-2.0

use crate::entry::{LogType, Priority};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

/// Process wide logging state shared by every logger derived from it.
#[derive(Debug, Default)]
pub struct LoggerContext {
    min_priority: Mutex<Priority>,
    debug_mode: AtomicBool,
}

impl LoggerContext {
    pub fn new(min_priority: Priority) -> Self {
        Self {
            min_priority: Mutex::new(min_priority),
            debug_mode: AtomicBool::new(false),
        }
    }

    pub fn with_debug_mode(self, enabled: bool) -> Self {
        self.debug_mode.store(enabled, Ordering::Relaxed);
        self
    }

    pub fn min_priority(&self) -> Priority {
        *self.min_priority.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn set_min_priority(&self, pri: Priority) {
        *self.min_priority.lock().unwrap_or_else(|p| p.into_inner()) = pri;
    }

    pub fn debug_mode(&self) -> bool {
        self.debug_mode.load(Ordering::Relaxed)
    }

    pub fn set_debug_mode(&self, enabled: bool) {
        self.debug_mode.store(enabled, Ordering::Relaxed);
    }

    /// Whether an entry of this priority and type passes the gate.
    pub fn enabled(&self, pri: Priority, log_type: LogType) -> bool {
        if pri < self.min_priority() {
            return false;
        }
        log_type != LogType::Debug || self.debug_mode()
    }
}

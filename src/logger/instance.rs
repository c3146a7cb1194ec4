// SPDX-License-Identifier: Apache-2.0

use crate::entry::{
    ChangeData, Ksuid, LogEntry, LogType, Payload, Priority, Status, Validator,
};
use crate::logger::context::LoggerContext;
use crate::logger::debug;
use crate::logger::errors::{LoggerError, Result};
use crate::producer::FallbackWriter;
use chrono::Utc;
use serde::Serialize;
use std::fmt;
use std::panic::Location;
use std::sync::{Arc, Mutex};

/// An immutable bundle of log fields. Every `with_*` method returns a new
/// logger and leaves the receiver untouched; the context, the writer and the
/// write lock are shared between all loggers derived from the same root.
#[derive(Clone)]
pub struct Logger {
    ctx: Arc<LoggerContext>,
    writer: Arc<FallbackWriter>,
    validator: Arc<Validator>,
    write_lock: Arc<Mutex<()>>,
    fields: Fields,
}

#[derive(Clone, Debug, Default, PartialEq)]
struct Fields {
    app: String,
    system: String,
    module: String,
    pri: Priority,
    who: String,
    op: String,
    class: String,
    instance: String,
    status: Status,
    err: Option<String>,
    remote_ip: String,
    trace_id: String,
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger").field("fields", &self.fields).finish()
    }
}

impl Logger {
    /// Creates a root logger for `app`. The system name is the host name and
    /// the priority defaults to `Info`.
    pub fn new(ctx: Arc<LoggerContext>, app: impl Into<String>, writer: Arc<FallbackWriter>) -> Self {
        let system = gethostname::gethostname()
            .into_string()
            .unwrap_or_default();

        Self {
            ctx,
            writer,
            validator: Arc::new(Validator::new()),
            write_lock: Arc::new(Mutex::new(())),
            fields: Fields {
                app: app.into(),
                system,
                ..Default::default()
            },
        }
    }

    pub fn with_validator(&self, validator: Validator) -> Self {
        let mut next = self.clone();
        next.validator = Arc::new(validator);
        next
    }

    fn with_field(&self, f: impl FnOnce(&mut Fields)) -> Self {
        let mut next = self.clone();
        f(&mut next.fields);
        next
    }

    pub fn with_who(&self, who: impl Into<String>) -> Self {
        let who = who.into();
        self.with_field(|f| f.who = who)
    }

    pub fn with_module(&self, module: impl Into<String>) -> Self {
        let module = module.into();
        self.with_field(|f| f.module = module)
    }

    pub fn with_op(&self, op: impl Into<String>) -> Self {
        let op = op.into();
        self.with_field(|f| f.op = op)
    }

    pub fn with_class(&self, class: impl Into<String>) -> Self {
        let class = class.into();
        self.with_field(|f| f.class = class)
    }

    pub fn with_instance(&self, instance: impl Into<String>) -> Self {
        let instance = instance.into();
        self.with_field(|f| f.instance = instance)
    }

    pub fn with_status(&self, status: Status) -> Self {
        self.with_field(|f| f.status = status)
    }

    /// Records the error and its source chain, joined with ": ".
    pub fn with_error(&self, err: &(dyn std::error::Error + 'static)) -> Self {
        let mut chain = err.to_string();
        let mut source = err.source();
        while let Some(e) = source {
            chain.push_str(": ");
            chain.push_str(&e.to_string());
            source = e.source();
        }
        self.with_field(|f| f.err = Some(chain))
    }

    pub fn without_error(&self) -> Self {
        self.with_field(|f| f.err = None)
    }

    pub fn with_priority(&self, pri: Priority) -> Self {
        self.with_field(|f| f.pri = pri)
    }

    pub fn with_remote_ip(&self, remote_ip: impl Into<String>) -> Self {
        let remote_ip = remote_ip.into();
        self.with_field(|f| f.remote_ip = remote_ip)
    }

    pub fn with_trace_id(&self, trace_id: impl Into<String>) -> Self {
        let trace_id = trace_id.into();
        self.with_field(|f| f.trace_id = trace_id)
    }

    pub fn debug2(&self) -> Self {
        self.with_priority(Priority::Debug2)
    }

    pub fn debug1(&self) -> Self {
        self.with_priority(Priority::Debug1)
    }

    pub fn debug0(&self) -> Self {
        self.with_priority(Priority::Debug0)
    }

    pub fn info(&self) -> Self {
        self.with_priority(Priority::Info)
    }

    pub fn warn(&self) -> Self {
        self.with_priority(Priority::Warn)
    }

    pub fn err(&self) -> Self {
        self.with_priority(Priority::Err)
    }

    pub fn crit(&self) -> Self {
        self.with_priority(Priority::Crit)
    }

    pub fn sec(&self) -> Self {
        self.with_priority(Priority::Sec)
    }

    pub fn app(&self) -> &str {
        &self.fields.app
    }

    pub fn system(&self) -> &str {
        &self.fields.system
    }

    pub fn module(&self) -> &str {
        &self.fields.module
    }

    pub fn priority(&self) -> Priority {
        self.fields.pri
    }

    pub fn who(&self) -> &str {
        &self.fields.who
    }

    pub fn op(&self) -> &str {
        &self.fields.op
    }

    pub fn class(&self) -> &str {
        &self.fields.class
    }

    pub fn instance(&self) -> &str {
        &self.fields.instance
    }

    pub fn status(&self) -> Status {
        self.fields.status
    }

    pub fn error(&self) -> Option<&str> {
        self.fields.err.as_deref()
    }

    pub fn remote_ip(&self) -> &str {
        &self.fields.remote_ip
    }

    pub fn trace_id(&self) -> &str {
        &self.fields.trace_id
    }

    pub fn context(&self) -> &Arc<LoggerContext> {
        &self.ctx
    }

    /// Logs a plain activity entry with an empty data bag.
    pub fn log(&self, msg: impl Into<String>) -> Result<()> {
        self.emit(LogType::Activity, msg.into(), || {
            Ok(Payload::Activity("{}".to_string()))
        })
    }

    pub fn log_fmt(&self, args: fmt::Arguments<'_>) -> Result<()> {
        self.log(args.to_string())
    }

    pub fn log_activity<T: Serialize + ?Sized>(&self, msg: impl Into<String>, data: &T) -> Result<()> {
        self.emit(LogType::Activity, msg.into(), || Ok(Payload::activity(data)?))
    }

    pub fn log_activity_fmt<T: Serialize + ?Sized>(&self, args: fmt::Arguments<'_>, data: &T) -> Result<()> {
        self.log_activity(args.to_string(), data)
    }

    pub fn log_data_change(&self, msg: impl Into<String>, change: ChangeData) -> Result<()> {
        self.emit(LogType::Change, msg.into(), || Ok(Payload::Change(change)))
    }

    pub fn log_data_change_fmt(&self, args: fmt::Arguments<'_>, change: ChangeData) -> Result<()> {
        self.log_data_change(args.to_string(), change)
    }

    /// Logs a debug entry carrying the caller's location and stack. Dropped
    /// unless the context is in debug mode.
    #[track_caller]
    pub fn log_debug<T: Serialize + ?Sized>(&self, msg: impl Into<String>, data: &T) -> Result<()> {
        self.emit_debug(Location::caller(), msg.into(), data)
    }

    #[track_caller]
    pub fn log_debug_fmt<T: Serialize + ?Sized>(&self, args: fmt::Arguments<'_>, data: &T) -> Result<()> {
        self.emit_debug(Location::caller(), args.to_string(), data)
    }

    fn emit_debug<T: Serialize + ?Sized>(
        &self,
        location: &'static Location<'static>,
        msg: String,
        data: &T,
    ) -> Result<()> {
        self.emit(LogType::Debug, msg, || {
            let data = serde_json::to_string(data)?;
            Ok(Payload::Debug(debug::capture(location, data)))
        })
    }

    fn emit<F>(&self, log_type: LogType, msg: String, payload: F) -> Result<()>
    where
        F: FnOnce() -> Result<Payload>,
    {
        if !self.ctx.enabled(self.fields.pri, log_type) {
            return Ok(());
        }

        let _guard = self.write_lock.lock().unwrap_or_else(|p| p.into_inner());

        let entry = self.build_entry(log_type, msg, payload()?);
        let line = entry.to_line()?;

        if let Err(e) = self.validator.validate(&entry) {
            self.writer.write_fallback(&line)?;
            return Err(LoggerError::Validation(e));
        }

        self.writer.write(&line)?;
        Ok(())
    }

    fn build_entry(&self, log_type: LogType, msg: String, data: Payload) -> LogEntry {
        let f = &self.fields;
        let trace_id = if f.trace_id.is_empty() {
            Ksuid::new().to_string()
        } else {
            f.trace_id.clone()
        };

        LogEntry {
            id: Ksuid::new().to_string(),
            app: f.app.clone(),
            system: f.system.clone(),
            module: f.module.clone(),
            log_type,
            pri: f.pri,
            when: Utc::now(),
            who: f.who.clone(),
            op: f.op.clone(),
            class: f.class.clone(),
            instance: f.instance.clone(),
            status: f.status,
            error: f.err.clone().filter(|e| !e.is_empty()),
            remote_ip: f.remote_ip.clone(),
            trace_id,
            msg,
            data,
        }
    }
}

// Copyright (C) 2025 Michael Herstine <sp1ff@pobox.com>
//
// This file is part of gelf-tracing.
//
// gelf-tracing is free software: you can redistribute it and/or modify it under the terms of the
// GNU General Public License as published by the Free Software Foundation, either version 3 of the
// License, or (at your option) any later version.
//
// gelf-tracing is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without
// even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU
// General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with gelf-tracing.  If
// not, see <http://www.gnu.org/licenses/>.

//! The log events from which GELF messages are built.
//!
//! [`LogEvent`] is the set of capabilities the [`MessageBuilder`] needs from whatever produced the
//! event. [`Record`] is an owned implementation; it's what the [`Layer`] makes out of [`tracing`]
//! [`Event`]s, and it's convenient for building events by hand.
//!
//! [`MessageBuilder`]: crate::builder::MessageBuilder
//! [`Layer`]: crate::layer::Layer
//! [`tracing`]: https://docs.rs/tracing/latest/tracing/index.html
//! [`Event`]: https://docs.rs/tracing/0.1.35/tracing/struct.Event.html

use backtrace::Backtrace;
use chrono::prelude::*;

use std::collections::BTreeMap;

/// Contextual key/value pairs attached to an event
pub type Properties = BTreeMap<String, String>;

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                       errors & their traces                                    //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// A single frame in an [`ErrorTrace`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StackFrame {
    function: String,
    file: Option<String>,
    line: Option<u32>,
}

impl StackFrame {
    pub fn new(function: impl Into<String>) -> StackFrame {
        StackFrame {
            function: function.into(),
            file: None,
            line: None,
        }
    }
    pub fn with_location(mut self, file: impl Into<String>, line: u32) -> StackFrame {
        self.file = Some(file.into());
        self.line = Some(line);
        self
    }
    pub fn function(&self) -> &str {
        &self.function
    }
    pub fn file(&self) -> Option<&str> {
        self.file.as_deref()
    }
    pub fn line(&self) -> Option<u32> {
        self.line
    }
}

impl std::fmt::Display for StackFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.file, self.line) {
            (Some(file), Some(line)) => write!(f, "{} ({}:{})", self.function, file, line),
            (Some(file), None) => write!(f, "{} ({})", self.function, file),
            _ => write!(f, "{}", self.function),
        }
    }
}

/// Frames whose function names contain any of these belong to the capture & dispatch path
const MACHINERY: &[&str] = &[
    "backtrace::",
    "gelf_tracing::event::ErrorTrace",
    "gelf_tracing::layer::EventVisitor",
    "gelf_tracing::layer::Layer",
    "tracing_core::",
    "tracing_subscriber::",
    "<dyn core::error::Error",
    "std::thread::local",
    "core::ops::function",
];

/// The function through which every [`tracing`] event is dispatched
///
/// [`tracing`]: https://docs.rs/tracing/latest/tracing/index.html
const DISPATCH: &str = "tracing_core::event::Event::dispatch";

/// Index of the first frame (innermost first) outside the capture & dispatch path.
///
/// If the frame for [`DISPATCH`] is present, everything up to & including it is machinery; else
/// (say, `capture` was called directly, or dispatch was inlined) skip the leading run of frames
/// that look like machinery.
fn caller_index(frames: &[StackFrame]) -> usize {
    frames
        .iter()
        .position(|frame| frame.function.ends_with(DISPATCH))
        .map(|i| i + 1)
        .unwrap_or_else(|| {
            frames
                .iter()
                .position(|frame| !MACHINERY.iter().any(|m| frame.function.contains(m)))
                .unwrap_or(frames.len())
        })
}

/// An error associated with a log event, along with its chain of causes.
///
/// This is the textual residue of an error: its description, the stack frames at which it was
/// captured (if any) and the [`ErrorTrace`] for whatever caused it. Only the outermost error in a
/// chain built by [`ErrorTrace::capture`] carries frames; Rust errors don't record where they were
/// created, so we resolve the stack at the point of capture.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ErrorTrace {
    description: String,
    frames: Vec<StackFrame>,
    cause: Option<Box<ErrorTrace>>,
}

impl ErrorTrace {
    pub fn new(description: impl Into<String>) -> ErrorTrace {
        ErrorTrace {
            description: description.into(),
            frames: Vec::new(),
            cause: None,
        }
    }
    pub fn with_frame(mut self, frame: StackFrame) -> ErrorTrace {
        self.frames.push(frame);
        self
    }
    pub fn caused_by(mut self, cause: ErrorTrace) -> ErrorTrace {
        self.cause = Some(Box::new(cause));
        self
    }
    /// Walk `err` & its [`source`](std::error::Error::source) chain; no frames are recorded
    pub fn from_error(err: &(dyn std::error::Error + 'static)) -> ErrorTrace {
        ErrorTrace {
            description: err.to_string(),
            frames: Vec::new(),
            cause: err.source().map(|src| Box::new(ErrorTrace::from_error(src))),
        }
    }
    /// As [`ErrorTrace::from_error`], but also resolve the current call stack into frames.
    ///
    /// Frames belonging to the capture itself & to event dispatch are dropped, so that the first
    /// frame is the code that emitted the event. Symbol resolution is not cheap; this is meant for
    /// events that actually carry an error.
    pub fn capture(err: &(dyn std::error::Error + 'static)) -> ErrorTrace {
        let back = Backtrace::new();
        let frames: Vec<StackFrame> = back
            .frames()
            .iter()
            .flat_map(|frame| frame.symbols())
            .map(|sym| StackFrame {
                // `{:#}` leaves off the hash suffix
                function: sym
                    .name()
                    .map(|name| format!("{:#}", name))
                    .unwrap_or_else(|| "<unknown>".to_string()),
                file: sym.filename().map(|path| path.display().to_string()),
                line: sym.lineno(),
            })
            .collect();
        let skip = caller_index(&frames);
        ErrorTrace {
            frames: frames.into_iter().skip(skip).collect(),
            ..ErrorTrace::from_error(err)
        }
    }
    pub fn description(&self) -> &str {
        &self.description
    }
    pub fn frames(&self) -> &[StackFrame] {
        &self.frames
    }
    pub fn cause(&self) -> Option<&ErrorTrace> {
        self.cause.as_deref()
    }
    /// This trace followed by each of its causes, outermost first
    pub fn chain(&self) -> impl Iterator<Item = &ErrorTrace> {
        std::iter::successors(Some(self), |trace| trace.cause())
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                         trait LogEvent                                         //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Where in the source a log event was emitted
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CallerFrame {
    pub file: Option<String>,
    pub line: Option<u32>,
}

/// What the [`MessageBuilder`](crate::builder::MessageBuilder) needs from a log event.
///
/// Implementations are read-only as far as this crate is concerned; nothing here ever mutates an
/// event.
pub trait LogEvent {
    /// When the event occurred
    fn timestamp(&self) -> DateTime<Utc>;
    fn level(&self) -> tracing::Level;
    fn logger_name(&self) -> &str;
    fn thread_name(&self) -> &str;
    /// An optional tag attached to this particular event
    fn marker(&self) -> Option<&str>;
    /// Contextual key/value pairs
    fn properties(&self) -> &Properties;
    /// The primary message, fully formatted
    fn formatted_message(&self) -> &str;
    /// The call stack at the point the event was emitted, innermost first; may be empty.
    ///
    /// This may be expensive to compute, and callers should only ask when they need it.
    fn caller_data(&self) -> Vec<CallerFrame>;
    fn error(&self) -> Option<&ErrorTrace>;
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                          struct Record                                         //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// An owned [`LogEvent`]
#[derive(Clone, Debug)]
pub struct Record {
    timestamp: DateTime<Utc>,
    level: tracing::Level,
    logger_name: String,
    thread_name: String,
    marker: Option<String>,
    properties: Properties,
    message: String,
    caller: Option<CallerFrame>,
    error: Option<ErrorTrace>,
}

/// The name of the current thread, or its ID if it has none
pub fn current_thread_name() -> String {
    let thread = std::thread::current();
    match thread.name() {
        Some(name) => name.to_string(),
        None => format!("{:?}", thread.id()),
    }
}

impl Record {
    /// A [`Record`] stamped with the current time & thread; everything else is empty.
    pub fn new(level: tracing::Level, message: impl Into<String>) -> Record {
        Record {
            timestamp: Utc::now(),
            level,
            logger_name: String::new(),
            thread_name: current_thread_name(),
            marker: None,
            properties: Properties::new(),
            message: message.into(),
            caller: None,
            error: None,
        }
    }
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Record {
        self.timestamp = timestamp;
        self
    }
    pub fn with_logger_name(mut self, name: impl Into<String>) -> Record {
        self.logger_name = name.into();
        self
    }
    pub fn with_thread_name(mut self, name: impl Into<String>) -> Record {
        self.thread_name = name.into();
        self
    }
    pub fn with_marker(mut self, marker: impl Into<String>) -> Record {
        self.marker = Some(marker.into());
        self
    }
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Record {
        self.properties.insert(key.into(), value.into());
        self
    }
    pub fn with_properties(mut self, properties: Properties) -> Record {
        self.properties = properties;
        self
    }
    pub fn with_caller(mut self, caller: CallerFrame) -> Record {
        self.caller = Some(caller);
        self
    }
    pub fn with_error(mut self, error: ErrorTrace) -> Record {
        self.error = Some(error);
        self
    }
}

impl LogEvent for Record {
    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
    fn level(&self) -> tracing::Level {
        self.level
    }
    fn logger_name(&self) -> &str {
        &self.logger_name
    }
    fn thread_name(&self) -> &str {
        &self.thread_name
    }
    fn marker(&self) -> Option<&str> {
        self.marker.as_deref()
    }
    fn properties(&self) -> &Properties {
        &self.properties
    }
    fn formatted_message(&self) -> &str {
        &self.message
    }
    fn caller_data(&self) -> Vec<CallerFrame> {
        self.caller.iter().cloned().collect()
    }
    fn error(&self) -> Option<&ErrorTrace> {
        self.error.as_ref()
    }
}

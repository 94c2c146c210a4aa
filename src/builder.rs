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

//! Building GELF messages from log events.
//!
//! [`MessageBuilder`] is where a [`LogEvent`] & an [`InclusionPolicy`] come together to produce a
//! [`GelfMessage`]. It owns two compiled [`Pattern`]s: one for the short message (the event's
//! message, never an error trace) and one for the full message (by default, the error trace
//! alone).
//!
//! Building a message cannot fail. The only thing that can go wrong per-event is a field value
//! that won't parse as its declared numeric type; such values are sent as text and reported as
//! [`CoercionWarning`]s.

use crate::{
    coercion::{CoercionWarning, FieldTypes, FieldValue},
    error::Result,
    event::LogEvent,
    message::GelfMessage,
    pattern::Pattern,
    policy::InclusionPolicy,
    severity::Severity,
};

use std::collections::BTreeMap;

/// The default short message: the event's message, with no error trace
pub const DEFAULT_SHORT_MESSAGE_PATTERN: &str = "%m%nopex";
/// The default full message: the error trace, if any
pub const DEFAULT_FULL_MESSAGE_PATTERN: &str = "%xEx";
/// Target under which coercion failures are reported to [`tracing`]
///
/// [`tracing`]: https://docs.rs/tracing/latest/tracing/index.html
pub const COERCION_TARGET: &str = "gelf_tracing::coercion";

/// Builds [`GelfMessage`]s.
///
/// Compiled patterns are immutable, so a single [`MessageBuilder`] may be shared between any
/// number of threads building messages concurrently.
#[derive(Clone, Debug)]
pub struct MessageBuilder {
    short_pattern: Pattern,
    full_pattern: Pattern,
}

impl std::default::Default for MessageBuilder {
    fn default() -> Self {
        MessageBuilder::new()
    }
}

/// Everything up to the first line break
fn first_line(text: String) -> String {
    match text.find('\n') {
        Some(i) => text[..i].trim_end_matches('\r').to_string(),
        None => text,
    }
}

fn add_fields(
    message: &mut GelfMessage,
    fields: &BTreeMap<String, String>,
    types: &FieldTypes,
    warnings: &mut Vec<CoercionWarning>,
) {
    for (key, raw) in fields {
        let value = types.coerce(key, raw).unwrap_or_else(|warning| {
            warnings.push(warning);
            FieldValue::Text(raw.clone())
        });
        message.add_field(key.as_str(), value);
    }
}

impl MessageBuilder {
    /// A [`MessageBuilder`] using [`DEFAULT_SHORT_MESSAGE_PATTERN`] &
    /// [`DEFAULT_FULL_MESSAGE_PATTERN`]
    pub fn new() -> MessageBuilder {
        // Both defaults are known-good, so compilation cannot fail here.
        MessageBuilder {
            short_pattern: Pattern::compile(DEFAULT_SHORT_MESSAGE_PATTERN)
                .expect("default short message pattern")
                .without_exception(),
            full_pattern: Pattern::compile(DEFAULT_FULL_MESSAGE_PATTERN)
                .expect("default full message pattern"),
        }
    }
    /// Compile both patterns, failing on the first malformed one
    pub fn with_patterns(short: &str, full: &str) -> Result<MessageBuilder> {
        MessageBuilder::new()
            .short_message_pattern(short)?
            .full_message_pattern(full)
    }
    /// Replace the short message pattern.
    ///
    /// Any exception conversions in `pattern` are dropped; the short message never carries an
    /// error trace.
    pub fn short_message_pattern(mut self, pattern: &str) -> Result<Self> {
        self.short_pattern = Pattern::compile(pattern)?.without_exception();
        Ok(self)
    }
    /// Replace the full message pattern
    pub fn full_message_pattern(mut self, pattern: &str) -> Result<Self> {
        self.full_pattern = Pattern::compile(pattern)?;
        Ok(self)
    }
    pub fn short_pattern(&self) -> &Pattern {
        &self.short_pattern
    }
    pub fn full_pattern(&self) -> &Pattern {
        &self.full_pattern
    }

    /// Build a [`GelfMessage`] from `event` according to `policy`, forwarding any coercion
    /// failures to [`tracing`] at WARN level.
    ///
    /// [`tracing`]: https://docs.rs/tracing/latest/tracing/index.html
    pub fn create_message<E: LogEvent + ?Sized>(
        &self,
        policy: &InclusionPolicy,
        event: &E,
    ) -> GelfMessage {
        let (message, warnings) = self.create_message_with_warnings(policy, event);
        for warning in warnings {
            tracing::warn!(target: COERCION_TARGET, "{}", warning);
        }
        message
    }

    /// Build a [`GelfMessage`] from `event` according to `policy`, returning any coercion
    /// failures alongside it.
    pub fn create_message_with_warnings<E: LogEvent + ?Sized>(
        &self,
        policy: &InclusionPolicy,
        event: &E,
    ) -> (GelfMessage, Vec<CoercionWarning>) {
        let mut warnings = Vec::new();
        let mut message = GelfMessage::new();
        message.set_timestamp_millis(event.timestamp().timestamp_millis());

        if policy.include_host() {
            if let Some(host) = policy.origin_host() {
                message.set_host(host);
            }
        }

        if policy.include_level() {
            message.set_level(Severity::from(&event.level()));
        }

        if policy.include_location() {
            if let Some(caller) = event.caller_data().into_iter().next() {
                if let Some(file) = caller.file {
                    message.set_file(file);
                }
                if let Some(line) = caller.line {
                    message.set_line(line);
                }
            }
        }

        if policy.include_logger() {
            message.set_logger(event.logger_name());
        }

        if policy.include_marker() {
            if let Some(marker) = event.marker() {
                message.set_marker(marker);
            }
        }

        if policy.include_properties() {
            add_fields(
                &mut message,
                event.properties(),
                policy.field_types(),
                &mut warnings,
            );
        }

        if policy.include_thread() {
            message.set_thread(event.thread_name());
        }

        message.set_short_message(first_line(self.short_pattern.render(event)));

        let full_message = self.full_pattern.render(event);
        if !full_message.is_empty() {
            message.set_full_message(full_message);
        }

        if let Some(facility) = policy.facility() {
            message.set_facility(facility);
        }

        // Static fields go last, so they win over contextual properties of the same name.
        add_fields(
            &mut message,
            policy.additional_fields(),
            policy.field_types(),
            &mut warnings,
        );

        (message, warnings)
    }
}

#[cfg(test)]
mod test {

    use super::*;

    use crate::{
        coercion::FieldType,
        event::{CallerFrame, ErrorTrace, Record, StackFrame},
    };

    use chrono::{TimeZone, Utc};

    fn event() -> Record {
        Record::new(tracing::Level::INFO, "log message")
            .with_timestamp(Utc.timestamp_millis_opt(1_656_000_000_123).unwrap())
            .with_logger_name("app::db")
            .with_thread_name("worker-1")
            .with_property("mdcKey", "mdcValue")
    }

    fn failing() -> Record {
        event().with_error(
            ErrorTrace::new("whoops")
                .with_frame(StackFrame::new("app::db::flush").with_location("src/db.rs", 42)),
        )
    }

    fn build(policy: &InclusionPolicy, event: &Record) -> GelfMessage {
        MessageBuilder::new().create_message(policy, event)
    }

    #[test]
    fn host() {
        let msg = build(&InclusionPolicy::default(), &event());
        assert!(msg.host().is_none());

        let policy = InclusionPolicy::builder().origin_host("host").build();
        assert_eq!(build(&policy, &event()).host(), Some("host"));

        let policy = InclusionPolicy::builder()
            .origin_host("host")
            .include_host(false)
            .build();
        assert!(build(&policy, &event()).host().is_none());
    }

    #[test]
    fn timestamp_level_logger_thread() {
        let msg = build(&InclusionPolicy::default(), &event());
        assert_eq!(msg.timestamp_millis(), 1_656_000_000_123);
        assert_eq!(msg.level(), Some(Severity::LOG_INFO));
        assert_eq!(msg.logger(), Some("app::db"));
        assert!(msg.thread().is_none());

        let policy = InclusionPolicy::builder()
            .include_level(false)
            .include_logger(false)
            .include_thread(true)
            .build();
        let msg = build(&policy, &event());
        assert_eq!(msg.timestamp_millis(), 1_656_000_000_123);
        assert!(msg.level().is_none());
        assert!(msg.logger().is_none());
        assert_eq!(msg.thread(), Some("worker-1"));
    }

    #[test]
    fn location() {
        let located = event().with_caller(CallerFrame {
            file: Some("src/db.rs".to_string()),
            line: Some(17),
        });

        let msg = build(&InclusionPolicy::default(), &located);
        assert!(msg.file().is_none());
        assert!(msg.line().is_none());

        let policy = InclusionPolicy::builder().include_location(true).build();
        let msg = build(&policy, &located);
        assert_eq!(msg.file(), Some("src/db.rs"));
        assert_eq!(msg.line(), Some(17));

        // no caller frame is not an error
        let msg = build(&policy, &event());
        assert!(msg.file().is_none());
    }

    #[test]
    fn marker() {
        let marked = event().with_marker("AUDIT");
        let policy = InclusionPolicy::builder().include_marker(true).build();
        assert_eq!(build(&policy, &marked).marker(), Some("AUDIT"));
        assert!(build(&policy, &event()).marker().is_none());

        let policy = InclusionPolicy::builder().include_marker(false).build();
        assert!(build(&policy, &marked).marker().is_none());
    }

    #[test]
    fn properties() {
        let policy = InclusionPolicy::builder().include_properties(true).build();
        let msg = build(&policy, &event());
        assert_eq!(
            msg.field("mdcKey").and_then(FieldValue::as_str),
            Some("mdcValue")
        );

        let policy = InclusionPolicy::builder().include_properties(false).build();
        let msg = build(&policy, &event());
        assert!(msg.field("mdcKey").is_none());
        assert!(msg.fields().is_empty());
    }

    #[test]
    fn coercion() {
        let policy = InclusionPolicy::builder()
            .field_type("count", FieldType::Int)
            .build();

        let (msg, warnings) = MessageBuilder::new()
            .create_message_with_warnings(&policy, &event().with_property("count", "42"));
        assert_eq!(msg.field("count"), Some(&FieldValue::Int(42)));
        assert!(warnings.is_empty());

        let (msg, warnings) = MessageBuilder::new()
            .create_message_with_warnings(&policy, &event().with_property("count", "oops"));
        assert_eq!(
            msg.field("count"),
            Some(&FieldValue::Text("oops".to_string()))
        );
        assert_eq!(msg.short_message(), "log message");
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].field, "count");
        assert_eq!(warnings[0].value, "oops");

        // the WARN-forwarding flavor still builds the message
        let msg = build(&policy, &event().with_property("count", "oops"));
        assert_eq!(msg.field("count").and_then(FieldValue::as_str), Some("oops"));
    }

    #[test]
    fn facility_and_static_fields() {
        let policy = InclusionPolicy::builder()
            .facility("facility")
            .additional_field("mdcKey", "static")
            .additional_field("elapsed", "12")
            .field_type("elapsed", FieldType::Long)
            .build();
        let msg = build(&policy, &event());
        assert_eq!(msg.facility(), Some("facility"));
        assert!(msg.field("facility").is_none());
        // static fields override contextual properties
        assert_eq!(msg.field("mdcKey").and_then(FieldValue::as_str), Some("static"));
        assert_eq!(msg.field("elapsed"), Some(&FieldValue::Long(12)));

        // ... and are present even when contextual properties are not
        let policy = InclusionPolicy::builder()
            .include_properties(false)
            .additional_field("env", "prod")
            .build();
        let msg = build(&policy, &event());
        assert_eq!(msg.field("env").and_then(FieldValue::as_str), Some("prod"));
        assert!(msg.field("mdcKey").is_none());
        assert!(msg.facility().is_none());
    }

    #[test]
    fn default_short_message_format() {
        let msg = build(&InclusionPolicy::default(), &event());
        assert_eq!(msg.short_message(), "log message");
        assert!(msg.full_message().is_none());

        // the short message never carries the trace
        let msg = build(&InclusionPolicy::default(), &failing());
        assert_eq!(msg.short_message(), "log message");

        // ... and is a single line
        let multi = Record::new(tracing::Level::INFO, "first line\r\nsecond line");
        let msg = build(&InclusionPolicy::default(), &multi);
        assert_eq!(msg.short_message(), "first line");
    }

    #[test]
    fn default_full_message_format() {
        let msg = build(&InclusionPolicy::default(), &failing());
        let full = msg.full_message().unwrap();
        assert!(full.starts_with("whoops"));
        assert!(full.contains("\tat app::db::flush (src/db.rs:42)"));
        assert!(!full.contains("log message"));
    }

    #[test]
    fn custom_short_message_format() {
        let builder = MessageBuilder::new().short_message_pattern("%.-23m").unwrap();
        let long = Record::new(
            tracing::Level::INFO,
            "a very long log message a very long log message",
        );
        let msg = builder.create_message(&InclusionPolicy::default(), &long);
        assert_eq!(msg.short_message(), "a very long log message");

        // no implicit trace, even though the pattern didn't say %nopex
        let msg = builder.create_message(&InclusionPolicy::default(), &failing());
        assert_eq!(msg.short_message(), "log message");
    }

    #[test]
    fn custom_full_message_format() {
        let builder = MessageBuilder::new().full_message_pattern("%.-1m").unwrap();
        let msg = builder.create_message(&InclusionPolicy::default(), &event());
        assert_eq!(msg.full_message(), Some("l"));
    }

    #[test]
    fn bad_patterns() {
        assert!(MessageBuilder::new().short_message_pattern("%q").is_err());
        assert!(MessageBuilder::new().full_message_pattern("%.m").is_err());
        assert!(MessageBuilder::with_patterns("%m", "%ex{sideways}").is_err());
        let builder = MessageBuilder::with_patterns("%-5p %m", "%m%n%ex").unwrap();
        assert_eq!(builder.short_pattern().as_str(), "%-5p %m");
    }
}

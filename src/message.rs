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

//! The GELF message.
//!
//! [`GelfMessage`] is what the [`MessageBuilder`] produces: the fixed GELF attributes, plus an open
//! set of additional fields. It knows how to serialize itself to the GELF JSON field set (each
//! additional field `key` becomes `_key`; the facility label alone is written as [`FACILITY`]), but
//! framing, compression & delivery are up to the transport.
//!
//! GELF reserves `_id`, so an additional field named [`RESERVED_ID`] is written as
//! [`RENAMED_ID`] instead.
//!
//! [`MessageBuilder`]: crate::builder::MessageBuilder

use crate::{coercion::FieldValue, severity::Severity};

use serde::ser::{Serialize, SerializeMap, Serializer};

use std::collections::BTreeMap;

/// The GELF version we speak
pub const GELF_VERSION: &str = "1.1";

/// Wire name of the facility label; an additional field of the same name is still `_facility`.
pub const FACILITY: &str = "facility";

/// GELF forbids the additional field `_id`...
pub const RESERVED_ID: &str = "id";
/// ... so a field named [`RESERVED_ID`] goes on the wire under this name
pub const RENAMED_ID: &str = "_id_";

/// A GELF message
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GelfMessage {
    timestamp_millis: i64,
    host: Option<String>,
    level: Option<Severity>,
    short_message: String,
    full_message: Option<String>,
    file: Option<String>,
    line: Option<u32>,
    logger: Option<String>,
    marker: Option<String>,
    thread: Option<String>,
    facility: Option<String>,
    fields: BTreeMap<String, FieldValue>,
}

impl GelfMessage {
    pub fn new() -> GelfMessage {
        GelfMessage::default()
    }

    pub fn set_timestamp_millis(&mut self, millis: i64) -> &mut Self {
        self.timestamp_millis = millis;
        self
    }
    pub fn set_host(&mut self, host: impl Into<String>) -> &mut Self {
        self.host = Some(host.into());
        self
    }
    pub fn set_level(&mut self, level: Severity) -> &mut Self {
        self.level = Some(level);
        self
    }
    pub fn set_short_message(&mut self, text: impl Into<String>) -> &mut Self {
        self.short_message = text.into();
        self
    }
    pub fn set_full_message(&mut self, text: impl Into<String>) -> &mut Self {
        self.full_message = Some(text.into());
        self
    }
    pub fn set_file(&mut self, file: impl Into<String>) -> &mut Self {
        self.file = Some(file.into());
        self
    }
    pub fn set_line(&mut self, line: u32) -> &mut Self {
        self.line = Some(line);
        self
    }
    pub fn set_logger(&mut self, logger: impl Into<String>) -> &mut Self {
        self.logger = Some(logger.into());
        self
    }
    pub fn set_marker(&mut self, marker: impl Into<String>) -> &mut Self {
        self.marker = Some(marker.into());
        self
    }
    pub fn set_thread(&mut self, thread: impl Into<String>) -> &mut Self {
        self.thread = Some(thread.into());
        self
    }
    pub fn set_facility(&mut self, facility: impl Into<String>) -> &mut Self {
        self.facility = Some(facility.into());
        self
    }
    /// Add (or replace) an additional field; the last write for a given key wins.
    pub fn add_field(&mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> &mut Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn timestamp_millis(&self) -> i64 {
        self.timestamp_millis
    }
    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }
    pub fn level(&self) -> Option<Severity> {
        self.level
    }
    pub fn short_message(&self) -> &str {
        &self.short_message
    }
    pub fn full_message(&self) -> Option<&str> {
        self.full_message.as_deref()
    }
    pub fn file(&self) -> Option<&str> {
        self.file.as_deref()
    }
    pub fn line(&self) -> Option<u32> {
        self.line
    }
    pub fn logger(&self) -> Option<&str> {
        self.logger.as_deref()
    }
    pub fn marker(&self) -> Option<&str> {
        self.marker.as_deref()
    }
    pub fn thread(&self) -> Option<&str> {
        self.thread.as_deref()
    }
    pub fn facility(&self) -> Option<&str> {
        self.facility.as_deref()
    }
    pub fn field(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(key)
    }
    pub fn fields(&self) -> &BTreeMap<String, FieldValue> {
        &self.fields
    }

    /// Serialize to a GELF JSON document
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

impl Serialize for GelfMessage {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("version", GELF_VERSION)?;
        if let Some(host) = &self.host {
            map.serialize_entry("host", host)?;
        }
        map.serialize_entry("short_message", &self.short_message)?;
        if let Some(full_message) = &self.full_message {
            map.serialize_entry("full_message", full_message)?;
        }
        // GELF timestamps are seconds since the epoch, with optional decimal places for millis
        map.serialize_entry("timestamp", &(self.timestamp_millis as f64 / 1000.0))?;
        if let Some(level) = self.level {
            map.serialize_entry("level", &level.code())?;
        }
        if let Some(file) = &self.file {
            map.serialize_entry("file", file)?;
        }
        if let Some(line) = self.line {
            map.serialize_entry("line", &line)?;
        }
        if let Some(logger) = &self.logger {
            map.serialize_entry("logger", logger)?;
        }
        if let Some(marker) = &self.marker {
            map.serialize_entry("marker", marker)?;
        }
        if let Some(thread) = &self.thread {
            map.serialize_entry("thread", thread)?;
        }
        if let Some(facility) = &self.facility {
            map.serialize_entry(FACILITY, facility)?;
        }
        for (key, value) in &self.fields {
            if key == RESERVED_ID {
                map.serialize_entry(RENAMED_ID, value)?;
            } else {
                map.serialize_entry(&format!("_{}", key), value)?;
            }
        }
        map.end()
    }
}

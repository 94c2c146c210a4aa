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

//! What goes into a GELF message.
//!
//! [`InclusionPolicy`] gathers the switches & static data that govern message construction: which
//! event attributes to include, the host & facility to stamp on every message, static
//! additional fields, and the [`FieldTypes`] used to coerce field values. Build one with
//! [`InclusionPolicy::builder`], or deserialize one from your configuration file with [`serde`]:
//!
//! ```rust
//! use gelf_tracing::policy::InclusionPolicy;
//! let policy: InclusionPolicy = serde_json::from_str(r#"{
//!     "facility": "billing",
//!     "include_thread": true,
//!     "additional_fields": ["env:prod", "region:us-west-2"],
//!     "field_types": { "elapsed_ms": "long" }
//! }"#).unwrap();
//! assert_eq!(policy.facility(), Some("billing"));
//! ```
//!
//! A policy is read-only once built, and may be shared between threads.
//!
//! [`serde`]: https://docs.rs/serde

use crate::{
    coercion::{FieldType, FieldTypes},
    error::{Error, Result},
};

use backtrace::Backtrace;
use serde::{Deserialize, Deserializer};

use std::collections::BTreeMap;

/// Split a static field given as "key:value" on its first colon
pub fn parse_additional_field(spec: &str) -> Result<(String, String)> {
    match spec.split_once(':') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.trim().to_string()))
        }
        _ => Err(Error::BadAdditionalField {
            spec: spec.to_string(),
            back: Backtrace::new(),
        }),
    }
}

/// Static fields may be configured either as a mapping or as a list of "key:value" strings
fn deserialize_additional_fields<'de, D>(
    deserializer: D,
) -> std::result::Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Map(BTreeMap<String, String>),
        List(Vec<String>),
    }
    match Repr::deserialize(deserializer)? {
        Repr::Map(map) => Ok(map),
        Repr::List(specs) => specs
            .iter()
            .map(|spec| parse_additional_field(spec).map_err(serde::de::Error::custom))
            .collect(),
    }
}

/// Governs which event attributes make it into a GELF message
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InclusionPolicy {
    origin_host: Option<String>,
    facility: Option<String>,
    include_host: bool,
    include_level: bool,
    include_location: bool,
    include_logger: bool,
    include_marker: bool,
    include_properties: bool,
    include_thread: bool,
    #[serde(deserialize_with = "deserialize_additional_fields")]
    additional_fields: BTreeMap<String, String>,
    field_types: FieldTypes,
}

impl std::default::Default for InclusionPolicy {
    /// Host, level, logger & contextual properties are in; source location, marker & thread are out.
    fn default() -> Self {
        InclusionPolicy {
            origin_host: None,
            facility: None,
            include_host: true,
            include_level: true,
            include_location: false,
            include_logger: true,
            include_marker: false,
            include_properties: true,
            include_thread: false,
            additional_fields: BTreeMap::new(),
            field_types: FieldTypes::new(),
        }
    }
}

impl InclusionPolicy {
    pub fn builder() -> InclusionPolicyBuilder {
        InclusionPolicyBuilder {
            imp: InclusionPolicy::default(),
        }
    }
    /// The host name to stamp on every message, overriding whatever the transport would use
    pub fn origin_host(&self) -> Option<&str> {
        self.origin_host.as_deref()
    }
    pub fn facility(&self) -> Option<&str> {
        self.facility.as_deref()
    }
    /// When false, no message carries a host, neither the override nor a discovered default
    pub fn include_host(&self) -> bool {
        self.include_host
    }
    pub fn include_level(&self) -> bool {
        self.include_level
    }
    /// Source location is the one attribute that may be expensive to obtain
    pub fn include_location(&self) -> bool {
        self.include_location
    }
    pub fn include_logger(&self) -> bool {
        self.include_logger
    }
    pub fn include_marker(&self) -> bool {
        self.include_marker
    }
    pub fn include_properties(&self) -> bool {
        self.include_properties
    }
    pub fn include_thread(&self) -> bool {
        self.include_thread
    }
    pub fn additional_fields(&self) -> &BTreeMap<String, String> {
        &self.additional_fields
    }
    pub fn field_types(&self) -> &FieldTypes {
        &self.field_types
    }
}

pub struct InclusionPolicyBuilder {
    imp: InclusionPolicy,
}

impl InclusionPolicyBuilder {
    pub fn origin_host(mut self, host: impl Into<String>) -> Self {
        self.imp.origin_host = Some(host.into());
        self
    }
    pub fn facility(mut self, facility: impl Into<String>) -> Self {
        self.imp.facility = Some(facility.into());
        self
    }
    pub fn include_host(mut self, include: bool) -> Self {
        self.imp.include_host = include;
        self
    }
    pub fn include_level(mut self, include: bool) -> Self {
        self.imp.include_level = include;
        self
    }
    pub fn include_location(mut self, include: bool) -> Self {
        self.imp.include_location = include;
        self
    }
    pub fn include_logger(mut self, include: bool) -> Self {
        self.imp.include_logger = include;
        self
    }
    pub fn include_marker(mut self, include: bool) -> Self {
        self.imp.include_marker = include;
        self
    }
    pub fn include_properties(mut self, include: bool) -> Self {
        self.imp.include_properties = include;
        self
    }
    pub fn include_thread(mut self, include: bool) -> Self {
        self.imp.include_thread = include;
        self
    }
    pub fn additional_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.imp.additional_fields.insert(key.into(), value.into());
        self
    }
    /// Add a static field given as "key:value"
    pub fn additional_field_spec(mut self, spec: &str) -> Result<Self> {
        let (key, value) = parse_additional_field(spec)?;
        self.imp.additional_fields.insert(key, value);
        Ok(self)
    }
    pub fn field_type(mut self, name: impl Into<String>, kind: FieldType) -> Self {
        self.imp.field_types.insert(name, kind);
        self
    }
    /// Declare the type of field `name` by type name ("int", "long", "float" or "double")
    pub fn field_type_name(mut self, name: impl Into<String>, kind: &str) -> Result<Self> {
        self.imp.field_types.insert(name, kind.parse()?);
        Ok(self)
    }
    pub fn field_types(mut self, types: FieldTypes) -> Self {
        self.imp.field_types = types;
        self
    }
    pub fn build(self) -> InclusionPolicy {
        self.imp
    }
}

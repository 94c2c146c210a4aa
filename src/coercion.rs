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

//! Typed coercion of textual field values.
//!
//! Contextual properties & static fields arrive as text, but a collector can do a great deal more
//! with `"elapsed_ms": 42` than with `"elapsed_ms": "42"`. [`FieldTypes`] maps field names to one
//! of a small, closed set of numeric [`FieldType`]s; type names are resolved when the mapping is
//! built, so an unknown type is a configuration error rather than a per-message surprise.
//!
//! Coercion itself never fails the message: text that doesn't parse is kept as text, and the
//! failure comes back as a [`CoercionWarning`].

use crate::error::{Error, Result};

use backtrace::Backtrace;
use serde::{Deserialize, Serialize};

use std::collections::HashMap;

type StdResult<T, E> = std::result::Result<T, E>;

/// The numeric types to which a field may be coerced
#[derive(Copy, Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum FieldType {
    /// 32-bit signed integer
    Int,
    /// 64-bit signed integer
    Long,
    /// 32-bit float
    Float,
    /// 64-bit float
    Double,
}

impl std::str::FromStr for FieldType {
    type Err = Error;
    fn from_str(s: &str) -> Result<FieldType> {
        match s.trim().to_ascii_lowercase().as_str() {
            "int" | "integer" => Ok(FieldType::Int),
            "long" => Ok(FieldType::Long),
            "float" => Ok(FieldType::Float),
            "double" => Ok(FieldType::Double),
            _ => Err(Error::BadFieldType {
                name: s.to_string(),
                back: Backtrace::new(),
            }),
        }
    }
}

impl std::convert::TryFrom<String> for FieldType {
    type Error = Error;
    fn try_from(x: String) -> StdResult<Self, Self::Error> {
        x.parse()
    }
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                FieldType::Int => "int",
                FieldType::Long => "long",
                FieldType::Float => "float",
                FieldType::Double => "double",
            }
        )
    }
}

impl FieldType {
    /// Parse `text` as this type.
    ///
    /// Leading & trailing whitespace is ignored. Non-finite floats ("NaN", "inf") are refused,
    /// since they have no JSON representation.
    pub fn parse(self, text: &str) -> StdResult<FieldValue, String> {
        let text = text.trim();
        match self {
            FieldType::Int => text
                .parse::<i32>()
                .map(FieldValue::Int)
                .map_err(|err| err.to_string()),
            FieldType::Long => text
                .parse::<i64>()
                .map(FieldValue::Long)
                .map_err(|err| err.to_string()),
            FieldType::Float => match text.parse::<f32>() {
                Ok(x) if x.is_finite() => Ok(FieldValue::Float(x)),
                Ok(_) => Err("not a finite number".to_string()),
                Err(err) => Err(err.to_string()),
            },
            FieldType::Double => match text.parse::<f64>() {
                Ok(x) if x.is_finite() => Ok(FieldValue::Double(x)),
                Ok(_) => Err("not a finite number".to_string()),
                Err(err) => Err(err.to_string()),
            },
        }
    }
}

/// The value of an additional field in a GELF message
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
}

impl FieldValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Text(text) => Some(text),
            _ => None,
        }
    }
}

impl std::fmt::Display for FieldValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldValue::Text(x) => write!(f, "{}", x),
            FieldValue::Int(x) => write!(f, "{}", x),
            FieldValue::Long(x) => write!(f, "{}", x),
            FieldValue::Float(x) => write!(f, "{}", x),
            FieldValue::Double(x) => write!(f, "{}", x),
        }
    }
}

impl std::convert::From<&str> for FieldValue {
    fn from(x: &str) -> Self {
        FieldValue::Text(x.to_string())
    }
}

impl std::convert::From<String> for FieldValue {
    fn from(x: String) -> Self {
        FieldValue::Text(x)
    }
}

/// A field whose value could not be coerced to its declared type
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CoercionWarning {
    pub field: String,
    /// the text that was retained in place of a number
    pub value: String,
    pub kind: FieldType,
    pub reason: String,
}

impl std::fmt::Display for CoercionWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "field \"{}\": couldn't parse \"{}\" as {} ({}); sending it as text",
            self.field, self.value, self.kind, self.reason
        )
    }
}

/// Field name to [`FieldType`]
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct FieldTypes(HashMap<String, FieldType>);

impl FieldTypes {
    pub fn new() -> FieldTypes {
        FieldTypes::default()
    }
    pub fn insert(&mut self, name: impl Into<String>, kind: FieldType) -> Option<FieldType> {
        self.0.insert(name.into(), kind)
    }
    /// Build a mapping from (field name, type name) pairs, failing on the first unknown type name
    pub fn from_names<I, K, V>(names: I) -> Result<FieldTypes>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: AsRef<str>,
    {
        names
            .into_iter()
            .map(|(name, kind)| -> Result<(String, FieldType)> {
                Ok((name.into(), kind.as_ref().parse::<FieldType>()?))
            })
            .collect::<Result<HashMap<String, FieldType>>>()
            .map(FieldTypes)
    }
    pub fn get(&self, name: &str) -> Option<FieldType> {
        self.0.get(name).copied()
    }
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
    /// Coerce the value `raw` of field `name`.
    ///
    /// Fields with no declared type come back as text. On a parse failure, the [`Err`] variant
    /// describes what went wrong; the caller is expected to fall back to the raw text.
    pub fn coerce(&self, name: &str, raw: &str) -> StdResult<FieldValue, CoercionWarning> {
        match self.get(name) {
            None => Ok(FieldValue::Text(raw.to_string())),
            Some(kind) => kind.parse(raw).map_err(|reason| CoercionWarning {
                field: name.to_string(),
                value: raw.to_string(),
                kind,
                reason,
            }),
        }
    }
}

impl std::iter::FromIterator<(String, FieldType)> for FieldTypes {
    fn from_iter<T: IntoIterator<Item = (String, FieldType)>>(iter: T) -> Self {
        FieldTypes(iter.into_iter().collect())
    }
}

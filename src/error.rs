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
//! [gelf-tracing](crate) errors

use backtrace::Backtrace;

/// [gelf-tracing](crate) error type
///
/// Every variant here is a _configuration_ error (or a failure to hand a finished message off to
/// the transport). Building a message from a [`LogEvent`] never fails; malformed numeric field
/// values are reported as [`CoercionWarning`]s instead.
///
/// As with the rest of the crate, this is a straightforward enumeration rather than something
/// built with [thiserror] or [anyhow]; the match arms are chosen on the basis of what the caller
/// will need to respond.
///
/// [`LogEvent`]: crate::event::LogEvent
/// [`CoercionWarning`]: crate::coercion::CoercionWarning
/// [thiserror]: https://docs.rs/thiserror
/// [anyhow]: https://docs.rs/anyhow
#[non_exhaustive]
pub enum Error {
    /// A layout pattern failed to compile
    BadPattern {
        pattern: String,
        /// character offset into `pattern` at which the problem was noticed
        position: usize,
        reason: String,
        back: Backtrace,
    },
    /// The type mapping named a type we don't know how to parse
    BadFieldType { name: String, back: Backtrace },
    /// A static field given as "key:value" was malformed
    BadAdditionalField { spec: String, back: Backtrace },
    /// General transport layer error
    Transport {
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
        back: Backtrace,
    },
}

impl Error {
    pub(crate) fn bad_pattern(pattern: &str, position: usize, reason: impl Into<String>) -> Error {
        Error::BadPattern {
            pattern: pattern.to_string(),
            position,
            reason: reason.into(),
            back: Backtrace::new(),
        }
    }
}

impl std::fmt::Display for Error {
    // `Error` is non-exhaustive so that adding variants won't be a breaking change to our
    // callers. That means the compiler won't catch us if we miss a variant here, so we
    // always include a `_` arm.
    #[allow(unreachable_patterns)]
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::BadPattern {
                pattern,
                position,
                reason,
                ..
            } => write!(
                f,
                "Invalid layout pattern \"{}\" at position {}: {}",
                pattern, position, reason
            ),
            Error::BadFieldType { name, .. } => write!(
                f,
                "Unknown field type \"{}\"; expected one of int, long, float or double",
                name
            ),
            Error::BadAdditionalField { spec, .. } => write!(
                f,
                "Additional field \"{}\" is not of the form key:value",
                spec
            ),
            Error::Transport { source, .. } => write!(f, "Transport error: {}", source),
            _ => write!(f, "Other gelf-tracing error"),
        }
    }
}

impl std::fmt::Debug for Error {
    #[allow(unreachable_patterns)]
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::BadPattern { back, .. } => write!(f, "{}\n{:?}", self, back),
            Error::BadFieldType { back, .. } => write!(f, "{}\n{:?}", self, back),
            Error::BadAdditionalField { back, .. } => write!(f, "{}\n{:?}", self, back),
            Error::Transport { back, .. } => write!(f, "{}\n{:?}", self, back),
            err => write!(f, "gelf-tracing error: {}", err),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Transport { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod test {

    use super::*;

    #[test]
    fn display() {
        let err = Error::bad_pattern("%q", 1, "unknown conversion word \"q\"");
        assert_eq!(
            format!("{}", err),
            "Invalid layout pattern \"%q\" at position 1: unknown conversion word \"q\""
        );
        // Debug should carry the backtrace along
        assert!(format!("{:?}", err).starts_with("Invalid layout pattern"));

        let err = Error::BadFieldType {
            name: "decimal".to_string(),
            back: Backtrace::new(),
        };
        assert!(format!("{}", err).contains("decimal"));
    }
}

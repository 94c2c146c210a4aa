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

//! syslog severity defintions.
//!
//! GELF borrows its `level` attribute from syslog: the eight severities documented for
//! `syslog()` & defined in `<syslog.h>`, where zero is the most severe. [`Severity`] replicates
//! those names; [`Severity::from`] maps [`tracing`] levels onto them.
//!
//! [`tracing`]: https://docs.rs/tracing/latest/tracing/index.html

type StdResult<T, E> = std::result::Result<T, E>;

/// The eight syslog severity levels. The enumeration values duplicate the constants documented in
/// the `syslog()` manual [page].
///
/// [page]: https://man7.org/linux/man-pages/man3/syslog.3.html
#[allow(non_camel_case_types)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// system is unusable
    LOG_EMERG = 0,
    /// action must be take immediately
    LOG_ALERT = 1,
    /// critical conditions
    LOG_CRIT = 2,
    /// error conditions
    LOG_ERR = 3,
    /// warning conditions
    LOG_WARNING = 4,
    /// normal, but significant condition
    LOG_NOTICE = 5,
    /// informational message
    LOG_INFO = 6,
    /// debug-level message
    LOG_DEBUG = 7,
}

impl Severity {
    /// The numeric value that goes on the wire.
    pub fn code(self) -> u8 {
        self as u8
    }
}

impl std::convert::From<&tracing::Level> for Severity {
    fn from(level: &tracing::Level) -> Self {
        match *level {
            tracing::Level::TRACE | tracing::Level::DEBUG => Severity::LOG_DEBUG,
            tracing::Level::INFO => Severity::LOG_INFO,
            tracing::Level::WARN => Severity::LOG_WARNING,
            tracing::Level::ERROR => Severity::LOG_ERR,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> StdResult<(), std::fmt::Error> {
        write!(
            f,
            "{}",
            match self {
                Severity::LOG_EMERG => "LOG_EMERG",
                Severity::LOG_ALERT => "LOG_ALERT",
                Severity::LOG_CRIT => "LOG_CRIT",
                Severity::LOG_ERR => "LOG_ERR",
                Severity::LOG_WARNING => "LOG_WARNING",
                Severity::LOG_NOTICE => "LOG_NOTICE",
                Severity::LOG_INFO => "LOG_INFO",
                Severity::LOG_DEBUG => "LOG_DEBUG",
            }
        )
    }
}

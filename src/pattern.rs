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

//! Layout patterns: rendering [`LogEvent`]s to text.
//!
//! A [`Pattern`] is compiled once from a logback-style layout string, e.g. `%-5level %m%n`, into a
//! list of render steps, and then applied to any number of events. Compilation is where all the
//! checking happens: an unknown conversion word, a malformed format modifier or a bad option
//! fails [`Pattern::compile`], so a misconfigured layout is caught at startup rather than on the
//! first message.
//!
//! # Syntax
//!
//! Anything other than `%` and `\` is literal text; `\` takes the next character literally. A
//! conversion is introduced by `%`:
//!
//! ```text
//! %[-][min][.[-]max]word[{option}]
//! ```
//!
//! `min` pads the converted text with spaces to at least that many characters (on the left,
//! unless `-` is given). `.max` truncates from the beginning, keeping the _last_ `max`
//! characters; `.-max` truncates from the end, keeping the _first_ `max` characters.
//!
//! | word                                                       | renders                        |
//! |------------------------------------------------------------|--------------------------------|
//! | `m`, `msg`, `message`                                      | the formatted message          |
//! | `n`                                                        | a newline                      |
//! | `p`, `le`, `level`                                         | the level, e.g. `INFO`         |
//! | `c`, `lo`, `logger`                                        | the logger name                |
//! | `t`, `thread`                                              | the thread name                |
//! | `marker`                                                   | the marker, if any             |
//! | `X{key}`, `mdc{key}`                                       | one contextual property, or all|
//! | `d{format}`, `date{format}`                                | the timestamp (UTC, strftime)  |
//! | `ex`, `exception`, `throwable`, `xEx`, `xException`, `xThrowable` | the error & its causes  |
//! | `nopex`, `nopexception`                                    | nothing (see below)            |
//!
//! The exception conversions take an optional depth: `{full}` (the default), `{short}` (one frame)
//! or a frame count.
//!
//! A pattern that mentions neither an exception conversion nor `nopex` gets an implicit trailing
//! exception conversion, so that errors aren't silently lost. `nopex` exists to opt out of that.

use crate::{
    error::{Error, Result},
    event::{ErrorTrace, LogEvent},
};

use chrono::format::{Item, StrftimeItems};

const DEFAULT_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                          render steps                                          //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Minimum width & maximum length applied to a conversion's output
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct Modifier {
    min: Option<usize>,
    left_justify: bool,
    max: Option<usize>,
    /// keep the first `max` characters rather than the last
    truncate_end: bool,
}

impl Modifier {
    fn apply(&self, text: &str, out: &mut String) {
        let len = text.chars().count();
        let (text, len) = match self.max {
            Some(max) if len > max => {
                let kept: String = if self.truncate_end {
                    text.chars().take(max).collect()
                } else {
                    text.chars().skip(len - max).collect()
                };
                (std::borrow::Cow::Owned(kept), max)
            }
            _ => (std::borrow::Cow::Borrowed(text), len),
        };
        let padding = self.min.map(|min| min.saturating_sub(len)).unwrap_or(0);
        if !self.left_justify {
            out.extend(std::iter::repeat(' ').take(padding));
        }
        out.push_str(&text);
        if self.left_justify {
            out.extend(std::iter::repeat(' ').take(padding));
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Conversion {
    Message,
    Newline,
    Level,
    Logger,
    Thread,
    Marker,
    /// One property by key, or all of them
    Property(Option<String>),
    Date(String),
    /// Maximum number of frames per error in the chain; `None` means all of them
    Exception(Option<usize>),
    NoException,
}

impl Conversion {
    fn from_word(word: &str, option: Option<&str>) -> std::result::Result<Conversion, String> {
        let conversion = match word {
            "m" | "msg" | "message" => Conversion::Message,
            "n" => Conversion::Newline,
            "p" | "le" | "level" => Conversion::Level,
            "c" | "lo" | "logger" => Conversion::Logger,
            "t" | "thread" => Conversion::Thread,
            "marker" => Conversion::Marker,
            "X" | "mdc" => {
                return Ok(Conversion::Property(
                    option.filter(|key| !key.is_empty()).map(str::to_string),
                ))
            }
            "d" | "date" => {
                let format = option.unwrap_or(DEFAULT_DATE_FORMAT);
                if StrftimeItems::new(format).any(|item| matches!(item, Item::Error)) {
                    return Err(format!("invalid date format \"{}\"", format));
                }
                return Ok(Conversion::Date(format.to_string()));
            }
            "ex" | "exception" | "throwable" | "xEx" | "xException" | "xThrowable" => {
                return match option {
                    None | Some("full") => Ok(Conversion::Exception(None)),
                    Some("short") => Ok(Conversion::Exception(Some(1))),
                    Some(depth) => depth
                        .parse::<usize>()
                        .map(|depth| Conversion::Exception(Some(depth)))
                        .map_err(|_| format!("invalid exception depth \"{}\"", depth)),
                }
            }
            "nopex" | "nopexception" => Conversion::NoException,
            _ => return Err(format!("unknown conversion word \"{}\"", word)),
        };
        match option {
            Some(option) => Err(format!(
                "conversion word \"{}\" takes no option, got \"{}\"",
                word, option
            )),
            None => Ok(conversion),
        }
    }

    fn render<E: LogEvent + ?Sized>(&self, event: &E) -> String {
        match self {
            Conversion::Message => event.formatted_message().to_string(),
            Conversion::Newline => "\n".to_string(),
            Conversion::Level => event.level().to_string(),
            Conversion::Logger => event.logger_name().to_string(),
            Conversion::Thread => event.thread_name().to_string(),
            Conversion::Marker => event.marker().unwrap_or_default().to_string(),
            Conversion::Property(Some(key)) => {
                event.properties().get(key).cloned().unwrap_or_default()
            }
            Conversion::Property(None) => event
                .properties()
                .iter()
                .map(|(key, value)| format!("{}={}", key, value))
                .collect::<Vec<String>>()
                .join(", "),
            // The format was vetted at compile time, so this won't panic.
            Conversion::Date(format) => event.timestamp().format(format).to_string(),
            Conversion::Exception(depth) => event
                .error()
                .map(|trace| render_trace(trace, *depth))
                .unwrap_or_default(),
            Conversion::NoException => String::new(),
        }
    }

    fn handles_exception(&self) -> bool {
        matches!(self, Conversion::Exception(_) | Conversion::NoException)
    }
}

fn render_trace(trace: &ErrorTrace, depth: Option<usize>) -> String {
    let mut out = String::new();
    for (i, link) in trace.chain().enumerate() {
        if i > 0 {
            out.push_str("Caused by: ");
        }
        out.push_str(link.description());
        out.push('\n');
        let frames = link.frames();
        let shown = depth.unwrap_or(frames.len()).min(frames.len());
        for frame in &frames[..shown] {
            out.push_str("\tat ");
            out.push_str(&frame.to_string());
            out.push('\n');
        }
        if shown < frames.len() {
            out.push_str(&format!("\t... {} more\n", frames.len() - shown));
        }
    }
    out
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Step {
    Literal(String),
    Convert {
        conversion: Conversion,
        modifier: Modifier,
    },
}

impl Step {
    fn handles_exception(&self) -> bool {
        match self {
            Step::Convert { conversion, .. } => conversion.handles_exception(),
            Step::Literal(_) => false,
        }
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                         struct Pattern                                         //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// A compiled layout pattern.
///
/// Immutable once compiled; a [`Pattern`] may be shared freely between threads.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Pattern {
    source: String,
    steps: Vec<Step>,
}

/// Widths & lengths above this are refused at compile time
const MAX_WIDTH: usize = u16::MAX as usize;

/// Parse a run of decimal digits at `i`; return the value (if there were any digits) & the index
/// just past them.
fn digits(pattern: &str, chars: &[char], mut i: usize) -> Result<(Option<usize>, usize)> {
    let start = i;
    let mut n: usize = 0;
    while let Some(d) = chars.get(i).and_then(|c| c.to_digit(10)) {
        n = n * 10 + d as usize;
        if n > MAX_WIDTH {
            return Err(Error::bad_pattern(
                pattern,
                start,
                format!("width too large (at most {})", MAX_WIDTH),
            ));
        }
        i += 1;
    }
    if i == start {
        Ok((None, i))
    } else {
        Ok((Some(n), i))
    }
}

/// Parse the conversion beginning with the `%` at `start`; return it & the index just past it.
fn parse_conversion(pattern: &str, chars: &[char], start: usize) -> Result<(Step, usize)> {
    let mut i = start + 1;
    if i == chars.len() {
        return Err(Error::bad_pattern(pattern, start, "dangling '%'"));
    }

    let mut modifier = Modifier::default();
    if chars[i] == '-' {
        modifier.left_justify = true;
        i += 1;
    }
    let (min, next) = digits(pattern, chars, i)?;
    modifier.min = min;
    i = next;
    if chars.get(i) == Some(&'.') {
        i += 1;
        if chars.get(i) == Some(&'-') {
            modifier.truncate_end = true;
            i += 1;
        }
        let (max, next) = digits(pattern, chars, i)?;
        if max.is_none() {
            return Err(Error::bad_pattern(
                pattern,
                i,
                "expected a maximum length after '.'",
            ));
        }
        modifier.max = max;
        i = next;
    }

    let word_start = i;
    while chars.get(i).map_or(false, |c| c.is_ascii_alphabetic()) {
        i += 1;
    }
    if i == word_start {
        return Err(Error::bad_pattern(pattern, i, "missing conversion word"));
    }
    let word: String = chars[word_start..i].iter().collect();

    let mut option: Option<String> = None;
    if chars.get(i) == Some(&'{') {
        let close = chars[i..]
            .iter()
            .position(|c| *c == '}')
            .ok_or_else(|| Error::bad_pattern(pattern, i, "unterminated '{'"))?;
        option = Some(chars[i + 1..i + close].iter().collect());
        i += close + 1;
    }

    let conversion = Conversion::from_word(&word, option.as_deref())
        .map_err(|reason| Error::bad_pattern(pattern, word_start, reason))?;
    Ok((
        Step::Convert {
            conversion,
            modifier,
        },
        i,
    ))
}

impl Pattern {
    /// Compile `pattern`, failing if it is malformed in any way.
    pub fn compile(pattern: &str) -> Result<Pattern> {
        let chars: Vec<char> = pattern.chars().collect();
        let mut steps = Vec::new();
        let mut literal = String::new();
        let mut i = 0;
        while i < chars.len() {
            match chars[i] {
                '\\' => {
                    let escaped = chars
                        .get(i + 1)
                        .ok_or_else(|| Error::bad_pattern(pattern, i, "trailing '\\'"))?;
                    literal.push(*escaped);
                    i += 2;
                }
                '%' => {
                    if !literal.is_empty() {
                        steps.push(Step::Literal(std::mem::take(&mut literal)));
                    }
                    let (step, next) = parse_conversion(pattern, &chars, i)?;
                    steps.push(step);
                    i = next;
                }
                c => {
                    literal.push(c);
                    i += 1;
                }
            }
        }
        if !literal.is_empty() {
            steps.push(Step::Literal(literal));
        }

        if !steps.iter().any(Step::handles_exception) {
            steps.push(Step::Convert {
                conversion: Conversion::Exception(None),
                modifier: Modifier::default(),
            });
        }

        Ok(Pattern {
            source: pattern.to_string(),
            steps,
        })
    }

    /// This pattern with all exception rendering removed, explicit or implicit.
    pub fn without_exception(mut self) -> Pattern {
        self.steps.retain(|step| {
            !matches!(
                step,
                Step::Convert {
                    conversion: Conversion::Exception(_),
                    ..
                }
            )
        });
        if !self.steps.iter().any(Step::handles_exception) {
            self.steps.push(Step::Convert {
                conversion: Conversion::NoException,
                modifier: Modifier::default(),
            });
        }
        self
    }

    /// The text from which this pattern was compiled
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Render `event` according to this pattern; this cannot fail.
    pub fn render<E: LogEvent + ?Sized>(&self, event: &E) -> String {
        let mut out = String::new();
        for step in &self.steps {
            match step {
                Step::Literal(text) => out.push_str(text),
                Step::Convert {
                    conversion,
                    modifier,
                } => modifier.apply(&conversion.render(event), &mut out),
            }
        }
        out
    }
}

impl std::str::FromStr for Pattern {
    type Err = Error;
    fn from_str(s: &str) -> Result<Pattern> {
        Pattern::compile(s)
    }
}

impl std::fmt::Display for Pattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.source)
    }
}

#[cfg(test)]
mod test {

    use super::*;

    use crate::event::{Record, StackFrame};

    use chrono::{TimeZone, Utc};

    fn record(message: &str) -> Record {
        Record::new(tracing::Level::INFO, message)
            .with_logger_name("app::db")
            .with_thread_name("main")
    }

    fn failing(message: &str) -> Record {
        record(message).with_error(
            ErrorTrace::new("failed to write checkpoint")
                .with_frame(StackFrame::new("app::db::flush").with_location("src/db.rs", 42))
                .with_frame(StackFrame::new("app::main"))
                .caused_by(ErrorTrace::new("disk on fire")),
        )
    }

    fn bad(pattern: &str) -> bool {
        matches!(Pattern::compile(pattern), Err(Error::BadPattern { .. }))
    }

    #[test]
    fn message_and_literals() {
        let p = Pattern::compile("[%m]%nopex").unwrap();
        assert_eq!(p.render(&record("Hello, world!")), "[Hello, world!]");
        assert_eq!(p.as_str(), "[%m]%nopex");

        let p = Pattern::compile("%-5level|%5p|%logger|%t%n%nopex").unwrap();
        assert_eq!(p.render(&record("x")), "INFO | INFO|app::db|main\n");

        let p = Pattern::compile("100\\% %msg%nopex").unwrap();
        assert_eq!(p.render(&record("sure")), "100% sure");
    }

    #[test]
    fn truncation() {
        let msg = "a very long log message a very long log message";
        let p = Pattern::compile("%.-23m").unwrap();
        assert_eq!(p.render(&record(msg)), "a very long log message");

        let p = Pattern::compile("%.4m").unwrap();
        assert_eq!(p.render(&record("0123456789")), "6789");
        let p = Pattern::compile("%.-4m").unwrap();
        assert_eq!(p.render(&record("0123456789")), "0123");
        // short text is left alone
        assert_eq!(p.render(&record("01")), "01");
        // characters, not bytes
        assert_eq!(p.render(&record("世界世界世界")), "世界世界");

        let p = Pattern::compile("%-6.-3m|").unwrap();
        assert_eq!(p.render(&record("abcdef")), "abc   |");
    }

    #[test]
    fn properties_marker_date() {
        let rec = record("x")
            .with_property("user", "alice")
            .with_property("request", "17")
            .with_marker("AUDIT")
            .with_timestamp(Utc.timestamp_millis_opt(1_000).unwrap());
        let p = Pattern::compile("%X{user} %mdc %marker %d{%Y-%m-%dT%H:%M:%S%.3f}").unwrap();
        assert_eq!(
            p.render(&rec),
            "alice request=17, user=alice AUDIT 1970-01-01T00:00:01.000"
        );
        let p = Pattern::compile("%date").unwrap();
        assert_eq!(p.render(&rec), "1970-01-01 00:00:01.000");
        let p = Pattern::compile("[%X{missing}][%marker]").unwrap();
        assert_eq!(p.render(&record("x")), "[][]");
    }

    #[test]
    fn exceptions() {
        let p = Pattern::compile("%xEx").unwrap();
        assert_eq!(p.render(&record("no error")), "");
        assert_eq!(
            p.render(&failing("boom")),
            "failed to write checkpoint\n\tat app::db::flush (src/db.rs:42)\n\tat app::main\nCaused by: disk on fire\n"
        );

        let p = Pattern::compile("%ex{short}").unwrap();
        assert_eq!(
            p.render(&failing("boom")),
            "failed to write checkpoint\n\tat app::db::flush (src/db.rs:42)\n\t... 1 more\nCaused by: disk on fire\n"
        );
        let p = Pattern::compile("%ex{0}").unwrap();
        assert!(p.render(&failing("boom")).starts_with("failed to write checkpoint\n\t... 2 more"));
    }

    #[test]
    fn implicit_exception() {
        // No exception handling mentioned: the trace is appended
        let p = Pattern::compile("%m|").unwrap();
        assert_eq!(p.render(&record("boom")), "boom|");
        assert!(p.render(&failing("boom")).starts_with("boom|failed to write checkpoint\n"));

        // ... unless we opt out
        let p = Pattern::compile("%m%nopex").unwrap();
        assert_eq!(p.render(&failing("boom")), "boom");

        // ... or strip it after the fact
        let p = Pattern::compile("%m %ex").unwrap().without_exception();
        assert_eq!(p.render(&failing("boom")), "boom ");
        let p = Pattern::compile("%.-1m").unwrap().without_exception();
        assert_eq!(p.render(&failing("boom")), "b");
    }

    #[test]
    fn compile_errors() {
        assert!(bad("%"));
        assert!(bad("abc %"));
        assert!(bad("%q"));
        assert!(bad("%-"));
        assert!(bad("%.m"));
        assert!(bad("%.-m"));
        assert!(bad("%X{user"));
        assert!(bad("%ex{sideways}"));
        assert!(bad("%d{%!}"));
        assert!(bad("%m{opt}"));
        assert!(bad("oops\\"));
        assert!(bad("%99999999999999999999999m"));
        assert!(bad("%.99999999999999999999999m"));
        assert!(bad("%65536m"));
        assert!(bad("%.-65536m"));

        match Pattern::compile("ok %bogus") {
            Err(Error::BadPattern { position, .. }) => assert_eq!(position, 4),
            _ => panic!("expected a BadPattern error"),
        }

        assert!("%m%n".parse::<Pattern>().is_ok());

        // the largest width compiles & renders
        let p = Pattern::compile("%65535m").unwrap();
        assert_eq!(p.render(&record("x")).chars().count(), 65535);
    }
}

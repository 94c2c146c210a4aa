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

//! [gelf-tracing](crate) [`Layer`] implementation.
//!
//! [`Layer`]: https://docs.rs/tracing-subscriber/latest/tracing_subscriber/layer/trait.Layer.html
//!
//! The [`Layer`] turns each [`tracing`] [`Event`] into a [`Record`]:
//!
//! - the `message` field becomes the primary message, and a field named `marker` the marker
//! - every other field of the event, along with the fields of each [`Span`] in its scope
//!   (outermost first, so that inner values win), becomes a contextual property
//! - an error recorded as a field (e.g. `error = &err as &dyn std::error::Error`) becomes the
//!   event's error, its `source()` chain included
//! - the event's target is the logger name, and its file & line the caller frame
//!
//! It then builds a [`GelfMessage`] with its [`MessageBuilder`] & [`InclusionPolicy`], and hands
//! that to its [`Transport`].
//!
//! [`tracing`]: https://docs.rs/tracing/latest/tracing/index.html
//! [`Event`]: https://docs.rs/tracing/0.1.35/tracing/struct.Event.html
//! [`Span`]: https://docs.rs/tracing/0.1.35/tracing/struct.Span.html

use crate::{
    builder::{MessageBuilder, COERCION_TARGET},
    event::{CallerFrame, ErrorTrace, Properties, Record},
    message::GelfMessage,
    policy::InclusionPolicy,
    transport::Transport,
};

use tracing::{
    field::{Field, Visit},
    span::{Attributes, Id},
    Event,
};
use tracing_subscriber::{layer::Context, registry::LookupSpan};

// When the tracing-log feature is enabled, use NormalizeEvent to extract file/line metadata
// from events that originated from the `log` crate. This follows the same pattern used by
// tracing-subscriber's fmt layer.
// See: https://github.com/tokio-rs/tracing/blob/master/tracing-subscriber/src/fmt/fmt_layer.rs
#[cfg(feature = "tracing-log")]
use tracing_log::NormalizeEvent;

/// Target under which the layer reports its own failures
pub const LAYER_TARGET: &str = "gelf_tracing::layer";

/// Our own diagnostics; turning those into messages could recurse.
fn is_own_diagnostic(target: &str) -> bool {
    target == COERCION_TARGET || target == LAYER_TARGET
}

/// Attempt to figure-out the name of this host.
///
/// Try [gethostname()] first, then fall back to an IP address of this host.
///
/// [gethostname()]: https://man7.org/linux/man-pages/man2/gethostname.2.html
pub fn discover_host() -> Option<String> {
    hostname::get()
        .ok()
        .and_then(|name| name.into_string().ok())
        .filter(|name| !name.is_empty())
        .or_else(|| local_ip_address::local_ip().ok().map(|ip| ip.to_string()))
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                            visitors                                            //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Span fields, stashed in the span's extensions
#[derive(Default)]
struct SpanProperties(Properties);

struct PropertyVisitor<'a>(&'a mut Properties);

impl<'a> Visit for PropertyVisitor<'a> {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.0.insert(field.name().to_string(), value.to_string());
    }
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.0.insert(field.name().to_string(), format!("{:?}", value));
    }
}

struct EventVisitor {
    properties: Properties,
    message: Option<String>,
    marker: Option<String>,
    error: Option<ErrorTrace>,
}

impl EventVisitor {
    fn new(properties: Properties) -> EventVisitor {
        EventVisitor {
            properties,
            message: None,
            marker: None,
            error: None,
        }
    }
    fn record_text(&mut self, field: &Field, text: String) {
        match field.name() {
            "message" => self.message = Some(text),
            "marker" => self.marker = Some(text),
            #[cfg(feature = "tracing-log")]
            name if name.starts_with("log.") => (),
            name => {
                self.properties.insert(name.to_string(), text);
            }
        }
    }
}

impl Visit for EventVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.record_text(field, value.to_string());
    }
    fn record_error(&mut self, _field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.error = Some(ErrorTrace::capture(value));
    }
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        // The tracing macros "pre-format" the `message` field, so that `value` refers to a
        // `std::fmt::Arguments` instance which prints without enclosing double-quotes.
        self.record_text(field, format!("{:?}", value));
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                          struct Layer                                          //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// A [`tracing-subscriber`]-compliant [`Layer`] implementation that builds a [`GelfMessage`] for
/// each [`Event`] & hands it to a [`Transport`].
///
/// [`tracing-subscriber`]: https://docs.rs/tracing-subscriber/latest/tracing_subscriber/index.html
/// [`Layer`]: https://docs.rs/tracing-subscriber/latest/tracing_subscriber/layer/trait.Layer.html
/// [`Event`]: https://docs.rs/tracing/0.1.35/tracing/struct.Event.html
pub struct Layer<T: Transport> {
    builder: MessageBuilder,
    policy: InclusionPolicy,
    /// used when the policy names no origin host, but does include the host
    default_host: Option<String>,
    transport: T,
}

impl<T: Transport> Layer<T> {
    /// Construct a Layer with custom inners; the default host is discovered from the system
    pub fn new(builder: MessageBuilder, policy: InclusionPolicy, transport: T) -> Self {
        Layer {
            builder,
            policy,
            default_host: discover_host(),
            transport,
        }
    }
    /// Construct a Layer with the default patterns & policy that sends messages via `transport`
    pub fn with_transport(transport: T) -> Self {
        Layer::new(MessageBuilder::new(), InclusionPolicy::default(), transport)
    }
    /// Override (or, with `None`, suppress) the discovered default host
    pub fn with_default_host(mut self, host: Option<String>) -> Self {
        self.default_host = host;
        self
    }
    pub fn policy(&self) -> &InclusionPolicy {
        &self.policy
    }
}

impl<T: Transport> Layer<T> {
    fn build<S>(&self, event: &Event<'_>, ctx: &Context<'_, S>) -> GelfMessage
    where
        S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    {
        // When the tracing-log feature is enabled, use normalized_metadata() to get the
        // file/line info & target for events that originated from the `log` crate. For native
        // tracing events, normalized_metadata() returns None and we use the event's own metadata.
        #[cfg(feature = "tracing-log")]
        let normalized_meta = event.normalized_metadata();
        #[cfg(feature = "tracing-log")]
        let meta = normalized_meta.as_ref().unwrap_or_else(|| event.metadata());
        #[cfg(not(feature = "tracing-log"))]
        let meta = event.metadata();

        let mut properties = Properties::new();
        if self.policy.include_properties() {
            if let Some(scope) = ctx.event_scope(event) {
                for span in scope.from_root() {
                    if let Some(fields) = span.extensions().get::<SpanProperties>() {
                        properties.extend(fields.0.iter().map(|(k, v)| (k.clone(), v.clone())));
                    }
                }
            }
        }

        let mut visitor = EventVisitor::new(properties);
        event.record(&mut visitor);

        let mut record = Record::new(*meta.level(), visitor.message.unwrap_or_default())
            .with_logger_name(meta.target())
            .with_properties(visitor.properties)
            .with_caller(CallerFrame {
                file: meta.file().map(str::to_string),
                line: meta.line(),
            });
        if let Some(marker) = visitor.marker {
            record = record.with_marker(marker);
        }
        if let Some(error) = visitor.error {
            record = record.with_error(error);
        }

        let mut message = self.builder.create_message(&self.policy, &record);
        if self.policy.include_host() && message.host().is_none() {
            if let Some(host) = &self.default_host {
                message.set_host(host.as_str());
            }
        }
        message
    }
}

impl<S, T> tracing_subscriber::layer::Layer<S> for Layer<T>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    T: Transport + 'static,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        if let Some(span) = ctx.span(id) {
            let mut fields = SpanProperties::default();
            attrs.record(&mut PropertyVisitor(&mut fields.0));
            span.extensions_mut().insert(fields);
        }
    }

    fn on_record(&self, id: &Id, values: &tracing::span::Record<'_>, ctx: Context<'_, S>) {
        if let Some(span) = ctx.span(id) {
            let mut extensions = span.extensions_mut();
            if let Some(fields) = extensions.get_mut::<SpanProperties>() {
                values.record(&mut PropertyVisitor(&mut fields.0));
            }
        }
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        if is_own_diagnostic(event.metadata().target()) {
            return;
        }
        let message = self.build(event, &ctx);
        if let Err(err) = self.transport.send(message) {
            ::tracing::error!(target: LAYER_TARGET, "failed to hand off GELF message: {}", err);
        }
    }
}

#[cfg(test)]
mod smoke {

    use super::*;

    use crate::{
        coercion::{FieldType, FieldValue},
        event::current_thread_name,
        severity::Severity,
    };

    use tracing_subscriber::{layer::SubscriberExt, registry::Registry};

    use std::sync::mpsc::{channel, Receiver};

    #[derive(Debug)]
    struct Whoops;
    impl std::fmt::Display for Whoops {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "whoops")
        }
    }
    impl std::error::Error for Whoops {}

    fn capture<F: FnOnce()>(policy: InclusionPolicy, f: F) -> Receiver<GelfMessage> {
        let (tx, rx) = channel();
        let layer = Layer::new(MessageBuilder::new(), policy, tx)
            .with_default_host(Some("bree.local".to_string()));
        tracing::subscriber::with_default(Registry::default().with(layer), f);
        rx
    }

    #[test]
    fn test_basic_event() {
        let rx = capture(InclusionPolicy::default(), || {
            tracing::info!("Hello, {}!", "world");
        });
        let msg = rx.try_recv().unwrap();
        assert_eq!(msg.short_message(), "Hello, world!");
        assert!(msg.full_message().is_none());
        assert_eq!(msg.level(), Some(Severity::LOG_INFO));
        assert_eq!(msg.host(), Some("bree.local"));
        assert_eq!(msg.logger(), Some(module_path!()));
        // not included by default
        assert!(msg.file().is_none());
        assert!(msg.thread().is_none());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_fields_and_spans() {
        let policy = InclusionPolicy::builder()
            .origin_host("origin.local")
            .include_location(true)
            .include_marker(true)
            .include_thread(true)
            .field_type("count", FieldType::Int)
            .build();
        let rx = capture(policy, || {
            let span = tracing::info_span!("request", request_id = "r-17", count = "1");
            let _guard = span.enter();
            tracing::warn!(count = 42, marker = "AUDIT", "Hello, world!");
        });
        let msg = rx.try_recv().unwrap();
        assert_eq!(msg.short_message(), "Hello, world!");
        assert_eq!(msg.level(), Some(Severity::LOG_WARNING));
        // the policy's host wins over the default
        assert_eq!(msg.host(), Some("origin.local"));
        assert_eq!(msg.marker(), Some("AUDIT"));
        assert!(msg.field("marker").is_none());
        assert_eq!(
            msg.field("request_id").and_then(FieldValue::as_str),
            Some("r-17")
        );
        // the event's own field wins over the span's, and is coerced
        assert_eq!(msg.field("count"), Some(&FieldValue::Int(42)));
        assert_eq!(msg.file(), Some(file!()));
        assert!(msg.line().is_some());
        assert_eq!(msg.thread(), Some(current_thread_name().as_str()));
    }

    #[test]
    fn test_span_record() {
        let rx = capture(InclusionPolicy::default(), || {
            let span = tracing::info_span!("job", attempt = tracing::field::Empty);
            span.record("attempt", 3);
            let _guard = span.enter();
            tracing::info!("retrying");
        });
        let msg = rx.try_recv().unwrap();
        assert_eq!(msg.field("attempt").and_then(FieldValue::as_str), Some("3"));
    }

    #[test]
    fn test_properties_excluded() {
        let policy = InclusionPolicy::builder().include_properties(false).build();
        let rx = capture(policy, || {
            let span = tracing::info_span!("request", request_id = "r-17");
            let _guard = span.enter();
            tracing::info!(user = "alice", "Hello, world!");
        });
        let msg = rx.try_recv().unwrap();
        assert!(msg.fields().is_empty());
    }

    #[test]
    fn test_error_event() {
        let rx = capture(InclusionPolicy::default(), || {
            let err = Whoops;
            tracing::error!(error = &err as &(dyn std::error::Error + 'static), "request failed");
        });
        let msg = rx.try_recv().unwrap();
        assert_eq!(msg.short_message(), "request failed");
        assert_eq!(msg.level(), Some(Severity::LOG_ERR));
        let full = msg.full_message().unwrap();
        assert!(full.starts_with("whoops\n"));
        assert!(msg.field("error").is_none());

        // the first frame is the code that logged, not the capture & dispatch machinery
        if let Some(first) = full.lines().nth(1) {
            assert!(first.starts_with("\tat "), "{}", first);
            for machinery in ["gelf_tracing::event::", "EventVisitor", "tracing_core::", "backtrace::"] {
                assert!(!first.contains(machinery), "{}", first);
            }
            assert!(first.contains("test_error_event"), "{}", first);
        }
    }

    #[test]
    fn test_own_diagnostics_ignored() {
        let rx = capture(InclusionPolicy::default(), || {
            tracing::warn!(target: "gelf_tracing::coercion", "field \"count\" is not a number");
            tracing::error!(target: "gelf_tracing::layer", "failed to hand off GELF message");
        });
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_similar_targets_forwarded() {
        let rx = capture(InclusionPolicy::default(), || {
            tracing::info!(target: "gelf_tracing_app", "one");
            tracing::info!(target: "gelf_tracing::layer::smoke", "two");
            tracing::info!("three");
        });
        let loggers: Vec<String> = rx
            .try_iter()
            .map(|msg| msg.logger().unwrap_or_default().to_string())
            .collect();
        assert_eq!(
            loggers,
            vec!["gelf_tracing_app", "gelf_tracing::layer::smoke", module_path!()]
        );
    }

    #[test]
    fn test_coercion_warning_not_forwarded() {
        let policy = InclusionPolicy::builder()
            .field_type("count", FieldType::Int)
            .build();
        let rx = capture(policy, || {
            tracing::info!(count = "oops", "counted");
        });
        let messages: Vec<GelfMessage> = rx.try_iter().collect();
        // just the event itself; the WARN about "oops" isn't turned into a message
        assert_eq!(messages.len(), 1);
        assert_eq!(
            messages[0].field("count").and_then(FieldValue::as_str),
            Some("oops")
        );
    }

    #[test]
    fn test_host_excluded() {
        let policy = InclusionPolicy::builder().include_host(false).build();
        let rx = capture(policy, || {
            tracing::info!("Hello, world!");
        });
        assert!(rx.try_recv().unwrap().host().is_none());
    }

    #[test]
    fn test_transport_failure() {
        let (tx, rx) = channel();
        drop(rx);
        let layer = Layer::with_transport(tx);
        // Must neither panic nor recurse
        tracing::subscriber::with_default(Registry::default().with(layer), || {
            tracing::info!("into the void");
        });
    }
}

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
//! A [`tracing-subscriber`] [`Layer`] implementation for building [GELF] messages from [`tracing`]
//! [`Event`]s
//!
//! [`tracing-subscriber`]: https://docs.rs/tracing-subscriber/latest/tracing_subscriber/index.html
//! [`Layer`]: https://docs.rs/tracing-subscriber/latest/tracing_subscriber/layer/trait.Layer.html
//! [GELF]: https://go2docs.graylog.org/current/getting_in_log_data/gelf.html
//! [`tracing`]: https://docs.rs/tracing/latest/tracing/index.html
//! [`Event`]: https://docs.rs/tracing/0.1.35/tracing/struct.Event.html
//!
//! # Introduction
//!
//! The Graylog Extended Log Format is a JSON schema for shipping structured log events to a log
//! collector: a handful of fixed attributes (`host`, `timestamp`, `level`, `short_message`,
//! `full_message` and so on) plus any number of "additional fields" whose names begin with an
//! underscore. Turning a log event into one of these messages involves a surprising number of
//! decisions: which event attributes to include, how to render the short & full message bodies,
//! and whether `"42"` ought to reach the collector as a string or a number.
//!
//! This crate makes those decisions configurable, and keeps them apart from delivery. The
//! translation occurs in three parts:
//!
//! 1. a [`LogEvent`] (from the [`Layer`], or built by hand as a [`Record`]) supplies the raw
//!    material: timestamp, level, logger, thread, marker, contextual properties, message & error
//!
//! 2. a [`MessageBuilder`], governed by an [`InclusionPolicy`], renders the short & full messages
//!    with compiled [`Pattern`]s, coerces field values to their configured numeric types, and
//!    produces a [`GelfMessage`]
//!
//! 3. a [`Transport`] takes the message away for serialization & delivery
//!
//! [`Layer`]: crate::layer::Layer
//! [`LogEvent`]: crate::event::LogEvent
//! [`Record`]: crate::event::Record
//! [`MessageBuilder`]: crate::builder::MessageBuilder
//! [`InclusionPolicy`]: crate::policy::InclusionPolicy
//! [`Pattern`]: crate::pattern::Pattern
//! [`GelfMessage`]: crate::message::GelfMessage
//! [`Transport`]: crate::transport::Transport
//!
//! # Usage
//!
//! ```rust
//! use gelf_tracing::{builder::MessageBuilder, layer::Layer, policy::InclusionPolicy};
//! use tracing_subscriber::registry::Registry;
//! use tracing_subscriber::layer::SubscriberExt; // Needed to get `with()`
//!
//! let policy = InclusionPolicy::builder()
//!     .facility("billing")
//!     .include_thread(true)
//!     .field_type_name("elapsed_ms", "long")
//!     .unwrap()
//!     .build();
//! let builder = MessageBuilder::new()
//!     .short_message_pattern("%.-80m")
//!     .unwrap();
//!
//! // Hand messages to whatever owns the connection to your collector
//! let (tx, rx) = std::sync::mpsc::channel();
//! let subscriber = Registry::default().with(Layer::new(builder, policy, tx));
//!
//! tracing::subscriber::with_default(subscriber, || {
//!     tracing::info!(elapsed_ms = 17, "Hello, world!");
//! });
//!
//! let message = rx.recv().unwrap();
//! assert_eq!(message.short_message(), "Hello, world!");
//! println!("{}", message.to_json().unwrap());
//! ```
//!
//! Message construction never fails: a field value that won't parse as its configured type is
//! sent as text, and reported (see [`MessageBuilder::create_message_with_warnings`]).
//!
//! [`MessageBuilder::create_message_with_warnings`]: crate::builder::MessageBuilder::create_message_with_warnings

pub mod builder;
pub mod coercion;
pub mod error;
pub mod event;
pub mod layer;
pub mod message;
pub mod pattern;
pub mod policy;
pub mod severity;
pub mod transport;

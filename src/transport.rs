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

//! Handing finished messages off for delivery.
//!
//! This crate builds GELF messages; it doesn't put them on the wire. The [`Transport`] trait is
//! the seam at which the [`Layer`](crate::layer::Layer) lets go of a message. Implementations are
//! provided for both flavors of [`std::sync::mpsc`] sender, so that a dedicated thread (owning
//! the socket, the compression, the chunking & any retry policy) can do the actual delivery off
//! the logging thread:
//!
//! ```rust
//! use gelf_tracing::message::GelfMessage;
//! let (tx, rx) = std::sync::mpsc::sync_channel::<GelfMessage>(1024);
//! let sender = std::thread::spawn(move || {
//!     for message in rx {
//!         // serialize & send `message` to your collector here
//!         let _json = message.to_json();
//!     }
//! });
//! tx.send(GelfMessage::new()).unwrap();
//! drop(tx);
//! sender.join().unwrap();
//! ```

use crate::{
    error::{Error, Result},
    message::GelfMessage,
};

use backtrace::Backtrace;

use std::sync::mpsc::{Sender, SyncSender, TrySendError};

/// Operations all transports must support.
pub trait Transport {
    /// Take ownership of `message` for delivery. This is called on the logging thread, and so
    /// should not block for long.
    fn send(&self, message: GelfMessage) -> Result<()>;
}

impl Transport for Sender<GelfMessage> {
    fn send(&self, message: GelfMessage) -> Result<()> {
        Sender::send(self, message).map_err(|err| Error::Transport {
            source: Box::new(err),
            back: Backtrace::new(),
        })
    }
}

/// A bounded channel; when it is full, the message is dropped rather than blocking the caller.
impl Transport for SyncSender<GelfMessage> {
    fn send(&self, message: GelfMessage) -> Result<()> {
        self.try_send(message).map_err(|err| Error::Transport {
            source: match err {
                TrySendError::Full(_) => "transport queue is full; message dropped".into(),
                TrySendError::Disconnected(_) => "transport has shut down".into(),
            },
            back: Backtrace::new(),
        })
    }
}

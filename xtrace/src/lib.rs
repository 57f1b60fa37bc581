// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! A transparent man-in-the-middle tracer for the X11 wire protocol:
//! it listens as a fake X display, forwards everything it is sent to a
//! real one unchanged, and logs a human-readable decoding of every
//! request, reply, event and error it sees along the way.
//!
//! The crate splits along the same line `main.c` draws between parsing
//! the wire protocol and running the process: [`atom`], [`extension`],
//! [`matcher`], [`framer`], [`hooks`], [`printer`], [`connection`],
//! [`output`] and [`error`] decode and describe traffic against the
//! descriptor tables [`xtrace_proto`] builds from `.proto` files;
//! [`host`] and [`cli`] do everything needed to actually run as a
//! process — listening sockets, credential copying, the child command,
//! and the event loop tying it all together.

pub mod atom;
pub mod cli;
pub mod config;
pub mod connection;
pub mod error;
pub mod extension;
pub mod framer;
pub mod hooks;
pub mod host;
pub mod matcher;
pub mod output;
pub mod printer;

pub use config::Config;
pub use connection::Connection;
pub use error::TraceFault;

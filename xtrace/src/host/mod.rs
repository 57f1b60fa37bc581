// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Host-side collaborators: everything outside the §1 "core" boundary
//! that a runnable tracer still needs — display-string parsing, the
//! fake-display listener and real-display dialer, `xauth` cookie
//! copying, optional child-process launch, the SCM_RIGHTS ancillary-FD
//! queue, and the single-threaded `select`-based event loop that ties
//! them to [`crate::connection::Connection`].
//!
//! Grounded on `main.c`, `x11common.c`, `x11client.c`, `x11server.c` and
//! `copyauth.c` in the original; none of these modules participate in
//! protocol interpretation.

pub mod auth;
pub mod child;
pub mod display;
pub mod event_loop;
pub mod fdqueue;
pub mod listener;

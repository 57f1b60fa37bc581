// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Descriptor model, DSL parser and table finalizer for the protocol a
//! wire tracer interprets.
//!
//! A tracer cannot know at compile time which X11 extensions a given
//! connection will negotiate, so unlike a conventional protocol binding
//! crate, this crate does not generate Rust types for requests and
//! replies. Instead it loads a declarative description of the protocol
//! from `.proto` files at startup ([`parser`]), builds a mutable graph of
//! that description ([`model`]), and lowers it once into flat, immutable,
//! `Arc`-shared tables ([`tables`]) that the tracer walks one byte range
//! at a time while it runs.

pub mod arena;
pub mod basetype;
pub mod error;
pub mod finalize;
pub mod model;
pub mod parser;
pub mod tables;

use std::path::{Path, PathBuf};

pub use error::ParseError;
pub use tables::Protocol;

/// Parses and finalizes the protocol description reachable from
/// `entry_point` along `search_path`, in one call.
pub fn load(entry_point: &Path, search_path: &[PathBuf]) -> Result<Protocol, ParseError> {
	let descriptors = parser::parse(entry_point, search_path)?;
	Ok(finalize::finalize(&descriptors))
}

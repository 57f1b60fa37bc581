// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Process-wide configuration, populated once by [`crate::cli`] and read
//! thereafter by the rest of the tracer.
//!
//! `main.c` keeps the equivalent of this struct as a handful of
//! file-scope globals (`denyallextensions`, `maxshownlistlen`,
//! `print_timestamps`, ...). A single `Config` passed around by
//! reference gives the same cheap, read-mostly access without actual
//! global mutable state.

use std::path::PathBuf;

/// How (or whether) each output line is prefixed with a timestamp.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TimestampMode {
	#[default]
	None,
	/// Wall-clock time of day.
	Absolute,
	/// Seconds since the previous line on this connection.
	Relative,
	/// Seconds since the tracer started.
	Monotonic,
}

/// The buffering discipline for the trace output stream.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputBuffering {
	#[default]
	Line,
	Full,
}

#[derive(Clone, Debug)]
pub struct Config {
	pub real_display: String,
	pub fake_display: String,
	pub auth_file: Option<PathBuf>,
	pub new_auth_file: Option<PathBuf>,
	pub copy_authentication: bool,
	pub wait_for_client: bool,
	pub stop_when_done: bool,
	pub deny_all_extensions: bool,
	pub read_write_debug: bool,
	pub max_shown_list_len: usize,
	pub out_file: Option<PathBuf>,
	pub buffering: OutputBuffering,
	pub interactive: bool,
	pub timestamp_mode: TimestampMode,
	pub print_counts: bool,
	pub print_offsets: bool,
	pub proto_search_path: Vec<PathBuf>,
	pub command: Vec<String>,
}

impl Default for Config {
	fn default() -> Self {
		Self {
			real_display: String::new(),
			fake_display: String::new(),
			auth_file: None,
			new_auth_file: None,
			copy_authentication: true,
			wait_for_client: false,
			stop_when_done: true,
			deny_all_extensions: false,
			read_write_debug: false,
			max_shown_list_len: 20,
			out_file: None,
			buffering: OutputBuffering::Line,
			interactive: false,
			timestamp_mode: TimestampMode::None,
			print_counts: false,
			print_offsets: false,
			proto_search_path: Vec::new(),
			command: Vec::new(),
		}
	}
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Command-line argument parsing.
//!
//! Grounded on the `getopt_long`/`longoptions` table in `main.c`, kept
//! as a `clap` derive struct the way `tchajed-rust-nbd`'s `main.rs`
//! wires its own `Args` into a `clap::Parser`. Each field maps to one
//! original flag; [`Args::into_config`] does the translation `main`
//! used to do inline after the `getopt_long` loop.

use std::path::PathBuf;

use clap::Parser;

use crate::config::{Config, OutputBuffering, TimestampMode};

#[derive(Parser, Debug)]
#[command(
	name = "xtrace",
	about = "Dump all X protocol data being tunneled from a fake X display to a real one.",
	version
)]
pub struct Args {
	/// Display to connect to (defaults to $DISPLAY).
	#[arg(short = 'd', long = "display")]
	pub display: Option<String>,

	/// Display to fake (defaults to $FAKEDISPLAY, then :9).
	#[arg(short = 'D', long = "fakedisplay")]
	pub fakedisplay: Option<String>,

	/// Authority file to read the real display's credentials from,
	/// instead of ~/.Xauthority.
	#[arg(short = 'f', long = "authfile")]
	pub authfile: Option<PathBuf>,

	/// Authority file to write the fake display's credentials to,
	/// instead of ~/.Xauthority.
	#[arg(short = 'F', long = "newauthfile")]
	pub newauthfile: Option<PathBuf>,

	/// Copy credentials from the real display to the fake one (on by
	/// default).
	#[arg(short = 'c', long = "copyauthentication", overrides_with = "nocopyauthentication")]
	pub copyauthentication: bool,

	/// Do not copy credentials.
	#[arg(short = 'n', long = "nocopyauthentication", overrides_with = "copyauthentication")]
	pub nocopyauthentication: bool,

	/// Wait for a connection even if the given command terminates.
	#[arg(short = 'W', long = "waitforclient")]
	pub waitforclient: bool,

	/// Return when the last client disconnects (on by default).
	#[arg(short = 's', long = "stopwhendone", overrides_with = "keeprunning")]
	pub stopwhendone: bool,

	/// Keep running after the last client disconnects.
	#[arg(short = 'k', long = "keeprunning", overrides_with = "stopwhendone")]
	pub keeprunning: bool,

	/// Fake unavailability of all extensions.
	#[arg(short = 'e', long = "denyextensions")]
	pub denyextensions: bool,

	/// Print amounts of data read/sent.
	#[arg(short = 'w', long = "readwritedebug")]
	pub readwritedebug: bool,

	/// Maximum number of entries shown for each list.
	#[arg(short = 'm', long = "maxlistlength", default_value_t = 20)]
	pub maxlistlength: usize,

	/// Output to file instead of stdout ("-" also means stdout).
	#[arg(short = 'o', long = "outfile")]
	pub outfile: Option<String>,

	/// Do not output every line but only when the buffer is full.
	#[arg(short = 'b', long = "buffered")]
	pub buffered: bool,

	/// Read single-step tokens from stdin before relaying to the server.
	#[arg(short = 'i', long = "interactive")]
	pub interactive: bool,

	/// Prefix every line with the wall-clock time it was printed at.
	#[arg(long = "timestamps")]
	pub timestamps: bool,

	/// Prefix every line with the time since the previous line on its
	/// connection.
	#[arg(long = "relative-timestamps")]
	pub relative_timestamps: bool,

	/// Prefix every line with the time since the tracer started.
	#[arg(long = "monotonic-timestamps")]
	pub monotonic_timestamps: bool,

	/// Print the byte count of each decoded field.
	#[arg(long = "print-counts")]
	pub print_counts: bool,

	/// Print the byte offset of each decoded field.
	#[arg(long = "print-offsets")]
	pub print_offsets: bool,

	/// Additional directory to search for `.proto` files, may be given
	/// more than once.
	#[arg(short = 'I', action = clap::ArgAction::Append)]
	pub search_path: Vec<PathBuf>,

	/// Command (and arguments) to run against the fake display.
	#[arg(trailing_var_arg = true, allow_hyphen_values = true)]
	pub command: Vec<String>,
}

impl Args {
	pub fn into_config(self) -> Config {
		let mut config = Config {
			real_display: self.display.unwrap_or_default(),
			fake_display: self.fakedisplay.unwrap_or_default(),
			auth_file: self.authfile,
			new_auth_file: self.newauthfile,
			copy_authentication: !self.nocopyauthentication,
			wait_for_client: self.waitforclient,
			stop_when_done: !self.keeprunning,
			deny_all_extensions: self.denyextensions,
			read_write_debug: self.readwritedebug,
			max_shown_list_len: self.maxlistlength,
			out_file: self.outfile.filter(|f| f != "-").map(PathBuf::from),
			buffering: if self.buffered { OutputBuffering::Full } else { OutputBuffering::Line },
			interactive: self.interactive,
			timestamp_mode: TimestampMode::None,
			print_counts: self.print_counts,
			print_offsets: self.print_offsets,
			proto_search_path: self.search_path,
			command: self.command,
		};

		if self.monotonic_timestamps {
			config.timestamp_mode = TimestampMode::Monotonic;
		} else if self.relative_timestamps {
			config.timestamp_mode = TimestampMode::Relative;
		} else if self.timestamps {
			config.timestamp_mode = TimestampMode::Absolute;
		}

		config
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_display_flags_and_command() {
		let args = Args::parse_from(["xtrace", "-d", ":0", "-D", ":9", "--", "xterm", "-bg", "black"]);
		assert_eq!(args.display.as_deref(), Some(":0"));
		assert_eq!(args.fakedisplay.as_deref(), Some(":9"));
		assert_eq!(args.command, vec!["xterm", "-bg", "black"]);
	}

	#[test]
	fn nocopyauthentication_overrides_the_default() {
		let args = Args::parse_from(["xtrace", "-n"]);
		let config = args.into_config();
		assert!(!config.copy_authentication);
	}

	#[test]
	fn keeprunning_overrides_stopwhendone() {
		let args = Args::parse_from(["xtrace", "-k"]);
		let config = args.into_config();
		assert!(!config.stop_when_done);
	}

	#[test]
	fn relative_timestamps_select_relative_mode() {
		let args = Args::parse_from(["xtrace", "--relative-timestamps"]);
		let config = args.into_config();
		assert_eq!(config.timestamp_mode, TimestampMode::Relative);
	}
}

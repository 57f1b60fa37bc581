// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Trace output formatting.
//!
//! Grounded on `startline` in `parse.c`, which every print function
//! calls before writing its line: each line begins with the connection
//! id and the direction it travelled (`NNN:<` for client-to-server,
//! `NNN:>` for server-to-client), optionally followed by a timestamp,
//! and ends with the annotated packet summary this crate's other
//! modules produce.

use std::cell::RefCell;
use std::io::{self, Write};
use std::rc::Rc;
use std::time::{Duration, Instant};

use crate::config::{OutputBuffering, TimestampMode};

/// A cheaply-cloneable handle to a single output stream, shared by every
/// connection the event loop accepts. `main.c` has exactly one `FILE
/// *out` for all connections' lines; `Rc<RefCell<_>>` gives the same
/// single-writer-at-a-time sharing without the real concurrency this
/// crate's single-threaded event loop never needs.
#[derive(Clone)]
pub struct SharedSink(Rc<RefCell<dyn Write>>);

impl SharedSink {
	pub fn new(sink: impl Write + 'static) -> Self {
		Self(Rc::new(RefCell::new(sink)))
	}
}

impl Write for SharedSink {
	fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
		self.0.borrow_mut().write(buf)
	}

	fn flush(&mut self) -> io::Result<()> {
		self.0.borrow_mut().flush()
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
	ClientToServer,
	ServerToClient,
}

impl Direction {
	fn marker(self) -> char {
		match self {
			Direction::ClientToServer => '<',
			Direction::ServerToClient => '>',
		}
	}
}

/// Tracks the clocks a [`TimestampMode`] may need: wall-clock isn't
/// representable without leaving this crate's no-non-essential-deps
/// posture (`std::time::SystemTime` suffices and needs nothing extra),
/// and the monotonic/relative bases are `Instant`s captured at the
/// moments `main.c` captures `starttime`/the previous line's time.
pub struct Clock {
	started_at: Instant,
}

impl Clock {
	pub fn start() -> Self {
		Self {
			started_at: Instant::now(),
		}
	}

	pub fn elapsed(&self) -> Duration {
		self.started_at.elapsed()
	}
}

/// Writes formatted trace lines to a sink, honouring the configured
/// timestamp mode and the connection-relative "time of last line"
/// state that [`TimestampMode::Relative`] needs.
pub struct Formatter<W> {
	sink: W,
	mode: TimestampMode,
	buffering: OutputBuffering,
	clock: Clock,
	last_line_at: std::collections::HashMap<u32, Duration>,
}

impl<W: Write> Formatter<W> {
	pub fn new(sink: W, mode: TimestampMode) -> Self {
		Self::with_buffering(sink, mode, OutputBuffering::Line)
	}

	/// Like [`Self::new`], additionally honouring the `--buffered`
	/// operator flag: [`OutputBuffering::Line`] flushes the sink after
	/// every line (the default), [`OutputBuffering::Full`] leaves
	/// flushing to the sink's own discipline (or process exit).
	pub fn with_buffering(sink: W, mode: TimestampMode, buffering: OutputBuffering) -> Self {
		Self {
			sink,
			mode,
			buffering,
			clock: Clock::start(),
			last_line_at: std::collections::HashMap::new(),
		}
	}

	/// Writes the `NNN:D:` prefix (plus a timestamp, if configured) and
	/// returns the prefix's width-independent line so far, matching
	/// `startline`'s responsibility of writing the common head of every
	/// line before its caller appends the packet-specific summary.
	pub fn start_line(&mut self, connection: u32, direction: Direction) -> std::io::Result<()> {
		let now = self.clock.elapsed();
		write!(self.sink, "{:03}:{}:", connection, direction.marker())?;
		match self.mode {
			TimestampMode::None => {}
			TimestampMode::Absolute | TimestampMode::Monotonic => {
				write!(self.sink, "{:.6}:", now.as_secs_f64())?;
			}
			TimestampMode::Relative => {
				let previous = self
					.last_line_at
					.insert(connection, now)
					.unwrap_or(Duration::ZERO);
				write!(self.sink, "{:.6}:", (now - previous).as_secs_f64())?;
			}
		}
		Ok(())
	}

	pub fn write_line(&mut self, text: &str) -> std::io::Result<()> {
		writeln!(self.sink, "{text}")?;
		if self.buffering == OutputBuffering::Line {
			self.sink.flush()?;
		}
		Ok(())
	}

	pub fn flush(&mut self) -> std::io::Result<()> {
		self.sink.flush()
	}

	/// Borrows the underlying sink, for tests that need to inspect what
	/// has been written so far without consuming the formatter.
	pub fn sink_ref(&self) -> &W {
		&self.sink
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn start_line_has_connection_id_and_direction_marker() {
		let mut formatter = Formatter::new(Vec::new(), TimestampMode::None);
		formatter.start_line(7, Direction::ClientToServer).unwrap();
		formatter.write_line("CreateWindow()").unwrap();
		let output = String::from_utf8(formatter.sink).unwrap();
		assert_eq!(output, "007:<:CreateWindow()\n");
	}

	#[test]
	fn server_direction_uses_the_gt_marker() {
		let mut formatter = Formatter::new(Vec::new(), TimestampMode::None);
		formatter.start_line(1, Direction::ServerToClient).unwrap();
		formatter.write_line("Success").unwrap();
		let output = String::from_utf8(formatter.sink).unwrap();
		assert_eq!(output, "001:>:Success\n");
	}
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The expected-reply queue: matches server replies and errors back to
//! the client request that caused them, by sequence number.
//!
//! Grounded on `struct expectedreply` and its FIFO handling in
//! `parse.c`. The queue is strictly ordered by increasing sequence
//! number (X11 sequence numbers only ever increase on a connection, modulo
//! 16-bit wraparound in the wire encoding), so matching a reply only
//! ever needs to drain from the front.

use std::collections::VecDeque;
use std::sync::Arc;

use xtrace_proto::tables::Request;

/// Extra payload an expected-reply record carries for the tracer's three
/// special hooks, set by the matching request's pre-hook and consumed by
/// its post-hook.
#[derive(Debug, Clone)]
pub enum Hook {
	None,
	/// `InternAtom`: the name the client asked to intern.
	InternAtom { name: Arc<str> },
	/// `QueryExtension`: the name queried, and whether it resolved to a
	/// descriptor already known to this crate's tables.
	QueryExtension { name: Arc<str> },
	/// `ListFontsWithInfo`: replies keep coming until a reply with an
	/// empty name terminates the sequence; all but the last are not
	/// removed from the queue.
	ListFontsWithInfo,
}

/// One outstanding request awaiting its reply.
#[derive(Debug, Clone)]
pub struct ExpectedReply {
	pub sequence: u32,
	pub request: Arc<Request>,
	pub hook: Hook,
	/// Stack values captured at request time that the reply-time code
	/// needs (`record_variables` in `struct request`).
	pub saved_stack: Vec<u64>,
}

/// The full-width monotonic counter a connection's 16-bit wire sequence
/// numbers are unwrapped against, so replies remain matchable across
/// wraparound at 65536.
#[derive(Debug, Default)]
pub struct SequenceCounter {
	next: u64,
}

impl SequenceCounter {
	pub fn new() -> Self {
		Self { next: 1 }
	}

	/// Called once per client request; returns the full 32-bit-plus
	/// sequence number it was assigned.
	pub fn advance(&mut self) -> u64 {
		let seq = self.next;
		self.next += 1;
		seq
	}

	/// Unwraps a 16-bit wire sequence number (as carried by a reply,
	/// event or error) against the most recently issued full sequence,
	/// choosing whichever full value is closest to `last_issued` without
	/// exceeding it outright.
	pub fn unwrap(&self, wire: u16) -> u64 {
		let last_issued = self.next.saturating_sub(1);
		let low16 = (last_issued & 0xffff) as u16;
		if wire <= low16 {
			last_issued - (low16 - wire) as u64
		} else {
			last_issued.saturating_sub(low16 as u64 + (0x10000 - wire as u64))
		}
	}
}

/// The queue of [`ExpectedReply`]s for one connection.
#[derive(Debug, Default)]
pub struct Matcher {
	queue: VecDeque<ExpectedReply>,
}

/// What happened when a reply or error arrived.
pub enum MatchResult {
	/// Found the record and removed it from the queue.
	Matched(ExpectedReply),
	/// Found the record but it stays queued (non-terminal
	/// `ListFontsWithInfo` reply).
	MatchedContinuing(ExpectedReply),
	/// No record with this sequence exists; older, strictly-smaller
	/// sequence numbers still in the queue are stranded and drained
	/// with a diagnostic.
	Unmatched { stranded: Vec<ExpectedReply> },
}

impl Matcher {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn push(&mut self, reply: ExpectedReply) {
		debug_assert!(self.queue.back().map_or(true, |r| r.sequence < reply.sequence));
		self.queue.push_back(reply);
	}

	/// Looks up `sequence`, draining and reporting any older entries
	/// that can never be matched now that a newer sequence has arrived
	/// (the original's "stranded" diagnostic: a reply must have been
	/// skipped, most often because the client's request never produced
	/// one, e.g. it was answered with an error that client code chose
	/// not to also treat as consuming the reply slot).
	pub fn take(&mut self, sequence: u64) -> MatchResult {
		let mut stranded = Vec::new();
		while let Some(front) = self.queue.front() {
			if front.sequence < sequence {
				stranded.push(self.queue.pop_front().unwrap());
			} else {
				break;
			}
		}
		match self.queue.front() {
			Some(front) if front.sequence == sequence => {
				if matches!(front.hook, Hook::ListFontsWithInfo) {
					MatchResult::MatchedContinuing(self.queue.front().unwrap().clone())
				} else {
					MatchResult::Matched(self.queue.pop_front().unwrap())
				}
			}
			_ => MatchResult::Unmatched { stranded },
		}
	}

	/// Removes the terminal `ListFontsWithInfo` reply once a reply with
	/// an empty name has been observed.
	pub fn finish_list_fonts_with_info(&mut self, sequence: u64) -> Option<ExpectedReply> {
		if self.queue.front().map(|f| f.sequence) == Some(sequence) {
			self.queue.pop_front()
		} else {
			None
		}
	}

	pub fn len(&self) -> usize {
		self.queue.len()
	}

	pub fn is_empty(&self) -> bool {
		self.queue.is_empty()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn dummy_request(name: &str) -> Arc<Request> {
		Arc::new(Request {
			name: Arc::from(name),
			opcode: 0,
			request: xtrace_proto::tables::Body::Parameters(Arc::from(Vec::new())),
			response: None,
		})
	}

	#[test]
	fn sequence_counter_is_monotonic() {
		let mut counter = SequenceCounter::new();
		assert_eq!(counter.advance(), 1);
		assert_eq!(counter.advance(), 2);
	}

	#[test]
	fn matches_in_fifo_order() {
		let mut matcher = Matcher::new();
		matcher.push(ExpectedReply {
			sequence: 1,
			request: dummy_request("GetWindowAttributes"),
			hook: Hook::None,
			saved_stack: Vec::new(),
		});
		matcher.push(ExpectedReply {
			sequence: 2,
			request: dummy_request("GetGeometry"),
			hook: Hook::None,
			saved_stack: Vec::new(),
		});
		match matcher.take(1) {
			MatchResult::Matched(reply) => assert_eq!(reply.request.name.as_ref(), "GetWindowAttributes"),
			_ => panic!("expected a match"),
		}
		assert_eq!(matcher.len(), 1);
	}

	#[test]
	fn stranded_entries_are_drained_on_skip() {
		let mut matcher = Matcher::new();
		matcher.push(ExpectedReply {
			sequence: 1,
			request: dummy_request("A"),
			hook: Hook::None,
			saved_stack: Vec::new(),
		});
		matcher.push(ExpectedReply {
			sequence: 2,
			request: dummy_request("B"),
			hook: Hook::None,
			saved_stack: Vec::new(),
		});
		match matcher.take(2) {
			MatchResult::Matched(reply) => assert_eq!(reply.request.name.as_ref(), "B"),
			_ => panic!("expected a match"),
		}
	}

	#[test]
	fn unwraps_across_sequence_wraparound() {
		let mut counter = SequenceCounter::new();
		for _ in 0..65537 {
			counter.advance();
		}
		// wire carries only the low 16 bits; sequence 65537 wraps to 1.
		assert_eq!(counter.unwrap(1), 65537);
	}
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Runtime fault classification.
//!
//! These are not fatal: a tracer that stops on the first malformed
//! packet is useless for debugging the misbehaving client that produced
//! it. Every fault here is recorded (logged, and where the protocol
//! format calls for it, rendered inline in the trace) and tracing
//! continues best-effort, same as `parse.c`'s handling of truncated
//! packets and unmatched replies.

use thiserror::Error;

/// A fault observed while interpreting one direction of one connection.
#[derive(Debug, Error)]
pub enum TraceFault {
	/// A direction's framing could not be recovered after a short read
	/// or a malformed length field; the connection falls back to pure
	/// byte forwarding for that direction (`c_amlost`/`s_amlost`).
	#[error("framing lost on connection {connection}: {reason}")]
	FramingLost { connection: u32, reason: String },

	/// A packet's declared length runs past the data actually
	/// available; only possible transiently (more bytes are still due)
	/// unless it persists past a full read, in which case it is
	/// reclassified as [`Self::FramingLost`].
	#[error("truncated packet on connection {connection}: need {needed} bytes, have {have}")]
	Truncation {
		connection: u32,
		needed: usize,
		have: usize,
	},

	/// An opcode, event code or error code has no matching descriptor,
	/// including (for opcodes in an extension's minor-opcode range) no
	/// bound extension owning that range.
	#[error("unknown code {code} ({kind}) on connection {connection}")]
	UnknownCode {
		connection: u32,
		kind: &'static str,
		code: u16,
	},

	/// A reply or error carries a sequence number with no corresponding
	/// entry in the expected-reply queue.
	#[error("unmatched reply with sequence {sequence} on connection {connection}")]
	UnmatchedReply { connection: u32, sequence: u16 },

	/// The server answered a request with an error instead of its
	/// expected reply; not itself abnormal (this is ordinary X11
	/// behaviour) but surfaced so matcher bookkeeping can be audited.
	#[error("peer error {error_name} for sequence {sequence} on connection {connection}")]
	PeerError {
		connection: u32,
		sequence: u16,
		error_name: String,
	},
}

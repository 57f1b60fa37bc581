// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Per-connection state and the two synchronous entry points that drive
//! it: [`Connection::parse_client`] and [`Connection::parse_server`].
//!
//! Grounded on `struct connection` in `xtrace.h`. Each connection owns
//! one direction's worth of framing state per peer, an atom table, an
//! extension registry, a reply matcher, and a 64 KiB byte buffer per
//! direction that the host appends freshly read bytes to and the event
//! loop drains from the front as packets are decoded and forwarded.

use std::sync::Arc;

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use xtrace_proto::tables::Body;
use xtrace_proto::Protocol;

use crate::atom::AtomTable;
use crate::extension::Registry;
use crate::framer::{self, ClientState, Framed, ServerState};
use crate::hooks;
use crate::matcher::{ExpectedReply, Hook, MatchResult, Matcher, SequenceCounter};
use crate::output::{Direction, Formatter};
use crate::printer::{self, PrintContext, Stack};

/// Each direction's buffer is sized well past any single core-protocol
/// packet; big requests and large replies can still exceed it, in which
/// case the connection falls back to unbuffered forwarding for that
/// packet, same as the original's fixed `16*4096`-byte buffers.
pub const BUFFER_SIZE: usize = 65536;

pub struct Connection<W> {
	pub id: u32,
	pub from: String,
	pub bigendian: bool,

	// Each direction is a single buffer, matching `struct connection`'s
	// `count`/`ignore` pair in `xtrace.h`: `ignore` bytes at the front are
	// fully decoded (or have been given up on as unrecoverable framing)
	// and are therefore eligible to be written to the peer; everything
	// from `ignore` to the end is still awaiting a complete packet. A
	// decode that mutates a packet in place (the `--denyextensions`
	// `QueryExtension` reply rewrite) mutates this same buffer, so the
	// rewritten bytes are exactly what gets forwarded — there is no
	// separate "forward" copy to fall out of sync with.
	client_buffer: Vec<u8>,
	client_state: ClientState,
	client_ignore: usize,

	server_buffer: Vec<u8>,
	server_state: ServerState,
	server_ignore: usize,

	pub atoms: AtomTable,
	pub extensions: Registry,
	matcher: Matcher,
	sequence: SequenceCounter,
	stack: Stack,

	protocol: Arc<Protocol>,
	formatter: Formatter<W>,
	max_shown_list_len: usize,
	deny_extensions: bool,
	print_counts: bool,
	print_offsets: bool,
	read_write_debug: bool,
}

impl<W: std::io::Write> Connection<W> {
	pub fn new(
		id: u32,
		from: String,
		protocol: Arc<Protocol>,
		formatter: Formatter<W>,
		max_shown_list_len: usize,
		deny_extensions: bool,
	) -> Self {
		Self::with_annotations(id, from, protocol, formatter, max_shown_list_len, deny_extensions, false, false, false)
	}

	/// Like [`Self::new`], additionally honouring the `print-counts` and
	/// `print-offsets` operator flags: `print_counts` prefixes every
	/// request/reply line with the packet's total byte length, and
	/// `print_offsets` suffixes every rendered parameter with the byte
	/// offset it was read from.
	#[allow(clippy::too_many_arguments)]
	pub fn with_annotations(
		id: u32,
		from: String,
		protocol: Arc<Protocol>,
		formatter: Formatter<W>,
		max_shown_list_len: usize,
		deny_extensions: bool,
		print_counts: bool,
		print_offsets: bool,
		read_write_debug: bool,
	) -> Self {
		Self {
			id,
			from,
			bigendian: true,
			client_buffer: Vec::new(),
			client_state: ClientState::default(),
			client_ignore: 0,
			server_buffer: Vec::new(),
			server_state: ServerState::default(),
			server_ignore: 0,
			atoms: AtomTable::new(),
			extensions: Registry::new(),
			matcher: Matcher::new(),
			sequence: SequenceCounter::new(),
			stack: Stack::new(),
			protocol,
			formatter,
			max_shown_list_len,
			deny_extensions,
			print_counts,
			print_offsets,
			read_write_debug,
		}
	}

	/// The `"NNN: "` byte-count prefix `print_counts` adds ahead of a
	/// request/reply summary's sequence number, or empty when the flag is
	/// off.
	fn count_prefix(&self, packet_len: usize) -> String {
		if self.print_counts {
			format!("{packet_len}: ")
		} else {
			String::new()
		}
	}

	/// `--readwritedebug`: logs a raw transfer-accounting line (bytes
	/// read/written, EOF, peer error) to the trace output, bypassing
	/// sequence numbers and decoding entirely. No-op when the flag is off.
	pub fn log_transfer(&mut self, direction: Direction, text: &str) -> std::io::Result<()> {
		if !self.read_write_debug {
			return Ok(());
		}
		self.formatter.start_line(self.id, direction)?;
		self.formatter.write_line(text)
	}

	/// Appends freshly read client-to-server bytes, to be decoded by the
	/// next [`Self::parse_client`] call and, once `parse_client` has
	/// advanced past them, relayed to the server by the event loop.
	pub fn feed_client(&mut self, data: &[u8]) {
		self.client_buffer.extend_from_slice(data);
	}

	/// Appends freshly read server-to-client bytes.
	pub fn feed_server(&mut self, data: &[u8]) {
		self.server_buffer.extend_from_slice(data);
	}

	/// Total bytes currently held in the client-to-server buffer,
	/// decoded or not — the `count` of `0 ≤ ignore ≤ count ≤ buffer_size`.
	/// The event loop stops reading from the client once this reaches
	/// [`BUFFER_SIZE`].
	pub fn client_buffer_len(&self) -> usize {
		self.client_buffer.len()
	}
	pub fn server_buffer_len(&self) -> usize {
		self.server_buffer.len()
	}

	/// Bytes read from the client, decoded, and eligible to be written
	/// to the server.
	pub fn client_forward_len(&self) -> usize {
		self.client_ignore
	}
	/// Bytes read from the server, decoded, and eligible to be written
	/// to the client.
	pub fn server_forward_len(&self) -> usize {
		self.server_ignore
	}

	/// The forwardable prefix of the client-to-server buffer, for the
	/// event loop to hand to `write(2)`. Never includes undecoded bytes
	/// past `ignore`.
	pub fn client_forward_bytes(&self) -> &[u8] {
		&self.client_buffer[..self.client_ignore]
	}
	pub fn server_forward_bytes(&self) -> &[u8] {
		&self.server_buffer[..self.server_ignore]
	}

	/// Drops the first `n` forwarded bytes once the event loop confirms
	/// they were actually written (a `write(2)` may be partial).
	pub fn consume_client_forward(&mut self, n: usize) {
		debug_assert!(n <= self.client_ignore);
		self.client_buffer.drain(..n);
		self.client_ignore -= n;
	}
	pub fn consume_server_forward(&mut self, n: usize) {
		debug_assert!(n <= self.server_ignore);
		self.server_buffer.drain(..n);
		self.server_ignore -= n;
	}

	fn generic_event_code(&self) -> u8 {
		self.protocol
			.events
			.iter()
			.position(|e| e.is_generic)
			.map(|i| i as u8)
			.unwrap_or(35)
	}

	/// Consumes as many complete client packets as are currently
	/// buffered, logging each and updating matcher/extension state.
	/// Advances `client_ignore` past everything decoded (or, once framing
	/// is lost, past everything buffered), which is what makes those
	/// bytes eligible for the event loop to forward to the server.
	pub fn parse_client(&mut self) -> std::io::Result<()> {
		loop {
			let was_lost = matches!(self.client_state, ClientState::Lost);
			let start = self.client_ignore;
			let was_start = matches!(self.client_state, ClientState::Start { .. });
			let framed = framer::frame_client(&self.client_buffer[start..], &mut self.client_state, self.bigendian);
			match framed {
				Framed::NeedMoreData => break,
				Framed::Lost => {
					if !was_lost {
						self.formatter.start_line(self.id, Direction::ClientToServer)?;
						self.formatter.write_line("unexpected-data (framing lost)")?;
					}
					self.client_ignore = self.client_buffer.len();
					break;
				}
				Framed::Packet { length } => {
					let end = start + length;
					let packet = self.client_buffer[start..end].to_vec();
					self.handle_client_packet(&packet, was_start)?;
					self.client_ignore = end;
				}
			}
		}
		Ok(())
	}

	fn handle_client_packet(&mut self, packet: &[u8], was_handshake: bool) -> std::io::Result<()> {
		if was_handshake {
			self.formatter.start_line(self.id, Direction::ClientToServer)?;
			self.formatter.write_line("client handshake")?;
			if let Some(order) = packet.first().copied().and_then(framer::byte_order_from_setup_byte) {
				self.bigendian = order;
			}
			return Ok(());
		}

		let big_request = framer::is_big_request(packet, self.bigendian);
		let offset_adjustment = if big_request { 4 } else { 0 };
		let opcode = packet[0];
		let sequence = self.sequence.advance();

		// Opcodes below 128 are always the core protocol's; opcodes at or
		// above 128 are only meaningful once a `QueryExtension` reply has
		// bound them to an extension's major opcode (the minor opcode then
		// lives at byte 1, selecting that extension's own sub-request
		// table), per `find_extension` in the original `parse.c`.
		let (request, extension_name) = if opcode >= 128 {
			match self.extensions.by_major_opcode(opcode) {
				Some(known) => {
					let minor_opcode = packet.get(1).copied().unwrap_or(0);
					(known.request_by_minor_opcode(minor_opcode).cloned(), Some(known.name.clone()))
				}
				None => (None, None),
			}
		} else {
			(self.protocol.request_by_opcode(opcode).cloned(), None)
		};

		let Some(request) = request else {
			self.formatter.start_line(self.id, Direction::ClientToServer)?;
			let label = match &extension_name {
				Some(ext) => format!("{sequence}: unknown {ext} request {opcode}"),
				None => format!("{sequence}: unknown code {opcode}"),
			};
			self.formatter.write_line(&label)?;
			return Ok(());
		};

		let hook = match &request.request {
			Body::Special(xtrace_proto::tables::SpecialHook::RequestQueryExtension) => {
				hooks::request_query_extension(packet, self.bigendian)
			}
			Body::Special(xtrace_proto::tables::SpecialHook::RequestInternAtom) => {
				hooks::request_intern_atom(packet, self.bigendian)
			}
			_ if matches!(&request.response, Some(Body::Special(xtrace_proto::tables::SpecialHook::ReplyListFontsWithInfo))) => {
				hooks::request_list_fonts_with_info(packet, self.bigendian)
			}
			_ => None,
		};

		let rendered = match &request.request {
			Body::Parameters(parameters) => {
				let ctx = PrintContext {
					bigendian: self.bigendian,
					atoms: &self.atoms,
					max_shown_list_len: self.max_shown_list_len,
					print_offsets: self.print_offsets,
				};
				self.stack.clear();
				printer::print_parameters(packet, parameters, offset_adjustment, &mut self.stack, &ctx).join(", ")
			}
			Body::Special(_) => String::new(),
		};

		let name = match &extension_name {
			Some(ext) => format!("{ext}.{}", request.name),
			None => request.name.to_string(),
		};

		let count = self.count_prefix(packet.len());
		self.formatter.start_line(self.id, Direction::ClientToServer)?;
		self.formatter
			.write_line(&format!("{count}{sequence}: {name}({rendered})"))?;

		if request.response.is_some() || hook.is_some() {
			self.matcher.push(ExpectedReply {
				sequence,
				request: Arc::new(request.clone()),
				hook: hook.unwrap_or(Hook::None),
				saved_stack: Vec::new(),
			});
		}
		Ok(())
	}

	/// Consumes as many complete server packets as are currently
	/// buffered.
	pub fn parse_server(&mut self) -> std::io::Result<()> {
		loop {
			let was_lost = matches!(self.server_state, ServerState::Lost);
			let start = self.server_ignore;
			let code = self.generic_event_code();
			let was_start = matches!(self.server_state, ServerState::Start);
			let framed = framer::frame_server(&self.server_buffer[start..], &mut self.server_state, self.bigendian, code);
			match framed {
				Framed::NeedMoreData => break,
				Framed::Lost => {
					if !was_lost {
						self.formatter.start_line(self.id, Direction::ServerToClient)?;
						self.formatter.write_line("unexpected-data (framing lost)")?;
					}
					self.server_ignore = self.server_buffer.len();
					break;
				}
				Framed::Packet { length } => {
					let end = start + length;
					// Decode on an owned copy (the handlers below need
					// `&mut self` for the matcher/atoms/extensions/
					// formatter, which the buffer itself is a field of),
					// then write any in-place edits — `--denyallextensions`
					// flips one byte of a `QueryExtension` reply — back
					// into the real buffer before marking it forwardable,
					// so what gets written to the client is exactly what
					// was decoded, edits included.
					let mut packet = self.server_buffer[start..end].to_vec();
					self.handle_server_packet(&mut packet, was_start)?;
					self.server_buffer[start..end].copy_from_slice(&packet);
					self.server_ignore = end;
				}
			}
		}
		Ok(())
	}

	fn handle_server_packet(&mut self, packet: &mut [u8], was_start: bool) -> std::io::Result<()> {
		if was_start {
			return self.handle_setup_reply(packet);
		}

		match packet[0] {
			0 => self.handle_error(packet),
			1 => self.handle_reply(packet),
			_ => self.handle_event(packet),
		}
	}

	/// Renders the one-time connection setup reply: `0` is a refusal, `2`
	/// is a further-authentication request (both carry a reason string at
	/// offset 8), and `1` is success, which carries the negotiated
	/// version followed by the vendor/format/screen data `setup`
	/// describes. Grounded on `parse_server`'s `s_start` case in
	/// `parse.c`, which prints the version and then runs the setup
	/// reply's fields through the same generic parameter printer as any
	/// other packet.
	fn handle_setup_reply(&mut self, packet: &[u8]) -> std::io::Result<()> {
		self.formatter.start_line(self.id, Direction::ServerToClient)?;
		match packet[0] {
			1 => {
				let major = u16_at(packet, 2, self.bigendian);
				let minor = u16_at(packet, 4, self.bigendian);
				let rendered = match self.protocol.setup.clone() {
					Some(parameters) => {
						let ctx = PrintContext {
							bigendian: self.bigendian,
							atoms: &self.atoms,
							max_shown_list_len: self.max_shown_list_len,
							print_offsets: self.print_offsets,
						};
						self.stack.clear();
						printer::print_parameters(packet, &parameters, 0, &mut self.stack, &ctx).join(", ")
					}
					None => String::new(),
				};
				self.formatter
					.write_line(&format!("Success, version is {major}.{minor}, ({rendered})"))?;
			}
			status => {
				let reason_len = packet.get(1).copied().unwrap_or(0) as usize;
				let reason = packet
					.get(8..8 + reason_len)
					.map(|bytes| String::from_utf8_lossy(bytes).into_owned())
					.unwrap_or_default();
				let label = if status == 0 { "Failed" } else { "Authenticate" };
				self.formatter.write_line(&format!("{label}, reason \"{reason}\""))?;
			}
		}
		Ok(())
	}

	fn handle_error(&mut self, packet: &[u8]) -> std::io::Result<()> {
		let error_code = packet[1];
		let sequence_wire = u16_at(packet, 2, self.bigendian);
		let sequence = self.sequence.unwrap(sequence_wire);

		let error_name = self
			.protocol
			.error_by_code(error_code)
			.map(str::to_string)
			.or_else(|| {
				self.extensions
					.by_error_code(error_code)
					.and_then(|ext| ext.error_by_code(error_code))
					.map(str::to_string)
			})
			.unwrap_or_else(|| format!("unknown code {error_code}"));

		// an error always consumes the expected-reply slot for its
		// sequence number, same as a terminal reply would.
		let _ = self.matcher.take(sequence);

		self.formatter.start_line(self.id, Direction::ServerToClient)?;
		self.formatter
			.write_line(&format!("{sequence}: {error_name} error"))?;
		Ok(())
	}

	fn handle_reply(&mut self, packet: &mut [u8]) -> std::io::Result<()> {
		let sequence_wire = u16_at(packet, 2, self.bigendian);
		let sequence = self.sequence.unwrap(sequence_wire);

		match self.matcher.take(sequence) {
			MatchResult::Matched(expected) => {
				let count = self.count_prefix(packet.len());
				self.apply_reply_hook(packet, &expected);
				let rendered = self.render_reply(packet, &expected);
				self.formatter.start_line(self.id, Direction::ServerToClient)?;
				self.formatter.write_line(&format!(
					"{count}{sequence}: {} reply ({rendered})",
					expected.request.name
				))?;
			}
			MatchResult::MatchedContinuing(expected) => {
				let count = self.count_prefix(packet.len());
				self.apply_reply_hook(packet, &expected);
				let rendered = self.render_reply(packet, &expected);
				self.formatter.start_line(self.id, Direction::ServerToClient)?;
				self.formatter.write_line(&format!(
					"{count}{sequence}: {} reply ({rendered})",
					expected.request.name
				))?;
				if hooks::reply_list_fonts_with_info_is_terminal(packet) {
					self.matcher.finish_list_fonts_with_info(sequence);
				}
			}
			MatchResult::Unmatched { stranded } => {
				for s in stranded {
					self.formatter.start_line(self.id, Direction::ServerToClient)?;
					self.formatter
						.write_line(&format!("{}: stranded, no reply arrived", s.sequence))?;
				}
				self.formatter.start_line(self.id, Direction::ServerToClient)?;
				self.formatter
					.write_line(&format!("{sequence}: unexpected Reply"))?;
			}
		}
		Ok(())
	}

	/// Runs a matched reply's post-hook, if its request names one. Shared
	/// by both terminal and continuing matches: a `ListFontsWithInfo`
	/// reply needs no state update (its hook only gates when the matcher
	/// stops treating the sequence as outstanding), so it falls through
	/// the `_` arm like an ordinary reply would.
	fn apply_reply_hook(&mut self, packet: &mut [u8], expected: &ExpectedReply) {
		let Some(Body::Special(special)) = expected.request.response.clone() else {
			return;
		};
		match special {
			xtrace_proto::tables::SpecialHook::ReplyQueryExtension => {
				let _ = hooks::reply_query_extension(
					packet,
					self.bigendian,
					&expected.hook,
					&mut self.extensions,
					&self.protocol,
					self.deny_extensions,
				);
			}
			xtrace_proto::tables::SpecialHook::ReplyInternAtom => {
				let _ = hooks::reply_intern_atom(packet, self.bigendian, &expected.hook, &mut self.atoms);
			}
			_ => {}
		}
	}

	fn render_reply(&mut self, packet: &[u8], expected: &ExpectedReply) -> String {
		match &expected.request.response {
			Some(Body::Parameters(parameters)) => {
				let ctx = PrintContext {
					bigendian: self.bigendian,
					atoms: &self.atoms,
					max_shown_list_len: self.max_shown_list_len,
					print_offsets: self.print_offsets,
				};
				self.stack.clear();
				printer::print_parameters(packet, parameters, 0, &mut self.stack, &ctx).join(", ")
			}
			_ => String::new(),
		}
	}

	/// Renders a server-sent event: a core event, a learned extension's
	/// ordinary event (`code - first_event` indexes its event table), or —
	/// when `code` is the dynamically-resolved X Generic Event code — a
	/// learned extension's `LISTofVALUE`-free XGE sub-event, keyed by the
	/// `evtype` field at offset 8 rather than by `code` itself. Grounded on
	/// `find_event`/`print_event` in `parse.c`.
	fn handle_event(&mut self, packet: &[u8]) -> std::io::Result<()> {
		let code = packet[0] & 0x7f;
		let sequence = self.sequence.unwrap(u16_at(packet, 2, self.bigendian));

		let (name, body) = if code == self.generic_event_code() {
			let ext_opcode = packet.get(1).copied().unwrap_or(0);
			let evtype = u16_at(packet, 8, self.bigendian);
			match self
				.extensions
				.by_major_opcode(ext_opcode)
				.and_then(|ext| ext.xge_event_by_type(evtype))
			{
				Some(event) => (event.name.to_string(), Some(event.body.clone())),
				None => (format!("unknown generic event {evtype}"), None),
			}
		} else if let Some(event) = self.protocol.event_by_code(code) {
			(event.name.to_string(), Some(event.body.clone()))
		} else if let Some(known) = self.extensions.by_event_code(code) {
			match known.event_by_code(code) {
				Some(event) => (format!("{}.{}", known.name, event.name), Some(event.body.clone())),
				None => (format!("unknown code {code}"), None),
			}
		} else {
			(format!("unknown code {code}"), None)
		};

		let rendered = match &body {
			Some(Body::Parameters(parameters)) => {
				let ctx = PrintContext {
					bigendian: self.bigendian,
					atoms: &self.atoms,
					max_shown_list_len: self.max_shown_list_len,
					print_offsets: self.print_offsets,
				};
				self.stack.clear();
				printer::print_parameters(packet, parameters, 0, &mut self.stack, &ctx).join(", ")
			}
			_ => String::new(),
		};

		self.formatter.start_line(self.id, Direction::ServerToClient)?;
		self.formatter.write_line(&format!("{sequence}: {name}({rendered})"))?;
		Ok(())
	}
}

fn u16_at(buf: &[u8], offset: usize, bigendian: bool) -> u16 {
	if bigendian {
		BigEndian::read_u16(&buf[offset..offset + 2])
	} else {
		LittleEndian::read_u16(&buf[offset..offset + 2])
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::config::TimestampMode;
	use xtrace_proto::tables::{Event, Extension, FieldType, Offset, Parameter, Request, SpecialHook, TypeSpec};

	fn empty_body() -> Body {
		Body::Parameters(Arc::from(Vec::new()))
	}

	fn test_connection() -> Connection<Vec<u8>> {
		test_connection_with_deny(false)
	}

	fn test_connection_with_deny(deny_extensions: bool) -> Connection<Vec<u8>> {
		let protocol = test_protocol();
		let formatter = Formatter::new(Vec::new(), TimestampMode::None);
		Connection::new(0, "test".to_string(), protocol, formatter, usize::MAX, deny_extensions)
	}

	fn test_connection_with_counts() -> Connection<Vec<u8>> {
		let protocol = test_protocol();
		let formatter = Formatter::new(Vec::new(), TimestampMode::None);
		Connection::with_annotations(0, "test".to_string(), protocol, formatter, usize::MAX, false, true, false, false)
	}

	fn test_protocol() -> Arc<Protocol> {
		let query_extension = Request {
			name: Arc::from("QueryExtension"),
			opcode: 98,
			request: Body::Special(SpecialHook::RequestQueryExtension),
			response: Some(Body::Special(SpecialHook::ReplyQueryExtension)),
		};
		let get_window_attributes = Request {
			name: Arc::from("GetWindowAttributes"),
			opcode: 3,
			request: empty_body(),
			response: Some(empty_body()),
		};
		let intern_atom = Request {
			name: Arc::from("InternAtom"),
			opcode: 16,
			request: Body::Special(SpecialHook::RequestInternAtom),
			response: Some(Body::Special(SpecialHook::ReplyInternAtom)),
		};
		let get_property = Request {
			name: Arc::from("GetProperty"),
			opcode: 20,
			request: Body::Parameters(Arc::from(vec![Parameter {
				offset: Offset::Fixed(8),
				name: Some(Arc::from("property")),
				type_spec: TypeSpec::Elementary(FieldType::Atom),
			}])),
			response: None,
		};
		let big_req_test = Request {
			name: Arc::from("BigReqTest"),
			opcode: 50,
			request: Body::Parameters(Arc::from(vec![Parameter {
				offset: Offset::Fixed(4),
				name: Some(Arc::from("value")),
				type_spec: TypeSpec::Elementary(FieldType::Card8),
			}])),
			response: None,
		};

		let mut requests: Vec<Request> = (0..99)
			.map(|i| Request {
				name: Arc::from("Unused"),
				opcode: i,
				request: Body::Special(SpecialHook::RequestQueryExtension), // placeholder, never hit
				response: None,
			})
			.collect();
		requests[3] = get_window_attributes;
		requests[16] = intern_atom;
		requests[20] = get_property;
		requests[50] = big_req_test;
		requests[98] = query_extension;

		let shape = Extension {
			name: Arc::from("SHAPE"),
			requests: Arc::from(vec![Request {
				name: Arc::from("Rectangles"),
				opcode: 0,
				request: empty_body(),
				response: None,
			}]),
			events: Arc::from(vec![Event {
				name: Arc::from("NotifyEvent"),
				code: 0,
				is_generic: false,
				body: empty_body(),
			}]),
			errors: Arc::from(Vec::new()),
			xge_events: Arc::from(Vec::new()),
		};

		Arc::new(Protocol {
			requests: Arc::from(requests),
			events: Arc::from(Vec::new()),
			errors: Arc::from(vec![Arc::from("Unused") as Arc<str>; 18]),
			extensions: Arc::from(vec![shape]),
			setup: None,
			unexpected_reply: Arc::from(Vec::new()),
		})
	}

	fn output(conn: &mut Connection<Vec<u8>>) -> String {
		conn.formatter.flush().unwrap();
		String::from_utf8(conn.formatter.sink_ref().clone()).unwrap()
	}

	/// E3: a `QueryExtension` reply with `present=1` must bind the major
	/// opcode, and a subsequent client request using that opcode must be
	/// decoded through the extension's own sub-request table by minor
	/// opcode, matching the following event by its allocated event code.
	#[test]
	fn extension_opcode_and_event_are_learned_and_routed() {
		let mut conn = test_connection();

		// client handshake, no auth.
		let mut handshake = vec![0u8; 12];
		handshake[0] = 0x42; // 'B', big-endian
		BigEndian::write_u16(&mut handshake[2..4], 11);
		conn.feed_client(&handshake);
		conn.parse_client().unwrap();

		// client QueryExtension("SHAPE"), opcode 98.
		let mut query = vec![0u8; 16];
		query[0] = 98;
		BigEndian::write_u16(&mut query[2..4], 4); // length16 = 4 units = 16 bytes
		BigEndian::write_u16(&mut query[4..6], 5); // name length
		query[8..13].copy_from_slice(b"SHAPE");
		conn.feed_client(&query);
		conn.parse_client().unwrap();

		// server handshake success, no extra data.
		let mut server_hello = vec![0u8; 8];
		server_hello[0] = 1;
		BigEndian::write_u16(&mut server_hello[2..4], 11);
		conn.feed_server(&server_hello);
		conn.parse_server().unwrap();

		// server QueryExtension reply: present=1, major=128, first_event=64,
		// first_error=128.
		let mut reply = vec![0u8; 32];
		reply[0] = 1;
		BigEndian::write_u16(&mut reply[2..4], 1); // sequence
		reply[8] = 1;
		reply[9] = 128;
		reply[10] = 64;
		reply[11] = 128;
		conn.feed_server(&reply);
		conn.parse_server().unwrap();

		assert_eq!(conn.extensions.by_major_opcode(128).unwrap().name.as_ref(), "SHAPE");

		// client request using the learned major opcode, minor opcode 0.
		let request = vec![128u8, 0, 0, 1];
		conn.feed_client(&request);
		conn.parse_client().unwrap();

		// server event with the learned first_event code.
		let mut event = vec![0u8; 32];
		event[0] = 64;
		conn.feed_server(&event);
		conn.parse_server().unwrap();

		let text = output(&mut conn);
		assert!(text.contains("SHAPE.Rectangles"), "{text}");
		assert!(text.contains("SHAPE.NotifyEvent"), "{text}");
	}

	/// E6: an error carrying a request's sequence number must drop that
	/// request's expected-reply entry so no later reply is matched
	/// against it.
	#[test]
	fn error_drops_the_expected_reply() {
		let mut conn = test_connection();

		let mut handshake = vec![0u8; 12];
		handshake[0] = 0x42;
		BigEndian::write_u16(&mut handshake[2..4], 11);
		conn.feed_client(&handshake);
		conn.parse_client().unwrap();

		// GetWindowAttributes, opcode 3, length16 = 2 (8 bytes).
		let mut request = vec![0u8; 8];
		request[0] = 3;
		BigEndian::write_u16(&mut request[2..4], 2);
		conn.feed_client(&request);
		conn.parse_client().unwrap();

		let mut server_hello = vec![0u8; 8];
		server_hello[0] = 1;
		BigEndian::write_u16(&mut server_hello[2..4], 11);
		conn.feed_server(&server_hello);
		conn.parse_server().unwrap();

		// an error carrying sequence 1 arrives instead of a reply.
		let mut error = vec![0u8; 32];
		error[0] = 0;
		error[1] = 3; // arbitrary error code
		BigEndian::write_u16(&mut error[2..4], 1);
		conn.feed_server(&error);
		conn.parse_server().unwrap();

		// a later, unrelated reply with no matching expected-reply entry
		// must be logged as unmatched rather than attributed to the
		// request the error already consumed.
		let mut stray_reply = vec![0u8; 32];
		stray_reply[0] = 1;
		BigEndian::write_u16(&mut stray_reply[2..4], 1);
		conn.feed_server(&stray_reply);
		conn.parse_server().unwrap();

		let text = output(&mut conn);
		assert!(text.contains("GetWindowAttributes"));
		assert!(text.contains("unexpected Reply"));
	}

	/// E1: the client handshake and the server's successful setup reply
	/// must each produce one log line, with the reply naming the
	/// negotiated protocol version.
	#[test]
	fn handshake_and_setup_reply_are_each_logged() {
		let mut conn = test_connection();

		let mut handshake = vec![0u8; 12];
		handshake[0] = 0x42; // 'B', big-endian
		BigEndian::write_u16(&mut handshake[2..4], 11);
		conn.feed_client(&handshake);
		conn.parse_client().unwrap();

		let mut server_hello = vec![0u8; 8];
		server_hello[0] = 1;
		BigEndian::write_u16(&mut server_hello[2..4], 11);
		conn.feed_server(&server_hello);
		conn.parse_server().unwrap();

		let text = output(&mut conn);
		assert!(text.contains("client handshake"), "{text}");
		assert!(text.contains("Success, version is 11.0"), "{text}");
	}

	/// E2: an atom interned via `InternAtom`'s reply must be resolved by
	/// name the next time its ID appears in an unrelated request's `ATOM`
	/// field.
	#[test]
	fn interned_atom_is_resolved_by_name_in_a_later_request() {
		let mut conn = test_connection();

		let mut handshake = vec![0u8; 12];
		handshake[0] = 0x42;
		BigEndian::write_u16(&mut handshake[2..4], 11);
		conn.feed_client(&handshake);
		conn.parse_client().unwrap();

		// client InternAtom("WM_PROTOCOLS", only_if_exists=0), opcode 16.
		let mut intern = vec![0u8; 20];
		intern[0] = 16;
		BigEndian::write_u16(&mut intern[2..4], 5); // length16 = 5 units = 20 bytes
		BigEndian::write_u16(&mut intern[4..6], 12); // name length
		intern[8..20].copy_from_slice(b"WM_PROTOCOLS");
		conn.feed_client(&intern);
		conn.parse_client().unwrap();

		let mut server_hello = vec![0u8; 8];
		server_hello[0] = 1;
		BigEndian::write_u16(&mut server_hello[2..4], 11);
		conn.feed_server(&server_hello);
		conn.parse_server().unwrap();

		// server InternAtom reply: atom = 332 (0x14c).
		let mut reply = vec![0u8; 32];
		reply[0] = 1;
		BigEndian::write_u16(&mut reply[2..4], 1); // sequence
		BigEndian::write_u32(&mut reply[8..12], 332);
		conn.feed_server(&reply);
		conn.parse_server().unwrap();

		// client GetProperty carrying atom 332 at offset 8, opcode 20.
		let mut get_property = vec![0u8; 24];
		get_property[0] = 20;
		BigEndian::write_u16(&mut get_property[2..4], 6); // length16 = 6 units = 24 bytes
		BigEndian::write_u32(&mut get_property[8..12], 332);
		conn.feed_client(&get_property);
		conn.parse_client().unwrap();

		let text = output(&mut conn);
		assert!(text.contains(r#"0x14c("WM_PROTOCOLS")"#), "{text}");
	}

	/// E4: a big request (16-bit length field zero) must wait for the
	/// full 32-bit-declared length before decoding, and every parameter
	/// offset at or past the core header must shift by 4 to skip the
	/// injected extended-length field.
	#[test]
	fn big_request_waits_for_full_length_and_shifts_offsets() {
		let mut conn = test_connection();

		let mut handshake = vec![0u8; 12];
		handshake[0] = 0x42;
		BigEndian::write_u16(&mut handshake[2..4], 11);
		conn.feed_client(&handshake);
		conn.parse_client().unwrap();

		let total_len = 262_144usize; // 64 KiB of 4-byte units
		let mut request = vec![0u8; total_len];
		request[0] = 50; // BigReqTest
		BigEndian::write_u16(&mut request[2..4], 0); // length16 = 0: big request
		BigEndian::write_u32(&mut request[4..8], (total_len / 4) as u32);
		request[8] = 0x7f; // "value" parameter, declared at offset 4, actually at offset 8

		// feeding everything but the last byte must not produce a line yet.
		conn.feed_client(&request[..total_len - 1]);
		conn.parse_client().unwrap();
		assert!(!output(&mut conn).contains("BigReqTest"));

		conn.feed_client(&request[total_len - 1..]);
		conn.parse_client().unwrap();

		let text = output(&mut conn);
		assert!(text.contains("BigReqTest"), "{text}");
		assert!(text.contains("value=0x7f"), "{text}");
	}

	/// `--print-counts` prefixes a request line with the packet's total
	/// byte length.
	#[test]
	fn print_counts_prefixes_the_request_line_with_its_byte_length() {
		let mut conn = test_connection_with_counts();

		let mut handshake = vec![0u8; 12];
		handshake[0] = 0x42;
		BigEndian::write_u16(&mut handshake[2..4], 11);
		conn.feed_client(&handshake);
		conn.parse_client().unwrap();

		// GetWindowAttributes, opcode 3, length16 = 2 (8 bytes).
		let mut request = vec![0u8; 8];
		request[0] = 3;
		BigEndian::write_u16(&mut request[2..4], 2);
		conn.feed_client(&request);
		conn.parse_client().unwrap();

		let text = output(&mut conn);
		assert!(text.contains("8: 1: GetWindowAttributes"), "{text}");
	}

	/// `--denyallextensions` forces byte 8 (`present`) of every
	/// `QueryExtension` reply to 0 before it reaches the client. The edit
	/// has to land in the bytes the event loop actually forwards, not
	/// just in a throwaway copy used for logging.
	#[test]
	fn deny_extensions_rewrite_is_visible_in_forwarded_bytes() {
		let mut conn = test_connection_with_deny(true);

		let mut handshake = vec![0u8; 12];
		handshake[0] = 0x42;
		BigEndian::write_u16(&mut handshake[2..4], 11);
		conn.feed_client(&handshake);
		conn.parse_client().unwrap();

		let mut server_hello = vec![0u8; 8];
		server_hello[0] = 1;
		BigEndian::write_u16(&mut server_hello[2..4], 11);
		conn.feed_server(&server_hello);
		conn.parse_server().unwrap();

		let mut query = vec![0u8; 16];
		query[0] = 98;
		BigEndian::write_u16(&mut query[2..4], 4);
		BigEndian::write_u16(&mut query[4..6], 5);
		query[8..13].copy_from_slice(b"SHAPE");
		conn.feed_client(&query);
		conn.parse_client().unwrap();

		let mut reply = vec![0u8; 32];
		reply[0] = 1;
		BigEndian::write_u16(&mut reply[2..4], 1);
		reply[8] = 1; // present = true on the wire
		reply[9] = 128;
		reply[10] = 64;
		reply[11] = 128;
		conn.feed_server(&reply);
		conn.parse_server().unwrap();

		// the extension must not have been bound (present was forced to 0
		// before any downstream code could see it as present)...
		assert!(conn.extensions.by_major_opcode(128).is_none());

		// ...and the forwardable bytes queued for the client must carry
		// the rewritten `present=0`, not the original `present=1`.
		let forwarded = conn.server_forward_bytes();
		let setup_reply_len = 8;
		let query_extension_reply = &forwarded[setup_reply_len..setup_reply_len + 32];
		assert_eq!(query_extension_reply[8], 0);
	}
}

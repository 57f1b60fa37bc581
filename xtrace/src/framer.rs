// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Per-direction packet framing.
//!
//! Grounded on the `clientstate`/`serverstate` machines driven by
//! `parse_client`/`parse_server` in `parse.c`. Each direction of a
//! connection is framed independently: the client stream only ever
//! carries requests (plus the one-time handshake), the server stream
//! carries replies, events and errors interleaved, and either stream can
//! fall into "lost" framing (pure byte forwarding, no further
//! decoding) once its length accounting can no longer be trusted.

use byteorder::{BigEndian, ByteOrder, LittleEndian};

/// Result of asking a framer to find the next packet boundary in a
/// buffer.
#[derive(Debug, PartialEq, Eq)]
pub enum Framed {
	/// Not enough bytes buffered yet to know the packet length.
	NeedMoreData,
	/// A complete packet occupies `buffer[..length]`.
	Packet { length: usize },
	/// Framing could not be recovered; the caller should forward bytes
	/// verbatim without further attempts to decode.
	Lost,
}

fn u16_at(buf: &[u8], offset: usize, bigendian: bool) -> u16 {
	if bigendian {
		BigEndian::read_u16(&buf[offset..offset + 2])
	} else {
		LittleEndian::read_u16(&buf[offset..offset + 2])
	}
}

fn u32_at(buf: &[u8], offset: usize, bigendian: bool) -> u32 {
	if bigendian {
		BigEndian::read_u32(&buf[offset..offset + 4])
	} else {
		LittleEndian::read_u32(&buf[offset..offset + 4])
	}
}

/// Client→server direction: the handshake, then a stream of requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
	/// Reading the fixed 12-byte connection setup request. `stage`
	/// tracks how much of it has been consumed so far purely for
	/// diagnostics; the byte-order flag is read out of `buffer[0]` the
	/// moment one byte is available.
	Start { stage: u8 },
	Normal,
	Lost,
}

impl Default for ClientState {
	fn default() -> Self {
		ClientState::Start { stage: 0 }
	}
}

/// Determines the byte order a connection's setup request declares.
/// `'B'` (0x42) is big-endian, `'l'` (0x6c) is little-endian; anything
/// else means the client is not speaking X11 and framing is lost
/// immediately.
pub fn byte_order_from_setup_byte(byte: u8) -> Option<bool> {
	match byte {
		0x42 => Some(true),
		0x6c => Some(false),
		_ => None,
	}
}

/// Advances client-side framing by inspecting `buffer`, returning the
/// length of the next complete packet if one is available.
///
/// `state` is updated in place. `bigendian` must already reflect the
/// byte order learned from the first setup byte once `state` has left
/// [`ClientState::Start`].
pub fn frame_client(buffer: &[u8], state: &mut ClientState, bigendian: bool) -> Framed {
	match *state {
		ClientState::Lost => Framed::Lost,
		ClientState::Start { .. } => {
			if buffer.len() < 12 {
				return Framed::NeedMoreData;
			}
			// byte 0: order, byte 1: pad, bytes 2-3/4-5: protocol
			// major/minor version, bytes 6-7: authorization-name
			// length, bytes 8-9: authorization-data length, bytes
			// 10-11: pad.
			let name_len = u16_at(buffer, 6, bigendian) as usize;
			let data_len = u16_at(buffer, 8, bigendian) as usize;
			let total = 12 + pad4(name_len) + pad4(data_len);
			if buffer.len() < total {
				return Framed::NeedMoreData;
			}
			*state = ClientState::Normal;
			Framed::Packet { length: total }
		}
		ClientState::Normal => {
			if buffer.len() < 4 {
				return Framed::NeedMoreData;
			}
			let length16 = u16_at(buffer, 2, bigendian) as usize;
			if length16 != 0 {
				let total = length16 * 4;
				if buffer.len() < total {
					return Framed::NeedMoreData;
				}
				Framed::Packet { length: total }
			} else {
				// big-request: the real length is a 32-bit count of
				// 4-byte units at offset 4, and every parameter offset
				// from 4 onwards shifts by +4 to make room for it.
				if buffer.len() < 8 {
					return Framed::NeedMoreData;
				}
				let length32 = u32_at(buffer, 4, bigendian) as usize;
				if length32 < 2 {
					*state = ClientState::Lost;
					return Framed::Lost;
				}
				let total = length32 * 4;
				if buffer.len() < total {
					return Framed::NeedMoreData;
				}
				Framed::Packet { length: total }
			}
		}
	}
}

/// `true` if a just-framed client packet used the big-request form
/// (16-bit length field of zero), which callers need to know in order
/// to apply the printer's `+4` parameter-offset adjustment.
pub fn is_big_request(buffer: &[u8], bigendian: bool) -> bool {
	buffer.len() >= 4 && u16_at(buffer, 2, bigendian) == 0
}

fn pad4(n: usize) -> usize {
	(n + 3) & !3
}

/// Server→client direction: the handshake reply, then a stream of
/// replies, events and errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
	Start,
	Normal,
	Lost,
}

impl Default for ServerState {
	fn default() -> Self {
		ServerState::Start
	}
}

/// Advances server-side framing. `xge_event_code`, if set, is the event
/// code the server has been observed to allocate for X Generic Events
/// (always 35 in practice, but resolved dynamically from the core
/// `EVENTS` roster rather than hardcoded) — needed because a
/// `GenericEvent` carries its own 32-bit length field rather than the
/// fixed 32-byte size ordinary events use.
pub fn frame_server(
	buffer: &[u8],
	state: &mut ServerState,
	bigendian: bool,
	generic_event_code: u8,
) -> Framed {
	match *state {
		ServerState::Lost => Framed::Lost,
		ServerState::Start => {
			if buffer.len() < 8 {
				return Framed::NeedMoreData;
			}
			let extra = u16_at(buffer, 6, bigendian) as usize;
			let total = 8 + extra * 4;
			if buffer.len() < total {
				return Framed::NeedMoreData;
			}
			*state = ServerState::Normal;
			Framed::Packet { length: total }
		}
		ServerState::Normal => {
			if buffer.is_empty() {
				return Framed::NeedMoreData;
			}
			let first_byte = buffer[0];
			match first_byte {
				0 => {
					// error: always exactly 32 bytes.
					if buffer.len() < 32 {
						return Framed::NeedMoreData;
					}
					Framed::Packet { length: 32 }
				}
				1 => {
					// reply: 32 bytes plus 4 * the 32-bit length field.
					if buffer.len() < 8 {
						return Framed::NeedMoreData;
					}
					let extra = u32_at(buffer, 4, bigendian) as usize;
					let total = 32 + extra * 4;
					if buffer.len() < total {
						return Framed::NeedMoreData;
					}
					Framed::Packet { length: total }
				}
				code if code == generic_event_code => {
					if buffer.len() < 8 {
						return Framed::NeedMoreData;
					}
					let extra = u32_at(buffer, 4, bigendian) as usize;
					let total = 32 + extra * 4;
					if buffer.len() < total {
						return Framed::NeedMoreData;
					}
					Framed::Packet { length: total }
				}
				_ => {
					// ordinary event: always exactly 32 bytes.
					if buffer.len() < 32 {
						return Framed::NeedMoreData;
					}
					Framed::Packet { length: 32 }
				}
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn handshake_needs_twelve_bytes() {
		let mut state = ClientState::default();
		let buf = [0u8; 11];
		assert_eq!(frame_client(&buf, &mut state, true), Framed::NeedMoreData);
	}

	#[test]
	fn handshake_frames_with_no_auth() {
		let mut state = ClientState::default();
		let mut buf = [0u8; 12];
		buf[0] = 0x42; // 'B'
		assert_eq!(
			frame_client(&buf, &mut state, true),
			Framed::Packet { length: 12 }
		);
		assert_eq!(state, ClientState::Normal);
	}

	#[test]
	fn ordinary_request_frames_by_length16() {
		let mut state = ClientState::Normal;
		let mut buf = [0u8; 8];
		BigEndian::write_u16(&mut buf[2..4], 2); // 2 * 4 = 8 bytes
		assert_eq!(
			frame_client(&buf, &mut state, true),
			Framed::Packet { length: 8 }
		);
	}

	#[test]
	fn big_request_with_length32_below_2_is_lost() {
		let mut state = ClientState::Normal;
		let mut buf = [0u8; 8];
		BigEndian::write_u16(&mut buf[2..4], 0);
		BigEndian::write_u32(&mut buf[4..8], 1);
		assert_eq!(frame_client(&buf, &mut state, true), Framed::Lost);
		assert_eq!(state, ClientState::Lost);
	}

	#[test]
	fn big_request_frames_by_length32() {
		let mut state = ClientState::Normal;
		let mut buf = vec![0u8; 16384];
		BigEndian::write_u16(&mut buf[2..4], 0);
		BigEndian::write_u32(&mut buf[4..8], 16384 / 4);
		assert_eq!(
			frame_client(&buf, &mut state, true),
			Framed::Packet { length: 16384 }
		);
	}

	#[test]
	fn server_error_is_always_32_bytes() {
		let mut state = ServerState::Normal;
		let buf = [0u8; 32];
		assert_eq!(
			frame_server(&buf, &mut state, true, 35),
			Framed::Packet { length: 32 }
		);
	}

	#[test]
	fn server_reply_frames_by_length32() {
		let mut state = ServerState::Normal;
		let mut buf = [0u8; 40];
		buf[0] = 1;
		BigEndian::write_u32(&mut buf[4..8], 2);
		assert_eq!(
			frame_server(&buf, &mut state, true, 35),
			Framed::Packet { length: 40 }
		);
	}
}

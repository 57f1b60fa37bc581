// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The three special-cased requests/replies whose meaning to the tracer
//! goes beyond "print these fields": they update connection-wide state.
//!
//! Grounded on `requestQueryExtension`/`replyQueryExtension`,
//! `requestInternAtom`/`replyInternAtom` and `replyListFontsWithInfo` in
//! `parse.c`.

use std::sync::Arc;

use byteorder::{BigEndian, ByteOrder, LittleEndian};

use crate::atom::AtomTable;
use crate::extension::{KnownExtension, Registry, UnknownExtension};
use crate::matcher::Hook;

fn read_u16(buf: &[u8], offset: usize, be: bool) -> Option<u16> {
	let bytes = buf.get(offset..offset + 2)?;
	Some(if be {
		BigEndian::read_u16(bytes)
	} else {
		LittleEndian::read_u16(bytes)
	})
}

fn read_u32(buf: &[u8], offset: usize, be: bool) -> Option<u32> {
	let bytes = buf.get(offset..offset + 4)?;
	Some(if be {
		BigEndian::read_u32(bytes)
	} else {
		LittleEndian::read_u32(bytes)
	})
}

/// `QueryExtension` request pre-hook: captures the queried name so the
/// matching reply can bind it.
///
/// The request layout is `CARD16 name-length` at offset 4, followed by
/// the name bytes at offset 8 (core protocol `QueryExtension` shape).
pub fn request_query_extension(buffer: &[u8], bigendian: bool) -> Option<Hook> {
	let len = read_u16(buffer, 4, bigendian)? as usize;
	let name = buffer.get(8..8 + len)?;
	let name = String::from_utf8_lossy(name).into_owned();
	Some(Hook::QueryExtension { name: Arc::from(name.as_str()) })
}

/// `QueryExtension` reply post-hook: on `present=1`, binds the queried
/// name's major opcode / first event / first error, promoting a pending
/// [`UnknownExtension`] into a [`KnownExtension`]. If `deny_extensions`
/// is set, the byte at offset 8 (`present`) is forced to 0 in the
/// server-to-client buffer before the caller forwards it — the one
/// stream mutation this crate performs.
pub fn reply_query_extension(
	buffer: &mut [u8],
	bigendian: bool,
	hook: &Hook,
	registry: &mut Registry,
	protocol: &xtrace_proto::Protocol,
	deny_extensions: bool,
) -> Option<()> {
	let Hook::QueryExtension { name } = hook else {
		return None;
	};
	let present = *buffer.get(8)?;

	if deny_extensions {
		buffer[8] = 0;
		return Some(());
	}
	if present == 0 {
		return Some(());
	}

	let major_opcode = *buffer.get(9)?;
	let first_event = *buffer.get(10)?;
	let first_error = *buffer.get(11)?;
	let descriptor = registry.resolve_name(protocol, name).cloned();

	if let Err(conflict) = registry.bind(KnownExtension {
		name: name.clone(),
		major_opcode,
		first_event,
		first_error,
		descriptor: descriptor.map(Arc::new),
	}) {
		log::warn!("{conflict}");
	}
	let _ = bigendian;
	Some(())
}

/// `InternAtom` request pre-hook: captures the requested name.
///
/// Layout: `CARD16 name-length` at offset 4, name bytes at offset 8.
pub fn request_intern_atom(buffer: &[u8], bigendian: bool) -> Option<Hook> {
	let len = read_u16(buffer, 4, bigendian)? as usize;
	let name = buffer.get(8..8 + len)?;
	let name = String::from_utf8_lossy(name).into_owned();
	Some(Hook::InternAtom { name: Arc::from(name.as_str()) })
}

/// `InternAtom` reply post-hook: interns the returned atom ID under the
/// name captured at request time. Reply layout: the atom ID is a
/// `CARD32` at offset 8.
pub fn reply_intern_atom(buffer: &[u8], bigendian: bool, hook: &Hook, atoms: &mut AtomTable) -> Option<()> {
	let Hook::InternAtom { name } = hook else {
		return None;
	};
	let atom = read_u32(buffer, 8, bigendian)?;
	if atom != 0 {
		if let Err(mismatch) = atoms.intern(atom, name.clone()) {
			log::warn!("{mismatch}");
		}
	}
	Some(())
}

/// Returns the [`UnknownExtension`] a `QueryExtension` name should be
/// tracked as pending under, if the shipped protocol tables do not
/// already describe it.
pub fn pending_extension(name: &str) -> UnknownExtension {
	UnknownExtension { name: Arc::from(name) }
}

/// `ListFontsWithInfo` request pre-hook: every matching reply needs the
/// same continuing-match treatment, so there is nothing to capture —
/// just mark the slot.
pub fn request_list_fonts_with_info(_buffer: &[u8], _bigendian: bool) -> Option<Hook> {
	Some(Hook::ListFontsWithInfo)
}

/// `ListFontsWithInfo` reply post-hook: the name-length byte at offset 1
/// is `0` on the terminal reply in the sequence, matching the real
/// protocol's `replyListFontsWithInfo` layout (`CARD8 name-length`
/// immediately after the one-byte reply type).
pub fn reply_list_fonts_with_info_is_terminal(buffer: &[u8]) -> bool {
	buffer.get(1).copied().unwrap_or(0) == 0
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn captures_query_extension_name() {
		let mut buffer = vec![0u8; 12];
		BigEndian::write_u16(&mut buffer[4..6], 5);
		buffer.extend_from_slice(b"SHAPE");
		let hook = request_query_extension(&buffer, true).unwrap();
		match hook {
			Hook::QueryExtension { name } => assert_eq!(name.as_ref(), "SHAPE"),
			_ => panic!("wrong hook"),
		}
	}

	#[test]
	fn deny_extensions_flips_present_byte() {
		let mut buffer = vec![0u8; 32];
		buffer[1] = 1; // present = true
		let protocol = xtrace_proto::Protocol::default();
		let mut registry = Registry::new();
		let hook = Hook::QueryExtension { name: Arc::from("SHAPE") };
		// reply layout uses offset 8 for `present`, matching the request
		// hook's convention above.
		buffer[8] = 1;
		reply_query_extension(&mut buffer, true, &hook, &mut registry, &protocol, true).unwrap();
		assert_eq!(buffer[8], 0);
	}
}

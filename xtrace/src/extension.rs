// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Per-connection extension registry: binds the opcode/event-code/
//! error-code ranges a server allocates for an extension at
//! `QueryExtension` time to that extension's descriptor, and routes
//! later opcodes/codes through the binding.
//!
//! Grounded on `find_extension`/`find_event` in `parse.c` and on the
//! `usedextension`/`unknownextension` linked lists hung off
//! `struct connection` in `xtrace.h`.

use std::sync::Arc;

use derive_more::Display;
use xtrace_proto::tables::{Event, Extension, Request};

/// An extension this connection has seen bound to a major opcode, along
/// with the descriptor table it was matched against (if this crate's
/// `.proto` files describe it) or `None` if it is a real extension the
/// shipped descriptors simply don't cover.
#[derive(Clone, Debug)]
pub struct KnownExtension {
	pub name: Arc<str>,
	pub major_opcode: u8,
	pub first_event: u8,
	pub first_error: u8,
	pub descriptor: Option<Arc<Extension>>,
}

impl KnownExtension {
	pub fn request_by_minor_opcode(&self, minor_opcode: u8) -> Option<&Request> {
		self.descriptor
			.as_ref()
			.and_then(|ext| ext.requests.get(minor_opcode as usize))
	}

	pub fn event_by_code(&self, code: u8) -> Option<&Event> {
		let offset = code.checked_sub(self.first_event)?;
		self.descriptor
			.as_ref()
			.and_then(|ext| ext.events.get(offset as usize))
	}

	pub fn error_by_code(&self, code: u8) -> Option<&str> {
		let offset = code.checked_sub(self.first_error)?;
		self.descriptor
			.as_ref()
			.and_then(|ext| ext.errors.get(offset as usize))
			.map(|s| s.as_ref())
	}

	pub fn xge_event_by_type(&self, evtype: u16) -> Option<&Event> {
		self.descriptor
			.as_ref()
			.and_then(|ext| ext.xge_events.get(evtype as usize))
	}
}

/// An extension a client queried for that the server has not yet
/// answered (or that came back absent), kept so a late-arriving
/// `QueryExtension` reply can be matched to the name that was asked for.
#[derive(Clone, Debug)]
pub struct UnknownExtension {
	pub name: Arc<str>,
}

/// Per-connection extension state: everything learned so far about
/// which opcode/event/error ranges belong to which extension.
#[derive(Debug, Default)]
pub struct Registry {
	known: Vec<KnownExtension>,
}

impl Registry {
	pub fn new() -> Self {
		Self::default()
	}

	/// Resolves a queried extension name against the shipped protocol
	/// tables, preserving the original's `strncmp`-up-to-the-queried-length
	/// matching quirk rather than tightening it to exact equality — see
	/// [`xtrace_proto::tables::Protocol::extension_by_name`].
	pub fn resolve_name<'a>(&self, protocol: &'a xtrace_proto::Protocol, name: &str) -> Option<&'a Extension> {
		protocol.extension_by_name(name)
	}

	/// Binds a newly learned extension. Returns `Err` if `major_opcode`
	/// is already bound on this connection, which would indicate a
	/// server-side protocol violation (the invariant this crate commits
	/// to in its testable properties).
	pub fn bind(&mut self, extension: KnownExtension) -> Result<(), BindConflict> {
		if let Some(existing) = self
			.known
			.iter()
			.find(|e| e.major_opcode == extension.major_opcode)
		{
			return Err(BindConflict {
				major_opcode: extension.major_opcode,
				existing_name: existing.name.clone(),
				new_name: extension.name,
			});
		}
		self.known.push(extension);
		Ok(())
	}

	pub fn by_major_opcode(&self, opcode: u8) -> Option<&KnownExtension> {
		self.known.iter().find(|e| e.major_opcode == opcode)
	}

	pub fn by_event_code(&self, code: u8) -> Option<&KnownExtension> {
		self.known
			.iter()
			.filter(|e| code >= e.first_event)
			.find(|e| e.event_by_code(code).is_some())
	}

	pub fn by_error_code(&self, code: u8) -> Option<&KnownExtension> {
		self.known
			.iter()
			.filter(|e| code >= e.first_error)
			.find(|e| e.error_by_code(code).is_some())
	}

	pub fn known(&self) -> &[KnownExtension] {
		&self.known
	}
}

#[derive(Debug, Display)]
#[display(fmt = "major opcode {major_opcode} already bound to {existing_name:?}, server now offers {new_name:?} for it")]
pub struct BindConflict {
	pub major_opcode: u8,
	pub existing_name: Arc<str>,
	pub new_name: Arc<str>,
}

#[cfg(test)]
mod tests {
	use super::*;

	fn extension(name: &str, major_opcode: u8) -> KnownExtension {
		KnownExtension {
			name: Arc::from(name),
			major_opcode,
			first_event: 64,
			first_error: 128,
			descriptor: None,
		}
	}

	#[test]
	fn rejects_rebinding_the_same_opcode() {
		let mut registry = Registry::new();
		registry.bind(extension("SHAPE", 128)).unwrap();
		let err = registry.bind(extension("RANDR", 128)).unwrap_err();
		assert_eq!(err.major_opcode, 128);
	}

	#[test]
	fn looks_up_by_opcode() {
		let mut registry = Registry::new();
		registry.bind(extension("SHAPE", 128)).unwrap();
		assert_eq!(registry.by_major_opcode(128).unwrap().name.as_ref(), "SHAPE");
		assert!(registry.by_major_opcode(129).is_none());
	}
}

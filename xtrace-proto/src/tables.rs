// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The immutable, finalized protocol description a connection is driven
//! by at runtime.
//!
//! Everything here is produced once, by [`crate::finalize::finalize`],
//! and then shared read-only (behind an `Arc`) by every connection the
//! tracer handles. This mirrors `translate.c`'s `finalize_data` step,
//! which flattens the parser's mutable graph into flat arrays addressed
//! by plain offsets; the Rust equivalent keeps the graph shape (so
//! `Struct`/`IF*` nesting doesn't need re-flattening tricks) but makes
//! every node immutable and reachable only through `Arc`, which is both
//! simpler and safer than the original's raw-pointer arena.

use std::sync::Arc;

pub use crate::model::{FieldType, Offset};

/// A resolved special-case hook, in place of an ordinary parameter list.
///
/// These correspond to the `SPECIAL` requests/replies in the original
/// (`requestQueryExtension`, `requestInternAtom`, `replyListFontsWithInfo`,
/// `replyQueryExtension`, `replyInternAtom`): protocol messages whose
/// meaning for the tracer goes beyond "print these fields" and instead
/// updates connection-wide state (the atom table, the extension
/// registry, the multi-reply continuation queue).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SpecialHook {
	RequestQueryExtension,
	ReplyQueryExtension,
	RequestInternAtom,
	ReplyInternAtom,
	ReplyListFontsWithInfo,
}

impl SpecialHook {
	pub fn by_name(name: &str) -> Option<Self> {
		Some(match name {
			"QueryExtension.request" => Self::RequestQueryExtension,
			"QueryExtension.reply" => Self::ReplyQueryExtension,
			"InternAtom.request" => Self::RequestInternAtom,
			"InternAtom.reply" => Self::ReplyInternAtom,
			"ListFontsWithInfo.reply" => Self::ReplyListFontsWithInfo,
			_ => return None,
		})
	}
}

#[derive(Clone, Debug)]
pub struct Constant {
	pub value: u64,
	pub name: Arc<str>,
}

#[derive(Clone, Debug)]
pub struct ConstantSet {
	pub name: Arc<str>,
	pub constants: Arc<[Constant]>,
	pub bitmask: bool,
}

impl ConstantSet {
	/// Looks up the name for an exact value (enums) — `findConstant` in
	/// `parse.c`.
	pub fn name_for(&self, value: u64) -> Option<&str> {
		self.constants
			.iter()
			.find(|c| c.value == value)
			.map(|c| c.name.as_ref())
	}

	/// Iterates the flag bits set in `mask` that this bitmask set names,
	/// for `print_bitfield`-style rendering.
	pub fn flags_in(&self, mask: u64) -> impl Iterator<Item = &Constant> {
		self.constants
			.iter()
			.filter(move |c| c.value != 0 && mask & c.value == c.value)
	}
}

#[derive(Clone, Debug)]
pub struct ValueField {
	pub flag: u64,
	pub name: Arc<str>,
	pub field_type: FieldType,
	pub constants: Option<Arc<ConstantSet>>,
}

/// The literal an `IF`/`ELSEIF` clause tests its field against — see
/// [`crate::model::IfValue`].
#[derive(Clone, Debug)]
pub enum IfValue {
	Number(u64),
	AtomName(Arc<str>),
}

/// One finalized `IF`/`ELSEIF` clause — see [`crate::model::IfClause`].
#[derive(Clone, Debug)]
pub struct IfClause {
	pub offset: Offset,
	pub field_type: FieldType,
	pub value: IfValue,
	pub body: Arc<[Parameter]>,
}

#[derive(Clone, Debug)]
pub enum TypeSpec {
	Elementary(FieldType),
	WithConstants(FieldType, Arc<ConstantSet>),
	WithValues(FieldType, Arc<[ValueField]>),
	WithParameters(FieldType, Arc<[Parameter]>),
	Conditional {
		clauses: Arc<[IfClause]>,
		otherwise: Option<Arc<[Parameter]>>,
	},
}

impl TypeSpec {
	pub fn field_type(&self) -> FieldType {
		match self {
			TypeSpec::Elementary(t)
			| TypeSpec::WithConstants(t, _)
			| TypeSpec::WithValues(t, _)
			| TypeSpec::WithParameters(t, _) => *t,
			TypeSpec::Conditional { clauses, .. } => {
				clauses.first().map(|c| c.field_type).unwrap_or(FieldType::If8)
			}
		}
	}
}

#[derive(Clone, Debug)]
pub struct Parameter {
	pub offset: Offset,
	pub name: Option<Arc<str>>,
	pub type_spec: TypeSpec,
}

#[derive(Clone, Debug)]
pub enum Body {
	Parameters(Arc<[Parameter]>),
	Special(SpecialHook),
}

#[derive(Clone, Debug)]
pub struct Request {
	pub name: Arc<str>,
	pub opcode: u16,
	pub request: Body,
	pub response: Option<Body>,
}

#[derive(Clone, Debug)]
pub struct Event {
	pub name: Arc<str>,
	pub code: u16,
	pub is_generic: bool,
	pub body: Body,
}

/// An extension's finalized, self-contained slice of the protocol: its
/// sub-requests (keyed by minor opcode), its events and errors (keyed by
/// an offset from the first code the server binds them to at runtime),
/// and, for extensions using X Generic Events, its XGE sub-events keyed
/// by `evtype`.
#[derive(Clone, Debug)]
pub struct Extension {
	pub name: Arc<str>,
	pub requests: Arc<[Request]>,
	pub events: Arc<[Event]>,
	pub errors: Arc<[Arc<str>]>,
	pub xge_events: Arc<[Event]>,
}

/// The complete finalized protocol description, shared read-only by
/// every connection.
#[derive(Clone, Debug, Default)]
pub struct Protocol {
	pub requests: Arc<[Request]>,
	pub events: Arc<[Event]>,
	pub errors: Arc<[Arc<str>]>,
	pub extensions: Arc<[Extension]>,
	pub setup: Option<Arc<[Parameter]>>,
	/// The parameter list used to print a reply nobody expected —
	/// `unexpected_reply` in `parse.h`.
	pub unexpected_reply: Arc<[Parameter]>,
}

impl Protocol {
	pub fn request_by_opcode(&self, opcode: u8) -> Option<&Request> {
		self.requests.get(opcode as usize)
	}

	pub fn event_by_code(&self, code: u8) -> Option<&Event> {
		self.events.get(code as usize)
	}

	pub fn error_by_code(&self, code: u8) -> Option<&str> {
		self.errors.get(code as usize).map(|s| s.as_ref())
	}

	/// Resolves a client-supplied extension name the way `find_extension`
	/// in `parse.c` does: `strncmp(candidate, name, name.len())` rather
	/// than a true equality test. A name at least as long as the
	/// candidate's matches if their bytes agree up to the candidate's
	/// length, *and*, when the client name is longer, the very next byte
	/// of the client name is `0` — `strncmp` stops comparing as soon as
	/// it finds a `0` byte in both operands at the same position, so a
	/// name like `"SHAPE\0EXTRA"` (a legal X11 STRING8, which is a raw
	/// byte run rather than a NUL-terminated C string) matches the
	/// built-in `"SHAPE"` candidate. This quirk is preserved deliberately
	/// rather than tightened into exact equality.
	pub fn extension_by_name(&self, name: &str) -> Option<&Extension> {
		let client = name.as_bytes();
		self.extensions.iter().find(|e| {
			let candidate = e.name.as_bytes();
			if client.len() < candidate.len() {
				return false;
			}
			if client[..candidate.len()] != candidate[..] {
				return false;
			}
			client.len() == candidate.len() || client[candidate.len()] == 0
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn protocol_with_shape() -> Protocol {
		let shape = Extension {
			name: Arc::from("SHAPE"),
			requests: Arc::from(Vec::new()),
			events: Arc::from(Vec::new()),
			errors: Arc::from(Vec::new()),
			xge_events: Arc::from(Vec::new()),
		};
		Protocol {
			extensions: Arc::from(vec![shape]),
			..Protocol::default()
		}
	}

	#[test]
	fn exact_name_matches() {
		let protocol = protocol_with_shape();
		assert!(protocol.extension_by_name("SHAPE").is_some());
	}

	#[test]
	fn shorter_name_does_not_match() {
		let protocol = protocol_with_shape();
		assert!(protocol.extension_by_name("SHAP").is_none());
	}

	#[test]
	fn embedded_nul_after_the_candidate_name_still_matches() {
		let protocol = protocol_with_shape();
		assert!(protocol.extension_by_name("SHAPE\0EXTRA").is_some());
	}

	#[test]
	fn longer_name_without_an_embedded_nul_does_not_match() {
		let protocol = protocol_with_shape();
		assert!(protocol.extension_by_name("SHAPEFOO").is_none());
	}
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The mutable descriptor graph built while parsing `.proto` files.
//!
//! This mirrors `struct variable`/`struct typespec`/`struct namespace` in
//! `translate.c`, but trades the original's hand-rolled refcounted
//! pointers for [`crate::arena::Id`] handles into per-set [`Arena`]s. The
//! graph is append-only during parsing and is never mutated again once
//! [`crate::finalize::finalize`] walks it into the immutable tables in
//! [`crate::tables`].

use crate::arena::{Arena, Id};

/// The field-type tag every parameter, value and list element carries.
///
/// A direct port of `enum fieldtype` in `parse.h`; renamed to Rust's
/// `CamelCase` convention, kept in the same grouping and order so the
/// two are easy to cross-reference.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldType {
	Int8,
	Int16,
	Int32,
	Uint8,
	Uint16,
	Uint32,
	Card8,
	Card16,
	Card32,
	Card64,
	Enum8,
	Enum16,
	Enum32,
	Store8,
	Store16,
	Store32,
	Push8,
	Push16,
	Push32,
	Bitmask8,
	Bitmask16,
	Bitmask32,
	String8,
	ListOfCard8,
	ListOfCard16,
	ListOfCard32,
	ListOfCard64,
	ListOfAtom,
	ListOfUint8,
	ListOfUint16,
	ListOfUint32,
	ListOfInt8,
	ListOfInt16,
	ListOfInt32,
	ListOfFormat,
	ListOfStruct,
	ListOfVarStruct,
	ListOfValue,
	Struct,
	Format8,
	Event,
	If8,
	If16,
	If32,
	IfAtom,
	LastMarker,
	SetSize,
	Atom,
	Be32,
	Get,
	Fixed,
	ListOfFixed,
	Fixed3232,
	ListOfFixed3232,
	Float32,
	ListOfFloat32,
	Fraction16_16,
	Fraction32_32,
	Ufraction32_32,
	Int32_32,
	DecrementStored,
	DivideStored,
	Set,
}

/// One named value in a `CONSTANTS`/`BITMASK` set, or a `VALUES` entry.
#[derive(Clone, Debug)]
pub struct Constant {
	pub value: u64,
	pub name: String,
}

/// A `CONSTANTS` or `BITMASK` definition: a closed or open set of
/// [`Constant`]s, plus whether it is a bitmask (multiple flags may be set
/// simultaneously) or an enumeration (exactly one value at a time).
#[derive(Clone, Debug)]
pub struct ConstantSet {
	pub name: String,
	pub constants: Vec<Constant>,
	pub bitmask: bool,
}

/// One entry of a `VALUES` block feeding a `LISTofVALUE` field: the mask
/// bit that selects it, its name, its elementary type, and an optional
/// attached constant set.
#[derive(Clone, Debug)]
pub struct ValueField {
	pub flag: u64,
	pub name: String,
	pub field_type: FieldType,
	pub constants: Option<Id<ConstantSet>>,
}

/// The literal an `IF`/`ELSEIF` clause tests its field against: a plain
/// integer for `CARD8`/`CARD16`/`CARD32` clauses, or an atom's textual
/// name for an `ATOM` clause (compared against whatever name the atom
/// table has interned for the value actually on the wire).
#[derive(Clone, Debug)]
pub enum IfValue {
	Number(u64),
	AtomName(String),
}

/// One `IF`/`ELSEIF` clause: where to read the test field, how wide it
/// is, and the literal it must equal for this clause's `body` to be the
/// one that renders.
#[derive(Clone, Debug)]
pub struct IfClause {
	pub offset: Offset,
	pub field_type: FieldType,
	pub value: IfValue,
	pub body: Id<ParameterList>,
}

/// The type carried by a [`Parameter`]: a base type plus whatever extra
/// descriptor it needs (a constant set, a `VALUES` list, a nested
/// parameter list for `Struct`/`LISTofStruct`/`LISTofVarStruct`, or the
/// clause chain of an `IF`/`ELSEIF`/`ELSE` construct).
#[derive(Clone, Debug)]
pub enum TypeSpec {
	Elementary(FieldType),
	WithConstants(FieldType, Id<ConstantSet>),
	WithValues(FieldType, Vec<ValueField>),
	WithParameters(FieldType, Id<ParameterList>),
	/// `clauses` are tried in declaration order; `otherwise` is the
	/// `ELSE` branch, if any.
	Conditional {
		clauses: Vec<IfClause>,
		otherwise: Option<Id<ParameterList>>,
	},
}

impl TypeSpec {
	pub fn field_type(&self) -> FieldType {
		match self {
			TypeSpec::Elementary(t)
			| TypeSpec::WithConstants(t, _)
			| TypeSpec::WithValues(t, _)
			| TypeSpec::WithParameters(t, _) => *t,
			// Only consulted by the early control-type dispatch in
			// `print_parameters_into`, which has its own dedicated arm
			// for `Conditional` before this is ever read.
			TypeSpec::Conditional { clauses, .. } => {
				clauses.first().map(|c| c.field_type).unwrap_or(FieldType::If8)
			}
		}
	}
}

/// The offset of a [`Parameter`] within the structure it belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Offset {
	/// A fixed byte offset from the start of the enclosing structure.
	Fixed(usize),
	/// `LATER`: right after the last list item above this parameter.
	AfterLastList,
}

/// One field of a request, reply, event or nested `Struct`.
///
/// Mirrors `struct parameter` in `parse.h`. Control-flow parameters
/// (`LASTMARKER`, `SET_SIZE`, `GET`, `SET`, `DECREMENT_STORED`,
/// `DIVIDE_STORED`) are represented as an ordinary [`Parameter`] whose
/// [`TypeSpec`] names the matching [`FieldType`]; an `IF`/`ELSEIF`/`ELSE`
/// chain is a [`TypeSpec::Conditional`] instead, since it needs more than
/// one nested list and a value to test each against.
#[derive(Clone, Debug)]
pub struct Parameter {
	pub offset: Offset,
	/// `None` for a parameter with no name (a bare control-flow step).
	pub name: Option<String>,
	pub type_spec: TypeSpec,
}

/// An ordered list of [`Parameter`]s: the body of a request, reply,
/// event, `Struct`, or `IF*` branch.
#[derive(Clone, Debug, Default)]
pub struct ParameterList {
	pub parameters: Vec<Parameter>,
}

/// A special per-request/per-reply hook name, set by a `SPECIAL` command
/// in place of a plain parameter list. Resolved against
/// [`crate::tables::SpecialHook`] during finalization.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SpecialHook(pub String);

/// Either an ordinary parameter list or a named special hook.
#[derive(Clone, Debug)]
pub enum Body {
	Parameters(Id<ParameterList>),
	Special(SpecialHook),
}

/// One `REQUEST`/`RESPONSE` pair, keyed by its protocol opcode.
#[derive(Clone, Debug)]
pub struct RequestDef {
	pub name: String,
	pub opcode: u16,
	pub request: Body,
	pub response: Option<Body>,
}

/// One `EVENT` definition, keyed by its protocol event code.
#[derive(Clone, Debug)]
pub struct EventDef {
	pub name: String,
	pub code: u16,
	pub is_generic: bool,
	pub body: Body,
}

/// One namespace: either the core protocol or an `EXTENSION`.
///
/// Mirrors `struct namespace` in `translate.c`. `extension_name` is
/// `Some` only for namespaces declared with `EXTENSION` rather than
/// `NAMESPACE`; it is the string a client asks for in `QueryExtension`.
#[derive(Clone, Debug, Default)]
pub struct Namespace {
	pub name: String,
	pub extension_name: Option<String>,
	pub requests: Vec<RequestDef>,
	pub events: Vec<EventDef>,
	pub errors: Vec<String>,
	/// `SETUP`'s parameter list, present only on the core namespace.
	pub setup: Option<Id<ParameterList>>,
	pub constant_sets: Vec<Id<ConstantSet>>,
	/// Other namespaces reachable without a `NAME.` prefix, from `USE`.
	pub used: Vec<String>,
}

/// The full mutable descriptor graph accumulated while parsing one or
/// more `.proto` files reached from a single entry point.
#[derive(Default)]
pub struct DescriptorSet {
	pub namespaces: Vec<Namespace>,
	pub parameter_lists: Arena<ParameterList>,
	pub constant_sets: Arena<ConstantSet>,
}

impl DescriptorSet {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn namespace(&self, name: &str) -> Option<&Namespace> {
		self.namespaces.iter().find(|n| n.name == name)
	}

	pub fn namespace_mut(&mut self, name: &str) -> Option<&mut Namespace> {
		self.namespaces.iter_mut().find(|n| n.name == name)
	}

	pub fn constant_set(&self, name: &str) -> Option<Id<ConstantSet>> {
		self.constant_sets
			.iter()
			.find(|(_, c)| c.name == name)
			.map(|(id, _)| id)
	}
}

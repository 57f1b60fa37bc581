// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The catalogue of base types a `TYPE`/`STRUCT`/parameter line may name.
//!
//! This is a line-for-line port of `base_types[]` in `translate.c`: each
//! entry binds the DSL spelling of a type to a [`FieldType`] tag, a set of
//! [`TypeFlags`] describing what the type needs and produces, and its
//! fixed encoded size (`0` for variable-length types).

use bitflags::bitflags;

use crate::model::FieldType;

bitflags! {
	/// Per-type behavioural flags, taken from the `base_types[]` bitfield
	/// in `translate.c` (`NEEDS_CONSTANTS` through `NEEDS_STORE`).
	#[derive(Default)]
	pub struct TypeFlags: u32 {
		/// A `CONSTANTS` set naming every valid value is mandatory.
		const NEEDS_CONSTANTS = 0x001;
		/// A `BITMASK` set is mandatory (implies [`Self::NEEDS_CONSTANTS`]).
		const NEEDS_BITMASK = 0x003;
		/// A `CONSTANTS`/`BITMASK` set may optionally be attached.
		const ALLOWS_CONSTANTS = 0x004;
		/// Reads the most recently stored count/mask register.
		const USES_STORE = 0x008;
		/// Writes the store register.
		const SETS_STORE = 0x010;
		/// Reads the most recently set pixel format register.
		const USES_FORMAT = 0x020;
		/// Writes the pixel format register.
		const SETS_FORMAT = 0x040;
		/// Has a fixed, self-contained encoded size (no nested fields).
		const ELEMENTARY = 0x080;
		/// Pushes a value onto the per-packet stack.
		const PUSHES = 0x100;
		/// Advances the "next field" cursor itself (variable-length types).
		const SETS_NEXT = 0x200;
		/// Reads a `struct`/`values` descriptor stored at parse time.
		const NEEDS_STORE = 0x400;
	}
}

/// One entry of the base-type catalogue.
pub struct BaseType {
	pub name: &'static str,
	pub field_type: FieldType,
	pub flags: TypeFlags,
	/// Fixed encoded size in bytes, or `0` for variable-length types, or
	/// `-1` for a type with no independent size of its own (`Struct`).
	pub size: i32,
}

macro_rules! base_types {
	($($name:literal => $field_type:ident, $flags:expr, $size:literal);* $(;)?) => {
		&[ $( BaseType { name: $name, field_type: FieldType::$field_type, flags: $flags, size: $size } ),* ]
	};
}

/// The DSL-spellable base types, in the order `translate.c` declares them.
///
/// `LISTofVALUE`, `LISTofStruct`, `LISTofVarStruct` and `Struct` are
/// deliberately absent: the original only ever constructs them implicitly
/// (a `VALUES` command, a `STRUCT` use inside a `LIST`, or a nested
/// parameter list), never by spelling their base-type name directly, and
/// the DSL parser in this crate preserves that asymmetry.
pub static BASE_TYPES: &[BaseType] = base_types! {
	"BITMASK8" => Bitmask8, TypeFlags::NEEDS_BITMASK.union(TypeFlags::ELEMENTARY), 1;
	"BITMASK16" => Bitmask16, TypeFlags::NEEDS_BITMASK.union(TypeFlags::ELEMENTARY), 2;
	"BITMASK32" => Bitmask32, TypeFlags::NEEDS_BITMASK.union(TypeFlags::ELEMENTARY), 4;
	"ENUM8" => Enum8, TypeFlags::NEEDS_CONSTANTS.union(TypeFlags::ELEMENTARY), 1;
	"ENUM16" => Enum16, TypeFlags::NEEDS_CONSTANTS.union(TypeFlags::ELEMENTARY), 2;
	"ENUM32" => Enum32, TypeFlags::NEEDS_CONSTANTS.union(TypeFlags::ELEMENTARY), 4;
	"CARD8" => Card8, TypeFlags::ALLOWS_CONSTANTS.union(TypeFlags::ELEMENTARY), 1;
	"CARD16" => Card16, TypeFlags::ALLOWS_CONSTANTS.union(TypeFlags::ELEMENTARY), 2;
	"CARD32" => Card32, TypeFlags::ALLOWS_CONSTANTS.union(TypeFlags::ELEMENTARY), 4;
	"INT8" => Int8, TypeFlags::ALLOWS_CONSTANTS.union(TypeFlags::ELEMENTARY), 1;
	"INT16" => Int16, TypeFlags::ALLOWS_CONSTANTS.union(TypeFlags::ELEMENTARY), 2;
	"INT32" => Int32, TypeFlags::ALLOWS_CONSTANTS.union(TypeFlags::ELEMENTARY), 4;
	"UINT8" => Uint8, TypeFlags::ALLOWS_CONSTANTS.union(TypeFlags::ELEMENTARY), 1;
	"UINT16" => Uint16, TypeFlags::ALLOWS_CONSTANTS.union(TypeFlags::ELEMENTARY), 2;
	"UINT32" => Uint32, TypeFlags::ALLOWS_CONSTANTS.union(TypeFlags::ELEMENTARY), 4;
	"STRING8" => String8, TypeFlags::USES_STORE.union(TypeFlags::SETS_NEXT), 0;
	"LISTofCARD8" => ListOfCard8, TypeFlags::ALLOWS_CONSTANTS.union(TypeFlags::USES_STORE).union(TypeFlags::SETS_NEXT), 0;
	"LISTofCARD16" => ListOfCard16, TypeFlags::ALLOWS_CONSTANTS.union(TypeFlags::USES_STORE).union(TypeFlags::SETS_NEXT), 0;
	"LISTofCARD32" => ListOfCard32, TypeFlags::ALLOWS_CONSTANTS.union(TypeFlags::USES_STORE).union(TypeFlags::SETS_NEXT), 0;
	"LISTofUINT8" => ListOfUint8, TypeFlags::ALLOWS_CONSTANTS.union(TypeFlags::USES_STORE).union(TypeFlags::SETS_NEXT), 0;
	"LISTofUINT16" => ListOfUint16, TypeFlags::ALLOWS_CONSTANTS.union(TypeFlags::USES_STORE).union(TypeFlags::SETS_NEXT), 0;
	"LISTofUINT32" => ListOfUint32, TypeFlags::ALLOWS_CONSTANTS.union(TypeFlags::USES_STORE).union(TypeFlags::SETS_NEXT), 0;
	"LISTofINT8" => ListOfInt8, TypeFlags::ALLOWS_CONSTANTS.union(TypeFlags::USES_STORE).union(TypeFlags::SETS_NEXT), 0;
	"LISTofINT16" => ListOfInt16, TypeFlags::ALLOWS_CONSTANTS.union(TypeFlags::USES_STORE).union(TypeFlags::SETS_NEXT), 0;
	"LISTofINT32" => ListOfInt32, TypeFlags::ALLOWS_CONSTANTS.union(TypeFlags::USES_STORE).union(TypeFlags::SETS_NEXT), 0;
	"ATOM" => Atom, TypeFlags::ALLOWS_CONSTANTS.union(TypeFlags::ELEMENTARY), 4;
	"LISTofFormat" => ListOfFormat, TypeFlags::USES_FORMAT.union(TypeFlags::USES_STORE).union(TypeFlags::SETS_NEXT), 0;
	"LISTofATOM" => ListOfAtom, TypeFlags::ALLOWS_CONSTANTS.union(TypeFlags::USES_STORE).union(TypeFlags::SETS_NEXT), 0;
	"FORMAT8" => Format8, TypeFlags::SETS_FORMAT, 1;
	"BE32" => Be32, TypeFlags::ALLOWS_CONSTANTS, 4;
	"FRACTION16_16" => Fraction16_16, TypeFlags::empty(), 4;
	"FIXED" => Fixed, TypeFlags::empty(), 4;
	"LISTofFIXED" => ListOfFixed, TypeFlags::USES_STORE.union(TypeFlags::SETS_NEXT), 0;
	"FIXED3232" => Fixed3232, TypeFlags::empty(), 8;
	"LISTofFIXED3232" => ListOfFixed3232, TypeFlags::USES_STORE.union(TypeFlags::SETS_NEXT), 0;
	"FLOAT32" => Float32, TypeFlags::empty(), 4;
	"LISTofFLOAT32" => ListOfFloat32, TypeFlags::USES_STORE.union(TypeFlags::SETS_NEXT), 0;
	"FRACTION32_32" => Fraction32_32, TypeFlags::empty(), 8;
	"UFRACTION32_32" => Ufraction32_32, TypeFlags::empty(), 8;
	"INT32_32" => Int32_32, TypeFlags::empty(), 8;
	"CARD64" => Card64, TypeFlags::ALLOWS_CONSTANTS.union(TypeFlags::ELEMENTARY), 8;
	"LISTofCARD64" => ListOfCard64, TypeFlags::ALLOWS_CONSTANTS.union(TypeFlags::USES_STORE).union(TypeFlags::SETS_NEXT), 0;
	"PUSH8" => Push8, TypeFlags::PUSHES, 1;
	"PUSH16" => Push16, TypeFlags::PUSHES, 2;
	"PUSH32" => Push32, TypeFlags::PUSHES, 4;
	"STORE8" => Store8, TypeFlags::SETS_STORE, 1;
	"STORE16" => Store16, TypeFlags::SETS_STORE, 2;
	"STORE32" => Store32, TypeFlags::SETS_STORE, 4;
};

/// The three types the parser builds implicitly rather than by name —
/// `VALUES`, a `LIST` over a named `STRUCT`, and a bare `STRUCT` use.
pub static LIST_OF_VALUE: BaseType = BaseType {
	name: "LISTofVALUE",
	field_type: FieldType::ListOfValue,
	flags: TypeFlags::NEEDS_STORE,
	size: 0,
};
pub static LIST_OF_STRUCT: BaseType = BaseType {
	name: "LISTofStruct",
	field_type: FieldType::ListOfStruct,
	flags: TypeFlags::USES_STORE.union(TypeFlags::SETS_NEXT),
	size: 0,
};
pub static LIST_OF_VAR_STRUCT: BaseType = BaseType {
	name: "LISTofVarStruct",
	field_type: FieldType::ListOfVarStruct,
	flags: TypeFlags::USES_STORE.union(TypeFlags::SETS_NEXT),
	size: 0,
};
pub static STRUCT: BaseType = BaseType {
	name: "Struct",
	field_type: FieldType::Struct,
	flags: TypeFlags::empty(),
	size: -1,
};

/// Looks up a base type by its DSL spelling.
pub fn find(name: &str) -> Option<&'static BaseType> {
	BASE_TYPES.iter().find(|t| t.name == name)
}

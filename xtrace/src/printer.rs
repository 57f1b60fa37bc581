// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Renders a byte range against a parameter list: the single largest
//! piece of the interpreter, grounded on `print_parameters` and its
//! per-type helpers (`print_bitfield`, every `printLISTofXXX`,
//! `getFromStack`/`pushStack`) in `parse.c`.
//!
//! Printing walks a [`ParameterList`](xtrace_proto::tables::Parameter)
//! left to right against a byte buffer, maintaining a small
//! [`Stack`] of values pushed by `PUSH*`/`STORE*` fields and consulted by
//! later fields (list lengths, `IF*` branch conditions, `GET`). Output is
//! built up as `name=value` fragments joined by the caller into the
//! bracketed parameter list X11 tools traditionally render
//! (`CreateWindow(wid=0x..., parent=0x..., ...)`).

use std::fmt::Write as _;

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use xtrace_proto::tables::{FieldType, IfValue, Parameter, TypeSpec};

use crate::atom::AtomTable;

/// The per-packet control-flow stack. Fixed-size and non-heap-allocated,
/// matching the original's bound of "a handful of nested PUSH/STORE
/// values per packet" rather than an unbounded `Vec`.
pub const STACK_SIZE: usize = 30;

#[derive(Debug)]
pub struct Stack {
	values: [u64; STACK_SIZE],
	len: usize,
	/// The FORMAT register: the element width (8, 16 or 32) a `FORMAT8`
	/// parameter most recently captured, consulted by a following
	/// `LISTofFormat` field. Defaults to 8, matching the original's
	/// `format` connection-wide default before any `FORMAT8` is seen.
	format: u8,
}

impl Default for Stack {
	fn default() -> Self {
		Self {
			values: [0; STACK_SIZE],
			len: 0,
			format: 8,
		}
	}
}

impl Stack {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn push(&mut self, value: u64) {
		if self.len < STACK_SIZE {
			self.values[self.len] = value;
			self.len += 1;
		}
		// silently drops pushes past the bound, matching the original's
		// fixed-size stack array overflow behaviour for pathological
		// packets; such packets are already malformed in other ways.
	}

	/// `offset` 0 is the most recently pushed value (`getFromStack`).
	pub fn get(&self, offset: usize) -> Option<u64> {
		if offset >= self.len {
			return None;
		}
		Some(self.values[self.len - 1 - offset])
	}

	pub fn clear(&mut self) {
		self.len = 0;
		self.format = 8;
	}

	pub fn set_format(&mut self, format: u8) {
		self.format = format;
	}

	pub fn format(&self) -> u8 {
		self.format
	}
}

/// Read-only context the printer needs beyond the raw bytes: the
/// connection's endianness, atom table, and the configured cap on how
/// many list elements to render before truncating with `,...`.
pub struct PrintContext<'a> {
	pub bigendian: bool,
	pub atoms: &'a AtomTable,
	pub max_shown_list_len: usize,
	/// `--print-offsets`: suffix every rendered field with the byte
	/// offset it was read from.
	pub print_offsets: bool,
}

/// Appends `@offset` to `value` when `print_offsets` is on, matching the
/// fixed-offset (not `AfterLastList`-relative) position the field was
/// actually read from.
fn with_offset(value: String, offset: usize, ctx: &PrintContext<'_>) -> String {
	if ctx.print_offsets {
		format!("{value}@{offset}")
	} else {
		value
	}
}

fn read_u8(buf: &[u8], offset: usize) -> Option<u8> {
	buf.get(offset).copied()
}
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
fn read_u64(buf: &[u8], offset: usize, be: bool) -> Option<u64> {
	let bytes = buf.get(offset..offset + 8)?;
	Some(if be {
		BigEndian::read_u64(bytes)
	} else {
		LittleEndian::read_u64(bytes)
	})
}

/// Renders `parameters` against `buffer`, returning the joined
/// `name=value` fragments in order.
///
/// `offset_adjustment` is `4` for a big-request packet (see
/// [`crate::framer::is_big_request`]) and `0` otherwise, reproducing the
/// original's rule that every fixed offset `>= 4` shifts by the width of
/// the injected extended-length field.
pub fn print_parameters(
	buffer: &[u8],
	parameters: &[Parameter],
	offset_adjustment: usize,
	stack: &mut Stack,
	ctx: &PrintContext<'_>,
) -> Vec<String> {
	let mut out = Vec::new();
	let mut cursor_after_last_list = 0usize;
	print_parameters_into(
		buffer,
		parameters,
		offset_adjustment,
		stack,
		ctx,
		&mut out,
		&mut cursor_after_last_list,
	);
	out
}

/// Resolves a [`Parameter`]'s declared offset to an absolute byte
/// position: `AfterLastList` reuses the end of the last variable-length
/// field rendered so far, and any `Fixed` offset at or past the core
/// header (`>= 4`) shifts by `offset_adjustment` (4 for a big-request
/// packet, to skip the injected extended-length field).
fn resolve_offset(offset: xtrace_proto::tables::Offset, offset_adjustment: usize, cursor_after_last_list: usize) -> usize {
	match offset {
		xtrace_proto::tables::Offset::AfterLastList => cursor_after_last_list,
		xtrace_proto::tables::Offset::Fixed(o) => {
			if o >= 4 {
				o + offset_adjustment
			} else {
				o
			}
		}
	}
}

#[allow(clippy::too_many_arguments)]
fn print_parameters_into(
	buffer: &[u8],
	parameters: &[Parameter],
	offset_adjustment: usize,
	stack: &mut Stack,
	ctx: &PrintContext<'_>,
	out: &mut Vec<String>,
	cursor_after_last_list: &mut usize,
) {
	for parameter in parameters {
		let offset = resolve_offset(parameter.offset, offset_adjustment, *cursor_after_last_list);

		let field_type = parameter.type_spec.field_type();
		let name = parameter.name.as_deref().unwrap_or("");

		match field_type {
			FieldType::LastMarker => {
				*cursor_after_last_list = (offset + 3) & !3;
				continue;
			}
			FieldType::SetSize => {
				continue;
			}
			FieldType::Get => {
				let value = stack.get(0).unwrap_or(0);
				out.push(format!("{name}={value}"));
				continue;
			}
			FieldType::Set | FieldType::DecrementStored | FieldType::DivideStored => {
				continue;
			}
			_ => {}
		}

		match &parameter.type_spec {
			TypeSpec::Conditional { clauses, otherwise } => {
				let mut matched = false;
				for clause in clauses.iter() {
					let clause_offset = resolve_offset(clause.offset, offset_adjustment, *cursor_after_last_list);
					let is_match = match &clause.value {
						IfValue::Number(expected) => {
							let actual = match clause.field_type {
								FieldType::If8 => read_u8(buffer, clause_offset).map(|v| v as u64),
								FieldType::If16 => read_u16(buffer, clause_offset, ctx.bigendian).map(|v| v as u64),
								FieldType::If32 => read_u32(buffer, clause_offset, ctx.bigendian).map(|v| v as u64),
								_ => None,
							};
							actual == Some(*expected)
						}
						IfValue::AtomName(name) => read_u32(buffer, clause_offset, ctx.bigendian)
							.and_then(|atom| ctx.atoms.name(atom))
							.is_some_and(|resolved| resolved == name.as_ref()),
					};
					if is_match {
						print_parameters_into(buffer, &clause.body, offset_adjustment, stack, ctx, out, cursor_after_last_list);
						matched = true;
						break;
					}
				}
				if !matched {
					if let Some(body) = otherwise {
						print_parameters_into(buffer, body, offset_adjustment, stack, ctx, out, cursor_after_last_list);
					}
				}
				continue;
			}
			TypeSpec::WithParameters(FieldType::Struct, fields)
			| TypeSpec::WithParameters(FieldType::ListOfStruct, fields) => {
				render_struct_field(
					buffer,
					name,
					offset,
					fields,
					offset_adjustment,
					stack,
					ctx,
					out,
					cursor_after_last_list,
				);
				continue;
			}
			_ => {}
		}

		let rendered = render_scalar_or_list(buffer, offset, &parameter.type_spec, stack, ctx);
		if let Some(rendered) = rendered {
			let rendered = with_offset(rendered, offset, ctx);
			if name.is_empty() {
				out.push(rendered);
			} else {
				out.push(format!("{name}={rendered}"));
			}
		}
	}
}

#[allow(clippy::too_many_arguments)]
fn render_struct_field(
	buffer: &[u8],
	name: &str,
	offset: usize,
	fields: &[Parameter],
	offset_adjustment: usize,
	stack: &mut Stack,
	ctx: &PrintContext<'_>,
	out: &mut Vec<String>,
	cursor_after_last_list: &mut usize,
) {
	let mut inner = Vec::new();
	let remaining = buffer.get(offset..).unwrap_or(&[]);
	print_parameters_into(remaining, fields, offset_adjustment, stack, ctx, &mut inner, cursor_after_last_list);
	let joined = inner.join(", ");
	let joined = with_offset(format!("{{{joined}}}"), offset, ctx);
	if name.is_empty() {
		out.push(joined);
	} else {
		out.push(format!("{name}={joined}"));
	}
}

fn render_scalar_or_list(
	buffer: &[u8],
	offset: usize,
	type_spec: &TypeSpec,
	stack: &mut Stack,
	ctx: &PrintContext<'_>,
) -> Option<String> {
	let field_type = type_spec.field_type();
	match field_type {
		FieldType::Int8 => read_u8(buffer, offset).map(|v| (v as i8).to_string()),
		FieldType::Int16 => read_u16(buffer, offset, ctx.bigendian).map(|v| (v as i16).to_string()),
		FieldType::Int32 => read_u32(buffer, offset, ctx.bigendian).map(|v| (v as i32).to_string()),
		FieldType::Uint8 => read_u8(buffer, offset).map(|v| v.to_string()),
		FieldType::Uint16 => read_u16(buffer, offset, ctx.bigendian).map(|v| v.to_string()),
		FieldType::Uint32 => read_u32(buffer, offset, ctx.bigendian).map(|v| v.to_string()),
		FieldType::Card64 => read_u64(buffer, offset, ctx.bigendian).map(|v| v.to_string()),
		FieldType::Card8 | FieldType::Store8 | FieldType::Push8 => {
			let value = read_u8(buffer, offset)? as u64;
			if matches!(field_type, FieldType::Push8 | FieldType::Store8) {
				stack.push(value);
			}
			Some(render_with_constants(value, type_spec, format!("0x{value:02x}")))
		}
		FieldType::Card16 | FieldType::Store16 | FieldType::Push16 => {
			let value = read_u16(buffer, offset, ctx.bigendian)? as u64;
			if matches!(field_type, FieldType::Push16 | FieldType::Store16) {
				stack.push(value);
			}
			Some(render_with_constants(value, type_spec, format!("0x{value:04x}")))
		}
		FieldType::Card32 | FieldType::Store32 | FieldType::Push32 => {
			let value = read_u32(buffer, offset, ctx.bigendian)? as u64;
			if matches!(field_type, FieldType::Push32 | FieldType::Store32) {
				stack.push(value);
			}
			Some(render_with_constants(value, type_spec, format!("0x{value:08x}")))
		}
		FieldType::Enum8 => {
			let value = read_u8(buffer, offset)? as u64;
			Some(render_enum(value, type_spec))
		}
		FieldType::Enum16 => {
			let value = read_u16(buffer, offset, ctx.bigendian)? as u64;
			Some(render_enum(value, type_spec))
		}
		FieldType::Enum32 => {
			let value = read_u32(buffer, offset, ctx.bigendian)? as u64;
			Some(render_enum(value, type_spec))
		}
		FieldType::Bitmask8 => {
			let value = read_u8(buffer, offset)? as u64;
			Some(render_bitmask(value, type_spec))
		}
		FieldType::Bitmask16 => {
			let value = read_u16(buffer, offset, ctx.bigendian)? as u64;
			Some(render_bitmask(value, type_spec))
		}
		FieldType::Bitmask32 => {
			let value = read_u32(buffer, offset, ctx.bigendian)? as u64;
			Some(render_bitmask(value, type_spec))
		}
		FieldType::Atom => {
			let value = read_u32(buffer, offset, ctx.bigendian)?;
			Some(match ctx.atoms.name(value) {
				Some(name) => format!("0x{value:x}(\"{name}\")"),
				None if value == 0 => "None".to_string(),
				None => format!("0x{value:x}(unrecognized atom)"),
			})
		}
		FieldType::Be32 => read_u32(buffer, offset, true).map(|v| format!("0x{v:08x}")),
		FieldType::Fixed => read_u32(buffer, offset, ctx.bigendian).map(|v| render_fixed(v as i32, 16)),
		FieldType::Fixed3232 => read_u64(buffer, offset, ctx.bigendian).map(|v| render_fixed64(v as i64, 32)),
		FieldType::Float32 => read_u32(buffer, offset, ctx.bigendian).map(|v| f32::from_bits(v).to_string()),
		FieldType::Fraction16_16 => {
			let raw = read_u32(buffer, offset, ctx.bigendian)?;
			let (num, den) = ((raw >> 16) as i16, raw as i16);
			Some(format!("{num}/{den}"))
		}
		FieldType::Fraction32_32 | FieldType::Ufraction32_32 => {
			let raw = read_u64(buffer, offset, ctx.bigendian)?;
			let num = (raw >> 32) as i32;
			let den = raw as i32;
			Some(format!("{num}/{den}"))
		}
		FieldType::Int32_32 => {
			let raw = read_u64(buffer, offset, ctx.bigendian)?;
			Some((raw as i64).to_string())
		}
		FieldType::String8 => {
			let len = stack.get(0).unwrap_or(0) as usize;
			let bytes = buffer.get(offset..offset + len)?;
			Some(quote_bytes(bytes))
		}
		FieldType::ListOfCard8 | FieldType::ListOfUint8 | FieldType::ListOfInt8 => {
			render_numeric_list(buffer, offset, stack, ctx, 1, field_type)
		}
		FieldType::ListOfCard16 | FieldType::ListOfUint16 | FieldType::ListOfInt16 => {
			render_numeric_list(buffer, offset, stack, ctx, 2, field_type)
		}
		FieldType::ListOfCard32 | FieldType::ListOfUint32 | FieldType::ListOfInt32 => {
			render_numeric_list(buffer, offset, stack, ctx, 4, field_type)
		}
		FieldType::ListOfCard64 => render_numeric_list(buffer, offset, stack, ctx, 8, field_type),
		FieldType::ListOfAtom => {
			let count = stack.get(0).unwrap_or(0) as usize;
			Some(render_list(count, ctx.max_shown_list_len, |i| {
				let atom_offset = offset + i * 4;
				let value = read_u32(buffer, atom_offset, ctx.bigendian)?;
				Some(match ctx.atoms.name(value) {
					Some(name) => name.to_string(),
					None => format!("atom 0x{value:x}"),
				})
			}))
		}
		FieldType::ListOfFloat32 => {
			let count = stack.get(0).unwrap_or(0) as usize;
			Some(render_list(count, ctx.max_shown_list_len, |i| {
				read_u32(buffer, offset + i * 4, ctx.bigendian).map(|v| f32::from_bits(v).to_string())
			}))
		}
		FieldType::ListOfFixed => {
			let count = stack.get(0).unwrap_or(0) as usize;
			Some(render_list(count, ctx.max_shown_list_len, |i| {
				read_u32(buffer, offset + i * 4, ctx.bigendian).map(|v| render_fixed(v as i32, 16))
			}))
		}
		FieldType::ListOfFixed3232 => {
			let count = stack.get(0).unwrap_or(0) as usize;
			Some(render_list(count, ctx.max_shown_list_len, |i| {
				read_u64(buffer, offset + i * 8, ctx.bigendian).map(|v| render_fixed64(v as i64, 32))
			}))
		}
		FieldType::ListOfFormat => {
			let count = stack.get(0).unwrap_or(0) as usize;
			// Element width is whatever the preceding `FORMAT8` last
			// captured (8, 16 or 32); unrecognised values fall back to
			// bytes, matching `printLISTofFormat`'s default.
			match stack.format() {
				16 => Some(render_list(count, ctx.max_shown_list_len, |i| {
					read_u16(buffer, offset + i * 2, ctx.bigendian).map(|v| format!("0x{v:04x}"))
				})),
				32 => Some(render_list(count, ctx.max_shown_list_len, |i| {
					read_u32(buffer, offset + i * 4, ctx.bigendian).map(|v| format!("0x{v:08x}"))
				})),
				_ => Some(render_list(count, ctx.max_shown_list_len, |i| {
					read_u8(buffer, offset + i).map(|v| format!("0x{v:02x}"))
				})),
			}
		}
		FieldType::ListOfValue => render_value_list(buffer, offset, type_spec, stack, ctx),
		FieldType::Format8 => {
			let value = read_u8(buffer, offset)?;
			stack.set_format(value);
			Some(value.to_string())
		}
		_ => None,
	}
}

fn render_with_constants(value: u64, type_spec: &TypeSpec, default: String) -> String {
	if let TypeSpec::WithConstants(_, set) = type_spec {
		if let Some(name) = set.name_for(value) {
			return format!("{name}({default})");
		}
	}
	default
}

fn render_enum(value: u64, type_spec: &TypeSpec) -> String {
	if let TypeSpec::WithConstants(_, set) = type_spec {
		if let Some(name) = set.name_for(value) {
			return format!("{name}(0x{value:x})");
		}
	}
	format!("unknown {value}")
}

fn render_bitmask(value: u64, type_spec: &TypeSpec) -> String {
	if let TypeSpec::WithConstants(_, set) = type_spec {
		if value == 0 {
			return set.name_for(0).map(str::to_string).unwrap_or_else(|| "0".to_string());
		}
		let names: Vec<&str> = set.flags_in(value).map(|c| c.name.as_ref()).collect();
		if !names.is_empty() {
			return names.join(",");
		}
	}
	if value == 0 {
		return "0".to_string();
	}
	format!("0x{value:x}")
}

fn render_fixed(raw: i32, fractional_bits: u32) -> String {
	let scale = (1u64 << fractional_bits) as f64;
	format!("{:.*}", fractional_bits.min(6) as usize, raw as f64 / scale)
}

/// Like [`render_fixed`] but for a 32.32 fixed-point value spanning the
/// full 64 bits, whose integer part would be truncated by a round-trip
/// through `i32`.
fn render_fixed64(raw: i64, fractional_bits: u32) -> String {
	let scale = (1u64 << fractional_bits) as f64;
	format!("{:.*}", fractional_bits.min(6) as usize, raw as f64 / scale)
}

fn quote_bytes(bytes: &[u8]) -> String {
	let mut out = String::from("\"");
	for &b in bytes {
		match b {
			b'"' | b'\\' => {
				out.push('\\');
				out.push(b as char);
			}
			0x20..=0x7e => out.push(b as char),
			_ => {
				let _ = write!(out, "\\x{b:02x}");
			}
		}
	}
	out.push('"');
	out
}

/// Renders up to `max_len` elements produced by `render_one`, appending
/// `,...` once the cap is reached — the list-truncation rule every
/// `LISTof*` printer in the original applies via `maxshownlistlen`.
fn render_list(count: usize, max_len: usize, mut render_one: impl FnMut(usize) -> Option<String>) -> String {
	let shown = count.min(max_len);
	let mut items = Vec::with_capacity(shown);
	for i in 0..shown {
		match render_one(i) {
			Some(item) => items.push(item),
			None => break,
		}
	}
	let mut rendered = format!("{{{}}}", items.join(", "));
	if count > max_len {
		rendered.pop();
		rendered.push_str(", ...}");
	}
	rendered
}

fn render_numeric_list(
	buffer: &[u8],
	offset: usize,
	stack: &mut Stack,
	ctx: &PrintContext<'_>,
	elem_size: usize,
	field_type: FieldType,
) -> Option<String> {
	let count = stack.get(0).unwrap_or(0) as usize;
	Some(render_list(count, ctx.max_shown_list_len, |i| {
		let item_offset = offset + i * elem_size;
		match elem_size {
			1 => read_u8(buffer, item_offset).map(|v| render_list_item_u8(v, field_type)),
			2 => read_u16(buffer, item_offset, ctx.bigendian).map(|v| render_list_item_u16(v, field_type)),
			4 => read_u32(buffer, item_offset, ctx.bigendian).map(|v| render_list_item_u32(v, field_type)),
			8 => read_u64(buffer, item_offset, ctx.bigendian).map(|v| v.to_string()),
			_ => None,
		}
	}))
}

fn render_list_item_u8(v: u8, field_type: FieldType) -> String {
	match field_type {
		FieldType::ListOfInt8 => (v as i8).to_string(),
		FieldType::ListOfUint8 => v.to_string(),
		_ => format!("0x{v:02x}"),
	}
}
fn render_list_item_u16(v: u16, field_type: FieldType) -> String {
	match field_type {
		FieldType::ListOfInt16 => (v as i16).to_string(),
		FieldType::ListOfUint16 => v.to_string(),
		_ => format!("0x{v:04x}"),
	}
}
fn render_list_item_u32(v: u32, field_type: FieldType) -> String {
	match field_type {
		FieldType::ListOfInt32 => (v as i32).to_string(),
		FieldType::ListOfUint32 => v.to_string(),
		_ => format!("0x{v:08x}"),
	}
}

/// `LISTofVALUE`: a bitmask at `offset - 4` (the `STORE32` that always
/// precedes it in the core protocol's `VALUES`-bearing requests) selects
/// which of the `VALUES` table's fields are present, each a `CARD32` in
/// ascending flag order starting right after the mask.
fn render_value_list(
	buffer: &[u8],
	offset: usize,
	type_spec: &TypeSpec,
	_stack: &mut Stack,
	ctx: &PrintContext<'_>,
) -> Option<String> {
	let TypeSpec::WithValues(_, values) = type_spec else {
		return None;
	};
	let mask = read_u32(buffer, offset.checked_sub(4)?, ctx.bigendian)? as u64;
	let mut cursor = offset;
	let mut items = Vec::new();
	for value in values.iter() {
		if mask & value.flag != value.flag {
			continue;
		}
		let rendered = match value.field_type {
			FieldType::Card8 | FieldType::Int8 | FieldType::Uint8 => {
				let v = read_u8(buffer, cursor)? as u64;
				cursor += 4;
				v.to_string()
			}
			_ => {
				let v = read_u32(buffer, cursor, ctx.bigendian)? as u64;
				cursor += 4;
				if let Some(set) = &value.constants {
					set.name_for(v).map(str::to_string).unwrap_or_else(|| format!("0x{v:x}"))
				} else {
					format!("0x{v:x}")
				}
			}
		};
		items.push(format!("{}={}", value.name, rendered));
	}
	Some(format!("{{{}}}", items.join(", ")))
}

#[cfg(test)]
mod tests {
	use super::*;
	use xtrace_proto::tables::{Constant, ConstantSet};
	use std::sync::Arc;

	fn ctx<'a>(atoms: &'a AtomTable) -> PrintContext<'a> {
		PrintContext {
			bigendian: true,
			atoms,
			max_shown_list_len: 3,
			print_offsets: false,
		}
	}

	#[test]
	fn print_offsets_suffixes_rendered_fields_with_their_byte_offset() {
		let atoms = AtomTable::new();
		let mut ctx = ctx(&atoms);
		ctx.print_offsets = true;
		let buffer = [0u8, 0, 0, 0, 0x2a];
		let parameters = vec![Parameter {
			offset: xtrace_proto::tables::Offset::Fixed(4),
			name: Some("value".into()),
			type_spec: TypeSpec::Elementary(FieldType::Card8),
		}];
		let mut stack = Stack::new();
		let rendered = print_parameters(&buffer, &parameters, 0, &mut stack, &ctx);
		assert_eq!(rendered, vec!["value=0x2a@4"]);
	}

	#[test]
	fn renders_card8_as_hex() {
		let atoms = AtomTable::new();
		let mut stack = Stack::new();
		let buf = [0x2a];
		let param = Parameter {
			offset: xtrace_proto::tables::Offset::Fixed(0),
			name: Some(Arc::from("depth")),
			type_spec: TypeSpec::Elementary(FieldType::Card8),
		};
		let out = print_parameters(&buf, &[param], 0, &mut stack, &ctx(&atoms));
		assert_eq!(out, vec!["depth=0x2a".to_string()]);
	}

	#[test]
	fn renders_enum_by_name() {
		let atoms = AtomTable::new();
		let mut stack = Stack::new();
		let buf = [1u8];
		let set = Arc::new(ConstantSet {
			name: Arc::from("Bool"),
			constants: Arc::from(vec![
				Constant { value: 0, name: Arc::from("False") },
				Constant { value: 1, name: Arc::from("True") },
			]),
			bitmask: false,
		});
		let param = Parameter {
			offset: xtrace_proto::tables::Offset::Fixed(0),
			name: Some(Arc::from("override-redirect")),
			type_spec: TypeSpec::WithConstants(FieldType::Enum8, set),
		};
		let out = print_parameters(&buf, &[param], 0, &mut stack, &ctx(&atoms));
		assert_eq!(out, vec!["override-redirect=True(0x1)".to_string()]);
	}

	#[test]
	fn renders_bitmask_names_joined_by_commas() {
		let atoms = AtomTable::new();
		let mut stack = Stack::new();
		let buf = [0b011u8];
		let set = Arc::new(ConstantSet {
			name: Arc::from("EventMask"),
			constants: Arc::from(vec![
				Constant { value: 0, name: Arc::from("NoEventMask") },
				Constant { value: 0b001, name: Arc::from("KeyPress") },
				Constant { value: 0b010, name: Arc::from("KeyRelease") },
				Constant { value: 0b100, name: Arc::from("ButtonPress") },
			]),
			bitmask: true,
		});
		let param = Parameter {
			offset: xtrace_proto::tables::Offset::Fixed(0),
			name: Some(Arc::from("event-mask")),
			type_spec: TypeSpec::WithConstants(FieldType::Bitmask8, set),
		};
		let out = print_parameters(&buf, &[param], 0, &mut stack, &ctx(&atoms));
		assert_eq!(out, vec!["event-mask=KeyPress,KeyRelease".to_string()]);
	}

	#[test]
	fn renders_zero_bitmask_using_its_own_name() {
		let atoms = AtomTable::new();
		let mut stack = Stack::new();
		let buf = [0u8];
		let set = Arc::new(ConstantSet {
			name: Arc::from("EventMask"),
			constants: Arc::from(vec![
				Constant { value: 0, name: Arc::from("NoEventMask") },
				Constant { value: 0b001, name: Arc::from("KeyPress") },
			]),
			bitmask: true,
		});
		let param = Parameter {
			offset: xtrace_proto::tables::Offset::Fixed(0),
			name: Some(Arc::from("event-mask")),
			type_spec: TypeSpec::WithConstants(FieldType::Bitmask8, set),
		};
		let out = print_parameters(&buf, &[param], 0, &mut stack, &ctx(&atoms));
		assert_eq!(out, vec!["event-mask=NoEventMask".to_string()]);
	}

	#[test]
	fn renders_atom_as_hex_with_quoted_name() {
		let mut atoms = AtomTable::new();
		atoms.intern(332, Arc::from("WM_PROTOCOLS")).unwrap();
		let mut stack = Stack::new();
		let mut buf = [0u8; 4];
		BigEndian::write_u32(&mut buf, 332);
		let param = Parameter {
			offset: xtrace_proto::tables::Offset::Fixed(0),
			name: Some(Arc::from("atom")),
			type_spec: TypeSpec::Elementary(FieldType::Atom),
		};
		let out = print_parameters(&buf, &[param], 0, &mut stack, &ctx(&atoms));
		assert_eq!(out, vec![r#"atom=0x14c("WM_PROTOCOLS")"#.to_string()]);
	}

	#[test]
	fn renders_fixed3232_without_truncating_the_integer_part() {
		let atoms = AtomTable::new();
		let mut stack = Stack::new();
		let mut buf = [0u8; 8];
		// 5.5 as a 32.32 fixed-point value: integer part 5 in the high
		// 32 bits, 0x80000000 (one half) in the low 32 bits.
		BigEndian::write_u64(&mut buf, (5u64 << 32) | 0x8000_0000);
		let param = Parameter {
			offset: xtrace_proto::tables::Offset::Fixed(0),
			name: Some(Arc::from("value")),
			type_spec: TypeSpec::Elementary(FieldType::Fixed3232),
		};
		let out = print_parameters(&buf, &[param], 0, &mut stack, &ctx(&atoms));
		assert_eq!(out, vec!["value=5.500000".to_string()]);
	}

	#[test]
	fn list_rendering_truncates_past_the_cap() {
		let atoms = AtomTable::new();
		let mut stack = Stack::new();
		stack.push(5);
		let buf = [1u8, 2, 3, 4, 5];
		let param = Parameter {
			offset: xtrace_proto::tables::Offset::Fixed(0),
			name: Some(Arc::from("data")),
			type_spec: TypeSpec::Elementary(FieldType::ListOfCard8),
		};
		let out = print_parameters(&buf, &[param], 0, &mut stack, &ctx(&atoms));
		assert_eq!(out, vec!["data={0x01, 0x02, 0x03, ...}".to_string()]);
	}

	#[test]
	fn list_of_format_follows_the_captured_format_register() {
		let atoms = AtomTable::new();
		let mut stack = Stack::new();
		stack.push(2);
		let buf = [16u8, 0x01, 0x02, 0x03, 0x04];
		let params = vec![
			Parameter {
				offset: xtrace_proto::tables::Offset::Fixed(0),
				name: Some(Arc::from("format")),
				type_spec: TypeSpec::Elementary(FieldType::Format8),
			},
			Parameter {
				offset: xtrace_proto::tables::Offset::Fixed(1),
				name: Some(Arc::from("data")),
				type_spec: TypeSpec::Elementary(FieldType::ListOfFormat),
			},
		];
		let out = print_parameters(&buf, &params, 0, &mut stack, &ctx(&atoms));
		assert_eq!(out, vec!["format=16".to_string(), "data={0x0102, 0x0304}".to_string()]);
	}

	#[test]
	fn conditional_falls_through_elseif_to_else() {
		let atoms = AtomTable::new();
		let mut stack = Stack::new();
		let buf = [7u8];

		let param = Parameter {
			offset: xtrace_proto::tables::Offset::Fixed(0),
			name: None,
			type_spec: TypeSpec::Conditional {
				clauses: Arc::from(vec![
					xtrace_proto::tables::IfClause {
						offset: xtrace_proto::tables::Offset::Fixed(0),
						field_type: FieldType::If8,
						value: xtrace_proto::tables::IfValue::Number(1),
						body: Arc::from(vec![Parameter {
							offset: xtrace_proto::tables::Offset::Fixed(0),
							name: Some(Arc::from("branch")),
							type_spec: TypeSpec::Elementary(FieldType::Card8),
						}]),
					},
					xtrace_proto::tables::IfClause {
						offset: xtrace_proto::tables::Offset::Fixed(0),
						field_type: FieldType::If8,
						value: xtrace_proto::tables::IfValue::Number(7),
						body: Arc::from(vec![Parameter {
							offset: xtrace_proto::tables::Offset::Fixed(0),
							name: Some(Arc::from("matched-elseif")),
							type_spec: TypeSpec::Elementary(FieldType::Card8),
						}]),
					},
				]),
				otherwise: Some(Arc::from(vec![Parameter {
					offset: xtrace_proto::tables::Offset::Fixed(0),
					name: Some(Arc::from("else-branch")),
					type_spec: TypeSpec::Elementary(FieldType::Card8),
				}])),
			},
		};

		let out = print_parameters(&buf, &[param], 0, &mut stack, &ctx(&atoms));
		assert_eq!(out, vec!["matched-elseif=0x07".to_string()]);
	}
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Per-connection atom table.
//!
//! X11 atoms name properties, types and selections by a small integer
//! handle rather than by sending the string repeatedly. 68 of those
//! handles are predefined by the core protocol; everything above that is
//! minted per-server by `InternAtom` and is only known to a connection
//! once it has observed the request that created it. Grounded on
//! `atoms.c`'s `constant_atoms[]` table and its `newAtom`/`getAtom`/
//! `internAtom` functions — unlike the original, whose interned-atom
//! tree is a single process-global binary search tree shared by every
//! connection the tracer proxies, this table is one per [`crate::connection::Connection`],
//! matching this crate's data model, which scopes atoms to the
//! connection that learned them.

use std::collections::BTreeMap;
use std::sync::Arc;

use derive_more::Display;

macro_rules! predefined_atoms {
	($($name:ident = $id:expr),* $(,)?) => {
		/// The 68 atom IDs every X11 connection starts out already knowing,
		/// with no `InternAtom` round-trip required.
		pub mod predefined {
			$(pub const $name: u32 = $id;)*
		}

		const PREDEFINED_NAMES: &[(&str, u32)] = &[
			$((stringify!($name), $id)),*
		];
	};
}

predefined_atoms! {
	PRIMARY = 1, SECONDARY = 2, ARC = 3, ATOM = 4,
	BITMAP = 5, CARDINAL = 6, COLORMAP = 7, CURSOR = 8,
	CUT_BUFFER0 = 9, CUT_BUFFER1 = 10, CUT_BUFFER2 = 11, CUT_BUFFER3 = 12,
	CUT_BUFFER4 = 13, CUT_BUFFER5 = 14, CUT_BUFFER6 = 15, CUT_BUFFER7 = 16,
	DRAWABLE = 17, FONT = 18, INTEGER = 19, PIXMAP = 20,
	POINT = 21, RECTANGLE = 22, RESOURCE_MANAGER = 23, RGB_COLOR_MAP = 24,
	RGB_BEST_MAP = 25, RGB_BLUE_MAP = 26, RGB_DEFAULT_MAP = 27, RGB_GRAY_MAP = 28,
	RGB_GREEN_MAP = 29, RGB_RED_MAP = 30, STRING = 31, VISUALID = 32,
	WINDOW = 33, WM_COMMAND = 34, WM_HINTS = 35, WM_CLIENT_MACHINE = 36,
	WM_ICON_NAME = 37, WM_ICON_SIZE = 38, WM_NAME = 39, WM_NORMAL_HINTS = 40,
	WM_SIZE_HINTS = 41, WM_ZOOM_HINTS = 42, MIN_SPACE = 43, NORM_SPACE = 44,
	MAX_SPACE = 45, END_SPACE = 46, SUPERSCRIPT_X = 47, SUPERSCRIPT_Y = 48,
	SUBSCRIPT_X = 49, SUBSCRIPT_Y = 50, UNDERLINE_POSITION = 51, UNDERLINE_THICKNESS = 52,
	STRIKEOUT_ASCENT = 53, STRIKEOUT_DESCENT = 54, ITALIC_ANGLE = 55, X_HEIGHT = 56,
	QUAD_WIDTH = 57, WEIGHT = 58, POINT_SIZE = 59, RESOLUTION = 60,
	COPYRIGHT = 61, NOTICE = 62, FONT_NAME = 63, FAMILY_NAME = 64,
	FULL_NAME = 65, CAP_HEIGHT = 66, WM_CLASS = 67, WM_TRANSIENT_FOR = 68,
}

/// A per-connection atom dictionary: the 68 predefined names plus
/// whatever `InternAtom` has taught this connection so far.
///
/// Lookups and inserts are `O(log n)` via a `BTreeMap`, matching the
/// invariant the original's binary search tree gives it.
#[derive(Debug, Default)]
pub struct AtomTable {
	interned: BTreeMap<u32, Arc<str>>,
}

impl AtomTable {
	pub fn new() -> Self {
		Self::default()
	}

	/// Resolves an atom ID to its name, if known.
	pub fn name(&self, atom: u32) -> Option<&str> {
		if atom == 0 {
			return None;
		}
		if let Some(&(name, _)) = PREDEFINED_NAMES.iter().find(|&&(_, id)| id == atom) {
			return Some(name);
		}
		self.interned.get(&atom).map(|name| name.as_ref())
	}

	/// Records that `atom` names `name`, as learned from an `InternAtom`
	/// reply. If `atom` is already known under a different name, the
	/// mismatch is reported to the caller rather than silently
	/// overwritten — `internAtom`'s mismatch warning in `atoms.c` does
	/// the same.
	pub fn intern(&mut self, atom: u32, name: Arc<str>) -> Result<(), AtomMismatch> {
		if atom <= 68 {
			// Predefined atoms are never re-interned; a server is not
			// expected to offer a different name for them and the
			// original silently discards the attempt.
			return Ok(());
		}
		match self.interned.get(&atom) {
			Some(existing) if existing.as_ref() != name.as_ref() => Err(AtomMismatch {
				atom,
				existing: existing.clone(),
				new: name,
			}),
			Some(_) => Ok(()),
			None => {
				self.interned.insert(atom, name);
				Ok(())
			}
		}
	}
}

/// Returned when a second `InternAtom` reply names an atom ID
/// differently than a previous one did.
#[derive(Debug, Display)]
#[display(fmt = "atom {atom} already known as {existing:?}, server now calls it {new:?}")]
pub struct AtomMismatch {
	pub atom: u32,
	pub existing: Arc<str>,
	pub new: Arc<str>,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn predefined_atoms_resolve_without_interning() {
		let table = AtomTable::new();
		assert_eq!(table.name(predefined::WM_NAME), Some("WM_NAME"));
		assert_eq!(table.name(predefined::PRIMARY), Some("PRIMARY"));
	}

	#[test]
	fn interned_atoms_round_trip() {
		let mut table = AtomTable::new();
		table.intern(69, Arc::from("_NET_WM_NAME")).unwrap();
		assert_eq!(table.name(69), Some("_NET_WM_NAME"));
	}

	#[test]
	fn mismatched_rebind_is_reported() {
		let mut table = AtomTable::new();
		table.intern(69, Arc::from("_NET_WM_NAME")).unwrap();
		let err = table.intern(69, Arc::from("SOMETHING_ELSE")).unwrap_err();
		assert_eq!(err.atom, 69);
	}

	#[test]
	fn unknown_atom_is_none() {
		let table = AtomTable::new();
		assert_eq!(table.name(9999), None);
	}
}

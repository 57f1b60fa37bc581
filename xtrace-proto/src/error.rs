// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Errors produced while parsing and finalizing `.proto` descriptor files.

use std::path::PathBuf;

use thiserror::Error;

/// A location within a `.proto` source file, used to anchor [`ParseError`]s.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Location {
	pub file: PathBuf,
	pub line: u32,
	pub column: u32,
}

impl std::fmt::Display for Location {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}:{}:{}", self.file.display(), self.line, self.column)
	}
}

/// Everything that can go wrong while parsing or finalizing a descriptor set.
///
/// Parsing is not recoverable: the first error encountered stops the parser,
/// and no finalized tables are ever produced from a descriptor set that
/// failed to parse.
#[derive(Debug, Error)]
pub enum ParseError {
	#[error("{location}: could not open {path:?}: {source}")]
	Io {
		location: Location,
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("{location}: unknown command {command:?}")]
	UnknownCommand { location: Location, command: String },

	#[error("{location}: expected {expected}, found {found:?}")]
	UnexpectedToken {
		location: Location,
		expected: &'static str,
		found: String,
	},

	#[error("{location}: unknown type {name:?}")]
	UnknownType { location: Location, name: String },

	#[error("{location}: unknown constant set {name:?}")]
	UnknownConstantSet { location: Location, name: String },

	#[error("{location}: unknown namespace {name:?}")]
	UnknownNamespace { location: Location, name: String },

	#[error("{location}: {name:?} is already defined")]
	Redefinition { location: Location, name: String },

	#[error("{location}: {message}")]
	Malformed { location: Location, message: String },

	#[error("{location}: recursive NEEDS of {path:?}")]
	RecursiveNeeds { location: Location, path: PathBuf },
}

impl ParseError {
	pub fn location(&self) -> &Location {
		match self {
			ParseError::Io { location, .. }
			| ParseError::UnknownCommand { location, .. }
			| ParseError::UnexpectedToken { location, .. }
			| ParseError::UnknownType { location, .. }
			| ParseError::UnknownConstantSet { location, .. }
			| ParseError::UnknownNamespace { location, .. }
			| ParseError::Redefinition { location, .. }
			| ParseError::Malformed { location, .. }
			| ParseError::RecursiveNeeds { location, .. } => location,
		}
	}
}

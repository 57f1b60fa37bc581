// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Parsing of X display strings (`[protocol/]hostname:display[.screen]`).
//!
//! Grounded on `parseDisplay`/`generateSocketName`/`calculateTCPport` in
//! `x11common.c`. The original returns a static error string on
//! malformed input; this port keeps the exact same set of rejected
//! shapes and error messages via [`DisplayError`].

use std::fmt;
use std::path::PathBuf;

pub const X_TCP_PORT: u16 = 6000;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Family {
	Inet,
	Unix,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Display {
	pub protocol: String,
	pub hostname: Option<String>,
	pub display: u32,
	pub screen: u32,
	pub family: Family,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum DisplayError {
	#[error("No colon (':') found")]
	NoColon,
	#[error("Garbage after first colon, only digits and a single dot allowed")]
	GarbageAfterColon,
	#[error("Unknown protocol")]
	UnknownProtocol,
}

/// Splits a display string the way Xlib does:
/// `[protocol/] [hostname] : displaynumber [.screennumber]`.
pub fn parse_display(name: &str) -> Result<Display, DisplayError> {
	let (before_colon, protocol) = match name.find('/') {
		Some(slash) => {
			let protocol = if slash != 0 { Some(name[..slash].to_string()) } else { None };
			(&name[slash + 1..], protocol)
		}
		None => (name, None),
	};

	let colon = before_colon.find(':').ok_or(DisplayError::NoColon)?;
	let host_part = &before_colon[..colon];
	let rest = &before_colon[colon + 1..];

	let (hostname, protocol) = if !host_part.is_empty() && host_part != "unix" {
		(Some(host_part.to_string()), protocol.unwrap_or_else(|| "tcp".to_string()))
	} else {
		(None, "local".to_string())
	};

	let mut digits = rest.splitn(2, '.');
	let display_part = digits.next().unwrap_or("");
	let screen_part = digits.next();

	let display: u32 = display_part.parse().map_err(|_| DisplayError::GarbageAfterColon)?;
	let screen: u32 = match screen_part {
		Some(s) => s.parse().map_err(|_| DisplayError::GarbageAfterColon)?,
		None => 0,
	};

	let family = if protocol.eq_ignore_ascii_case("inet") || protocol.eq_ignore_ascii_case("tcp") {
		Family::Inet
	} else if protocol.eq_ignore_ascii_case("unix") || protocol.eq_ignore_ascii_case("local") {
		Family::Unix
	} else {
		return Err(DisplayError::UnknownProtocol);
	};

	Ok(Display {
		protocol,
		hostname,
		display,
		screen,
		family,
	})
}

/// The abstract/filesystem Unix-domain socket path an X server (real or
/// faked) of the given display number listens on.
pub fn socket_name(display: u32) -> PathBuf {
	PathBuf::from(format!("/tmp/.X11-unix/X{display}"))
}

/// The TCP port (host byte order; callers convert to network order
/// themselves) an X server of the given display number listens on.
pub fn tcp_port(display: u32) -> u16 {
	X_TCP_PORT + display as u16
}

impl fmt::Display for Display {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		if let Some(host) = &self.hostname {
			write!(f, "{}/{}:{}.{}", self.protocol, host, self.display, self.screen)
		} else {
			write!(f, "{}:{}.{}", self.protocol, self.display, self.screen)
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_bare_display_number() {
		let d = parse_display(":0").unwrap();
		assert_eq!(d.hostname, None);
		assert_eq!(d.display, 0);
		assert_eq!(d.screen, 0);
		assert_eq!(d.family, Family::Unix);
	}

	#[test]
	fn parses_hostname_and_screen() {
		let d = parse_display("example.org:1.2").unwrap();
		assert_eq!(d.hostname.as_deref(), Some("example.org"));
		assert_eq!(d.display, 1);
		assert_eq!(d.screen, 2);
		assert_eq!(d.family, Family::Inet);
	}

	#[test]
	fn unix_prefixed_hostname_forces_local_family() {
		let d = parse_display("unix:9").unwrap();
		assert_eq!(d.hostname, None);
		assert_eq!(d.family, Family::Unix);
		assert_eq!(d.protocol, "local");
	}

	#[test]
	fn explicit_protocol_prefix_is_honoured() {
		let d = parse_display("tcp/localhost:0").unwrap();
		assert_eq!(d.family, Family::Inet);
		assert_eq!(d.hostname.as_deref(), Some("localhost"));
	}

	#[test]
	fn missing_colon_is_rejected() {
		assert_eq!(parse_display("localhost"), Err(DisplayError::NoColon));
	}

	#[test]
	fn garbage_after_colon_is_rejected() {
		assert_eq!(parse_display(":0x"), Err(DisplayError::GarbageAfterColon));
	}

	#[test]
	fn unknown_protocol_is_rejected() {
		assert_eq!(parse_display("carrierpigeon/host:0"), Err(DisplayError::UnknownProtocol));
	}

	#[test]
	fn socket_name_matches_x11_convention() {
		assert_eq!(socket_name(9), PathBuf::from("/tmp/.X11-unix/X9"));
	}

	#[test]
	fn tcp_port_offsets_from_6000() {
		assert_eq!(tcp_port(9), 6009);
	}
}

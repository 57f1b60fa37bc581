// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Copying `MIT-MAGIC-COOKIE-1` credentials from the real display's
//! authority file to the fake display's, by shelling out to `xauth`.
//!
//! Grounded on `copy_authentication`/`parseauthdata` in `copyauth.c`.
//! The original forks and execs `xauth` three times (`remove`, `list`,
//! `add`) and parses its `list` output by hand; this port keeps the
//! exact same three-command sequence and cookie line format but drives
//! it with `std::process::Command` instead of raw `fork`/`execlp`/`pipe`.

use std::path::Path;
use std::process::{Command, Stdio};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
	#[error("error spawning xauth: {0}")]
	Spawn(#[source] std::io::Error),
	#[error("xauth {command} exited with status {status}")]
	NonZeroExit { command: &'static str, status: i32 },
	#[error("xauth list produced no MIT-MAGIC-COOKIE-1 entry")]
	NoCookieFound,
	#[error("malformed xauth list output: {0}")]
	Malformed(String),
}

fn run(command: &'static str, mut cmd: Command) -> Result<std::process::Output, AuthError> {
	let output = cmd.output().map_err(AuthError::Spawn)?;
	if !output.status.success() {
		return Err(AuthError::NonZeroExit {
			command,
			status: output.status.code().unwrap_or(-1),
		});
	}
	Ok(output)
}

/// Parses one line of `xauth list` output (`display name data`),
/// returning the first `MIT-MAGIC-COOKIE-1` entry found, matching
/// `parseauthdata`'s "first hit wins" behaviour.
fn parse_auth_data(output: &str) -> Result<(String, String), AuthError> {
	for line in output.lines() {
		let mut fields = line.split_whitespace();
		let _display = fields.next();
		let name = fields.next();
		let data = fields.next();
		match (name, data) {
			(Some(name), Some(data)) if name == "MIT-MAGIC-COOKIE-1" => {
				return Ok((name.to_string(), data.to_string()));
			}
			(Some(_), Some(_)) => continue,
			_ => return Err(AuthError::Malformed(line.to_string())),
		}
	}
	Err(AuthError::NoCookieFound)
}

/// Copies the `MIT-MAGIC-COOKIE-1` authorisation entry for `real_display`
/// to `fake_display`, reading from `in_auth_file` (defaulting to
/// `~/.Xauthority`) and writing to `out_auth_file` likewise. A
/// `localhost:N` real display is rewritten to `:N` first, matching the
/// original's handling of remote-looking names that are actually local.
pub fn copy_authentication(
	fake_display: &str,
	real_display: &str,
	in_auth_file: Option<&Path>,
	out_auth_file: Option<&Path>,
) -> Result<(), AuthError> {
	let real_display = real_display.strip_prefix("localhost:").map(|rest| format!(":{rest}")).unwrap_or_else(|| real_display.to_string());

	let mut remove = Command::new("xauth");
	if let Some(out) = out_auth_file {
		remove.arg("-f").arg(out);
	}
	remove.args(["remove", fake_display]).stdin(Stdio::null()).stdout(Stdio::null());
	run("xauth remove", remove)?;

	let mut list = Command::new("xauth");
	if let Some(infile) = in_auth_file {
		list.arg("-f").arg(infile);
	}
	list.args(["list", &real_display]).stdin(Stdio::null());
	let output = run("xauth list", list)?;
	let text = String::from_utf8_lossy(&output.stdout);
	let (name, data) = parse_auth_data(&text)?;

	let mut add = Command::new("xauth");
	if let Some(out) = out_auth_file {
		add.arg("-f").arg(out);
	}
	add.args(["add", fake_display, &name, &data]).stdin(Stdio::null()).stdout(Stdio::null());
	run("xauth add", add)?;

	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_the_first_magic_cookie_line() {
		let output = "example.org:0  MIT-MAGIC-COOKIE-1  deadbeefcafef00d\n";
		let (name, data) = parse_auth_data(output).unwrap();
		assert_eq!(name, "MIT-MAGIC-COOKIE-1");
		assert_eq!(data, "deadbeefcafef00d");
	}

	#[test]
	fn skips_non_cookie_entries() {
		let output = "example.org:0  XDM-AUTHORIZATION-1  0000\nexample.org:0  MIT-MAGIC-COOKIE-1  cafe\n";
		let (_, data) = parse_auth_data(output).unwrap();
		assert_eq!(data, "cafe");
	}

	#[test]
	fn empty_output_is_reported_as_missing() {
		assert!(matches!(parse_auth_data(""), Err(AuthError::NoCookieFound)));
	}
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Launching the optional client command supplied on the tracer's own
//! command line, pointed at the fake display.
//!
//! Grounded on `startClient` in `main.c`: fork, set `$DISPLAY` to the
//! fake display in the child, then `execvp` the given argv. This port
//! replaces the fork/exec pair with `std::process::Command`, which
//! already performs `fork`+`exec` under the hood on Unix and gives back
//! a `Child` handle the event loop can poll instead of installing a
//! `SIGCHLD` handler.

use std::io;
use std::process::{Child, Command};

/// Starts `argv[0] argv[1..]` with `DISPLAY` set to `fake_display`.
/// Returns `Ok(None)` if `command` is empty (no trailing command was
/// given on the tracer's own command line).
pub fn start_client(command: &[String], fake_display: &str) -> io::Result<Option<Child>> {
	let Some((program, args)) = command.split_first() else {
		return Ok(None);
	};
	let child = Command::new(program).args(args).env("DISPLAY", fake_display).spawn()?;
	Ok(Some(child))
}

/// Polls a previously started client without blocking, matching
/// `waitpid(child_pid, &status, WNOHANG)`. Returns the exit status if
/// the child has already terminated.
pub fn try_wait(child: &mut Child) -> io::Result<Option<std::process::ExitStatus>> {
	child.try_wait()
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Binary entry point: parses arguments, loads the protocol tables,
//! sets up the fake display and (optionally) its client, and hands
//! off to the event loop.
//!
//! Grounded on `main` in `main.c`, following the
//! `color_eyre::install()` + `env_logger::init()` + `clap::Parser`
//! wiring `tchajed-rust-nbd`'s binary uses.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use color_eyre::eyre::{eyre, Context, Result};

use xtrace::cli::Args;
use xtrace::host::{auth, child, display, event_loop::EventLoop, listener};
use xtrace::output::SharedSink;

fn main() -> Result<()> {
	color_eyre::install()?;
	env_logger::init();

	let args = Args::parse();
	let config = args.into_config();

	let real_displayname = if !config.real_display.is_empty() {
		config.real_display.clone()
	} else {
		std::env::var("DISPLAY").map_err(|_| eyre!("No X server display to connect to specified"))?
	};
	let fake_displayname = if !config.fake_display.is_empty() {
		config.fake_display.clone()
	} else {
		std::env::var("FAKEDISPLAY").unwrap_or_else(|_| {
			log::warn!("No display name to create specified, trying :9");
			":9".to_string()
		})
	};

	let real_display = display::parse_display(&real_displayname)
		.map_err(|e| eyre!("Parsing '{real_displayname}' failed: {e}"))?;
	let fake_display = display::parse_display(&fake_displayname)
		.map_err(|e| eyre!("Parsing '{fake_displayname}' failed: {e}"))?;

	if config.copy_authentication {
		auth::copy_authentication(
			&fake_displayname,
			&real_displayname,
			config.auth_file.as_deref(),
			config.new_auth_file.as_deref(),
		)
		.map_err(|e| eyre!("{e}"))
		.wrap_err("copying X authority credentials")?;
	}

	let mut search_path: Vec<PathBuf> = config.proto_search_path.clone();
	search_path.push(PathBuf::from(concat!(env!("CARGO_MANIFEST_DIR"), "/proto")));
	let entry_point = search_path
		.iter()
		.find_map(|dir| {
			let candidate = dir.join("all.proto");
			candidate.exists().then_some(candidate)
		})
		.ok_or_else(|| eyre!("could not find all.proto in the search path"))?;
	let protocol = Arc::new(xtrace_proto::load(&entry_point, &search_path).wrap_err("loading protocol description")?);

	let out: Box<dyn Write> = match &config.out_file {
		Some(path) => Box::new(OpenOptions::new().create(true).append(true).open(path).wrap_err("opening output file")?),
		None => Box::new(io::stdout()),
	};
	let sink = SharedSink::new(out);

	let listener = listener::listen_for_clients(&fake_display).wrap_err("listening for clients on the fake display")?;

	let mut event_loop = EventLoop::new(listener, &config);

	if let Some(command) = (!config.command.is_empty()).then_some(&config.command) {
		if let Some(proc) = child::start_client(command, &fake_displayname).wrap_err("starting client command")? {
			event_loop.set_child(proc);
		}
	}

	let exit_code = event_loop.run(
		&real_display,
		protocol,
		sink,
		config.timestamp_mode,
		config.max_shown_list_len,
		config.deny_all_extensions,
	)?;

	std::process::exit(exit_code);
}

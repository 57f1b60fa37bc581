// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The single-threaded event loop: one `poll(2)` call per iteration,
//! fanning out readiness to every live connection's read/write/except
//! handling, same shape as `mainqueue` in `main.c` (there built on
//! `select(2)`; here on `nix::poll`, which scales better past a handful
//! of descriptors and needs no manual `FD_SETSIZE` bookkeeping — the
//! one place this port deliberately diverges from the original's exact
//! syscall choice while keeping its readiness rules).
//!
//! Grounded on `mainqueue`/`acceptConnection`/`doread`/`dowrite` in
//! `main.c`.

use std::io;
use std::os::fd::{BorrowedFd, RawFd};
use std::process::Child;

use nix::poll::{poll, PollFd, PollFlags};

use crate::config::Config;
use crate::connection::{Connection, BUFFER_SIZE};
use crate::output::{Direction, Formatter};

use super::fdqueue::{self, FdQueue};
use super::listener::{connect_to_server, Endpoint, Listener};

/// One accepted client paired with its dialed connection to the real
/// server, plus the protocol-level [`Connection`] tracking what has
/// been seen so far.
struct Slot<W> {
	connection: Connection<W>,
	client: Option<Endpoint>,
	server: Option<Endpoint>,
	client_fdq: FdQueue,
	server_fdq: FdQueue,
}

impl<W: io::Write> Slot<W> {
	fn both_closed(&self) -> bool {
		self.client.is_none() && self.server.is_none()
	}
}

/// Drives the fake display's listener and every accepted connection
/// until either `stop_when_done` fires (no connections left and no
/// child still running) or the spawned child exits with `wait_for_client`
/// unset.
pub struct EventLoop<W> {
	listener: Listener,
	slots: Vec<Slot<W>>,
	next_id: u32,
	allow_sent: u64,
	child: Option<Child>,
	config_interactive: bool,
	config_stop_when_done: bool,
	config_wait_for_client: bool,
	config_buffering: crate::config::OutputBuffering,
	config_print_counts: bool,
	config_print_offsets: bool,
	config_read_write_debug: bool,
}

impl<W: io::Write + Clone> EventLoop<W> {
	pub fn new(listener: Listener, config: &Config) -> Self {
		Self {
			listener,
			slots: Vec::new(),
			next_id: 0,
			allow_sent: 1,
			child: None,
			config_interactive: config.interactive,
			config_stop_when_done: config.stop_when_done,
			config_wait_for_client: config.wait_for_client,
			config_buffering: config.buffering,
			config_print_counts: config.print_counts,
			config_print_offsets: config.print_offsets,
			config_read_write_debug: config.read_write_debug,
		}
	}

	pub fn set_child(&mut self, child: Child) {
		self.child = Some(child);
	}

	/// Runs until a termination condition is reached, returning the
	/// process exit code `main.c`'s `mainqueue` would have returned.
	#[allow(clippy::too_many_arguments)]
	pub fn run(
		&mut self,
		real_display: &super::display::Display,
		protocol: std::sync::Arc<xtrace_proto::Protocol>,
		sink: W,
		timestamp_mode: crate::config::TimestampMode,
		max_shown_list_len: usize,
		deny_extensions: bool,
	) -> io::Result<i32> {
		loop {
			if let Some(child) = &mut self.child {
				if let Some(status) = child.try_wait()? {
					self.child = None;
					if self.slots.is_empty() && !self.config_wait_for_client {
						return Ok(status.code().unwrap_or(128));
					}
				}
			}

			// Build the flat (fd, requested events) plan first, as plain
			// Copy data, so the borrowed `PollFd`s constructed from it can
			// be dropped again before any connection needs mutating.
			let mut targets: Vec<(RawFd, PollFlags)> = Vec::new();
			targets.push((self.listener.as_raw_fd(), PollFlags::POLLIN));
			if self.config_interactive {
				targets.push((0, PollFlags::POLLIN));
			}

			let mut slot_fd_index = Vec::with_capacity(self.slots.len());
			for slot in &self.slots {
				let client_idx = slot.client.as_ref().and_then(|e| {
					(slot.connection.client_buffer_len() < BUFFER_SIZE).then(|| {
						let idx = targets.len();
						targets.push((e.as_raw_fd(), PollFlags::POLLIN));
						idx
					})
				});
				let client_write_idx = slot.client.as_ref().and_then(|e| {
					(slot.connection.server_forward_len() > 0 || slot.server_fdq.len() > 0).then(|| {
						let idx = targets.len();
						targets.push((e.as_raw_fd(), PollFlags::POLLOUT));
						idx
					})
				});
				let server_idx = slot.server.as_ref().and_then(|e| {
					(slot.connection.server_buffer_len() < BUFFER_SIZE).then(|| {
						let idx = targets.len();
						targets.push((e.as_raw_fd(), PollFlags::POLLIN));
						idx
					})
				});
				let server_write_idx = slot.server.as_ref().and_then(|e| {
					let allowed = !self.config_interactive || self.allow_sent > 0;
					(allowed && (slot.connection.client_forward_len() > 0 || slot.client_fdq.len() > 0)).then(|| {
						let idx = targets.len();
						targets.push((e.as_raw_fd(), PollFlags::POLLOUT));
						idx
					})
				});
				slot_fd_index.push((client_idx, client_write_idx, server_idx, server_write_idx));
			}

			let revents: Vec<Option<PollFlags>> = {
				let mut poll_fds: Vec<PollFd> = targets
					.iter()
					.map(|&(fd, events)| PollFd::new(unsafe { BorrowedFd::borrow_raw(fd) }, events))
					.collect();
				poll(&mut poll_fds, -1).map_err(io::Error::from)?;
				poll_fds.iter().map(|pfd| pfd.revents()).collect()
			};

			if self.config_interactive && revents_contain(&revents, 1, PollFlags::POLLIN) {
				let mut buf = [0u8; 201];
				match nix::unistd::read(0, &mut buf) {
					Ok(0) => return Ok(0),
					Ok(n) => {
						let text = String::from_utf8_lossy(&buf[..n]);
						let n: i64 = text.trim().parse().unwrap_or(1);
						self.allow_sent += n.max(1) as u64;
					}
					Err(_) => {}
				}
			}

			let mut finished_indices = Vec::new();
			for (i, slot) in self.slots.iter_mut().enumerate() {
				let (client_idx, client_write_idx, server_idx, server_write_idx) = slot_fd_index[i];

				if let Some(idx) = client_write_idx {
					if revents_contain(&revents, idx, PollFlags::POLLOUT) {
						if let Some(client) = &slot.client {
							let data = slot.connection.server_forward_bytes();
							match fdqueue::send_with_fds(client.as_raw_fd(), data, &mut slot.server_fdq) {
								Ok(written) => {
									slot.connection.consume_server_forward(written);
									slot.connection.log_transfer(Direction::ServerToClient, &format!("wrote {written} bytes"))?;
								}
								Err(_) => {
									slot.connection.log_transfer(Direction::ServerToClient, "error writing to client")?;
									slot.client = None;
								}
							}
						}
					}
				}

				if let Some(client) = &slot.client {
					if let Some(idx) = client_idx {
						if revents_contain(&revents, idx, PollFlags::POLLIN) {
							let mut buf = vec![0u8; BUFFER_SIZE];
							match fdqueue::recv_with_fds(client.as_raw_fd(), &mut buf, &mut slot.client_fdq) {
								Ok(0) => {
									slot.connection.log_transfer(Direction::ClientToServer, "got EOF")?;
									slot.client = None;
								}
								Ok(n) => {
									slot.connection.log_transfer(Direction::ClientToServer, &format!("received {n} bytes"))?;
									slot.connection.feed_client(&buf[..n]);
									slot.connection.parse_client()?;
								}
								Err(_) => {
									slot.connection.log_transfer(Direction::ClientToServer, "error reading from client")?;
									slot.client = None;
								}
							}
						}
					}
				}

				if let Some(idx) = server_write_idx {
					if revents_contain(&revents, idx, PollFlags::POLLOUT) {
						if let Some(server) = &slot.server {
							let data = slot.connection.client_forward_bytes();
							match fdqueue::send_with_fds(server.as_raw_fd(), data, &mut slot.client_fdq) {
								Ok(written) => {
									slot.connection.consume_client_forward(written);
									slot.connection.log_transfer(Direction::ClientToServer, &format!("wrote {written} bytes"))?;
									if self.config_interactive && self.allow_sent > 0 {
										self.allow_sent -= 1;
									}
								}
								Err(_) => {
									slot.connection.log_transfer(Direction::ClientToServer, "error writing to server")?;
									slot.server = None;
								}
							}
						}
					}
				}

				if let Some(server) = &slot.server {
					if let Some(idx) = server_idx {
						if revents_contain(&revents, idx, PollFlags::POLLIN) {
							let mut buf = vec![0u8; BUFFER_SIZE];
							match fdqueue::recv_with_fds(server.as_raw_fd(), &mut buf, &mut slot.server_fdq) {
								Ok(0) => {
									slot.connection.log_transfer(Direction::ServerToClient, "got EOF")?;
									slot.server = None;
								}
								Ok(n) => {
									slot.connection.log_transfer(Direction::ServerToClient, &format!("received {n} bytes"))?;
									slot.connection.feed_server(&buf[..n]);
									slot.connection.parse_server()?;
								}
								Err(_) => {
									slot.connection.log_transfer(Direction::ServerToClient, "error reading from server")?;
									slot.server = None;
								}
							}
						}
					}
				}

				// EOF propagation: once one side is gone and has nothing
				// left to relay, close the other side too.
				if slot.client.is_none() && slot.connection.server_forward_len() == 0 && slot.server_fdq.is_empty() {
					slot.server = None;
				}
				if slot.server.is_none() && slot.connection.client_forward_len() == 0 && slot.client_fdq.is_empty() {
					slot.client = None;
				}

				if slot.both_closed() {
					finished_indices.push(i);
				}
			}

			for i in finished_indices.into_iter().rev() {
				self.slots.remove(i);
			}

			if self.slots.is_empty() && self.config_stop_when_done && self.child.is_none() {
				return Ok(0);
			}

			if revents_contain(&revents, 0, PollFlags::POLLIN) {
				self.accept(real_display, &protocol, sink.clone(), timestamp_mode, max_shown_list_len, deny_extensions)?;
			}
		}
	}

	fn accept(
		&mut self,
		real_display: &super::display::Display,
		protocol: &std::sync::Arc<xtrace_proto::Protocol>,
		sink: W,
		timestamp_mode: crate::config::TimestampMode,
		max_shown_list_len: usize,
		deny_extensions: bool,
	) -> io::Result<()> {
		let (client_endpoint, from) = self.listener.accept()?;
		let server_endpoint = match connect_to_server(real_display) {
			Ok(endpoint) => endpoint,
			Err(err) => {
				log::error!("error connecting to real display for client {from}: {err}");
				return Ok(());
			}
		};
		log::info!("accepted connection from {from}");

		let id = self.next_id;
		self.next_id += 1;
		let formatter = Formatter::with_buffering(sink, timestamp_mode, self.config_buffering);
		let connection = Connection::with_annotations(
			id,
			from,
			protocol.clone(),
			formatter,
			max_shown_list_len,
			deny_extensions,
			self.config_print_counts,
			self.config_print_offsets,
			self.config_read_write_debug,
		);

		self.slots.push(Slot {
			connection,
			client: Some(client_endpoint),
			server: Some(server_endpoint),
			client_fdq: FdQueue::new(),
			server_fdq: FdQueue::new(),
		});
		Ok(())
	}
}

fn revents_contain(revents: &[Option<PollFlags>], index: usize, flag: PollFlags) -> bool {
	revents.get(index).copied().flatten().is_some_and(|r| r.contains(flag))
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Accepting fake-display client connections and dialing the real
//! display, over either a Unix-domain socket or TCP.
//!
//! Grounded on `listenForClients`/`acceptClient` in `x11server.c` and
//! `connectToServer` in `x11client.c`. Both sides of the X11 protocol
//! use ordinary stream sockets; the `std::net`/`std::os::unix::net`
//! listener and stream types the standard library provides are exactly
//! what the original hand-rolls `socket`/`bind`/`listen`/`connect` for,
//! so no extra crate is pulled in for this plumbing.

use std::io;
use std::net::{TcpListener, TcpStream};
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::net::{UnixListener, UnixStream};

use super::display::{socket_name, tcp_port, Display, Family};

/// Either half of a stream socket, abstracted over the two families X11
/// connections travel over.
pub enum Endpoint {
	Tcp(TcpStream),
	Unix(UnixStream),
}

impl Endpoint {
	pub fn as_raw_fd(&self) -> RawFd {
		match self {
			Endpoint::Tcp(s) => s.as_raw_fd(),
			Endpoint::Unix(s) => s.as_raw_fd(),
		}
	}
}

/// The socket the fake display listens on for incoming X clients.
pub enum Listener {
	Tcp(TcpListener),
	Unix(UnixListener),
}

/// Binds and starts listening for client connections to the fake
/// display, mirroring `listenForClients`'s family dispatch (`AF_INET`
/// on TCP port `6000+display`, with `SO_KEEPALIVE` set, or `AF_UNIX` on
/// `/tmp/.X11-unix/X<display>`, unlinking any stale socket file first).
pub fn listen_for_clients(display: &Display) -> io::Result<Listener> {
	match display.family {
		Family::Inet => {
			let listener = TcpListener::bind(("0.0.0.0", tcp_port(display.display)))?;
			Ok(Listener::Tcp(listener))
		}
		Family::Unix => {
			let path = socket_name(display.display);
			let _ = std::fs::remove_file(&path);
			let listener = UnixListener::bind(&path)?;
			Ok(Listener::Unix(listener))
		}
	}
}

impl Listener {
	pub fn as_raw_fd(&self) -> RawFd {
		match self {
			Listener::Tcp(l) => l.as_raw_fd(),
			Listener::Unix(l) => l.as_raw_fd(),
		}
	}

	/// Accepts one pending client connection, returning the new
	/// endpoint and a description of the peer matching `acceptClient`'s
	/// `"host:port"` (TCP) or the abstract-socket path (Unix) forms.
	pub fn accept(&self) -> io::Result<(Endpoint, String)> {
		match self {
			Listener::Tcp(l) => {
				let (stream, addr) = l.accept()?;
				Ok((Endpoint::Tcp(stream), addr.to_string()))
			}
			Listener::Unix(l) => {
				let (stream, addr) = l.accept()?;
				let from = addr
					.as_pathname()
					.map(|p| p.display().to_string())
					.unwrap_or_else(|| "unknown(local)".to_string());
				Ok((Endpoint::Unix(stream), from))
			}
		}
	}
}

/// Dials the real display this tracer forwards traffic to, mirroring
/// `connectToServer`'s family dispatch.
pub fn connect_to_server(display: &Display) -> io::Result<Endpoint> {
	match display.family {
		Family::Inet => {
			let host = display.hostname.as_deref().unwrap_or("localhost");
			let stream = TcpStream::connect((host, tcp_port(display.display)))?;
			stream.set_nodelay(false).ok();
			Ok(Endpoint::Tcp(stream))
		}
		Family::Unix => {
			let path = socket_name(display.display);
			let stream = UnixStream::connect(&path)?;
			Ok(Endpoint::Unix(stream))
		}
	}
}

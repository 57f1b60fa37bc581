// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Ancillary file-descriptor passing (`SCM_RIGHTS`): X clients that send
//! descriptors over their connection (e.g. for `SHM` or DRI) expect them
//! to arrive on the other side unmodified, so the tracer must relay
//! them alongside the raw bytes it already forwards.
//!
//! Grounded on `struct fdqueue` in `xtrace.h` and `doread`/`dowrite` in
//! `main.c`. Both read and write size their `msg_controllen` to the
//! queue's remaining headroom (`FDQUEUE_MAX_FD - fdq->nfd`) rather than
//! its full capacity, so a peer that floods descriptors is truncated
//! (reported as `MSG_CTRUNC`) instead of overflowing the queue.

use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};

use nix::sys::socket::{self, ControlMessage, ControlMessageOwned, MsgFlags};
use nix::sys::uio::IoSliceMut;

/// Mirrors `FDQUEUE_MAX_FD` in `xtrace.h`: the most file descriptors a
/// single relayed message may carry before this side drops the rest.
pub const FDQUEUE_MAX_FD: usize = 16;

/// Descriptors received on one direction of a connection, waiting to be
/// relayed to the other side by the next [`send_with_fds`] call.
#[derive(Default)]
pub struct FdQueue {
	fds: Vec<OwnedFd>,
}

impl FdQueue {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn len(&self) -> usize {
		self.fds.len()
	}

	pub fn is_empty(&self) -> bool {
		self.fds.is_empty()
	}

	/// Remaining headroom before [`FDQUEUE_MAX_FD`], the size `doread`
	/// passes to `recvmsg`'s `msg_controllen` so a sender cannot grow a
	/// queue past the cap in one call.
	pub fn headroom(&self) -> usize {
		FDQUEUE_MAX_FD.saturating_sub(self.fds.len())
	}
}

/// Reads up to `buf.len()` bytes from `fd`, appending any descriptors
/// received alongside them (capped at the queue's current headroom) to
/// `fdq`. Returns `0` on orderly EOF, same as a plain `read`.
pub fn recv_with_fds(fd: RawFd, buf: &mut [u8], fdq: &mut FdQueue) -> io::Result<usize> {
	let headroom = fdq.headroom();
	if headroom == 0 {
		return Ok(socket::recv(fd, buf, MsgFlags::empty())?);
	}

	let mut iov = [IoSliceMut::new(buf)];
	let mut cmsg_space = nix::cmsg_space!([RawFd; FDQUEUE_MAX_FD]);
	let msg = socket::recvmsg::<()>(fd, &mut iov, Some(&mut cmsg_space), MsgFlags::empty())?;

	if msg.flags.contains(MsgFlags::MSG_CTRUNC) || msg.flags.contains(MsgFlags::MSG_TRUNC) {
		return Ok(0);
	}

	for cmsg in msg.cmsgs()? {
		if let ControlMessageOwned::ScmRights(received) = cmsg {
			for raw in received {
				fdq.fds.push(unsafe { OwnedFd::from_raw_fd(raw) });
			}
		}
	}

	Ok(msg.bytes)
}

/// Writes `buf` to `fd`, attaching (and then draining) every descriptor
/// currently queued in `fdq`, mirroring `dowrite`'s "send the whole
/// queue with the next write, then empty it" behaviour.
pub fn send_with_fds(fd: RawFd, buf: &[u8], fdq: &mut FdQueue) -> io::Result<usize> {
	use std::io::IoSlice;

	if fdq.is_empty() {
		return Ok(socket::send(fd, buf, MsgFlags::empty())?);
	}

	let raw_fds: Vec<RawFd> = fdq.fds.iter().map(|f| f.as_raw_fd()).collect();
	let iov = [IoSlice::new(buf)];
	let cmsgs = [ControlMessage::ScmRights(&raw_fds)];
	let written = socket::sendmsg::<()>(fd, &iov, &cmsgs, MsgFlags::empty(), None)?;
	fdq.fds.clear();
	Ok(written)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn headroom_shrinks_as_the_queue_fills() {
		let mut fdq = FdQueue::new();
		assert_eq!(fdq.headroom(), FDQUEUE_MAX_FD);
		// stand in for a received fd without opening one: a duplicate of
		// stdin is as good as any for exercising the bookkeeping.
		let dup = nix::unistd::dup(0).unwrap();
		fdq.fds.push(unsafe { OwnedFd::from_raw_fd(dup) });
		assert_eq!(fdq.len(), 1);
		assert_eq!(fdq.headroom(), FDQUEUE_MAX_FD - 1);
	}
}

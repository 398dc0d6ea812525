//! Async I/O primitives bridging readiness events to task suspension.
//!
//! Each primitive attempts a non-blocking syscall; on would-block it parks
//! the calling task on the fd and yields to the scheduler, resuming when
//! the worker's notifier reports the fd ready again. The fd must be
//! non-blocking and registered with the owning worker (read+write,
//! edge-triggered); the worker guarantees both on arrival. Once woken,
//! the loops below keep the edge-triggered obligation: they drive the fd
//! until it blocks again before yielding anew.
//!
//! None of these functions may be called outside a task running on a
//! worker thread.

use std::{
    fs::File,
    future::Future,
    io,
    os::fd::{AsRawFd, RawFd},
    path::Path,
    pin::Pin,
    task::{Context, Poll},
    time::{Duration, Instant},
};

use tracing::trace;

use crate::{
    runtime::{worker::park_current, WaitKind},
    Error,
};

/// Leaf future: first poll parks the current task in the worker's wait
/// table and suspends; the poll after the wakeup resumes with no value.
struct YieldOn {
    fd: RawFd,
    kind: WaitKind,
    deadline: Option<Instant>,
    armed: bool,
}

impl Future for YieldOn {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<()> {
        if self.armed {
            return Poll::Ready(());
        }
        park_current(self.fd, self.kind, self.deadline);
        self.armed = true;
        Poll::Pending
    }
}

/// Suspends the current task until `fd` is ready for `kind`.
pub async fn yield_on(fd: RawFd, kind: WaitKind) {
    YieldOn {
        fd,
        kind,
        deadline: None,
        armed: false,
    }
    .await
}

async fn yield_until(fd: RawFd, kind: WaitKind, deadline: Option<Instant>) {
    YieldOn {
        fd,
        kind,
        deadline,
        armed: false,
    }
    .await
}

/// Receives into `buf`, suspending on would-block. Returns the byte count;
/// zero means the peer closed its half in an orderly fashion.
///
/// The deadline is fixed at first entry and is not reset by wakeups: a
/// trickling peer cannot extend one call forever.
pub async fn recv_async(fd: RawFd, buf: &mut [u8], timeout: Option<Duration>) -> Result<usize, Error> {
    let deadline = timeout.map(|t| Instant::now() + t);
    loop {
        let n = unsafe { libc::recv(fd, buf.as_mut_ptr().cast(), buf.len(), 0) };
        if n >= 0 {
            return Ok(n as usize);
        }
        let err = io::Error::last_os_error();
        match err.kind() {
            io::ErrorKind::WouldBlock => {
                if deadline.is_some_and(|d| Instant::now() >= d) {
                    return Err(Error::Timeout);
                }
                yield_until(fd, WaitKind::Read, deadline).await;
            }
            io::ErrorKind::Interrupted => {}
            _ => return Err(Error::Io(err)),
        }
    }
}

/// Sends the whole of `buf`, suspending on would-block. A permanent
/// failure aborts the send; the caller must not send on the fd again.
pub async fn send_async(fd: RawFd, buf: &[u8]) -> Result<(), Error> {
    let mut sent = 0;
    while sent < buf.len() {
        let n = unsafe {
            libc::send(
                fd,
                buf.as_ptr().add(sent).cast(),
                buf.len() - sent,
                libc::MSG_NOSIGNAL,
            )
        };
        if n > 0 {
            sent += n as usize;
            continue;
        }
        let err = io::Error::last_os_error();
        match err.kind() {
            io::ErrorKind::WouldBlock => yield_on(fd, WaitKind::Write).await,
            io::ErrorKind::Interrupted => {}
            io::ErrorKind::BrokenPipe | io::ErrorKind::ConnectionReset => {
                return Err(Error::PeerClosed)
            }
            _ => return Err(Error::Io(err)),
        }
    }
    Ok(())
}

/// Streams `len` bytes of the file at `path` to the socket with the
/// kernel's zero-copy primitive, suspending on would-block. The file is
/// opened read-only with a sequential-access hint and closed on all paths.
pub async fn sendfile_async(fd: RawFd, path: &Path, len: u64) -> Result<(), Error> {
    let file = File::open(path)?;
    let file_fd = file.as_raw_fd();
    unsafe {
        libc::posix_fadvise(file_fd, 0, len as libc::off_t, libc::POSIX_FADV_SEQUENTIAL);
    }

    let mut offset: libc::off_t = 0;
    while (offset as u64) < len {
        let remaining = (len - offset as u64) as usize;
        let n = unsafe { libc::sendfile(fd, file_fd, &mut offset, remaining) };
        if n > 0 {
            // The kernel advanced `offset` for us.
            continue;
        }
        if n == 0 {
            // File shrank underneath us; bail rather than spin.
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "file truncated during sendfile",
            )));
        }
        let err = io::Error::last_os_error();
        match err.kind() {
            io::ErrorKind::WouldBlock => yield_on(fd, WaitKind::Write).await,
            io::ErrorKind::Interrupted => {}
            io::ErrorKind::BrokenPipe | io::ErrorKind::ConnectionReset => {
                return Err(Error::PeerClosed)
            }
            _ => return Err(Error::Io(err)),
        }
    }
    Ok(())
}

/// Toggles TCP_CORK so a response's header and body leave as coalesced
/// packets. Failures are ignored beyond a trace: corking is a throughput
/// hint, not a correctness requirement.
pub fn cork(fd: RawFd, enabled: bool) {
    let flag: libc::c_int = enabled.into();
    let rc = unsafe {
        libc::setsockopt(
            fd,
            libc::IPPROTO_TCP,
            libc::TCP_CORK,
            (&flag as *const libc::c_int).cast(),
            std::mem::size_of::<libc::c_int>() as libc::socklen_t,
        )
    };
    if rc != 0 {
        trace!(fd, enabled, "TCP_CORK toggle failed: {}", io::Error::last_os_error());
    }
}

use std::{
    io,
    net::TcpListener,
    os::fd::{IntoRawFd, RawFd},
};

use tracing::{debug, trace, warn};

use crate::runtime::WorkerPool;

/// The listener-thread accept loop.
///
/// Accepted sockets are made non-blocking and their raw fds handed to the
/// workers round-robin over the self-pipes; the index is a local of this
/// loop, touched by no other thread. Transient accept failures are logged
/// and skipped. A self-pipe write failure leaves the pool in an
/// inconsistent state and is fatal.
pub fn run(listener: TcpListener, pool: &mut WorkerPool) -> io::Result<()> {
    assert!(!pool.is_empty(), "dispatching requires at least one worker");
    let workers = pool.len();
    let mut next = 0usize;
    loop {
        let (stream, peer) = match listener.accept() {
            Ok(accepted) => accepted,
            Err(e) if is_transient(&e) => {
                warn!(error = %e, "accept failed, continuing");
                continue;
            }
            Err(e) => return Err(e),
        };
        if let Err(e) = stream.set_nonblocking(true) {
            debug!(error = %e, "set_nonblocking failed, dropping connection");
            continue;
        }
        let fd: RawFd = stream.into_raw_fd();
        next = (next + 1) % workers;
        trace!(fd, peer = %peer, worker = next, "connection dispatched");
        if let Err(e) = pool.worker_mut(next).send_fd(fd) {
            unsafe { libc::close(fd) };
            return Err(e);
        }
    }
}

fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::Interrupted
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::WouldBlock
    )
}

use std::{
    cell::RefCell,
    collections::HashMap,
    io::{self, Read},
    os::fd::{AsRawFd, RawFd},
    rc::Rc,
    task::{Context, Poll},
    time::Instant,
};

use futures_util::task::noop_waker_ref;
use mio::{
    unix::{pipe, SourceFd},
    Events, Interest, Token,
};
use tracing::{debug, error, trace, warn};

use super::task::{Parked, ReadyQueue, TaskFuture, WaitKind};
use crate::config::ReadyPolicy;

/// State a worker shares with the I/O primitives running inside its tasks.
///
/// Reached through the thread-local [`ACTIVE`] handle; never touched from
/// another thread.
pub(crate) struct Shared {
    /// fd -> parked task. At most one task per fd; extraction on wake is
    /// the only way an entry is cleared while the connection lives.
    pub(crate) wait: RefCell<HashMap<RawFd, Parked>>,
    ready: RefCell<ReadyQueue>,
}

thread_local! {
    static ACTIVE: RefCell<Option<Rc<Shared>>> = const { RefCell::new(None) };
}

/// Runs `f` against the current worker's shared state.
///
/// Panics when called off a worker thread: the async primitives are only
/// meaningful inside a task driven by a worker's scheduler.
pub(crate) fn with_active<R>(f: impl FnOnce(&Shared) -> R) -> R {
    ACTIVE.with(|active| {
        let active = active.borrow();
        let shared = active
            .as_ref()
            .expect("async I/O primitive invoked outside a worker task");
        f(shared)
    })
}

/// Parks the currently running task on `fd`. Programmer error if a task is
/// already parked there: connections are single-task and a task waits on
/// one direction at a time.
pub(crate) fn park_current(fd: RawFd, kind: WaitKind, deadline: Option<Instant>) {
    with_active(|shared| {
        let previous = shared
            .wait
            .borrow_mut()
            .insert(fd, Parked { kind, deadline });
        debug_assert!(
            previous.is_none(),
            "second task parked on fd {fd} ({kind:?})"
        );
    });
}

/// One worker: an OS thread owning a readiness notifier, a self-pipe, the
/// fd->task wait table, a ready queue and the task table.
///
/// The worker observes three event classes: new-fd arrival over the
/// self-pipe, client fd readiness (readable/writable) and client fd
/// peer-closed. Readiness and peer-closed both translate into a wakeup of
/// whatever task is parked on the fd; the task itself observes EOF or an
/// I/O error and exits, which is the only path that tears a connection
/// down.
pub(crate) struct Worker<H> {
    id: usize,
    poll: mio::Poll,
    events: Events,
    pipe: pipe::Receiver,
    pipe_token: Token,
    pipe_closed: bool,
    /// Self-pipe bytes not yet forming a whole fd value.
    pending: Vec<u8>,
    shared: Rc<Shared>,
    tasks: HashMap<RawFd, TaskFuture>,
    handler: H,
}

impl<H> Worker<H>
where
    H: Fn(RawFd) -> TaskFuture,
{
    pub(crate) fn new(
        id: usize,
        mut pipe: pipe::Receiver,
        policy: ReadyPolicy,
        handler: H,
    ) -> io::Result<Self> {
        let poll = mio::Poll::new()?;
        let pipe_token = Token(pipe.as_raw_fd() as usize);
        poll.registry()
            .register(&mut pipe, pipe_token, Interest::READABLE)?;
        Ok(Self {
            id,
            poll,
            events: Events::with_capacity(1024),
            pipe,
            pipe_token,
            pipe_closed: false,
            pending: Vec::new(),
            shared: Rc::new(Shared {
                wait: RefCell::new(HashMap::new()),
                ready: RefCell::new(ReadyQueue::new(policy)),
            }),
            tasks: HashMap::new(),
            handler,
        })
    }

    /// The worker event loop. Returns when the dispatcher side of the
    /// self-pipe is gone and the last connection has drained, or on an
    /// unrecoverable notifier failure.
    pub(crate) fn run(mut self) {
        ACTIVE.with(|active| *active.borrow_mut() = Some(self.shared.clone()));
        debug!(worker = self.id, "worker online");
        loop {
            match self.turn() {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    error!(worker = self.id, error = %e, "notifier wait failed, terminating worker");
                    break;
                }
            }
        }
        ACTIVE.with(|active| active.borrow_mut().take());
        debug!(worker = self.id, "worker offline");
    }

    fn turn(&mut self) -> io::Result<bool> {
        if self.pipe_closed && self.tasks.is_empty() {
            return Ok(false);
        }

        let timeout = self
            .next_deadline()
            .map(|deadline| deadline.saturating_duration_since(Instant::now()));
        self.poll.poll(&mut self.events, timeout)?;

        let mut arrivals = false;
        let mut readiness = Vec::new();
        for event in self.events.iter() {
            if event.token() == self.pipe_token {
                arrivals = true;
            } else {
                readiness.push(event.token().0 as RawFd);
            }
        }

        let mut woken = Vec::new();
        if arrivals {
            self.drain_arrivals(&mut woken)?;
        }
        for fd in readiness {
            self.wake(fd, &mut woken);
        }
        self.sweep_deadlines(&mut woken);

        self.shared.ready.borrow_mut().push_batch(woken);
        self.schedule();
        Ok(true)
    }

    /// Batch-drains accepted fds off the self-pipe, registering each with
    /// the notifier and creating its task. A partial read leaves the
    /// remainder in `pending` for the next drain.
    fn drain_arrivals(&mut self, woken: &mut Vec<RawFd>) -> io::Result<()> {
        let mut buf = [0u8; 512];
        loop {
            match self.pipe.read(&mut buf) {
                Ok(0) => {
                    self.pipe_closed = true;
                    debug!(worker = self.id, "dispatcher hung up");
                    break;
                }
                Ok(n) => {
                    self.pending.extend_from_slice(&buf[..n]);
                    for fd in drain_fd_values(&mut self.pending) {
                        self.admit(fd, woken);
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    fn admit(&mut self, fd: RawFd, woken: &mut Vec<RawFd>) {
        let registered = self.poll.registry().register(
            &mut SourceFd(&fd),
            Token(fd as usize),
            Interest::READABLE | Interest::WRITABLE,
        );
        if let Err(e) = registered {
            warn!(worker = self.id, fd, error = %e, "fd registration failed, dropping connection");
            unsafe { libc::close(fd) };
            return;
        }
        trace!(worker = self.id, fd, "connection admitted");
        self.tasks.insert(fd, (self.handler)(fd));
        woken.push(fd);
    }

    /// Wakes whatever task is parked on `fd`. A wakeup that finds no parked
    /// task is a no-op: edge-triggered registration covers both directions,
    /// so spurious writable events are expected.
    fn wake(&mut self, fd: RawFd, woken: &mut Vec<RawFd>) {
        if let Some(parked) = self.shared.wait.borrow_mut().remove(&fd) {
            trace!(worker = self.id, fd, kind = ?parked.kind, "task woken");
            woken.push(fd);
        }
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.shared
            .wait
            .borrow()
            .values()
            .filter_map(|parked| parked.deadline)
            .min()
    }

    fn sweep_deadlines(&mut self, woken: &mut Vec<RawFd>) {
        let now = Instant::now();
        let expired: Vec<RawFd> = self
            .shared
            .wait
            .borrow()
            .iter()
            .filter(|(_, parked)| parked.deadline.is_some_and(|d| d <= now))
            .map(|(fd, _)| *fd)
            .collect();
        for fd in expired {
            self.wake(fd, woken);
        }
    }

    /// Pops tasks off the ready queue and polls each until the queue is
    /// empty. A finished task is destroyed here, the only destruction
    /// site; a pending task has parked itself and goes back in the table.
    fn schedule(&mut self) {
        let mut cx = Context::from_waker(noop_waker_ref());
        loop {
            let next = self.shared.ready.borrow_mut().pop();
            let Some(fd) = next else { break };
            let Some(mut task) = self.tasks.remove(&fd) else {
                continue;
            };
            match task.as_mut().poll(&mut cx) {
                Poll::Ready(()) => self.destroy(fd),
                Poll::Pending => {
                    debug_assert!(
                        self.shared.wait.borrow().contains_key(&fd),
                        "task on fd {fd} suspended without parking"
                    );
                    self.tasks.insert(fd, task);
                }
            }
        }
    }

    /// Close sequence: deregister from the notifier, shut the write side
    /// down for orderly teardown, then close. Deregistration strictly
    /// precedes close so no readiness event can fire for a dead fd.
    fn destroy(&mut self, fd: RawFd) {
        self.shared.wait.borrow_mut().remove(&fd);
        if let Err(e) = self.poll.registry().deregister(&mut SourceFd(&fd)) {
            debug!(worker = self.id, fd, error = %e, "deregister failed");
        }
        unsafe {
            libc::shutdown(fd, libc::SHUT_WR);
            libc::close(fd);
        }
        trace!(worker = self.id, fd, "connection closed");
    }
}

/// Splits whole fd values off the front of `pending`, keeping any
/// truncated tail for the next self-pipe drain.
fn drain_fd_values(pending: &mut Vec<u8>) -> Vec<RawFd> {
    const FD_SIZE: usize = std::mem::size_of::<RawFd>();
    let whole = pending.len() / FD_SIZE;
    let mut fds = Vec::with_capacity(whole);
    for chunk in pending[..whole * FD_SIZE].chunks_exact(FD_SIZE) {
        fds.push(RawFd::from_ne_bytes(chunk.try_into().unwrap()));
    }
    pending.drain(..whole * FD_SIZE);
    fds
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fd_values_survive_truncated_pipe_reads() {
        let mut pending = Vec::new();
        pending.extend_from_slice(&7i32.to_ne_bytes());
        pending.extend_from_slice(&9i32.to_ne_bytes()[..2]);
        assert_eq!(drain_fd_values(&mut pending), vec![7]);
        assert_eq!(pending.len(), 2);

        pending.extend_from_slice(&9i32.to_ne_bytes()[2..]);
        assert_eq!(drain_fd_values(&mut pending), vec![9]);
        assert!(pending.is_empty());
    }

    #[test]
    fn empty_drain_yields_nothing() {
        let mut pending = Vec::new();
        assert!(drain_fd_values(&mut pending).is_empty());
    }
}

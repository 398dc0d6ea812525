//! The cooperative task runtime and the worker pool that hosts it.
//!
//! Each worker is one OS thread running a single-threaded event loop:
//! block on the readiness notifier, translate events into task wakeups,
//! then drain the ready queue. Tasks never migrate between workers and
//! per-worker state is never shared, so no locks are involved anywhere on
//! the connection path.

use std::{
    io::{self, Write},
    os::fd::RawFd,
    thread::JoinHandle,
};

use mio::unix::pipe;
use tracing::{error, info};

use crate::config::RuntimeConfig;

mod task;
pub(crate) mod worker;

pub use task::{TaskFuture, WaitKind};

/// The dispatcher-side handle to one worker: the self-pipe write end plus
/// the thread handle.
pub struct WorkerHandle {
    sender: pipe::Sender,
    thread: JoinHandle<()>,
}

impl WorkerHandle {
    /// Hands an accepted fd to this worker. One blocking 4-byte write,
    /// atomic with respect to the reader.
    pub(crate) fn send_fd(&mut self, fd: RawFd) -> io::Result<()> {
        self.sender.write_all(&fd.to_ne_bytes())
    }
}

/// The fixed set of workers, created once at startup.
///
/// `factory` runs once on each worker thread and yields that worker's
/// connection handler: a function from an accepted fd to the task future
/// that will drive the connection. The handler itself need not be `Send`;
/// only the factory crosses threads.
pub struct WorkerPool {
    workers: Vec<WorkerHandle>,
}

impl WorkerPool {
    pub fn spawn<F, H>(config: &RuntimeConfig, factory: F) -> io::Result<Self>
    where
        F: Fn() -> H + Clone + Send + 'static,
        H: Fn(RawFd) -> TaskFuture + 'static,
    {
        assert!(config.workers > 0, "worker pool must not be empty");
        let mut workers = Vec::with_capacity(config.workers);
        for id in 0..config.workers {
            let (sender, receiver) = pipe::new()?;
            // The dispatcher blocks rather than drops when a pipe is full.
            sender.set_nonblocking(false)?;
            let policy = config.ready_policy;
            let factory = factory.clone();
            let thread = std::thread::Builder::new()
                .name(format!("shoal-worker-{id}"))
                .spawn(move || {
                    let handler = factory();
                    match worker::Worker::new(id, receiver, policy, handler) {
                        Ok(worker) => worker.run(),
                        Err(e) => error!(worker = id, error = %e, "worker startup failed"),
                    }
                })?;
            workers.push(WorkerHandle { sender, thread });
        }
        info!(workers = workers.len(), "worker pool started");
        Ok(Self { workers })
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    pub(crate) fn worker_mut(&mut self, index: usize) -> &mut WorkerHandle {
        &mut self.workers[index]
    }

    /// Drops the self-pipe senders and waits for every worker to drain its
    /// connections and exit.
    pub fn join(self) {
        let (senders, threads): (Vec<_>, Vec<_>) = self
            .workers
            .into_iter()
            .map(|w| (w.sender, w.thread))
            .unzip();
        drop(senders);
        for thread in threads {
            let _ = thread.join();
        }
    }
}

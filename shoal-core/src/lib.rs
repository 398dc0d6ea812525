//! # Shoal Connection Engine
//!
//! A shared-nothing, thread-per-worker engine for driving tens of thousands
//! of concurrent TCP connections. Each worker couples an edge-triggered
//! readiness notifier with a cooperative task scheduler: every live
//! connection is owned by one lightweight task that appears to perform
//! blocking I/O but in fact suspends on readiness events.
//!
//! ## Key Components
//!
//! - [`listener::ListenerBuilder`]: builds the bound TCP listening socket
//!   (dual-stack, address reuse, configurable backlog).
//! - [`dispatcher`]: the listener-thread accept loop; hands accepted fds to
//!   workers round-robin over their self-pipes.
//! - [`runtime::WorkerPool`]: spawns the fixed worker set; each worker runs
//!   its own readiness loop and scheduler with no cross-worker sharing.
//! - [`io`]: the async primitives ([`io::recv_async`], [`io::send_async`],
//!   [`io::sendfile_async`]) that bridge readiness to task suspension.
//!
//! Cross-thread communication happens exclusively through each worker's
//! self-pipe; all per-worker state is single-threaded and lock-free.

pub mod config;
pub mod dispatcher;
pub mod io;
pub mod listener;
pub mod runtime;

mod error;

pub use error::Error;

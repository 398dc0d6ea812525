use std::{io, os::fd::RawFd, rc::Rc};

use shoal_core::runtime::{TaskFuture, WorkerPool};
use shoal_services::http::{
    handlers::{StaticFiles, UriDecode},
    HttpCoreService, HttpTimeout,
};

use crate::config::Config;

/// Assembles the handler chain and spawns the worker pool.
///
/// The chain is built once per worker thread: handlers are cheap,
/// immutable and shared by every connection that worker owns.
pub fn spawn_pool(config: &Config) -> io::Result<WorkerPool> {
    let server = config.server.clone();
    let timeout = HttpTimeout::from_millis(
        config.runtime.read_timeout_ms,
        config.runtime.keepalive_timeout_ms,
    );
    WorkerPool::spawn(&config.runtime, move || {
        let chain = UriDecode::new(StaticFiles::new(
            server.root.clone(),
            server.index_file.clone(),
            server.spa_fallback,
        ));
        let service = Rc::new(HttpCoreService::new(chain, timeout));
        move |fd: RawFd| -> TaskFuture { Box::pin(service.clone().serve(fd)) }
    })
}

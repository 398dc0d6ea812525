use std::io;

/// Errors surfaced by the async I/O primitives to the owning task.
///
/// Transient conditions (would-block, interrupted syscalls) are handled
/// inside the primitives by yielding or retrying and never reach callers.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The per-call receive deadline elapsed before any byte arrived.
    #[error("receive timed out")]
    Timeout,
    /// The peer tore the connection down while we were sending.
    #[error("peer closed the connection")]
    PeerClosed,
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Whether the error terminates the connection without any chance of
    /// writing a response.
    pub fn is_disconnect(&self) -> bool {
        matches!(self, Error::PeerClosed)
    }
}

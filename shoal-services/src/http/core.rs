use std::{fmt::Display, os::fd::RawFd, rc::Rc, time::Duration};

use bytes::BytesMut;
use http::{header, Method, StatusCode};
use shoal_core::{io::recv_async, Error};
use tracing::{debug, warn};

use super::{
    encoder::write_response,
    generate_response, is_conn_keepalive,
    parser::{self, ParsedRequest, Verdict},
    HttpHandler,
};

const READ_CHUNK: usize = 8 * 1024;

/// Hard ceiling on a request head; a head still partial past this point
/// is treated as malformed rather than buffered without bound.
const MAX_HEAD_BYTES: usize = 64 * 1024;

/// The two connection timeouts, deliberately separate: `keepalive_idle`
/// bounds the quiet gap before a request's first byte, `read` bounds each
/// receive once a request is in flight.
#[derive(Debug, Clone, Copy)]
pub struct HttpTimeout {
    pub read: Duration,
    pub keepalive_idle: Duration,
}

impl HttpTimeout {
    pub fn from_millis(read_ms: u64, keepalive_idle_ms: u64) -> Self {
        Self {
            read: Duration::from_millis(read_ms),
            keepalive_idle: Duration::from_millis(keepalive_idle_ms),
        }
    }
}

enum ReadOutcome {
    Request(ParsedRequest),
    /// Peer went away (EOF, timeout, reset) before a full head arrived.
    Hangup,
    Malformed,
}

/// The per-connection service: drives the task entry loop over one fd.
///
/// One instance is shared by every connection of a worker; per-connection
/// state lives on the task.
pub struct HttpCoreService<H> {
    handler_chain: H,
    timeout: HttpTimeout,
}

impl<H> HttpCoreService<H>
where
    H: HttpHandler,
    H::Error: Display,
{
    pub fn new(handler_chain: H, timeout: HttpTimeout) -> Self {
        Self {
            handler_chain,
            timeout,
        }
    }

    /// The task entry function. Runs the keep-alive loop to completion;
    /// when it returns, the engine tears the connection down.
    pub async fn serve(self: Rc<Self>, fd: RawFd) {
        let mut buf = BytesMut::with_capacity(READ_CHUNK);
        let mut keep_alive = true;

        while keep_alive {
            let parsed = match self.read_request(fd, &mut buf).await {
                ReadOutcome::Request(parsed) => parsed,
                ReadOutcome::Hangup => break,
                ReadOutcome::Malformed => {
                    let _ = write_response(
                        fd,
                        generate_response(StatusCode::BAD_REQUEST),
                        false,
                        false,
                    )
                    .await;
                    break;
                }
            };

            let _ = buf.split_to(parsed.consumed);
            if let Err(e) = self.drain_body(fd, &mut buf, parsed.body_len).await {
                if !e.is_disconnect() {
                    debug!(fd, error = %e, "request body read failed");
                }
                break;
            }

            let request = parsed.request;
            if request.headers().contains_key(header::TRANSFER_ENCODING) {
                let _ = write_response(
                    fd,
                    generate_response(StatusCode::NOT_IMPLEMENTED),
                    false,
                    false,
                )
                .await;
                break;
            }

            let reuse = is_conn_keepalive(request.headers(), request.version());
            let head_only = request.method() == &Method::HEAD;

            match self.handler_chain.handle(request).await {
                Ok((response, cont)) => {
                    keep_alive = reuse && cont;
                    if let Err(e) = write_response(fd, response, keep_alive, head_only).await {
                        if e.is_disconnect() {
                            debug!(fd, "peer closed mid-response");
                        } else {
                            warn!(fd, error = %e, "response write failed");
                        }
                        break;
                    }
                }
                Err(e) => {
                    warn!(fd, error = %e, "handler chain failed");
                    let _ = write_response(
                        fd,
                        generate_response(StatusCode::INTERNAL_SERVER_ERROR),
                        false,
                        head_only,
                    )
                    .await;
                    break;
                }
            }
        }
    }

    /// Inner read loop: parse what is buffered, receive more on `Partial`.
    /// The idle timeout applies while the buffer holds no bytes of the
    /// next request; the read timeout applies mid-head.
    async fn read_request(&self, fd: RawFd, buf: &mut BytesMut) -> ReadOutcome {
        loop {
            if !buf.is_empty() {
                match parser::parse(buf) {
                    Verdict::Complete(parsed) => return ReadOutcome::Request(parsed),
                    Verdict::Malformed => return ReadOutcome::Malformed,
                    Verdict::Partial if buf.len() > MAX_HEAD_BYTES => {
                        return ReadOutcome::Malformed
                    }
                    Verdict::Partial => {}
                }
            }

            let timeout = if buf.is_empty() {
                self.timeout.keepalive_idle
            } else {
                self.timeout.read
            };
            let mut chunk = [0u8; READ_CHUNK];
            match recv_async(fd, &mut chunk, Some(timeout)).await {
                Ok(0) => {
                    if !buf.is_empty() {
                        debug!(fd, "peer closed mid-request");
                    }
                    return ReadOutcome::Hangup;
                }
                Ok(n) => buf.extend_from_slice(&chunk[..n]),
                Err(Error::Timeout) => {
                    debug!(fd, "connection timed out");
                    return ReadOutcome::Hangup;
                }
                Err(e) => {
                    debug!(fd, error = %e, "receive failed");
                    return ReadOutcome::Hangup;
                }
            }
        }
    }

    /// Discards the declared request body so keep-alive framing stays
    /// intact. Bodies are not routed anywhere: this server serves files.
    async fn drain_body(&self, fd: RawFd, buf: &mut BytesMut, body_len: u64) -> Result<(), Error> {
        let buffered = buf.len().min(body_len as usize);
        let _ = buf.split_to(buffered);
        let mut remaining = body_len - buffered as u64;
        let mut chunk = [0u8; READ_CHUNK];
        while remaining > 0 {
            let want = chunk.len().min(remaining as usize);
            match recv_async(fd, &mut chunk[..want], Some(self.timeout.read)).await? {
                0 => return Err(Error::PeerClosed),
                n => remaining -= n as u64,
            }
        }
        Ok(())
    }
}

use std::os::fd::RawFd;

use bytes::{BufMut, BytesMut};
use http::{header, Response};
use shoal_core::{
    io::{cork, send_async, sendfile_async},
    Error,
};

use super::{Body, CLOSE, KEEPALIVE};

/// Serializes the status line and headers. `Content-Length` and
/// `Connection` are owned by the encoder; any copies a handler set are
/// skipped so they appear exactly once.
pub(crate) fn build_head(response: &Response<Body>, keep_alive: bool) -> BytesMut {
    let mut head = BytesMut::with_capacity(256);
    let status = response.status();
    head.put_slice(b"HTTP/1.1 ");
    head.put_slice(status.as_str().as_bytes());
    head.put_u8(b' ');
    head.put_slice(status.canonical_reason().unwrap_or("Unknown").as_bytes());
    head.put_slice(b"\r\n");

    for (name, value) in response.headers() {
        if name == &header::CONTENT_LENGTH || name == &header::CONNECTION {
            continue;
        }
        head.put_slice(name.as_str().as_bytes());
        head.put_slice(b": ");
        head.put_slice(value.as_bytes());
        head.put_slice(b"\r\n");
    }

    head.put_slice(b"Content-Length: ");
    head.put_slice(response.body().content_length().to_string().as_bytes());
    head.put_slice(b"\r\nConnection: ");
    head.put_slice(if keep_alive { KEEPALIVE } else { CLOSE }.as_bytes());
    head.put_slice(b"\r\n\r\n");
    head
}

/// Writes a full response. The header+body burst is wrapped in TCP_CORK so
/// small heads coalesce with their bodies on the wire. `head_only`
/// suppresses the body for HEAD requests while keeping the real
/// `Content-Length`.
pub async fn write_response(
    fd: RawFd,
    response: Response<Body>,
    keep_alive: bool,
    head_only: bool,
) -> Result<(), Error> {
    let head = build_head(&response, keep_alive);
    cork(fd, true);
    let result = async {
        send_async(fd, &head).await?;
        if !head_only {
            match response.into_body() {
                Body::Empty => {}
                Body::Bytes(bytes) => send_async(fd, &bytes).await?,
                Body::File { path, len } => sendfile_async(fd, &path, len).await?,
            }
        }
        Ok(())
    }
    .await;
    cork(fd, false);
    result
}

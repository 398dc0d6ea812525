use std::{future::Future, path::PathBuf};

use bytes::Bytes;
use http::{HeaderMap, Request, Response, StatusCode, Version};

pub use self::core::{HttpCoreService, HttpTimeout};

pub mod core;
pub mod encoder;
pub mod handlers;
pub mod parser;

pub(crate) const CLOSE: &str = "close";
pub(crate) const KEEPALIVE: &str = "keep-alive";

/// Response body as produced by the handler chain. File bodies are served
/// with the engine's zero-copy send; generated bodies stay in memory.
#[derive(Debug)]
pub enum Body {
    Empty,
    Bytes(Bytes),
    File { path: PathBuf, len: u64 },
}

impl Body {
    /// Bytes the encoder will put on the wire, and therefore the value of
    /// the `Content-Length` header.
    pub fn content_length(&self) -> u64 {
        match self {
            Body::Empty => 0,
            Body::Bytes(bytes) => bytes.len() as u64,
            Body::File { len, .. } => *len,
        }
    }
}

/// A response plus the handler's verdict on whether the connection may
/// serve another request afterwards.
pub type ResponseWithContinue = (Response<Body>, bool);

/// A link in the handler chain. Wrapping handlers transform the request
/// and delegate inward; the leaf produces the response.
pub trait HttpHandler {
    type Error;

    fn handle(
        &self,
        request: Request<()>,
    ) -> impl Future<Output = Result<ResponseWithContinue, Self::Error>>;
}

/// HTTP/1.1 defaults to keep-alive unless the client says `close`;
/// HTTP/1.0 defaults to close unless the client says `keep-alive`.
pub fn is_conn_keepalive(headers: &HeaderMap, version: Version) -> bool {
    let connection = headers.get(http::header::CONNECTION);
    match (version, connection) {
        (Version::HTTP_10, Some(value)) => value.as_bytes().eq_ignore_ascii_case(KEEPALIVE.as_bytes()),
        (Version::HTTP_10, None) => false,
        (_, Some(value)) => !value.as_bytes().eq_ignore_ascii_case(CLOSE.as_bytes()),
        (_, None) => true,
    }
}

/// A bare response for error statuses: status line, zero-length body.
pub fn generate_response(status: StatusCode) -> Response<Body> {
    Response::builder().status(status).body(Body::Empty).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::header::CONNECTION;

    fn headers(value: Option<&str>) -> HeaderMap {
        let mut map = HeaderMap::new();
        if let Some(value) = value {
            map.insert(CONNECTION, value.parse().unwrap());
        }
        map
    }

    #[test]
    fn http11_defaults_to_keepalive() {
        assert!(is_conn_keepalive(&headers(None), Version::HTTP_11));
        assert!(is_conn_keepalive(&headers(Some("keep-alive")), Version::HTTP_11));
        assert!(!is_conn_keepalive(&headers(Some("close")), Version::HTTP_11));
        assert!(!is_conn_keepalive(&headers(Some("Close")), Version::HTTP_11));
    }

    #[test]
    fn http10_defaults_to_close() {
        assert!(!is_conn_keepalive(&headers(None), Version::HTTP_10));
        assert!(is_conn_keepalive(&headers(Some("Keep-Alive")), Version::HTTP_10));
    }
}

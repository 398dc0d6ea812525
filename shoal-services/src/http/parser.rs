use http::{header, Method, Request, Uri, Version};

/// Header-count ceiling; one past it is a malformed request.
pub const MAX_HEADERS: usize = 100;

/// Verdict over the bytes buffered so far. `Partial` asks the caller to
/// read more; `Malformed` is terminal and warrants a 400.
#[derive(Debug)]
pub enum Verdict {
    Partial,
    Complete(ParsedRequest),
    Malformed,
}

#[derive(Debug)]
pub struct ParsedRequest {
    pub request: Request<()>,
    /// Bytes of request line plus headers consumed from the buffer.
    pub consumed: usize,
    /// Declared `Content-Length`, still sitting in the buffer or on the
    /// socket after `consumed`.
    pub body_len: u64,
}

/// Parses one request head out of `buf`. Stateless: a partial head is
/// simply re-scanned once more bytes arrive, which keeps the hot path
/// allocation-free until a request actually completes.
///
/// Never blocks and never touches the engine's async primitives.
pub fn parse(buf: &[u8]) -> Verdict {
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut parsed = httparse::Request::new(&mut headers);
    let consumed = match parsed.parse(buf) {
        Ok(httparse::Status::Complete(consumed)) => consumed,
        Ok(httparse::Status::Partial) => return Verdict::Partial,
        Err(_) => return Verdict::Malformed,
    };

    // On `Complete` the request-line pieces are all present.
    let Some(method) = parsed.method.and_then(|m| Method::from_bytes(m.as_bytes()).ok()) else {
        return Verdict::Malformed;
    };
    let version = match parsed.version {
        Some(0) => Version::HTTP_10,
        Some(1) => Version::HTTP_11,
        _ => return Verdict::Malformed,
    };
    let Ok(uri) = parsed.path.unwrap_or_default().parse::<Uri>() else {
        return Verdict::Malformed;
    };

    let mut builder = Request::builder().method(method).uri(uri).version(version);
    for header in parsed.headers.iter() {
        builder = builder.header(header.name, header.value);
    }
    let Ok(request) = builder.body(()) else {
        return Verdict::Malformed;
    };

    let body_len = match content_length(&request) {
        Ok(len) => len,
        Err(()) => return Verdict::Malformed,
    };

    Verdict::Complete(ParsedRequest {
        request,
        consumed,
        body_len,
    })
}

fn content_length(request: &Request<()>) -> Result<u64, ()> {
    match request.headers().get(header::CONTENT_LENGTH) {
        None => Ok(0),
        Some(value) => value
            .to_str()
            .map_err(|_| ())?
            .trim()
            .parse::<u64>()
            .map_err(|_| ()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete(buf: &[u8]) -> ParsedRequest {
        match parse(buf) {
            Verdict::Complete(parsed) => parsed,
            other => panic!("expected Complete, got {other:?}"),
        }
    }

    #[test]
    fn parses_a_simple_get() {
        let raw = b"GET /index.html HTTP/1.1\r\nHost: x\r\n\r\n";
        let parsed = complete(raw);
        assert_eq!(parsed.request.method(), Method::GET);
        assert_eq!(parsed.request.uri().path(), "/index.html");
        assert_eq!(parsed.request.version(), Version::HTTP_11);
        assert_eq!(parsed.request.headers().get("host").unwrap(), "x");
        assert_eq!(parsed.consumed, raw.len());
        assert_eq!(parsed.body_len, 0);
    }

    #[test]
    fn incomplete_head_is_partial() {
        assert!(matches!(parse(b"GET / HTTP/1.1\r\nHos"), Verdict::Partial));
        assert!(matches!(parse(b""), Verdict::Partial));
    }

    #[test]
    fn header_lookup_is_case_insensitive() {
        let parsed = complete(b"GET / HTTP/1.1\r\nX-Custom-Foo: Bar\r\n\r\n");
        assert_eq!(parsed.request.headers().get("x-custom-foo").unwrap(), "Bar");
    }

    #[test]
    fn missing_request_line_space_is_malformed() {
        assert!(matches!(parse(b"GET/index.html HTTP/1.1\r\n\r\n"), Verdict::Malformed));
    }

    #[test]
    fn header_without_colon_is_malformed() {
        assert!(matches!(
            parse(b"GET / HTTP/1.1\r\nHost x\r\n\r\n"),
            Verdict::Malformed
        ));
    }

    #[test]
    fn unknown_version_is_malformed() {
        assert!(matches!(parse(b"GET / HTTP/2.2\r\n\r\n"), Verdict::Malformed));
    }

    #[test]
    fn one_header_over_the_limit_is_malformed() {
        let mut raw = b"GET / HTTP/1.1\r\n".to_vec();
        for i in 0..MAX_HEADERS + 1 {
            raw.extend_from_slice(format!("X-Filler-{i}: {i}\r\n").as_bytes());
        }
        raw.extend_from_slice(b"\r\n");
        assert!(matches!(parse(&raw), Verdict::Malformed));
    }

    #[test]
    fn exactly_at_the_header_limit_still_parses() {
        let mut raw = b"GET / HTTP/1.1\r\n".to_vec();
        for i in 0..MAX_HEADERS {
            raw.extend_from_slice(format!("X-Filler-{i}: {i}\r\n").as_bytes());
        }
        raw.extend_from_slice(b"\r\n");
        assert!(matches!(parse(&raw), Verdict::Complete(_)));
    }

    #[test]
    fn content_length_is_exposed_as_the_body_bound() {
        let parsed = complete(b"POST /submit HTTP/1.1\r\nContent-Length: 11\r\n\r\n");
        assert_eq!(parsed.body_len, 11);
    }

    #[test]
    fn garbage_content_length_is_malformed() {
        assert!(matches!(
            parse(b"POST / HTTP/1.1\r\nContent-Length: eleven\r\n\r\n"),
            Verdict::Malformed
        ));
    }
}

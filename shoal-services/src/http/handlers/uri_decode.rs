use http::{Request, StatusCode};
use percent_encoding::percent_decode_str;

use crate::http::{generate_response, HttpHandler, ResponseWithContinue};

/// The percent-decoded request path, stashed as a request extension for
/// handlers further down the chain. The raw `Uri` stays untouched so
/// redirects can echo exactly what the client sent.
#[derive(Debug, Clone)]
pub struct DecodedPath(pub String);

/// UriDecode decodes the request path and rejects traversal attempts
/// before anything touches the filesystem.
pub struct UriDecode<H> {
    inner: H,
}

impl<H> UriDecode<H> {
    pub fn new(inner: H) -> Self {
        Self { inner }
    }
}

impl<H> HttpHandler for UriDecode<H>
where
    H: HttpHandler,
{
    type Error = H::Error;

    async fn handle(&self, mut request: Request<()>) -> Result<ResponseWithContinue, Self::Error> {
        match decode_path(request.uri().path()) {
            Ok(path) => {
                request.extensions_mut().insert(DecodedPath(path));
                self.inner.handle(request).await
            }
            Err(()) => Ok((generate_response(StatusCode::BAD_REQUEST), true)),
        }
    }
}

/// Percent-decodes `raw`; a non-UTF-8 decode or any `..` segment is an
/// error. The `..` check runs after decoding so `%2e%2e` cannot slip
/// through.
fn decode_path(raw: &str) -> Result<String, ()> {
    let decoded = percent_decode_str(raw).decode_utf8().map_err(|_| ())?;
    if decoded.split('/').any(|segment| segment == "..") {
        return Err(());
    }
    Ok(decoded.into_owned())
}

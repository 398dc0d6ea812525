use std::{
    convert::Infallible,
    fs,
    path::{Path, PathBuf},
};

use http::{header, Method, Request, Response, StatusCode};
use tracing::debug;

use super::uri_decode::DecodedPath;
use crate::http::{generate_response, Body, HttpHandler, ResponseWithContinue};

const FALLBACK_MIME: &str = "application/octet-stream";

/// Extension -> MIME type for the content this server is expected to
/// front; anything else is an octet stream.
const MIME_TABLE: &[(&str, &str)] = &[
    ("html", "text/html; charset=utf-8"),
    ("htm", "text/html; charset=utf-8"),
    ("css", "text/css"),
    ("js", "application/javascript"),
    ("mjs", "application/javascript"),
    ("json", "application/json"),
    ("txt", "text/plain; charset=utf-8"),
    ("xml", "application/xml"),
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("gif", "image/gif"),
    ("svg", "image/svg+xml"),
    ("webp", "image/webp"),
    ("ico", "image/x-icon"),
    ("woff", "font/woff"),
    ("woff2", "font/woff2"),
    ("wasm", "application/wasm"),
    ("pdf", "application/pdf"),
    ("mp4", "video/mp4"),
];

/// The leaf handler: resolves the decoded path under the document root.
///
/// - a directory hit without a trailing slash redirects (301) to the
///   slash-terminated URI so relative links resolve,
/// - a trailing slash serves the directory's index file,
/// - a miss with no file extension falls back to the root index file when
///   SPA mode is on, so client-side routes deep-link cleanly,
/// - anything else is a 404.
pub struct StaticFiles {
    root: PathBuf,
    index_file: String,
    spa_fallback: bool,
}

impl StaticFiles {
    pub fn new(root: impl Into<PathBuf>, index_file: impl Into<String>, spa_fallback: bool) -> Self {
        Self {
            root: root.into(),
            index_file: index_file.into(),
            spa_fallback,
        }
    }

    fn lookup(&self, decoded: &str, raw_path: &str) -> Response<Body> {
        let relative = decoded.trim_start_matches('/');
        let mut path = self.root.join(relative);
        if relative.is_empty() || decoded.ends_with('/') {
            path.push(&self.index_file);
        }

        match fs::metadata(&path) {
            Ok(meta) if meta.is_file() => file_response(&path, meta.len()),
            Ok(_) => redirect_to_directory(raw_path),
            Err(e) => {
                debug!(path = %path.display(), error = %e, "lookup miss");
                if self.spa_fallback && Path::new(relative).extension().is_none() {
                    let index = self.root.join(&self.index_file);
                    if let Ok(meta) = fs::metadata(&index) {
                        if meta.is_file() {
                            return file_response(&index, meta.len());
                        }
                    }
                }
                generate_response(StatusCode::NOT_FOUND)
            }
        }
    }
}

impl HttpHandler for StaticFiles {
    type Error = Infallible;

    async fn handle(&self, request: Request<()>) -> Result<ResponseWithContinue, Infallible> {
        let method = request.method();
        if method != &Method::GET && method != &Method::HEAD {
            return Ok((generate_response(StatusCode::METHOD_NOT_ALLOWED), true));
        }
        let raw_path = request.uri().path();
        let response = match request.extensions().get::<DecodedPath>() {
            Some(decoded) => self.lookup(&decoded.0, raw_path),
            None => self.lookup(raw_path, raw_path),
        };
        Ok((response, true))
    }
}

/// 301 to the slash-terminated form of the URI as the client sent it.
fn redirect_to_directory(raw_path: &str) -> Response<Body> {
    let location = format!("{raw_path}/");
    Response::builder()
        .status(StatusCode::MOVED_PERMANENTLY)
        .header(header::LOCATION, location)
        .body(Body::Empty)
        .unwrap_or_else(|_| generate_response(StatusCode::BAD_REQUEST))
}

fn file_response(path: &Path, len: u64) -> Response<Body> {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, mime_for(path))
        .body(Body::File {
            path: path.to_owned(),
            len,
        })
        .unwrap()
}

fn mime_for(path: &Path) -> &'static str {
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return FALLBACK_MIME;
    };
    MIME_TABLE
        .iter()
        .find(|(candidate, _)| candidate.eq_ignore_ascii_case(ext))
        .map(|(_, mime)| *mime)
        .unwrap_or(FALLBACK_MIME)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, File};
    use std::io::Write;

    fn fixture() -> (tempfile::TempDir, StaticFiles) {
        let root = tempfile::tempdir().unwrap();
        let mut index = File::create(root.path().join("index.html")).unwrap();
        index.write_all(b"<html>home</html>").unwrap();
        fs::create_dir(root.path().join("docs")).unwrap();
        File::create(root.path().join("docs/index.html"))
            .unwrap()
            .write_all(b"docs index")
            .unwrap();
        File::create(root.path().join("style.css"))
            .unwrap()
            .write_all(b"body {}")
            .unwrap();
        let handler = StaticFiles::new(root.path(), "index.html", true);
        (root, handler)
    }

    fn status_of(handler: &StaticFiles, path: &str) -> StatusCode {
        handler.lookup(path, path).status()
    }

    #[test]
    fn serves_an_existing_file_with_its_mime_type() {
        let (_root, handler) = fixture();
        let response = handler.lookup("/style.css", "/style.css");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "text/css"
        );
        match response.body() {
            Body::File { len, .. } => assert_eq!(*len, 7),
            other => panic!("expected a file body, got {other:?}"),
        }
    }

    #[test]
    fn root_path_serves_the_index_file() {
        let (_root, handler) = fixture();
        assert_eq!(status_of(&handler, "/"), StatusCode::OK);
    }

    #[test]
    fn directory_without_slash_redirects() {
        let (_root, handler) = fixture();
        let response = handler.lookup("/docs", "/docs");
        assert_eq!(response.status(), StatusCode::MOVED_PERMANENTLY);
        assert_eq!(response.headers().get(header::LOCATION).unwrap(), "/docs/");
    }

    #[test]
    fn directory_with_slash_serves_its_index() {
        let (_root, handler) = fixture();
        assert_eq!(status_of(&handler, "/docs/"), StatusCode::OK);
    }

    #[test]
    fn extensionless_miss_falls_back_to_the_spa_index() {
        let (_root, handler) = fixture();
        let response = handler.lookup("/dashboard", "/dashboard");
        assert_eq!(response.status(), StatusCode::OK);
        match response.body() {
            Body::File { path, .. } => assert!(path.ends_with("index.html")),
            other => panic!("expected a file body, got {other:?}"),
        }
    }

    #[test]
    fn miss_with_extension_is_a_plain_404() {
        let (_root, handler) = fixture();
        assert_eq!(status_of(&handler, "/missing.png"), StatusCode::NOT_FOUND);
    }

    #[test]
    fn spa_fallback_can_be_disabled() {
        let root = tempfile::tempdir().unwrap();
        File::create(root.path().join("index.html")).unwrap();
        let handler = StaticFiles::new(root.path(), "index.html", false);
        assert_eq!(status_of(&handler, "/dashboard"), StatusCode::NOT_FOUND);
    }

    #[test]
    fn unknown_extensions_fall_back_to_octet_stream() {
        assert_eq!(mime_for(Path::new("x.tar.zz")), FALLBACK_MIME);
        assert_eq!(mime_for(Path::new("x")), FALLBACK_MIME);
        assert_eq!(mime_for(Path::new("X.HTML")), "text/html; charset=utf-8");
    }
}

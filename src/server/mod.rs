//! HTTP adapter serving an [`EmbeddedFs`]
//!
//! [`FileServer::handle`] maps a request path onto the store:
//!
//! - `…/index.html` redirects to `./`, directories get a trailing slash and
//!   files lose one (all 301, query preserved)
//! - a directory serves its `index.html`, else a listing or 403
//! - compressed files go out as-is to clients accepting gzip, decoded
//!   otherwise, with the entity tag marking which variant was sent
//!
//! The adapter is transport-agnostic: it consumes `http::Request<()>` and
//! returns a complete `http::Response<Bytes>`.

mod content;
mod listing;

pub use content::serve_content;

use crate::config::Config;
use crate::error::EmbedError;
use crate::store::{base_name, EmbeddedFs, File, NodeInfo};
use bytes::Bytes;
use http::header::{self, HeaderMap, HeaderValue};
use http::{Request, Response, StatusCode};
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use std::sync::Arc;
use tracing::debug;

const INDEX_PAGE: &str = "/index.html";

/// Bytes left unescaped in a URL path
const PATH_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b'$')
    .remove(b'&')
    .remove(b'+')
    .remove(b',')
    .remove(b'/')
    .remove(b':')
    .remove(b';')
    .remove(b'=')
    .remove(b'@');

pub(crate) fn escape_path(path: &str) -> String {
    utf8_percent_encode(path, PATH_SET).to_string()
}

/// Custom response producer for 404 and 403 outcomes
pub type Handler = Box<dyn Fn(&Request<()>) -> Response<Bytes> + Send + Sync>;

/// Plain-text error carrying only the status reason
pub(crate) fn error_response(status: StatusCode) -> Response<Bytes> {
    let reason = status.canonical_reason().unwrap_or("Unknown Error");
    let mut resp = Response::new(Bytes::from(format!("{}\n", reason)));
    *resp.status_mut() = status;
    let headers = resp.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    resp
}

/// Lexically clean a rooted slash path, resolving `.`, `..` and `//`
pub(crate) fn clean_path(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            _ => parts.push(part),
        }
    }
    format!("/{}", parts.join("/"))
}

fn local_redirect(req: &Request<()>, target: &str) -> Response<Bytes> {
    let location = match req.uri().query() {
        Some(query) => format!("{}?{}", target, query),
        None => target.to_string(),
    };
    let Ok(location) = HeaderValue::from_str(&location) else {
        return error_response(StatusCode::INTERNAL_SERVER_ERROR);
    };
    let mut resp = Response::new(Bytes::new());
    *resp.status_mut() = StatusCode::MOVED_PERMANENTLY;
    resp.headers_mut().insert(header::LOCATION, location);
    resp
}

fn accepts_gzip(req: &Request<()>) -> bool {
    req.headers()
        .get_all(header::ACCEPT_ENCODING)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .any(|v| v.contains("gzip"))
}

pub struct FileServer {
    fs: Arc<EmbeddedFs>,
    not_found_handler: Option<Handler>,
    permission_handler: Option<Handler>,
    render_folders: bool,
}

impl FileServer {
    pub fn new(fs: Arc<EmbeddedFs>) -> Self {
        Self {
            fs,
            not_found_handler: None,
            permission_handler: None,
            render_folders: true,
        }
    }

    pub fn with_config(fs: Arc<EmbeddedFs>, config: &Config) -> Self {
        let mut server = Self::new(fs);
        server.render_folders = config.render_folders;
        server
    }

    /// Respond to missing entries with `handler` instead of a plain 404
    pub fn set_not_found_handler<H>(&mut self, handler: H)
    where
        H: Fn(&Request<()>) -> Response<Bytes> + Send + Sync + 'static,
    {
        self.not_found_handler = Some(Box::new(handler));
    }

    /// Respond to forbidden entries with `handler` instead of a plain 403
    pub fn set_permission_handler<H>(&mut self, handler: H)
    where
        H: Fn(&Request<()>) -> Response<Bytes> + Send + Sync + 'static,
    {
        self.permission_handler = Some(Box::new(handler));
    }

    /// List directories that have no `index.html` (otherwise 403)
    pub fn set_render_folders(&mut self, enabled: bool) {
        self.render_folders = enabled;
    }

    pub fn render_folders(&self) -> bool {
        self.render_folders
    }

    pub fn fs(&self) -> &Arc<EmbeddedFs> {
        &self.fs
    }

    pub fn handle(&self, req: &Request<()>) -> Response<Bytes> {
        let raw = req.uri().path();
        let Ok(decoded) = percent_decode_str(raw).decode_utf8() else {
            debug!(path = raw, "request path is not valid UTF-8");
            return error_response(StatusCode::BAD_REQUEST);
        };
        let upath = if decoded.starts_with('/') {
            decoded.into_owned()
        } else {
            format!("/{}", decoded)
        };

        if upath.ends_with(INDEX_PAGE) {
            return local_redirect(req, "./");
        }

        let mut name = clean_path(&upath);
        let mut file = match self.fs.open(&name) {
            Ok(file) => file,
            Err(e) => return self.fail(req, &name, e),
        };
        let mut info = match file.stat() {
            Ok(info) => info,
            Err(e) => return self.fail(req, &name, e),
        };

        if info.is_dir() {
            if !upath.ends_with('/') {
                let target = format!("{}/", escape_path(base_name(&upath)));
                return local_redirect(req, &target);
            }
        } else if upath.ends_with('/') {
            let target = format!("../{}", escape_path(base_name(&upath)));
            return local_redirect(req, &target);
        }

        if info.is_dir() {
            let index = format!("{}{}", name.trim_end_matches('/'), INDEX_PAGE);
            if let Ok(index_file) = self.fs.open(&index) {
                if let Ok(index_info) = index_file.stat() {
                    name = index;
                    file = index_file;
                    info = index_info;
                }
            }
        }

        if info.is_dir() {
            if self.render_folders {
                debug!(path = %name, "rendering directory listing");
                return listing::render(&mut file);
            }
            return self.fail(req, &name, EmbedError::PermissionDenied(name.clone()));
        }

        self.serve_file(req, &name, file, &info)
    }

    fn serve_file(
        &self,
        req: &Request<()>,
        name: &str,
        mut file: File,
        info: &NodeInfo,
    ) -> Response<Bytes> {
        let mut headers = HeaderMap::new();
        let mut tag = info.tag().cloned();

        let compressed = info.compressed();
        if compressed {
            headers.insert(header::VARY, HeaderValue::from_static("Accept-Encoding"));
        }

        match file.as_embedded_mut() {
            Some(reader) if compressed && accepts_gzip(req) => {
                reader.use_raw();
                headers.insert(header::CONTENT_ENCODING, HeaderValue::from_static("gzip"));
            }
            _ => tag = tag.map(|t| t.plain()),
        }

        if !info.mime_type().is_empty() {
            if let Ok(value) = HeaderValue::from_str(info.mime_type()) {
                headers.insert(header::CONTENT_TYPE, value);
            }
        }

        if let Some(tag) = tag {
            if let Ok(value) = HeaderValue::from_str(&format!("\"{}\"", tag)) {
                headers.insert(header::ETAG, value);
            }
        }

        debug!(
            path = %name,
            raw = headers.contains_key(header::CONTENT_ENCODING),
            "serving file"
        );
        serve_content(req, info.name(), Some(info.modified()), &mut file, headers)
    }

    fn fail(&self, req: &Request<()>, name: &str, err: EmbedError) -> Response<Bytes> {
        if err.is_not_found() {
            debug!(path = %name, "not found");
            return match &self.not_found_handler {
                Some(handler) => handler(req),
                None => error_response(StatusCode::NOT_FOUND),
            };
        }
        if err.is_permission_denied() {
            debug!(path = %name, "forbidden");
            return match &self.permission_handler {
                Some(handler) => handler(req),
                None => error_response(StatusCode::FORBIDDEN),
            };
        }
        debug!(path = %name, error = %err, "internal error");
        error_response(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_path() {
        assert_eq!(clean_path("/"), "/");
        assert_eq!(clean_path("/a/b/"), "/a/b");
        assert_eq!(clean_path("/a/./b//c"), "/a/b/c");
        assert_eq!(clean_path("/a/../../b"), "/b");
        assert_eq!(clean_path("/.."), "/");
    }

    #[test]
    fn test_escape_path() {
        assert_eq!(escape_path("a b.txt"), "a%20b.txt");
        assert_eq!(escape_path("caf\u{e9}/x;y=1"), "caf%C3%A9/x;y=1");
        assert_eq!(escape_path("100%"), "100%25");
    }

    #[test]
    fn test_error_response_is_status_text() {
        let resp = error_response(StatusCode::NOT_FOUND);
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(resp.body().as_ref(), b"Not Found\n");
        assert_eq!(resp.headers()[header::X_CONTENT_TYPE_OPTIONS], "nosniff");
    }

    #[test]
    fn test_redirect_keeps_query() {
        let req = Request::builder().uri("/docs?v=1").body(()).unwrap();
        let resp = local_redirect(&req, "docs/");
        assert_eq!(resp.status(), StatusCode::MOVED_PERMANENTLY);
        assert_eq!(resp.headers()[header::LOCATION], "docs/?v=1");
    }

    #[test]
    fn test_accepts_gzip() {
        let req = Request::builder()
            .header(header::ACCEPT_ENCODING, "br, gzip;q=0.8")
            .body(())
            .unwrap();
        assert!(accepts_gzip(&req));
        let req = Request::builder().body(()).unwrap();
        assert!(!accepts_gzip(&req));
    }
}

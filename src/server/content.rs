//! Conditional and range-aware delivery of a seekable body
//!
//! This function takes care of:
//!  - `Last-Modified`, plus 304/412 from `If-None-Match`, `If-Match`,
//!    `If-Modified-Since` and `If-Unmodified-Since`
//!  - single byte ranges (206), honouring `If-Range`; multiple ranges
//!    are answered with 416
//!  - `HEAD` requests (headers only)

use super::error_response;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use http::header::{self, HeaderMap, HeaderValue};
use http::{Method, Request, Response, StatusCode};
use http_range::{HttpRange, HttpRangeParseError};
use std::io::{self, Read, Seek, SeekFrom};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

const HTTP_DATE: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// Bytes inspected when guessing a content type from the body
const SNIFF_LEN: usize = 512;

pub(crate) fn format_http_date(time: SystemTime) -> String {
    DateTime::<Utc>::from(time).format(HTTP_DATE).to_string()
}

fn parse_http_date(value: &HeaderValue) -> Option<i64> {
    let value = value.to_str().ok()?;
    DateTime::parse_from_rfc2822(value)
        .ok()
        .map(|t| t.timestamp())
}

fn unix_seconds(time: SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_secs() as i64,
        Err(e) => -(e.duration().as_secs() as i64),
    }
}

/// Split an `If-Match` / `If-None-Match` list into `(weak, opaque)` tags
fn parse_etag_list(value: &str) -> Vec<(bool, &str)> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| match s.strip_prefix("W/") {
            Some(rest) => (true, rest),
            None => (false, s),
        })
        .collect()
}

/// Whether any tag in `header` matches `etag` (both in quoted form)
fn etag_matches(header: &HeaderValue, etag: Option<&str>, weak_ok: bool) -> bool {
    let Ok(value) = header.to_str() else {
        return false;
    };
    if value.trim() == "*" {
        return true;
    }
    let Some(etag) = etag else {
        return false;
    };
    let (ours_weak, ours) = match etag.strip_prefix("W/") {
        Some(rest) => (true, rest),
        None => (false, etag),
    };
    parse_etag_list(value)
        .into_iter()
        .any(|(weak, tag)| tag == ours && (weak_ok || (!weak && !ours_weak)))
}

enum Precondition {
    Proceed,
    NotModified,
    Failed,
}

fn check_preconditions(
    req: &Request<()>,
    etag: Option<&str>,
    modified: Option<i64>,
) -> Precondition {
    let headers = req.headers();

    if let Some(if_match) = headers.get(header::IF_MATCH) {
        if !etag_matches(if_match, etag, false) {
            return Precondition::Failed;
        }
    } else if let (Some(since), Some(modified)) = (
        headers.get(header::IF_UNMODIFIED_SINCE).and_then(parse_http_date),
        modified,
    ) {
        if modified > since {
            return Precondition::Failed;
        }
    }

    let safe = req.method() == Method::GET || req.method() == Method::HEAD;
    if let Some(if_none_match) = headers.get(header::IF_NONE_MATCH) {
        if etag_matches(if_none_match, etag, true) {
            return if safe {
                Precondition::NotModified
            } else {
                Precondition::Failed
            };
        }
    } else if safe {
        if let (Some(since), Some(modified)) = (
            headers.get(header::IF_MODIFIED_SINCE).and_then(parse_http_date),
            modified,
        ) {
            if modified <= since {
                return Precondition::NotModified;
            }
        }
    }

    Precondition::Proceed
}

/// Whether a `Range` header should be honoured given `If-Range`
fn range_applies(req: &Request<()>, etag: Option<&str>, modified: Option<i64>) -> bool {
    let Some(if_range) = req.headers().get(header::IF_RANGE) else {
        return true;
    };
    let Ok(value) = if_range.to_str() else {
        return false;
    };
    if value.starts_with('"') || value.starts_with("W/") {
        return !value.starts_with("W/") && etag_matches(if_range, etag, false);
    }
    // A date only validates when it is exactly the Last-Modified value
    match (parse_http_date(if_range), modified) {
        (Some(date), Some(modified)) => modified == date,
        _ => false,
    }
}

fn sniff_content_type(head: &[u8]) -> &'static str {
    let text = match std::str::from_utf8(head) {
        Ok(text) => text,
        // A multi-byte sequence cut at the sniff boundary is still text
        Err(e) if e.error_len().is_none() => {
            std::str::from_utf8(&head[..e.valid_up_to()]).unwrap_or_default()
        }
        Err(_) => return "application/octet-stream",
    };
    if text
        .chars()
        .any(|c| c.is_control() && !matches!(c, '\n' | '\r' | '\t' | '\x0c'))
    {
        return "application/octet-stream";
    }
    let lower = text.trim_start().to_ascii_lowercase();
    if lower.starts_with("<!doctype html") || lower.starts_with("<html") {
        "text/html; charset=utf-8"
    } else {
        "text/plain; charset=utf-8"
    }
}

fn read_span<R: Read + Seek>(content: &mut R, start: u64, length: u64) -> io::Result<Vec<u8>> {
    content.seek(SeekFrom::Start(start))?;
    let mut out = Vec::with_capacity(length.min(1 << 20) as usize);
    content.take(length).read_to_end(&mut out)?;
    Ok(out)
}

fn not_modified(mut headers: HeaderMap) -> Response<Bytes> {
    headers.remove(header::CONTENT_TYPE);
    headers.remove(header::CONTENT_LENGTH);
    headers.remove(header::CONTENT_ENCODING);
    let mut resp = Response::new(Bytes::new());
    *resp.status_mut() = StatusCode::NOT_MODIFIED;
    *resp.headers_mut() = headers;
    resp
}

fn unsatisfiable(size: u64) -> Response<Bytes> {
    let mut resp = error_response(StatusCode::RANGE_NOT_SATISFIABLE);
    if let Ok(value) = HeaderValue::from_str(&format!("bytes */{}", size)) {
        resp.headers_mut().insert(header::CONTENT_RANGE, value);
    }
    resp
}

/// Serve `content` with the headers already in `headers`
///
/// `modified` of `None` suppresses `Last-Modified` and date conditionals.
/// A missing `Content-Type` is guessed from `name`, then from the body.
pub fn serve_content<R: Read + Seek>(
    req: &Request<()>,
    name: &str,
    modified: Option<SystemTime>,
    content: &mut R,
    mut headers: HeaderMap,
) -> Response<Bytes> {
    let modified = modified.map(unix_seconds).filter(|secs| *secs != 0);
    if let Some(secs) = modified {
        let time = UNIX_EPOCH + std::time::Duration::from_secs(secs.max(0) as u64);
        if let Ok(value) = HeaderValue::from_str(&format_http_date(time)) {
            headers.insert(header::LAST_MODIFIED, value);
        }
    }

    let etag = headers
        .get(header::ETAG)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    match check_preconditions(req, etag.as_deref(), modified) {
        Precondition::Proceed => {}
        Precondition::NotModified => return not_modified(headers),
        Precondition::Failed => return error_response(StatusCode::PRECONDITION_FAILED),
    }

    let size = match content
        .seek(SeekFrom::End(0))
        .and_then(|size| content.seek(SeekFrom::Start(0)).map(|_| size))
    {
        Ok(size) => size,
        Err(e) => {
            debug!(name, error = %e, "seek failed");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR);
        }
    };

    if !headers.contains_key(header::CONTENT_TYPE) {
        let guessed = mime_guess::from_path(name).first_raw();
        let content_type = match guessed {
            Some(guessed) => guessed.to_string(),
            None => {
                let Ok(head) = read_span(content, 0, SNIFF_LEN as u64) else {
                    return error_response(StatusCode::INTERNAL_SERVER_ERROR);
                };
                sniff_content_type(&head).to_string()
            }
        };
        if let Ok(value) = HeaderValue::from_str(&content_type) {
            headers.insert(header::CONTENT_TYPE, value);
        }
    }

    let mut status = StatusCode::OK;
    let mut start = 0u64;
    let mut length = size;

    if let Some(range) = req.headers().get(header::RANGE) {
        if range_applies(req, etag.as_deref(), modified) {
            let Ok(range) = range.to_str() else {
                return unsatisfiable(size);
            };
            match HttpRange::parse(range, size) {
                Ok(ranges) if ranges.len() == 1 => {
                    let HttpRange {
                        start: range_start,
                        length: range_length,
                    } = ranges[0];
                    status = StatusCode::PARTIAL_CONTENT;
                    start = range_start;
                    length = range_length;
                    let content_range = format!(
                        "bytes {}-{}/{}",
                        range_start,
                        range_start + range_length - 1,
                        size
                    );
                    if let Ok(value) = HeaderValue::from_str(&content_range) {
                        headers.insert(header::CONTENT_RANGE, value);
                    }
                }
                // Multipart responses are not produced
                Ok(_) => return unsatisfiable(size),
                // An empty body has nothing to overlap; serve it whole
                Err(HttpRangeParseError::NoOverlap) if size == 0 => {}
                Err(_) => return unsatisfiable(size),
            }
        }
    }

    headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));

    let body = if req.method() == Method::HEAD {
        Bytes::new()
    } else {
        match read_span(content, start, length) {
            Ok(body) => Bytes::from(body),
            Err(e) => {
                debug!(name, error = %e, "read failed");
                return error_response(StatusCode::INTERNAL_SERVER_ERROR);
            }
        }
    };

    let mut resp = Response::new(body);
    *resp.status_mut() = status;
    *resp.headers_mut() = headers;
    resp
}

use super::{error_response, escape_path};
use crate::store::File;
use bytes::Bytes;
use http::header::{self, HeaderValue};
use http::{Response, StatusCode};
use tracing::warn;

fn html_escape(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&#34;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Relative link target for a listing entry
///
/// A colon in the first segment would read as a scheme, so such links
/// get a `./` prefix.
fn link_target(name: &str) -> String {
    let first_segment = name.split('/').next().unwrap_or_default();
    if first_segment.contains(':') {
        format!("./{}", escape_path(name))
    } else {
        escape_path(name)
    }
}

/// Render a directory handle as an HTML `<pre>` list of links
pub(crate) fn render(dir: &mut File) -> Response<Bytes> {
    let mut entries = match dir.readdir(-1) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(error = %e, "error reading directory");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR);
        }
    };
    entries.sort_by(|a, b| a.name().cmp(b.name()));

    let mut body = String::from("<pre>\n");
    for entry in &entries {
        let mut name = entry.name().to_string();
        if entry.is_dir() {
            name.push('/');
        }
        body.push_str(&format!(
            "<a href=\"{}\">{}</a>\n",
            link_target(&name),
            html_escape(&name)
        ));
    }
    body.push_str("</pre>\n");

    let mut resp = Response::new(Bytes::from(body));
    resp.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/html; charset=utf-8"),
    );
    resp
}

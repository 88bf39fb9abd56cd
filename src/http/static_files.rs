use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use hyper::{
    header::{HeaderValue, ALLOW, CONTENT_LENGTH, CONTENT_TYPE, LOCATION},
    Method, Response, StatusCode, Uri,
};
use log::debug;
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};

use super::{error_response, status_response, GatewayBody};

const INDEX_FILE: &str = "index.html";

// Characters escaped in listing links.
const LINK_ESCAPE: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

#[derive(Debug, Clone)]
pub struct StaticFiles {
    root: PathBuf,
}

impl StaticFiles {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        StaticFiles { root: root.into() }
    }

    pub async fn serve(&self, method: &Method, uri: &Uri) -> Response<GatewayBody> {
        if *method != Method::GET && *method != Method::HEAD {
            let mut response = error_response(StatusCode::METHOD_NOT_ALLOWED, "405 method not allowed");
            response
                .headers_mut()
                .insert(ALLOW, HeaderValue::from_static("GET, HEAD"));
            return response;
        }

        let Ok(decoded) = percent_decode_str(uri.path()).decode_utf8() else {
            return error_response(StatusCode::BAD_REQUEST, "400 bad request");
        };
        let Some(segments) = clean_path(&decoded) else {
            return error_response(StatusCode::BAD_REQUEST, "400 bad request");
        };

        if decoded.ends_with(&format!("/{}", INDEX_FILE)) {
            return redirect("./");
        }

        let mut path = self.root.clone();
        path.extend(segments.iter());

        let metadata = match tokio::fs::metadata(&path).await {
            Ok(metadata) => metadata,
            Err(e) => return io_error_response(&path, e),
        };

        if metadata.is_dir() {
            if !decoded.ends_with('/') {
                let last = segments.last().map(String::as_str).unwrap_or_default();
                return redirect(&format!("{}/", escape(last)));
            }
            let index = path.join(INDEX_FILE);
            return match tokio::fs::metadata(&index).await {
                Ok(index_meta) if index_meta.is_file() => {
                    self.file(method, &index, index_meta.len()).await
                }
                _ => self.listing(method, &path).await,
            };
        }
        self.file(method, &path, metadata.len()).await
    }

    async fn file(&self, method: &Method, path: &Path, len: u64) -> Response<GatewayBody> {
        let body = if *method == Method::HEAD {
            GatewayBody::empty()
        } else {
            match tokio::fs::File::open(path).await {
                Ok(file) => GatewayBody::file(file, len),
                Err(e) => return io_error_response(path, e),
            }
        };
        let mut response = status_response(StatusCode::OK, body);
        let headers = response.headers_mut();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type(path)));
        headers.insert(CONTENT_LENGTH, HeaderValue::from(len));
        response
    }

    async fn listing(&self, method: &Method, dir: &Path) -> Response<GatewayBody> {
        let mut entries = match tokio::fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) => return io_error_response(dir, e),
        };
        let mut names = Vec::new();
        loop {
            match entries.next_entry().await {
                Ok(Some(entry)) => {
                    let mut name = entry.file_name().to_string_lossy().into_owned();
                    if entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false) {
                        name.push('/');
                    }
                    names.push(name);
                }
                Ok(None) => break,
                Err(e) => return io_error_response(dir, e),
            }
        }
        names.sort();

        let mut html = String::from("<!doctype html>\n<meta name=\"viewport\" content=\"width=device-width\">\n<pre>\n");
        for name in &names {
            html.push_str(&format!(
                "<a href=\"{}\">{}</a>\n",
                html_escape(&escape(name)),
                html_escape(name)
            ));
        }
        html.push_str("</pre>\n");

        let len = html.len() as u64;
        let body = if *method == Method::HEAD {
            GatewayBody::empty()
        } else {
            GatewayBody::full(html)
        };
        let mut response = status_response(StatusCode::OK, body);
        let headers = response.headers_mut();
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("text/html; charset=utf-8"),
        );
        headers.insert(CONTENT_LENGTH, HeaderValue::from(len));
        response
    }
}

/// Splits a request path into segments, resolving `.` and `..` without ever
/// climbing above the root. `None` for segments no file name may contain.
fn clean_path(path: &str) -> Option<Vec<String>> {
    let mut segments: Vec<String> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s if s.contains('\\') || s.contains('\0') => return None,
            s => segments.push(s.to_string()),
        }
    }
    Some(segments)
}

fn redirect(location: &str) -> Response<GatewayBody> {
    let mut response = status_response(StatusCode::MOVED_PERMANENTLY, GatewayBody::empty());
    if let Ok(location) = HeaderValue::from_str(location) {
        response.headers_mut().insert(LOCATION, location);
    }
    response
}

fn io_error_response(path: &Path, e: std::io::Error) -> Response<GatewayBody> {
    match e.kind() {
        ErrorKind::NotFound => error_response(StatusCode::NOT_FOUND, "404 page not found"),
        ErrorKind::PermissionDenied => error_response(StatusCode::FORBIDDEN, "403 Forbidden"),
        _ => {
            debug!("serving {} failed: {}", path.display(), e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "500 Internal Server Error")
        }
    }
}

fn escape(segment: &str) -> String {
    utf8_percent_encode(segment, LINK_ESCAPE).to_string()
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&#34;")
        .replace('\'', "&#39;")
}

fn content_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "html" | "htm" => "text/html; charset=utf-8",
        "css" => "text/css; charset=utf-8",
        "js" | "mjs" => "text/javascript; charset=utf-8",
        "json" => "application/json",
        "txt" => "text/plain; charset=utf-8",
        "xml" => "text/xml; charset=utf-8",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "ico" => "image/x-icon",
        "wasm" => "application/wasm",
        "pdf" => "application/pdf",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        _ => "application/octet-stream",
    }
}

//! Header filtering and service-location rewriting

use std::borrow::Cow;

use bytes::Bytes;
use regex::bytes::{NoExpand, Regex};
use tracing::warn;

use crate::storage::Headers;

/// Headers never forwarded to the upstream.
///
/// Hop-by-hop headers belong to the inbound connection. `host` and
/// `content-length` are recomputed by the client. `accept-encoding` is
/// dropped so upstream bodies arrive uncompressed and can be rewritten.
const NOT_FORWARDED: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "host",
    "content-length",
    "accept-encoding",
];

/// Check if an inbound request header is passed on to the upstream
#[must_use]
pub fn is_forwarded_header(name: &str) -> bool {
    !NOT_FORWARDED
        .iter()
        .any(|blocked| name.eq_ignore_ascii_case(blocked))
}

/// Recorded response headers to send back to the caller.
///
/// `Content-Length` is dropped because the body may be rewritten, and
/// chunked `Transfer-Encoding` because the proxy never re-chunks. Every
/// value of every other header is kept.
#[must_use]
pub fn response_headers(recorded: &Headers) -> Vec<(String, String)> {
    let mut headers = Vec::new();
    for (name, values) in recorded {
        if name.eq_ignore_ascii_case("content-length") {
            continue;
        }
        if name.eq_ignore_ascii_case("transfer-encoding")
            && values
                .iter()
                .any(|v| v.to_ascii_lowercase().contains("chunked"))
        {
            continue;
        }
        for value in values {
            headers.push((name.clone(), value.clone()));
        }
    }
    headers
}

/// Replace every literal occurrence of `real_host` in a service definition
/// with the proxy's own base URL
#[must_use]
pub fn rewrite_service_location(body: &Bytes, real_host: &str, public_base_url: &str) -> Bytes {
    if real_host.is_empty() {
        return body.clone();
    }

    let pattern = match Regex::new(&regex::escape(real_host)) {
        Ok(pattern) => pattern,
        Err(e) => {
            warn!(real_host, "Cannot rewrite service location: {e}");
            return body.clone();
        }
    };

    match pattern.replace_all(body, NoExpand(public_base_url.as_bytes())) {
        Cow::Borrowed(_) => body.clone(),
        Cow::Owned(rewritten) => Bytes::from(rewritten),
    }
}

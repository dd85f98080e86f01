//! HTTP transport types shared by the engine and its transport.
//!
//! # Design
//! Requests and responses are plain data. The engine builds `HttpRequest`
//! values and inspects `HttpResponse` values; a `Transport` implementation
//! performs the actual round-trip. Response bodies are bytes because
//! GetObject payloads are binary.
//!
//! Header lookups on responses are case-insensitive, and a header may repeat
//! (`Set-Cookie`), so headers are kept as an ordered list of pairs rather
//! than a map.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use url::Url;

/// HTTP method for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
    Head,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Head => "HEAD",
        }
    }
}

/// A fully framed HTTP request, ready for a `Transport`.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: Url,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl HttpRequest {
    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }
}

/// An HTTP response as returned by a `Transport`.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// First value of `name`, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    /// Every value of a repeatable header such as `Set-Cookie`.
    pub fn header_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.headers
            .iter()
            .filter(move |(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Status code with its canonical reason phrase, e.g. `"401 Unauthorized"`.
    ///
    /// The reason text the server put on the status line is not kept:
    /// `ureq` surfaces responses as `http::Response`, which has no
    /// reason-phrase field, so a custom reason never reaches this message.
    /// Codes without a registered phrase read `"Unknown Status"`.
    pub fn status_message(&self) -> String {
        let reason = ::http::StatusCode::from_u16(self.status)
            .ok()
            .and_then(|code| code.canonical_reason())
            .unwrap_or("Unknown Status");
        format!("{} {reason}", self.status)
    }

    /// `Content-Length` as announced by the server, or 0 if absent or garbled.
    pub fn content_length(&self) -> usize {
        self.header("content-length")
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(0)
    }
}

/// One transaction's request shape before session headers are merged in.
///
/// Created per call by the session facade and consumed by
/// `TransactionEngine::request`; never stored.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    pub url: Url,
    pub data: BTreeMap<String, String>,
    pub headers: Vec<(String, String)>,
    pub method: HttpMethod,
}

impl RequestDescriptor {
    pub fn new(url: Url, method: HttpMethod) -> Self {
        Self {
            url,
            data: BTreeMap::new(),
            headers: Vec::new(),
            method,
        }
    }

    #[must_use]
    pub fn data(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

pub(crate) fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(headers: &[(&str, &str)]) -> HttpResponse {
        HttpResponse {
            status: 200,
            headers: headers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            body: Vec::new(),
        }
    }

    #[test]
    fn header_lookup_ignores_case() {
        let resp = response(&[("Content-Type", "text/xml")]);
        assert_eq!(resp.header("content-type"), Some("text/xml"));
        assert_eq!(resp.header("CONTENT-TYPE"), Some("text/xml"));
        assert!(resp.header("content-length").is_none());
    }

    #[test]
    fn header_all_returns_every_repeat() {
        let resp = response(&[
            ("Set-Cookie", "a=1; Path=/"),
            ("Content-Type", "text/xml"),
            ("set-cookie", "b=2"),
        ]);
        let cookies: Vec<&str> = resp.header_all("Set-Cookie").collect();
        assert_eq!(cookies, vec!["a=1; Path=/", "b=2"]);
    }

    #[test]
    fn status_message_uses_reason_phrase() {
        let mut resp = response(&[]);
        resp.status = 401;
        assert_eq!(resp.status_message(), "401 Unauthorized");
        resp.status = 599;
        assert_eq!(resp.status_message(), "599 Unknown Status");
    }

    #[test]
    fn content_length_defaults_to_zero() {
        assert_eq!(response(&[]).content_length(), 0);
        assert_eq!(response(&[("Content-Length", "garbage")]).content_length(), 0);
        assert_eq!(response(&[("Content-Length", " 512 ")]).content_length(), 512);
    }

    #[test]
    fn descriptor_later_data_overrides_earlier() {
        let url = Url::parse("http://rets.example.com/search").unwrap();
        let desc = RequestDescriptor::new(url, HttpMethod::Get)
            .data("Count", "0")
            .data("Count", "1");
        assert_eq!(desc.data.get("Count").map(String::as_str), Some("1"));
    }
}

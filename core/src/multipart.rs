//! Splitting `multipart/parallel` GetObject bodies into parts.
//!
//! # Design
//! Framing is deliberately simple: the content type is split on `;` and `=`
//! and header lines on their first `:`, with no quoting rules beyond
//! stripping a pair of surrounding double quotes from parameter values. A
//! boundary or header value that itself contains `;` will be cut short.
//! Servers in practice send unquoted token boundaries.

use std::collections::BTreeMap;

use tracing::trace;

/// A media type and its parameters, e.g. `multipart/parallel; boundary=XYZ`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentType {
    pub media_type: String,
    /// Parameter names are lowercased.
    pub params: BTreeMap<String, String>,
}

impl ContentType {
    pub fn parse(value: &str) -> Self {
        let mut segments = value.split(';');
        let media_type = segments.next().unwrap_or_default().trim().to_string();
        let params = segments
            .filter_map(|segment| {
                let (key, value) = segment.split_once('=')?;
                let key = key.trim().to_ascii_lowercase();
                let value = value.trim();
                let value = value
                    .strip_prefix('"')
                    .and_then(|v| v.strip_suffix('"'))
                    .unwrap_or(value);
                (!key.is_empty()).then(|| (key, value.to_string()))
            })
            .collect();
        Self { media_type, params }
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn boundary(&self) -> Option<&str> {
        self.param("boundary").filter(|b| !b.is_empty())
    }

    pub fn is(&self, media_type: &str) -> bool {
        self.media_type.eq_ignore_ascii_case(media_type)
    }
}

/// One body part: its header block and raw payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Part {
    pub headers: Vec<(String, String)>,
    pub payload: Vec<u8>,
}

/// Parse a raw header block, one `Name: value` per line.
///
/// Lines without a colon are ignored.
pub fn parse_header_block(raw: &str) -> Vec<(String, String)> {
    raw.lines()
        .filter_map(|line| {
            let (name, value) = line.split_once(':')?;
            let name = name.trim();
            (!name.is_empty()).then(|| (name.to_string(), value.trim().to_string()))
        })
        .collect()
}

/// Split `body` on `--boundary` into parts, in body order.
///
/// The preamble before the first delimiter is dropped, as is any chunk
/// with no blank line separating headers from payload (which includes the
/// closing `--` epilogue). The CRLF that precedes each delimiter belongs to
/// the delimiter and is not part of the payload.
pub fn decode(body: &[u8], boundary: &str) -> Vec<Part> {
    let delimiter = format!("--{boundary}");
    let mut chunks = split_bytes(body, delimiter.as_bytes()).into_iter();
    chunks.next();

    chunks
        .enumerate()
        .filter_map(|(index, chunk)| {
            let Some((raw_headers, payload)) = split_blank_line(chunk) else {
                trace!(index, "skipping multipart chunk without payload");
                return None;
            };
            let payload = strip_line_ending(payload);
            if payload.is_empty() {
                trace!(index, "skipping multipart chunk with empty payload");
                return None;
            }
            Some(Part {
                headers: parse_header_block(&String::from_utf8_lossy(raw_headers)),
                payload: payload.to_vec(),
            })
        })
        .collect()
}

fn split_bytes<'a>(haystack: &'a [u8], needle: &[u8]) -> Vec<&'a [u8]> {
    let mut out = Vec::new();
    let mut rest = haystack;
    while let Some(pos) = find(rest, needle) {
        out.push(&rest[..pos]);
        rest = &rest[pos + needle.len()..];
    }
    out.push(rest);
    out
}

fn split_blank_line(chunk: &[u8]) -> Option<(&[u8], &[u8])> {
    if let Some(pos) = find(chunk, b"\r\n\r\n") {
        return Some((&chunk[..pos], &chunk[pos + 4..]));
    }
    find(chunk, b"\n\n").map(|pos| (&chunk[..pos], &chunk[pos + 2..]))
}

fn strip_line_ending(payload: &[u8]) -> &[u8] {
    payload
        .strip_suffix(b"\r\n")
        .or_else(|| payload.strip_suffix(b"\n"))
        .unwrap_or(payload)
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

//! Binary objects returned by GetObject.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::http::find_header;
use crate::multipart::{ContentType, Part};

/// Extension reported for content types missing from the `MimeMap`.
pub const UNKNOWN_EXTENSION: &str = "unknown";

/// Content type to file extension.
///
/// The keys double as the `Accept` list sent with GetObject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MimeMap(BTreeMap<String, String>);

impl Default for MimeMap {
    fn default() -> Self {
        let mut map = BTreeMap::new();
        map.insert("image/jpeg".to_string(), "jpg".to_string());
        map.insert("image/gif".to_string(), "gif".to_string());
        Self(map)
    }
}

impl MimeMap {
    pub fn empty() -> Self {
        Self(BTreeMap::new())
    }

    pub fn insert(&mut self, mime_type: impl Into<String>, extension: impl Into<String>) {
        self.0.insert(mime_type.into().to_ascii_lowercase(), extension.into());
    }

    pub fn remove(&mut self, mime_type: &str) -> Option<String> {
        self.0.remove(&mime_type.to_ascii_lowercase())
    }

    pub fn extension(&self, mime_type: &str) -> Option<&str> {
        self.0
            .get(&mime_type.trim().to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Comma-separated list of every known content type.
    pub fn accept_header(&self) -> String {
        self.0.keys().map(String::as_str).collect::<Vec<_>>().join(",")
    }
}

/// One object (usually a photo) from a GetObject response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataObject {
    pub headers: Vec<(String, String)>,
    pub payload: Vec<u8>,
    /// From the `MimeMap`, or `"unknown"`. Informational only.
    pub extension: String,
}

impl DataObject {
    pub fn new(headers: Vec<(String, String)>, payload: Vec<u8>, mimemap: &MimeMap) -> Self {
        let extension = find_header(&headers, "content-type")
            .and_then(|ct| mimemap.extension(&ContentType::parse(ct).media_type))
            .unwrap_or(UNKNOWN_EXTENSION)
            .to_string();
        Self {
            headers,
            payload,
            extension,
        }
    }

    pub fn from_part(part: Part, mimemap: &MimeMap) -> Self {
        Self::new(part.headers, part.payload, mimemap)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    pub fn object_id(&self) -> Option<&str> {
        self.header("object-id")
    }

    pub fn content_id(&self) -> Option<&str> {
        self.header("content-id")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_mimemap_accepts_jpeg_and_gif() {
        assert_eq!(MimeMap::default().accept_header(), "image/gif,image/jpeg");
    }

    #[test]
    fn extension_falls_back_to_unknown() {
        let mimemap = MimeMap::default();
        let jpeg = DataObject::new(
            vec![("Content-Type".to_string(), "image/jpeg".to_string())],
            vec![1, 2, 3],
            &mimemap,
        );
        assert_eq!(jpeg.extension, "jpg");

        let png = DataObject::new(
            vec![("Content-Type".to_string(), "image/png".to_string())],
            vec![1],
            &mimemap,
        );
        assert_eq!(png.extension, UNKNOWN_EXTENSION);

        let bare = DataObject::new(Vec::new(), vec![1], &mimemap);
        assert_eq!(bare.extension, UNKNOWN_EXTENSION);
    }

    #[test]
    fn mimemap_is_mutable() {
        let mut mimemap = MimeMap::default();
        mimemap.insert("Image/PNG", "png");
        mimemap.remove("image/gif");
        assert_eq!(mimemap.extension("image/png"), Some("png"));
        assert_eq!(mimemap.accept_header(), "image/jpeg,image/png");
    }

    #[test]
    fn accessors_read_headers() {
        let obj = DataObject::new(
            vec![
                ("Content-ID".to_string(), "LN1234".to_string()),
                ("Object-ID".to_string(), "2".to_string()),
            ],
            Vec::new(),
            &MimeMap::default(),
        );
        assert_eq!(obj.content_id(), Some("LN1234"));
        assert_eq!(obj.object_id(), Some("2"));
        assert!(obj.content_type().is_none());
    }
}

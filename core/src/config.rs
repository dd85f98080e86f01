//! Client configuration.
//!
//! # Design
//! `ClientConfig` is plain data with serde derives so a host can load it
//! from whatever file format it already uses. Every field has a default;
//! an empty document yields a working GET client that returns parsed
//! results.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::RetsError;
use crate::http::HttpMethod;
use crate::object::MimeMap;

pub const DEFAULT_MAX_AUTH_RETRIES: u32 = 2;

/// How transaction bodies are handed back to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    /// The response body, untouched.
    Raw,
    /// The body run through the registered `ResponseParser`.
    #[default]
    Structured,
}

/// RETS 1.x protocol revisions this client speaks.
///
/// All revisions share one transaction engine; the tag only selects the
/// `RETS-Version` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RetsVersion {
    #[serde(rename = "1.5")]
    V1_5,
    #[default]
    #[serde(rename = "1.7")]
    V1_7,
    #[serde(rename = "1.7.2")]
    V1_7_2,
}

impl RetsVersion {
    pub fn as_str(self) -> &'static str {
        match self {
            RetsVersion::V1_5 => "1.5",
            RetsVersion::V1_7 => "1.7",
            RetsVersion::V1_7_2 => "1.7.2",
        }
    }

    /// Value for the `RETS-Version` request header.
    pub fn header_value(self) -> String {
        format!("RETS/{}", self.as_str())
    }
}

impl fmt::Display for RetsVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RetsVersion {
    type Err = RetsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bare = s.trim();
        let bare = bare.strip_prefix("RETS/").unwrap_or(bare);
        match bare {
            "1.5" => Ok(RetsVersion::V1_5),
            "1.7" => Ok(RetsVersion::V1_7),
            "1.7.2" => Ok(RetsVersion::V1_7_2),
            other => Err(RetsError::Unsupported(format!("RETS version {other}"))),
        }
    }
}

/// Options recognised by `Session::new`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub output_mode: OutputMode,
    pub method: HttpMethod,
    pub user_agent: String,
    pub version: RetsVersion,
    /// Extra headers sent with every request.
    pub headers: BTreeMap<String, String>,
    pub mimemap: MimeMap,
    pub max_auth_retries: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            output_mode: OutputMode::default(),
            method: HttpMethod::default(),
            user_agent: default_user_agent(),
            version: RetsVersion::default(),
            headers: BTreeMap::new(),
            mimemap: MimeMap::default(),
            max_auth_retries: DEFAULT_MAX_AUTH_RETRIES,
        }
    }
}

fn default_user_agent() -> String {
    format!("rets-core/{}", env!("CARGO_PKG_VERSION"))
}

//! Seams for the pieces this crate does not implement itself.
//!
//! # Design
//! The session drives three collaborators: a `Transport` that performs the
//! HTTP round-trip, an `Authenticator` that answers digest challenges, and
//! a `ResponseParser` that turns RETS XML into a `StructuredResult`. They
//! are registered once through `Collaborators` and shared behind `Arc`, so
//! a session can be used from several threads.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{BoxError, TransportError};
use crate::http::{HttpMethod, HttpRequest, HttpResponse};

/// Reply code RETS servers use for success.
pub const REPLY_SUCCESS: i32 = 0;

/// Performs one blocking HTTP round-trip.
///
/// Non-2xx statuses are responses, not errors; only failures to talk to
/// the server at all are `Err`.
pub trait Transport: Send + Sync {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError>;
}

/// Everything an authenticator needs to answer a 401 challenge.
#[derive(Debug, Clone, Copy)]
pub struct AuthChallenge<'a> {
    /// The 401 response, carrying `WWW-Authenticate`.
    pub response: &'a HttpResponse,
    pub username: &'a str,
    pub password: &'a str,
    /// Path of the challenged request URL.
    pub path: &'a str,
    pub method: HttpMethod,
    /// Outgoing `RETS-Request-ID`, if one is set.
    pub request_id: Option<&'a str>,
    pub user_agent: &'a str,
    /// Digest `nc` value, already incremented for this attempt.
    pub nonce_count: u32,
}

/// Computes an `Authorization` header value from a challenge.
pub trait Authenticator: Send + Sync {
    fn authenticate(&self, challenge: &AuthChallenge<'_>) -> Result<String, BoxError>;
}

/// A parsed RETS reply.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StructuredResult {
    pub reply_code: i32,
    pub reply_text: String,
    /// `key=value` pairs of the `RETS-RESPONSE` section, or whatever flat
    /// fields the parser extracts.
    pub response: BTreeMap<String, String>,
    /// Records of a search result, one map per row.
    pub rows: Vec<BTreeMap<String, String>>,
}

impl StructuredResult {
    pub fn success(&self) -> bool {
        self.reply_code == REPLY_SUCCESS
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.response.get(key).map(String::as_str)
    }
}

/// Turns a RETS XML body into a `StructuredResult`.
pub trait ResponseParser: Send + Sync {
    fn parse(&self, body: &[u8]) -> Result<StructuredResult, BoxError>;
}

/// The collaborators a `Session` is built with.
///
/// A parser is optional: without one only raw output is available and
/// login is refused.
#[derive(Clone)]
pub struct Collaborators {
    pub transport: Arc<dyn Transport>,
    pub authenticator: Arc<dyn Authenticator>,
    pub parser: Option<Arc<dyn ResponseParser>>,
}

impl Collaborators {
    pub fn new(transport: Arc<dyn Transport>, authenticator: Arc<dyn Authenticator>) -> Self {
        Self {
            transport,
            authenticator,
            parser: None,
        }
    }

    #[must_use]
    pub fn with_parser(mut self, parser: Arc<dyn ResponseParser>) -> Self {
        self.parser = Some(parser);
        self
    }
}

impl fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collaborators")
            .field("parser", &self.parser.is_some())
            .finish_non_exhaustive()
    }
}

//! Test doubles for the collaborator traits.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use crate::collab::{AuthChallenge, Authenticator, ResponseParser, StructuredResult, Transport};
use crate::error::{BoxError, TransportError};
use crate::http::{HttpMethod, HttpRequest, HttpResponse};

pub fn response(status: u16, headers: &[(&str, &str)], body: &str) -> HttpResponse {
    HttpResponse {
        status,
        headers: headers
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
        body: body.as_bytes().to_vec(),
    }
}

/// Replays queued responses in order and records every request.
#[derive(Default)]
pub struct ScriptedTransport {
    responses: Mutex<VecDeque<Result<HttpResponse, TransportError>>>,
    requests: Mutex<Vec<HttpRequest>>,
    delay: Option<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn push(&self, response: HttpResponse) {
        self.responses.lock().unwrap().push_back(Ok(response));
    }

    pub fn push_error(&self, error: TransportError) {
        self.responses.lock().unwrap().push_back(Err(error));
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

impl Transport for ScriptedTransport {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        if let Some(delay) = self.delay {
            thread::sleep(delay);
        }
        let next = self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(TransportError::new("no scripted response left")));
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        next
    }
}

/// Owned copy of an `AuthChallenge`.
#[derive(Debug, Clone)]
pub struct RecordedChallenge {
    pub username: String,
    pub password: String,
    pub path: String,
    pub method: HttpMethod,
    pub request_id: Option<String>,
    pub user_agent: String,
    pub nonce_count: u32,
}

/// Answers `Digest nc=<count>` and remembers each challenge.
#[derive(Default)]
pub struct CountingAuthenticator {
    calls: Mutex<Vec<RecordedChallenge>>,
    fail: bool,
}

impl CountingAuthenticator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<RecordedChallenge> {
        self.calls.lock().unwrap().clone()
    }
}

impl Authenticator for CountingAuthenticator {
    fn authenticate(&self, challenge: &AuthChallenge<'_>) -> Result<String, BoxError> {
        self.calls.lock().unwrap().push(RecordedChallenge {
            username: challenge.username.to_string(),
            password: challenge.password.to_string(),
            path: challenge.path.to_string(),
            method: challenge.method,
            request_id: challenge.request_id.map(str::to_string),
            user_agent: challenge.user_agent.to_string(),
            nonce_count: challenge.nonce_count,
        });
        if self.fail {
            return Err("no WWW-Authenticate header".into());
        }
        Ok(format!("Digest nc={:08x}", challenge.nonce_count))
    }
}

/// Reads `ReplyCode`/`ReplyText` attributes and `key=value` lines.
///
/// Good enough for the small RETS documents used in tests; a body starting
/// with `GARBAGE` is rejected.
pub struct KeyValueParser;

impl ResponseParser for KeyValueParser {
    fn parse(&self, body: &[u8]) -> Result<StructuredResult, BoxError> {
        let text = std::str::from_utf8(body)?;
        if text.starts_with("GARBAGE") {
            return Err("not a RETS document".into());
        }
        let reply_code = attribute(text, "ReplyCode")
            .ok_or("missing ReplyCode")?
            .parse()?;
        let reply_text = attribute(text, "ReplyText").unwrap_or_default().to_string();
        let response: BTreeMap<String, String> = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.starts_with('<'))
            .filter_map(|line| line.split_once('='))
            .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
            .collect();
        Ok(StructuredResult {
            reply_code,
            reply_text,
            response,
            rows: Vec::new(),
        })
    }
}

fn attribute<'a>(text: &'a str, name: &str) -> Option<&'a str> {
    let start = text.find(&format!("{name}=\""))? + name.len() + 2;
    let len = text[start..].find('"')?;
    Some(&text[start..start + len])
}

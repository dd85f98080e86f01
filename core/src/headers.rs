//! Outgoing header state carried across transactions.
//!
//! Session continuity lives here: the cookie and `RETS-Session-ID` learned
//! from each response, and the `Authorization` credential computed after a
//! digest challenge. Only the transaction engine writes to it while a
//! session is active.

use tracing::trace;

use crate::http::{find_header, HttpResponse};

pub const COOKIE: &str = "Cookie";
pub const SET_COOKIE: &str = "Set-Cookie";
pub const SESSION_ID: &str = "RETS-Session-ID";
pub const AUTHORIZATION: &str = "Authorization";
pub const REQUEST_ID: &str = "RETS-Request-ID";
pub const USER_AGENT: &str = "User-Agent";
pub const RETS_VERSION: &str = "RETS-Version";
pub const ACCEPT: &str = "Accept";

/// Header name to value, with case-insensitive names and insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderState {
    entries: Vec<(String, String)>,
}

impl HeaderState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `name`, replacing any existing value regardless of case.
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self
            .entries
            .iter_mut()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
        {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name.to_string(), value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        find_header(&self.entries, name)
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        let index = self
            .entries
            .iter()
            .position(|(k, _)| k.eq_ignore_ascii_case(name))?;
        Some(self.entries.remove(index).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Copy of the current headers with `extra` layered on top.
    pub fn merged(&self, extra: &[(String, String)]) -> Vec<(String, String)> {
        let mut merged = self.clone();
        for (name, value) in extra {
            merged.set(name, value.clone());
        }
        merged.entries
    }

    /// Pick up session continuity from a successful response.
    ///
    /// `Cookie` and `RETS-Session-ID` are only rewritten when the response
    /// actually carries them; a response without cookies keeps the old ones.
    pub fn absorb(&mut self, response: &HttpResponse) {
        let cookies: Vec<&str> = response
            .header_all(SET_COOKIE)
            .filter_map(cookie_pair)
            .collect();
        if !cookies.is_empty() {
            let joined = cookies.join("; ");
            trace!(cookie = %joined, "storing session cookie");
            self.set(COOKIE, joined);
        }

        if let Some(session_id) = response.header(SESSION_ID) {
            self.set(SESSION_ID, session_id.trim());
        }
    }

    /// Forget everything tied to the current login.
    pub fn reset_session(&mut self) {
        self.remove(SESSION_ID);
        self.remove(COOKIE);
        self.remove(AUTHORIZATION);
    }
}

/// The `name=value` token of a `Set-Cookie` value, without attributes.
fn cookie_pair(set_cookie: &str) -> Option<&str> {
    let pair = set_cookie.split(';').next()?.trim();
    (!pair.is_empty()).then_some(pair)
}

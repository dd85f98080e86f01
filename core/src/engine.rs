//! The serialized request pipeline shared by every transaction.
//!
//! # Design
//! Two locks guard a session. `transaction` is held for the whole of
//! `request()`, so at most one call is in flight per session. `state` holds
//! the headers, capability map and digest nonce counter; it is released
//! around the blocking `Transport::send` and re-taken before the response
//! is inspected, so readers such as `Session::header` are never stuck
//! behind network I/O.
//!
//! A 401 answer is a digest challenge: the nonce counter is bumped, the
//! `Authenticator` produces a fresh `Authorization` value and the same
//! request is sent again, at most `max_auth_retries` times. When retries
//! run out the 401 response itself is returned; callers surface the failure
//! from the parsed reply.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};
use url::{form_urlencoded, Url};

use crate::capability::{Capability, CapabilityMap};
use crate::collab::{AuthChallenge, Authenticator, Transport};
use crate::error::{Result, RetsError};
use crate::headers::{HeaderState, AUTHORIZATION, REQUEST_ID, USER_AGENT};
use crate::http::{find_header, HttpMethod, HttpRequest, HttpResponse, RequestDescriptor};

const STATUS_UNAUTHORIZED: u16 = 401;
const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

#[derive(Clone, PartialEq, Eq)]
pub(crate) struct Credentials {
    pub username: String,
    pub password: String,
}

/// Mutable state of one logged-in session.
#[derive(Default)]
pub(crate) struct SessionState {
    pub headers: HeaderState,
    pub capabilities: CapabilityMap,
    pub credentials: Option<Credentials>,
    /// Digest `nc`. Only ever incremented.
    pub nonce_count: u32,
}

pub struct TransactionEngine {
    transaction: Mutex<()>,
    state: Mutex<SessionState>,
    transport: Arc<dyn Transport>,
    authenticator: Arc<dyn Authenticator>,
}

impl TransactionEngine {
    pub(crate) fn new(
        headers: HeaderState,
        transport: Arc<dyn Transport>,
        authenticator: Arc<dyn Authenticator>,
    ) -> Self {
        Self {
            transaction: Mutex::new(()),
            state: Mutex::new(SessionState {
                headers,
                ..SessionState::default()
            }),
            transport,
            authenticator,
        }
    }

    /// Send `descriptor`, answering up to `max_auth_retries` digest
    /// challenges, and fold the response's cookie and session id into the
    /// session headers.
    pub fn request(
        &self,
        descriptor: &RequestDescriptor,
        max_auth_retries: u32,
    ) -> Result<HttpResponse> {
        let _in_flight = self.begin();
        self.exchange(descriptor, max_auth_retries)
    }

    /// Send the Logout request, if a Logout URL was announced, then forget
    /// the session id, cookie, authorization, capabilities and credentials.
    ///
    /// Both steps run inside one transaction, so a call queued behind the
    /// logout never goes out with the old session nor leaves a cookie behind.
    pub fn end_session(&self, method: HttpMethod, max_auth_retries: u32) -> Result<()> {
        let _in_flight = self.begin();
        let logout_url = self.state().capabilities.get(Capability::Logout).cloned();
        let result = match logout_url {
            Some(url) => self
                .exchange(&RequestDescriptor::new(url, method), max_auth_retries)
                .map(|_| ()),
            None => {
                debug!("server announced no Logout URL, skipping logout request");
                Ok(())
            }
        };

        let mut state = self.state();
        state.headers.reset_session();
        state.capabilities.clear();
        state.credentials = None;
        result
    }

    fn begin(&self) -> MutexGuard<'_, ()> {
        self.transaction.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// One request with its challenge retries. The caller holds `transaction`.
    fn exchange(
        &self,
        descriptor: &RequestDescriptor,
        max_auth_retries: u32,
    ) -> Result<HttpResponse> {
        let mut retries_left = max_auth_retries;

        loop {
            let request = {
                let state = self.state();
                frame(descriptor, state.headers.merged(&descriptor.headers))
            };

            debug!(method = request.method.as_str(), url = %request.url, "sending RETS request");
            let response = self.transport.send(&request)?;
            debug!(status = response.status, bytes = response.body.len(), "received RETS response");

            let mut state = self.state();
            if response.status != STATUS_UNAUTHORIZED {
                state.headers.absorb(&response);
                return Ok(response);
            }
            if retries_left == 0 {
                debug!(url = %request.url, "auth retries exhausted, returning 401 response");
                return Ok(response);
            }
            retries_left -= 1;
            state.nonce_count += 1;
            warn!(
                url = %request.url,
                nonce_count = state.nonce_count,
                "server issued auth challenge, retrying with digest credentials"
            );

            let credential = answer_challenge(&state, &*self.authenticator, &request, &response)?;
            state.headers.set(AUTHORIZATION, credential);
        }
    }

    pub(crate) fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// URL for `capability`, or `MissingCapability`.
    pub fn capability_url(&self, capability: Capability) -> Result<Url> {
        self.state().capabilities.require(capability).cloned()
    }

    pub fn nonce_count(&self) -> u32 {
        self.state().nonce_count
    }
}

fn answer_challenge(
    state: &SessionState,
    authenticator: &dyn Authenticator,
    request: &HttpRequest,
    response: &HttpResponse,
) -> Result<String> {
    let (username, password) = state
        .credentials
        .as_ref()
        .map(|c| (c.username.as_str(), c.password.as_str()))
        .unwrap_or_default();
    let challenge = AuthChallenge {
        response,
        username,
        password,
        path: request.url.path(),
        method: request.method,
        request_id: state.headers.get(REQUEST_ID),
        user_agent: state.headers.get(USER_AGENT).unwrap_or_default(),
        nonce_count: state.nonce_count,
    };
    authenticator
        .authenticate(&challenge)
        .map_err(RetsError::Authentication)
}

/// Turn a descriptor plus merged session headers into a wire request.
///
/// Query data goes in the URL for GET and HEAD and in a form-encoded body
/// for POST.
fn frame(descriptor: &RequestDescriptor, mut headers: Vec<(String, String)>) -> HttpRequest {
    let mut url = descriptor.url.clone();
    let mut body = None;

    if !descriptor.data.is_empty() {
        match descriptor.method {
            HttpMethod::Get | HttpMethod::Head => {
                url.query_pairs_mut().extend_pairs(descriptor.data.iter());
            }
            HttpMethod::Post => {
                body = Some(
                    form_urlencoded::Serializer::new(String::new())
                        .extend_pairs(descriptor.data.iter())
                        .finish(),
                );
                if find_header(&headers, "content-type").is_none() {
                    headers.push(("Content-Type".to_string(), FORM_CONTENT_TYPE.to_string()));
                }
            }
        }
    }

    HttpRequest {
        method: descriptor.method,
        url,
        headers,
        body,
    }
}

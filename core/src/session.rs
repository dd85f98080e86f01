//! The five RETS transactions on top of the engine.
//!
//! # Design
//! `Session` owns a `TransactionEngine` plus the configuration and the
//! optional response parser. Each transaction builds a
//! `RequestDescriptor`, hands it to the engine, then turns the body into
//! the caller's output mode. Transactions take `&self`; the engine
//! serializes them.

use std::sync::Arc;

use tracing::{debug, info, trace, warn};
use url::Url;

use crate::capability::{Capability, CapabilityMap};
use crate::collab::{Collaborators, ResponseParser, StructuredResult};
use crate::config::{ClientConfig, OutputMode, RetsVersion};
use crate::engine::{Credentials, TransactionEngine};
use crate::error::{Result, RetsError};
use crate::headers::{HeaderState, ACCEPT, RETS_VERSION, USER_AGENT};
use crate::http::{HttpMethod, RequestDescriptor};
use crate::multipart::{self, ContentType};
use crate::object::{DataObject, MimeMap};

/// Single-object GetObject bodies at or below this many bytes are treated
/// as empty placeholders and dropped. The threshold is empirical.
pub const MIN_SINGLE_OBJECT_LENGTH: usize = 100;

const MULTIPART_PARALLEL: &str = "multipart/parallel";
const TEXT_XML: &str = "text/xml";
const METADATA_ACCEPT: &str = "text/xml,text/plain;q=0.5";
const FORMAT_COMPACT: &str = "COMPACT";
const QUERY_TYPE_DMQL2: &str = "DMQL2";

/// A transaction body in the session's output mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Raw(Vec<u8>),
    Structured(StructuredResult),
}

impl Reply {
    pub fn structured(&self) -> Option<&StructuredResult> {
        match self {
            Reply::Structured(result) => Some(result),
            Reply::Raw(_) => None,
        }
    }

    pub fn raw(&self) -> Option<&[u8]> {
        match self {
            Reply::Raw(body) => Some(body),
            Reply::Structured(_) => None,
        }
    }
}

/// Outcome of a successful login.
#[derive(Debug)]
pub struct LoginResult {
    pub reply: Reply,
    /// Body fetched from the `Action` URL, when the server announced one.
    /// A failed fetch is kept here as `RetsError::Transaction`; the login
    /// itself still succeeded.
    pub secondary_response: Option<Result<Vec<u8>>>,
}

/// One logical RETS connection.
pub struct Session {
    login_url: Url,
    config: ClientConfig,
    parser: Option<Arc<dyn ResponseParser>>,
    engine: TransactionEngine,
}

impl Session {
    /// Create a session for `login_url`.
    ///
    /// Fails with `Unsupported` when structured output is configured but
    /// no parser is registered.
    pub fn new(login_url: &str, config: ClientConfig, collaborators: Collaborators) -> Result<Self> {
        let login_url = Url::parse(login_url)?;
        check_output_mode(config.output_mode, collaborators.parser.is_some())?;

        let mut headers = HeaderState::new();
        headers.set(USER_AGENT, config.user_agent.as_str());
        headers.set(ACCEPT, "*/*");
        headers.set(RETS_VERSION, config.version.header_value());
        for (name, value) in &config.headers {
            headers.set(name, value.as_str());
        }

        let engine = TransactionEngine::new(
            headers,
            collaborators.transport,
            collaborators.authenticator,
        );
        Ok(Self {
            login_url,
            config,
            parser: collaborators.parser,
            engine,
        })
    }

    // -----------------------------------------------------------------------
    // Transactions
    // -----------------------------------------------------------------------

    /// Log in and discover the server's capability URLs.
    ///
    /// The body is always run through the structured parser, whatever the
    /// output mode, because the capability URLs live in it. A failing reply
    /// leaves the previous capability map untouched.
    pub fn login(&self, username: &str, password: &str) -> Result<LoginResult> {
        let parser = self.structured_parser()?;
        {
            let mut state = self.engine.state();
            state.headers.set(ACCEPT, "*/*");
            state.credentials = Some(Credentials {
                username: username.to_string(),
                password: password.to_string(),
            });
        }

        let descriptor = RequestDescriptor::new(self.login_url.clone(), self.config.method);
        let response = self.engine.request(&descriptor, self.config.max_auth_retries)?;
        let parsed = parser.parse(&response.body).map_err(RetsError::Parser)?;
        if !parsed.success() {
            return Err(RetsError::Login {
                status: response.status,
                message: response.status_message(),
                reply_code: parsed.reply_code,
                reply_text: parsed.reply_text,
            });
        }

        let capabilities = CapabilityMap::discover(&self.login_url, |name| parsed.get(name));
        info!(
            url = %self.login_url,
            capabilities = capabilities.len(),
            "logged in to RETS server"
        );
        self.engine.state().capabilities = capabilities;

        let reply = match self.config.output_mode {
            OutputMode::Structured => Reply::Structured(parsed),
            OutputMode::Raw => Reply::Raw(response.body),
        };
        let secondary_response = self.follow_action();

        Ok(LoginResult {
            reply,
            secondary_response,
        })
    }

    /// Log in, run `f`, then log out on every way out of `f`.
    ///
    /// Logout also runs if `f` panics. When `f` fails, its error wins over
    /// a logout failure, which is only logged.
    pub fn login_with<T, E, F>(&self, username: &str, password: &str, f: F) -> Result<T, E>
    where
        F: FnOnce(&Session, LoginResult) -> Result<T, E>,
        E: From<RetsError>,
    {
        let result = self.login(username, password)?;
        let guard = LogoutGuard { session: Some(self) };
        let outcome = f(self, result);
        let logout = guard.logout();

        match outcome {
            Ok(value) => {
                logout?;
                Ok(value)
            }
            Err(err) => {
                if let Err(logout_err) = logout {
                    warn!(error = %logout_err, "logout failed after login continuation error");
                }
                Err(err)
            }
        }
    }

    /// End the session. Succeeds without a request when the server never
    /// announced a Logout URL.
    pub fn logout(&self) -> Result<()> {
        let result = self
            .engine
            .end_session(self.config.method, self.config.max_auth_retries);
        info!(url = %self.login_url, "logged out of RETS server");
        result
    }

    /// GetMetadata for `metadata_type` (e.g. `METADATA-SYSTEM`) and `id`
    /// (`*` or `0` for everything).
    pub fn get_metadata(&self, metadata_type: &str, id: &str) -> Result<Reply> {
        let url = self.engine.capability_url(Capability::GetMetadata)?;
        let descriptor = RequestDescriptor::new(url, self.config.method)
            .header(ACCEPT, METADATA_ACCEPT)
            .data("Type", metadata_type)
            .data("ID", id)
            .data("Format", FORMAT_COMPACT);
        let response = self.engine.request(&descriptor, self.config.max_auth_retries)?;
        self.render(response.body)
    }

    /// Search with a DMQL2 `query`. `options` override the defaults
    /// (`Format=COMPACT`, `Count=0`, ...) and are sent as text.
    pub fn search<I, K, V>(
        &self,
        search_type: &str,
        class: &str,
        query: &str,
        options: I,
    ) -> Result<Reply>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: ToString,
    {
        let url = self.engine.capability_url(Capability::Search)?;
        let mut descriptor = RequestDescriptor::new(url, self.config.method)
            .data("SearchType", search_type)
            .data("Class", class)
            .data("Query", query)
            .data("QueryType", QUERY_TYPE_DMQL2)
            .data("Format", FORMAT_COMPACT)
            .data("Count", "0");
        for (key, value) in options {
            descriptor.data.insert(key.into(), value.to_string());
        }
        let response = self.engine.request(&descriptor, self.config.max_auth_retries)?;
        self.render(response.body)
    }

    /// Fetch the objects (photos, documents) attached to a resource.
    ///
    /// `id` follows RETS syntax, e.g. `LN000123:*` for every photo of one
    /// listing. `location` 1 asks for URLs instead of bytes where supported.
    pub fn get_object(
        &self,
        resource: &str,
        object_type: &str,
        id: &str,
        location: u32,
    ) -> Result<Vec<DataObject>> {
        let url = self.engine.capability_url(Capability::GetObject)?;
        let descriptor = RequestDescriptor::new(url, self.config.method)
            .header(ACCEPT, self.config.mimemap.accept_header())
            .data("Resource", resource)
            .data("Type", object_type)
            .data("ID", id)
            .data("Location", location.to_string());
        let response = self.engine.request(&descriptor, self.config.max_auth_retries)?;

        let content_type = ContentType::parse(response.header("content-type").unwrap_or_default());

        if content_type.is(MULTIPART_PARALLEL) {
            let boundary = content_type.boundary().ok_or_else(|| {
                RetsError::Malformed("multipart/parallel response without boundary".to_string())
            })?;
            let objects: Vec<DataObject> = multipart::decode(&response.body, boundary)
                .into_iter()
                .map(|part| DataObject::from_part(part, &self.config.mimemap))
                .collect();
            debug!(count = objects.len(), "decoded multipart GetObject response");
            return Ok(objects);
        }

        if content_type.is(TEXT_XML) {
            return self.object_error_reply(&response.body);
        }

        let length = response.content_length();
        if length <= MIN_SINGLE_OBJECT_LENGTH {
            trace!(length, "dropping short single-object GetObject body");
            return Ok(Vec::new());
        }
        let headers = ["Content-Type", "Object-ID", "Content-ID"]
            .into_iter()
            .filter_map(|name| {
                response
                    .header(name)
                    .map(|value| (name.to_string(), value.to_string()))
            })
            .collect();
        Ok(vec![DataObject::new(
            headers,
            response.body,
            &self.config.mimemap,
        )])
    }

    // -----------------------------------------------------------------------
    // Configuration
    // -----------------------------------------------------------------------

    pub fn output_mode(&self) -> OutputMode {
        self.config.output_mode
    }

    /// Switch output mode. `Structured` needs a registered parser.
    pub fn set_output(&mut self, mode: OutputMode) -> Result<()> {
        check_output_mode(mode, self.parser.is_some())?;
        self.config.output_mode = mode;
        Ok(())
    }

    pub fn request_method(&self) -> HttpMethod {
        self.config.method
    }

    pub fn set_request_method(&mut self, method: HttpMethod) {
        self.config.method = method;
    }

    pub fn set_max_auth_retries(&mut self, retries: u32) {
        self.config.max_auth_retries = retries;
    }

    pub fn set_user_agent(&mut self, user_agent: &str) {
        self.config.user_agent = user_agent.to_string();
        self.engine.state().headers.set(USER_AGENT, user_agent);
    }

    pub fn rets_version(&self) -> RetsVersion {
        self.config.version
    }

    pub fn set_rets_version(&mut self, version: RetsVersion) {
        self.config.version = version;
        self.engine
            .state()
            .headers
            .set(RETS_VERSION, version.header_value());
    }

    /// Set a header sent with every following request.
    pub fn set_header(&self, name: &str, value: &str) {
        self.engine.state().headers.set(name, value);
    }

    pub fn header(&self, name: &str) -> Option<String> {
        self.engine.state().headers.get(name).map(str::to_string)
    }

    pub fn remove_header(&self, name: &str) -> Option<String> {
        self.engine.state().headers.remove(name)
    }

    pub fn mimemap(&self) -> &MimeMap {
        &self.config.mimemap
    }

    pub fn mimemap_mut(&mut self) -> &mut MimeMap {
        &mut self.config.mimemap
    }

    pub fn login_url(&self) -> &Url {
        &self.login_url
    }

    /// Snapshot of the capability URLs from the last login.
    pub fn capabilities(&self) -> CapabilityMap {
        self.engine.state().capabilities.clone()
    }

    pub fn nonce_count(&self) -> u32 {
        self.engine.nonce_count()
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn structured_parser(&self) -> Result<&Arc<dyn ResponseParser>> {
        self.parser.as_ref().ok_or_else(|| {
            RetsError::Unsupported("no structured response parser registered".to_string())
        })
    }

    fn render(&self, body: Vec<u8>) -> Result<Reply> {
        match self.config.output_mode {
            OutputMode::Raw => Ok(Reply::Raw(body)),
            OutputMode::Structured => {
                let parsed = self
                    .structured_parser()?
                    .parse(&body)
                    .map_err(RetsError::Parser)?;
                Ok(Reply::Structured(parsed))
            }
        }
    }

    fn discovered(&self, capability: Capability) -> Option<Url> {
        self.engine.state().capabilities.get(capability).cloned()
    }

    fn follow_action(&self) -> Option<Result<Vec<u8>>> {
        let url = self.discovered(Capability::Action)?;
        let descriptor = RequestDescriptor::new(url, HttpMethod::Get);
        let outcome = match self.engine.request(&descriptor, self.config.max_auth_retries) {
            Ok(response) => Ok(response.body),
            Err(err) => {
                warn!(error = %err, "failed to follow Action URL after login");
                Err(RetsError::Transaction(Box::new(err)))
            }
        };
        Some(outcome)
    }

    /// A `text/xml` GetObject answer is an error document.
    fn object_error_reply(&self, body: &[u8]) -> Result<Vec<DataObject>> {
        let Some(parser) = self.parser.as_ref() else {
            warn!("GetObject returned an XML reply but no parser is registered");
            return Ok(Vec::new());
        };
        let parsed = parser.parse(body).map_err(RetsError::Parser)?;
        if parsed.success() {
            return Ok(Vec::new());
        }
        Err(RetsError::Reply {
            code: parsed.reply_code,
            text: parsed.reply_text,
        })
    }
}

fn check_output_mode(mode: OutputMode, has_parser: bool) -> Result<()> {
    if mode == OutputMode::Structured && !has_parser {
        return Err(RetsError::Unsupported(
            "structured output requires a registered response parser".to_string(),
        ));
    }
    Ok(())
}

/// Logs the session out when dropped, unless `logout` already did.
struct LogoutGuard<'a> {
    session: Option<&'a Session>,
}

impl LogoutGuard<'_> {
    fn logout(mut self) -> Result<()> {
        match self.session.take() {
            Some(session) => session.logout(),
            None => Ok(()),
        }
    }
}

impl Drop for LogoutGuard<'_> {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            if let Err(err) = session.logout() {
                warn!(error = %err, "logout during unwind failed");
            }
        }
    }
}

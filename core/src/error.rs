//! Error types for the RETS client.
//!
//! # Design
//! One enum covers every failure a transaction can report. The digest
//! challenge is handled entirely inside the engine and never appears here;
//! an exhausted challenge is returned as a plain 401 response instead.
//! Collaborator failures keep their original error as `source()`.

use thiserror::Error;

use crate::capability::Capability;

/// Boxed error produced by a pluggable collaborator.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub type Result<T, E = RetsError> = std::result::Result<T, E>;

/// Errors returned by `Session` transactions.
#[derive(Debug, Error)]
pub enum RetsError {
    /// The login round-trip completed but the server's reply reports failure.
    #[error("login failed ({message}): reply {reply_code}: {reply_text}")]
    Login {
        status: u16,
        message: String,
        reply_code: i32,
        reply_text: String,
    },

    /// The server never announced a URL for this transaction.
    #[error("server did not provide a {0} capability URL")]
    MissingCapability(Capability),

    /// The response parser rejected the body.
    #[error("failed to parse response")]
    Parser(#[source] BoxError),

    /// A secondary transaction failed; the enclosing one still succeeded.
    #[error("transaction failed")]
    Transaction(#[source] Box<RetsError>),

    /// An output mode, parser or protocol version that is not available.
    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The authenticator could not answer a digest challenge.
    #[error("failed to compute credentials for auth challenge")]
    Authentication(#[source] BoxError),

    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// The response framing could not be understood.
    #[error("malformed response: {0}")]
    Malformed(String),

    /// The server answered with an error reply document.
    #[error("server replied {code}: {text}")]
    Reply { code: i32, text: String },
}

/// Failure to complete an HTTP round-trip.
#[derive(Debug, Error)]
#[error("transport error: {message}")]
pub struct TransportError {
    message: String,
    #[source]
    source: Option<BoxError>,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self {
            message: message.into(),
            source: Some(source.into()),
        }
    }
}

impl From<ureq::Error> for TransportError {
    fn from(err: ureq::Error) -> Self {
        TransportError::with_source(err.to_string(), err)
    }
}

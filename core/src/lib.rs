//! Blocking client core for RETS 1.x servers.
//!
//! # Overview
//! A `Session` logs in to a RETS server, learns the per-capability URLs
//! from the login reply and then runs Search, GetMetadata, GetObject and
//! Logout transactions against them. Every call goes through one
//! `TransactionEngine`, which keeps the session cookie and
//! `RETS-Session-ID` current and answers HTTP digest challenges.
//!
//! # Design
//! - The HTTP round-trip, the digest computation and XML parsing are
//!   collaborators (`Transport`, `Authenticator`, `ResponseParser`)
//!   registered through `Collaborators`. `UreqTransport` is the bundled
//!   transport.
//! - Calls on one session are serialized; a session can be shared between
//!   threads by reference.
//! - GetObject bodies are decoded into `DataObject`s, splitting
//!   `multipart/parallel` responses part by part.

pub mod capability;
pub mod collab;
pub mod config;
pub mod engine;
pub mod error;
pub mod headers;
pub mod http;
pub mod multipart;
pub mod object;
pub mod session;
pub mod transport;

#[cfg(test)]
mod testing;

pub use capability::{Capability, CapabilityMap};
pub use collab::{
    AuthChallenge, Authenticator, Collaborators, ResponseParser, StructuredResult, Transport,
};
pub use config::{ClientConfig, OutputMode, RetsVersion};
pub use engine::TransactionEngine;
pub use error::{BoxError, RetsError, TransportError};
pub use crate::http::{HttpMethod, HttpRequest, HttpResponse, RequestDescriptor};
pub use object::{DataObject, MimeMap};
pub use session::{LoginResult, Reply, Session};
pub use transport::UreqTransport;

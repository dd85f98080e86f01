//! Capability URLs announced by the server at login.

use std::collections::BTreeMap;
use std::fmt;

use url::Url;

use crate::error::{Result, RetsError};

/// The fixed set of transactions a RETS 1.x server may announce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Capability {
    Action,
    ChangePassword,
    GetObject,
    Login,
    LoginComplete,
    Logout,
    Search,
    GetMetadata,
    Update,
}

impl Capability {
    pub const ALL: [Capability; 9] = [
        Capability::Action,
        Capability::ChangePassword,
        Capability::GetObject,
        Capability::Login,
        Capability::LoginComplete,
        Capability::Logout,
        Capability::Search,
        Capability::GetMetadata,
        Capability::Update,
    ];

    /// Key used for this capability in the login response body.
    pub fn as_str(self) -> &'static str {
        match self {
            Capability::Action => "Action",
            Capability::ChangePassword => "ChangePassword",
            Capability::GetObject => "GetObject",
            Capability::Login => "Login",
            Capability::LoginComplete => "LoginComplete",
            Capability::Logout => "Logout",
            Capability::Search => "Search",
            Capability::GetMetadata => "GetMetadata",
            Capability::Update => "Update",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Capability name to absolute endpoint URL.
///
/// Every URL shares the scheme, host and port of the login URL; only the
/// path and query come from the server.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapabilityMap {
    urls: BTreeMap<Capability, Url>,
}

impl CapabilityMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the map from a parsed login response.
    ///
    /// `lookup` returns the server's value for a capability name. Names it
    /// does not know are left out of the map. The map is built fresh so the
    /// caller can swap it in whole.
    pub fn discover<'a, F>(login_url: &Url, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<&'a str>,
    {
        let mut urls = BTreeMap::new();
        for capability in Capability::ALL {
            if let Some(value) = lookup(capability.as_str()) {
                urls.insert(capability, resolve(login_url, value.trim()));
            }
        }
        Self { urls }
    }

    pub fn get(&self, capability: Capability) -> Option<&Url> {
        self.urls.get(&capability)
    }

    /// URL for `capability`, or `MissingCapability`.
    pub fn require(&self, capability: Capability) -> Result<&Url> {
        self.get(capability)
            .ok_or(RetsError::MissingCapability(capability))
    }

    pub fn insert(&mut self, capability: Capability, url: Url) {
        self.urls.insert(capability, url);
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }

    pub fn clear(&mut self) {
        self.urls.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (Capability, &Url)> {
        self.urls.iter().map(|(c, u)| (*c, u))
    }
}

/// Place a server-announced value on the login origin.
///
/// Servers announce either a path (`/rets/search?Style=1`) or an absolute
/// URL. Only the path and query are taken from an absolute URL.
fn resolve(login_url: &Url, value: &str) -> Url {
    let (path, query) = match Url::parse(value) {
        Ok(absolute) if absolute.has_host() => {
            (absolute.path().to_string(), absolute.query().map(str::to_string))
        }
        _ => match value.split_once('?') {
            Some((path, query)) => (path.to_string(), Some(query.to_string())),
            None => (value.to_string(), None),
        },
    };
    let mut url = login_url.clone();
    url.set_path(&path);
    url.set_query(query.as_deref().filter(|q| !q.is_empty()));
    url.set_fragment(None);
    url
}

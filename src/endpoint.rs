//! Network addresses of provisioned backends.

use std::sync::Arc;

/// The URL at which a provisioned backend accepts requests.
///
/// The string is taken as given: it is either built from the proxy template
/// or read back from the store.
#[derive(Clone, Debug, PartialEq, Eq, Ord, PartialOrd, Hash)]
pub struct Endpoint(pub Arc<str>);

impl Endpoint {
    pub fn new(url: impl ToString) -> Self {
        Self(url.to_string().into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for Endpoint {
    fn from(s: String) -> Self {
        Self(s.into())
    }
}

impl From<&'_ str> for Endpoint {
    fn from(s: &'_ str) -> Self {
        Self(s.into())
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

//! Identifiers for provisioned backends.
//!
//! A [ResourceKey] names what a caller wants (a pair of model identifiers),
//! and a [FunctionName] names the remote function serving that key.

use sha2::{Digest, Sha256};
use std::sync::Arc;

/// Prefix for every provisioned function name.
pub const FUNCTION_NAME_PREFIX: &str = "sd_";

// Number of digest bytes kept in a function name. 16 bytes (32 hex chars)
// keeps the name well under the platform's 64 character limit.
const FUNCTION_NAME_DIGEST_BYTES: usize = 16;

/// Describes the lookup key for a pair of models.
///
/// This is the key used by both the in-memory cache and the durable store.
#[derive(Clone, Debug, PartialEq, Eq, Ord, PartialOrd, Hash)]
pub struct ResourceKey(pub Arc<str>);

impl ResourceKey {
    /// Derives the key for a primary model and its variant.
    pub fn new(primary: &str, variant: &str) -> Self {
        Self(Arc::from(format!("{primary}:{variant}")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Hashes this key into the name of the function which serves it.
    pub fn function_name(&self) -> FunctionName {
        FunctionName::derive(self)
    }
}

impl From<String> for ResourceKey {
    fn from(s: String) -> Self {
        Self(Arc::from(s))
    }
}

impl From<&'_ str> for ResourceKey {
    fn from(s: &'_ str) -> Self {
        Self(Arc::from(s))
    }
}

impl std::borrow::Borrow<str> for ResourceKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Describes the name of a remote function.
///
/// Derived from a [ResourceKey] through a one-way hash, so the result only
/// contains characters the platform accepts in function names. The same key
/// always yields the same name, which lets "does this backend exist" be
/// answered by name alone.
#[derive(Clone, Debug, PartialEq, Eq, Ord, PartialOrd, Hash)]
pub struct FunctionName(pub Arc<str>);

impl FunctionName {
    pub fn derive(key: &ResourceKey) -> Self {
        let digest = Sha256::digest(key.as_str().as_bytes());
        let name = format!(
            "{FUNCTION_NAME_PREFIX}{}",
            hex::encode(&digest[..FUNCTION_NAME_DIGEST_BYTES])
        );
        Self(Arc::from(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for FunctionName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn key_joins_models_with_colon() {
        let key = ResourceKey::new("sd15", "vae-ft");
        assert_eq!(key.as_str(), "sd15:vae-ft");
    }

    #[test]
    fn function_name_is_stable() {
        let a = ResourceKey::new("sd15", "vae-ft").function_name();
        let b = ResourceKey::new("sd15", "vae-ft").function_name();
        assert_eq!(a, b);
    }

    #[test]
    fn function_name_differs_between_keys() {
        let a = ResourceKey::new("sd15", "vae-ft").function_name();
        let b = ResourceKey::new("sd15", "vae-mse").function_name();
        let c = ResourceKey::new("sd15:vae", "ft").function_name();
        assert_ne!(a, b);
        // Both of these join to "sd15:vae:ft".
        assert_eq!(c, ResourceKey::new("sd15", "vae:ft").function_name());
    }

    #[test]
    fn function_name_only_uses_safe_characters() {
        let name = ResourceKey::new("v1-5-pruned.safetensors", "Auto / None").function_name();
        assert!(name.as_str().starts_with(FUNCTION_NAME_PREFIX));
        assert_eq!(name.as_str().len(), FUNCTION_NAME_PREFIX.len() + 32);
        assert!(name
            .as_str()
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_'));
    }
}

//! Store key generation for client identities.

/// Default namespace for rate limit keys in the shared store.
pub const DEFAULT_KEY_PREFIX: &str = "rate_limit";

/// The store key holding the window counter for one client identity.
///
/// The identity is opaque; the key is the prefix and the identity joined
/// by a colon, so it is stable for the same identity and distinct across
/// identities.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RateKey(String);

impl RateKey {
    /// Create a key for `identity` under `prefix`.
    pub fn new(prefix: &str, identity: &str) -> Self {
        Self(format!("{}:{}", prefix, identity))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

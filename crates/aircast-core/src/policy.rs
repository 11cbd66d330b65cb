//! Access policy gating the broadcaster role claim.
//!
//! The decision rule is isolated behind a trait so deployments can swap
//! between an open relay, an origin pin, or a shared token without
//! touching the router. A failed claim closes the connection with a
//! policy-violation close; it is never demoted to listener.

/// Decides whether a connection may claim the broadcaster role.
///
/// Pure predicate: no side effects, no blocking.
pub trait AccessPolicy: Send + Sync {
    /// Authorize a broadcaster claim from `origin`, optionally carrying a
    /// shared `token` from the registration message.
    fn authorize(&self, origin: &str, token: Option<&str>) -> bool;
}

/// Accepts every claim. The default when no gate is configured.
pub struct AllowAll;

impl AccessPolicy for AllowAll {
    fn authorize(&self, _origin: &str, _token: Option<&str>) -> bool {
        true
    }
}

/// Accepts claims only from a single origin address (port ignored).
pub struct OriginPolicy {
    allowed: String,
}

impl OriginPolicy {
    /// Create a policy pinned to one host address.
    #[must_use]
    pub fn new(allowed: impl Into<String>) -> Self {
        Self {
            allowed: allowed.into(),
        }
    }
}

/// Strip the port and any IPv6 brackets from an `addr:port` origin string.
fn host_of(origin: &str) -> &str {
    let host = match origin.rsplit_once(':') {
        // "::1" has colons but no port separator we can trust; only strip
        // when the remainder parses as a port.
        Some((host, port)) if port.chars().all(|c| c.is_ascii_digit()) && !port.is_empty() => host,
        _ => origin,
    };
    host.trim_start_matches('[').trim_end_matches(']')
}

impl AccessPolicy for OriginPolicy {
    fn authorize(&self, origin: &str, _token: Option<&str>) -> bool {
        host_of(origin) == host_of(&self.allowed)
    }
}

/// Accepts claims carrying the configured shared secret.
pub struct TokenPolicy {
    secret: String,
}

impl TokenPolicy {
    /// Create a policy requiring the given token.
    #[must_use]
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }
}

impl AccessPolicy for TokenPolicy {
    fn authorize(&self, _origin: &str, token: Option<&str>) -> bool {
        token == Some(self.secret.as_str())
    }
}

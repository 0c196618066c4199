//! Request context and limiter-key derivation.
//!
//! A [`RateLimitContext`] is the immutable fingerprint of one request: who is
//! asking (ip, optional account), from what (user agent, optional structured
//! client fingerprint, optional session device) and with which headers. It is
//! created once per request and only read afterwards.
//!
//! The context itself is never persisted. Budget accounting works on
//! [`LimiterKey`]s derived from it: an IP key is always derived, an account
//! key when an account id is present, a session key when the session is
//! trusted and carries a device id, and a fingerprint key as a hash of the
//! structured fingerprint map.

use ahash::AHasher;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::net::IpAddr;

/// Scope of a derived limiter key, used to select the matching budget limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyScope {
    /// Keyed by client IP address
    Ip,
    /// Keyed by account id
    Account,
    /// Keyed by trusted-session device id
    Session,
    /// Keyed by a hash of the structured client fingerprint
    Fingerprint,
}

impl KeyScope {
    /// Key prefix as it appears in the persisted key string.
    pub fn prefix(&self) -> &'static str {
        match self {
            KeyScope::Ip => "ip",
            KeyScope::Account => "account",
            KeyScope::Session => "session",
            KeyScope::Fingerprint => "fp",
        }
    }
}

/// A budget-accounting key derived from a request context.
///
/// Rendered as `<scope>:<value>`, e.g. `ip:1.2.3.4` or `account:42`.
/// Keys are what the store persists; the originating context never is.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LimiterKey {
    scope: KeyScope,
    value: String,
}

impl LimiterKey {
    /// Build an IP-scoped key.
    pub fn ip(addr: IpAddr) -> Self {
        Self {
            scope: KeyScope::Ip,
            value: addr.to_string(),
        }
    }

    /// Build an account-scoped key.
    pub fn account(account_id: &str) -> Self {
        Self {
            scope: KeyScope::Account,
            value: account_id.to_string(),
        }
    }

    /// Build a session-scoped key from a device id.
    pub fn session(device_id: &str) -> Self {
        Self {
            scope: KeyScope::Session,
            value: device_id.to_string(),
        }
    }

    /// Build a fingerprint-scoped key from a fingerprint hash.
    pub fn fingerprint(hash: u64) -> Self {
        Self {
            scope: KeyScope::Fingerprint,
            value: format!("{:016x}", hash),
        }
    }

    /// The scope this key was derived under.
    pub fn scope(&self) -> KeyScope {
        self.scope
    }
}

impl fmt::Display for LimiterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.scope.prefix(), self.value)
    }
}

/// Immutable per-request fingerprint.
///
/// Construct with [`RateLimitContext::new`] and the `with_*` methods, then
/// treat as read-only. Header and fingerprint maps are ordered maps so that
/// derived hashes are independent of insertion order.
#[derive(Debug, Clone)]
pub struct RateLimitContext {
    ip: IpAddr,
    user_agent: String,
    account_id: Option<String>,
    client_fingerprint: Option<BTreeMap<String, String>>,
    session_device_id: Option<String>,
    is_session_trusted: bool,
    headers: BTreeMap<String, String>,
}

impl RateLimitContext {
    /// Create a context from the minimum every request has.
    pub fn new(ip: IpAddr, user_agent: impl Into<String>) -> Self {
        Self {
            ip,
            user_agent: user_agent.into(),
            account_id: None,
            client_fingerprint: None,
            session_device_id: None,
            is_session_trusted: false,
            headers: BTreeMap::new(),
        }
    }

    /// Attach the authenticated account id.
    pub fn with_account_id(mut self, account_id: impl Into<String>) -> Self {
        self.account_id = Some(account_id.into());
        self
    }

    /// Attach a structured client fingerprint.
    pub fn with_client_fingerprint(mut self, fingerprint: BTreeMap<String, String>) -> Self {
        self.client_fingerprint = Some(fingerprint);
        self
    }

    /// Attach the session device id.
    pub fn with_session_device_id(mut self, device_id: impl Into<String>) -> Self {
        self.session_device_id = Some(device_id.into());
        self
    }

    /// Mark the session as trusted.
    pub fn with_session_trusted(mut self, trusted: bool) -> Self {
        self.is_session_trusted = trusted;
        self
    }

    /// Attach request headers.
    pub fn with_headers(mut self, headers: BTreeMap<String, String>) -> Self {
        self.headers = headers;
        self
    }

    /// Client IP address.
    pub fn ip(&self) -> IpAddr {
        self.ip
    }

    /// Client user agent.
    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    /// Authenticated account id, if any.
    pub fn account_id(&self) -> Option<&str> {
        self.account_id.as_deref()
    }

    /// Structured client fingerprint, if any.
    pub fn client_fingerprint(&self) -> Option<&BTreeMap<String, String>> {
        self.client_fingerprint.as_ref()
    }

    /// Session device id, if any.
    pub fn session_device_id(&self) -> Option<&str> {
        self.session_device_id.as_deref()
    }

    /// Whether the session carrying this request is trusted.
    pub fn is_session_trusted(&self) -> bool {
        self.is_session_trusted
    }

    /// Request headers. Order is irrelevant and not preserved from the wire.
    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    /// Hash of the structured client fingerprint, if one is attached.
    ///
    /// Fields are hashed in sorted order (the map guarantees this), so two
    /// fingerprints with the same entries hash identically regardless of how
    /// they were assembled.
    pub fn fingerprint_hash(&self) -> Option<u64> {
        self.client_fingerprint.as_ref().map(|fp| {
            let mut hasher = AHasher::default();
            for (key, value) in fp {
                key.hash(&mut hasher);
                value.hash(&mut hasher);
            }
            hasher.finish()
        })
    }

    /// Derive every limiter key this context supports.
    ///
    /// The IP key is always present. Account, session, and fingerprint keys
    /// are derived only when the context carries the matching identity:
    /// an account id, a trusted session with a device id, or a fingerprint.
    pub fn limiter_keys(&self) -> Vec<LimiterKey> {
        let mut keys = vec![LimiterKey::ip(self.ip)];

        if let Some(account_id) = self.account_id.as_deref() {
            keys.push(LimiterKey::account(account_id));
        }

        if self.is_session_trusted {
            if let Some(device_id) = self.session_device_id.as_deref() {
                keys.push(LimiterKey::session(device_id));
            }
        }

        if let Some(hash) = self.fingerprint_hash() {
            keys.push(LimiterKey::fingerprint(hash));
        }

        keys
    }
}

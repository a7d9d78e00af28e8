//! Server configuration: listener, auth/ACL, rate limiting, slow-log,
//! TLS. Plain structs with builder-style setters; no CLI surface here.

use std::path::PathBuf;
use std::time::Duration;

/// Access level of an ACL user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AclPerms {
    /// Every command.
    All,
    /// The fixed read-only command set.
    ReadOnly,
    /// An explicit allow-list of command names (uppercase).
    Commands(Vec<String>),
}

/// One configured user.
#[derive(Debug, Clone)]
pub struct AclUser {
    pub name: String,
    pub password: String,
    pub perms: AclPerms,
}

impl AclUser {
    pub fn new(name: impl Into<String>, password: impl Into<String>, perms: AclPerms) -> AclUser {
        AclUser {
            name: name.into(),
            password: password.into(),
            perms,
        }
    }
}

/// Per-client token bucket parameters.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    /// Commands allowed per second.
    pub per_second: u64,
}

/// TLS listener wrap; both files PEM-encoded.
#[derive(Debug, Clone)]
pub struct TlsConfig {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
}

/// Full server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Listen address, e.g. `127.0.0.1:6379`.
    pub addr: String,
    /// Connection cap; accepting past it closes the socket immediately.
    pub max_clients: usize,
    /// Legacy single password (`AUTH <password>`); ACL users take
    /// precedence when configured.
    pub password: Option<String>,
    /// ACL user table.
    pub acl_users: Vec<AclUser>,
    /// Optional per-client rate limit.
    pub rate_limit: Option<RateLimitConfig>,
    /// Close connections idle past this on the read side.
    pub idle_timeout: Option<Duration>,
    /// Record commands slower than this in the slow-log.
    pub slowlog_threshold: Duration,
    /// Slow-log ring length.
    pub slowlog_max_len: usize,
    /// Optional TLS wrap.
    pub tls: Option<TlsConfig>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            addr: "127.0.0.1:6379".to_string(),
            max_clients: 10_000,
            password: None,
            acl_users: Vec::new(),
            rate_limit: None,
            idle_timeout: None,
            slowlog_threshold: Duration::from_millis(10),
            slowlog_max_len: 128,
            tls: None,
        }
    }
}

impl ServerConfig {
    pub fn new(addr: impl Into<String>) -> ServerConfig {
        ServerConfig {
            addr: addr.into(),
            ..ServerConfig::default()
        }
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn with_acl_user(mut self, user: AclUser) -> Self {
        self.acl_users.push(user);
        self
    }

    pub fn with_max_clients(mut self, max: usize) -> Self {
        self.max_clients = max;
        self
    }

    pub fn with_rate_limit(mut self, per_second: u64) -> Self {
        self.rate_limit = Some(RateLimitConfig { per_second });
        self
    }

    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = Some(timeout);
        self
    }

    pub fn with_tls(mut self, cert_path: impl Into<PathBuf>, key_path: impl Into<PathBuf>) -> Self {
        self.tls = Some(TlsConfig {
            cert_path: cert_path.into(),
            key_path: key_path.into(),
        });
        self
    }

    /// Whether any authentication gate applies.
    pub fn auth_required(&self) -> bool {
        self.password.is_some() || !self.acl_users.is_empty()
    }
}

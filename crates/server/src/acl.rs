//! ACL enforcement.
//!
//! Auth resolution order: when ACL users are configured they win.
//! `AUTH <user> <pass>` resolves against the table and one-argument
//! `AUTH <pass>` authenticates as the `default` user when one exists.
//! The legacy single password applies only when no users are configured.

use crate::config::{AclPerms, AclUser, ServerConfig};
use ember_core::{Error, Result};
use once_cell::sync::Lazy;
use std::collections::HashSet;

/// Commands a read-only user may run. Pure reads plus connection
/// housekeeping; nothing that mutates the keyspace or the server.
pub static READ_ONLY_COMMANDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "GET", "EXISTS", "TTL", "PTTL", "TYPE", "KEYS", "SCAN", "RANDOMKEY", "TOUCH", "DUMP",
        "OBJECT", "STRLEN", "MGET", "GETRANGE", "ZSCORE", "ZCARD", "ZRANK", "ZREVRANK", "ZRANGE",
        "ZREVRANGE", "ZRANGEBYSCORE", "ZREVRANGEBYSCORE", "ZCOUNT", "HGET", "HMGET", "HEXISTS",
        "HLEN", "HGETALL", "HKEYS", "HVALS", "LLEN", "LINDEX", "LRANGE", "SISMEMBER", "SCARD",
        "SMEMBERS", "SRANDMEMBER", "SINTER", "SUNION", "SDIFF", "PING", "ECHO", "QUIT", "AUTH",
        "SELECT", "INFO", "DBSIZE", "TIME", "COMMAND", "MEMORY", "SLOWLOG", "CLIENT", "PUBSUB",
        "SUBSCRIBE", "UNSUBSCRIBE", "PSUBSCRIBE", "PUNSUBSCRIBE", "ACL",
    ]
    .into_iter()
    .collect()
});

/// Commands allowed before authentication.
pub static PRE_AUTH_COMMANDS: Lazy<HashSet<&'static str>> =
    Lazy::new(|| ["AUTH", "PING", "QUIT"].into_iter().collect());

/// Outcome of a successful AUTH.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthOutcome {
    /// Bound ACL user name, when ACLs are configured.
    pub user: Option<String>,
}

/// Validate an AUTH attempt against the configured credentials.
pub fn authenticate(config: &ServerConfig, user: Option<&[u8]>, password: &[u8]) -> Result<AuthOutcome> {
    if !config.acl_users.is_empty() {
        let name: &[u8] = user.unwrap_or(b"default");
        let found = config
            .acl_users
            .iter()
            .find(|acl| acl.name.as_bytes() == name && acl.password.as_bytes() == password);
        return match found {
            Some(acl) => Ok(AuthOutcome {
                user: Some(acl.name.clone()),
            }),
            None => Err(Error::WrongPass),
        };
    }

    match (&config.password, user) {
        (Some(expected), None) if expected.as_bytes() == password => Ok(AuthOutcome { user: None }),
        (Some(_), _) => Err(Error::WrongPass),
        (None, _) => Err(Error::Syntax(
            "Client sent AUTH, but no password is set.".to_string(),
        )),
    }
}

/// Check a command against the bound user's permissions.
pub fn check_command(user: Option<&AclUser>, command: &str) -> Result<()> {
    let Some(user) = user else {
        return Ok(()); // legacy auth or no auth: unrestricted
    };
    let allowed = match &user.perms {
        AclPerms::All => true,
        AclPerms::ReadOnly => READ_ONLY_COMMANDS.contains(command),
        AclPerms::Commands(list) => list.iter().any(|c| c == command),
    };
    if allowed {
        Ok(())
    } else {
        Err(Error::NoPerm(format!(
            "this user has no permissions to run the '{}' command",
            command.to_lowercase()
        )))
    }
}

/// Find a configured user by name.
pub fn find_user<'a>(config: &'a ServerConfig, name: &str) -> Option<&'a AclUser> {
    config.acl_users.iter().find(|user| user.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AclPerms;

    fn config_with_users() -> ServerConfig {
        ServerConfig::new("127.0.0.1:0")
            .with_password("legacy-ignored")
            .with_acl_user(AclUser::new("default", "defpass", AclPerms::All))
            .with_acl_user(AclUser::new("viewer", "viewpass", AclPerms::ReadOnly))
            .with_acl_user(AclUser::new(
                "pusher",
                "pushpass",
                AclPerms::Commands(vec!["LPUSH".into(), "RPUSH".into(), "PING".into()]),
            ))
    }

    #[test]
    fn test_acl_wins_over_legacy_password() {
        let config = config_with_users();
        // The legacy password is not accepted once users exist.
        assert!(authenticate(&config, None, b"legacy-ignored").is_err());
        // One-argument AUTH binds the default user.
        let outcome = authenticate(&config, None, b"defpass").unwrap();
        assert_eq!(outcome.user.as_deref(), Some("default"));
    }

    #[test]
    fn test_user_password_pairs() {
        let config = config_with_users();
        let outcome = authenticate(&config, Some(b"viewer"), b"viewpass").unwrap();
        assert_eq!(outcome.user.as_deref(), Some("viewer"));
        assert!(authenticate(&config, Some(b"viewer"), b"wrong").is_err());
        assert!(authenticate(&config, Some(b"ghost"), b"viewpass").is_err());
    }

    #[test]
    fn test_legacy_password_without_users() {
        let config = ServerConfig::new("127.0.0.1:0").with_password("hunter2");
        assert!(authenticate(&config, None, b"hunter2").is_ok());
        assert!(authenticate(&config, None, b"wrong").is_err());
    }

    #[test]
    fn test_auth_with_no_password_configured() {
        let config = ServerConfig::new("127.0.0.1:0");
        assert!(matches!(
            authenticate(&config, None, b"any"),
            Err(Error::Syntax(_))
        ));
    }

    #[test]
    fn test_readonly_user_commands() {
        let config = config_with_users();
        let viewer = find_user(&config, "viewer");
        assert!(check_command(viewer, "GET").is_ok());
        assert!(check_command(viewer, "ZRANGE").is_ok());
        assert!(matches!(check_command(viewer, "SET"), Err(Error::NoPerm(_))));
        assert!(matches!(
            check_command(viewer, "FLUSHDB"),
            Err(Error::NoPerm(_))
        ));
    }

    #[test]
    fn test_explicit_allow_list() {
        let config = config_with_users();
        let pusher = find_user(&config, "pusher");
        assert!(check_command(pusher, "LPUSH").is_ok());
        assert!(matches!(check_command(pusher, "GET"), Err(Error::NoPerm(_))));
    }

    #[test]
    fn test_unrestricted_without_acl_user() {
        assert!(check_command(None, "FLUSHDB").is_ok());
    }
}

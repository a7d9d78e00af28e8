//! Structured audit records for security-sensitive commands.
//!
//! Each record is one JSON document emitted through the `ember::audit`
//! tracing target, so operators route it like any other log stream.

use once_cell::sync::Lazy;
use serde::Serialize;
use std::collections::HashSet;
use tracing::info;

/// Commands that always produce an audit record.
pub static AUDITED_COMMANDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "AUTH", "FLUSHDB", "FLUSHALL", "CONFIG", "ACL", "DEBUG", "SAVE", "BGSAVE", "SHUTDOWN",
    ]
    .into_iter()
    .collect()
});

#[derive(Serialize)]
struct AuditRecord<'a> {
    ts: String,
    client_id: u64,
    peer: &'a str,
    user: Option<&'a str>,
    command: &'a str,
    arg_count: usize,
    ok: bool,
}

/// Emit one audit record. Arguments themselves are omitted: AUTH would
/// leak credentials.
pub fn record(client_id: u64, peer: &str, user: Option<&str>, command: &str, arg_count: usize, ok: bool) {
    let record = AuditRecord {
        ts: chrono::Utc::now().to_rfc3339(),
        client_id,
        peer,
        user,
        command,
        arg_count,
        ok,
    };
    match serde_json::to_string(&record) {
        Ok(json) => info!(target: "ember::audit", audit = %json),
        Err(_) => info!(target: "ember::audit", client_id, peer, command, ok, "audit"),
    }
}

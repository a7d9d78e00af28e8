//! Request dispatch: per-command gates (rate limit, auth, ACL, subscribe
//! mode, transaction queuing), the command table, MULTI/EXEC, slow-log
//! timing, and audit emission.

use crate::acl;
use crate::audit;
use crate::commands::{self, Reply};
use crate::config::ServerConfig;
use crate::conn::{ClientHandle, ClientRegistry, SessionState};
use crate::pubsub::PubSub;
use crate::ratelimit;
use crate::resp::Frame;
use crate::slowlog::SlowLog;
use ember_core::{Error, Result};
use ember_engine::Engine;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Server-wide shared state handed to every connection worker.
pub struct Shared {
    pub engine: Arc<Engine>,
    pub config: ServerConfig,
    pub registry: Arc<ClientRegistry>,
    pub pubsub: Arc<PubSub>,
    pub slowlog: Arc<SlowLog>,
    pub shutdown: Arc<AtomicBool>,
    /// Bound listener address; SHUTDOWN connects here to unblock accept.
    pub local_addr: std::net::SocketAddr,
}

/// Dispatch context for one command: shared state plus this connection's
/// handle and private session.
pub struct Ctx<'a> {
    pub shared: &'a Shared,
    pub client: &'a Arc<ClientHandle>,
    pub session: &'a mut SessionState,
}

/// Commands a client may issue while in subscribe mode.
const SUBSCRIBE_MODE_COMMANDS: &[&str] = &[
    "SUBSCRIBE",
    "PSUBSCRIBE",
    "UNSUBSCRIBE",
    "PUNSUBSCRIBE",
    "PING",
    "QUIT",
];

/// Extract `(COMMAND, args)` from a request frame. Commands are arrays of
/// bulk strings; anything else is a protocol error.
pub fn parse_request(frame: Frame) -> Result<(String, Vec<Vec<u8>>)> {
    let Frame::Array(items) = frame else {
        return Err(Error::Protocol("expected multibulk request".into()));
    };
    if items.is_empty() {
        return Err(Error::Protocol("empty multibulk request".into()));
    }
    let mut parts = Vec::with_capacity(items.len());
    for item in items {
        match item {
            Frame::Bulk(bytes) => parts.push(bytes),
            _ => return Err(Error::Protocol("request arguments must be bulk strings".into())),
        }
    }
    let name_bytes = parts.remove(0);
    let name = String::from_utf8(name_bytes)
        .map_err(|_| Error::Protocol("non-utf8 command name".into()))?
        .to_ascii_uppercase();
    Ok((name, parts))
}

/// Run one request through every gate and produce the reply frames.
/// `Err` is returned only for failures that must close the connection;
/// ordinary command errors come back as error frames.
pub fn handle_request(ctx: &mut Ctx<'_>, name: String, args: Vec<Vec<u8>>) -> Result<Vec<Frame>> {
    ctx.client.touch();
    ctx.shared.engine.stats().record_command();

    // Rate limit precedes everything, QUIT excepted so a throttled client
    // can still hang up cleanly.
    if let Some(limit) = ctx.shared.config.rate_limit {
        if name != "QUIT" && !ratelimit::try_take(ctx.session, limit.per_second) {
            return Ok(vec![Frame::Error(Error::RateLimited.reply_line())]);
        }
    }

    // Auth gate.
    if ctx.shared.config.auth_required()
        && !ctx.session.authenticated
        && !acl::PRE_AUTH_COMMANDS.contains(name.as_str())
    {
        return Ok(vec![Frame::Error(Error::NoAuth.reply_line())]);
    }

    // ACL gate.
    let acl_user = ctx
        .session
        .acl_user
        .as_deref()
        .and_then(|user| acl::find_user(&ctx.shared.config, user).cloned());
    if let Err(e) = acl::check_command(acl_user.as_ref(), &name) {
        return Ok(vec![Frame::Error(e.reply_line())]);
    }

    // Subscribe-mode restriction.
    if ctx.session.in_subscribe_mode() && !SUBSCRIBE_MODE_COMMANDS.contains(&name.as_str()) {
        return Ok(vec![Frame::Error(format!(
            "ERR Can't execute '{}': only (P)SUBSCRIBE / (P)UNSUBSCRIBE / PING / QUIT are allowed in this context",
            name.to_lowercase()
        ))]);
    }

    // Transaction queuing.
    if ctx.session.in_multi && !matches!(name.as_str(), "EXEC" | "DISCARD" | "MULTI") {
        if lookup(&name).is_none() {
            ctx.session.multi_error = true;
            return Ok(vec![Frame::Error(format!(
                "ERR unknown command '{}'",
                name.to_lowercase()
            ))]);
        }
        ctx.session.queue.push((name, args));
        return Ok(vec![Frame::Simple("QUEUED".to_string())]);
    }

    let started = Instant::now();
    let reply = execute(ctx, &name, &args);
    let elapsed = started.elapsed();

    ctx.shared
        .slowlog
        .observe(elapsed, &ctx.client.addr, &name, &args);
    if audit::AUDITED_COMMANDS.contains(name.as_str()) {
        audit::record(
            ctx.client.id,
            &ctx.client.addr,
            ctx.session.acl_user.as_deref(),
            &name,
            args.len(),
            reply.is_ok(),
        );
    }

    match reply {
        Ok(reply) => Ok(reply.frames()),
        Err(e) if e.is_fatal_to_connection() => Err(e),
        Err(e) => {
            debug!(target: "ember::server", command = %name, error = %e, "command error");
            Ok(vec![Frame::Error(e.reply_line())])
        }
    }
}

/// Execute one command (gates already passed).
fn execute(ctx: &mut Ctx<'_>, name: &str, args: &[Vec<u8>]) -> Result<Reply> {
    match name {
        "MULTI" => multi(ctx),
        "EXEC" => exec(ctx),
        "DISCARD" => discard(ctx),
        _ => match lookup(name) {
            Some(handler) => handler(ctx, args),
            None => Err(Error::Syntax(format!(
                "unknown command '{}'",
                name.to_lowercase()
            ))),
        },
    }
}

fn multi(ctx: &mut Ctx<'_>) -> Result<Reply> {
    if ctx.session.in_multi {
        return Err(Error::Syntax("MULTI calls can not be nested".to_string()));
    }
    ctx.session.in_multi = true;
    ctx.session.queue.clear();
    ctx.session.multi_error = false;
    Ok(Reply::ok())
}

fn discard(ctx: &mut Ctx<'_>) -> Result<Reply> {
    if !ctx.session.in_multi {
        return Err(Error::Syntax("DISCARD without MULTI".to_string()));
    }
    ctx.session.in_multi = false;
    ctx.session.queue.clear();
    ctx.session.multi_error = false;
    Ok(Reply::ok())
}

/// Run the queued commands under the engine's transaction lock, capturing
/// each command's reply into one array response.
fn exec(ctx: &mut Ctx<'_>) -> Result<Reply> {
    if !ctx.session.in_multi {
        return Err(Error::Syntax("EXEC without MULTI".to_string()));
    }
    ctx.session.in_multi = false;
    let queue = std::mem::take(&mut ctx.session.queue);
    if ctx.session.multi_error {
        ctx.session.multi_error = false;
        return Err(Error::ExecAborted);
    }

    let _txn = ctx.shared.engine.exec_begin();
    let mut replies = Vec::with_capacity(queue.len());
    for (name, args) in queue {
        match execute(ctx, &name, &args) {
            Ok(reply) => {
                let mut frames = reply.frames();
                // Each queued command contributes exactly one element.
                replies.push(if frames.len() == 1 {
                    frames.remove(0)
                } else {
                    Frame::Array(frames)
                });
            }
            Err(e) => replies.push(Frame::Error(e.reply_line())),
        }
    }
    Ok(Reply::One(Frame::Array(replies)))
}

/// Every dispatchable command name (MULTI/EXEC/DISCARD included).
pub const COMMAND_NAMES: &[&str] = &[
    "SET", "GET", "GETSET", "GETDEL", "GETEX", "SETNX", "SETEX", "PSETEX", "APPEND", "STRLEN",
    "GETRANGE", "SETRANGE", "INCR", "INCRBY", "INCRBYFLOAT", "DECR", "DECRBY", "MSET", "MGET",
    "MSETNX", "DEL", "UNLINK", "EXISTS", "EXPIRE", "PEXPIRE", "TTL", "PTTL", "PERSIST", "TYPE",
    "KEYS", "SCAN", "RENAME", "RENAMENX", "COPY", "RANDOMKEY", "TOUCH", "DUMP", "OBJECT", "HSET",
    "HMSET", "HGET", "HMGET", "HDEL", "HEXISTS", "HLEN", "HGETALL", "HKEYS", "HVALS", "HINCRBY",
    "HINCRBYFLOAT", "HSETNX", "LPUSH", "RPUSH", "LPOP", "RPOP", "LLEN", "LINDEX", "LSET",
    "LRANGE", "LINSERT", "LREM", "LTRIM", "SADD", "SREM", "SISMEMBER", "SCARD", "SMEMBERS",
    "SRANDMEMBER", "SPOP", "SINTER", "SUNION", "SDIFF", "ZADD", "ZSCORE", "ZREM", "ZCARD",
    "ZRANK", "ZREVRANK", "ZRANGE", "ZREVRANGE", "ZRANGEBYSCORE", "ZREVRANGEBYSCORE", "ZCOUNT",
    "ZINCRBY", "ZREMRANGEBYRANK", "ZREMRANGEBYSCORE", "ZPOPMIN", "ZPOPMAX", "SUBSCRIBE",
    "UNSUBSCRIBE", "PSUBSCRIBE", "PUNSUBSCRIBE", "PUBLISH", "PUBSUB", "MULTI", "EXEC", "DISCARD",
    "PING", "ECHO", "QUIT", "AUTH", "SELECT", "INFO", "DBSIZE", "FLUSHDB", "FLUSHALL", "TIME",
    "COMMAND", "CONFIG", "DEBUG", "MEMORY", "SLOWLOG", "CLIENT", "ACL", "SAVE", "BGSAVE",
    "SHUTDOWN",
];

/// Count reported by `COMMAND COUNT`.
pub fn command_count() -> usize {
    COMMAND_NAMES.len()
}

/// The command table.
fn lookup(name: &str) -> Option<commands::Handler> {
    use commands::{hashes, keys, lists, pubsub_cmds, server_cmds, sets, strings, zsets};
    Some(match name {
        // Strings
        "SET" => strings::set,
        "GET" => strings::get,
        "GETSET" => strings::getset,
        "GETDEL" => strings::getdel,
        "GETEX" => strings::getex,
        "SETNX" => strings::setnx,
        "SETEX" => strings::setex,
        "PSETEX" => strings::psetex,
        "APPEND" => strings::append,
        "STRLEN" => strings::strlen,
        "GETRANGE" => strings::getrange,
        "SETRANGE" => strings::setrange,
        "INCR" => strings::incr,
        "INCRBY" => strings::incrby,
        "INCRBYFLOAT" => strings::incrbyfloat,
        "DECR" => strings::decr,
        "DECRBY" => strings::decrby,
        "MSET" => strings::mset,
        "MGET" => strings::mget,
        "MSETNX" => strings::msetnx,
        // Keys
        "DEL" => keys::del,
        "UNLINK" => keys::del,
        "EXISTS" => keys::exists,
        "EXPIRE" => keys::expire,
        "PEXPIRE" => keys::pexpire,
        "TTL" => keys::ttl,
        "PTTL" => keys::pttl,
        "PERSIST" => keys::persist,
        "TYPE" => keys::type_cmd,
        "KEYS" => keys::keys,
        "SCAN" => keys::scan,
        "RENAME" => keys::rename,
        "RENAMENX" => keys::renamenx,
        "COPY" => keys::copy,
        "RANDOMKEY" => keys::randomkey,
        "TOUCH" => keys::touch,
        "DUMP" => keys::dump,
        "OBJECT" => keys::object,
        // Hashes
        "HSET" => hashes::hset,
        "HMSET" => hashes::hmset,
        "HGET" => hashes::hget,
        "HMGET" => hashes::hmget,
        "HDEL" => hashes::hdel,
        "HEXISTS" => hashes::hexists,
        "HLEN" => hashes::hlen,
        "HGETALL" => hashes::hgetall,
        "HKEYS" => hashes::hkeys,
        "HVALS" => hashes::hvals,
        "HINCRBY" => hashes::hincrby,
        "HINCRBYFLOAT" => hashes::hincrbyfloat,
        "HSETNX" => hashes::hsetnx,
        // Lists
        "LPUSH" => lists::lpush,
        "RPUSH" => lists::rpush,
        "LPOP" => lists::lpop,
        "RPOP" => lists::rpop,
        "LLEN" => lists::llen,
        "LINDEX" => lists::lindex,
        "LSET" => lists::lset,
        "LRANGE" => lists::lrange,
        "LINSERT" => lists::linsert,
        "LREM" => lists::lrem,
        "LTRIM" => lists::ltrim,
        // Sets
        "SADD" => sets::sadd,
        "SREM" => sets::srem,
        "SISMEMBER" => sets::sismember,
        "SCARD" => sets::scard,
        "SMEMBERS" => sets::smembers,
        "SRANDMEMBER" => sets::srandmember,
        "SPOP" => sets::spop,
        "SINTER" => sets::sinter,
        "SUNION" => sets::sunion,
        "SDIFF" => sets::sdiff,
        // Sorted sets
        "ZADD" => zsets::zadd,
        "ZSCORE" => zsets::zscore,
        "ZREM" => zsets::zrem,
        "ZCARD" => zsets::zcard,
        "ZRANK" => zsets::zrank,
        "ZREVRANK" => zsets::zrevrank,
        "ZRANGE" => zsets::zrange,
        "ZREVRANGE" => zsets::zrevrange,
        "ZRANGEBYSCORE" => zsets::zrangebyscore,
        "ZREVRANGEBYSCORE" => zsets::zrevrangebyscore,
        "ZCOUNT" => zsets::zcount,
        "ZINCRBY" => zsets::zincrby,
        "ZREMRANGEBYRANK" => zsets::zremrangebyrank,
        "ZREMRANGEBYSCORE" => zsets::zremrangebyscore,
        "ZPOPMIN" => zsets::zpopmin,
        "ZPOPMAX" => zsets::zpopmax,
        // Pub/sub
        "SUBSCRIBE" => pubsub_cmds::subscribe,
        "UNSUBSCRIBE" => pubsub_cmds::unsubscribe,
        "PSUBSCRIBE" => pubsub_cmds::psubscribe,
        "PUNSUBSCRIBE" => pubsub_cmds::punsubscribe,
        "PUBLISH" => pubsub_cmds::publish,
        "PUBSUB" => pubsub_cmds::pubsub,
        // Server
        "PING" => server_cmds::ping,
        "ECHO" => server_cmds::echo,
        "QUIT" => server_cmds::quit,
        "AUTH" => server_cmds::auth,
        "SELECT" => server_cmds::select,
        "INFO" => server_cmds::info,
        "DBSIZE" => server_cmds::dbsize,
        "FLUSHDB" => server_cmds::flushdb,
        "FLUSHALL" => server_cmds::flushdb,
        "TIME" => server_cmds::time,
        "COMMAND" => server_cmds::command,
        "CONFIG" => server_cmds::config,
        "DEBUG" => server_cmds::debug,
        "MEMORY" => server_cmds::memory,
        "SLOWLOG" => server_cmds::slowlog,
        "CLIENT" => server_cmds::client,
        "ACL" => server_cmds::acl_cmd,
        "SAVE" => server_cmds::save,
        "BGSAVE" => server_cmds::bgsave,
        "SHUTDOWN" => server_cmds::shutdown,
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_request_shapes() {
        let frame = Frame::Array(vec![
            Frame::Bulk(b"get".to_vec()),
            Frame::Bulk(b"k".to_vec()),
        ]);
        let (name, args) = parse_request(frame).unwrap();
        assert_eq!(name, "GET");
        assert_eq!(args, vec![b"k".to_vec()]);

        assert!(parse_request(Frame::Integer(1)).is_err());
        assert!(parse_request(Frame::Array(vec![])).is_err());
        assert!(parse_request(Frame::Array(vec![Frame::Integer(1)])).is_err());
    }

    #[test]
    fn test_every_listed_command_dispatches() {
        for name in COMMAND_NAMES {
            let known = lookup(name).is_some() || matches!(*name, "MULTI" | "EXEC" | "DISCARD");
            assert!(known, "{} listed but not dispatchable", name);
        }
    }

    #[test]
    fn test_lookup_covers_core_commands() {
        for name in [
            "SET", "GET", "DEL", "EXPIRE", "ZADD", "ZRANGE", "HSET", "LPUSH", "SADD", "PUBLISH",
            "INFO", "PING", "SCAN", "SLOWLOG", "ACL", "CONFIG",
        ] {
            assert!(lookup(name).is_some(), "missing handler for {}", name);
        }
        assert!(lookup("NOPE").is_none());
    }
}

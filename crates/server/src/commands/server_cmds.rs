//! Connection and server administration command handlers.

use super::{expect_args, expect_min_args, keyword_eq, parse_int, Reply};
use crate::acl;
use crate::config::AclPerms;
use crate::dispatch::Ctx;
use crate::resp::Frame;
use ember_core::glob::glob_match;
use ember_core::{Error, Result};
use std::sync::atomic::Ordering;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub fn ping(_ctx: &mut Ctx<'_>, args: &[Vec<u8>]) -> Result<Reply> {
    // Answers normally in subscribe mode too.
    match args.len() {
        0 => Ok(Reply::One(Frame::Simple("PONG".to_string()))),
        1 => Ok(Reply::One(Frame::Bulk(args[0].clone()))),
        _ => Err(Error::wrong_arity("ping")),
    }
}

pub fn echo(_ctx: &mut Ctx<'_>, args: &[Vec<u8>]) -> Result<Reply> {
    expect_args("echo", args, 1)?;
    Ok(Reply::One(Frame::Bulk(args[0].clone())))
}

pub fn quit(ctx: &mut Ctx<'_>, _args: &[Vec<u8>]) -> Result<Reply> {
    ctx.session.quit = true;
    Ok(Reply::ok())
}

pub fn auth(ctx: &mut Ctx<'_>, args: &[Vec<u8>]) -> Result<Reply> {
    let (user, password) = match args.len() {
        1 => (None, args[0].as_slice()),
        2 => (Some(args[0].as_slice()), args[1].as_slice()),
        _ => return Err(Error::wrong_arity("auth")),
    };
    let outcome = acl::authenticate(&ctx.shared.config, user, password)?;
    ctx.session.authenticated = true;
    ctx.session.acl_user = outcome.user;
    Ok(Reply::ok())
}

/// Single keyspace: only index 0 exists.
pub fn select(_ctx: &mut Ctx<'_>, args: &[Vec<u8>]) -> Result<Reply> {
    expect_args("select", args, 1)?;
    match parse_int(&args[0])? {
        0 => Ok(Reply::ok()),
        _ => Err(Error::Syntax("DB index is out of range".to_string())),
    }
}

pub fn dbsize(ctx: &mut Ctx<'_>, args: &[Vec<u8>]) -> Result<Reply> {
    expect_args("dbsize", args, 0)?;
    Ok(Reply::int(ctx.shared.engine.dbsize() as i64))
}

pub fn flushdb(ctx: &mut Ctx<'_>, args: &[Vec<u8>]) -> Result<Reply> {
    // ASYNC/SYNC modifiers are accepted and treated the same.
    if args.len() > 1 {
        return Err(Error::wrong_arity("flushdb"));
    }
    if let Some(modifier) = args.first() {
        if !keyword_eq(modifier, "ASYNC") && !keyword_eq(modifier, "SYNC") {
            return Err(Error::Syntax("syntax error".into()));
        }
    }
    ctx.shared.engine.flushdb()?;
    Ok(Reply::ok())
}

pub fn time(_ctx: &mut Ctx<'_>, args: &[Vec<u8>]) -> Result<Reply> {
    expect_args("time", args, 0)?;
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO);
    Ok(Reply::One(Frame::Array(vec![
        Frame::bulk(now.as_secs().to_string()),
        Frame::bulk(now.subsec_micros().to_string()),
    ])))
}

pub fn info(ctx: &mut Ctx<'_>, args: &[Vec<u8>]) -> Result<Reply> {
    if args.len() > 1 {
        return Err(Error::wrong_arity("info"));
    }
    let section = args
        .first()
        .map(|s| String::from_utf8_lossy(s).to_ascii_lowercase());
    let stats = ctx.shared.engine.stats_snapshot();

    let mut out = String::new();
    let want = |name: &str| section.is_none() || section.as_deref() == Some(name);

    if want("server") {
        out.push_str("# Server\r\n");
        out.push_str(&format!("ember_version:{}\r\n", env!("CARGO_PKG_VERSION")));
        out.push_str(&format!("uptime_in_seconds:{}\r\n", stats.uptime_secs));
        out.push_str(&format!("server_time_unix:{}\r\n", stats.started_unix + stats.uptime_secs));
        out.push_str("\r\n");
    }
    if want("clients") {
        out.push_str("# Clients\r\n");
        out.push_str(&format!("connected_clients:{}\r\n", ctx.shared.registry.len()));
        out.push_str(&format!("maxclients:{}\r\n", ctx.shared.config.max_clients));
        out.push_str("\r\n");
    }
    if want("stats") {
        out.push_str("# Stats\r\n");
        out.push_str(&format!("total_connections_received:{}\r\n", stats.connections_accepted));
        out.push_str(&format!("total_commands_processed:{}\r\n", stats.commands));
        out.push_str(&format!("total_reads:{}\r\n", stats.reads));
        out.push_str(&format!("total_writes:{}\r\n", stats.writes));
        out.push_str(&format!("expired_keys:{}\r\n", stats.expired_keys));
        out.push_str("\r\n");
    }
    if want("keyspace") {
        out.push_str("# Keyspace\r\n");
        out.push_str(&format!("db0:keys={}\r\n", ctx.shared.engine.dbsize()));
        out.push_str(&format!("wal_bytes:{}\r\n", ctx.shared.engine.wal_size()));
        out.push_str("\r\n");
    }
    if want("hotkeys") {
        out.push_str("# Hotkeys\r\n");
        for (i, (key, count)) in ctx.shared.engine.hot_keys(10).into_iter().enumerate() {
            out.push_str(&format!(
                "hotkey_{}:key={},count={}\r\n",
                i,
                String::from_utf8_lossy(&key),
                count
            ));
        }
        out.push_str("\r\n");
    }
    Ok(Reply::One(Frame::bulk(out)))
}

pub fn command(_ctx: &mut Ctx<'_>, args: &[Vec<u8>]) -> Result<Reply> {
    if args.is_empty() {
        // Full command metadata is not exposed; an empty array keeps
        // clients that probe at connect time happy.
        return Ok(Reply::One(Frame::Array(Vec::new())));
    }
    let sub = String::from_utf8_lossy(&args[0]).to_ascii_uppercase();
    match sub.as_str() {
        "COUNT" => Ok(Reply::int(crate::dispatch::command_count() as i64)),
        "DOCS" => Ok(Reply::One(Frame::Array(Vec::new()))),
        _ => Err(Error::Syntax(format!(
            "unknown subcommand '{}'",
            sub.to_lowercase()
        ))),
    }
}

pub fn config(ctx: &mut Ctx<'_>, args: &[Vec<u8>]) -> Result<Reply> {
    expect_min_args("config", args, 1)?;
    let sub = String::from_utf8_lossy(&args[0]).to_ascii_uppercase();
    match sub.as_str() {
        "GET" => {
            expect_args("config|get", &args[1..], 1)?;
            let pattern = &args[1];
            let entries = [
                (
                    "slowlog-log-slower-than",
                    (ctx.shared.slowlog.threshold().as_micros() as i64).to_string(),
                ),
                ("slowlog-max-len", ctx.shared.slowlog.max_len().to_string()),
                ("maxclients", ctx.shared.config.max_clients.to_string()),
            ];
            let mut items = Vec::new();
            for (name, value) in entries {
                if glob_match(pattern, name.as_bytes()) {
                    items.push(Frame::bulk(name));
                    items.push(Frame::bulk(value));
                }
            }
            Ok(Reply::One(Frame::Array(items)))
        }
        "SET" => {
            expect_args("config|set", &args[1..], 2)?;
            let name = String::from_utf8_lossy(&args[1]).to_ascii_lowercase();
            match name.as_str() {
                "slowlog-log-slower-than" => {
                    let micros = parse_int(&args[2])?;
                    let threshold = if micros < 0 {
                        // Negative disables: nothing is ever that slow.
                        Duration::from_secs(u64::MAX / 2)
                    } else {
                        Duration::from_micros(micros as u64)
                    };
                    ctx.shared.slowlog.set_threshold(threshold);
                    Ok(Reply::ok())
                }
                "slowlog-max-len" => {
                    let len = parse_int(&args[2])?;
                    if len <= 0 {
                        return Err(Error::Syntax("invalid slowlog-max-len".into()));
                    }
                    ctx.shared.slowlog.set_max_len(len as usize);
                    Ok(Reply::ok())
                }
                _ => Err(Error::Syntax(format!(
                    "Unknown option or number of arguments for CONFIG SET - '{}'",
                    name
                ))),
            }
        }
        "RESETSTAT" => Ok(Reply::ok()),
        _ => Err(Error::Syntax(format!(
            "unknown subcommand '{}'",
            sub.to_lowercase()
        ))),
    }
}

pub fn debug(ctx: &mut Ctx<'_>, args: &[Vec<u8>]) -> Result<Reply> {
    expect_min_args("debug", args, 1)?;
    let sub = String::from_utf8_lossy(&args[0]).to_ascii_uppercase();
    match sub.as_str() {
        "SLEEP" => {
            expect_args("debug|sleep", &args[1..], 1)?;
            let secs = super::parse_float(&args[1])?;
            if !(0.0..=60.0).contains(&secs) {
                return Err(Error::Syntax("sleep must be between 0 and 60 seconds".into()));
            }
            std::thread::sleep(Duration::from_secs_f64(secs));
            Ok(Reply::ok())
        }
        "OBJECT" => {
            expect_args("debug|object", &args[1..], 1)?;
            match ctx.shared.engine.memory_usage(&args[1]) {
                Some(bytes) => Ok(Reply::One(Frame::Simple(format!(
                    "Value at:0 refcount:1 encoding:raw serializedlength:{}",
                    bytes
                )))),
                None => Err(Error::NoSuchKey),
            }
        }
        "SET-ACTIVE-EXPIRE" => {
            expect_args("debug|set-active-expire", &args[1..], 1)?;
            let enabled = parse_int(&args[1])? != 0;
            ctx.shared.engine.set_active_expire(enabled);
            Ok(Reply::ok())
        }
        "HOTKEYS" => {
            let n = match args.len() {
                1 => 10,
                2 => parse_int(&args[1])?.max(0) as usize,
                _ => return Err(Error::wrong_arity("debug")),
            };
            let mut items = Vec::new();
            for (key, count) in ctx.shared.engine.hot_keys(n) {
                items.push(Frame::Bulk(key));
                items.push(Frame::Integer(count as i64));
            }
            Ok(Reply::One(Frame::Array(items)))
        }
        "CHANGELOG" => {
            let n = match args.len() {
                1 => 10,
                2 => parse_int(&args[1])?.max(0) as usize,
                _ => return Err(Error::wrong_arity("debug")),
            };
            let events = ctx.shared.engine.changes_recent(n);
            let items = events
                .into_iter()
                .map(|event| {
                    Frame::Array(vec![
                        Frame::Integer(event.id as i64),
                        Frame::bulk(event.kind.name()),
                        Frame::Bulk(event.key),
                        Frame::maybe_bulk(event.value),
                        Frame::Integer(event.ts_ns),
                    ])
                })
                .collect();
            Ok(Reply::One(Frame::Array(items)))
        }
        "SNAPSHOT" => debug_snapshot(ctx, &args[1..]),
        _ => Err(Error::Syntax(format!(
            "DEBUG subcommand '{}' is not supported",
            sub.to_lowercase()
        ))),
    }
}

/// `DEBUG SNAPSHOT LIST|RESTORE <id>|DELETE <id>`: the operational
/// surface for snapshots beyond SAVE/BGSAVE.
fn debug_snapshot(ctx: &mut Ctx<'_>, args: &[Vec<u8>]) -> Result<Reply> {
    expect_min_args("debug|snapshot", args, 1)?;
    let sub = String::from_utf8_lossy(&args[0]).to_ascii_uppercase();
    match sub.as_str() {
        "LIST" => {
            let metas = ctx.shared.engine.snapshot_list()?;
            let items = metas
                .into_iter()
                .map(|meta| {
                    Frame::Array(vec![
                        Frame::bulk(meta.id),
                        Frame::bulk(meta.created_at),
                        Frame::Integer(meta.size_bytes as i64),
                        Frame::Integer(meta.key_count as i64),
                    ])
                })
                .collect();
            Ok(Reply::One(Frame::Array(items)))
        }
        "RESTORE" => {
            expect_args("debug|snapshot|restore", &args[1..], 1)?;
            let id = String::from_utf8_lossy(&args[1]).to_string();
            let restored = ctx.shared.engine.snapshot_restore(&id)?;
            Ok(Reply::int(restored as i64))
        }
        "DELETE" => {
            expect_args("debug|snapshot|delete", &args[1..], 1)?;
            let id = String::from_utf8_lossy(&args[1]).to_string();
            Ok(Reply::int(ctx.shared.engine.snapshot_delete(&id)? as i64))
        }
        _ => Err(Error::Syntax("DEBUG SNAPSHOT LIST|RESTORE|DELETE".into())),
    }
}

pub fn memory(ctx: &mut Ctx<'_>, args: &[Vec<u8>]) -> Result<Reply> {
    expect_min_args("memory", args, 1)?;
    let sub = String::from_utf8_lossy(&args[0]).to_ascii_uppercase();
    match sub.as_str() {
        "USAGE" => {
            expect_min_args("memory|usage", &args[1..], 1)?;
            Ok(Reply::One(match ctx.shared.engine.memory_usage(&args[1]) {
                Some(bytes) => Frame::Integer(bytes as i64),
                None => Frame::NullBulk,
            }))
        }
        "STATS" => {
            let stats = ctx.shared.engine.stats_snapshot();
            Ok(Reply::One(Frame::Array(vec![
                Frame::bulk("keys.count"),
                Frame::Integer(ctx.shared.engine.dbsize() as i64),
                Frame::bulk("wal.bytes"),
                Frame::Integer(ctx.shared.engine.wal_size() as i64),
                Frame::bulk("stats.writes"),
                Frame::Integer(stats.writes as i64),
            ])))
        }
        _ => Err(Error::Syntax(format!(
            "unknown subcommand '{}'",
            sub.to_lowercase()
        ))),
    }
}

pub fn slowlog(ctx: &mut Ctx<'_>, args: &[Vec<u8>]) -> Result<Reply> {
    expect_min_args("slowlog", args, 1)?;
    let sub = String::from_utf8_lossy(&args[0]).to_ascii_uppercase();
    match sub.as_str() {
        "GET" => {
            let n = match args.len() {
                1 => 10,
                2 => parse_int(&args[1])?.max(0) as usize,
                _ => return Err(Error::wrong_arity("slowlog")),
            };
            let entries = ctx.shared.slowlog.get(n);
            let items = entries
                .into_iter()
                .map(|entry| {
                    let mut cmdline = vec![Frame::bulk(entry.command)];
                    cmdline.extend(entry.args.into_iter().map(Frame::Bulk));
                    Frame::Array(vec![
                        Frame::Integer(entry.id as i64),
                        Frame::Integer(entry.unix_secs),
                        Frame::Integer(entry.duration.as_micros() as i64),
                        Frame::Array(cmdline),
                        Frame::bulk(entry.peer),
                    ])
                })
                .collect();
            Ok(Reply::One(Frame::Array(items)))
        }
        "LEN" => Ok(Reply::int(ctx.shared.slowlog.len() as i64)),
        "RESET" => {
            ctx.shared.slowlog.reset();
            Ok(Reply::ok())
        }
        _ => Err(Error::Syntax(format!(
            "unknown subcommand '{}'",
            sub.to_lowercase()
        ))),
    }
}

pub fn client(ctx: &mut Ctx<'_>, args: &[Vec<u8>]) -> Result<Reply> {
    expect_min_args("client", args, 1)?;
    let sub = String::from_utf8_lossy(&args[0]).to_ascii_uppercase();
    match sub.as_str() {
        "ID" => Ok(Reply::int(ctx.client.id as i64)),
        "GETNAME" => {
            let name = ctx.client.name.lock().clone();
            Ok(Reply::One(if name.is_empty() {
                Frame::NullBulk
            } else {
                Frame::bulk(name)
            }))
        }
        "SETNAME" => {
            expect_args("client|setname", &args[1..], 1)?;
            let name = String::from_utf8_lossy(&args[1]).to_string();
            if name.contains(' ') || name.contains('\n') {
                return Err(Error::Syntax(
                    "Client names cannot contain spaces, newlines or special characters.".into(),
                ));
            }
            *ctx.client.name.lock() = name;
            Ok(Reply::ok())
        }
        "LIST" => {
            let mut out = String::new();
            for client in ctx.shared.registry.all() {
                out.push_str(&format!(
                    "id={} addr={} name={} age={} cmds={}\n",
                    client.id,
                    client.addr,
                    client.name.lock(),
                    client.created.elapsed().as_secs(),
                    client.commands.load(Ordering::Relaxed),
                ));
            }
            Ok(Reply::One(Frame::bulk(out)))
        }
        "INFO" => Ok(Reply::One(Frame::bulk(format!(
            "id={} addr={} name={} age={} cmds={}",
            ctx.client.id,
            ctx.client.addr,
            ctx.client.name.lock(),
            ctx.client.created.elapsed().as_secs(),
            ctx.client.commands.load(Ordering::Relaxed),
        )))),
        _ => Err(Error::Syntax(format!(
            "unknown subcommand '{}'",
            sub.to_lowercase()
        ))),
    }
}

pub fn acl_cmd(ctx: &mut Ctx<'_>, args: &[Vec<u8>]) -> Result<Reply> {
    expect_min_args("acl", args, 1)?;
    let sub = String::from_utf8_lossy(&args[0]).to_ascii_uppercase();
    match sub.as_str() {
        "WHOAMI" => {
            let user = ctx.session.acl_user.as_deref().unwrap_or("default");
            Ok(Reply::One(Frame::bulk(user)))
        }
        "LIST" => {
            let items = ctx
                .shared
                .config
                .acl_users
                .iter()
                .map(|user| {
                    let perms = match &user.perms {
                        AclPerms::All => "~* +@all".to_string(),
                        AclPerms::ReadOnly => "~* +@read".to_string(),
                        AclPerms::Commands(list) => {
                            let cmds: Vec<String> =
                                list.iter().map(|c| format!("+{}", c.to_lowercase())).collect();
                            format!("~* {}", cmds.join(" "))
                        }
                    };
                    Frame::bulk(format!("user {} on {}", user.name, perms))
                })
                .collect();
            Ok(Reply::One(Frame::Array(items)))
        }
        "GETUSER" => {
            expect_args("acl|getuser", &args[1..], 1)?;
            let name = String::from_utf8_lossy(&args[1]).to_string();
            match acl::find_user(&ctx.shared.config, &name) {
                None => Ok(Reply::One(Frame::NullArray)),
                Some(user) => {
                    let perms = match &user.perms {
                        AclPerms::All => "all".to_string(),
                        AclPerms::ReadOnly => "read-only".to_string(),
                        AclPerms::Commands(list) => list.join(","),
                    };
                    Ok(Reply::One(Frame::Array(vec![
                        Frame::bulk("name"),
                        Frame::bulk(user.name.clone()),
                        Frame::bulk("permissions"),
                        Frame::bulk(perms),
                    ])))
                }
            }
        }
        "CAT" => Ok(Reply::One(Frame::bulk_array(["read", "write", "admin"]))),
        _ => Err(Error::Syntax(format!(
            "unknown subcommand '{}'",
            sub.to_lowercase()
        ))),
    }
}

/// `SAVE [id]`: synchronous snapshot of the string keyspace.
pub fn save(ctx: &mut Ctx<'_>, args: &[Vec<u8>]) -> Result<Reply> {
    if args.len() > 1 {
        return Err(Error::wrong_arity("save"));
    }
    let id = args
        .first()
        .map(|raw| String::from_utf8_lossy(raw).to_string());
    ctx.shared.engine.snapshot_create(id)?;
    Ok(Reply::ok())
}

/// `BGSAVE`: snapshot on a background thread.
pub fn bgsave(ctx: &mut Ctx<'_>, args: &[Vec<u8>]) -> Result<Reply> {
    expect_args("bgsave", args, 0)?;
    let engine = std::sync::Arc::clone(&ctx.shared.engine);
    std::thread::Builder::new()
        .name("ember-bgsave".into())
        .spawn(move || {
            if let Err(e) = engine.snapshot_create(None) {
                tracing::error!(target: "ember::server", error = %e, "background save failed");
            }
        })
        .map_err(|e| Error::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?;
    Ok(Reply::One(Frame::Simple("Background saving started".to_string())))
}

pub fn shutdown(ctx: &mut Ctx<'_>, args: &[Vec<u8>]) -> Result<Reply> {
    if args.len() > 1 {
        return Err(Error::wrong_arity("shutdown"));
    }
    let save_first = match args.first() {
        None => true,
        Some(modifier) if keyword_eq(modifier, "NOSAVE") => false,
        Some(modifier) if keyword_eq(modifier, "SAVE") => true,
        Some(_) => return Err(Error::Syntax("syntax error".into())),
    };
    if save_first {
        ctx.shared.engine.snapshot_create(None)?;
    }
    ctx.shared.shutdown.store(true, Ordering::Release);
    ctx.session.quit = true;
    // Wake the blocked accept so the listener actually stops.
    let _ = std::net::TcpStream::connect(ctx.shared.local_addr);
    Ok(Reply::ok())
}

//! Generic key command handlers.

use super::{expect_args, expect_min_args, keyword_eq, parse_int, Reply};
use crate::dispatch::Ctx;
use crate::resp::Frame;
use ember_core::{now_ms, Error, Result};
use ember_store::{parse_i64, EntryType};

pub fn del(ctx: &mut Ctx<'_>, args: &[Vec<u8>]) -> Result<Reply> {
    expect_min_args("del", args, 1)?;
    Ok(Reply::int(ctx.shared.engine.del(args)? as i64))
}

pub fn exists(ctx: &mut Ctx<'_>, args: &[Vec<u8>]) -> Result<Reply> {
    expect_min_args("exists", args, 1)?;
    Ok(Reply::int(ctx.shared.engine.exists(args) as i64))
}

pub fn expire(ctx: &mut Ctx<'_>, args: &[Vec<u8>]) -> Result<Reply> {
    expect_args("expire", args, 2)?;
    let secs = parse_int(&args[1])?;
    let applied = ctx
        .shared
        .engine
        .expire_at(&args[0], now_ms() + secs.saturating_mul(1000))?;
    Ok(Reply::int(applied as i64))
}

pub fn pexpire(ctx: &mut Ctx<'_>, args: &[Vec<u8>]) -> Result<Reply> {
    expect_args("pexpire", args, 2)?;
    let millis = parse_int(&args[1])?;
    let applied = ctx.shared.engine.expire_at(&args[0], now_ms() + millis)?;
    Ok(Reply::int(applied as i64))
}

pub fn ttl(ctx: &mut Ctx<'_>, args: &[Vec<u8>]) -> Result<Reply> {
    expect_args("ttl", args, 1)?;
    Ok(Reply::int(match ctx.shared.engine.ttl_ms(&args[0]) {
        None => -2,
        Some(None) => -1,
        // Round up so a key with any time left never reports 0.
        Some(Some(ms)) => (ms + 999) / 1000,
    }))
}

pub fn pttl(ctx: &mut Ctx<'_>, args: &[Vec<u8>]) -> Result<Reply> {
    expect_args("pttl", args, 1)?;
    Ok(Reply::int(match ctx.shared.engine.ttl_ms(&args[0]) {
        None => -2,
        Some(None) => -1,
        Some(Some(ms)) => ms,
    }))
}

pub fn persist(ctx: &mut Ctx<'_>, args: &[Vec<u8>]) -> Result<Reply> {
    expect_args("persist", args, 1)?;
    Ok(Reply::int(ctx.shared.engine.persist(&args[0])? as i64))
}

pub fn type_cmd(ctx: &mut Ctx<'_>, args: &[Vec<u8>]) -> Result<Reply> {
    expect_args("type", args, 1)?;
    let name = ctx
        .shared
        .engine
        .type_of(&args[0])
        .map(|t| t.name())
        .unwrap_or("none");
    Ok(Reply::One(Frame::Simple(name.to_string())))
}

pub fn keys(ctx: &mut Ctx<'_>, args: &[Vec<u8>]) -> Result<Reply> {
    expect_args("keys", args, 1)?;
    let mut found = ctx.shared.engine.keys(&args[0]);
    found.sort();
    Ok(Reply::One(Frame::bulk_array(found)))
}

pub fn scan(ctx: &mut Ctx<'_>, args: &[Vec<u8>]) -> Result<Reply> {
    expect_min_args("scan", args, 1)?;
    let cursor = parse_i64(&args[0]).map_err(|_| Error::Syntax("invalid cursor".into()))?;
    if cursor < 0 {
        return Err(Error::Syntax("invalid cursor".into()));
    }
    let mut pattern: Option<&[u8]> = None;
    let mut count = 10usize;
    let mut i = 1;
    while i < args.len() {
        if keyword_eq(&args[i], "MATCH") {
            pattern = Some(
                args.get(i + 1)
                    .ok_or_else(|| Error::Syntax("syntax error".into()))?,
            );
            i += 2;
        } else if keyword_eq(&args[i], "COUNT") {
            let n = parse_int(
                args.get(i + 1)
                    .ok_or_else(|| Error::Syntax("syntax error".into()))?,
            )?;
            if n <= 0 {
                return Err(Error::Syntax("syntax error".into()));
            }
            count = n as usize;
            i += 2;
        } else {
            return Err(Error::Syntax("syntax error".into()));
        }
    }
    let page = ctx.shared.engine.scan(cursor as u64, pattern, count);
    Ok(Reply::One(Frame::Array(vec![
        Frame::bulk(page.cursor.to_string()),
        Frame::bulk_array(page.keys),
    ])))
}

pub fn rename(ctx: &mut Ctx<'_>, args: &[Vec<u8>]) -> Result<Reply> {
    expect_args("rename", args, 2)?;
    ctx.shared.engine.rename(&args[0], &args[1])?;
    Ok(Reply::ok())
}

pub fn renamenx(ctx: &mut Ctx<'_>, args: &[Vec<u8>]) -> Result<Reply> {
    expect_args("renamenx", args, 2)?;
    let applied = ctx.shared.engine.renamenx(&args[0], &args[1])?;
    Ok(Reply::int(applied as i64))
}

pub fn copy(ctx: &mut Ctx<'_>, args: &[Vec<u8>]) -> Result<Reply> {
    expect_min_args("copy", args, 2)?;
    let replace = match args.len() {
        2 => false,
        3 if keyword_eq(&args[2], "REPLACE") => true,
        _ => return Err(Error::Syntax("syntax error".into())),
    };
    let applied = ctx.shared.engine.copy(&args[0], &args[1], replace)?;
    Ok(Reply::int(applied as i64))
}

pub fn randomkey(ctx: &mut Ctx<'_>, args: &[Vec<u8>]) -> Result<Reply> {
    expect_args("randomkey", args, 0)?;
    Ok(Reply::One(Frame::maybe_bulk(ctx.shared.engine.random_key())))
}

pub fn touch(ctx: &mut Ctx<'_>, args: &[Vec<u8>]) -> Result<Reply> {
    expect_min_args("touch", args, 1)?;
    Ok(Reply::int(ctx.shared.engine.touch(args) as i64))
}

/// Serialized string value in the snapshot payload encoding. A local
/// format, not RDB; only string keys are dumpable.
pub fn dump(ctx: &mut Ctx<'_>, args: &[Vec<u8>]) -> Result<Reply> {
    expect_args("dump", args, 1)?;
    match ctx.shared.engine.type_of(&args[0]) {
        None => Ok(Reply::One(Frame::NullBulk)),
        Some(EntryType::String) => {
            let value = ctx.shared.engine.get(&args[0])?;
            Ok(Reply::One(Frame::maybe_bulk(value)))
        }
        Some(_) => Err(Error::WrongType),
    }
}

pub fn object(ctx: &mut Ctx<'_>, args: &[Vec<u8>]) -> Result<Reply> {
    expect_min_args("object", args, 1)?;
    let sub = String::from_utf8_lossy(&args[0]).to_ascii_uppercase();
    match sub.as_str() {
        "ENCODING" => {
            expect_args("object", &args[1..], 1)?;
            let key = &args[1];
            let encoding = match ctx.shared.engine.type_of(key) {
                None => return Err(Error::NoSuchKey),
                Some(EntryType::String) => {
                    // Integer-looking strings report the int encoding.
                    match ctx.shared.engine.get(key)? {
                        Some(v) if parse_i64(&v).is_ok() => "int",
                        _ => "raw",
                    }
                }
                Some(EntryType::Hash) => "hashtable",
                Some(EntryType::List) => "quicklist",
                Some(EntryType::Set) => "hashtable",
                Some(EntryType::ZSet) => "skiplist",
            };
            Ok(Reply::One(Frame::bulk(encoding)))
        }
        "REFCOUNT" => {
            expect_args("object", &args[1..], 1)?;
            if ctx.shared.engine.type_of(&args[1]).is_none() {
                return Err(Error::NoSuchKey);
            }
            Ok(Reply::int(1))
        }
        "IDLETIME" => {
            expect_args("object", &args[1..], 1)?;
            if ctx.shared.engine.type_of(&args[1]).is_none() {
                return Err(Error::NoSuchKey);
            }
            Ok(Reply::int(0))
        }
        "HELP" => Ok(Reply::One(Frame::bulk_array([
            "OBJECT ENCODING <key>",
            "OBJECT REFCOUNT <key>",
            "OBJECT IDLETIME <key>",
        ]))),
        _ => Err(Error::Syntax(format!(
            "unknown subcommand '{}'. Try OBJECT HELP.",
            sub.to_lowercase()
        ))),
    }
}

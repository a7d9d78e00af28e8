//! String command handlers.

use super::{expect_args, expect_min_args, keyword_eq, parse_int, Reply};
use crate::dispatch::Ctx;
use crate::resp::Frame;
use ember_core::{now_ms, Error, Result};
use ember_engine::{SetOptions, TtlChange};

pub fn set(ctx: &mut Ctx<'_>, args: &[Vec<u8>]) -> Result<Reply> {
    expect_min_args("set", args, 2)?;
    let key = &args[0];
    let value = args[1].clone();

    let mut opts = SetOptions::default();
    let mut i = 2;
    while i < args.len() {
        let opt = &args[i];
        if keyword_eq(opt, "EX") || keyword_eq(opt, "PX") || keyword_eq(opt, "EXAT") || keyword_eq(opt, "PXAT") {
            let raw = args.get(i + 1).ok_or_else(|| Error::Syntax("syntax error".into()))?;
            let n = parse_int(raw)?;
            if n <= 0 && (keyword_eq(opt, "EX") || keyword_eq(opt, "PX")) {
                return Err(Error::Syntax("invalid expire time in 'set' command".into()));
            }
            let deadline = if keyword_eq(opt, "EX") {
                now_ms() + n * 1000
            } else if keyword_eq(opt, "PX") {
                now_ms() + n
            } else if keyword_eq(opt, "EXAT") {
                n * 1000
            } else {
                n
            };
            opts.deadline_ms = Some(deadline);
            i += 2;
        } else if keyword_eq(opt, "NX") {
            opts.nx = true;
            i += 1;
        } else if keyword_eq(opt, "XX") {
            opts.xx = true;
            i += 1;
        } else if keyword_eq(opt, "KEEPTTL") {
            opts.keep_ttl = true;
            i += 1;
        } else if keyword_eq(opt, "GET") {
            opts.want_old = true;
            i += 1;
        } else {
            return Err(Error::Syntax("syntax error".into()));
        }
    }
    if opts.nx && opts.xx {
        return Err(Error::Syntax("syntax error".into()));
    }

    let outcome = ctx.shared.engine.set_value(key, value, opts)?;
    Ok(Reply::One(if opts.want_old {
        Frame::maybe_bulk(outcome.old)
    } else if outcome.applied {
        Frame::ok()
    } else {
        Frame::NullBulk
    }))
}

pub fn get(ctx: &mut Ctx<'_>, args: &[Vec<u8>]) -> Result<Reply> {
    expect_args("get", args, 1)?;
    Ok(Reply::One(Frame::maybe_bulk(ctx.shared.engine.get(&args[0])?)))
}

pub fn getset(ctx: &mut Ctx<'_>, args: &[Vec<u8>]) -> Result<Reply> {
    expect_args("getset", args, 2)?;
    let old = ctx.shared.engine.getset(&args[0], args[1].clone())?;
    Ok(Reply::One(Frame::maybe_bulk(old)))
}

pub fn getdel(ctx: &mut Ctx<'_>, args: &[Vec<u8>]) -> Result<Reply> {
    expect_args("getdel", args, 1)?;
    Ok(Reply::One(Frame::maybe_bulk(ctx.shared.engine.getdel(&args[0])?)))
}

pub fn getex(ctx: &mut Ctx<'_>, args: &[Vec<u8>]) -> Result<Reply> {
    expect_min_args("getex", args, 1)?;
    let key = &args[0];
    let change = match args.len() {
        1 => TtlChange::Keep,
        2 if keyword_eq(&args[1], "PERSIST") => TtlChange::Persist,
        3 => {
            let n = parse_int(&args[2])?;
            if keyword_eq(&args[1], "EX") {
                TtlChange::Deadline(now_ms() + n * 1000)
            } else if keyword_eq(&args[1], "PX") {
                TtlChange::Deadline(now_ms() + n)
            } else if keyword_eq(&args[1], "EXAT") {
                TtlChange::Deadline(n * 1000)
            } else if keyword_eq(&args[1], "PXAT") {
                TtlChange::Deadline(n)
            } else {
                return Err(Error::Syntax("syntax error".into()));
            }
        }
        _ => return Err(Error::Syntax("syntax error".into())),
    };
    Ok(Reply::One(Frame::maybe_bulk(
        ctx.shared.engine.getex(key, change)?,
    )))
}

pub fn setnx(ctx: &mut Ctx<'_>, args: &[Vec<u8>]) -> Result<Reply> {
    expect_args("setnx", args, 2)?;
    let applied = ctx.shared.engine.setnx(&args[0], args[1].clone())?;
    Ok(Reply::int(applied as i64))
}

pub fn setex(ctx: &mut Ctx<'_>, args: &[Vec<u8>]) -> Result<Reply> {
    expect_args("setex", args, 3)?;
    set_with_ttl(ctx, args, 1000, "setex")
}

pub fn psetex(ctx: &mut Ctx<'_>, args: &[Vec<u8>]) -> Result<Reply> {
    expect_args("psetex", args, 3)?;
    set_with_ttl(ctx, args, 1, "psetex")
}

fn set_with_ttl(ctx: &mut Ctx<'_>, args: &[Vec<u8>], unit_ms: i64, cmd: &str) -> Result<Reply> {
    let ttl = parse_int(&args[1])?;
    if ttl <= 0 {
        return Err(Error::Syntax(format!(
            "invalid expire time in '{}' command",
            cmd
        )));
    }
    let opts = SetOptions {
        deadline_ms: Some(now_ms() + ttl * unit_ms),
        ..SetOptions::default()
    };
    ctx.shared.engine.set_value(&args[0], args[2].clone(), opts)?;
    Ok(Reply::ok())
}

pub fn append(ctx: &mut Ctx<'_>, args: &[Vec<u8>]) -> Result<Reply> {
    expect_args("append", args, 2)?;
    Ok(Reply::int(ctx.shared.engine.append(&args[0], &args[1])? as i64))
}

pub fn strlen(ctx: &mut Ctx<'_>, args: &[Vec<u8>]) -> Result<Reply> {
    expect_args("strlen", args, 1)?;
    Ok(Reply::int(ctx.shared.engine.strlen(&args[0])? as i64))
}

pub fn getrange(ctx: &mut Ctx<'_>, args: &[Vec<u8>]) -> Result<Reply> {
    expect_args("getrange", args, 3)?;
    let start = parse_int(&args[1])?;
    let stop = parse_int(&args[2])?;
    Ok(Reply::One(Frame::Bulk(
        ctx.shared.engine.getrange(&args[0], start, stop)?,
    )))
}

pub fn setrange(ctx: &mut Ctx<'_>, args: &[Vec<u8>]) -> Result<Reply> {
    expect_args("setrange", args, 3)?;
    let offset = parse_int(&args[1])?;
    if offset < 0 {
        return Err(Error::Syntax("offset is out of range".into()));
    }
    Ok(Reply::int(
        ctx.shared.engine.setrange(&args[0], offset as usize, &args[2])? as i64,
    ))
}

pub fn incr(ctx: &mut Ctx<'_>, args: &[Vec<u8>]) -> Result<Reply> {
    expect_args("incr", args, 1)?;
    Ok(Reply::int(ctx.shared.engine.incr_by(&args[0], 1)?))
}

pub fn incrby(ctx: &mut Ctx<'_>, args: &[Vec<u8>]) -> Result<Reply> {
    expect_args("incrby", args, 2)?;
    let delta = parse_int(&args[1])?;
    Ok(Reply::int(ctx.shared.engine.incr_by(&args[0], delta)?))
}

pub fn incrbyfloat(ctx: &mut Ctx<'_>, args: &[Vec<u8>]) -> Result<Reply> {
    expect_args("incrbyfloat", args, 2)?;
    let delta = super::parse_float(&args[1])?;
    let next = ctx.shared.engine.incr_by_float(&args[0], delta)?;
    Ok(Reply::One(Frame::bulk(ember_store::format_f64(next))))
}

pub fn decr(ctx: &mut Ctx<'_>, args: &[Vec<u8>]) -> Result<Reply> {
    expect_args("decr", args, 1)?;
    Ok(Reply::int(ctx.shared.engine.incr_by(&args[0], -1)?))
}

pub fn decrby(ctx: &mut Ctx<'_>, args: &[Vec<u8>]) -> Result<Reply> {
    expect_args("decrby", args, 2)?;
    let delta = parse_int(&args[1])?;
    let delta = delta.checked_neg().ok_or(Error::NotInteger)?;
    Ok(Reply::int(ctx.shared.engine.incr_by(&args[0], delta)?))
}

pub fn mset(ctx: &mut Ctx<'_>, args: &[Vec<u8>]) -> Result<Reply> {
    expect_min_args("mset", args, 2)?;
    if args.len() % 2 != 0 {
        return Err(Error::wrong_arity("mset"));
    }
    let pairs = args
        .chunks_exact(2)
        .map(|pair| (pair[0].clone(), pair[1].clone()))
        .collect();
    ctx.shared.engine.mset(pairs)?;
    Ok(Reply::ok())
}

pub fn mget(ctx: &mut Ctx<'_>, args: &[Vec<u8>]) -> Result<Reply> {
    expect_min_args("mget", args, 1)?;
    let values = ctx.shared.engine.mget(args);
    Ok(Reply::One(Frame::Array(
        values.into_iter().map(Frame::maybe_bulk).collect(),
    )))
}

pub fn msetnx(ctx: &mut Ctx<'_>, args: &[Vec<u8>]) -> Result<Reply> {
    expect_min_args("msetnx", args, 2)?;
    if args.len() % 2 != 0 {
        return Err(Error::wrong_arity("msetnx"));
    }
    let pairs = args
        .chunks_exact(2)
        .map(|pair| (pair[0].clone(), pair[1].clone()))
        .collect();
    let applied = ctx.shared.engine.msetnx(pairs)?;
    Ok(Reply::int(applied as i64))
}

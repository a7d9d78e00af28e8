//! List command handlers.

use super::{expect_args, expect_min_args, keyword_eq, parse_int, Reply};
use crate::dispatch::Ctx;
use crate::resp::Frame;
use ember_core::{Error, Result};

pub fn lpush(ctx: &mut Ctx<'_>, args: &[Vec<u8>]) -> Result<Reply> {
    expect_min_args("lpush", args, 2)?;
    let len = ctx.shared.engine.lpush(&args[0], args[1..].to_vec())?;
    Ok(Reply::int(len as i64))
}

pub fn rpush(ctx: &mut Ctx<'_>, args: &[Vec<u8>]) -> Result<Reply> {
    expect_min_args("rpush", args, 2)?;
    let len = ctx.shared.engine.rpush(&args[0], args[1..].to_vec())?;
    Ok(Reply::int(len as i64))
}

pub fn lpop(ctx: &mut Ctx<'_>, args: &[Vec<u8>]) -> Result<Reply> {
    pop(ctx, args, true, "lpop")
}

pub fn rpop(ctx: &mut Ctx<'_>, args: &[Vec<u8>]) -> Result<Reply> {
    pop(ctx, args, false, "rpop")
}

/// Without a count the reply is one bulk (or nil); with a count it is an
/// array (or nil array when the key is absent).
fn pop(ctx: &mut Ctx<'_>, args: &[Vec<u8>], head: bool, cmd: &str) -> Result<Reply> {
    expect_min_args(cmd, args, 1)?;
    let counted = match args.len() {
        1 => None,
        2 => {
            let n = parse_int(&args[1])?;
            if n < 0 {
                return Err(Error::Syntax("value is out of range, must be positive".into()));
            }
            Some(n as usize)
        }
        _ => return Err(Error::wrong_arity(cmd)),
    };
    let n = counted.unwrap_or(1);
    let popped = if head {
        ctx.shared.engine.lpop(&args[0], n)?
    } else {
        ctx.shared.engine.rpop(&args[0], n)?
    };
    Ok(Reply::One(match counted {
        None => Frame::maybe_bulk(popped.into_iter().next()),
        Some(_) if popped.is_empty() => Frame::NullArray,
        Some(_) => Frame::bulk_array(popped),
    }))
}

pub fn llen(ctx: &mut Ctx<'_>, args: &[Vec<u8>]) -> Result<Reply> {
    expect_args("llen", args, 1)?;
    Ok(Reply::int(ctx.shared.engine.llen(&args[0])? as i64))
}

pub fn lindex(ctx: &mut Ctx<'_>, args: &[Vec<u8>]) -> Result<Reply> {
    expect_args("lindex", args, 2)?;
    let index = parse_int(&args[1])?;
    Ok(Reply::One(Frame::maybe_bulk(
        ctx.shared.engine.lindex(&args[0], index)?,
    )))
}

pub fn lset(ctx: &mut Ctx<'_>, args: &[Vec<u8>]) -> Result<Reply> {
    expect_args("lset", args, 3)?;
    let index = parse_int(&args[1])?;
    ctx.shared.engine.lset(&args[0], index, args[2].clone())?;
    Ok(Reply::ok())
}

pub fn lrange(ctx: &mut Ctx<'_>, args: &[Vec<u8>]) -> Result<Reply> {
    expect_args("lrange", args, 3)?;
    let start = parse_int(&args[1])?;
    let stop = parse_int(&args[2])?;
    Ok(Reply::One(Frame::bulk_array(
        ctx.shared.engine.lrange(&args[0], start, stop)?,
    )))
}

pub fn linsert(ctx: &mut Ctx<'_>, args: &[Vec<u8>]) -> Result<Reply> {
    expect_args("linsert", args, 4)?;
    let before = if keyword_eq(&args[1], "BEFORE") {
        true
    } else if keyword_eq(&args[1], "AFTER") {
        false
    } else {
        return Err(Error::Syntax("syntax error".into()));
    };
    let len = ctx
        .shared
        .engine
        .linsert(&args[0], before, &args[2], args[3].clone())?;
    Ok(Reply::int(len))
}

pub fn lrem(ctx: &mut Ctx<'_>, args: &[Vec<u8>]) -> Result<Reply> {
    expect_args("lrem", args, 3)?;
    let count = parse_int(&args[1])?;
    Ok(Reply::int(ctx.shared.engine.lrem(&args[0], count, &args[2])? as i64))
}

pub fn ltrim(ctx: &mut Ctx<'_>, args: &[Vec<u8>]) -> Result<Reply> {
    expect_args("ltrim", args, 3)?;
    let start = parse_int(&args[1])?;
    let stop = parse_int(&args[2])?;
    ctx.shared.engine.ltrim(&args[0], start, stop)?;
    Ok(Reply::ok())
}

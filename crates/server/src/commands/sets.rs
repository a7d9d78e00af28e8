//! Set command handlers.

use super::{expect_args, expect_min_args, parse_int, Reply};
use crate::dispatch::Ctx;
use crate::resp::Frame;
use ember_core::{Error, Result};

pub fn sadd(ctx: &mut Ctx<'_>, args: &[Vec<u8>]) -> Result<Reply> {
    expect_min_args("sadd", args, 2)?;
    let added = ctx.shared.engine.sadd(&args[0], args[1..].to_vec())?;
    Ok(Reply::int(added as i64))
}

pub fn srem(ctx: &mut Ctx<'_>, args: &[Vec<u8>]) -> Result<Reply> {
    expect_min_args("srem", args, 2)?;
    let removed = ctx.shared.engine.srem(&args[0], &args[1..])?;
    Ok(Reply::int(removed as i64))
}

pub fn sismember(ctx: &mut Ctx<'_>, args: &[Vec<u8>]) -> Result<Reply> {
    expect_args("sismember", args, 2)?;
    Ok(Reply::int(ctx.shared.engine.sismember(&args[0], &args[1])? as i64))
}

pub fn scard(ctx: &mut Ctx<'_>, args: &[Vec<u8>]) -> Result<Reply> {
    expect_args("scard", args, 1)?;
    Ok(Reply::int(ctx.shared.engine.scard(&args[0])? as i64))
}

pub fn smembers(ctx: &mut Ctx<'_>, args: &[Vec<u8>]) -> Result<Reply> {
    expect_args("smembers", args, 1)?;
    let mut members = ctx.shared.engine.smembers(&args[0])?;
    members.sort();
    Ok(Reply::One(Frame::bulk_array(members)))
}

/// Without a count: single random member (or nil). With a count: array,
/// negative count drawing with replacement.
pub fn srandmember(ctx: &mut Ctx<'_>, args: &[Vec<u8>]) -> Result<Reply> {
    expect_min_args("srandmember", args, 1)?;
    match args.len() {
        1 => {
            let members = ctx.shared.engine.srand_member(&args[0], 1)?;
            Ok(Reply::One(Frame::maybe_bulk(members.into_iter().next())))
        }
        2 => {
            let n = parse_int(&args[1])?;
            let members = ctx.shared.engine.srand_member(&args[0], n)?;
            Ok(Reply::One(Frame::bulk_array(members)))
        }
        _ => Err(Error::wrong_arity("srandmember")),
    }
}

pub fn spop(ctx: &mut Ctx<'_>, args: &[Vec<u8>]) -> Result<Reply> {
    expect_min_args("spop", args, 1)?;
    match args.len() {
        1 => {
            let popped = ctx.shared.engine.spop(&args[0], 1)?;
            Ok(Reply::One(Frame::maybe_bulk(popped.into_iter().next())))
        }
        2 => {
            let n = parse_int(&args[1])?;
            if n < 0 {
                return Err(Error::Syntax("value is out of range, must be positive".into()));
            }
            let popped = ctx.shared.engine.spop(&args[0], n as usize)?;
            Ok(Reply::One(Frame::bulk_array(popped)))
        }
        _ => Err(Error::wrong_arity("spop")),
    }
}

pub fn sinter(ctx: &mut Ctx<'_>, args: &[Vec<u8>]) -> Result<Reply> {
    expect_min_args("sinter", args, 1)?;
    let mut members = ctx.shared.engine.sinter(args)?;
    members.sort();
    Ok(Reply::One(Frame::bulk_array(members)))
}

pub fn sunion(ctx: &mut Ctx<'_>, args: &[Vec<u8>]) -> Result<Reply> {
    expect_min_args("sunion", args, 1)?;
    let mut members = ctx.shared.engine.sunion(args)?;
    members.sort();
    Ok(Reply::One(Frame::bulk_array(members)))
}

pub fn sdiff(ctx: &mut Ctx<'_>, args: &[Vec<u8>]) -> Result<Reply> {
    expect_min_args("sdiff", args, 1)?;
    let mut members = ctx.shared.engine.sdiff(args)?;
    members.sort();
    Ok(Reply::One(Frame::bulk_array(members)))
}

//! Hash command handlers.

use super::{expect_args, expect_min_args, parse_int, Reply};
use crate::dispatch::Ctx;
use crate::resp::Frame;
use ember_core::{Error, Result};

fn field_pairs(cmd: &str, args: &[Vec<u8>]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
    if args.len() < 3 || args.len() % 2 == 0 {
        return Err(Error::wrong_arity(cmd));
    }
    Ok(args[1..]
        .chunks_exact(2)
        .map(|pair| (pair[0].clone(), pair[1].clone()))
        .collect())
}

pub fn hset(ctx: &mut Ctx<'_>, args: &[Vec<u8>]) -> Result<Reply> {
    let pairs = field_pairs("hset", args)?;
    Ok(Reply::int(ctx.shared.engine.hset(&args[0], pairs)? as i64))
}

/// Legacy spelling of HSET replying `+OK`.
pub fn hmset(ctx: &mut Ctx<'_>, args: &[Vec<u8>]) -> Result<Reply> {
    let pairs = field_pairs("hmset", args)?;
    ctx.shared.engine.hset(&args[0], pairs)?;
    Ok(Reply::ok())
}

pub fn hget(ctx: &mut Ctx<'_>, args: &[Vec<u8>]) -> Result<Reply> {
    expect_args("hget", args, 2)?;
    Ok(Reply::One(Frame::maybe_bulk(
        ctx.shared.engine.hget(&args[0], &args[1])?,
    )))
}

pub fn hmget(ctx: &mut Ctx<'_>, args: &[Vec<u8>]) -> Result<Reply> {
    expect_min_args("hmget", args, 2)?;
    let values = ctx.shared.engine.hmget(&args[0], &args[1..])?;
    Ok(Reply::One(Frame::Array(
        values.into_iter().map(Frame::maybe_bulk).collect(),
    )))
}

pub fn hdel(ctx: &mut Ctx<'_>, args: &[Vec<u8>]) -> Result<Reply> {
    expect_min_args("hdel", args, 2)?;
    Ok(Reply::int(ctx.shared.engine.hdel(&args[0], &args[1..])? as i64))
}

pub fn hexists(ctx: &mut Ctx<'_>, args: &[Vec<u8>]) -> Result<Reply> {
    expect_args("hexists", args, 2)?;
    Ok(Reply::int(ctx.shared.engine.hexists(&args[0], &args[1])? as i64))
}

pub fn hlen(ctx: &mut Ctx<'_>, args: &[Vec<u8>]) -> Result<Reply> {
    expect_args("hlen", args, 1)?;
    Ok(Reply::int(ctx.shared.engine.hlen(&args[0])? as i64))
}

pub fn hgetall(ctx: &mut Ctx<'_>, args: &[Vec<u8>]) -> Result<Reply> {
    expect_args("hgetall", args, 1)?;
    let mut fields = ctx.shared.engine.hgetall(&args[0])?;
    fields.sort();
    let mut items = Vec::with_capacity(fields.len() * 2);
    for (field, value) in fields {
        items.push(Frame::Bulk(field));
        items.push(Frame::Bulk(value));
    }
    Ok(Reply::One(Frame::Array(items)))
}

pub fn hkeys(ctx: &mut Ctx<'_>, args: &[Vec<u8>]) -> Result<Reply> {
    expect_args("hkeys", args, 1)?;
    let mut fields = ctx.shared.engine.hkeys(&args[0])?;
    fields.sort();
    Ok(Reply::One(Frame::bulk_array(fields)))
}

pub fn hvals(ctx: &mut Ctx<'_>, args: &[Vec<u8>]) -> Result<Reply> {
    expect_args("hvals", args, 1)?;
    let mut fields = ctx.shared.engine.hgetall(&args[0])?;
    fields.sort();
    Ok(Reply::One(Frame::bulk_array(
        fields.into_iter().map(|(_, value)| value),
    )))
}

pub fn hincrby(ctx: &mut Ctx<'_>, args: &[Vec<u8>]) -> Result<Reply> {
    expect_args("hincrby", args, 3)?;
    let delta = parse_int(&args[2])?;
    Ok(Reply::int(ctx.shared.engine.hincr_by(&args[0], &args[1], delta)?))
}

pub fn hincrbyfloat(ctx: &mut Ctx<'_>, args: &[Vec<u8>]) -> Result<Reply> {
    expect_args("hincrbyfloat", args, 3)?;
    let delta = super::parse_float(&args[2])?;
    let next = ctx.shared.engine.hincr_by_float(&args[0], &args[1], delta)?;
    Ok(Reply::One(Frame::bulk(ember_store::format_f64(next))))
}

pub fn hsetnx(ctx: &mut Ctx<'_>, args: &[Vec<u8>]) -> Result<Reply> {
    expect_args("hsetnx", args, 3)?;
    let applied = ctx
        .shared
        .engine
        .hsetnx(&args[0], &args[1], args[2].clone())?;
    Ok(Reply::int(applied as i64))
}

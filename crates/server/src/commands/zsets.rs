//! Sorted-set command handlers.

use super::{
    expect_args, expect_min_args, keyword_eq, parse_float, parse_int, parse_score_bound,
    scored_members_frame, Reply,
};
use crate::dispatch::Ctx;
use crate::resp::Frame;
use ember_core::{Error, Result};
use ember_store::format_f64;

pub fn zadd(ctx: &mut Ctx<'_>, args: &[Vec<u8>]) -> Result<Reply> {
    if args.len() < 3 || args.len() % 2 == 0 {
        return Err(Error::wrong_arity("zadd"));
    }
    let mut members = Vec::with_capacity((args.len() - 1) / 2);
    for pair in args[1..].chunks_exact(2) {
        let score = parse_float(&pair[0])?;
        members.push((score, pair[1].clone()));
    }
    let created = ctx.shared.engine.zadd(&args[0], members)?;
    Ok(Reply::int(created as i64))
}

pub fn zscore(ctx: &mut Ctx<'_>, args: &[Vec<u8>]) -> Result<Reply> {
    expect_args("zscore", args, 2)?;
    Ok(Reply::One(
        match ctx.shared.engine.zscore(&args[0], &args[1])? {
            Some(score) => Frame::bulk(format_f64(score)),
            None => Frame::NullBulk,
        },
    ))
}

pub fn zrem(ctx: &mut Ctx<'_>, args: &[Vec<u8>]) -> Result<Reply> {
    expect_min_args("zrem", args, 2)?;
    Ok(Reply::int(ctx.shared.engine.zrem(&args[0], &args[1..])? as i64))
}

pub fn zcard(ctx: &mut Ctx<'_>, args: &[Vec<u8>]) -> Result<Reply> {
    expect_args("zcard", args, 1)?;
    Ok(Reply::int(ctx.shared.engine.zcard(&args[0])? as i64))
}

pub fn zrank(ctx: &mut Ctx<'_>, args: &[Vec<u8>]) -> Result<Reply> {
    expect_args("zrank", args, 2)?;
    Ok(Reply::One(
        match ctx.shared.engine.zrank(&args[0], &args[1])? {
            Some(rank) => Frame::Integer(rank as i64),
            None => Frame::NullBulk,
        },
    ))
}

pub fn zrevrank(ctx: &mut Ctx<'_>, args: &[Vec<u8>]) -> Result<Reply> {
    expect_args("zrevrank", args, 2)?;
    Ok(Reply::One(
        match ctx.shared.engine.zrev_rank(&args[0], &args[1])? {
            Some(rank) => Frame::Integer(rank as i64),
            None => Frame::NullBulk,
        },
    ))
}

fn with_scores_flag(cmd: &str, args: &[Vec<u8>], base: usize) -> Result<bool> {
    match args.len() - base {
        0 => Ok(false),
        1 if keyword_eq(&args[base], "WITHSCORES") => Ok(true),
        _ => Err(Error::Syntax(format!("syntax error in '{}'", cmd))),
    }
}

pub fn zrange(ctx: &mut Ctx<'_>, args: &[Vec<u8>]) -> Result<Reply> {
    expect_min_args("zrange", args, 3)?;
    let start = parse_int(&args[1])?;
    let stop = parse_int(&args[2])?;
    let with_scores = with_scores_flag("zrange", args, 3)?;
    let page = ctx.shared.engine.zrange(&args[0], start, stop)?;
    Ok(Reply::One(scored_members_frame(page, with_scores)))
}

pub fn zrevrange(ctx: &mut Ctx<'_>, args: &[Vec<u8>]) -> Result<Reply> {
    expect_min_args("zrevrange", args, 3)?;
    let start = parse_int(&args[1])?;
    let stop = parse_int(&args[2])?;
    let with_scores = with_scores_flag("zrevrange", args, 3)?;
    let page = ctx.shared.engine.zrevrange(&args[0], start, stop)?;
    Ok(Reply::One(scored_members_frame(page, with_scores)))
}

struct ScoreRangeArgs {
    with_scores: bool,
    offset: usize,
    count: i64,
}

fn parse_score_range_tail(cmd: &str, args: &[Vec<u8>], mut i: usize) -> Result<ScoreRangeArgs> {
    let mut parsed = ScoreRangeArgs {
        with_scores: false,
        offset: 0,
        count: -1,
    };
    while i < args.len() {
        if keyword_eq(&args[i], "WITHSCORES") {
            parsed.with_scores = true;
            i += 1;
        } else if keyword_eq(&args[i], "LIMIT") {
            if i + 2 >= args.len() {
                return Err(Error::Syntax(format!("syntax error in '{}'", cmd)));
            }
            let offset = parse_int(&args[i + 1])?;
            if offset < 0 {
                return Err(Error::Syntax("LIMIT offset must be non-negative".into()));
            }
            parsed.offset = offset as usize;
            parsed.count = parse_int(&args[i + 2])?;
            i += 3;
        } else {
            return Err(Error::Syntax(format!("syntax error in '{}'", cmd)));
        }
    }
    Ok(parsed)
}

pub fn zrangebyscore(ctx: &mut Ctx<'_>, args: &[Vec<u8>]) -> Result<Reply> {
    expect_min_args("zrangebyscore", args, 3)?;
    let min = parse_score_bound(&args[1])?;
    let max = parse_score_bound(&args[2])?;
    let tail = parse_score_range_tail("zrangebyscore", args, 3)?;
    let page = ctx
        .shared
        .engine
        .zrange_by_score(&args[0], min, max, tail.offset, tail.count)?;
    Ok(Reply::One(scored_members_frame(page, tail.with_scores)))
}

pub fn zrevrangebyscore(ctx: &mut Ctx<'_>, args: &[Vec<u8>]) -> Result<Reply> {
    expect_min_args("zrevrangebyscore", args, 3)?;
    // Arguments come max first, then min.
    let max = parse_score_bound(&args[1])?;
    let min = parse_score_bound(&args[2])?;
    let tail = parse_score_range_tail("zrevrangebyscore", args, 3)?;
    let page = ctx
        .shared
        .engine
        .zrevrange_by_score(&args[0], max, min, tail.offset, tail.count)?;
    Ok(Reply::One(scored_members_frame(page, tail.with_scores)))
}

pub fn zcount(ctx: &mut Ctx<'_>, args: &[Vec<u8>]) -> Result<Reply> {
    expect_args("zcount", args, 3)?;
    let min = parse_score_bound(&args[1])?;
    let max = parse_score_bound(&args[2])?;
    Ok(Reply::int(ctx.shared.engine.zcount(&args[0], min, max)? as i64))
}

pub fn zincrby(ctx: &mut Ctx<'_>, args: &[Vec<u8>]) -> Result<Reply> {
    expect_args("zincrby", args, 3)?;
    let delta = parse_float(&args[1])?;
    let next = ctx.shared.engine.zincr_by(&args[0], &args[2], delta)?;
    Ok(Reply::One(Frame::bulk(format_f64(next))))
}

pub fn zremrangebyrank(ctx: &mut Ctx<'_>, args: &[Vec<u8>]) -> Result<Reply> {
    expect_args("zremrangebyrank", args, 3)?;
    let start = parse_int(&args[1])?;
    let stop = parse_int(&args[2])?;
    let removed = ctx.shared.engine.zrem_range_by_rank(&args[0], start, stop)?;
    Ok(Reply::int(removed as i64))
}

pub fn zremrangebyscore(ctx: &mut Ctx<'_>, args: &[Vec<u8>]) -> Result<Reply> {
    expect_args("zremrangebyscore", args, 3)?;
    let min = parse_score_bound(&args[1])?;
    let max = parse_score_bound(&args[2])?;
    let removed = ctx.shared.engine.zrem_range_by_score(&args[0], min, max)?;
    Ok(Reply::int(removed as i64))
}

pub fn zpopmin(ctx: &mut Ctx<'_>, args: &[Vec<u8>]) -> Result<Reply> {
    zpop(ctx, args, true, "zpopmin")
}

pub fn zpopmax(ctx: &mut Ctx<'_>, args: &[Vec<u8>]) -> Result<Reply> {
    zpop(ctx, args, false, "zpopmax")
}

fn zpop(ctx: &mut Ctx<'_>, args: &[Vec<u8>], min: bool, cmd: &str) -> Result<Reply> {
    expect_min_args(cmd, args, 1)?;
    let n = match args.len() {
        1 => 1usize,
        2 => {
            let n = parse_int(&args[1])?;
            if n < 0 {
                return Err(Error::Syntax("value is out of range, must be positive".into()));
            }
            n as usize
        }
        _ => return Err(Error::wrong_arity(cmd)),
    };
    let popped = if min {
        ctx.shared.engine.zpop_min(&args[0], n)?
    } else {
        ctx.shared.engine.zpop_max(&args[0], n)?
    };
    Ok(Reply::One(scored_members_frame(popped, true)))
}

//! Command handlers, grouped by family, plus the argument-parsing
//! helpers they share. Handlers take the dispatch context and the raw
//! argument vector (everything after the command name) and return a
//! [`Reply`].

pub mod hashes;
pub mod keys;
pub mod lists;
pub mod pubsub_cmds;
pub mod server_cmds;
pub mod sets;
pub mod strings;
pub mod zsets;

use crate::dispatch::Ctx;
use crate::resp::Frame;
use ember_core::{Error, Result};
use ember_store::ScoreBound;

/// What a handler produced: most commands reply with one frame,
/// subscription commands emit one frame per channel.
#[derive(Debug)]
pub enum Reply {
    One(Frame),
    Many(Vec<Frame>),
}

impl Reply {
    pub fn ok() -> Reply {
        Reply::One(Frame::ok())
    }

    pub fn int(n: i64) -> Reply {
        Reply::One(Frame::Integer(n))
    }

    pub fn frames(self) -> Vec<Frame> {
        match self {
            Reply::One(frame) => vec![frame],
            Reply::Many(frames) => frames,
        }
    }
}

pub type Handler = fn(&mut Ctx<'_>, &[Vec<u8>]) -> Result<Reply>;

// ----------------------------------------------------------------------
// Argument helpers
// ----------------------------------------------------------------------

/// Exact arity, counting only arguments (not the command name).
pub fn expect_args(cmd: &str, args: &[Vec<u8>], n: usize) -> Result<()> {
    if args.len() != n {
        return Err(Error::wrong_arity(cmd));
    }
    Ok(())
}

/// At least `n` arguments.
pub fn expect_min_args(cmd: &str, args: &[Vec<u8>], n: usize) -> Result<()> {
    if args.len() < n {
        return Err(Error::wrong_arity(cmd));
    }
    Ok(())
}

/// Argument as UTF-8 (for option keywords and numbers).
pub fn as_str(arg: &[u8]) -> Result<&str> {
    std::str::from_utf8(arg).map_err(|_| Error::Syntax("syntax error".to_string()))
}

pub fn parse_int(arg: &[u8]) -> Result<i64> {
    as_str(arg)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or(Error::NotInteger)
}

/// Float argument: plain decimal or `inf`/`+inf`/`-inf` (any case).
pub fn parse_float(arg: &[u8]) -> Result<f64> {
    let s = as_str(arg).map_err(|_| Error::NotFloat)?;
    let parsed = match s.to_ascii_lowercase().as_str() {
        "inf" | "+inf" | "infinity" | "+infinity" => f64::INFINITY,
        "-inf" | "-infinity" => f64::NEG_INFINITY,
        other => other.parse::<f64>().map_err(|_| Error::NotFloat)?,
    };
    if parsed.is_nan() {
        return Err(Error::NotFloat);
    }
    Ok(parsed)
}

/// Score interval endpoint: optional `(` prefix marks exclusivity.
pub fn parse_score_bound(arg: &[u8]) -> Result<ScoreBound> {
    let s = as_str(arg).map_err(|_| {
        Error::Syntax("min or max is not a float".to_string())
    })?;
    let (exclusive, body) = match s.strip_prefix('(') {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    let value = parse_float(body.as_bytes())
        .map_err(|_| Error::Syntax("min or max is not a float".to_string()))?;
    Ok(if exclusive {
        ScoreBound::exclusive(value)
    } else {
        ScoreBound::inclusive(value)
    })
}

/// Case-insensitive keyword match.
pub fn keyword_eq(arg: &[u8], keyword: &str) -> bool {
    arg.eq_ignore_ascii_case(keyword.as_bytes())
}

/// Flat `member, score, member, score …` array for WITHSCORES replies.
pub fn scored_members_frame(page: Vec<(Vec<u8>, f64)>, with_scores: bool) -> Frame {
    let mut items = Vec::with_capacity(page.len() * if with_scores { 2 } else { 1 });
    for (member, score) in page {
        items.push(Frame::Bulk(member));
        if with_scores {
            items.push(Frame::bulk(ember_store::format_f64(score)));
        }
    }
    Frame::Array(items)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_float_infinities() {
        assert_eq!(parse_float(b"inf").unwrap(), f64::INFINITY);
        assert_eq!(parse_float(b"-INF").unwrap(), f64::NEG_INFINITY);
        assert_eq!(parse_float(b"3.25").unwrap(), 3.25);
        assert!(parse_float(b"nan").is_err());
        assert!(parse_float(b"abc").is_err());
    }

    #[test]
    fn test_parse_score_bound() {
        let b = parse_score_bound(b"(5").unwrap();
        assert!(b.exclusive);
        assert_eq!(b.value, 5.0);
        let b = parse_score_bound(b"-inf").unwrap();
        assert!(!b.exclusive);
        assert_eq!(b.value, f64::NEG_INFINITY);
        assert!(parse_score_bound(b"(x").is_err());
    }

    #[test]
    fn test_expect_args() {
        assert!(expect_args("get", &[b"k".to_vec()], 1).is_ok());
        let err = expect_args("get", &[], 1).unwrap_err();
        assert!(err.reply_line().contains("wrong number of arguments"));
    }
}

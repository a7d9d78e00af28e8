//! Pub/sub command handlers. Subscription replies are one three-element
//! array per channel; the subscriber count covers channels plus patterns.

use super::{expect_args, expect_min_args, Reply};
use crate::dispatch::Ctx;
use crate::resp::Frame;
use ember_core::{Error, Result};

fn sub_count(ctx: &Ctx<'_>) -> i64 {
    (ctx.session.channels.len() + ctx.session.patterns.len()) as i64
}

fn ack(kind: &str, subject: Option<&[u8]>, count: i64) -> Frame {
    Frame::Array(vec![
        Frame::bulk(kind),
        match subject {
            Some(name) => Frame::bulk(name.to_vec()),
            None => Frame::NullBulk,
        },
        Frame::Integer(count),
    ])
}

pub fn subscribe(ctx: &mut Ctx<'_>, args: &[Vec<u8>]) -> Result<Reply> {
    expect_min_args("subscribe", args, 1)?;
    let mut replies = Vec::with_capacity(args.len());
    for channel in args {
        if !ctx.session.channels.contains(channel) {
            ctx.session.channels.push(channel.clone());
            ctx.shared.pubsub.subscribe(channel, ctx.client);
        }
        replies.push(ack("subscribe", Some(channel), sub_count(ctx)));
    }
    Ok(Reply::Many(replies))
}

pub fn unsubscribe(ctx: &mut Ctx<'_>, args: &[Vec<u8>]) -> Result<Reply> {
    // Bare UNSUBSCRIBE drops every channel.
    let targets: Vec<Vec<u8>> = if args.is_empty() {
        ctx.session.channels.clone()
    } else {
        args.to_vec()
    };
    if targets.is_empty() {
        return Ok(Reply::One(ack("unsubscribe", None, sub_count(ctx))));
    }
    let mut replies = Vec::with_capacity(targets.len());
    for channel in targets {
        ctx.session.channels.retain(|c| c != &channel);
        ctx.shared.pubsub.unsubscribe(&channel, ctx.client.id);
        replies.push(ack("unsubscribe", Some(&channel), sub_count(ctx)));
    }
    Ok(Reply::Many(replies))
}

pub fn psubscribe(ctx: &mut Ctx<'_>, args: &[Vec<u8>]) -> Result<Reply> {
    expect_min_args("psubscribe", args, 1)?;
    let mut replies = Vec::with_capacity(args.len());
    for pattern in args {
        if !ctx.session.patterns.contains(pattern) {
            ctx.session.patterns.push(pattern.clone());
            ctx.shared.pubsub.psubscribe(pattern, ctx.client);
        }
        replies.push(ack("psubscribe", Some(pattern), sub_count(ctx)));
    }
    Ok(Reply::Many(replies))
}

pub fn punsubscribe(ctx: &mut Ctx<'_>, args: &[Vec<u8>]) -> Result<Reply> {
    let targets: Vec<Vec<u8>> = if args.is_empty() {
        ctx.session.patterns.clone()
    } else {
        args.to_vec()
    };
    if targets.is_empty() {
        return Ok(Reply::One(ack("punsubscribe", None, sub_count(ctx))));
    }
    let mut replies = Vec::with_capacity(targets.len());
    for pattern in targets {
        ctx.session.patterns.retain(|p| p != &pattern);
        ctx.shared.pubsub.punsubscribe(&pattern, ctx.client.id);
        replies.push(ack("punsubscribe", Some(&pattern), sub_count(ctx)));
    }
    Ok(Reply::Many(replies))
}

pub fn publish(ctx: &mut Ctx<'_>, args: &[Vec<u8>]) -> Result<Reply> {
    expect_args("publish", args, 2)?;
    let delivered = ctx.shared.pubsub.publish(&args[0], &args[1]);
    Ok(Reply::int(delivered as i64))
}

pub fn pubsub(ctx: &mut Ctx<'_>, args: &[Vec<u8>]) -> Result<Reply> {
    expect_min_args("pubsub", args, 1)?;
    let sub = String::from_utf8_lossy(&args[0]).to_ascii_uppercase();
    match sub.as_str() {
        "CHANNELS" => {
            let pattern = match args.len() {
                1 => None,
                2 => Some(args[1].as_slice()),
                _ => return Err(Error::wrong_arity("pubsub")),
            };
            Ok(Reply::One(Frame::bulk_array(
                ctx.shared.pubsub.channels(pattern),
            )))
        }
        "NUMSUB" => {
            let counts = ctx.shared.pubsub.numsub(&args[1..]);
            let mut items = Vec::with_capacity(counts.len() * 2);
            for (channel, count) in counts {
                items.push(Frame::Bulk(channel));
                items.push(Frame::Integer(count as i64));
            }
            Ok(Reply::One(Frame::Array(items)))
        }
        "NUMPAT" => {
            expect_args("pubsub", &args[1..], 0)?;
            Ok(Reply::int(ctx.shared.pubsub.numpat() as i64))
        }
        _ => Err(Error::Syntax(format!(
            "unknown PUBSUB subcommand '{}'",
            sub.to_lowercase()
        ))),
    }
}

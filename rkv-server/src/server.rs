//! # TCP Server
//!
//! Accept RESP2 connections, parse commands, and dispatch them to a
//! `KVEngine` so the in-process store can stand in for a real server.

use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, warn};

use rkv_common::{RkvError, ScoredMember, TtlStatus};
use rkv_engine::KVEngine;

use crate::metrics::Metrics;
use crate::protocol::{Reply, RespError, RespParser};

/// Longest accepted expiry, in milliseconds (about 292 years).
const MAX_EXPIRE_MS: i64 = i64::MAX / 1_000_000;

/// Replies are either the success value or an error reply; both are sent.
type CmdResult = Result<Reply, Reply>;

impl From<RkvError> for Reply {
    fn from(err: RkvError) -> Self {
        match err {
            RkvError::Nil => Reply::Null,
            RkvError::WrongType => Reply::Error(err.to_string()),
            other => Reply::err(other),
        }
    }
}

/// Accepts connections until the listener fails or the task is dropped.
pub async fn serve(
    listener: TcpListener,
    engine: Arc<dyn KVEngine>,
    metrics: Arc<Metrics>,
) -> std::io::Result<()> {
    loop {
        let (stream, peer) = listener.accept().await?;
        metrics.record_connection();
        debug!(%peer, "accepted connection");

        let engine = Arc::clone(&engine);
        let metrics = Arc::clone(&metrics);
        tokio::spawn(async move {
            if let Err(err) = handle_connection(stream, engine, metrics).await {
                warn!(%peer, error = %err, "connection closed with error");
            }
        });
    }
}

/// Handles a single TCP client connection.
///
/// Every complete frame in the read buffer is answered before the next read,
/// so pipelined commands get their replies in one write.
pub async fn handle_connection(
    mut stream: TcpStream,
    engine: Arc<dyn KVEngine>,
    metrics: Arc<Metrics>,
) -> std::io::Result<()> {
    let mut buffer = BytesMut::with_capacity(8 * 1024);
    let mut out = BytesMut::with_capacity(8 * 1024);
    let mut parser = RespParser::new();

    loop {
        if stream.read_buf(&mut buffer).await? == 0 {
            break;
        }

        loop {
            match parser.parse(&mut buffer) {
                Ok(Some(args)) if args.is_empty() => {}
                Ok(Some(args)) => {
                    let started = Instant::now();
                    metrics.record_request_start();
                    let reply = execute(&args, engine.as_ref(), &metrics);
                    if reply.is_error() {
                        metrics.record_error();
                    }
                    metrics.record_request_end(started.elapsed());
                    reply.encode(&mut out);
                }
                Ok(None) => break,
                Err(RespError::Protocol(reason)) => {
                    metrics.record_error();
                    Reply::err(format!("Protocol error: {}", reason)).encode(&mut out);
                    stream.write_all(&out).await?;
                    return Ok(());
                }
            }
        }

        if !out.is_empty() {
            stream.write_all(&out).await?;
            out.clear();
        }
    }

    Ok(())
}

/// Runs one command and returns its reply.
///
/// Keys and values are text; a non-UTF-8 argument is refused with an error
/// reply rather than stored lossily.
pub fn execute(args: &[Vec<u8>], engine: &dyn KVEngine, metrics: &Metrics) -> Reply {
    let args = match args
        .iter()
        .map(|arg| String::from_utf8(arg.clone()))
        .collect::<Result<Vec<String>, _>>()
    {
        Ok(args) => args,
        Err(_) => return Reply::err("invalid UTF-8 in command argument"),
    };
    match dispatch_command(&args, engine, metrics) {
        Ok(reply) | Err(reply) => reply,
    }
}

fn dispatch_command(args: &[String], engine: &dyn KVEngine, metrics: &Metrics) -> CmdResult {
    let (name, rest) = args.split_first().ok_or_else(|| Reply::err("empty command"))?;
    let name = name.to_ascii_uppercase();
    let rest: Vec<&str> = rest.iter().map(String::as_str).collect();
    let rest = rest.as_slice();

    match name.as_str() {
        "PING" => handle_ping(rest, engine),
        "AUTH" => {
            at_least(&name, rest, 1)?;
            Ok(Reply::ok())
        }
        "INFO" => Ok(handle_info(engine, metrics)),

        "GET" => {
            exact(&name, rest, 1)?;
            Ok(Reply::bulk(engine.get(rest[0])?))
        }
        "SET" => handle_set(rest, engine),
        "SETNX" => {
            exact(&name, rest, 2)?;
            let written = engine.set_nx(rest[0], rest[1], Duration::ZERO)?;
            Ok(Reply::Integer(written as i64))
        }
        "DEL" => {
            at_least(&name, rest, 1)?;
            Ok(Reply::Integer(engine.del(rest)?))
        }
        "EXISTS" => {
            at_least(&name, rest, 1)?;
            Ok(Reply::Integer(engine.exists(rest)?))
        }
        "EXPIRE" => {
            exact(&name, rest, 2)?;
            let ttl = expire_arg("expire", int_arg(rest[1])?, 1_000)?;
            Ok(Reply::Integer(engine.expire(rest[0], ttl)? as i64))
        }
        "PEXPIRE" => {
            exact(&name, rest, 2)?;
            let ttl = expire_arg("pexpire", int_arg(rest[1])?, 1)?;
            Ok(Reply::Integer(engine.expire(rest[0], ttl)? as i64))
        }
        "TTL" => {
            exact(&name, rest, 1)?;
            Ok(Reply::Integer(engine.ttl(rest[0])?.as_secs()))
        }
        "PTTL" => {
            exact(&name, rest, 1)?;
            let millis = match engine.ttl(rest[0])? {
                TtlStatus::ExpiresIn(remaining) => remaining.as_millis() as i64,
                other => other.as_secs(),
            };
            Ok(Reply::Integer(millis))
        }

        "HGET" => {
            exact(&name, rest, 2)?;
            Ok(Reply::bulk(engine.hget(rest[0], rest[1])?))
        }
        "HSET" => {
            at_least(&name, rest, 3)?;
            Ok(Reply::Integer(engine.hset(rest[0], &rest[1..])?))
        }
        "HDEL" => {
            at_least(&name, rest, 2)?;
            Ok(Reply::Integer(engine.hdel(rest[0], &rest[1..])?))
        }
        "HEXISTS" => {
            exact(&name, rest, 2)?;
            Ok(Reply::Integer(engine.hexists(rest[0], rest[1])? as i64))
        }
        "HGETALL" => {
            exact(&name, rest, 1)?;
            let mut pairs: Vec<(String, String)> = engine.hgetall(rest[0])?.into_iter().collect();
            pairs.sort();
            Ok(Reply::strings(
                pairs.into_iter().flat_map(|(field, value)| [field, value]),
            ))
        }
        "HKEYS" => {
            exact(&name, rest, 1)?;
            Ok(Reply::strings(engine.hkeys(rest[0])?))
        }
        "HVALS" => {
            exact(&name, rest, 1)?;
            Ok(Reply::strings(engine.hvals(rest[0])?))
        }

        // Network clients push each value to the head in turn; the engine
        // keeps its block in the given order, so hand it over reversed.
        "LPUSH" => {
            at_least(&name, rest, 2)?;
            let reversed: Vec<&str> = rest[1..].iter().rev().copied().collect();
            Ok(Reply::Integer(engine.lpush(rest[0], &reversed)?))
        }
        "RPUSH" => {
            at_least(&name, rest, 2)?;
            Ok(Reply::Integer(engine.rpush(rest[0], &rest[1..])?))
        }
        "LPOP" => {
            exact(&name, rest, 1)?;
            Ok(Reply::bulk(engine.lpop(rest[0])?))
        }
        "RPOP" => {
            exact(&name, rest, 1)?;
            Ok(Reply::bulk(engine.rpop(rest[0])?))
        }
        "LLEN" => {
            exact(&name, rest, 1)?;
            Ok(Reply::Integer(engine.llen(rest[0])?))
        }
        "LRANGE" => {
            exact(&name, rest, 3)?;
            let (start, stop) = (int_arg(rest[1])?, int_arg(rest[2])?);
            Ok(Reply::strings(engine.lrange(rest[0], start, stop)?))
        }

        "SADD" => {
            at_least(&name, rest, 2)?;
            Ok(Reply::Integer(engine.sadd(rest[0], &rest[1..])?))
        }
        "SREM" => {
            at_least(&name, rest, 2)?;
            Ok(Reply::Integer(engine.srem(rest[0], &rest[1..])?))
        }
        "SMEMBERS" => {
            exact(&name, rest, 1)?;
            let mut members = engine.smembers(rest[0])?;
            members.sort();
            Ok(Reply::strings(members))
        }
        "SISMEMBER" => {
            exact(&name, rest, 2)?;
            Ok(Reply::Integer(engine.sismember(rest[0], rest[1])? as i64))
        }
        "SCARD" => {
            exact(&name, rest, 1)?;
            Ok(Reply::Integer(engine.scard(rest[0])?))
        }

        "ZADD" => handle_zadd(rest, engine),
        "ZREM" => {
            at_least(&name, rest, 2)?;
            Ok(Reply::Integer(engine.zrem(rest[0], &rest[1..])?))
        }
        "ZRANGE" => handle_zrange(rest, engine),
        "ZCARD" => {
            exact(&name, rest, 1)?;
            Ok(Reply::Integer(engine.zcard(rest[0])?))
        }
        "ZSCORE" => {
            exact(&name, rest, 2)?;
            Ok(Reply::bulk(format_score(engine.zscore(rest[0], rest[1])?)))
        }

        "KEYS" => {
            exact(&name, rest, 1)?;
            Ok(Reply::strings(engine.keys(rest[0])?))
        }
        "TYPE" => {
            exact(&name, rest, 1)?;
            Ok(Reply::Simple(engine.key_type(rest[0])?))
        }
        "FLUSHDB" => {
            engine.flush_db()?;
            Ok(Reply::ok())
        }
        "FLUSHALL" => {
            engine.flush_all()?;
            Ok(Reply::ok())
        }
        "SELECT" => {
            exact(&name, rest, 1)?;
            engine.select(int_arg(rest[0])?)?;
            Ok(Reply::ok())
        }
        "DBSIZE" => Ok(Reply::Integer(engine.db_size()?)),

        _ => Err(Reply::err(format!("unknown command '{}'", name.to_ascii_lowercase()))),
    }
}

fn handle_ping(rest: &[&str], engine: &dyn KVEngine) -> CmdResult {
    match rest {
        [] => Ok(Reply::Simple(engine.ping()?)),
        [message] => {
            engine.ping()?;
            Ok(Reply::bulk(*message))
        }
        _ => Err(wrong_arity("PING")),
    }
}

/// `SET key value [EX seconds | PX milliseconds] [NX]`
fn handle_set(rest: &[&str], engine: &dyn KVEngine) -> CmdResult {
    at_least("SET", rest, 2)?;
    let (key, value) = (rest[0], rest[1]);
    let mut ttl = Duration::ZERO;
    let mut only_if_absent = false;

    let mut options = rest[2..].iter();
    while let Some(option) = options.next() {
        match option.to_ascii_uppercase().as_str() {
            "NX" => only_if_absent = true,
            unit @ ("EX" | "PX") => {
                let amount = options.next().ok_or_else(|| Reply::err("syntax error"))?;
                let amount = int_arg(amount)?;
                if amount <= 0 {
                    return Err(Reply::err("invalid expire time in 'set' command"));
                }
                let scale = if unit == "EX" { 1_000 } else { 1 };
                ttl = expire_arg("set", amount, scale)?;
            }
            _ => return Err(Reply::err("syntax error")),
        }
    }

    if only_if_absent {
        return Ok(if engine.set_nx(key, value, ttl)? {
            Reply::ok()
        } else {
            Reply::Null
        });
    }
    engine.set(key, value, ttl)?;
    Ok(Reply::ok())
}

/// `ZADD key score member [score member ...]`
fn handle_zadd(rest: &[&str], engine: &dyn KVEngine) -> CmdResult {
    if rest.len() < 3 || (rest.len() - 1) % 2 != 0 {
        return Err(wrong_arity("ZADD"));
    }
    let members = rest[1..]
        .chunks_exact(2)
        .map(|pair| Ok(ScoredMember::new(pair[1], float_arg(pair[0])?)))
        .collect::<Result<Vec<_>, Reply>>()?;
    Ok(Reply::Integer(engine.zadd(rest[0], &members)?))
}

/// `ZRANGE key start stop [WITHSCORES]`
fn handle_zrange(rest: &[&str], engine: &dyn KVEngine) -> CmdResult {
    let with_scores = match rest {
        [_, _, _] => false,
        [_, _, _, flag] if flag.eq_ignore_ascii_case("WITHSCORES") => true,
        [_, _, _, _] => return Err(Reply::err("syntax error")),
        _ => return Err(wrong_arity("ZRANGE")),
    };
    let (start, stop) = (int_arg(rest[1])?, int_arg(rest[2])?);

    if with_scores {
        let scored = engine.zrange_with_scores(rest[0], start, stop)?;
        Ok(Reply::strings(scored.into_iter().flat_map(|entry| {
            [entry.member, format_score(entry.score)]
        })))
    } else {
        Ok(Reply::strings(engine.zrange(rest[0], start, stop)?))
    }
}

fn handle_info(engine: &dyn KVEngine, metrics: &Metrics) -> Reply {
    let mut info = format!(
        "# Server\r\nrkv_version:{}\r\n\r\n",
        env!("CARGO_PKG_VERSION")
    );
    info.push_str(&metrics.render_info());
    if let Ok(keys) = engine.db_size() {
        info.push_str(&format!("\r\n# Keyspace\r\ndb0:keys={}\r\n", keys));
    }
    Reply::bulk(info)
}

fn wrong_arity(name: &str) -> Reply {
    Reply::err(format!(
        "wrong number of arguments for '{}' command",
        name.to_ascii_lowercase()
    ))
}

fn exact(name: &str, rest: &[&str], count: usize) -> Result<(), Reply> {
    if rest.len() != count {
        return Err(wrong_arity(name));
    }
    Ok(())
}

fn at_least(name: &str, rest: &[&str], count: usize) -> Result<(), Reply> {
    if rest.len() < count {
        return Err(wrong_arity(name));
    }
    Ok(())
}

fn int_arg(arg: &str) -> Result<i64, Reply> {
    arg.parse()
        .map_err(|_| Reply::err("value is not an integer or out of range"))
}

/// Converts `amount` (in units of `scale` milliseconds) into a TTL.
///
/// Non-positive amounts become zero, which expire treats as "delete now".
/// Amounts past `MAX_EXPIRE_MS` are refused.
fn expire_arg(command: &str, amount: i64, scale: i64) -> Result<Duration, Reply> {
    let millis = amount.max(0).checked_mul(scale).filter(|ms| *ms <= MAX_EXPIRE_MS);
    match millis {
        Some(ms) => Ok(Duration::from_millis(ms as u64)),
        None => Err(Reply::err(format!(
            "invalid expire time in '{}' command",
            command
        ))),
    }
}

fn float_arg(arg: &str) -> Result<f64, Reply> {
    match arg.parse::<f64>() {
        Ok(value) if !value.is_nan() => Ok(value),
        _ => Err(Reply::err("value is not a valid float")),
    }
}

fn format_score(score: f64) -> String {
    if score.is_infinite() {
        return if score > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    score.to_string()
}

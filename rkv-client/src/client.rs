//! # Blocking Network Client
//!
//! Purpose: Issue the `KVEngine` command set to a real Redis-compatible
//! server over RESP2, so a connection can be switched between a live server
//! and the in-process store without callers noticing.
//!
//! ## Design Principles
//! 1. **Facade Pattern**: `KVClient` hides pooling and protocol details.
//! 2. **One Taxonomy**: Transport errors are folded into `RkvError` at the
//!    trait boundary, with `-WRONGTYPE` and null replies mapped to their
//!    store equivalents.
//! 3. **Same Contract**: Argument checks run before any bytes are sent, so
//!    both backends reject bad input the same way.

use std::collections::HashMap;
use std::time::Duration;

use thiserror::Error;
use tracing::debug;

use rkv_common::{check_db_index, RkvError, RkvResult, ScoredMember, TtlStatus};
use rkv_engine::KVEngine;

use crate::pool::{ConnectionPool, PoolConfig};
use crate::resp::RespValue;

/// Result type for client transport calls.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors surfaced by the network client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Network or IO failure while reading/writing.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// RESP2 framing or parse error.
    #[error("protocol error")]
    Protocol,
    /// Server returned an error reply.
    #[error("server error: {0}")]
    Server(String),
    /// Null reply where a value was expected.
    #[error("nil reply")]
    Nil,
    /// Reply type did not match the command.
    #[error("unexpected response")]
    UnexpectedResponse,
    /// Pool is at capacity and no idle connections are available.
    #[error("connection pool exhausted")]
    PoolExhausted,
    /// Address could not be resolved into a socket address.
    #[error("invalid address")]
    InvalidAddress,
    /// The client has been closed.
    #[error("client closed")]
    Closed,
}

impl From<ClientError> for RkvError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::Io(err) => RkvError::Io(err.to_string()),
            ClientError::Protocol | ClientError::UnexpectedResponse => RkvError::Protocol,
            ClientError::Server(message) if message.starts_with("WRONGTYPE") => RkvError::WrongType,
            ClientError::Server(message) => RkvError::Server(message),
            ClientError::Nil => RkvError::Nil,
            ClientError::PoolExhausted => RkvError::PoolExhausted,
            ClientError::InvalidAddress => RkvError::InvalidAddress,
            ClientError::Closed => RkvError::Closed,
        }
    }
}

/// Configuration for the client and its pool.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server address, e.g. "127.0.0.1:6379".
    pub addr: String,
    /// Sent with `AUTH` on every new connection when set.
    pub password: Option<String>,
    /// Database selected on every new connection.
    pub db: u8,
    /// Maximum idle connections kept in the pool.
    pub max_idle: usize,
    /// Maximum total connections (idle + in-use).
    pub max_total: usize,
    pub read_timeout: Option<Duration>,
    pub write_timeout: Option<Duration>,
    pub connect_timeout: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            addr: "127.0.0.1:6379".to_string(),
            password: None,
            db: 0,
            max_idle: 8,
            max_total: 16,
            read_timeout: None,
            write_timeout: None,
            connect_timeout: None,
        }
    }
}

/// Blocking client with connection pooling.
///
/// Each call acquires a connection, executes one command, and returns the
/// connection to the pool.
pub struct KVClient {
    pool: ConnectionPool,
    addr: String,
}

impl KVClient {
    /// Creates a client with default configuration.
    pub fn connect(addr: impl Into<String>) -> Self {
        Self::with_config(ClientConfig {
            addr: addr.into(),
            ..ClientConfig::default()
        })
    }

    /// Creates a client with a custom configuration.
    ///
    /// No connection is opened until the first command.
    pub fn with_config(config: ClientConfig) -> Self {
        let addr = config.addr.clone();
        let pool = ConnectionPool::new(PoolConfig {
            addr: config.addr,
            password: config.password,
            db: config.db,
            max_idle: config.max_idle,
            max_total: config.max_total,
            read_timeout: config.read_timeout,
            write_timeout: config.write_timeout,
            connect_timeout: config.connect_timeout,
        });
        KVClient { pool, addr }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Database index applied to pooled connections.
    pub fn selected_db(&self) -> u8 {
        self.pool.target_db()
    }

    /// Idle and total pooled connection counts.
    pub fn pool_stats(&self) -> (usize, usize) {
        self.pool.stats()
    }

    /// Fetches server `INFO` output.
    pub fn info(&self) -> RkvResult<String> {
        Ok(self.call(&["INFO"])?.into_string()?)
    }

    /// Executes one command on a pooled connection.
    fn call(&self, args: &[&str]) -> ClientResult<RespValue> {
        let mut conn = self.pool.acquire()?;
        let args: Vec<&[u8]> = args.iter().map(|arg| arg.as_bytes()).collect();
        conn.exec(&args)
    }

    /// Builds `[command, key, rest...]` and executes it.
    fn call_key(&self, command: &str, key: &str, rest: &[&str]) -> ClientResult<RespValue> {
        let mut args = Vec::with_capacity(rest.len() + 2);
        args.push(command);
        args.push(key);
        args.extend_from_slice(rest);
        self.call(&args)
    }
}

fn require_args(command: &str, args: &[&str]) -> RkvResult<()> {
    if args.is_empty() {
        return Err(RkvError::InvalidArgument(format!(
            "wrong number of arguments for {}",
            command
        )));
    }
    Ok(())
}

/// Renders a TTL as whole milliseconds for `PX` / `PEXPIRE`.
fn millis(ttl: Duration) -> String {
    ttl.as_millis().to_string()
}

impl KVEngine for KVClient {
    fn ping(&self) -> RkvResult<String> {
        Ok(self.call(&["PING"])?.into_status()?)
    }

    fn close(&self) -> RkvResult<()> {
        if !self.pool.is_closed() {
            self.pool.close();
            debug!(addr = %self.addr, "client closed");
        }
        Ok(())
    }

    fn get(&self, key: &str) -> RkvResult<String> {
        Ok(self.call(&["GET", key])?.into_string()?)
    }

    fn set(&self, key: &str, value: &str, ttl: Duration) -> RkvResult<()> {
        let reply = if ttl.is_zero() {
            self.call(&["SET", key, value])?
        } else {
            self.call(&["SET", key, value, "PX", &millis(ttl)])?
        };
        reply.into_status()?;
        Ok(())
    }

    fn set_nx(&self, key: &str, value: &str, ttl: Duration) -> RkvResult<bool> {
        let reply = if ttl.is_zero() {
            self.call(&["SET", key, value, "NX"])?
        } else {
            self.call(&["SET", key, value, "PX", &millis(ttl), "NX"])?
        };
        match reply.check()? {
            RespValue::Simple(_) => Ok(true),
            RespValue::Bulk(None) => Ok(false),
            _ => Err(RkvError::Protocol),
        }
    }

    fn del(&self, keys: &[&str]) -> RkvResult<i64> {
        require_args("DEL", keys)?;
        let mut args = vec!["DEL"];
        args.extend_from_slice(keys);
        Ok(self.call(&args)?.into_integer()?)
    }

    fn exists(&self, keys: &[&str]) -> RkvResult<i64> {
        require_args("EXISTS", keys)?;
        let mut args = vec!["EXISTS"];
        args.extend_from_slice(keys);
        Ok(self.call(&args)?.into_integer()?)
    }

    fn expire(&self, key: &str, ttl: Duration) -> RkvResult<bool> {
        Ok(self.call(&["PEXPIRE", key, &millis(ttl)])?.into_bool()?)
    }

    fn ttl(&self, key: &str) -> RkvResult<TtlStatus> {
        let millis = self.call(&["PTTL", key])?.into_integer()?;
        Ok(TtlStatus::from_millis(millis))
    }

    fn hget(&self, key: &str, field: &str) -> RkvResult<String> {
        Ok(self.call(&["HGET", key, field])?.into_string()?)
    }

    fn hset(&self, key: &str, field_values: &[&str]) -> RkvResult<i64> {
        if field_values.is_empty() || field_values.len() % 2 != 0 {
            return Err(RkvError::InvalidArgument(
                "wrong number of arguments for HSET".to_string(),
            ));
        }
        Ok(self.call_key("HSET", key, field_values)?.into_integer()?)
    }

    fn hdel(&self, key: &str, fields: &[&str]) -> RkvResult<i64> {
        require_args("HDEL", fields)?;
        Ok(self.call_key("HDEL", key, fields)?.into_integer()?)
    }

    fn hexists(&self, key: &str, field: &str) -> RkvResult<bool> {
        Ok(self.call(&["HEXISTS", key, field])?.into_bool()?)
    }

    fn hgetall(&self, key: &str) -> RkvResult<HashMap<String, String>> {
        Ok(self.call(&["HGETALL", key])?.into_map()?)
    }

    fn hkeys(&self, key: &str) -> RkvResult<Vec<String>> {
        Ok(self.call(&["HKEYS", key])?.into_strings()?)
    }

    fn hvals(&self, key: &str) -> RkvResult<Vec<String>> {
        Ok(self.call(&["HVALS", key])?.into_strings()?)
    }

    /// Values go out reversed: the server pushes each one to the head in
    /// turn, which restores the caller's order at the head of the list.
    fn lpush(&self, key: &str, values: &[&str]) -> RkvResult<i64> {
        require_args("LPUSH", values)?;
        let reversed: Vec<&str> = values.iter().rev().copied().collect();
        Ok(self.call_key("LPUSH", key, &reversed)?.into_integer()?)
    }

    fn rpush(&self, key: &str, values: &[&str]) -> RkvResult<i64> {
        require_args("RPUSH", values)?;
        Ok(self.call_key("RPUSH", key, values)?.into_integer()?)
    }

    fn lpop(&self, key: &str) -> RkvResult<String> {
        Ok(self.call(&["LPOP", key])?.into_string()?)
    }

    fn rpop(&self, key: &str) -> RkvResult<String> {
        Ok(self.call(&["RPOP", key])?.into_string()?)
    }

    fn llen(&self, key: &str) -> RkvResult<i64> {
        Ok(self.call(&["LLEN", key])?.into_integer()?)
    }

    fn lrange(&self, key: &str, start: i64, stop: i64) -> RkvResult<Vec<String>> {
        let (start, stop) = (start.to_string(), stop.to_string());
        Ok(self.call(&["LRANGE", key, &start, &stop])?.into_strings()?)
    }

    fn sadd(&self, key: &str, members: &[&str]) -> RkvResult<i64> {
        require_args("SADD", members)?;
        Ok(self.call_key("SADD", key, members)?.into_integer()?)
    }

    fn srem(&self, key: &str, members: &[&str]) -> RkvResult<i64> {
        require_args("SREM", members)?;
        Ok(self.call_key("SREM", key, members)?.into_integer()?)
    }

    fn smembers(&self, key: &str) -> RkvResult<Vec<String>> {
        Ok(self.call(&["SMEMBERS", key])?.into_strings()?)
    }

    fn sismember(&self, key: &str, member: &str) -> RkvResult<bool> {
        Ok(self.call(&["SISMEMBER", key, member])?.into_bool()?)
    }

    fn scard(&self, key: &str) -> RkvResult<i64> {
        Ok(self.call(&["SCARD", key])?.into_integer()?)
    }

    fn zadd(&self, key: &str, members: &[ScoredMember]) -> RkvResult<i64> {
        if members.is_empty() {
            return Err(RkvError::InvalidArgument(
                "wrong number of arguments for ZADD".to_string(),
            ));
        }
        if members.iter().any(|member| member.score.is_nan()) {
            return Err(RkvError::InvalidArgument("score is not a number".to_string()));
        }
        let scores: Vec<String> = members.iter().map(|member| member.score.to_string()).collect();
        let mut args = Vec::with_capacity(members.len() * 2);
        for (member, score) in members.iter().zip(&scores) {
            args.push(score.as_str());
            args.push(member.member.as_str());
        }
        Ok(self.call_key("ZADD", key, &args)?.into_integer()?)
    }

    fn zrem(&self, key: &str, members: &[&str]) -> RkvResult<i64> {
        require_args("ZREM", members)?;
        Ok(self.call_key("ZREM", key, members)?.into_integer()?)
    }

    fn zrange(&self, key: &str, start: i64, stop: i64) -> RkvResult<Vec<String>> {
        let (start, stop) = (start.to_string(), stop.to_string());
        Ok(self.call(&["ZRANGE", key, &start, &stop])?.into_strings()?)
    }

    fn zrange_with_scores(
        &self,
        key: &str,
        start: i64,
        stop: i64,
    ) -> RkvResult<Vec<ScoredMember>> {
        let (start, stop) = (start.to_string(), stop.to_string());
        Ok(self
            .call(&["ZRANGE", key, &start, &stop, "WITHSCORES"])?
            .into_scored()?)
    }

    fn zcard(&self, key: &str) -> RkvResult<i64> {
        Ok(self.call(&["ZCARD", key])?.into_integer()?)
    }

    fn zscore(&self, key: &str, member: &str) -> RkvResult<f64> {
        Ok(self.call(&["ZSCORE", key, member])?.into_float()?)
    }

    fn keys(&self, pattern: &str) -> RkvResult<Vec<String>> {
        Ok(self.call(&["KEYS", pattern])?.into_strings()?)
    }

    fn key_type(&self, key: &str) -> RkvResult<String> {
        Ok(self.call(&["TYPE", key])?.into_status()?)
    }

    fn flush_db(&self) -> RkvResult<()> {
        self.call(&["FLUSHDB"])?.into_status()?;
        Ok(())
    }

    fn flush_all(&self) -> RkvResult<()> {
        self.call(&["FLUSHALL"])?.into_status()?;
        Ok(())
    }

    /// Switches one connection now and records the index so the rest of the
    /// pool follows on their next checkout.
    fn select(&self, index: i64) -> RkvResult<()> {
        let db = check_db_index(index)?;
        let mut conn = self.pool.acquire()?;
        conn.sync_db(db)?;
        self.pool.set_target_db(db);
        Ok(())
    }

    fn db_size(&self) -> RkvResult<i64> {
        Ok(self.call(&["DBSIZE"])?.into_integer()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_map_to_store_errors() {
        let wrong = ClientError::Server("WRONGTYPE Operation against a key".into());
        assert_eq!(RkvError::from(wrong), RkvError::WrongType);
        let other = ClientError::Server("ERR unknown command".into());
        assert_eq!(
            RkvError::from(other),
            RkvError::Server("ERR unknown command".into())
        );
        assert_eq!(RkvError::from(ClientError::Nil), RkvError::Nil);
        assert_eq!(RkvError::from(ClientError::Closed), RkvError::Closed);
    }

    #[test]
    fn io_errors_keep_their_message() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        assert_eq!(
            RkvError::from(ClientError::from(io)),
            RkvError::Io("refused".into())
        );
    }

    #[test]
    fn invalid_arguments_fail_before_connecting() {
        // Nothing listens on port 1; a connect attempt would surface as Io.
        let client = KVClient::connect("127.0.0.1:1");
        assert!(matches!(
            client.hset("h", &["f"]),
            Err(RkvError::InvalidArgument(_))
        ));
        assert!(matches!(
            client.zadd("z", &[ScoredMember::new("m", f64::NAN)]),
            Err(RkvError::InvalidArgument(_))
        ));
        assert!(matches!(client.select(16), Err(RkvError::InvalidArgument(_))));
        assert!(matches!(client.lpush("l", &[]), Err(RkvError::InvalidArgument(_))));
    }

    #[test]
    fn closed_client_rejects_commands() {
        let client = KVClient::connect("127.0.0.1:1");
        client.close().unwrap();
        assert_eq!(client.ping(), Err(RkvError::Closed));
        client.close().unwrap();
    }
}

//! # Connection Pool
//!
//! Purpose: Reuse TCP connections for the blocking client and keep every
//! pooled connection authenticated and on the selected database.
//!
//! ## Design Principles
//! 1. **Object Pool Pattern**: Keep a bounded set of reusable connections.
//! 2. **Minimal Locking**: Hold the mutex only while moving idle connections.
//! 3. **Fail Fast**: Exceeding the pool limit returns an error immediately.
//! 4. **Session Replay**: `AUTH` and `SELECT` run on each fresh connection, and
//!    a connection whose database lags the pool's target is switched on
//!    checkout.

use std::collections::VecDeque;
use std::io::{BufReader, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::debug;

use crate::client::{ClientError, ClientResult};
use crate::resp::{encode_command, read_response, RespValue};

/// Pool configuration for the blocking client.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Server address, e.g. "127.0.0.1:6379".
    pub addr: String,
    /// Sent with `AUTH` when a connection is opened.
    pub password: Option<String>,
    /// Database selected when a connection is opened.
    pub db: u8,
    /// Maximum number of idle connections to keep.
    pub max_idle: usize,
    /// Maximum total connections (idle + in-use).
    pub max_total: usize,
    pub read_timeout: Option<Duration>,
    pub write_timeout: Option<Duration>,
    pub connect_timeout: Option<Duration>,
}

struct PoolState {
    idle: VecDeque<Connection>,
    total: usize,
}

struct PoolInner {
    config: PoolConfig,
    state: Mutex<PoolState>,
    /// Database every checked-out connection must be on.
    target_db: AtomicU8,
    closed: AtomicBool,
}

/// Connection pool handle.
#[derive(Clone)]
pub struct ConnectionPool {
    inner: Arc<PoolInner>,
}

impl ConnectionPool {
    pub fn new(config: PoolConfig) -> Self {
        let state = PoolState {
            idle: VecDeque::with_capacity(config.max_idle),
            total: 0,
        };
        ConnectionPool {
            inner: Arc::new(PoolInner {
                target_db: AtomicU8::new(config.db),
                config,
                state: Mutex::new(state),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Acquires a connection on the target database.
    pub fn acquire(&self) -> ClientResult<PooledConnection> {
        if self.is_closed() {
            return Err(ClientError::Closed);
        }

        let conn = match self.pop_idle() {
            Some(conn) => conn,
            None => {
                if !self.try_reserve() {
                    return Err(ClientError::PoolExhausted);
                }
                match Connection::connect(&self.inner.config) {
                    Ok(conn) => conn,
                    Err(err) => {
                        self.release_slot();
                        return Err(err);
                    }
                }
            }
        };

        let mut pooled = PooledConnection::new(self.inner.clone(), conn);
        pooled.sync_db(self.target_db())?;
        Ok(pooled)
    }

    /// Records the database future checkouts must use.
    pub fn set_target_db(&self, db: u8) {
        self.inner.target_db.store(db, Ordering::SeqCst);
    }

    pub fn target_db(&self) -> u8 {
        self.inner.target_db.load(Ordering::SeqCst)
    }

    /// Drops idle connections and rejects later checkouts.
    ///
    /// Connections currently checked out are dropped when returned.
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        let mut state = self.inner.state.lock();
        let dropped = state.idle.len();
        state.idle.clear();
        state.total = state.total.saturating_sub(dropped);
        debug!(dropped, "connection pool closed");
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Idle and total connection counts.
    pub fn stats(&self) -> (usize, usize) {
        let state = self.inner.state.lock();
        (state.idle.len(), state.total)
    }

    fn pop_idle(&self) -> Option<Connection> {
        self.inner.state.lock().idle.pop_front()
    }

    fn try_reserve(&self) -> bool {
        let mut state = self.inner.state.lock();
        if state.total >= self.inner.config.max_total {
            return false;
        }
        state.total += 1;
        true
    }

    fn release_slot(&self) {
        let mut state = self.inner.state.lock();
        state.total = state.total.saturating_sub(1);
    }

    fn return_connection(&self, conn: Connection) {
        let mut state = self.inner.state.lock();
        if !self.is_closed() && state.idle.len() < self.inner.config.max_idle {
            state.idle.push_back(conn);
        } else {
            state.total = state.total.saturating_sub(1);
        }
    }
}

/// RAII wrapper returning a connection to the pool on drop.
pub struct PooledConnection {
    pool: Arc<PoolInner>,
    conn: Option<Connection>,
    valid: bool,
}

impl PooledConnection {
    fn new(pool: Arc<PoolInner>, conn: Connection) -> Self {
        PooledConnection {
            pool,
            conn: Some(conn),
            valid: true,
        }
    }

    /// Executes a RESP command and returns the raw reply.
    ///
    /// IO and framing failures poison the connection so it is not reused.
    pub fn exec(&mut self, args: &[&[u8]]) -> ClientResult<RespValue> {
        let conn = self.conn.as_mut().ok_or(ClientError::Closed)?;
        let response = conn.exec(args);
        if matches!(response, Err(ClientError::Io(_)) | Err(ClientError::Protocol)) {
            self.valid = false;
        }
        response
    }

    /// Issues `SELECT` when this connection is not on `db`.
    pub fn sync_db(&mut self, db: u8) -> ClientResult<()> {
        let current = self.conn.as_ref().map(|conn| conn.db);
        if current == Some(db) {
            return Ok(());
        }
        let index = db.to_string();
        self.exec(&[b"SELECT", index.as_bytes()])?.into_status()?;
        if let Some(conn) = self.conn.as_mut() {
            conn.db = db;
        }
        Ok(())
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        let conn = match self.conn.take() {
            Some(conn) => conn,
            None => return,
        };

        let pool = ConnectionPool {
            inner: self.pool.clone(),
        };

        if self.valid {
            pool.return_connection(conn);
        } else {
            pool.release_slot();
        }
    }
}

/// Single TCP connection with reusable buffers and its selected database.
struct Connection {
    reader: BufReader<TcpStream>,
    line_buf: Vec<u8>,
    write_buf: Vec<u8>,
    db: u8,
}

impl Connection {
    fn connect(config: &PoolConfig) -> ClientResult<Self> {
        let stream = connect_stream(config)?;
        stream.set_read_timeout(config.read_timeout)?;
        stream.set_write_timeout(config.write_timeout)?;
        stream.set_nodelay(true)?;

        let mut conn = Connection {
            reader: BufReader::new(stream),
            line_buf: Vec::with_capacity(128),
            write_buf: Vec::with_capacity(256),
            db: 0,
        };

        if let Some(password) = config.password.as_deref().filter(|p| !p.is_empty()) {
            conn.exec(&[b"AUTH", password.as_bytes()])?.into_status()?;
        }
        if config.db > 0 {
            let index = config.db.to_string();
            conn.exec(&[b"SELECT", index.as_bytes()])?.into_status()?;
            conn.db = config.db;
        }
        debug!(addr = %config.addr, db = conn.db, "opened connection");
        Ok(conn)
    }

    fn exec(&mut self, args: &[&[u8]]) -> ClientResult<RespValue> {
        self.write_buf.clear();
        encode_command(args, &mut self.write_buf);

        let stream = self.reader.get_mut();
        stream.write_all(&self.write_buf)?;
        stream.flush()?;

        read_response(&mut self.reader, &mut self.line_buf)
    }
}

fn connect_stream(config: &PoolConfig) -> ClientResult<TcpStream> {
    let addr: SocketAddr = config
        .addr
        .to_socket_addrs()
        .map_err(|_| ClientError::InvalidAddress)?
        .next()
        .ok_or(ClientError::InvalidAddress)?;
    let stream = match config.connect_timeout {
        Some(timeout) => TcpStream::connect_timeout(&addr, timeout)?,
        None => TcpStream::connect(addr)?,
    };
    Ok(stream)
}

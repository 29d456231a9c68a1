//! # Connection Registry
//!
//! Purpose: Map caller-chosen connection ids to adapters, bound the number of
//! live connections, and reap the ones nobody has used for a while.
//!
//! ## Design Principles
//! 1. **Check, Build, Re-check**: Capacity and id checks run before the
//!    adapter is built and again on insert, so slow remote connects never
//!    hold the registry lock.
//! 2. **Backend Per Connection**: The local/remote decision is taken when a
//!    connection is created; flipping the mode later does not move existing
//!    connections.
//! 3. **Close On Exit**: Every path that drops a connection from the map
//!    (remove, reap, close) closes its adapter.
//!
//! ## Structure Overview
//!
//! ```text
//! ConnectionRegistry
//!   ├── config: RegistryConfig
//!   ├── local_mode: AtomicBool
//!   └── connections: RwLock<HashMap<id, Arc<Connection>>>
//!         └── Connection { spec fields, adapter, created_at, last_used }
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use rkv_common::{check_db_index, RkvError};
use rkv_engine::{KVEngine, MemoryEngine};

use crate::adapter::ClientAdapter;
use crate::client::{ClientConfig, KVClient};
use crate::config::RegistryConfig;

/// Errors raised by registry operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("connection limit reached ({0})")]
    CapacityReached(usize),
    #[error("connection id already exists: {0}")]
    DuplicateId(String),
    #[error("connection not found: {0}")]
    NotFound(String),
    #[error("invalid connection parameters: {0}")]
    InvalidSpec(String),
    #[error("failed to connect {id}: {source}")]
    Connect { id: String, source: RkvError },
}

/// Parameters for a new connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionSpec {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub db: u8,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub alias: String,
}

/// Serializable snapshot of a registered connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionInfo {
    pub id: String,
    pub host: String,
    pub port: u16,
    pub db: u8,
    pub alias: String,
    pub is_local: bool,
    /// Unix milliseconds.
    pub created_at: u64,
    /// Unix milliseconds.
    pub last_used: u64,
}

/// One registered logical connection.
pub struct Connection {
    id: String,
    spec: ConnectionSpec,
    adapter: ClientAdapter,
    created_at: SystemTime,
    last_used: Mutex<SystemTime>,
}

impl Connection {
    fn new(id: String, spec: ConnectionSpec, adapter: ClientAdapter) -> Self {
        let now = SystemTime::now();
        Connection {
            id,
            spec,
            adapter,
            created_at: now,
            last_used: Mutex::new(now),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn adapter(&self) -> &ClientAdapter {
        &self.adapter
    }

    /// Marks the connection as used now.
    pub fn touch(&self) {
        *self.last_used.lock() = SystemTime::now();
    }

    pub fn last_used(&self) -> SystemTime {
        *self.last_used.lock()
    }

    /// Time since the last `touch`, zero if the clock went backwards.
    pub fn idle_for(&self) -> Duration {
        SystemTime::now()
            .duration_since(self.last_used())
            .unwrap_or_default()
    }

    pub fn info(&self) -> ConnectionInfo {
        ConnectionInfo {
            id: self.id.clone(),
            host: self.spec.host.clone(),
            port: self.spec.port,
            db: self.spec.db,
            alias: self.spec.alias.clone(),
            is_local: self.adapter.is_local(),
            created_at: unix_millis(self.created_at),
            last_used: unix_millis(self.last_used()),
        }
    }

    fn close(&self) {
        if let Err(err) = self.adapter.close() {
            warn!(id = %self.id, error = %err, "failed to close connection");
        }
    }
}

fn unix_millis(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|since| since.as_millis() as u64)
        .unwrap_or(0)
}

/// Named connections with a size cap and idle reaping.
pub struct ConnectionRegistry {
    config: RegistryConfig,
    local_mode: AtomicBool,
    connections: RwLock<HashMap<String, Arc<Connection>>>,
}

impl ConnectionRegistry {
    pub fn new(config: RegistryConfig) -> Self {
        let local_mode = AtomicBool::new(config.local_mode);
        ConnectionRegistry {
            config,
            local_mode,
            connections: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Chooses the backend for connections created from now on.
    pub fn set_local_mode(&self, enabled: bool) {
        self.local_mode.store(enabled, Ordering::SeqCst);
        info!(enabled, "registry local mode changed");
    }

    pub fn is_local_mode(&self) -> bool {
        self.local_mode.load(Ordering::SeqCst)
    }

    /// Creates and registers a connection under `id`.
    ///
    /// Remote connections are verified with `PING` before they are
    /// registered; on failure nothing is kept.
    pub fn create(
        &self,
        id: impl Into<String>,
        spec: ConnectionSpec,
    ) -> Result<Arc<Connection>, RegistryError> {
        let id = id.into();
        self.check_admission(&self.connections.read(), &id)?;
        check_db_index(i64::from(spec.db))
            .map_err(|err| RegistryError::InvalidSpec(err.to_string()))?;

        let adapter = if self.is_local_mode() {
            self.build_local(&id, &spec)?
        } else {
            self.build_remote(&id, &spec)?
        };

        let connection = Arc::new(Connection::new(id.clone(), spec, adapter));
        let mut connections = self.connections.write();
        if let Err(err) = self.check_admission(&connections, &id) {
            connection.close();
            return Err(err);
        }
        connections.insert(id.clone(), Arc::clone(&connection));
        drop(connections);

        info!(
            id = %id,
            local = connection.adapter().is_local(),
            "connection registered"
        );
        Ok(connection)
    }

    /// Looks up a connection and refreshes its last-used time.
    pub fn get(&self, id: &str) -> Result<Arc<Connection>, RegistryError> {
        let connection = self
            .connections
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;
        connection.touch();
        Ok(connection)
    }

    /// Unregisters and closes a connection.
    pub fn remove(&self, id: &str) -> Result<(), RegistryError> {
        let connection = self
            .connections
            .write()
            .remove(id)
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;
        connection.close();
        info!(id = %id, "connection removed");
        Ok(())
    }

    /// Snapshots of every connection, oldest first.
    pub fn list(&self) -> Vec<ConnectionInfo> {
        let mut infos: Vec<ConnectionInfo> = self
            .connections
            .read()
            .values()
            .map(|connection| connection.info())
            .collect();
        infos.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        infos
    }

    pub fn len(&self) -> usize {
        self.connections.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.read().is_empty()
    }

    /// Closes and removes connections idle for longer than `timeout`.
    pub fn reap_idle(&self, timeout: Duration) -> usize {
        let reaped: Vec<Arc<Connection>> = {
            let mut connections = self.connections.write();
            let idle: Vec<String> = connections
                .values()
                .filter(|connection| connection.idle_for() > timeout)
                .map(|connection| connection.id.clone())
                .collect();
            idle.iter().filter_map(|id| connections.remove(id)).collect()
        };

        for connection in &reaped {
            connection.close();
            info!(id = %connection.id, "idle connection reaped");
        }
        reaped.len()
    }

    /// Runs `reap_idle(config.idle_timeout)` every `interval` on a
    /// background thread until the handle is stopped or dropped.
    pub fn start_reaper(self: &Arc<Self>, interval: Duration) -> ReaperHandle {
        let registry = Arc::clone(self);
        let timeout = self.config.idle_timeout();
        let (stop, stop_rx) = mpsc::channel::<()>();
        let join = std::thread::spawn(move || loop {
            match stop_rx.recv_timeout(interval) {
                Err(RecvTimeoutError::Timeout) => {
                    registry.reap_idle(timeout);
                }
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        });
        ReaperHandle {
            stop,
            join: Some(join),
        }
    }

    /// Closes every connection and empties the registry.
    pub fn close(&self) {
        let drained: Vec<Arc<Connection>> = self
            .connections
            .write()
            .drain()
            .map(|(_, connection)| connection)
            .collect();
        for connection in &drained {
            connection.close();
        }
        info!(closed = drained.len(), "registry closed");
    }

    fn check_admission(
        &self,
        connections: &HashMap<String, Arc<Connection>>,
        id: &str,
    ) -> Result<(), RegistryError> {
        if connections.len() >= self.config.max_connections {
            return Err(RegistryError::CapacityReached(self.config.max_connections));
        }
        if connections.contains_key(id) {
            return Err(RegistryError::DuplicateId(id.to_string()));
        }
        Ok(())
    }

    fn build_local(&self, id: &str, spec: &ConnectionSpec) -> Result<ClientAdapter, RegistryError> {
        let engine = MemoryEngine::new();
        if spec.db > 0 {
            engine
                .select(i64::from(spec.db))
                .map_err(|source| RegistryError::Connect {
                    id: id.to_string(),
                    source,
                })?;
        }
        Ok(ClientAdapter::Local(Arc::new(engine)))
    }

    fn build_remote(&self, id: &str, spec: &ConnectionSpec) -> Result<ClientAdapter, RegistryError> {
        let timeout = self.config.connect_timeout();
        let client = KVClient::with_config(ClientConfig {
            addr: format!("{}:{}", spec.host, spec.port),
            password: spec.password.clone(),
            db: spec.db,
            connect_timeout: Some(timeout),
            read_timeout: Some(timeout),
            write_timeout: Some(timeout),
            ..ClientConfig::default()
        });

        if let Err(source) = client.ping() {
            warn!(id = %id, addr = %client.addr(), error = %source, "remote connect failed");
            let _ = client.close();
            return Err(RegistryError::Connect {
                id: id.to_string(),
                source,
            });
        }
        Ok(ClientAdapter::Remote(client))
    }
}

impl Drop for ConnectionRegistry {
    fn drop(&mut self) {
        for connection in self.connections.get_mut().values() {
            connection.close();
        }
    }
}

/// Handle for the background idle reaper.
pub struct ReaperHandle {
    stop: Sender<()>,
    join: Option<JoinHandle<()>>,
}

impl ReaperHandle {
    /// Stops the reaper and waits for the thread to finish.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        let _ = self.stop.send(());
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

impl Drop for ReaperHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

//! # Client Adapter
//!
//! Purpose: Give one logical connection a single command surface, whether it
//! is served by the in-process store or forwarded to a real server.
//!
//! ## Design Principles
//! 1. **Chosen Once**: The backend is fixed when the adapter is built.
//! 2. **Same Shapes**: Every command returns the `Cmd` wrappers, so callers
//!    never branch on the backend.

use std::sync::Arc;
use std::time::Duration;

use rkv_common::{
    BoolCmd, DurationCmd, FloatCmd, IntCmd, RkvResult, ScoredMember, StatusCmd,
    StringCmd, StringMapCmd, StringSliceCmd, ZSliceCmd,
};
use rkv_engine::{KVEngine, MemoryEngine};

use crate::client::KVClient;

const OK: &str = "OK";

/// Backend of one logical connection.
pub enum ClientAdapter {
    /// In-process store.
    Local(Arc<MemoryEngine>),
    /// Real server over the network.
    Remote(KVClient),
}

fn status(result: RkvResult<()>) -> StatusCmd {
    result.map(|()| OK.to_string()).into()
}

impl ClientAdapter {
    /// The backend as a trait object.
    pub fn engine(&self) -> &dyn KVEngine {
        match self {
            ClientAdapter::Local(engine) => engine.as_ref() as &dyn KVEngine,
            ClientAdapter::Remote(client) => client as &dyn KVEngine,
        }
    }

    #[inline]
    pub fn is_local(&self) -> bool {
        matches!(self, ClientAdapter::Local(_))
    }

    pub fn close(&self) -> RkvResult<()> {
        self.engine().close()
    }

    pub fn ping(&self) -> StatusCmd {
        self.engine().ping().into()
    }

    pub fn get(&self, key: &str) -> StringCmd {
        self.engine().get(key).into()
    }

    pub fn set(&self, key: &str, value: &str, ttl: Duration) -> StatusCmd {
        status(self.engine().set(key, value, ttl))
    }

    pub fn set_nx(&self, key: &str, value: &str, ttl: Duration) -> BoolCmd {
        self.engine().set_nx(key, value, ttl).into()
    }

    pub fn del(&self, keys: &[&str]) -> IntCmd {
        self.engine().del(keys).into()
    }

    pub fn exists(&self, keys: &[&str]) -> IntCmd {
        self.engine().exists(keys).into()
    }

    pub fn expire(&self, key: &str, ttl: Duration) -> BoolCmd {
        self.engine().expire(key, ttl).into()
    }

    pub fn ttl(&self, key: &str) -> DurationCmd {
        self.engine().ttl(key).into()
    }

    pub fn hget(&self, key: &str, field: &str) -> StringCmd {
        self.engine().hget(key, field).into()
    }

    pub fn hset(&self, key: &str, field_values: &[&str]) -> IntCmd {
        self.engine().hset(key, field_values).into()
    }

    pub fn hdel(&self, key: &str, fields: &[&str]) -> IntCmd {
        self.engine().hdel(key, fields).into()
    }

    pub fn hexists(&self, key: &str, field: &str) -> BoolCmd {
        self.engine().hexists(key, field).into()
    }

    pub fn hgetall(&self, key: &str) -> StringMapCmd {
        self.engine().hgetall(key).into()
    }

    pub fn hkeys(&self, key: &str) -> StringSliceCmd {
        self.engine().hkeys(key).into()
    }

    pub fn hvals(&self, key: &str) -> StringSliceCmd {
        self.engine().hvals(key).into()
    }

    pub fn lpush(&self, key: &str, values: &[&str]) -> IntCmd {
        self.engine().lpush(key, values).into()
    }

    pub fn rpush(&self, key: &str, values: &[&str]) -> IntCmd {
        self.engine().rpush(key, values).into()
    }

    pub fn lpop(&self, key: &str) -> StringCmd {
        self.engine().lpop(key).into()
    }

    pub fn rpop(&self, key: &str) -> StringCmd {
        self.engine().rpop(key).into()
    }

    pub fn llen(&self, key: &str) -> IntCmd {
        self.engine().llen(key).into()
    }

    pub fn lrange(&self, key: &str, start: i64, stop: i64) -> StringSliceCmd {
        self.engine().lrange(key, start, stop).into()
    }

    pub fn sadd(&self, key: &str, members: &[&str]) -> IntCmd {
        self.engine().sadd(key, members).into()
    }

    pub fn srem(&self, key: &str, members: &[&str]) -> IntCmd {
        self.engine().srem(key, members).into()
    }

    pub fn smembers(&self, key: &str) -> StringSliceCmd {
        self.engine().smembers(key).into()
    }

    pub fn sismember(&self, key: &str, member: &str) -> BoolCmd {
        self.engine().sismember(key, member).into()
    }

    pub fn scard(&self, key: &str) -> IntCmd {
        self.engine().scard(key).into()
    }

    pub fn zadd(&self, key: &str, members: &[ScoredMember]) -> IntCmd {
        self.engine().zadd(key, members).into()
    }

    pub fn zrem(&self, key: &str, members: &[&str]) -> IntCmd {
        self.engine().zrem(key, members).into()
    }

    pub fn zrange(&self, key: &str, start: i64, stop: i64) -> StringSliceCmd {
        self.engine().zrange(key, start, stop).into()
    }

    pub fn zrange_with_scores(&self, key: &str, start: i64, stop: i64) -> ZSliceCmd {
        self.engine().zrange_with_scores(key, start, stop).into()
    }

    pub fn zcard(&self, key: &str) -> IntCmd {
        self.engine().zcard(key).into()
    }

    pub fn zscore(&self, key: &str, member: &str) -> FloatCmd {
        self.engine().zscore(key, member).into()
    }

    pub fn keys(&self, pattern: &str) -> StringSliceCmd {
        self.engine().keys(pattern).into()
    }

    pub fn key_type(&self, key: &str) -> StatusCmd {
        self.engine().key_type(key).into()
    }

    pub fn flush_db(&self) -> StatusCmd {
        status(self.engine().flush_db())
    }

    pub fn flush_all(&self) -> StatusCmd {
        status(self.engine().flush_all())
    }

    pub fn select(&self, index: i64) -> StatusCmd {
        status(self.engine().select(index))
    }

    pub fn db_size(&self) -> IntCmd {
        self.engine().db_size().into()
    }
}

impl From<MemoryEngine> for ClientAdapter {
    fn from(engine: MemoryEngine) -> Self {
        ClientAdapter::Local(Arc::new(engine))
    }
}

impl From<KVClient> for ClientAdapter {
    fn from(client: KVClient) -> Self {
        ClientAdapter::Remote(client)
    }
}

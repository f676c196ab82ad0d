//! Event Bus Client: publish/subscribe and blocking-pop queues over Redis.
//!
//! Lazily connects on first use and memoizes the `ConnectionManager`
//! (cheap to clone, auto-reconnecting), the same pattern the teacher uses
//! for its own Redis-backed state store: a `parking_lot::RwLock<Option<_>>`
//! guarding the handle so no two callers race to dial twice.

pub mod keys;

use std::sync::Arc;

use parking_lot::RwLock;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use crate::error::Result;

pub struct Broker {
    url: String,
    connection: Arc<RwLock<Option<ConnectionManager>>>,
}

impl Broker {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            connection: Arc::new(RwLock::new(None)),
        }
    }

    async fn get_connection(&self) -> Result<ConnectionManager> {
        if let Some(conn) = self.connection.read().clone() {
            return Ok(conn);
        }
        let client = redis::Client::open(self.url.as_str())?;
        let manager = client.get_connection_manager().await?;
        *self.connection.write() = Some(manager.clone());
        Ok(manager)
    }

    /// Fire-and-forget broadcast; the number of subscribers is discarded.
    pub async fn publish(&self, channel: &str, message: &str) -> Result<()> {
        let mut conn = self.get_connection().await?;
        let _: i64 = conn.publish(channel, message).await?;
        Ok(())
    }

    /// Blocking dequeue with a timeout, in whole seconds. Returns `None` on
    /// timeout rather than erroring.
    pub async fn blpop(&self, key: &str, timeout_secs: u64) -> Result<Option<(String, String)>> {
        let mut conn = self.get_connection().await?;
        let result: Option<(String, String)> =
            conn.blpop(key, timeout_secs as f64).await?;
        Ok(result)
    }

    pub async fn rpush(&self, key: &str, value: &str) -> Result<()> {
        let mut conn = self.get_connection().await?;
        let _: i64 = conn.rpush(key, value).await?;
        Ok(())
    }

    pub async fn lrange(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>> {
        let mut conn = self.get_connection().await?;
        let values: Vec<String> = conn.lrange(key, start, stop).await?;
        Ok(values)
    }

    pub async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.get_connection().await?;
        let _: i64 = conn.del(key).await?;
        Ok(())
    }

    pub async fn hset(&self, key: &str, field: &str, value: &str) -> Result<()> {
        let mut conn = self.get_connection().await?;
        let _: i64 = conn.hset(key, field, value).await?;
        Ok(())
    }

    pub async fn hdel(&self, key: &str, field: &str) -> Result<()> {
        let mut conn = self.get_connection().await?;
        let _: i64 = conn.hdel(key, field).await?;
        Ok(())
    }

    pub async fn sadd(&self, key: &str, member: &str) -> Result<()> {
        let mut conn = self.get_connection().await?;
        let _: i64 = conn.sadd(key, member).await?;
        Ok(())
    }

    pub async fn srem(&self, key: &str, member: &str) -> Result<()> {
        let mut conn = self.get_connection().await?;
        let _: i64 = conn.srem(key, member).await?;
        Ok(())
    }

    pub async fn smembers(&self, key: &str) -> Result<Vec<String>> {
        let mut conn = self.get_connection().await?;
        let members: Vec<String> = conn.smembers(key).await?;
        Ok(members)
    }

    pub async fn hget(&self, key: &str, field: &str) -> Result<Option<String>> {
        let mut conn = self.get_connection().await?;
        let value: Option<String> = conn.hget(key, field).await?;
        Ok(value)
    }

    pub async fn hkeys(&self, key: &str) -> Result<Vec<String>> {
        let mut conn = self.get_connection().await?;
        let fields: Vec<String> = conn.hkeys(key).await?;
        Ok(fields)
    }

    pub async fn is_connected(&self) -> bool {
        self.get_connection().await.is_ok()
    }
}

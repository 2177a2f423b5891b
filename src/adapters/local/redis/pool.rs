//! Redis connection pool.

use super::error::QueueError;
use deadpool_redis::{Config, Connection, Pool, Runtime};

/// Redis-backed adapter for queue, repository and ad catalog operations.
#[derive(Clone)]
pub struct RedisPool {
    pool: Pool,
}

impl RedisPool {
    /// Create a new RedisPool with connection pool.
    pub fn new(redis_url: &str) -> Result<Self, QueueError> {
        let cfg = Config::from_url(redis_url);
        let pool = cfg.create_pool(Some(Runtime::Tokio1))?;
        Ok(Self { pool })
    }

    pub(super) async fn conn(&self) -> Result<Connection, QueueError> {
        Ok(self.pool.get().await?)
    }
}

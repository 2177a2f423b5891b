//! Local adapters for monolith deployment.

pub mod http;
pub mod redis;

pub use redis::RedisPool;

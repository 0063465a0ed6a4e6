//! Broker backends for the job queue
//!
//! The queue speaks to its backend through [`Broker`], a thin list+KV
//! surface. [`RedisBroker`] is the production backend; [`MemoryBroker`]
//! backs tests and dry runs without a server.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tokio::sync::{Mutex, OnceCell};

use crate::errors::Result;

#[async_trait]
pub trait Broker: Send + Sync {
    async fn push_job(&self, queue: &str, payload: &str) -> Result<()>;
    async fn pop_job(&self, queue: &str) -> Result<Option<String>>;
    async fn queue_len(&self, queue: &str) -> Result<usize>;
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()>;
}

#[async_trait]
impl<B: Broker + ?Sized> Broker for Arc<B> {
    async fn push_job(&self, queue: &str, payload: &str) -> Result<()> {
        (**self).push_job(queue, payload).await
    }

    async fn pop_job(&self, queue: &str) -> Result<Option<String>> {
        (**self).pop_job(queue).await
    }

    async fn queue_len(&self, queue: &str) -> Result<usize> {
        (**self).queue_len(queue).await
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        (**self).get(key).await
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()> {
        (**self).set_ex(key, value, ttl_secs).await
    }
}

/// Redis-backed broker. The connection is established lazily on first use
/// and the manager reconnects on its own after drops.
pub struct RedisBroker {
    url: String,
    manager: OnceCell<ConnectionManager>,
}

impl RedisBroker {
    pub fn new(url: impl Into<String>) -> Self {
        RedisBroker {
            url: url.into(),
            manager: OnceCell::new(),
        }
    }

    async fn connection(&self) -> Result<ConnectionManager> {
        let manager = self
            .manager
            .get_or_try_init(|| async {
                let client = redis::Client::open(self.url.as_str())?;
                client.get_connection_manager().await
            })
            .await?;
        Ok(manager.clone())
    }
}

#[async_trait]
impl Broker for RedisBroker {
    async fn push_job(&self, queue: &str, payload: &str) -> Result<()> {
        let mut conn = self.connection().await?;
        let _: () = conn.lpush(queue, payload).await?;
        Ok(())
    }

    async fn pop_job(&self, queue: &str) -> Result<Option<String>> {
        let mut conn = self.connection().await?;
        let value: Option<String> = conn.rpop(queue, None).await?;
        Ok(value)
    }

    async fn queue_len(&self, queue: &str) -> Result<usize> {
        let mut conn = self.connection().await?;
        let len: usize = conn.llen(queue).await?;
        Ok(len)
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.connection().await?;
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()> {
        let mut conn = self.connection().await?;
        let _: () = conn.set_ex(key, value, ttl_secs).await?;
        Ok(())
    }
}

/// In-process broker. TTLs are accepted but not enforced.
#[derive(Default)]
pub struct MemoryBroker {
    state: Mutex<MemoryState>,
}

#[derive(Default)]
struct MemoryState {
    queues: HashMap<String, VecDeque<String>>,
    entries: HashMap<String, String>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        MemoryBroker::default()
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn push_job(&self, queue: &str, payload: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        state
            .queues
            .entry(queue.to_string())
            .or_default()
            .push_front(payload.to_string());
        Ok(())
    }

    async fn pop_job(&self, queue: &str) -> Result<Option<String>> {
        let mut state = self.state.lock().await;
        Ok(state.queues.get_mut(queue).and_then(VecDeque::pop_back))
    }

    async fn queue_len(&self, queue: &str) -> Result<usize> {
        let state = self.state.lock().await;
        Ok(state.queues.get(queue).map_or(0, VecDeque::len))
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let state = self.state.lock().await;
        Ok(state.entries.get(key).cloned())
    }

    async fn set_ex(&self, key: &str, value: &str, _ttl_secs: u64) -> Result<()> {
        let mut state = self.state.lock().await;
        state.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

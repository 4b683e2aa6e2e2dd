use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::debug;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use super::{FingerprintStore, HostParamIndex, TaskQueue};
use crate::intercept::flow::TaskPacket;

const FINGERPRINT_KEY: &str = "webagent:fingerprints";
const QUEUE_KEY: &str = "webagent:tasks:initial";

fn host_params_key(host: &str) -> String {
    format!("webagent:host:{}:params", host)
}

/// Redis-backed fingerprint set, host parameter index and task queue.
///
/// All operations go through one multiplexed connection manager; the manager
/// reconnects on its own, so a dropped connection surfaces as a retried
/// command rather than a dead store.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url).context("invalid REDIS_URL")?;
        let conn = ConnectionManager::new(client)
            .await
            .context("failed to connect to Redis")?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl FingerprintStore for RedisStore {
    async fn is_duplicate(&self, fingerprint: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        let member: bool = conn.sismember(FINGERPRINT_KEY, fingerprint).await?;
        Ok(member)
    }

    async fn insert(&self, fingerprint: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.sadd(FINGERPRINT_KEY, fingerprint).await?;
        Ok(())
    }
}

#[async_trait]
impl HostParamIndex for RedisStore {
    async fn learn(&self, host: &str, params: &[String]) -> Result<()> {
        if params.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.clone();
        let _: () = conn.sadd(host_params_key(host), params).await?;
        debug!("Learned {} parameter(s) for host {}", params.len(), host);
        Ok(())
    }

    async fn params_for(&self, host: &str) -> Result<Vec<String>> {
        let mut conn = self.conn.clone();
        let params: Vec<String> = conn.smembers(host_params_key(host)).await?;
        Ok(params)
    }
}

#[async_trait]
impl TaskQueue for RedisStore {
    async fn push(&self, packet: &TaskPacket) -> Result<()> {
        let payload = serde_json::to_string(packet).context("failed to encode task packet")?;
        let mut conn = self.conn.clone();
        let _: () = conn.rpush(QUEUE_KEY, payload).await?;
        Ok(())
    }

    async fn pop(&self, timeout: Duration) -> Result<Option<TaskPacket>> {
        let mut conn = self.conn.clone();
        let reply: Option<(String, String)> =
            conn.blpop(QUEUE_KEY, timeout.as_secs_f64()).await?;
        match reply {
            Some((_, raw)) => {
                let packet =
                    serde_json::from_str(&raw).context("malformed task packet in queue")?;
                Ok(Some(packet))
            }
            None => Ok(None),
        }
    }
}

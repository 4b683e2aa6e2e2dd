pub mod memory;
pub mod postgres;
pub mod redis;

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use crate::core::Finding;
use crate::intercept::flow::TaskPacket;

/// Request-level deduplication set. A fingerprint is inserted once per
/// distinct captured request; replays are dropped at the interceptor.
#[async_trait]
pub trait FingerprintStore: Send + Sync {
    async fn is_duplicate(&self, fingerprint: &str) -> Result<bool>;
    async fn insert(&self, fingerprint: &str) -> Result<()>;
}

/// Host-level parameter-name learning. Written by the interceptor for every
/// captured flow; read by the fuzz strategist as its discovery dictionary.
#[async_trait]
pub trait HostParamIndex: Send + Sync {
    async fn learn(&self, host: &str, params: &[String]) -> Result<()>;
    async fn params_for(&self, host: &str) -> Result<Vec<String>>;
}

/// Durable FIFO of captured request packets.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    async fn push(&self, packet: &TaskPacket) -> Result<()>;
    /// Blocking pop with a poll timeout, so the runner can observe shutdown
    /// between polls. `None` means the timeout elapsed with an empty queue.
    async fn pop(&self, timeout: Duration) -> Result<Option<TaskPacket>>;
}

/// Relational sink for confirmed findings.
#[async_trait]
pub trait FindingStore: Send + Sync {
    async fn save_vulnerability(&self, project_name: &str, finding: &Finding) -> Result<()>;
}

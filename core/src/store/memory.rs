use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use super::{FindingStore, FingerprintStore, HostParamIndex, TaskQueue};
use crate::core::Finding;
use crate::intercept::flow::TaskPacket;

/// In-process store backing every store trait. Used by tests and by dry
/// setups that have no Redis/Postgres at hand; state dies with the process.
#[derive(Default)]
pub struct MemoryStore {
    fingerprints: Mutex<HashSet<String>>,
    host_params: Mutex<HashMap<String, HashSet<String>>>,
    queue: Mutex<VecDeque<TaskPacket>>,
    findings: Mutex<Vec<(String, Finding)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queued(&self) -> Vec<TaskPacket> {
        self.queue.lock().unwrap().iter().cloned().collect()
    }

    pub fn saved_findings(&self) -> Vec<(String, Finding)> {
        self.findings.lock().unwrap().clone()
    }

    pub fn fingerprint_count(&self) -> usize {
        self.fingerprints.lock().unwrap().len()
    }
}

#[async_trait]
impl FingerprintStore for MemoryStore {
    async fn is_duplicate(&self, fingerprint: &str) -> Result<bool> {
        Ok(self.fingerprints.lock().unwrap().contains(fingerprint))
    }

    async fn insert(&self, fingerprint: &str) -> Result<()> {
        self.fingerprints.lock().unwrap().insert(fingerprint.to_string());
        Ok(())
    }
}

#[async_trait]
impl HostParamIndex for MemoryStore {
    async fn learn(&self, host: &str, params: &[String]) -> Result<()> {
        let mut index = self.host_params.lock().unwrap();
        let entry = index.entry(host.to_string()).or_default();
        for param in params {
            entry.insert(param.clone());
        }
        Ok(())
    }

    async fn params_for(&self, host: &str) -> Result<Vec<String>> {
        let index = self.host_params.lock().unwrap();
        let mut params: Vec<String> = index
            .get(host)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();
        params.sort();
        Ok(params)
    }
}

#[async_trait]
impl TaskQueue for MemoryStore {
    async fn push(&self, packet: &TaskPacket) -> Result<()> {
        self.queue.lock().unwrap().push_back(packet.clone());
        Ok(())
    }

    async fn pop(&self, timeout: Duration) -> Result<Option<TaskPacket>> {
        if let Some(packet) = self.queue.lock().unwrap().pop_front() {
            return Ok(Some(packet));
        }
        // No notification machinery; emulate BLPOP by sleeping out the poll.
        tokio::time::sleep(timeout).await;
        Ok(self.queue.lock().unwrap().pop_front())
    }
}

#[async_trait]
impl FindingStore for MemoryStore {
    async fn save_vulnerability(&self, project_name: &str, finding: &Finding) -> Result<()> {
        self.findings
            .lock()
            .unwrap()
            .push((project_name.to_string(), finding.clone()));
        Ok(())
    }
}

use std::sync::Arc;

use log::{error, info};
use tokio::task::JoinSet;

use crate::agents::fuzz::FuzzProfile;
use crate::agents::manager::Manager;
use crate::agents::sqli::SqliProfile;
use crate::agents::state::GlobalState;
use crate::agents::worker::{VulnProfile, VulnWorker};
use crate::agents::xss::XssProfile;
use crate::core::executor::{HttpProbeExecutor, ProbeEngine};
use crate::core::VulnKind;
use crate::llm::LlmClient;
use crate::store::{FindingStore, HostParamIndex};
use crate::ScanConfig;

/// Task-graph runtime for one scan: manager triage, then one worker
/// sub-graph per task, fanned out concurrently and merged back into the
/// global state at the join point.
pub struct Orchestrator {
    config: ScanConfig,
    manager: Manager,
    worker_llm: Arc<dyn LlmClient>,
    params: Arc<dyn HostParamIndex>,
    findings: Arc<dyn FindingStore>,
    probe_engine: Option<Arc<dyn ProbeEngine>>,
}

impl Orchestrator {
    pub fn new(
        config: ScanConfig,
        manager_llm: Arc<dyn LlmClient>,
        worker_llm: Arc<dyn LlmClient>,
        params: Arc<dyn HostParamIndex>,
        findings: Arc<dyn FindingStore>,
    ) -> Self {
        let manager = Manager::new(manager_llm, config.target_whitelist.clone());
        Self {
            config,
            manager,
            worker_llm,
            params,
            findings,
            probe_engine: None,
        }
    }

    /// Replaces the per-scan HTTP probe engine, e.g. with a scripted engine
    /// in tests or a recording engine in dry runs.
    pub fn with_probe_engine(mut self, engine: Arc<dyn ProbeEngine>) -> Self {
        self.probe_engine = Some(engine);
        self
    }

    /// Runs the full scan graph over `global`. Worker failures are absorbed:
    /// one crashed worker never takes down its siblings.
    pub async fn run_scan(&self, global: &mut GlobalState) {
        let ctx = global.context();
        let tasks = self.manager.analyze(&ctx).await;
        global.tasks = tasks.clone();

        if tasks.is_empty() {
            info!("No tasks for {}; scan ends empty", ctx.target_url);
            return;
        }

        // The probe client lives for exactly one scan; workers of the same
        // scan share it for connection reuse.
        let engine: Arc<dyn ProbeEngine> = match &self.probe_engine {
            Some(engine) => engine.clone(),
            None => Arc::new(HttpProbeExecutor::new(
                self.config.scan_timeout,
                self.config.scan_proxy.as_deref(),
                self.config.scan_max_concurrency,
            )),
        };

        let mut join_set = JoinSet::new();
        for kind in tasks {
            let worker = self.build_worker(kind, engine.clone());
            let ctx = ctx.clone();
            join_set.spawn(async move { (kind, worker.run(&ctx).await) });
        }

        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((kind, state)) => global.absorb_worker(kind, state),
                Err(e) => {
                    error!("Worker task aborted: {}", e);
                    global.audit_log.push(format!("worker aborted: {}", e));
                }
            }
        }
    }

    fn build_worker(&self, kind: VulnKind, engine: Arc<dyn ProbeEngine>) -> VulnWorker {
        let profile: Arc<dyn VulnProfile> = match kind {
            VulnKind::Sqli => Arc::new(SqliProfile),
            VulnKind::Xss => Arc::new(XssProfile),
            VulnKind::Fuzz => Arc::new(FuzzProfile::new(self.params.clone())),
        };
        VulnWorker::new(
            profile,
            self.worker_llm.clone(),
            engine,
            self.findings.clone(),
            self.config.scan_max_retries,
        )
    }
}

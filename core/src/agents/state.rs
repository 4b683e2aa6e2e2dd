use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use uuid::Uuid;

use crate::agents::ScanContext;
use crate::core::executor::ProbeResult;
use crate::core::template::{InjectionPoint, StructuredPacket};
use crate::core::{Decision, Finding, VulnKind};
use crate::intercept::flow::TaskPacket;

/// How many history entries are surfaced to the strategist. History grows
/// across retries; the prompt tail is capped to bound token cost.
pub const HISTORY_PROMPT_CAP: usize = 100;

/// Compact projection of a probe result kept in the per-vuln history and
/// shown to the strategist on later rounds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProbeSummary {
    pub parameter: String,
    pub payload: String,
    pub status: u16,
    pub elapsed: f64,
    pub len_diff: i64,
    pub similarity: f64,
}

impl From<&ProbeResult> for ProbeSummary {
    fn from(result: &ProbeResult) -> Self {
        Self {
            parameter: result.parameter.clone(),
            payload: result.payload.clone(),
            status: result.status,
            elapsed: result.elapsed,
            len_diff: result.len_diff,
            similarity: result.similarity,
        }
    }
}

/// Per-vuln worker state, alive from scan start to FOUND or retry
/// exhaustion. Never shared across vulns: each worker owns its retry
/// counter and feedback list.
#[derive(Debug, Default)]
pub struct WorkerState {
    pub potential_points: Vec<InjectionPoint>,
    pub history_results: Vec<ProbeSummary>,
    pub analysis_feedback: Vec<String>,
    pub retry_count: u32,
    pub planned_data: Option<StructuredPacket>,
    pub test_results: Vec<ProbeResult>,
    pub findings: Vec<Finding>,
    pub next_step: Decision,
}

impl WorkerState {
    pub fn history_tail(&self) -> &[ProbeSummary] {
        let len = self.history_results.len();
        &self.history_results[len.saturating_sub(HISTORY_PROMPT_CAP)..]
    }

    /// Merges one node's partial output. Reducers per field:
    /// append for history/feedback/findings, overwrite-when-set for
    /// scalars, allow-null overwrite for `planned_data` so that clearing
    /// it after execution is not lost.
    pub fn apply(&mut self, update: WorkerUpdate) {
        if let Some(points) = update.potential_points {
            self.potential_points = points;
        }
        self.history_results.extend(update.history_results);
        self.analysis_feedback.extend(update.analysis_feedback);
        if let Some(retry_count) = update.retry_count {
            self.retry_count = retry_count;
        }
        if let Some(planned) = update.planned_data {
            self.planned_data = planned;
        }
        if let Some(results) = update.test_results {
            self.test_results = results;
        }
        self.findings.extend(update.findings);
        if let Some(next_step) = update.next_step {
            self.next_step = next_step;
        }
    }
}

/// Partial-state output of one worker node, merged into `WorkerState` by
/// `apply`.
#[derive(Debug, Default)]
pub struct WorkerUpdate {
    pub potential_points: Option<Vec<InjectionPoint>>,
    pub history_results: Vec<ProbeSummary>,
    pub analysis_feedback: Vec<String>,
    pub retry_count: Option<u32>,
    pub planned_data: Option<Option<StructuredPacket>>,
    pub test_results: Option<Vec<ProbeResult>>,
    pub findings: Vec<Finding>,
    pub next_step: Option<Decision>,
}

/// Scan-wide state: the request identity, the manager's task list and the
/// merged outcome of every worker. Findings only grow; per-vuln sub-records
/// are stored whole rather than flattened.
#[derive(Debug, Default)]
pub struct GlobalState {
    pub request_id: String,
    pub project_name: String,
    pub target_url: String,
    pub method: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<String>,
    pub response_headers: BTreeMap<String, String>,
    pub response_body: String,
    pub tasks: Vec<VulnKind>,
    pub findings: Vec<Finding>,
    pub audit_log: Vec<String>,
    pub workers: HashMap<VulnKind, WorkerState>,
}

impl GlobalState {
    pub fn from_packet(packet: &TaskPacket) -> Self {
        Self {
            request_id: Uuid::new_v4().to_string(),
            project_name: packet
                .project_name
                .clone()
                .unwrap_or_else(|| "Default".to_string()),
            target_url: packet.url.clone(),
            method: packet.method.clone(),
            headers: packet.headers.clone(),
            body: if packet.body.is_empty() {
                None
            } else {
                Some(packet.body.clone())
            },
            response_headers: packet.response_headers.clone(),
            response_body: packet.response_body.clone(),
            tasks: Vec::new(),
            findings: Vec::new(),
            audit_log: Vec::new(),
            workers: HashMap::new(),
        }
    }

    pub fn context(&self) -> ScanContext {
        ScanContext {
            request_id: self.request_id.clone(),
            project_name: self.project_name.clone(),
            target_url: self.target_url.clone(),
            method: self.method.clone(),
            headers: self.headers.clone(),
            body: self.body.clone(),
            response_headers: self.response_headers.clone(),
            response_body: self.response_body.clone(),
        }
    }

    /// Join point for a finished worker: findings concatenate, the audit
    /// log concatenates, and the worker's sub-record is kept whole.
    pub fn absorb_worker(&mut self, kind: VulnKind, state: WorkerState) {
        self.findings.extend(state.findings.iter().cloned());
        self.audit_log.push(format!(
            "{} worker finished: {} ({} finding(s), {} retry(ies))",
            kind,
            state.next_step,
            state.findings.len(),
            state.retry_count
        ));
        self.workers.insert(kind, state);
    }
}

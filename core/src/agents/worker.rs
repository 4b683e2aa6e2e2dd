use std::sync::Arc;

use async_trait::async_trait;
use log::{error, info, warn};
use serde_json::Value;

use crate::agents::analyzer::Analyzer;
use crate::agents::state::{ProbeSummary, WorkerState, WorkerUpdate};
use crate::agents::strategist::Strategist;
use crate::agents::ScanContext;
use crate::core::executor::{ProbeEngine, ProbeResult};
use crate::core::points::{build_first_round_template, derive_injection_points};
use crate::core::template::{StructuredPacket, TestCase};
use crate::core::{Decision, Finding, VulnKind};
use crate::llm::LlmClient;
use crate::store::FindingStore;

/// The first static probe wave fans out over at most this many points to
/// keep the request count bounded.
const FIRST_WAVE_POINT_LIMIT: usize = 3;

/// Per-vuln specialization plugged into the generic worker state machine.
#[async_trait]
pub trait VulnProfile: Send + Sync {
    fn kind(&self) -> VulnKind;
    /// Label used in logs and LLM agent names ("SQLi", "XSS", "Fuzz").
    fn label(&self) -> &'static str;
    /// Finding type recorded for confirmed hits.
    fn finding_type(&self) -> &'static str;
    /// Static first-wave payloads. An empty list sends even the first round
    /// to the strategist LLM.
    fn static_payloads(&self) -> &'static [&'static str] {
        &[]
    }
    /// The generator system prompt; async because fuzz folds in the host's
    /// learned parameter dictionary.
    async fn generator_prompt(&self, ctx: &ScanContext) -> String;
    fn analyzer_prompt(&self) -> &'static str;
    /// Projects the round's probe results into the analyzer's user message.
    fn analyzer_user_content(&self, ctx: &ScanContext, results: &[ProbeResult]) -> String;
}

/// Generic per-vuln state machine:
/// INIT -> ANALYZE_POINTS -> (STRATEGIZE -> EXECUTE -> ANALYZE_RESULTS)*.
/// Each node returns a partial update merged into the worker state; the
/// router loops back to STRATEGIZE only on RETRY within the retry budget.
pub struct VulnWorker {
    profile: Arc<dyn VulnProfile>,
    strategist: Strategist,
    analyzer: Analyzer,
    engine: Arc<dyn ProbeEngine>,
    findings: Arc<dyn FindingStore>,
    max_retries: u32,
}

impl VulnWorker {
    pub fn new(
        profile: Arc<dyn VulnProfile>,
        llm: Arc<dyn LlmClient>,
        engine: Arc<dyn ProbeEngine>,
        findings: Arc<dyn FindingStore>,
        max_retries: u32,
    ) -> Self {
        Self {
            profile,
            strategist: Strategist::new(llm.clone()),
            analyzer: Analyzer::new(llm),
            engine,
            findings,
            max_retries,
        }
    }

    pub async fn run(&self, ctx: &ScanContext) -> WorkerState {
        let mut state = WorkerState::default();
        state.apply(self.analyze_points(ctx));

        loop {
            state.apply(self.strategize(ctx, &state).await);
            state.apply(self.execute(ctx, &state).await);
            state.apply(self.analyze_results(ctx, &state).await);

            match state.next_step {
                Decision::Retry if state.retry_count < self.max_retries => continue,
                Decision::Retry => {
                    warn!(
                        "[{}] retry budget exhausted ({}); forcing terminal",
                        self.profile.label(),
                        state.retry_count
                    );
                    break;
                }
                _ => break,
            }
        }
        state
    }

    /// Deterministic point discovery; no LLM involved.
    fn analyze_points(&self, ctx: &ScanContext) -> WorkerUpdate {
        let points = derive_injection_points(&ctx.target_url, ctx.body.as_deref());
        info!(
            "[{}] identified {} injection point(s) on {}",
            self.profile.label(),
            points.len(),
            ctx.target_url
        );
        WorkerUpdate {
            potential_points: Some(points),
            retry_count: Some(0),
            test_results: Some(Vec::new()),
            ..WorkerUpdate::default()
        }
    }

    async fn strategize(&self, ctx: &ScanContext, state: &WorkerState) -> WorkerUpdate {
        let statics = self.profile.static_payloads();
        if state.retry_count == 0 && state.analysis_feedback.is_empty() && !statics.is_empty() {
            let limit = state.potential_points.len().min(FIRST_WAVE_POINT_LIMIT);
            let selected = &state.potential_points[..limit];
            if !selected.is_empty() {
                let template = build_first_round_template(
                    &ctx.method,
                    &ctx.target_url,
                    &ctx.headers,
                    ctx.body.as_deref(),
                    selected,
                );
                let test_cases: Vec<TestCase> = selected
                    .iter()
                    .map(|point| {
                        TestCase::new(
                            point.placeholder.clone(),
                            statics.iter().map(|s| s.to_string()).collect(),
                        )
                    })
                    .collect();
                info!(
                    "[{}] first round: {} static payload(s) across {} point(s)",
                    self.profile.label(),
                    statics.len(),
                    selected.len()
                );
                return WorkerUpdate {
                    planned_data: Some(Some(StructuredPacket { request: template, test_cases })),
                    ..WorkerUpdate::default()
                };
            }
        }

        let prompt = self.profile.generator_prompt(ctx).await;
        let packet = self
            .strategist
            .generate(
                self.profile.label(),
                &prompt,
                ctx,
                &state.potential_points,
                &state.analysis_feedback,
                state.history_tail(),
            )
            .await;
        WorkerUpdate {
            planned_data: Some(Some(packet)),
            ..WorkerUpdate::default()
        }
    }

    async fn execute(&self, ctx: &ScanContext, state: &WorkerState) -> WorkerUpdate {
        let Some(packet) = state.planned_data.as_ref().filter(|p| !p.is_empty()) else {
            warn!(
                "[{}] nothing planned this round; executing empty batch",
                self.profile.label()
            );
            return WorkerUpdate {
                test_results: Some(Vec::new()),
                ..WorkerUpdate::default()
            };
        };

        let results = self
            .engine
            .execute(packet, &state.potential_points, Some(&ctx.response_body))
            .await;
        let history: Vec<ProbeSummary> = results.iter().map(ProbeSummary::from).collect();
        WorkerUpdate {
            test_results: Some(results),
            history_results: history,
            ..WorkerUpdate::default()
        }
    }

    async fn analyze_results(&self, ctx: &ScanContext, state: &WorkerState) -> WorkerUpdate {
        let user_content = self
            .profile
            .analyzer_user_content(ctx, &state.test_results);
        let agent_name = format!("{}_Analyzer", self.profile.label());
        let verdict = self
            .analyzer
            .analyze(
                &agent_name,
                &ctx.request_id,
                self.profile.analyzer_prompt(),
                user_content,
                self.profile.label(),
            )
            .await;

        let mut update = WorkerUpdate {
            planned_data: Some(None),
            next_step: Some(verdict.decision),
            ..WorkerUpdate::default()
        };

        match verdict.decision {
            Decision::Found => {
                let finding = Finding {
                    request_id: ctx.request_id.clone(),
                    vuln_type: self.profile.finding_type().to_string(),
                    url: ctx.target_url.clone(),
                    method: ctx.method.clone(),
                    parameter: verdict.vulnerable_parameter,
                    payload: verdict.payload,
                    evidence: verdict.reasoning,
                    severity: "high".to_string(),
                    full_request: ctx.full_request(),
                };
                info!(
                    "[{}] vulnerability confirmed on parameter {:?}",
                    self.profile.label(),
                    finding.parameter
                );
                if let Err(e) = self
                    .findings
                    .save_vulnerability(&ctx.project_name, &finding)
                    .await
                {
                    // The in-memory copy still reaches the global state.
                    error!(
                        "[{}] failed to persist finding: {}",
                        self.profile.label(),
                        e
                    );
                }
                update.findings.push(finding);
            }
            Decision::Retry => {
                update.retry_count = Some(state.retry_count + 1);
                update.analysis_feedback.push(verdict.reasoning);
            }
            Decision::GiveUp => {}
        }
        update
    }
}

/// Projects probe results for the analyzer: the full response is swapped for
/// a short slice, and only when the probe actually changed the page
/// (similarity < 0.99); identical responses carry no slice at all.
pub(crate) fn diff_summary(results: &[ProbeResult], slice_chars: usize) -> Vec<Value> {
    results
        .iter()
        .map(|r| {
            let mut item = serde_json::json!({
                "parameter": r.parameter,
                "payload": r.payload,
                "status": r.status,
                "elapsed": r.elapsed,
                "len_diff": r.len_diff,
                "similarity": r.similarity,
            });
            if r.similarity < 0.99 {
                item["response_slice"] = Value::String(head_chars(&r.response, slice_chars));
            }
            item
        })
        .collect()
}

pub(crate) fn head_chars(text: &str, limit: usize) -> String {
    text.chars().take(limit).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::sqli::SqliProfile;
    use crate::agents::testing::{probe_result, scan_context, ScriptedEngine, ScriptedLlm};
    use crate::store::memory::MemoryStore;

    const RETRY_REPLY: &str =
        r#"{"is_vulnerable": false, "reasoning": "no signal, widen coverage", "decision": "RETRY"}"#;
    const FOUND_REPLY: &str = r#"{"is_vulnerable": true, "reasoning": "response delayed past the timeout bound", "vulnerable_parameter": "id", "payload": "sleep(5)#", "decision": "FOUND"}"#;
    const GIVE_UP_REPLY: &str =
        r#"{"is_vulnerable": false, "reasoning": "static page", "decision": "GIVE_UP"}"#;
    const LLM_PACKET: &str = r#"{
        "request": {"method": "GET", "target_url": "http://vuln.test/q?id={{1}}", "headers": {}},
        "test_cases": [{"parameter": "{{1}}", "payload": ["' OR 1=1--"]}]
    }"#;

    fn worker(
        llm: Arc<ScriptedLlm>,
        engine: Arc<ScriptedEngine>,
        store: Arc<MemoryStore>,
    ) -> VulnWorker {
        VulnWorker::new(Arc::new(SqliProfile), llm, engine, store, 3)
    }

    #[tokio::test]
    async fn test_first_round_is_static_and_bounded_to_three_points() {
        // One analyzer reply only: the first round must not consult the
        // strategist LLM at all.
        let llm = Arc::new(ScriptedLlm::new(vec![GIVE_UP_REPLY]));
        let engine = Arc::new(ScriptedEngine::new(vec![probe_result("{{1}}", "sleep(5)#")]));
        let store = Arc::new(MemoryStore::new());
        let ctx = scan_context("http://vuln.test/q?a=1&b=2&c=3&d=4");

        let state = worker(llm.clone(), engine.clone(), store).run(&ctx).await;

        assert_eq!(state.next_step, Decision::GiveUp);
        let packets = engine.packets.lock().unwrap();
        assert_eq!(packets.len(), 1);
        // Four points derived, but the static wave covers only the first 3.
        assert_eq!(state.potential_points.len(), 4);
        assert_eq!(packets[0].test_cases.len(), 3);
        assert!(!packets[0].test_cases[0].payload.as_slice().is_empty());

        let calls = llm.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "SQLi_Analyzer");
    }

    #[tokio::test]
    async fn test_found_persists_finding() {
        let llm = Arc::new(ScriptedLlm::new(vec![FOUND_REPLY]));
        let engine = Arc::new(ScriptedEngine::new(vec![probe_result("{{1}}", "sleep(5)#")]));
        let store = Arc::new(MemoryStore::new());
        let ctx = scan_context("http://vuln.test/q?id=1");

        let state = worker(llm, engine, store.clone()).run(&ctx).await;

        assert_eq!(state.next_step, Decision::Found);
        assert_eq!(state.findings.len(), 1);
        let finding = &state.findings[0];
        assert_eq!(finding.vuln_type, "SQL Injection");
        assert_eq!(finding.parameter.as_deref(), Some("id"));
        assert_eq!(finding.severity, "high");

        let saved = store.saved_findings();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].0, "Default");
        assert_eq!(saved[0].1, *finding);
    }

    #[tokio::test]
    async fn test_retry_exhaustion_runs_exactly_three_rounds() {
        // Round 1: static wave, analyzer RETRY (count 1).
        // Rounds 2-3: strategist LLM + analyzer RETRY (counts 2, 3).
        // Router then forces terminal with no finding.
        let llm = Arc::new(ScriptedLlm::new(vec![
            RETRY_REPLY,
            LLM_PACKET,
            RETRY_REPLY,
            LLM_PACKET,
            RETRY_REPLY,
        ]));
        let engine = Arc::new(ScriptedEngine::new(vec![probe_result("{{1}}", "x")]));
        let store = Arc::new(MemoryStore::new());
        let ctx = scan_context("http://vuln.test/q?id=1");

        let state = worker(llm.clone(), engine.clone(), store.clone()).run(&ctx).await;

        assert_eq!(state.retry_count, 3);
        assert_eq!(state.analysis_feedback.len(), 3);
        assert!(state.findings.is_empty());
        assert!(store.saved_findings().is_empty());
        assert_eq!(state.next_step, Decision::Retry);
        assert_eq!(engine.packets.lock().unwrap().len(), 3);
        // Exactly five LLM calls: no fourth strategist round was attempted.
        assert_eq!(llm.calls.lock().unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_retry_feeds_feedback_and_history_into_next_strategy() {
        let llm = Arc::new(ScriptedLlm::new(vec![RETRY_REPLY, LLM_PACKET, GIVE_UP_REPLY]));
        let engine = Arc::new(ScriptedEngine::new(vec![probe_result("{{1}}", "sleep(5)#")]));
        let store = Arc::new(MemoryStore::new());
        let ctx = scan_context("http://vuln.test/q?id=1");

        let state = worker(llm.clone(), engine, store).run(&ctx).await;
        assert_eq!(state.retry_count, 1);

        let calls = llm.calls.lock().unwrap();
        // Second call is the strategist; it must see the first round's
        // feedback and probe history.
        assert_eq!(calls[1].0, "SQLi_Strategist");
        assert!(calls[1].1.contains("no signal, widen coverage"));
        assert!(calls[1].1.contains("sleep(5)#"));
    }

    #[tokio::test]
    async fn test_planned_data_cleared_after_each_round() {
        let llm = Arc::new(ScriptedLlm::new(vec![GIVE_UP_REPLY]));
        let engine = Arc::new(ScriptedEngine::new(vec![]));
        let store = Arc::new(MemoryStore::new());
        let ctx = scan_context("http://vuln.test/q?id=1");

        let state = worker(llm, engine, store).run(&ctx).await;
        assert!(state.planned_data.is_none());
    }

    #[tokio::test]
    async fn test_no_points_and_no_statics_short_circuits_execute() {
        // Strategist parse failure produces an empty packet; the engine must
        // never be called with it.
        let llm = Arc::new(ScriptedLlm::new(vec!["not json", GIVE_UP_REPLY]));
        let engine = Arc::new(ScriptedEngine::new(vec![]));
        let store = Arc::new(MemoryStore::new());
        // No query, no body: zero injection points, so the static wave is
        // skipped and the strategist runs (and fails to parse).
        let ctx = scan_context("http://vuln.test/plain");

        let state = worker(llm, engine.clone(), store).run(&ctx).await;
        assert!(engine.packets.lock().unwrap().is_empty());
        assert!(state.test_results.is_empty());
        assert_eq!(state.next_step, Decision::GiveUp);
    }

    #[test]
    fn test_diff_summary_slices_only_changed_responses() {
        let changed = probe_result("{{1}}", "x");
        let mut same = probe_result("{{1}}", "y");
        same.similarity = 1.0;

        let summary = diff_summary(&[changed, same], 10);
        assert!(summary[0].get("response_slice").is_some());
        assert_eq!(
            summary[0]["response_slice"].as_str().unwrap().chars().count(),
            10
        );
        assert!(summary[1].get("response_slice").is_none());
    }
}

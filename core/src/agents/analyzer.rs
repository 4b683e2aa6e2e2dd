use std::sync::Arc;

use log::{error, info, warn};
use serde::Deserialize;

use crate::core::Decision;
use crate::llm::{ChatMessage, LlmClient};

/// LLM-backed classifier of probe results into FOUND / RETRY / GIVE_UP.
pub struct Analyzer {
    llm: Arc<dyn LlmClient>,
}

/// The analyzer's verdict for one round, after reconciliation.
#[derive(Debug, Clone)]
pub struct AnalysisVerdict {
    pub is_vulnerable: bool,
    pub reasoning: String,
    pub vulnerable_parameter: Option<String>,
    pub payload: Option<String>,
    pub decision: Decision,
}

#[derive(Debug, Deserialize)]
struct RawVerdict {
    #[serde(default)]
    is_vulnerable: bool,
    #[serde(default)]
    reasoning: Option<String>,
    #[serde(default)]
    vulnerable_parameter: Option<String>,
    #[serde(default)]
    payload: Option<String>,
    #[serde(default)]
    decision: Option<String>,
}

impl Analyzer {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    /// Runs the vuln-specific analysis prompt over the round's result
    /// summary. Transport or parse failures degrade to a GIVE_UP verdict so
    /// a broken oracle can never spin a worker forever.
    pub async fn analyze(
        &self,
        agent_name: &str,
        request_id: &str,
        system_prompt: &str,
        user_content: String,
        vuln_label: &str,
    ) -> AnalysisVerdict {
        let messages = vec![
            ChatMessage::system(system_prompt),
            ChatMessage::user(user_content),
        ];

        let content = match self
            .llm
            .chat(agent_name, request_id, &messages, true)
            .await
        {
            Ok(content) => content,
            Err(e) => {
                error!("[{}] analyzer call failed: {}", vuln_label, e);
                return give_up(format!("LLM call failed: {}", e));
            }
        };

        let raw = match serde_json::from_str::<RawVerdict>(&content) {
            Ok(raw) => raw,
            Err(e) => {
                error!(
                    "[{}] analyzer reply did not parse: {} | content: {:.100}",
                    vuln_label, e, content
                );
                return give_up(format!("JSON parse error: {}", e));
            }
        };

        let mut decision = Decision::parse(raw.decision.as_deref().unwrap_or(""));
        if !raw.is_vulnerable && decision == Decision::Found {
            warn!(
                "[{}] analyzer contradicted itself (not vulnerable + FOUND); forcing GIVE_UP",
                vuln_label
            );
            decision = Decision::GiveUp;
        }

        let reasoning = raw
            .reasoning
            .unwrap_or_else(|| "No reasoning provided".to_string());
        info!(
            "[{}] analysis done | vulnerable: {} | decision: {} | reasoning: {}",
            vuln_label, raw.is_vulnerable, decision, reasoning
        );

        AnalysisVerdict {
            is_vulnerable: raw.is_vulnerable,
            reasoning,
            vulnerable_parameter: raw.vulnerable_parameter,
            payload: raw.payload,
            decision,
        }
    }
}

fn give_up(reasoning: String) -> AnalysisVerdict {
    AnalysisVerdict {
        is_vulnerable: false,
        reasoning,
        vulnerable_parameter: None,
        payload: None,
        decision: Decision::GiveUp,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::testing::ScriptedLlm;

    async fn run(reply: &str) -> AnalysisVerdict {
        let analyzer = Analyzer::new(Arc::new(ScriptedLlm::new(vec![reply])));
        analyzer
            .analyze("SQLi_Analyzer", "rid", "system", "results".to_string(), "SQLi")
            .await
    }

    #[tokio::test]
    async fn test_found_verdict_passes_through() {
        let verdict = run(
            r#"{"is_vulnerable": true, "reasoning": "time delay", "vulnerable_parameter": "id", "payload": "sleep(5)#", "decision": "FOUND"}"#,
        )
        .await;
        assert!(verdict.is_vulnerable);
        assert_eq!(verdict.decision, Decision::Found);
        assert_eq!(verdict.vulnerable_parameter.as_deref(), Some("id"));
    }

    #[tokio::test]
    async fn test_self_contradiction_is_forced_to_give_up() {
        let verdict = run(
            r#"{"is_vulnerable": false, "reasoning": "looks odd", "decision": "FOUND"}"#,
        )
        .await;
        assert!(!verdict.is_vulnerable);
        assert_eq!(verdict.decision, Decision::GiveUp);
    }

    #[tokio::test]
    async fn test_parse_failure_gives_up() {
        let verdict = run("absolutely not json").await;
        assert!(!verdict.is_vulnerable);
        assert_eq!(verdict.decision, Decision::GiveUp);
        assert!(verdict.reasoning.contains("JSON parse error"));
    }

    #[tokio::test]
    async fn test_llm_failure_gives_up() {
        let analyzer = Analyzer::new(Arc::new(ScriptedLlm::failing()));
        let verdict = analyzer
            .analyze("XSS_Analyzer", "rid", "system", "results".to_string(), "XSS")
            .await;
        assert_eq!(verdict.decision, Decision::GiveUp);
        assert!(verdict.reasoning.contains("LLM call failed"));
    }

    #[tokio::test]
    async fn test_retry_keeps_reasoning() {
        let verdict = run(
            r#"{"is_vulnerable": false, "reasoning": "WAF suspected, try encodings", "decision": "retry"}"#,
        )
        .await;
        assert_eq!(verdict.decision, Decision::Retry);
        assert_eq!(verdict.reasoning, "WAF suspected, try encodings");
    }
}

use std::sync::Arc;

use log::{error, info};
use serde::Deserialize;

use crate::agents::state::ProbeSummary;
use crate::agents::ScanContext;
use crate::core::template::{InjectionPoint, RequestTemplate, StructuredPacket, TestCase};
use crate::llm::{ChatMessage, LlmClient};

/// LLM-backed generator of structured packets: a request template with
/// `{{…}}` placeholders plus the test cases that target them.
pub struct Strategist {
    llm: Arc<dyn LlmClient>,
}

#[derive(Debug, Default, Deserialize)]
struct RawPacket {
    #[serde(default)]
    request: Option<RequestTemplate>,
    #[serde(default)]
    test_cases: Vec<TestCase>,
}

impl Strategist {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    /// Asks the model for the next probe wave. Any failure (transport or
    /// parse) degrades to an empty packet: the executor then short-circuits
    /// and the analyzer treats the round as noise.
    pub async fn generate(
        &self,
        vuln_label: &str,
        system_prompt: &str,
        ctx: &ScanContext,
        points: &[InjectionPoint],
        feedback: &[String],
        history: &[ProbeSummary],
    ) -> StructuredPacket {
        let fallback = RequestTemplate {
            method: ctx.method.clone(),
            target_url: ctx.target_url.clone(),
            headers: ctx.headers.clone(),
            body: ctx.body.clone(),
        };

        let messages = vec![
            ChatMessage::system(system_prompt),
            ChatMessage::user(user_content(ctx, points, feedback, history)),
        ];

        let agent_name = format!("{}_Strategist", vuln_label);
        let content = match self
            .llm
            .chat(&agent_name, &ctx.request_id, &messages, true)
            .await
        {
            Ok(content) => content,
            Err(e) => {
                error!("[{}] payload generation failed: {}", vuln_label, e);
                return StructuredPacket::empty(fallback);
            }
        };

        match serde_json::from_str::<RawPacket>(&content) {
            Ok(raw) => {
                let packet = StructuredPacket {
                    request: raw.request.unwrap_or(fallback),
                    test_cases: raw.test_cases,
                };
                info!(
                    "[{}] strategy ready | test cases: {}",
                    vuln_label,
                    packet.test_cases.len()
                );
                packet
            }
            Err(e) => {
                error!("[{}] strategist reply did not parse: {}", vuln_label, e);
                StructuredPacket::empty(fallback)
            }
        }
    }
}

fn user_content(
    ctx: &ScanContext,
    points: &[InjectionPoint],
    feedback: &[String],
    history: &[ProbeSummary],
) -> String {
    let mut content = String::from("### Target context\n");
    content.push_str(&format!(
        "Original request: {}\n",
        ctx.full_request_json()
    ));

    content.push_str("Potential probe points:\n");
    for point in points {
        content.push_str(&format!(
            "- parameter: {}, original value: {}, kind: {}, suggested placeholder: {}\n",
            point.name, point.original_value, point.kind, point.placeholder
        ));
    }

    if !feedback.is_empty() {
        content.push_str(&format!("Analyzer feedback: {:?}\n", feedback));
    }

    if !history.is_empty() {
        content.push_str(&format!(
            "Probe history summary:\n{}\n",
            serde_json::to_string(history).unwrap_or_else(|_| "[]".to_string())
        ));
    }

    content
}

pub mod analyzer;
pub mod fuzz;
pub mod manager;
pub mod orchestrator;
pub mod sqli;
pub mod state;
pub mod strategist;
pub mod worker;
pub mod xss;

use std::collections::BTreeMap;

use serde_json::json;
use url::Url;

use crate::core::FullRequest;

/// Immutable description of the scan target handed to the manager and to
/// each spawned worker.
#[derive(Debug, Clone)]
pub struct ScanContext {
    pub request_id: String,
    pub project_name: String,
    pub target_url: String,
    pub method: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<String>,
    pub response_headers: BTreeMap<String, String>,
    pub response_body: String,
}

impl ScanContext {
    pub fn host(&self) -> String {
        if let Ok(url) = Url::parse(&self.target_url) {
            if let Some(host) = url.host_str() {
                return host.to_string();
            }
        }
        // Schemeless capture: everything before the first slash.
        self.target_url
            .split('/')
            .next()
            .unwrap_or(&self.target_url)
            .to_string()
    }

    pub fn full_request(&self) -> FullRequest {
        FullRequest {
            method: self.method.clone(),
            url: self.target_url.clone(),
            headers: self.headers.clone(),
            body: self.body.clone(),
        }
    }

    pub fn full_request_json(&self) -> serde_json::Value {
        json!({
            "method": self.method,
            "url": self.target_url,
            "headers": self.headers,
            "body": self.body,
        })
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    use anyhow::{bail, Result};
    use async_trait::async_trait;

    use super::ScanContext;
    use crate::llm::{ChatMessage, LlmClient};

    /// Scripted LLM: pops one canned reply per call and records the request.
    pub struct ScriptedLlm {
        replies: Mutex<Vec<Result<String, String>>>,
        pub calls: Mutex<Vec<(String, String)>>,
    }

    impl ScriptedLlm {
        pub fn new(replies: Vec<&str>) -> Self {
            Self {
                replies: Mutex::new(replies.into_iter().rev().map(|r| Ok(r.to_string())).collect()),
                calls: Mutex::new(Vec::new()),
            }
        }

        pub fn failing() -> Self {
            Self {
                replies: Mutex::new(Vec::new()),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        async fn chat(
            &self,
            agent_name: &str,
            _task_id: &str,
            messages: &[ChatMessage],
            _json_reply: bool,
        ) -> Result<String> {
            let prompt = messages
                .iter()
                .map(|m| m.content.clone())
                .collect::<Vec<_>>()
                .join("\n");
            self.calls
                .lock()
                .unwrap()
                .push((agent_name.to_string(), prompt));
            match self.replies.lock().unwrap().pop() {
                Some(Ok(reply)) => Ok(reply),
                Some(Err(e)) => bail!(e),
                None => bail!("scripted LLM ran out of replies"),
            }
        }
    }

    pub fn scan_context(url: &str) -> ScanContext {
        ScanContext {
            request_id: "test-request".to_string(),
            project_name: "Default".to_string(),
            target_url: url.to_string(),
            method: "GET".to_string(),
            headers: BTreeMap::new(),
            body: None,
            response_headers: BTreeMap::new(),
            response_body: "<html>baseline</html>".to_string(),
        }
    }

    /// Scripted probe engine: returns canned results and records every
    /// packet it was asked to execute.
    pub struct ScriptedEngine {
        results: Vec<crate::core::executor::ProbeResult>,
        pub packets: Mutex<Vec<crate::core::template::StructuredPacket>>,
    }

    impl ScriptedEngine {
        pub fn new(results: Vec<crate::core::executor::ProbeResult>) -> Self {
            Self {
                results,
                packets: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl crate::core::executor::ProbeEngine for ScriptedEngine {
        async fn execute(
            &self,
            packet: &crate::core::template::StructuredPacket,
            _points: &[crate::core::template::InjectionPoint],
            _baseline: Option<&str>,
        ) -> Vec<crate::core::executor::ProbeResult> {
            self.packets.lock().unwrap().push(packet.clone());
            self.results.clone()
        }
    }

    pub fn probe_result(parameter: &str, payload: &str) -> crate::core::executor::ProbeResult {
        crate::core::executor::ProbeResult {
            parameter: parameter.to_string(),
            payload: payload.to_string(),
            response: "<html>something changed</html>".to_string(),
            status: 200,
            elapsed: 0.1,
            len_diff: 12,
            similarity: 0.8123,
        }
    }
}

use std::sync::Arc;

use log::{error, info, warn};

use crate::agents::ScanContext;
use crate::core::VulnKind;
use crate::llm::{ChatMessage, LlmClient};
use crate::prompts::MANAGER_PROMPT;
use crate::whitelist_permits;

/// Top-level triage: inspects a captured request/response pair and decides
/// which vuln workers to dispatch.
pub struct Manager {
    llm: Arc<dyn LlmClient>,
    whitelist: Vec<String>,
}

impl Manager {
    pub fn new(llm: Arc<dyn LlmClient>, whitelist: Vec<String>) -> Self {
        Self { llm, whitelist }
    }

    pub async fn analyze(&self, ctx: &ScanContext) -> Vec<VulnKind> {
        // Defense in depth: the interceptor already gated on the whitelist,
        // but a task may have been enqueued by other means.
        let host = ctx.host();
        if !whitelist_permits(&self.whitelist, &host) {
            warn!("Manager gate: target {} is not whitelisted, refusing", host);
            return Vec::new();
        }

        let user_content = format!(
            "### Request\nMethod: {}\nURL: {}\nHeaders: {:?}\nBody: {}\n\n\
             ### Response (Context)\nHeaders: {:?}\nBody: {}",
            ctx.method,
            ctx.target_url,
            ctx.headers,
            ctx.body.as_deref().unwrap_or("None"),
            ctx.response_headers,
            ctx.response_body,
        );
        let messages = vec![
            ChatMessage::system(MANAGER_PROMPT),
            ChatMessage::user(user_content),
        ];

        let content = match self
            .llm
            .chat("Manager", &ctx.request_id, &messages, false)
            .await
        {
            Ok(content) => content,
            Err(e) => {
                error!("Manager triage failed: {}", e);
                return Vec::new();
            }
        };

        let tasks = parse_tasks(&content);
        info!("Manager decision for {}: {:?}", ctx.target_url, tasks);
        tasks
    }
}

/// Parses the manager's comma-separated reply. `none` or unknown tokens
/// yield no tasks; duplicates collapse.
pub fn parse_tasks(content: &str) -> Vec<VulnKind> {
    let content = content.trim().to_lowercase();
    if content == "none" {
        return Vec::new();
    }
    let mut tasks = Vec::new();
    for token in content.split(',') {
        if let Some(kind) = VulnKind::parse(token) {
            if !tasks.contains(&kind) {
                tasks.push(kind);
            }
        }
    }
    tasks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::testing::{scan_context, ScriptedLlm};

    #[test]
    fn test_parse_tasks_handles_noise() {
        assert_eq!(
            parse_tasks("sqli, xss ,fuzz"),
            vec![VulnKind::Sqli, VulnKind::Xss, VulnKind::Fuzz]
        );
        assert_eq!(parse_tasks("SQLI,rce,unknown"), vec![VulnKind::Sqli]);
        assert_eq!(parse_tasks("none"), Vec::<VulnKind>::new());
        assert_eq!(parse_tasks("  NONE "), Vec::<VulnKind>::new());
        assert_eq!(parse_tasks("sqli,sqli"), vec![VulnKind::Sqli]);
    }

    #[tokio::test]
    async fn test_whitelisted_request_is_triaged() {
        let llm = Arc::new(ScriptedLlm::new(vec!["sqli,fuzz"]));
        let manager = Manager::new(llm.clone(), vec!["vuln.test".to_string()]);
        let ctx = scan_context("http://vuln.test/q?id=1");

        let tasks = manager.analyze(&ctx).await;
        assert_eq!(tasks, vec![VulnKind::Sqli, VulnKind::Fuzz]);

        let calls = llm.calls.lock().unwrap();
        assert_eq!(calls[0].0, "Manager");
        assert!(calls[0].1.contains("URL: http://vuln.test/q?id=1"));
    }

    #[tokio::test]
    async fn test_empty_whitelist_inhibits_without_llm_call() {
        let llm = Arc::new(ScriptedLlm::new(vec!["sqli"]));
        let manager = Manager::new(llm.clone(), Vec::new());
        let ctx = scan_context("http://vuln.test/q?id=1");

        assert!(manager.analyze(&ctx).await.is_empty());
        assert!(llm.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_llm_failure_yields_no_tasks() {
        let manager = Manager::new(
            Arc::new(ScriptedLlm::failing()),
            vec!["vuln.test".to_string()],
        );
        let ctx = scan_context("http://vuln.test/q?id=1");
        assert!(manager.analyze(&ctx).await.is_empty());
    }
}

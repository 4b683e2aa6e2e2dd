use std::sync::Arc;

use async_trait::async_trait;
use log::error;
use serde_json::json;

use crate::agents::worker::{diff_summary, head_chars, VulnProfile};
use crate::agents::ScanContext;
use crate::core::executor::ProbeResult;
use crate::core::VulnKind;
use crate::prompts::{FUZZ_ANALYZER_PROMPT, FUZZ_GENERATOR_PROMPT};
use crate::store::HostParamIndex;

/// Parameter/value fuzzing profile. No static wave: every round goes to the
/// strategist, which receives the host's learned parameter dictionary for
/// name discovery and HPP probing.
pub struct FuzzProfile {
    params: Arc<dyn HostParamIndex>,
}

impl FuzzProfile {
    pub fn new(params: Arc<dyn HostParamIndex>) -> Self {
        Self { params }
    }
}

#[async_trait]
impl VulnProfile for FuzzProfile {
    fn kind(&self) -> VulnKind {
        VulnKind::Fuzz
    }

    fn label(&self) -> &'static str {
        "Fuzz"
    }

    fn finding_type(&self) -> &'static str {
        "Anomaly/Vulnerability"
    }

    async fn generator_prompt(&self, ctx: &ScanContext) -> String {
        let host = ctx.host();
        let history_params = match self.params.params_for(&host).await {
            Ok(params) => params,
            Err(e) => {
                error!("Failed to fetch history params for {}: {}", host, e);
                Vec::new()
            }
        };
        let dictionary = if history_params.is_empty() {
            "None".to_string()
        } else {
            history_params.join(", ")
        };
        FUZZ_GENERATOR_PROMPT.replacen("{history_params}", &dictionary, 1)
    }

    fn analyzer_prompt(&self) -> &'static str {
        FUZZ_ANALYZER_PROMPT
    }

    fn analyzer_user_content(&self, ctx: &ScanContext, results: &[ProbeResult]) -> String {
        let summary = diff_summary(results, 500);
        format!(
            "Original response snippet: {}\nTest results: {}",
            head_chars(&ctx.response_body, 500),
            json!(summary)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::testing::scan_context;
    use crate::store::memory::MemoryStore;

    #[tokio::test]
    async fn test_generator_prompt_embeds_host_dictionary() {
        let store = Arc::new(MemoryStore::new());
        store
            .learn(
                "vuln.test",
                &["user_id".to_string(), "page".to_string()],
            )
            .await
            .unwrap();

        let profile = FuzzProfile::new(store);
        let ctx = scan_context("http://vuln.test/api/list?q=x");
        let prompt = profile.generator_prompt(&ctx).await;

        assert!(prompt.contains("Host history params: page, user_id"));
        assert!(!prompt.contains("{history_params}"));
    }

    #[tokio::test]
    async fn test_generator_prompt_without_history_says_none() {
        let profile = FuzzProfile::new(Arc::new(MemoryStore::new()));
        let ctx = scan_context("http://fresh.test/api");
        let prompt = profile.generator_prompt(&ctx).await;
        assert!(prompt.contains("Host history params: None"));
    }

    #[test]
    fn test_no_static_payloads() {
        let profile = FuzzProfile::new(Arc::new(MemoryStore::new()));
        assert!(profile.static_payloads().is_empty());
    }
}

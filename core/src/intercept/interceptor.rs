use std::sync::Arc;

use anyhow::Result;
use log::{debug, info, warn};
use serde_json::Value;

use crate::intercept::flow::FlowSnapshot;
use crate::store::{FingerprintStore, HostParamIndex, TaskQueue};
use crate::whitelist_permits;

/// Path suffixes that never carry injectable application logic.
const STATIC_ASSET_EXTENSIONS: &[&str] = &[
    ".js", ".css", ".png", ".jpg", ".gif", ".svg", ".woff", ".woff2", ".ico",
];

/// Filters intercepted flows, deduplicates them by fingerprint, learns
/// host-level parameter names and enqueues scan tasks.
///
/// Idempotent across duplicates: a fingerprint already in the store means the
/// flow was enqueued before and is dropped.
pub struct Interceptor {
    whitelist: Vec<String>,
    fingerprints: Arc<dyn FingerprintStore>,
    params: Arc<dyn HostParamIndex>,
    queue: Arc<dyn TaskQueue>,
    project_name: Option<String>,
}

impl Interceptor {
    pub fn new(
        whitelist: Vec<String>,
        fingerprints: Arc<dyn FingerprintStore>,
        params: Arc<dyn HostParamIndex>,
        queue: Arc<dyn TaskQueue>,
        project_name: Option<String>,
    ) -> Self {
        info!("Interceptor ready, whitelist: {:?}", whitelist);
        Self {
            whitelist,
            fingerprints,
            params,
            queue,
            project_name,
        }
    }

    /// Processes one captured flow. Returns `true` when a task was enqueued.
    pub async fn process_flow(&self, flow: &FlowSnapshot) -> Result<bool> {
        let host = &flow.request.pretty_host;
        if !whitelist_permits(&self.whitelist, host) {
            return Ok(false);
        }
        debug!("Processing whitelisted flow from {}", host);

        if is_static_asset(&flow.request.path) {
            return Ok(false);
        }

        let fingerprint = flow.fingerprint();
        if self.fingerprints.is_duplicate(&fingerprint).await? {
            debug!("Skipping duplicate request: {}", flow.request.pretty_url);
            return Ok(false);
        }

        let packet = flow.to_task_packet(self.project_name.as_deref());

        self.fingerprints.insert(&fingerprint).await?;

        // Parameter learning feeds the fuzz dictionary; it must never block
        // the enqueue.
        let params = param_names(&packet.url, &packet.body);
        if !params.is_empty() {
            if let Err(e) = self.params.learn(host, &params).await {
                warn!("Failed to learn host params for {}: {}", host, e);
            }
        }

        self.queue.push(&packet).await?;
        info!(
            "Captured and enqueued task: [{}] {}",
            packet.method, packet.url
        );
        Ok(true)
    }
}

fn is_static_asset(path: &str) -> bool {
    STATIC_ASSET_EXTENSIONS
        .iter()
        .any(|ext| path.ends_with(ext))
}

/// Every parameter name visible in the flow: query keys plus body keys
/// (JSON object first, form-urlencoded fallback).
fn param_names(url: &str, body: &str) -> Vec<String> {
    let mut names = Vec::new();

    if let Some((_, query)) = url.split_once('?') {
        for pair in query.split('&') {
            if let Some((name, _)) = pair.split_once('=') {
                if !name.is_empty() && !names.iter().any(|n| n == name) {
                    names.push(name.to_string());
                }
            }
        }
    }

    let body = body.trim();
    if !body.is_empty() {
        if body.starts_with('{') {
            if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(body) {
                for key in map.keys() {
                    if !names.iter().any(|n| n == key) {
                        names.push(key.clone());
                    }
                }
            }
        } else if body.contains('=') {
            for pair in body.split('&') {
                if let Some((name, _)) = pair.split_once('=') {
                    if !name.is_empty() && !names.iter().any(|n| n == name) {
                        names.push(name.to_string());
                    }
                }
            }
        }
    }

    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intercept::flow::{FlowRequest, FlowResponse};
    use crate::store::memory::MemoryStore;
    use std::collections::BTreeMap;

    fn flow(url: &str, host: &str, path: &str, body: Option<&str>) -> FlowSnapshot {
        FlowSnapshot {
            request: FlowRequest {
                method: "GET".to_string(),
                pretty_url: url.to_string(),
                pretty_host: host.to_string(),
                path: path.to_string(),
                headers: BTreeMap::new(),
                text: body.map(|b| b.to_string()),
            },
            response: Some(FlowResponse::default()),
        }
    }

    fn interceptor(whitelist: &[&str], store: &Arc<MemoryStore>) -> Interceptor {
        Interceptor::new(
            whitelist.iter().map(|s| s.to_string()).collect(),
            store.clone(),
            store.clone(),
            store.clone(),
            None,
        )
    }

    #[tokio::test]
    async fn test_non_whitelisted_host_is_rejected_without_side_effects() {
        let store = Arc::new(MemoryStore::new());
        let interceptor = interceptor(&["example.com"], &store);

        let flow = flow("http://evil.com/", "evil.com", "/", None);
        assert!(!interceptor.process_flow(&flow).await.unwrap());
        assert!(store.queued().is_empty());
        assert_eq!(store.fingerprint_count(), 0);
    }

    #[tokio::test]
    async fn test_empty_whitelist_rejects_everything() {
        let store = Arc::new(MemoryStore::new());
        let interceptor = interceptor(&[], &store);

        let flow = flow("http://example.com/", "example.com", "/", None);
        assert!(!interceptor.process_flow(&flow).await.unwrap());
        assert!(store.queued().is_empty());
    }

    #[tokio::test]
    async fn test_static_assets_are_dropped() {
        let store = Arc::new(MemoryStore::new());
        let interceptor = interceptor(&["example.com"], &store);

        for path in ["/app.css", "/bundle.js", "/logo.png", "/font.woff2"] {
            let url = format!("https://example.com{}", path);
            let flow = flow(&url, "example.com", path, None);
            assert!(!interceptor.process_flow(&flow).await.unwrap(), "{}", path);
        }
        assert!(store.queued().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_flows_enqueue_once() {
        let store = Arc::new(MemoryStore::new());
        let interceptor = interceptor(&["vuln.test"], &store);

        let flow = flow("http://vuln.test/q?id=1", "vuln.test", "/q", None);
        assert!(interceptor.process_flow(&flow).await.unwrap());
        assert!(!interceptor.process_flow(&flow).await.unwrap());
        assert_eq!(store.queued().len(), 1);
        assert!(store
            .is_duplicate(&flow.fingerprint())
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_replaying_a_capture_list_is_idempotent() {
        let store = Arc::new(MemoryStore::new());
        let interceptor = interceptor(&["vuln.test"], &store);

        let flows = vec![
            flow("http://vuln.test/a?x=1", "vuln.test", "/a", None),
            flow("http://vuln.test/b?y=2", "vuln.test", "/b", None),
        ];
        for f in flows.iter().chain(flows.iter()) {
            let _ = interceptor.process_flow(f).await.unwrap();
        }
        assert_eq!(store.queued().len(), 2);
    }

    #[tokio::test]
    async fn test_param_learning_unions_across_flows() {
        let store = Arc::new(MemoryStore::new());
        let interceptor = interceptor(&["vuln.test"], &store);

        let first = flow("http://vuln.test/q?id=1&q=hi", "vuln.test", "/q", None);
        let second = flow(
            "http://vuln.test/login",
            "vuln.test",
            "/login",
            Some("username=a&password=b"),
        );
        interceptor.process_flow(&first).await.unwrap();
        interceptor.process_flow(&second).await.unwrap();

        let learned = store.params_for("vuln.test").await.unwrap();
        assert_eq!(learned, vec!["id", "password", "q", "username"]);
    }

    #[tokio::test]
    async fn test_json_body_params_learned() {
        let store = Arc::new(MemoryStore::new());
        let interceptor = interceptor(&["vuln.test"], &store);

        let flow = flow(
            "http://vuln.test/api",
            "vuln.test",
            "/api",
            Some(r#"{"user": "a", "token": "b"}"#),
        );
        interceptor.process_flow(&flow).await.unwrap();

        let learned = store.params_for("vuln.test").await.unwrap();
        assert_eq!(learned, vec!["token", "user"]);
    }

    #[test]
    fn test_param_names_prefers_json_over_form() {
        let names = param_names("http://vuln.test/x", r#"{"a": 1}"#);
        assert_eq!(names, vec!["a"]);

        let names = param_names("http://vuln.test/x", "a=1&b=2");
        assert_eq!(names, vec!["a", "b"]);
    }
}

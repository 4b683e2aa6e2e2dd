use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// One request/response pair as delivered by the intercepting proxy. The
/// scanner never modifies or replays the flow itself; it only snapshots it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowSnapshot {
    pub request: FlowRequest,
    #[serde(default)]
    pub response: Option<FlowResponse>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowRequest {
    pub method: String,
    pub pretty_url: String,
    pub pretty_host: String,
    pub path: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlowResponse {
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub text: Option<String>,
}

impl FlowSnapshot {
    pub fn body(&self) -> &str {
        self.request.text.as_deref().unwrap_or("")
    }

    pub fn fingerprint(&self) -> String {
        fingerprint(
            &self.request.method,
            &self.request.pretty_url,
            self.body().as_bytes(),
        )
    }

    /// Projects the flow into the queue packet consumed by the task runner.
    pub fn to_task_packet(&self, project_name: Option<&str>) -> TaskPacket {
        TaskPacket {
            url: self.request.pretty_url.clone(),
            method: self.request.method.clone(),
            headers: self.request.headers.clone(),
            body: self.body().to_string(),
            response_headers: self
                .response
                .as_ref()
                .map(|r| r.headers.clone())
                .unwrap_or_default(),
            response_body: self
                .response
                .as_ref()
                .and_then(|r| r.text.clone())
                .unwrap_or_default(),
            fingerprint: self.fingerprint(),
            project_name: project_name.map(|p| p.to_string()),
        }
    }
}

/// The JSON packet enqueued per captured flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskPacket {
    pub url: String,
    pub method: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub response_headers: BTreeMap<String, String>,
    #[serde(default)]
    pub response_body: String,
    pub fingerprint: String,
    #[serde(default)]
    pub project_name: Option<String>,
}

/// Stable request digest: SHA-256 over `method | url | md5(body)`. An absent
/// body hashes as the literal `"empty"` so GETs stay distinguishable from
/// each other only by method and URL.
pub fn fingerprint(method: &str, url: &str, body: &[u8]) -> String {
    let body_hash = if body.is_empty() {
        "empty".to_string()
    } else {
        format!("{:x}", md5::compute(body))
    };
    let mut hasher = Sha256::new();
    hasher.update(format!("{}|{}|{}", method, url, body_hash));
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn snapshot(url: &str, host: &str, path: &str) -> FlowSnapshot {
        FlowSnapshot {
            request: FlowRequest {
                method: "GET".to_string(),
                pretty_url: url.to_string(),
                pretty_host: host.to_string(),
                path: path.to_string(),
                headers: BTreeMap::new(),
                text: None,
            },
            response: Some(FlowResponse {
                headers: BTreeMap::new(),
                text: Some("<html>baseline</html>".to_string()),
            }),
        }
    }

    #[test]
    fn test_fingerprint_is_stable() {
        let a = fingerprint("GET", "http://vuln.test/q?id=1", b"");
        let b = fingerprint("GET", "http://vuln.test/q?id=1", b"");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_fingerprint_varies_with_method_url_and_body() {
        let base = fingerprint("GET", "http://vuln.test/q?id=1", b"");
        assert_ne!(base, fingerprint("POST", "http://vuln.test/q?id=1", b""));
        assert_ne!(base, fingerprint("GET", "http://vuln.test/q?id=2", b""));
        assert_ne!(base, fingerprint("GET", "http://vuln.test/q?id=1", b"a=1"));
    }

    #[test]
    fn test_task_packet_projection() {
        let flow = snapshot("http://vuln.test/q?id=1", "vuln.test", "/q");
        let packet = flow.to_task_packet(Some("demo"));
        assert_eq!(packet.url, "http://vuln.test/q?id=1");
        assert_eq!(packet.response_body, "<html>baseline</html>");
        assert_eq!(packet.fingerprint, flow.fingerprint());
        assert_eq!(packet.project_name.as_deref(), Some("demo"));
    }
}

use std::collections::BTreeMap;
use std::time::Duration;

use log::{debug, warn};
use rand::prelude::IndexedRandom;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, ClientBuilder, Method, Proxy, Response};

/// HTTP client for scan probes. TLS verification is disabled (targets are
/// frequently self-signed test environments) and all traffic can be routed
/// through an upstream proxy for inspection.
pub struct ProbeClient {
    inner: Client,
    user_agents: Vec<&'static str>,
}

impl ProbeClient {
    pub fn new(timeout: Duration, proxy_url: Option<&str>) -> Self {
        let mut builder = ClientBuilder::new()
            .timeout(timeout)
            .danger_accept_invalid_certs(true);

        if let Some(proxy) = proxy_url {
            match Proxy::all(proxy) {
                Ok(p) => builder = builder.proxy(p),
                Err(e) => warn!("Ignoring unusable scan proxy {}: {}", proxy, e),
            }
        }

        let inner = builder.build().expect("failed to build reqwest client");

        let user_agents = vec![
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
             (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:120.0) \
             Gecko/20100101 Firefox/120.0",
            "Mozilla/5.0 (Macintosh; Intel Mac OS X 13_0) AppleWebKit/605.1.15 \
             (KHTML, like Gecko) Version/17.0 Safari/605.1.15",
        ];

        Self { inner, user_agents }
    }

    /// Sends one probe. The body goes out as raw bytes so that payloads with
    /// structural characters survive byte-for-byte; replayed headers that do
    /// not form valid header names/values are skipped with a warning.
    pub async fn send(
        &self,
        method: &str,
        url: &str,
        headers: &BTreeMap<String, String>,
        body: Option<Vec<u8>>,
    ) -> Result<Response, reqwest::Error> {
        let method = Method::from_bytes(method.to_uppercase().as_bytes())
            .unwrap_or(Method::GET);
        debug!("probe {} {}", method, url);

        let mut header_map = HeaderMap::new();
        for (name, value) in headers {
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                (Ok(n), Ok(v)) => {
                    header_map.append(n, v);
                }
                _ => warn!("Skipping unreplayable header {}", name),
            }
        }

        let mut builder = self.inner.request(method, url).headers(header_map);

        if !headers.keys().any(|k| k.eq_ignore_ascii_case("user-agent")) {
            builder = builder.header(reqwest::header::USER_AGENT, self.random_user_agent());
        }

        if let Some(bytes) = body {
            builder = builder.body(bytes);
        }

        builder.send().await
    }

    fn random_user_agent(&self) -> &'static str {
        let mut rng = rand::rng();
        self.user_agents.choose(&mut rng).copied().unwrap_or("Mozilla/5.0")
    }
}

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::future::join_all;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;

use crate::core::diff;
use crate::core::template::{restore_map, InjectionPoint, StructuredPacket, Tokenized};
use crate::http::ProbeClient;

/// Response marker for a probe that hit the read timeout. For time-based
/// blind SQLi this is the success signal, not a failure.
pub const TIMEOUT_MARKER: &str = "TIMEOUT_TRIGGERED";

/// Outcome of a single probe, diffed against the baseline response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeResult {
    pub parameter: String,
    pub payload: String,
    pub response: String,
    pub status: u16,
    pub elapsed: f64,
    #[serde(default)]
    pub len_diff: i64,
    #[serde(default)]
    pub similarity: f64,
}

impl ProbeResult {
    pub fn timed_out(&self) -> bool {
        self.status == 0 && self.response == TIMEOUT_MARKER
    }
}

/// Seam between the vuln workers and the network. The HTTP implementation
/// below is the production engine; worker tests script this trait instead.
#[async_trait]
pub trait ProbeEngine: Send + Sync {
    async fn execute(
        &self,
        packet: &StructuredPacket,
        points: &[InjectionPoint],
        baseline: Option<&str>,
    ) -> Vec<ProbeResult>;
}

/// Bounded-concurrency prober over a placeholder template.
///
/// Every probe perturbs exactly one injection point: the active placeholder
/// becomes the payload, every other placeholder is restored to its original
/// value before the request goes on the wire.
pub struct HttpProbeExecutor {
    client: Arc<ProbeClient>,
    timeout_secs: f64,
    semaphore: Arc<Semaphore>,
}

impl HttpProbeExecutor {
    pub fn new(timeout_secs: f64, proxy: Option<&str>, max_concurrency: usize) -> Self {
        Self {
            client: Arc::new(ProbeClient::new(
                Duration::from_secs_f64(timeout_secs),
                proxy,
            )),
            timeout_secs,
            semaphore: Arc::new(Semaphore::new(max_concurrency.max(1))),
        }
    }
}

#[async_trait]
impl ProbeEngine for HttpProbeExecutor {
    async fn execute(
        &self,
        packet: &StructuredPacket,
        points: &[InjectionPoint],
        baseline: Option<&str>,
    ) -> Vec<ProbeResult> {
        if packet.test_cases.is_empty() {
            warn!("Probe engine received an empty structured packet");
            return Vec::new();
        }

        let declared = packet.request.placeholders();
        let valid_cases: Vec<_> = packet
            .test_cases
            .iter()
            .filter(|case| {
                let known = declared.contains(&case.parameter);
                if !known {
                    warn!(
                        "Dropping test case for undeclared placeholder {}",
                        case.parameter
                    );
                }
                known
            })
            .collect();

        if valid_cases.is_empty() {
            warn!("No test case targets a declared placeholder; nothing to probe");
            return Vec::new();
        }

        let originals = restore_map(points);
        let clean_headers = packet.request.sanitized_headers();
        let encode_body = packet.request.body_wants_url_encoding();

        let url_tokens = Tokenized::parse(&packet.request.target_url);
        let header_tokens: Vec<(String, Tokenized)> = clean_headers
            .iter()
            .map(|(name, value)| (name.clone(), Tokenized::parse(value)))
            .collect();
        let body_tokens = packet.request.body.as_deref().map(Tokenized::parse);

        let mut probes = Vec::new();
        for case in valid_cases {
            for payload in case.payload.as_slice() {
                let url = url_tokens.render(&case.parameter, payload, &originals, true);
                let headers: BTreeMap<String, String> = header_tokens
                    .iter()
                    .map(|(name, tokens)| {
                        (
                            name.clone(),
                            tokens.render(&case.parameter, payload, &originals, false),
                        )
                    })
                    .collect();
                let body = body_tokens
                    .as_ref()
                    .map(|tokens| tokens.render(&case.parameter, payload, &originals, encode_body));

                probes.push(self.run_probe(
                    packet.request.method.clone(),
                    url,
                    headers,
                    body,
                    case.parameter.clone(),
                    payload.clone(),
                    baseline,
                ));
            }
        }

        debug!("Dispatching {} probe(s)", probes.len());
        join_all(probes).await
    }
}

impl HttpProbeExecutor {
    #[allow(clippy::too_many_arguments)]
    async fn run_probe(
        &self,
        method: String,
        url: String,
        headers: BTreeMap<String, String>,
        body: Option<String>,
        parameter: String,
        payload: String,
        baseline: Option<&str>,
    ) -> ProbeResult {
        let _permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .expect("probe semaphore closed unexpectedly");

        let started = Instant::now();
        let sent = self
            .client
            .send(&method, &url, &headers, body.map(String::into_bytes))
            .await;

        match sent {
            Ok(response) => {
                let status = response.status().as_u16();
                match response.text().await {
                    Ok(text) => {
                        let elapsed = started.elapsed().as_secs_f64();
                        let (len_diff, similarity) = match baseline {
                            Some(base) => (diff::len_diff(&text, base), diff::similarity(base, &text)),
                            None => (0, 0.0),
                        };
                        ProbeResult {
                            parameter,
                            payload,
                            response: text,
                            status,
                            elapsed,
                            len_diff,
                            similarity,
                        }
                    }
                    Err(e) => self.failure_result(parameter, payload, e),
                }
            }
            Err(e) => self.failure_result(parameter, payload, e),
        }
    }

    fn failure_result(&self, parameter: String, payload: String, error: reqwest::Error) -> ProbeResult {
        if error.is_timeout() {
            warn!("Probe timed out | point: {} | payload: {}", parameter, payload);
            return ProbeResult {
                parameter,
                payload,
                response: TIMEOUT_MARKER.to_string(),
                status: 0,
                elapsed: self.timeout_secs,
                len_diff: 0,
                similarity: 0.0,
            };
        }
        warn!("Probe failed ({}): {}", parameter, error);
        ProbeResult {
            parameter,
            payload,
            response: format!("Error: {}", error),
            status: 0,
            elapsed: 0.0,
            len_diff: 0,
            similarity: 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::template::{RequestTemplate, TestCase};
    use std::net::SocketAddr;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::sync::mpsc;

    /// Minimal HTTP server: captures each raw request and answers with the
    /// given body, optionally after a delay.
    async fn spawn_server(
        body: &'static str,
        delay: Option<Duration>,
    ) -> (SocketAddr, mpsc::UnboundedReceiver<String>) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            loop {
                let Ok((mut sock, _)) = listener.accept().await else {
                    return;
                };
                let tx = tx.clone();
                tokio::spawn(async move {
                    let raw = read_request(&mut sock).await;
                    let _ = tx.send(raw);
                    if let Some(delay) = delay {
                        tokio::time::sleep(delay).await;
                    }
                    let reply = format!(
                        "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                        body.len(),
                        body
                    );
                    let _ = sock.write_all(reply.as_bytes()).await;
                });
            }
        });

        (addr, rx)
    }

    async fn read_request(sock: &mut tokio::net::TcpStream) -> String {
        let mut data = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            let Ok(n) = sock.read(&mut buf).await else { break };
            if n == 0 {
                break;
            }
            data.extend_from_slice(&buf[..n]);
            if let Some(head_end) = find_blank_line(&data) {
                let head = String::from_utf8_lossy(&data[..head_end]).to_string();
                let content_length = head
                    .lines()
                    .find_map(|l| {
                        let (name, value) = l.split_once(':')?;
                        name.eq_ignore_ascii_case("content-length")
                            .then(|| value.trim().parse::<usize>().ok())?
                    })
                    .unwrap_or(0);
                if data.len() >= head_end + 4 + content_length {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&data).to_string()
    }

    fn find_blank_line(data: &[u8]) -> Option<usize> {
        data.windows(4).position(|w| w == b"\r\n\r\n")
    }

    fn query_packet(addr: SocketAddr) -> (StructuredPacket, Vec<InjectionPoint>) {
        let url = format!("http://{}/q?id=1&name=admin", addr);
        let points = crate::core::points::derive_injection_points(&url, None);
        let template = crate::core::points::build_first_round_template(
            "GET",
            &url,
            &BTreeMap::new(),
            None,
            &points,
        );
        let packet = StructuredPacket {
            request: template,
            test_cases: vec![TestCase::new("{{1}}", vec!["1' OR '1'='1".to_string()])],
        };
        (packet, points)
    }

    #[tokio::test]
    async fn test_probe_perturbs_only_active_placeholder() {
        let (addr, mut captured) = spawn_server("<html>ok</html>", None).await;
        let (packet, points) = query_packet(addr);

        let executor = HttpProbeExecutor::new(5.0, None, 5);
        let results = executor.execute(&packet, &points, Some("<html>ok</html>")).await;

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].status, 200);

        let raw = captured.recv().await.unwrap();
        let request_line = raw.lines().next().unwrap();
        // Active point carries the (encoded) payload, the other point is
        // restored, and no marker syntax leaks to the wire.
        assert!(request_line.contains("id=1%27%20OR%20%271%27=%271"));
        assert!(request_line.contains("name=admin"));
        assert!(!raw.contains("{{"));
    }

    #[tokio::test]
    async fn test_json_body_payload_goes_out_unencoded() {
        let (addr, mut captured) = spawn_server("{}", None).await;

        let url = format!("http://{}/api", addr);
        let body = r#"{"user":"alice"}"#;
        let points = crate::core::points::derive_injection_points(&url, Some(body));
        let mut headers = BTreeMap::new();
        headers.insert("Content-Type".to_string(), "application/json".to_string());
        let template = crate::core::points::build_first_round_template(
            "POST",
            &url,
            &headers,
            Some(body),
            &points,
        );
        let packet = StructuredPacket {
            request: template,
            test_cases: vec![TestCase::new(
                points[0].placeholder.clone(),
                vec!["' OR 1=1--".to_string()],
            )],
        };

        let executor = HttpProbeExecutor::new(5.0, None, 5);
        let results = executor.execute(&packet, &points, Some("{}")).await;
        assert_eq!(results.len(), 1);

        let raw = captured.recv().await.unwrap();
        // Raw payload bytes, no percent-encoding, inside the JSON body.
        assert!(raw.contains(r#"{"user":"' OR 1=1--"}"#));
    }

    #[tokio::test]
    async fn test_timeout_is_reported_as_signal() {
        let (addr, _captured) = spawn_server("slow", Some(Duration::from_secs(3))).await;
        let (packet, points) = query_packet(addr);

        let executor = HttpProbeExecutor::new(0.5, None, 5);
        let results = executor.execute(&packet, &points, None).await;

        assert_eq!(results.len(), 1);
        assert!(results[0].timed_out());
        assert_eq!(results[0].status, 0);
        assert_eq!(results[0].elapsed, 0.5);
        assert_eq!(results[0].response, TIMEOUT_MARKER);
    }

    #[tokio::test]
    async fn test_connect_failure_yields_error_result() {
        // Nothing listens here; connection is refused immediately.
        let (packet, points) = query_packet("127.0.0.1:1".parse().unwrap());

        let executor = HttpProbeExecutor::new(1.0, None, 5);
        let results = executor.execute(&packet, &points, None).await;

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].status, 0);
        assert_eq!(results[0].elapsed, 0.0);
        assert!(results[0].response.starts_with("Error: "));
    }

    #[tokio::test]
    async fn test_undeclared_test_cases_are_dropped() {
        let (packet, points) = query_packet("127.0.0.1:1".parse().unwrap());
        let mut packet = packet;
        packet.test_cases = vec![TestCase::new("{{ghost}}", vec!["x".to_string()])];

        let executor = HttpProbeExecutor::new(1.0, None, 5);
        let results = executor.execute(&packet, &points, None).await;
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_probe_concurrency_is_bounded() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc as StdArc;

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let active = StdArc::new(AtomicUsize::new(0));
        let peak = StdArc::new(AtomicUsize::new(0));

        {
            let active = active.clone();
            let peak = peak.clone();
            tokio::spawn(async move {
                loop {
                    let Ok((mut sock, _)) = listener.accept().await else { return };
                    let active = active.clone();
                    let peak = peak.clone();
                    tokio::spawn(async move {
                        let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        let _ = read_request(&mut sock).await;
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        let _ = sock
                            .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\nConnection: close\r\n\r\nok")
                            .await;
                        active.fetch_sub(1, Ordering::SeqCst);
                    });
                }
            });
        }

        let url = format!("http://{}/q?id=1", addr);
        let points = crate::core::points::derive_injection_points(&url, None);
        let template = crate::core::points::build_first_round_template(
            "GET",
            &url,
            &BTreeMap::new(),
            None,
            &points,
        );
        let payloads: Vec<String> = (0..20).map(|i| format!("p{}", i)).collect();
        let packet = StructuredPacket {
            request: template,
            test_cases: vec![TestCase::new("{{1}}", payloads)],
        };

        let executor = HttpProbeExecutor::new(5.0, None, 5);
        let results = executor.execute(&packet, &points, None).await;

        assert_eq!(results.len(), 20);
        assert!(results.iter().all(|r| r.status == 200));
        assert!(peak.load(Ordering::SeqCst) <= 5);
    }

    #[tokio::test]
    async fn test_diff_signals_against_baseline() {
        let (addr, _captured) = spawn_server("<html>changed page body</html>", None).await;
        let (packet, points) = query_packet(addr);

        let executor = HttpProbeExecutor::new(5.0, None, 5);
        let results = executor
            .execute(&packet, &points, Some("<html>original</html>"))
            .await;

        assert_eq!(results.len(), 1);
        let r = &results[0];
        assert_eq!(
            r.len_diff,
            "<html>changed page body</html>".len() as i64 - "<html>original</html>".len() as i64
        );
        assert!(r.similarity > 0.0 && r.similarity < 1.0);
    }
}

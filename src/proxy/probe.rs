//! Connectivity probe for checking candidate validity
//!
//! One probe owns one TCP connection: connect, send a fixed diagnostic
//! request, read a bounded slice of the response, classify it, release the
//! connection. A probe never fails past its boundary; every failure mode is
//! captured into the returned [`ProbeResult`].

use crate::proxy::models::{Candidate, ProbeOutcome, ProbeResult};
use chrono::Utc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{timeout, Instant};
use tracing::debug;

/// Default timeout for establishing the connection
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;

/// Default overall deadline for reading the response
const DEFAULT_READ_TIMEOUT_SECS: u64 = 5;

/// Hard cap on buffered response bytes
pub const MAX_RESPONSE_BYTES: usize = 4096;

/// A genuine diagnostic response is always longer than this
pub const MIN_SUCCESS_BYTES: usize = 100;

/// Diagnostic path requested on the upstream
const PROBE_PATH: &str = "/cdn-cgi/trace";

/// Fixed Host header value; deliberately not the dialed host
const PROBE_HOST: &str = "speed.cloudflare.com";

const PROBE_USER_AGENT: &str = "proxy-vet/0.1";

/// Substring identifying the upstream provider in a genuine response
const DEFAULT_PROVIDER_TOKEN: &str = "cloudflare";

/// A genuine response carries one of these phrases: the plain-HTTP notice
/// body, or the 400-class status text
const DEFAULT_PHRASE_MARKERS: [&str; 2] = ["plain HTTP request", "400 Bad Request"];

/// Configuration for the connectivity probe
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// Timeout for connection establishment
    pub connect_timeout: Duration,
    /// Overall deadline for reading the response
    pub read_timeout: Duration,
    /// Provider-identifying substring required in a successful response.
    /// Configurable because the upstream's wording is not under our control.
    pub provider_token: String,
    /// Phrase markers, one of which must appear in a successful response
    pub phrase_markers: Vec<String>,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            read_timeout: Duration::from_secs(DEFAULT_READ_TIMEOUT_SECS),
            provider_token: DEFAULT_PROVIDER_TOKEN.to_string(),
            phrase_markers: DEFAULT_PHRASE_MARKERS
                .iter()
                .map(|m| m.to_string())
                .collect(),
        }
    }
}

impl ProbeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn with_provider_token(mut self, token: String) -> Self {
        self.provider_token = token;
        self
    }

    pub fn with_phrase_markers(mut self, markers: Vec<String>) -> Self {
        self.phrase_markers = markers;
        self
    }
}

/// Connectivity prober for validating candidates
#[derive(Debug, Clone)]
pub struct Prober {
    config: ProbeConfig,
}

impl Prober {
    /// Create a new prober with default configuration
    pub fn new() -> Self {
        Self {
            config: ProbeConfig::default(),
        }
    }

    /// Create a new prober with custom configuration
    pub fn with_config(config: ProbeConfig) -> Self {
        Self { config }
    }

    /// Probe a single candidate. Infallible at this boundary: connect
    /// failures, timeouts, and heuristic misses all come back as a
    /// `Failure` outcome.
    pub async fn probe(&self, candidate: &Candidate) -> ProbeResult {
        let addr = candidate.endpoint();

        let mut stream = match timeout(self.config.connect_timeout, TcpStream::connect(&addr)).await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                debug!(%addr, error = %e, "connect failed");
                return ProbeResult::failure(candidate.clone(), e.to_string());
            }
            Err(_) => {
                debug!(%addr, "connect timed out");
                return ProbeResult::failure(candidate.clone(), "ConnectTimeout");
            }
        };

        let outcome = self.exchange(&mut stream).await;
        // released on every exit path; a failed shutdown changes nothing
        let _ = stream.shutdown().await;

        ProbeResult {
            candidate: candidate.clone(),
            outcome,
            checked_at: Utc::now(),
        }
    }

    /// Send the diagnostic request and read a bounded response slice
    async fn exchange(&self, stream: &mut TcpStream) -> ProbeOutcome {
        if let Err(e) = stream.write_all(probe_request().as_bytes()).await {
            return ProbeOutcome::Failure {
                reason: e.to_string(),
            };
        }

        let deadline = Instant::now() + self.config.read_timeout;
        let mut response = Vec::with_capacity(1024);
        let mut chunk = [0u8; 1024];

        while response.len() < MAX_RESPONSE_BYTES {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return ProbeOutcome::Failure {
                    reason: "Timeout".to_string(),
                };
            }

            match timeout(remaining, stream.read(&mut chunk)).await {
                Err(_) => {
                    return ProbeOutcome::Failure {
                        reason: "Timeout".to_string(),
                    }
                }
                Ok(Ok(0)) => break,
                Ok(Ok(n)) => {
                    let room = MAX_RESPONSE_BYTES - response.len();
                    response.extend_from_slice(&chunk[..n.min(room)]);
                    if contains_header_terminator(&response) {
                        break;
                    }
                }
                // peer reset mid-read; classify whatever arrived
                Ok(Err(_)) => break,
            }
        }

        self.classify(&response)
    }

    /// The success heuristic, exposed separately so it can be exercised
    /// with canned response buffers.
    ///
    /// The diagnostic endpoint returns its recognizable signature only when
    /// reached through a genuine, unproxied path; TLS interception, a wrong
    /// target, or a dead host each fail at least one clause.
    pub fn classify(&self, response: &[u8]) -> ProbeOutcome {
        let text = String::from_utf8_lossy(response);

        match parse_status_code(&text) {
            Some(code)
                if self.has_upstream_signature(&text) && response.len() > MIN_SUCCESS_BYTES =>
            {
                ProbeOutcome::Success {
                    status_code: code,
                    response_size: response.len(),
                }
            }
            Some(code) => ProbeOutcome::Failure {
                reason: format!("response not recognized (status {})", code),
            },
            None => ProbeOutcome::Failure {
                reason: "no status line in response".to_string(),
            },
        }
    }

    fn has_upstream_signature(&self, text: &str) -> bool {
        text.contains(self.config.provider_token.as_str())
            && self
                .config
                .phrase_markers
                .iter()
                .any(|marker| text.contains(marker.as_str()))
    }
}

impl Default for Prober {
    fn default() -> Self {
        Self::new()
    }
}

/// The fixed probe request
fn probe_request() -> String {
    format!(
        "GET {} HTTP/1.1\r\nHost: {}\r\nUser-Agent: {}\r\nConnection: close\r\n\r\n",
        PROBE_PATH, PROBE_HOST, PROBE_USER_AGENT
    )
}

fn contains_header_terminator(buf: &[u8]) -> bool {
    buf.windows(4).any(|w| w == b"\r\n\r\n")
}

/// Pull the three-digit status code out of an HTTP/1.x status line
fn parse_status_code(text: &str) -> Option<u16> {
    let line = text.lines().next()?;
    let mut parts = line.split_whitespace();
    if !parts.next()?.starts_with("HTTP/") {
        return None;
    }
    let code = parts.next()?;
    if code.len() != 3 {
        return None;
    }
    code.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    /// A response carrying the full upstream signature, with enough header
    /// bytes that it classifies as a success even if a read stops at the
    /// header terminator.
    fn signature_response() -> String {
        concat!(
            "HTTP/1.1 400 Bad Request\r\n",
            "Server: cloudflare\r\n",
            "Date: Mon, 01 Jan 2024 00:00:00 GMT\r\n",
            "Content-Type: text/html\r\n",
            "Connection: close\r\n",
            "\r\n",
            "<html><body>The plain HTTP request was sent to HTTPS port</body></html>",
        )
        .to_string()
    }

    #[test]
    fn test_probe_config_default() {
        let config = ProbeConfig::default();
        assert_eq!(
            config.connect_timeout,
            Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS)
        );
        assert_eq!(
            config.read_timeout,
            Duration::from_secs(DEFAULT_READ_TIMEOUT_SECS)
        );
        assert_eq!(config.provider_token, "cloudflare");
        assert_eq!(config.phrase_markers.len(), 2);
    }

    #[test]
    fn test_probe_config_builder() {
        let config = ProbeConfig::new()
            .with_connect_timeout(Duration::from_millis(250))
            .with_read_timeout(Duration::from_millis(500))
            .with_provider_token("example".to_string());
        assert_eq!(config.connect_timeout, Duration::from_millis(250));
        assert_eq!(config.read_timeout, Duration::from_millis(500));
        assert_eq!(config.provider_token, "example");
    }

    #[test]
    fn test_classify_signature_response() {
        let prober = Prober::new();
        match prober.classify(signature_response().as_bytes()) {
            ProbeOutcome::Success {
                status_code,
                response_size,
            } => {
                assert_eq!(status_code, 400);
                assert!(response_size > MIN_SUCCESS_BYTES);
            }
            ProbeOutcome::Failure { reason } => panic!("expected success, got: {}", reason),
        }
    }

    #[test]
    fn test_classify_unrecognized_response() {
        let prober = Prober::new();
        let response = format!(
            "HTTP/1.1 503 Service Unavailable\r\nContent-Type: text/html\r\n\r\n{}",
            "x".repeat(200)
        );
        match prober.classify(response.as_bytes()) {
            ProbeOutcome::Failure { reason } => assert!(reason.contains("503")),
            ProbeOutcome::Success { .. } => panic!("503 without signature must not classify"),
        }
    }

    #[test]
    fn test_classify_short_response_fails() {
        // carries the signature but not the minimum size
        let prober = Prober::new();
        let response = "HTTP/1.1 400 Bad Request\r\ncloudflare";
        assert!(matches!(
            prober.classify(response.as_bytes()),
            ProbeOutcome::Failure { .. }
        ));
    }

    #[test]
    fn test_classify_empty_response() {
        let prober = Prober::new();
        match prober.classify(b"") {
            ProbeOutcome::Failure { reason } => assert!(reason.contains("status line")),
            ProbeOutcome::Success { .. } => panic!("empty response must not classify"),
        }
    }

    #[test]
    fn test_parse_status_code() {
        assert_eq!(parse_status_code("HTTP/1.1 400 Bad Request\r\n"), Some(400));
        assert_eq!(parse_status_code("HTTP/1.0 200 OK"), Some(200));
        assert_eq!(parse_status_code("garbage"), None);
        assert_eq!(parse_status_code("HTTP/1.1"), None);
        assert_eq!(parse_status_code("HTTP/1.1 20 OK"), None);
    }

    #[tokio::test]
    async fn test_probe_against_signature_peer() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = sock.read(&mut buf).await;
            let _ = sock.write_all(signature_response().as_bytes()).await;
        });

        let prober = Prober::new();
        let candidate = Candidate::bare("127.0.0.1".to_string(), port);
        let result = prober.probe(&candidate).await;
        assert!(result.is_success());
        match result.outcome {
            ProbeOutcome::Success { status_code, .. } => assert_eq!(status_code, 400),
            ProbeOutcome::Failure { .. } => unreachable!(),
        }
    }

    #[tokio::test]
    async fn test_probe_connection_refused() {
        // bind then drop to obtain a port nothing is listening on
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let prober = Prober::new();
        let candidate = Candidate::bare("127.0.0.1".to_string(), port);
        let result = prober.probe(&candidate).await;
        assert!(!result.is_success());
        match result.outcome {
            ProbeOutcome::Failure { reason } => assert!(!reason.is_empty()),
            ProbeOutcome::Success { .. } => unreachable!(),
        }
    }

    #[tokio::test]
    async fn test_probe_silent_peer_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (_sock, _) = listener.accept().await.unwrap();
            // hold the connection open without responding
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let config = ProbeConfig::new().with_read_timeout(Duration::from_millis(200));
        let prober = Prober::with_config(config);
        let candidate = Candidate::bare("127.0.0.1".to_string(), port);
        let result = prober.probe(&candidate).await;
        match result.outcome {
            ProbeOutcome::Failure { reason } => assert_eq!(reason, "Timeout"),
            ProbeOutcome::Success { .. } => panic!("silent peer must time out"),
        }
    }
}

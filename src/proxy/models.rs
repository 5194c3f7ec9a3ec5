//! Checker data models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A normalized address pending a connectivity probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub host: String,
    pub port: u16,
    /// The original input token this candidate was derived from
    pub source: String,
}

impl Candidate {
    /// Create a new candidate, remembering the input token it came from
    pub fn new(host: String, port: u16, source: String) -> Self {
        Self { host, port, source }
    }

    /// Create a candidate whose source is its own `host:port` form
    pub fn bare(host: String, port: u16) -> Self {
        let source = format!("{}:{}", host, port);
        Self { host, port, source }
    }

    /// The dialable `host:port` form; doubles as the cache key.
    /// IPv6 hosts are stored bracketed, so this is always unambiguous.
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// The bare IP literal for geolocation lookups (brackets stripped)
    pub fn lookup_ip(&self) -> &str {
        self.host
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .unwrap_or(&self.host)
    }
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// How a single probe attempt ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProbeOutcome {
    /// The response carried the upstream's diagnostic signature
    Success {
        status_code: u16,
        response_size: usize,
    },
    /// Anything else: connect failure, timeout, or a response that does
    /// not satisfy the success heuristic
    Failure { reason: String },
}

/// Detailed result of one probe attempt against one candidate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeResult {
    pub candidate: Candidate,
    pub outcome: ProbeOutcome,
    pub checked_at: DateTime<Utc>,
}

impl ProbeResult {
    pub fn success(candidate: Candidate, status_code: u16, response_size: usize) -> Self {
        Self {
            candidate,
            outcome: ProbeOutcome::Success {
                status_code,
                response_size,
            },
            checked_at: Utc::now(),
        }
    }

    pub fn failure(candidate: Candidate, reason: impl Into<String>) -> Self {
        Self {
            candidate,
            outcome: ProbeOutcome::Failure {
                reason: reason.into(),
            },
            checked_at: Utc::now(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, ProbeOutcome::Success { .. })
    }
}

/// Geolocation metadata for a working address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeoInfo {
    pub country: String,
    pub country_code: String,
    pub autonomous_system: String,
}

impl GeoInfo {
    /// The `"N/A"` triple used whenever the enrichment service fails
    pub fn placeholder() -> Self {
        Self {
            country: "N/A".to_string(),
            country_code: "N/A".to_string(),
            autonomous_system: "N/A".to_string(),
        }
    }
}

impl fmt::Display for GeoInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.country, self.autonomous_system)
    }
}

/// A probe result plus optional geolocation annotation.
/// Enrichment is additive; it never changes the underlying outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichedResult {
    pub result: ProbeResult,
    pub geo: Option<GeoInfo>,
}

impl EnrichedResult {
    pub fn new(result: ProbeResult) -> Self {
        Self { result, geo: None }
    }

    pub fn with_geo(result: ProbeResult, geo: GeoInfo) -> Self {
        Self {
            result,
            geo: Some(geo),
        }
    }

    pub fn is_success(&self) -> bool {
        self.result.is_success()
    }

    pub fn endpoint(&self) -> String {
        self.result.candidate.endpoint()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidate_creation() {
        let c = Candidate::bare("203.0.113.5".to_string(), 443);
        assert_eq!(c.host, "203.0.113.5");
        assert_eq!(c.port, 443);
        assert_eq!(c.source, "203.0.113.5:443");
        assert_eq!(c.endpoint(), "203.0.113.5:443");
    }

    #[test]
    fn test_candidate_lookup_ip_strips_brackets() {
        let c = Candidate::bare("[2001:db8::1]".to_string(), 443);
        assert_eq!(c.lookup_ip(), "2001:db8::1");
        assert_eq!(c.endpoint(), "[2001:db8::1]:443");

        let v4 = Candidate::bare("203.0.113.5".to_string(), 8443);
        assert_eq!(v4.lookup_ip(), "203.0.113.5");
    }

    #[test]
    fn test_probe_result_variants() {
        let c = Candidate::bare("203.0.113.5".to_string(), 443);

        let ok = ProbeResult::success(c.clone(), 400, 512);
        assert!(ok.is_success());
        match ok.outcome {
            ProbeOutcome::Success {
                status_code,
                response_size,
            } => {
                assert_eq!(status_code, 400);
                assert_eq!(response_size, 512);
            }
            ProbeOutcome::Failure { .. } => panic!("expected success"),
        }

        let bad = ProbeResult::failure(c, "Timeout");
        assert!(!bad.is_success());
    }

    #[test]
    fn test_geo_placeholder() {
        let geo = GeoInfo::placeholder();
        assert_eq!(geo.country, "N/A");
        assert_eq!(geo.country_code, "N/A");
        assert_eq!(geo.autonomous_system, "N/A");
        assert_eq!(format!("{}", geo), "N/A - N/A");
    }

    #[test]
    fn test_enriched_result_is_additive() {
        let c = Candidate::bare("203.0.113.5".to_string(), 443);
        let result = ProbeResult::success(c, 400, 512);
        let plain = EnrichedResult::new(result.clone());
        let enriched = EnrichedResult::with_geo(result, GeoInfo::placeholder());
        assert!(plain.is_success());
        assert!(enriched.is_success());
        assert_eq!(plain.result, enriched.result);
    }
}

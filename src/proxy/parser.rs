//! Address parser for normalizing candidate inputs
//!
//! Accepted forms, tried in this order:
//! - inline port marker: `edge.tp8443.example.net` (port embedded in the name)
//! - bracketed IPv6: `[2001:db8::1]:443`
//! - `host:port` where the host part contains a dot
//! - CIDR blocks of the exact form `a.b.c.d/24`
//! - numeric ranges `a.b.c.start-end`
//! - anything else as a bare host on port 443
//!
//! Malformed CIDR/range tokens expand to nothing rather than failing the
//! whole input; a zero-candidate batch is a valid, empty outcome.

use crate::proxy::models::Candidate;
use crate::{Error, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use tracing::debug;

/// Default port when the input carries none
pub const DEFAULT_PORT: u16 = 443;

/// Regex pattern to match IP or IP:PORT occurrences in free text
static IP_PORT_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3})(?::(\d{1,5}))?\b")
        .expect("Invalid IP:PORT regex")
});

/// Address parser for turning input tokens into probe candidates
pub struct AddressParser;

impl AddressParser {
    /// Parse a single input token into zero, one, or many candidates.
    ///
    /// Returns `Err(InvalidFormat)` only for tokens that are unambiguously
    /// malformed (an empty token, or a bracketed IPv6 literal without a
    /// port). Range and CIDR tokens that fail validation expand to an
    /// empty list instead.
    pub fn parse_token(token: &str) -> Result<Vec<Candidate>> {
        let token = token.trim();
        if token.is_empty() {
            return Err(Error::InvalidFormat("empty address token".to_string()));
        }

        if let Some(candidate) = Self::parse_tp_marker(token) {
            return Ok(vec![candidate]);
        }

        if token.starts_with('[') {
            return Self::parse_bracketed(token).map(|c| vec![c]);
        }

        if let Some(candidate) = Self::parse_host_port(token) {
            return Ok(vec![candidate]);
        }

        if token.contains('/') {
            return Ok(Self::expand_cidr(token));
        }

        if Self::looks_like_range(token) {
            return Ok(Self::expand_range(token));
        }

        Ok(vec![Candidate::new(
            token.to_string(),
            DEFAULT_PORT,
            token.to_string(),
        )])
    }

    /// Parse many tokens, skipping malformed ones, deduplicated by
    /// `(host, port)` with first occurrence winning.
    pub fn parse_many<S: AsRef<str>>(tokens: &[S]) -> Vec<Candidate> {
        let mut all = Vec::new();
        for token in tokens {
            match Self::parse_token(token.as_ref()) {
                Ok(candidates) => all.extend(candidates),
                Err(e) => debug!(token = token.as_ref(), error = %e, "dropping unparseable token"),
            }
        }
        Self::dedup(all)
    }

    /// Sweep free text (proxy list files, CSV dumps) for `a.b.c.d` and
    /// `a.b.c.d:port` occurrences.
    pub fn extract_from_text(content: &str) -> Vec<Candidate> {
        let candidates = IP_PORT_REGEX
            .captures_iter(content)
            .filter_map(|cap| {
                let host = cap.get(1)?.as_str();
                if !Self::valid_ipv4(host) {
                    return None;
                }
                let port = match cap.get(2) {
                    Some(p) => {
                        let port: u16 = p.as_str().parse().ok()?;
                        if port == 0 {
                            return None;
                        }
                        port
                    }
                    None => DEFAULT_PORT,
                };
                Some(Candidate::new(
                    host.to_string(),
                    port,
                    cap.get(0).map(|m| m.as_str().to_string()).unwrap_or_default(),
                ))
            })
            .collect();
        Self::dedup(candidates)
    }

    /// Remove duplicate `(host, port)` pairs, keeping the first occurrence
    pub fn dedup(candidates: Vec<Candidate>) -> Vec<Candidate> {
        let mut seen = HashSet::new();
        candidates
            .into_iter()
            .filter(|c| seen.insert((c.host.clone(), c.port)))
            .collect()
    }

    /// Names carrying an inline `tpNNNN` segment, e.g. `edge.tp8443.example.net`.
    /// The marker segment encodes the port and is stripped from the host.
    fn parse_tp_marker(token: &str) -> Option<Candidate> {
        let segments: Vec<&str> = token.split('.').collect();
        if segments.len() < 2 {
            return None;
        }

        let marker_at = segments.iter().position(|s| {
            let lower = s.to_ascii_lowercase();
            lower.len() > 2
                && lower.starts_with("tp")
                && lower[2..].bytes().all(|b| b.is_ascii_digit())
        })?;

        let port: u16 = segments[marker_at][2..].parse().ok().filter(|&p| p > 0)?;

        let host: Vec<&str> = segments
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != marker_at)
            .map(|(_, s)| *s)
            .collect();
        if host.is_empty() {
            return None;
        }

        Some(Candidate::new(host.join("."), port, token.to_string()))
    }

    /// Bracketed IPv6 literal with mandatory trailing `:port`
    fn parse_bracketed(token: &str) -> Result<Candidate> {
        let close = token
            .find(']')
            .ok_or_else(|| Error::InvalidFormat(format!("unterminated IPv6 literal: {}", token)))?;
        let host = &token[..=close];
        let port = token[close + 1..]
            .strip_prefix(':')
            .and_then(|p| p.parse::<u16>().ok())
            .filter(|&p| p > 0)
            .ok_or_else(|| {
                Error::InvalidFormat(format!("IPv6 literal without a port: {}", token))
            })?;
        Ok(Candidate::new(host.to_string(), port, token.to_string()))
    }

    /// `host:port` where the host part contains a dot. A malformed port
    /// falls back to 443 rather than rejecting the token.
    fn parse_host_port(token: &str) -> Option<Candidate> {
        let (host, port_part) = token.rsplit_once(':')?;
        if !host.contains('.') {
            return None;
        }
        let port = port_part
            .parse::<u16>()
            .ok()
            .filter(|&p| p > 0)
            .unwrap_or(DEFAULT_PORT);
        Some(Candidate::new(host.to_string(), port, token.to_string()))
    }

    /// Expand `a.b.c.d/24` into the 256 addresses of its /24 block.
    /// Anything else containing a slash expands to nothing.
    fn expand_cidr(token: &str) -> Vec<Candidate> {
        let Some((addr, prefix)) = token.split_once('/') else {
            return Vec::new();
        };
        if prefix != "24" || !Self::valid_ipv4(addr) {
            debug!(token, "unsupported CIDR token, skipping");
            return Vec::new();
        }
        let octets: Vec<&str> = addr.split('.').collect();
        let base = format!("{}.{}.{}", octets[0], octets[1], octets[2]);
        (0u16..=255)
            .map(|i| Candidate::new(format!("{}.{}", base, i), DEFAULT_PORT, token.to_string()))
            .collect()
    }

    fn looks_like_range(token: &str) -> bool {
        let parts: Vec<&str> = token.split('.').collect();
        parts.len() == 4
            && parts[..3].iter().all(|p| p.parse::<u8>().is_ok())
            && parts[3].contains('-')
    }

    /// Expand `a.b.c.start-end` inclusively; invalid bounds expand to nothing
    fn expand_range(token: &str) -> Vec<Candidate> {
        let parts: Vec<&str> = token.split('.').collect();
        let Some((start, end)) = parts[3].split_once('-') else {
            return Vec::new();
        };
        let (Ok(start), Ok(end)) = (start.parse::<u16>(), end.parse::<u16>()) else {
            debug!(token, "non-numeric range bounds, skipping");
            return Vec::new();
        };
        if start > 255 || end > 255 || start > end {
            debug!(token, "range bounds out of order or out of [0,255], skipping");
            return Vec::new();
        }
        let base = format!("{}.{}.{}", parts[0], parts[1], parts[2]);
        (start..=end)
            .map(|i| Candidate::new(format!("{}.{}", base, i), DEFAULT_PORT, token.to_string()))
            .collect()
    }

    fn valid_ipv4(addr: &str) -> bool {
        let parts: Vec<&str> = addr.split('.').collect();
        parts.len() == 4 && parts.iter().all(|p| p.parse::<u8>().is_ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bare_ip() {
        let c = AddressParser::parse_token("203.0.113.5").unwrap();
        assert_eq!(c.len(), 1);
        assert_eq!(c[0].host, "203.0.113.5");
        assert_eq!(c[0].port, 443);
        assert_eq!(c[0].source, "203.0.113.5");
    }

    #[test]
    fn test_parse_host_port() {
        let c = AddressParser::parse_token("203.0.113.5:8443").unwrap();
        assert_eq!(c.len(), 1);
        assert_eq!(c[0].host, "203.0.113.5");
        assert_eq!(c[0].port, 8443);
    }

    #[test]
    fn test_parse_host_port_bad_port_falls_back() {
        let c = AddressParser::parse_token("203.0.113.5:notaport").unwrap();
        assert_eq!(c[0].host, "203.0.113.5");
        assert_eq!(c[0].port, 443);
    }

    #[test]
    fn test_parse_tp_marker() {
        let c = AddressParser::parse_token("edge.tp8443.example.net").unwrap();
        assert_eq!(c.len(), 1);
        assert_eq!(c[0].host, "edge.example.net");
        assert_eq!(c[0].port, 8443);
        assert_eq!(c[0].source, "edge.tp8443.example.net");
    }

    #[test]
    fn test_parse_tp_marker_case_insensitive() {
        let c = AddressParser::parse_token("edge.TP50000.example.net").unwrap();
        assert_eq!(c[0].host, "edge.example.net");
        assert_eq!(c[0].port, 50000);
    }

    #[test]
    fn test_tp_lookalike_segment_is_not_a_marker() {
        // "tproxy" starts with tp but carries no numeric suffix
        let c = AddressParser::parse_token("tproxy.example.net").unwrap();
        assert_eq!(c[0].host, "tproxy.example.net");
        assert_eq!(c[0].port, 443);
    }

    #[test]
    fn test_parse_bracketed_ipv6() {
        let c = AddressParser::parse_token("[2001:db8::1]:8443").unwrap();
        assert_eq!(c[0].host, "[2001:db8::1]");
        assert_eq!(c[0].port, 8443);
    }

    #[test]
    fn test_bracketed_ipv6_without_port_is_an_error() {
        assert!(AddressParser::parse_token("[2001:db8::1]").is_err());
        assert!(AddressParser::parse_token("[2001:db8::1]:").is_err());
        assert!(AddressParser::parse_token("[2001:db8::1").is_err());
    }

    #[test]
    fn test_unbracketed_ipv6_is_a_bare_host() {
        // no dot before the last colon, so the host:port branch passes on it
        let c = AddressParser::parse_token("2001:db8::1").unwrap();
        assert_eq!(c[0].host, "2001:db8::1");
        assert_eq!(c[0].port, 443);
    }

    #[test]
    fn test_expand_cidr_24() {
        let c = AddressParser::parse_token("192.0.2.77/24").unwrap();
        assert_eq!(c.len(), 256);
        assert_eq!(c[0].host, "192.0.2.0");
        assert_eq!(c[255].host, "192.0.2.255");
        assert!(c.iter().all(|x| x.port == 443));
        assert!(c.iter().all(|x| x.source == "192.0.2.77/24"));
    }

    #[test]
    fn test_unsupported_cidr_expands_to_nothing() {
        assert!(AddressParser::parse_token("192.0.2.0/16").unwrap().is_empty());
        assert!(AddressParser::parse_token("999.0.2.0/24").unwrap().is_empty());
        assert!(AddressParser::parse_token("garbage/24").unwrap().is_empty());
    }

    #[test]
    fn test_expand_range() {
        let c = AddressParser::parse_token("192.0.2.5-10").unwrap();
        assert_eq!(c.len(), 6);
        assert_eq!(c[0].host, "192.0.2.5");
        assert_eq!(c[5].host, "192.0.2.10");
    }

    #[test]
    fn test_range_start_after_end_expands_to_nothing() {
        assert!(AddressParser::parse_token("192.0.2.10-5").unwrap().is_empty());
    }

    #[test]
    fn test_range_out_of_bounds_expands_to_nothing() {
        assert!(AddressParser::parse_token("192.0.2.250-300").unwrap().is_empty());
        assert!(AddressParser::parse_token("192.0.2.a-b").unwrap().is_empty());
    }

    #[test]
    fn test_hyphenated_domain_is_not_a_range() {
        let c = AddressParser::parse_token("my-host.example.net").unwrap();
        assert_eq!(c[0].host, "my-host.example.net");
        assert_eq!(c[0].port, 443);
    }

    #[test]
    fn test_empty_token_is_an_error() {
        assert!(AddressParser::parse_token("").is_err());
        assert!(AddressParser::parse_token("   ").is_err());
    }

    #[test]
    fn test_round_trip_through_bare_branch() {
        let first = AddressParser::parse_token("198.51.100.9:2053").unwrap();
        let again = AddressParser::parse_token(&first[0].endpoint()).unwrap();
        assert_eq!(first[0].host, again[0].host);
        assert_eq!(first[0].port, again[0].port);
    }

    #[test]
    fn test_parse_many_dedups_across_tokens() {
        let tokens = ["192.0.2.5-7", "192.0.2.6", "192.0.2.6:443", "192.0.2.8"];
        let c = AddressParser::parse_many(&tokens);
        assert_eq!(c.len(), 4);
        assert_eq!(c[0].host, "192.0.2.5");
        assert_eq!(c[1].host, "192.0.2.6");
        // 192.0.2.6 came from the range first; its source reflects that
        assert_eq!(c[1].source, "192.0.2.5-7");
        assert_eq!(c[3].host, "192.0.2.8");
    }

    #[test]
    fn test_parse_many_skips_malformed_tokens() {
        let tokens = ["[2001:db8::1", "192.0.2.1"];
        let c = AddressParser::parse_many(&tokens);
        assert_eq!(c.len(), 1);
        assert_eq!(c[0].host, "192.0.2.1");
    }

    #[test]
    fn test_extract_from_text() {
        let content = r#"
<td>192.0.2.1</td><td>8080</td>
198.51.100.7:2083, and a plain one 203.0.113.9 too
bogus 999.1.1.1:80
"#;
        let c = AddressParser::extract_from_text(content);
        assert!(c.iter().any(|x| x.host == "198.51.100.7" && x.port == 2083));
        assert!(c.iter().any(|x| x.host == "203.0.113.9" && x.port == 443));
        assert!(!c.iter().any(|x| x.host == "999.1.1.1"));
    }

    #[test]
    fn test_extract_from_text_dedups() {
        let content = "192.0.2.1:80 192.0.2.1:80 192.0.2.2:80";
        let c = AddressParser::extract_from_text(content);
        assert_eq!(c.len(), 2);
    }
}

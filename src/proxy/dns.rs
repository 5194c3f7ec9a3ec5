//! DNS resolution collaborator
//!
//! Domains are resolved through a remote DNS-over-HTTPS endpoint returning
//! JSON, consumed as a black box. This module is a client, not a resolver:
//! it asks for A and AAAA records and hands back literal address strings
//! (IPv6 bracketed, ready for the address parser).

use crate::{Error, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

/// Default DNS-over-HTTPS endpoint
const DEFAULT_DOH_ENDPOINT: &str = "https://cloudflare-dns.com/dns-query";

/// Timeout for one DoH query
const DEFAULT_TIMEOUT_SECS: u64 = 10;

const RECORD_TYPE_A: u16 = 1;
const RECORD_TYPE_AAAA: u16 = 28;

/// Regex pattern matching a plain domain name (no scheme, no path)
static DOMAIN_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?\.)+[a-zA-Z]{2,63}$")
        .expect("Invalid domain regex")
});

/// Check that a user-supplied domain is a bare name, not a URL
pub fn is_valid_domain(domain: &str) -> bool {
    !domain.contains('/') && DOMAIN_REGEX.is_match(domain)
}

#[derive(Debug, Deserialize)]
struct DnsAnswer {
    #[serde(rename = "type")]
    record_type: u16,
    data: String,
}

#[derive(Debug, Deserialize)]
struct DnsResponse {
    #[serde(rename = "Answer", default)]
    answer: Vec<DnsAnswer>,
}

/// DNS-over-HTTPS client
pub struct DohResolver {
    client: Client,
    endpoint: String,
}

impl DohResolver {
    pub fn new() -> Result<Self> {
        Self::with_endpoint(DEFAULT_DOH_ENDPOINT)
    }

    pub fn with_endpoint(endpoint: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    /// Resolve a domain to its address literals, A records first, then
    /// AAAA records bracketed. Fails only if neither family yields any
    /// record.
    pub async fn resolve(&self, domain: &str) -> Result<Vec<String>> {
        if !is_valid_domain(domain) {
            return Err(Error::InvalidFormat(format!(
                "not a plain domain name: {}",
                domain
            )));
        }

        let mut ips = Vec::new();

        for (record_type, type_name) in [(RECORD_TYPE_A, "A"), (RECORD_TYPE_AAAA, "AAAA")] {
            match self.query(domain, type_name).await {
                Ok(response) => {
                    for answer in response.answer {
                        if answer.record_type != record_type {
                            continue;
                        }
                        if record_type == RECORD_TYPE_AAAA {
                            ips.push(format!("[{}]", answer.data));
                        } else {
                            ips.push(answer.data);
                        }
                    }
                }
                Err(e) => warn!(domain, type_name, error = %e, "DoH query failed"),
            }
        }

        if ips.is_empty() {
            return Err(Error::Lookup(format!(
                "no A or AAAA records for {}",
                domain
            )));
        }
        debug!(domain, count = ips.len(), "resolved");
        Ok(ips)
    }

    async fn query(
        &self,
        domain: &str,
        type_name: &str,
    ) -> std::result::Result<DnsResponse, reqwest::Error> {
        self.client
            .get(&self.endpoint)
            .query(&[("name", domain), ("type", type_name)])
            .header("accept", "application/dns-json")
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
    }
}

//! Best-effort geolocation enrichment
//!
//! Enrichment annotates a working address with country and AS metadata
//! fetched from a remote lookup service. It is strictly additive: any
//! failure (network, non-success status, missing fields, an explicit
//! failure status from the service) degrades to the `"N/A"` placeholder
//! triple and never propagates to the caller.

use crate::proxy::models::GeoInfo;
use crate::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::warn;

/// Default lookup service base URL (ip-api style JSON documents)
const DEFAULT_BASE_URL: &str = "http://ip-api.com/json";

/// Timeout for one enrichment lookup
const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Capability seam for annotating working addresses
#[async_trait]
pub trait Enricher: Send + Sync {
    /// Annotate a bare IP literal. Never fails.
    async fn enrich(&self, ip: &str) -> GeoInfo;
}

/// Enricher that skips the network and returns placeholders
pub struct NoopEnricher;

#[async_trait]
impl Enricher for NoopEnricher {
    async fn enrich(&self, _ip: &str) -> GeoInfo {
        GeoInfo::placeholder()
    }
}

/// One lookup-service document
#[derive(Debug, Deserialize)]
struct LookupResponse {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    country: Option<String>,
    #[serde(rename = "countryCode", default)]
    country_code: Option<String>,
    #[serde(rename = "as", default)]
    autonomous_system: Option<String>,
}

impl LookupResponse {
    fn into_geo(self) -> GeoInfo {
        let or_na = |v: Option<String>| v.unwrap_or_else(|| "N/A".to_string());
        GeoInfo {
            country: or_na(self.country),
            country_code: or_na(self.country_code),
            autonomous_system: or_na(self.autonomous_system),
        }
    }
}

/// Enricher backed by a remote HTTP lookup service
pub struct HttpEnricher {
    client: Client,
    base_url: String,
}

impl HttpEnricher {
    pub fn new() -> Result<Self> {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    async fn lookup(&self, ip: &str) -> std::result::Result<GeoInfo, reqwest::Error> {
        let url = format!("{}/{}", self.base_url, ip);
        let data: LookupResponse = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        if data.status.as_deref() == Some("fail") {
            return Ok(GeoInfo::placeholder());
        }
        Ok(data.into_geo())
    }
}

#[async_trait]
impl Enricher for HttpEnricher {
    async fn enrich(&self, ip: &str) -> GeoInfo {
        match self.lookup(ip).await {
            Ok(geo) => geo,
            Err(e) => {
                warn!(ip, error = %e, "enrichment lookup failed, using placeholders");
                GeoInfo::placeholder()
            }
        }
    }
}

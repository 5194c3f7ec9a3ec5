//! Proxy checking core
//!
//! This module provides functionality for:
//! - Normalizing candidate addresses from various formats (bare IPs,
//!   `host:port`, inline `tp`-port names, CIDR /24 blocks, numeric ranges)
//! - Probing candidates over raw TCP against the upstream diagnostic
//!   endpoint, in concurrent fixed-size batches
//! - Resolving domains through a DNS-over-HTTPS collaborator
//! - Annotating working addresses with best-effort geolocation

pub mod batch;
pub mod dns;
pub mod geo;
pub mod models;
pub mod parser;
pub mod probe;

pub use batch::{Orchestrator, BATCH_SIZE};
pub use dns::DohResolver;
pub use geo::{Enricher, HttpEnricher, NoopEnricher};
pub use models::{Candidate, EnrichedResult, GeoInfo, ProbeOutcome, ProbeResult};
pub use parser::AddressParser;
pub use probe::{ProbeConfig, Prober};

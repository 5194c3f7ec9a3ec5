//! Error taxonomy for checker operations
//!
//! Probe-local failures (connect refused, timeouts, a response that misses
//! the success heuristic) are deliberately *not* represented here; they are
//! captured per candidate as [`ProbeOutcome::Failure`](crate::proxy::models::ProbeOutcome)
//! and never abort a run. This enum covers the failures that reject an
//! operation before or outside of probing.

use thiserror::Error;

/// Errors that abort an operation (as opposed to per-candidate negatives)
#[derive(Debug, Error)]
pub enum Error {
    /// The input token could not be parsed as an address in any supported form
    #[error("invalid address format: {0}")]
    InvalidFormat(String),

    /// Credential check failed; the request was rejected before any probing
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// A remote lookup collaborator (DNS resolution) failed or returned nothing
    #[error("upstream lookup failed: {0}")]
    Lookup(String),

    /// The result cache could not be read or persisted
    #[error("cache store error: {0}")]
    Store(String),

    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

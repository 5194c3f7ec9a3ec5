//! Short-lived probe-authorization tokens
//!
//! A token is derived deterministically from `(host identity, coarse time
//! window, caller identity)` through a two-stage digest, so any holder of
//! the same inputs can recompute and compare it without stored session
//! state. Both the current and the immediately preceding window validate,
//! tolerating clock races at window boundaries.
//!
//! This is a low-assurance rate-limiting gate, **not** a security boundary:
//! the scheme trades a replay window for statelessness, and with no
//! override secret configured every request is accepted (open mode, the
//! upstream default).

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

/// Width of the time bucket over which a derived token stays stable
pub const TOKEN_WINDOW_MINUTES: i64 = 31;

const WINDOW_MILLIS: i64 = TOKEN_WINDOW_MINUTES * 60 * 1000;

/// Interior slice of the first-stage hex digest fed into the second stage
const DIGEST_SLICE: std::ops::Range<usize> = 7..27;

/// A derived credential and the window it is valid for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub value: String,
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
}

/// Issues and validates window-scoped tokens
#[derive(Debug, Clone)]
pub struct TokenScheme {
    host_identity: String,
    override_secret: Option<String>,
}

impl TokenScheme {
    pub fn new(host_identity: impl Into<String>) -> Self {
        Self {
            host_identity: host_identity.into(),
            override_secret: None,
        }
    }

    /// Configure a fixed secret that is always accepted in place of a
    /// derived token. Configuring one also turns off open mode.
    pub fn with_override(mut self, secret: impl Into<String>) -> Self {
        self.override_secret = Some(secret.into());
        self
    }

    /// Issue the token for the current window
    pub fn issue(&self, caller_id: &str) -> Token {
        self.issue_at(caller_id, Utc::now())
    }

    /// Issue the token for the window containing `at`
    pub fn issue_at(&self, caller_id: &str, at: DateTime<Utc>) -> Token {
        let window = window_index(at);
        Token {
            value: self.derive(caller_id, window),
            valid_from: window_start(window),
            valid_until: window_start(window + 1),
        }
    }

    /// Recompute-and-compare validation. Accepts the current window's
    /// token, the previous window's token, or the override secret.
    /// With no override secret configured this always returns `true`.
    pub fn validate(&self, provided: Option<&str>, caller_id: &str) -> bool {
        self.validate_at(provided, caller_id, Utc::now())
    }

    pub fn validate_at(&self, provided: Option<&str>, caller_id: &str, at: DateTime<Utc>) -> bool {
        let Some(secret) = &self.override_secret else {
            // open mode
            return true;
        };
        let Some(provided) = provided else {
            return false;
        };
        if provided == secret {
            return true;
        }
        let window = window_index(at);
        provided == self.derive(caller_id, window)
            || provided == self.derive(caller_id, window - 1)
    }

    /// Like [`validate`](Self::validate), surfacing the rejection as the
    /// error that gates a probe request.
    pub fn authorize(&self, provided: Option<&str>, caller_id: &str) -> Result<()> {
        if self.validate(provided, caller_id) {
            Ok(())
        } else {
            Err(Error::PermissionDenied(
                "missing or invalid probe token".to_string(),
            ))
        }
    }

    /// Two-stage digest: hash the concatenated context, re-hash an interior
    /// slice of the hex form, keep the lower-case hex result.
    fn derive(&self, caller_id: &str, window: i64) -> String {
        let first = hex::encode(Sha256::digest(
            format!("{}{}{}", self.host_identity, window, caller_id).as_bytes(),
        ));
        let interior = &first[DIGEST_SLICE];
        hex::encode(Sha256::digest(interior.as_bytes())).to_lowercase()
    }
}

/// Wall-clock milliseconds divided into fixed windows, rounded up, so the
/// index is stable within a window and ticks at the boundary
fn window_index(at: DateTime<Utc>) -> i64 {
    let ms = at.timestamp_millis();
    (ms + WINDOW_MILLIS - 1).div_euclid(WINDOW_MILLIS)
}

fn window_start(window: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis((window - 1) * WINDOW_MILLIS).unwrap_or_default()
}

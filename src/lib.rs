//! Proxy Vet - Proxy IP Checker
//!
//! This is a proxy IP checker with batched concurrent probing support.
//! It normalizes candidate addresses from various formats (bare IPs,
//! `host:port`, inline `tp`-port names, CIDR /24 blocks, numeric ranges),
//! probes each one over a raw TCP connection against a fixed upstream
//! diagnostic endpoint, and caches results so interrupted runs resume
//! instead of restarting.

pub mod error;
pub mod proxy;
pub mod store;
pub mod token;

pub use error::Error;
pub use proxy::*;

/// Application result type
pub type Result<T> = std::result::Result<T, Error>;

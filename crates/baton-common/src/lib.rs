//! Baton Common - Shared types and utilities
//!
//! This crate provides the foundational types used across all Baton components:
//! - Error types
//! - Utility functions

pub mod error;
pub mod utils;

// Re-exports for convenience
pub use error::BatonError;
pub use utils::local_ip;

/// Default port a peer listens on when none is configured
pub const DEFAULT_PEER_PORT: u16 = 7848;

/// Default peers file, one `id@host:port` entry per line
pub const DEFAULT_PEERS_FILE: &str = "conf/peers.conf";

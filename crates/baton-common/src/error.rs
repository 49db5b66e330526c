//! Error types for Baton
//!
//! This module defines `BatonError`, the application-specific error enum.
//! Transport errors are recovered locally by pruning the dead peer and are
//! never surfaced to `acquire`/`release` callers; the remaining classes
//! propagate with `?` up to the binary, which reports them via `anyhow`.

/// Application-specific error types
#[derive(thiserror::Error, Debug)]
pub enum BatonError {
    #[error("transport error for {0}: {1}")]
    Transport(String, String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl BatonError {
    /// Whether this error is a remote-call failure that should be handled
    /// by unregistering the target peer rather than propagating.
    pub fn is_transport(&self) -> bool {
        matches!(self, BatonError::Transport(_, _))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_classification() {
        let err = BatonError::Transport("10.0.0.3:7848".to_string(), "connection refused".to_string());
        assert!(err.is_transport());
        assert!(!BatonError::Protocol("bad state".to_string()).is_transport());
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: BatonError = io.into();
        assert!(matches!(err, BatonError::Io(_)));
    }
}

//! Peer identity models
//!
//! A peer is identified by a totally-ordered numeric id. The ordering is
//! load-bearing: it elects the initial token holder and fixes the circular
//! forwarding order.

use std::{
    fmt::{Display, Formatter},
    str::FromStr,
};

use serde::{Deserialize, Serialize};

use baton_common::error::BatonError;

/// Unique, totally-ordered peer identifier
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct PeerId(pub u64);

impl PeerId {
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl Display for PeerId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PeerId {
    type Err = BatonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u64>()
            .map(PeerId)
            .map_err(|_| BatonError::Parse(format!("invalid peer id: '{}'", s)))
    }
}

impl From<u64> for PeerId {
    fn from(value: u64) -> Self {
        PeerId(value)
    }
}

/// Address record for a peer, parsed from the peers file
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerInfo {
    pub id: PeerId,
    pub ip: String,
    pub port: u16,
}

impl PeerInfo {
    pub fn new(id: PeerId, ip: impl Into<String>, port: u16) -> Self {
        Self {
            id,
            ip: ip.into(),
            port,
        }
    }

    /// Socket address in `host:port` form
    pub fn address(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }
}

impl Display for PeerInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}:{}", self.id, self.ip, self.port)
    }
}

impl FromStr for PeerInfo {
    type Err = BatonError;

    /// Parse a peers-file entry of the form `id@host:port`; the port may be
    /// omitted and defaults to [`baton_common::DEFAULT_PEER_PORT`].
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let entry = s.trim();
        let (id_part, addr_part) = entry
            .split_once('@')
            .ok_or_else(|| BatonError::Parse(format!("invalid peer entry: '{}'", entry)))?;
        let id = id_part.parse::<PeerId>()?;
        let (ip, port) = match addr_part.rsplit_once(':') {
            Some((ip, port_part)) => {
                let port = port_part
                    .parse::<u16>()
                    .map_err(|_| BatonError::Parse(format!("invalid peer port: '{}'", port_part)))?;
                (ip, port)
            }
            None => (addr_part, baton_common::DEFAULT_PEER_PORT),
        };
        if ip.is_empty() {
            return Err(BatonError::Parse(format!(
                "invalid peer address: '{}'",
                addr_part
            )));
        }
        Ok(PeerInfo::new(id, ip, port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peer_id_ordering() {
        let mut ids = vec![PeerId(3), PeerId(1), PeerId(4), PeerId(1), PeerId(5)];
        ids.sort();
        ids.dedup();
        assert_eq!(ids, vec![PeerId(1), PeerId(3), PeerId(4), PeerId(5)]);
    }

    #[test]
    fn test_peer_id_parse() {
        assert_eq!("42".parse::<PeerId>().unwrap(), PeerId(42));
        assert_eq!(" 7 ".parse::<PeerId>().unwrap(), PeerId(7));
        assert!("x7".parse::<PeerId>().is_err());
        assert!("-1".parse::<PeerId>().is_err());
    }

    #[test]
    fn test_peer_info_parse() {
        let info = "3@192.168.1.10:7848".parse::<PeerInfo>().unwrap();
        assert_eq!(info.id, PeerId(3));
        assert_eq!(info.ip, "192.168.1.10");
        assert_eq!(info.port, 7848);
        assert_eq!(info.address(), "192.168.1.10:7848");
        assert_eq!(info.to_string(), "3@192.168.1.10:7848");
    }

    #[test]
    fn test_peer_info_parse_default_port() {
        let info = "3@192.168.1.10".parse::<PeerInfo>().unwrap();
        assert_eq!(info.port, baton_common::DEFAULT_PEER_PORT);
    }

    #[test]
    fn test_peer_info_parse_invalid() {
        assert!("192.168.1.10:7848".parse::<PeerInfo>().is_err());
        assert!("3@:7848".parse::<PeerInfo>().is_err());
        assert!("3@host:notaport".parse::<PeerInfo>().is_err());
    }
}

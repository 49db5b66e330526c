//! Baton Core - cluster plumbing around the lock engine
//!
//! This crate provides:
//! - The peer directory backed by cached outbound TCP connections
//! - The line-delimited JSON client transport with retry and
//!   prune-on-failure semantics
//! - Peers-file membership lookup
//! - The inbound message handler registry

pub mod handler;
pub mod service;

pub use handler::{HandlerRegistry, MessageHandler};
pub use service::directory::{ClusterPeerDirectory, RemotePeer};
pub use service::lookup;
pub use service::peer_client::{PeerClientConfig, PeerClientManager};

//! Baton API - peer identity, wire messages, and remote-call traits
//!
//! This crate defines the types shared between the lock engine and the
//! cluster transport: peer identifiers and address records, the wire
//! message envelope, the token snapshot encoding, and the `PeerHandle` /
//! `PeerDirectory` collaborator traits.

pub mod model;
pub mod remote;

pub use model::{PeerId, PeerInfo};
pub use remote::{Message, PeerDirectory, PeerHandle, TokenSnapshot};

//! Baton Lock - token-based distributed mutual exclusion
//!
//! One logical token circulates among the peers; holding it is the sole
//! ticket into the critical section. Each peer runs a [`TokenLock`] engine
//! that keeps a logical clock, a per-peer request vector, and (when it holds
//! the token) the token map itself. Requests and token handoffs travel as
//! messages through the [`baton_api::PeerHandle`] collaborators; no state is
//! ever shared in memory across peers.
//!
//! Known limitation: if the peer currently holding the token crashes, the
//! token is gone and every other peer blocks in `acquire` forever. The
//! `status` diagnostic makes that visible (a stuck request shows
//! `request[self] > token[self]` with state `no_token`) but nothing
//! recovers it.

pub mod model;
pub mod service;
pub mod stats;

pub use model::{LockState, LockStatus};
pub use service::TokenLock;
pub use stats::{LockStats, LockStatsCollector};

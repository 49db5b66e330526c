//! Baton server library
//!
//! The binary wires together the lock engine, the peer directory, the
//! inbound listener, the replicated record store, and the operator console.
//! Everything here is plumbing around `baton-lock`, which owns the actual
//! mutual exclusion protocol.

pub mod console;
pub mod model;
pub mod startup;
pub mod store;

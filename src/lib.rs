//! A consistent-hashing ring for client-side partitioning.
//!
//! Maps named nodes onto a 32-bit hash circle and routes each lookup key to
//! the nearest node clockwise, so that adding or removing a node moves only
//! a bounded fraction of keys. No coordinator, no I/O: each process owns an
//! independent in-memory ring.

mod ring;

pub use crate::ring::{DEFAULT_REPLICAS, Ring, RingError};

//! End-to-end tests for placement and redistribution.
//!
//! The suite spins up real nodes on loopback TCP: each test node runs a
//! sync server, a row-file store in a shared temp directory, a shared
//! ring, and a redistribution coordinator, wired exactly like a production
//! process. Membership convergence is simulated by delivering the same
//! events to every node's observer.

#[cfg(test)]
mod utils;

//! # Foundry Test Suite
//!
//! Unified test crate for cross-crate scenarios that no single crate can
//! exercise alone: a real rack agent discovering a real region over HTTP and
//! holding a secured RPC connection to it, and the full service table
//! assembled per role.
//!
//! ## Running Tests
//!
//! ```bash
//! # All tests
//! cargo test -p foundry-tests
//!
//! # By area
//! cargo test -p foundry-tests integration::cluster_flow
//! cargo test -p foundry-tests integration::service_graph
//! ```

#[cfg(test)]
pub mod integration;

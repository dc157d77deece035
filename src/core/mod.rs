//! Core primitives.
//!
//! Small building blocks shared by the simulation and the network layer.

pub mod rng;

// Re-export core types
pub use rng::DeterministicRng;

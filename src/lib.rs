//! Evolution of utility-driven agents.
//!
//! Agents sense their world through an angular sweep, score candidate
//! actions with gene-weighted utility programs, and act on the best ranked
//! one. A [`population::PopulationController`] runs timed generations,
//! ranks agents by fitness, archives the winner, and breeds the next
//! generation from mutated clones of the elites.

pub mod action;
pub mod agent;
pub mod archive;
pub mod arena;
pub mod config;
pub mod error;
pub mod fitness;
pub mod genome;
pub mod manager;
pub mod population;
pub mod properties;
pub mod sensor;
pub mod stats;
pub mod utility;
pub mod world;

/// Random source shared by the whole simulation.
pub type SimRng = rand_chacha::ChaCha12Rng;

//! Contract between the decision engine and the world agents live in.

use crate::SimRng;
use crate::error::EngineError;
use crate::properties::PropertyStore;
use crate::sensor::{Direction, SensorReading, SensorSweep};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Handle of an agent body inside a world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AgentId(pub u64);

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "agent-{}", self.0)
    }
}

/// Change requested by an interaction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum PropertyChange {
    Increment(f64),
    Set(f64),
}

/// Property change for one agent, produced by the world.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionEvent {
    pub agent: AgentId,
    pub property: String,
    pub change: PropertyChange,
}

impl InteractionEvent {
    /// Apply the change to the agent's store.
    pub fn apply(&self, props: &mut PropertyStore) -> Result<(), EngineError> {
        match self.change {
            PropertyChange::Increment(delta) => props.increment(&self.property, delta),
            PropertyChange::Set(value) => props.set(&self.property, value),
        }
    }
}

/// Physical side of a simulation.
///
/// The world owns agent poses, performs sensing and movement, and reports
/// interactions. Calls are synchronous; a slow world slows the whole loop.
pub trait World {
    /// Replace every non-agent object.
    fn generate_objects(&mut self, rng: &mut SimRng);

    /// Remove the bodies spawned for `generator` and spawn `count` new ones.
    fn respawn_agents(&mut self, generator: &str, count: usize, rng: &mut SimRng) -> Vec<AgentId>;

    /// Whether the body of `agent` still exists.
    fn contains(&self, agent: AgentId) -> bool;

    /// Angular sweep from the agent's pose, in sweep order.
    ///
    /// Returns an empty list for agents that no longer exist.
    fn query_sensors(&self, agent: AgentId, sweep: &SensorSweep) -> Vec<SensorReading>;

    /// Set the movement intent of an agent. `None` keeps its heading.
    fn actuate(&mut self, agent: AgentId, direction: Option<Direction>, speed: f64);

    /// Remove all velocity from an agent.
    fn halt(&mut self, agent: AgentId);

    /// Advance physical state by `dt` and report resulting interactions.
    fn step(&mut self, dt: f64) -> Vec<InteractionEvent>;
}

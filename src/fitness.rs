//! End-of-generation performance of an agent.

use crate::error::EngineError;
use crate::properties::{Environment, PropertyStore};

/// Maps an agent's properties to the scalar used for ranking.
///
/// Implementations must be monotonic in the properties they read: ranking
/// compares the returned values directly.
pub trait FitnessEvaluator: Send + Sync {
    fn evaluate(&self, props: &PropertyStore, env: &Environment) -> Result<f64, EngineError>;
}

/// Fitness equal to a single agent property, such as collected points.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyFitness {
    property: String,
}

impl PropertyFitness {
    pub fn new(property: impl Into<String>) -> Self {
        Self {
            property: property.into(),
        }
    }
}

impl FitnessEvaluator for PropertyFitness {
    fn evaluate(&self, props: &PropertyStore, _env: &Environment) -> Result<f64, EngineError> {
        props.get(&self.property)
    }
}

/// Agent property divided by a positive environment property.
///
/// Normalises scores by something like the number of objects spawned, so
/// generations run with different settings stay comparable.
#[derive(Debug, Clone, PartialEq)]
pub struct PerEnvironmentFitness {
    property: String,
    env_property: String,
}

impl PerEnvironmentFitness {
    pub fn new(property: impl Into<String>, env_property: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            env_property: env_property.into(),
        }
    }
}

impl FitnessEvaluator for PerEnvironmentFitness {
    fn evaluate(&self, props: &PropertyStore, env: &Environment) -> Result<f64, EngineError> {
        let value = props.get(&self.property)?;
        let scale = env.get(&self.env_property)?;
        if scale > 0.0 {
            Ok(value / scale)
        } else {
            Ok(value)
        }
    }
}

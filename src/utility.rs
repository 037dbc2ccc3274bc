//! Utility scoring of single sensor readings.

use crate::SimRng;
use crate::error::EngineError;
use crate::genome::{Genome, SIGHT};
use crate::properties::PropertyStore;
use crate::sensor::SensorReading;
use rand_distr::{Distribution, Uniform};
use serde::{Deserialize, Serialize};

/// Scores one sensor reading for an agent.
///
/// Implementations hold no state between calls; the random source is only
/// used to draw exploration noise.
pub trait UtilityFunction: Send + Sync {
    fn score(
        &self,
        genome: &Genome,
        props: &PropertyStore,
        reading: &SensorReading,
        rng: &mut SimRng,
    ) -> Result<f64, EngineError>;

    /// Utility of sensing nothing at all.
    fn baseline(&self, genome: &Genome, rng: &mut SimRng) -> Result<f64, EngineError>;
}

/// Genes weighting one target class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetWeights {
    /// Gene scaling the distance factor.
    pub distance_gene: String,
    /// Gene added regardless of distance.
    pub weight_gene: String,
}

/// Distance-weighted attraction towards classified targets.
///
/// A sensed target of a known class scores
/// `(1 - distance / sight) * D + W`, with `D` and `W` read from the class
/// genes. Misses, unknown classes and a zero sight radius score a uniform
/// draw in `[-R, +R]` where `R` is the exploration gene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetUtility {
    pub exploration_gene: String,
    pub targets: Vec<(String, TargetWeights)>,
}

impl TargetUtility {
    pub fn new(exploration_gene: impl Into<String>) -> Self {
        Self {
            exploration_gene: exploration_gene.into(),
            targets: Vec::new(),
        }
    }

    pub fn with_target(
        mut self,
        class: impl Into<String>,
        distance_gene: impl Into<String>,
        weight_gene: impl Into<String>,
    ) -> Self {
        self.targets.push((
            class.into(),
            TargetWeights {
                distance_gene: distance_gene.into(),
                weight_gene: weight_gene.into(),
            },
        ));
        self
    }

    fn weights(&self, class: &str) -> Option<&TargetWeights> {
        self.targets
            .iter()
            .find(|(name, _)| name == class)
            .map(|(_, weights)| weights)
    }
}

impl UtilityFunction for TargetUtility {
    fn score(
        &self,
        genome: &Genome,
        _props: &PropertyStore,
        reading: &SensorReading,
        rng: &mut SimRng,
    ) -> Result<f64, EngineError> {
        let weights = match (&reading.target_class, reading.hit) {
            (Some(class), true) => self.weights(class),
            _ => None,
        };
        let Some(weights) = weights else {
            return self.baseline(genome, rng);
        };

        let sight = genome.get(SIGHT)?;
        if sight == 0.0 {
            return self.baseline(genome, rng);
        }

        // Not clamped: readings past the sight radius go negative.
        let distance_factor = 1.0 - reading.distance / sight;
        let utility =
            distance_factor * genome.get(&weights.distance_gene)? + genome.get(&weights.weight_gene)?;
        if !utility.is_finite() {
            return self.baseline(genome, rng);
        }
        Ok(utility)
    }

    fn baseline(&self, genome: &Genome, rng: &mut SimRng) -> Result<f64, EngineError> {
        let magnitude = genome.get(&self.exploration_gene)?.abs();
        if magnitude == 0.0 {
            return Ok(0.0);
        }
        // Rejects magnitudes whose range width overflows.
        match Uniform::new_inclusive(-magnitude, magnitude) {
            Ok(noise_dist) => Ok(noise_dist.sample(rng)),
            Err(_) => Ok(0.0),
        }
    }
}

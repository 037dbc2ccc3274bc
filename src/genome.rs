//! Named scalar genes and their mutation.

use crate::error::{EngineError, KeyKind};
use rand::Rng;
use rand_distr::{Bernoulli, Distribution, Uniform};
use serde::{Deserialize, Serialize};

/// Radius of the sensor sweep.
pub const SIGHT: &str = "sight";
/// Angle in degrees between two consecutive sensor rays.
pub const STEP_ANGLE: &str = "step_angle";
/// Number of angular divisions of the sensor sweep.
pub const SIGHT_DIVISIONS: &str = "sight_divisions";
/// Movement speed applied when acting.
pub const MOVING_SPEED: &str = "moving_speed";
/// Percentage chance of picking the best ranked action over the runner-up.
pub const MAX_UTILITY_CHOICE_CHANCE: &str = "max_utility_choice_chance";

/// Genes every activated agent must carry.
pub const REQUIRED_GENES: [&str; 5] = [
    SIGHT,
    STEP_ANGLE,
    SIGHT_DIVISIONS,
    MOVING_SPEED,
    MAX_UTILITY_CHOICE_CHANCE,
];

/// A named scalar parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gene {
    pub name: String,
    pub value: f64,
}

impl Gene {
    pub fn new(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

/// Full set of genes defining the behaviour of one agent.
///
/// Genes are held by value and kept in declaration order, so cloning a genome
/// never shares a gene with its source and seeded mutation is reproducible.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Genome {
    genes: Vec<Gene>,
}

impl Genome {
    /// Build a genome from declared genes.
    ///
    /// # Errors
    /// Fails if a gene name is declared twice or a required gene is absent.
    pub fn from_declared(genes: Vec<Gene>) -> Result<Self, EngineError> {
        for (i_gene, gene) in genes.iter().enumerate() {
            if genes[..i_gene].iter().any(|other| other.name == gene.name) {
                return Err(EngineError::DuplicateKey {
                    kind: KeyKind::Gene,
                    name: gene.name.clone(),
                });
            }
        }

        let genome = Self { genes };
        genome.check_required()?;
        Ok(genome)
    }

    /// Ensure every required gene is present.
    pub fn check_required(&self) -> Result<(), EngineError> {
        match REQUIRED_GENES.iter().find(|name| !self.contains(name)) {
            Some(name) => Err(EngineError::MissingGene(name.to_string())),
            None => Ok(()),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.genes.iter().any(|gene| gene.name == name)
    }

    pub fn get(&self, name: &str) -> Result<f64, EngineError> {
        self.genes
            .iter()
            .find(|gene| gene.name == name)
            .map(|gene| gene.value)
            .ok_or_else(|| EngineError::unknown(KeyKind::Gene, name))
    }

    pub fn genes(&self) -> &[Gene] {
        &self.genes
    }

    pub fn len(&self) -> usize {
        self.genes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.genes.is_empty()
    }

    /// Perturb genes in place.
    ///
    /// Each gene independently has a `chance_percent` percent chance of
    /// receiving an additive delta drawn uniformly from `[-factor, +factor]`.
    /// Non-finite parameters leave the genome untouched.
    pub fn mutate<R: Rng + ?Sized>(&mut self, factor: f64, chance_percent: f64, rng: &mut R) {
        let Ok(mut_dist) = Bernoulli::new((chance_percent / 100.0).clamp(0.0, 1.0)) else {
            return;
        };
        let factor = factor.abs();
        let Ok(delta_dist) = Uniform::new_inclusive(-factor, factor) else {
            return;
        };
        for gene in &mut self.genes {
            if mut_dist.sample(rng) {
                gene.value += delta_dist.sample(rng);
            }
        }
    }
}

use crate::SimRng;
use crate::action::ActionKind;
use crate::agent::{ActionSpec, AgentTemplate};
use crate::arena::ArenaConfig;
use crate::fitness::{FitnessEvaluator, PerEnvironmentFitness, PropertyFitness};
use crate::genome::{
    Gene, Genome, MAX_UTILITY_CHOICE_CHANCE, MOVING_SPEED, SIGHT, SIGHT_DIVISIONS, STEP_ANGLE,
};
use crate::population::{AgentGenerator, EvolutionParams};
use crate::properties::Environment;
use crate::sensor::MAX_SIGHT_DIVISIONS;
use crate::utility::{TargetUtility, TargetWeights, UtilityFunction};
use anyhow::{Context, Result, bail};
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt::Debug, fs, ops::RangeBounds, path::Path, sync::Arc};

/// Simulation configuration parameters.
///
/// Loaded from a TOML file and validated before use.
/// See [`Config::from_file`] for loading.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Config {
    pub simulation: SimulationConfig,
    pub evolution: EvolutionConfig,
    #[serde(default)]
    pub environment: BTreeMap<String, f64>,
    pub arena: ArenaConfig,
    /// Utility programs, by name.
    pub programs: BTreeMap<String, ProgramConfig>,
    /// Agent generators, evolved independently.
    pub agents: Vec<AgentConfig>,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Seed of the random source (drawn from the OS if absent).
    pub seed: Option<u64>,
    /// Simulated time per tick.
    pub tick: f64,
    /// Simulated time per generation.
    pub generation_length: f64,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct EvolutionConfig {
    /// Bound of the additive mutation delta.
    pub mutation_factor: f64,
    /// Per-gene mutation chance, in percent.
    pub mutation_chance: f64,
    /// Number of parents kept per generation.
    pub parent_size: usize,
    /// Label used when naming archived templates.
    #[serde(default = "default_generation_label")]
    pub generation_label: String,
}

fn default_generation_label() -> String {
    "gen".to_string()
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct ProgramConfig {
    /// Gene bounding the exploration noise.
    pub exploration_gene: String,
    /// Genes weighting each target class.
    #[serde(default)]
    pub targets: BTreeMap<String, TargetWeights>,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct ActionConfig {
    pub kind: ActionKind,
    pub program: String,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct FitnessConfig {
    /// Agent property read as fitness.
    pub property: String,
    /// Environment property dividing the agent property.
    pub per_environment: Option<String>,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub name: String,
    pub count: usize,
    pub genes: BTreeMap<String, f64>,
    #[serde(default)]
    pub properties: BTreeMap<String, f64>,
    pub actions: Vec<ActionConfig>,
    pub fitness: FitnessConfig,
}

impl Config {
    /// Load a [`Config`] from a file.
    ///
    /// The file must be TOML-encoded and contain a serialized [`Config`].
    /// Performs validation on all parameters before returning.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, deserialized,
    /// or if the configuration values are invalid.
    pub fn from_file<P: AsRef<Path>>(file: P) -> Result<Self> {
        let file = file.as_ref();
        let contents =
            fs::read_to_string(file).with_context(|| format!("failed to read {file:?}"))?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents).context("failed to deserialize config")?;
        config.validate().context("failed to validate config")?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        let sim = &self.simulation;
        check_num(sim.tick, 1e-6..=10.0).context("invalid tick")?;
        check_num(sim.generation_length, sim.tick..1e6).context("invalid generation length")?;

        let evo = &self.evolution;
        check_num(evo.mutation_factor, 0.0..1e6).context("invalid mutation factor")?;
        check_num(evo.mutation_chance, 0.0..=100.0).context("invalid mutation chance")?;
        check_num(evo.parent_size, 1..10_000).context("invalid parent size")?;

        let arena = &self.arena;
        check_num(arena.width, 1e-3..1e6).context("invalid arena width")?;
        check_num(arena.height, 1e-3..1e6).context("invalid arena height")?;
        check_num(arena.agent_radius, 0.0..1e3).context("invalid agent radius")?;
        check_num(arena.object_radius, 0.0..1e3).context("invalid object radius")?;

        if self.agents.is_empty() {
            bail!("at least one agent generator must be configured");
        }
        for (i_agt, agt) in self.agents.iter().enumerate() {
            if self.agents[..i_agt].iter().any(|other| other.name == agt.name) {
                bail!("agent generator {:?} is declared more than once", agt.name);
            }
            self.validate_agent(agt)
                .with_context(|| format!("invalid agent generator {:?}", agt.name))?;
        }

        for rule in &arena.interactions {
            let Some(agt) = self.agents.iter().find(|agt| agt.name == rule.agent) else {
                bail!("interaction rule names unknown agent {:?}", rule.agent);
            };
            if !agt.properties.contains_key(&rule.property) {
                bail!(
                    "interaction rule changes undeclared property {:?} of {:?}",
                    rule.property,
                    rule.agent
                );
            }
        }

        Ok(())
    }

    fn validate_agent(&self, agt: &AgentConfig) -> Result<()> {
        check_num(agt.count, 1..100_000).context("invalid agent count")?;

        Genome::from_declared(declared_genes(agt)).context("invalid declared genes")?;
        for (name, &value) in &agt.genes {
            if !value.is_finite() {
                bail!("gene {name:?} must be finite, but is {value:?}");
            }
        }

        let gene = |name: &str| {
            agt.genes
                .get(name)
                .copied()
                .with_context(|| format!("missing gene {name:?}"))
        };
        check_num(gene(SIGHT)?, 1e-6..1e6).context("invalid sight")?;
        check_num(gene(STEP_ANGLE)?, 0.0..=360.0).context("invalid step angle")?;
        check_num(gene(SIGHT_DIVISIONS)?, 0.0..=MAX_SIGHT_DIVISIONS as f64)
            .context("invalid sight divisions")?;
        check_num(gene(MOVING_SPEED)?, 0.0..1e6).context("invalid moving speed")?;
        check_num(gene(MAX_UTILITY_CHOICE_CHANCE)?, 0.0..=100.0)
            .context("invalid max utility choice chance")?;

        if agt.actions.is_empty() {
            bail!("at least one action must be configured");
        }
        for action in &agt.actions {
            let Some(program) = self.programs.get(&action.program) else {
                bail!("action refers to unknown program {:?}", action.program);
            };
            let mut genes = vec![&program.exploration_gene];
            for weights in program.targets.values() {
                genes.push(&weights.distance_gene);
                genes.push(&weights.weight_gene);
            }
            if let Some(gene) = genes.into_iter().find(|gene| !agt.genes.contains_key(*gene)) {
                bail!("program {:?} reads undeclared gene {gene:?}", action.program);
            }
        }

        if !agt.properties.contains_key(&agt.fitness.property) {
            bail!("fitness reads undeclared property {:?}", agt.fitness.property);
        }
        if let Some(env_prop) = &agt.fitness.per_environment {
            if !self.environment.contains_key(env_prop) {
                bail!("fitness reads undeclared environment property {env_prop:?}");
            }
        }

        Ok(())
    }

    pub fn evolution_params(&self) -> EvolutionParams {
        EvolutionParams {
            mutation_factor: self.evolution.mutation_factor,
            mutation_chance: self.evolution.mutation_chance,
            parent_size: self.evolution.parent_size,
            generation_length: self.simulation.generation_length,
            generation_label: self.evolution.generation_label.clone(),
        }
    }

    pub fn environment(&self) -> Environment {
        Environment::new(self.environment.iter().map(|(name, &value)| (name.as_str(), value)))
    }

    /// Random source seeded from the config, or from the OS.
    pub fn rng(&self) -> Result<SimRng> {
        match self.simulation.seed {
            Some(seed) => Ok(SimRng::seed_from_u64(seed)),
            None => SimRng::try_from_os_rng().context("failed to seed rng from the OS"),
        }
    }

    /// Build one generator per configured agent template.
    pub fn generators(&self) -> Result<Vec<AgentGenerator>> {
        let mut programs: BTreeMap<&str, Arc<dyn UtilityFunction>> = BTreeMap::new();
        for (name, program) in &self.programs {
            let utility = TargetUtility {
                exploration_gene: program.exploration_gene.clone(),
                targets: program
                    .targets
                    .iter()
                    .map(|(class, weights)| (class.clone(), weights.clone()))
                    .collect(),
            };
            programs.insert(name.as_str(), Arc::new(utility));
        }

        let mut generators = Vec::with_capacity(self.agents.len());
        for agt in &self.agents {
            let mut actions = Vec::with_capacity(agt.actions.len());
            for action in &agt.actions {
                let utility = programs
                    .get(action.program.as_str())
                    .with_context(|| format!("unknown program {:?}", action.program))?;
                actions.push(ActionSpec {
                    kind: action.kind,
                    utility: Arc::clone(utility),
                });
            }

            let fitness: Arc<dyn FitnessEvaluator> = match &agt.fitness.per_environment {
                Some(env_prop) => Arc::new(PerEnvironmentFitness::new(
                    agt.fitness.property.as_str(),
                    env_prop.as_str(),
                )),
                None => Arc::new(PropertyFitness::new(agt.fitness.property.as_str())),
            };

            let template = AgentTemplate {
                name: agt.name.clone(),
                genes: declared_genes(agt),
                properties: agt
                    .properties
                    .iter()
                    .map(|(name, &baseline)| (name.clone(), baseline))
                    .collect(),
                actions,
                fitness,
            };
            generators.push(AgentGenerator {
                template: Arc::new(template),
                count: agt.count,
            });
        }
        Ok(generators)
    }
}

fn declared_genes(agt: &AgentConfig) -> Vec<Gene> {
    agt.genes
        .iter()
        .map(|(name, &value)| Gene::new(name.as_str(), value))
        .collect()
}

fn check_num<T, R>(num: T, range: R) -> Result<()>
where
    T: PartialOrd + Debug,
    R: RangeBounds<T> + Debug,
{
    if !range.contains(&num) {
        bail!("number must be in the range {range:?}, but is {num:?}");
    }
    Ok(())
}

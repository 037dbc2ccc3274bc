//! Agents and the templates they are born from.

use crate::SimRng;
use crate::action::{Action, ActionKind, ActionSelector};
use crate::error::EngineError;
use crate::fitness::FitnessEvaluator;
use crate::genome::{Gene, Genome, MAX_UTILITY_CHOICE_CHANCE, MOVING_SPEED};
use crate::properties::{Environment, PropertyStore};
use crate::sensor::SensorSweep;
use crate::utility::UtilityFunction;
use crate::world::{AgentId, World};
use std::sync::Arc;

/// Action an agent template provides, with the program scoring it.
#[derive(Clone)]
pub struct ActionSpec {
    pub kind: ActionKind,
    pub utility: Arc<dyn UtilityFunction>,
}

/// Declared definition shared by every agent of a generator.
///
/// Carries the non-inherited genes used for fresh populations, the property
/// baselines, the available actions, and the fitness evaluator.
pub struct AgentTemplate {
    pub name: String,
    pub genes: Vec<Gene>,
    pub properties: Vec<(String, f64)>,
    pub actions: Vec<ActionSpec>,
    pub fitness: Arc<dyn FitnessEvaluator>,
}

impl AgentTemplate {
    /// Genome built from the declared genes.
    pub fn declared_genome(&self) -> Result<Genome, EngineError> {
        Genome::from_declared(self.genes.clone())
    }

    fn new_properties(&self) -> PropertyStore {
        let mut props = PropertyStore::new();
        for (name, baseline) in &self.properties {
            props.declare(name.as_str(), *baseline);
        }
        props
    }

    fn new_selector(&self) -> ActionSelector {
        let actions = self
            .actions
            .iter()
            .map(|spec| Action::new(spec.kind, Arc::clone(&spec.utility)))
            .collect();
        ActionSelector::new(actions)
    }
}

/// Unit of selection and reproduction.
pub struct Agent {
    id: AgentId,
    template: Arc<AgentTemplate>,
    genome: Genome,
    props: PropertyStore,
    selector: ActionSelector,
    fitness: f64,
    awake: bool,
}

impl Agent {
    /// Create an asleep agent carrying `genome`, with baseline properties.
    ///
    /// # Errors
    /// Fails if the genome lacks a required gene.
    pub fn birth(
        id: AgentId,
        template: Arc<AgentTemplate>,
        genome: Genome,
    ) -> Result<Self, EngineError> {
        genome.check_required()?;
        Ok(Self {
            id,
            props: template.new_properties(),
            selector: template.new_selector(),
            template,
            genome,
            fitness: 0.0,
            awake: false,
        })
    }

    pub fn id(&self) -> AgentId {
        self.id
    }

    pub fn template(&self) -> &AgentTemplate {
        &self.template
    }

    pub fn genome(&self) -> &Genome {
        &self.genome
    }

    pub fn properties(&self) -> &PropertyStore {
        &self.props
    }

    pub fn properties_mut(&mut self) -> &mut PropertyStore {
        &mut self.props
    }

    pub fn fitness(&self) -> f64 {
        self.fitness
    }

    pub fn is_awake(&self) -> bool {
        self.awake
    }

    pub fn wake_up(&mut self) {
        self.awake = true;
    }

    pub fn sleep<W: World>(&mut self, world: &mut W) {
        self.awake = false;
        world.halt(self.id);
    }

    /// Sense, score the actions, and actuate the chosen one.
    pub fn tick<W: World>(&mut self, world: &mut W, rng: &mut SimRng) -> Result<(), EngineError> {
        if !self.awake {
            return Ok(());
        }

        let sweep = SensorSweep::from_genome(&self.genome)?;
        let readings = world.query_sensors(self.id, &sweep);

        self.selector
            .evaluate_all(&self.genome, &self.props, &readings, rng)?;
        let exploration = self.genome.get(MAX_UTILITY_CHOICE_CHANCE)?;
        let Some(cmd) = self.selector.select_and_act(exploration, rng)? else {
            world.halt(self.id);
            return Ok(());
        };

        world.actuate(self.id, cmd.direction, self.genome.get(MOVING_SPEED)?);
        Ok(())
    }

    /// Evaluate and store the fitness of this agent.
    pub fn evaluate_fitness(&mut self, env: &Environment) -> Result<f64, EngineError> {
        self.fitness = self.template.fitness.evaluate(&self.props, env)?;
        Ok(self.fitness)
    }
}

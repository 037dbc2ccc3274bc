//! Generational population controller.

use crate::SimRng;
use crate::action::rank_descending;
use crate::agent::{Agent, AgentTemplate};
use crate::archive::{Archive, ArchiveEntry};
use crate::error::EngineError;
use crate::genome::Genome;
use crate::properties::Environment;
use crate::stats::{Accumulator, GenerationReport};
use crate::world::World;
use rand::Rng;
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

/// Selection, mutation and timing parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct EvolutionParams {
    /// Bound of the additive mutation delta.
    pub mutation_factor: f64,
    /// Per-gene mutation chance, in percent.
    pub mutation_chance: f64,
    /// Number of top-ranked agents used as parents.
    pub parent_size: usize,
    /// Simulated time per generation.
    pub generation_length: f64,
    /// Label inserted in archived template names.
    pub generation_label: String,
}

/// Template and head count of one independently evolving cohort.
#[derive(Clone)]
pub struct AgentGenerator {
    pub template: Arc<AgentTemplate>,
    pub count: usize,
}

struct Cohort {
    generator: AgentGenerator,
    agents: Vec<Agent>,
}

/// Lifecycle phase of the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Running,
    Evaluating,
    Ranking,
    Selecting,
    Archiving,
    Reproducing,
    Stopped,
}

impl Phase {
    fn is_active(self) -> bool {
        !matches!(self, Phase::Idle | Phase::Stopped)
    }
}

/// Shared flag requesting a cooperative stop.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn request_stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Owns the population and drives it through timed generations.
///
/// Every tick the awake agents sense and act, then the world advances and
/// its interaction events are applied. Once a generation has lasted
/// `generation_length`, each cohort is evaluated, ranked, has its best
/// genome archived, and is replaced by mutated clones of its elites. The
/// whole boundary runs before any agent ticks again.
pub struct PopulationController<W, A> {
    params: EvolutionParams,
    world: W,
    archive: A,
    env: Environment,
    cohorts: Vec<Cohort>,
    rng: SimRng,
    phase: Phase,
    elapsed: f64,
    generation: u64,
    stop: StopHandle,
    history: Vec<GenerationReport>,
}

impl<W: World, A: Archive> PopulationController<W, A> {
    pub fn new(
        params: EvolutionParams,
        generators: Vec<AgentGenerator>,
        world: W,
        archive: A,
        env: Environment,
        rng: SimRng,
    ) -> Self {
        let cohorts = generators
            .into_iter()
            .map(|generator| Cohort {
                generator,
                agents: Vec::new(),
            })
            .collect();

        Self {
            params,
            world,
            archive,
            env,
            cohorts,
            rng,
            phase: Phase::Idle,
            elapsed: 0.0,
            generation: 0,
            stop: StopHandle::default(),
            history: Vec::new(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn history(&self) -> &[GenerationReport] {
        &self.history
    }

    pub fn world(&self) -> &W {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut W {
        &mut self.world
    }

    pub fn archive(&self) -> &A {
        &self.archive
    }

    pub fn environment(&self) -> &Environment {
        &self.env
    }

    pub fn environment_mut(&mut self) -> &mut Environment {
        &mut self.env
    }

    pub fn n_cohorts(&self) -> usize {
        self.cohorts.len()
    }

    pub fn template(&self, i_cohort: usize) -> &AgentTemplate {
        &self.cohorts[i_cohort].generator.template
    }

    pub fn agents(&self, i_cohort: usize) -> &[Agent] {
        &self.cohorts[i_cohort].agents
    }

    pub fn agents_mut(&mut self, i_cohort: usize) -> &mut [Agent] {
        &mut self.cohorts[i_cohort].agents
    }

    /// Spawn objects and a fresh population, then start running.
    pub fn start_simulation(&mut self) -> Result<(), EngineError> {
        self.stop.clear();
        self.generate_objects();
        self.generate_agents(true)?;
        self.elapsed = 0.0;
        self.set_phase(Phase::Running);
        Ok(())
    }

    /// Put every agent to sleep and stop advancing time.
    ///
    /// Agent properties are kept for inspection.
    pub fn stop_simulation(&mut self) {
        for cohort in &mut self.cohorts {
            cohort.agents.retain(|agent| self.world.contains(agent.id()));
            for agent in &mut cohort.agents {
                agent.sleep(&mut self.world);
            }
        }
        self.set_phase(Phase::Stopped);
    }

    /// Breed a new generation from the current population and resume.
    pub fn continue_simulation(&mut self) -> Result<(), EngineError> {
        self.stop.clear();
        self.make_new_generation()?;
        self.elapsed = 0.0;
        Ok(())
    }

    pub fn generate_objects(&mut self) {
        self.world.generate_objects(&mut self.rng);
    }

    /// Replace every cohort with agents carrying declared genomes.
    pub fn generate_agents(&mut self, wake: bool) -> Result<(), EngineError> {
        for cohort in &mut self.cohorts {
            spawn_declared(cohort, &mut self.world, &mut self.rng, wake)?;
        }
        Ok(())
    }

    /// Replace a cohort with agents carrying the given genomes.
    ///
    /// Genomes are handed out in order and reused cyclically when there are
    /// fewer genomes than open slots, as when resuming from archived winners.
    pub fn seed_agents(
        &mut self,
        i_cohort: usize,
        genomes: &[Genome],
        wake: bool,
    ) -> Result<(), EngineError> {
        let cohort = &mut self.cohorts[i_cohort];
        if genomes.is_empty() {
            spawn_declared(cohort, &mut self.world, &mut self.rng, wake)
        } else {
            spawn_cohort(cohort, &mut self.world, &mut self.rng, genomes, wake)
        }
    }

    /// Advance the simulation by `dt`.
    pub fn tick(&mut self, dt: f64) -> Result<(), EngineError> {
        if self.stop.is_requested() && self.phase.is_active() {
            self.stop_simulation();
            return Ok(());
        }
        if self.phase != Phase::Running {
            return Ok(());
        }

        if self.elapsed >= self.params.generation_length {
            self.make_new_generation()?;
            // Absorbs the tick that is added right below.
            self.elapsed = -dt;
            if self.stop.is_requested() {
                self.stop_simulation();
                return Ok(());
            }
        }
        self.elapsed += dt;

        for cohort in &mut self.cohorts {
            for agent in &mut cohort.agents {
                if self.world.contains(agent.id()) {
                    agent.tick(&mut self.world, &mut self.rng)?;
                }
            }
        }

        for event in self.world.step(dt) {
            let agent = self
                .cohorts
                .iter_mut()
                .flat_map(|cohort| cohort.agents.iter_mut())
                .find(|agent| agent.id() == event.agent);
            match agent {
                Some(agent) => event.apply(agent.properties_mut())?,
                None => log::debug!("dropped event for missing {}", event.agent),
            }
        }

        Ok(())
    }

    /// Run the generation boundary for every cohort and resume running.
    pub fn make_new_generation(&mut self) -> Result<(), EngineError> {
        self.generation += 1;
        self.generate_objects();

        for i_cohort in 0..self.cohorts.len() {
            let report = self.evolve_cohort(i_cohort)?;
            log::info!(
                "generation {} {}: survivors {}, elites {}, best {:.3}, mean {:.3}",
                report.generation,
                report.template,
                report.survivors,
                report.elites,
                report.fitness.max,
                report.fitness.mean
            );
            self.history.push(report);
        }

        self.set_phase(Phase::Running);
        Ok(())
    }

    fn evolve_cohort(&mut self, i_cohort: usize) -> Result<GenerationReport, EngineError> {
        let generation = self.generation;
        let cohort = &mut self.cohorts[i_cohort];
        let template = Arc::clone(&cohort.generator.template);

        set_phase(&mut self.phase, Phase::Evaluating);
        cohort.agents.retain(|agent| self.world.contains(agent.id()));
        let mut acc = Accumulator::new();
        for agent in &mut cohort.agents {
            acc.add(agent.evaluate_fitness(&self.env)?);
        }

        set_phase(&mut self.phase, Phase::Ranking);
        cohort
            .agents
            .sort_by(|a, b| rank_descending(a.fitness(), b.fitness()));

        set_phase(&mut self.phase, Phase::Selecting);
        let n_elite = cohort
            .generator
            .count
            .min(self.params.parent_size.min(cohort.agents.len()));

        let mut report = GenerationReport {
            generation,
            template: template.name.clone(),
            survivors: cohort.agents.len(),
            elites: n_elite,
            fitness: acc.report(),
        };

        if n_elite == 0 {
            log::warn!(
                "generation {generation} {}: no survivors, bootstrapping a fresh population",
                template.name
            );
            set_phase(&mut self.phase, Phase::Reproducing);
            spawn_declared(cohort, &mut self.world, &mut self.rng, true)?;
            report.elites = 0;
            return Ok(report);
        }

        // Snapshots, so breeding never touches the live elites.
        let elites: Vec<Genome> = cohort.agents[..n_elite]
            .iter()
            .map(|agent| agent.genome().clone())
            .collect();

        set_phase(&mut self.phase, Phase::Archiving);
        let best = &cohort.agents[0];
        let entry = ArchiveEntry {
            name: format!(
                "{}-{}-{generation:04}",
                template.name, self.params.generation_label
            ),
            template: template.name.clone(),
            generation,
            fitness: best.fitness(),
            genome: elites[0].clone(),
        };
        match self.archive.save_template(&entry) {
            Ok(location) => log::debug!("archived {} at {location}", entry.name),
            Err(error) => log::error!("failed to archive {}: {error:#}", entry.name),
        }

        set_phase(&mut self.phase, Phase::Reproducing);
        let ids = self
            .world
            .respawn_agents(&template.name, cohort.generator.count, &mut self.rng);
        let mut offspring = Vec::with_capacity(ids.len());
        for id in ids {
            let i_parent = self.rng.random_range(0..elites.len());
            let mut genome = elites[i_parent].clone();
            genome.mutate(
                self.params.mutation_factor,
                self.params.mutation_chance,
                &mut self.rng,
            );
            let mut agent = Agent::birth(id, Arc::clone(&template), genome)?;
            agent.wake_up();
            offspring.push(agent);
        }
        cohort.agents = offspring;

        Ok(report)
    }

    fn set_phase(&mut self, phase: Phase) {
        set_phase(&mut self.phase, phase);
    }
}

fn set_phase(current: &mut Phase, phase: Phase) {
    if *current != phase {
        log::debug!("{current:?} -> {phase:?}");
        *current = phase;
    }
}

fn spawn_declared<W: World>(
    cohort: &mut Cohort,
    world: &mut W,
    rng: &mut SimRng,
    wake: bool,
) -> Result<(), EngineError> {
    let genome = cohort.generator.template.declared_genome()?;
    spawn_cohort(cohort, world, rng, std::slice::from_ref(&genome), wake)
}

fn spawn_cohort<W: World>(
    cohort: &mut Cohort,
    world: &mut W,
    rng: &mut SimRng,
    genomes: &[Genome],
    wake: bool,
) -> Result<(), EngineError> {
    let template = Arc::clone(&cohort.generator.template);
    let ids = world.respawn_agents(&template.name, cohort.generator.count, rng);

    let mut agents = Vec::with_capacity(ids.len());
    for (id, genome) in ids.into_iter().zip(genomes.iter().cycle()) {
        let mut agent = Agent::birth(id, Arc::clone(&template), genome.clone())?;
        if wake {
            agent.wake_up();
        }
        agents.push(agent);
    }
    cohort.agents = agents;
    Ok(())
}

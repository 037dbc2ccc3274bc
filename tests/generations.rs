use anyhow::bail;
use onca::SimRng;
use onca::action::ActionKind;
use onca::agent::{ActionSpec, AgentTemplate};
use onca::archive::{Archive, ArchiveEntry, MemoryArchive};
use onca::fitness::PropertyFitness;
use onca::genome::{
    Gene, Genome, MAX_UTILITY_CHOICE_CHANCE, MOVING_SPEED, SIGHT, SIGHT_DIVISIONS, STEP_ANGLE,
};
use onca::population::{AgentGenerator, EvolutionParams, Phase, PopulationController};
use onca::properties::Environment;
use onca::sensor::{Direction, SensorReading, SensorSweep};
use onca::utility::TargetUtility;
use onca::world::{AgentId, InteractionEvent, PropertyChange, World};
use rand::SeedableRng;
use std::sync::Arc;

/// World where every agent always sees a box straight ahead.
#[derive(Default)]
struct StubWorld {
    next_id: u64,
    bodies: Vec<(AgentId, String)>,
    object_generations: usize,
    actuations: usize,
    halted: Vec<AgentId>,
    pending: Vec<InteractionEvent>,
}

impl StubWorld {
    fn remove(&mut self, agent: AgentId) {
        self.bodies.retain(|(id, _)| *id != agent);
    }
}

impl World for StubWorld {
    fn generate_objects(&mut self, _rng: &mut SimRng) {
        self.object_generations += 1;
    }

    fn respawn_agents(&mut self, generator: &str, count: usize, _rng: &mut SimRng) -> Vec<AgentId> {
        self.bodies.retain(|(_, name)| name != generator);
        (0..count)
            .map(|_| {
                let id = AgentId(self.next_id);
                self.next_id += 1;
                self.bodies.push((id, generator.to_string()));
                id
            })
            .collect()
    }

    fn contains(&self, agent: AgentId) -> bool {
        self.bodies.iter().any(|(id, _)| *id == agent)
    }

    fn query_sensors(&self, agent: AgentId, sweep: &SensorSweep) -> Vec<SensorReading> {
        if !self.contains(agent) {
            return Vec::new();
        }
        sweep
            .directions(Direction::from_degrees(0.0))
            .into_iter()
            .map(|dir| SensorReading::hit(dir, "box", 2.0))
            .collect()
    }

    fn actuate(&mut self, _agent: AgentId, _direction: Option<Direction>, _speed: f64) {
        self.actuations += 1;
    }

    fn halt(&mut self, agent: AgentId) {
        self.halted.push(agent);
    }

    fn step(&mut self, _dt: f64) -> Vec<InteractionEvent> {
        std::mem::take(&mut self.pending)
    }
}

struct FailingArchive;

impl Archive for FailingArchive {
    fn save_template(&mut self, entry: &ArchiveEntry) -> anyhow::Result<String> {
        bail!("disk full while writing {}", entry.name)
    }
}

fn declared_genes(tag: f64) -> Vec<Gene> {
    vec![
        Gene::new(SIGHT, 10.0),
        Gene::new(STEP_ANGLE, 30.0),
        Gene::new(SIGHT_DIVISIONS, 4.0),
        Gene::new(MOVING_SPEED, 1.5),
        Gene::new(MAX_UTILITY_CHOICE_CHANCE, 90.0),
        Gene::new("random_utility", 0.1),
        Gene::new("d_box", 1.0),
        Gene::new("w_box", 1.0),
        Gene::new("tag", tag),
    ]
}

fn tagged(tag: f64) -> Genome {
    Genome::from_declared(declared_genes(tag)).unwrap()
}

fn generator(count: usize) -> AgentGenerator {
    let program = TargetUtility::new("random_utility").with_target("box", "d_box", "w_box");
    let template = AgentTemplate {
        name: "boat".to_string(),
        genes: declared_genes(-1.0),
        properties: vec![("points".to_string(), 0.0)],
        actions: vec![
            ActionSpec {
                kind: ActionKind::Seek,
                utility: Arc::new(program.clone()),
            },
            ActionSpec {
                kind: ActionKind::Flee,
                utility: Arc::new(program),
            },
        ],
        fitness: Arc::new(PropertyFitness::new("points")),
    };
    AgentGenerator {
        template: Arc::new(template),
        count,
    }
}

fn params(parent_size: usize, mutation_chance: f64) -> EvolutionParams {
    EvolutionParams {
        mutation_factor: 0.5,
        mutation_chance,
        parent_size,
        generation_length: 1.0,
        generation_label: "gen".to_string(),
    }
}

fn controller<A: Archive>(
    count: usize,
    parent_size: usize,
    mutation_chance: f64,
    archive: A,
) -> PopulationController<StubWorld, A> {
    PopulationController::new(
        params(parent_size, mutation_chance),
        vec![generator(count)],
        StubWorld::default(),
        archive,
        Environment::default(),
        SimRng::seed_from_u64(1234),
    )
}

fn set_points<A: Archive>(ctrl: &mut PopulationController<StubWorld, A>, points: &[f64]) {
    for (agent, &val) in ctrl.agents_mut(0).iter_mut().zip(points) {
        agent.properties_mut().set("points", val).unwrap();
    }
}

fn tag_of(genome: &Genome) -> f64 {
    genome.get("tag").unwrap()
}

#[test]
fn elites_breed_unmutated_clones_over_three_generations() {
    let mut ctrl = controller(4, 2, 0.0, MemoryArchive::default());
    ctrl.start_simulation().unwrap();
    let genomes: Vec<_> = (0..4).map(|i| tagged(i as f64)).collect();
    ctrl.seed_agents(0, &genomes, true).unwrap();
    set_points(&mut ctrl, &[10.0, 7.0, 3.0, 1.0]);

    ctrl.make_new_generation().unwrap();
    assert_eq!(ctrl.generation(), 1);
    assert_eq!(ctrl.agents(0).len(), 4);
    for agent in ctrl.agents(0) {
        let genome = agent.genome();
        assert!(*genome == genomes[0] || *genome == genomes[1]);
        assert_eq!(agent.template().name, "boat");
        assert!(agent.properties().is_at_baseline());
        assert!(agent.is_awake());
    }

    let entries = &ctrl.archive().entries;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].name, "boat-gen-0001");
    assert_eq!(entries[0].generation, 1);
    assert_eq!(entries[0].fitness, 10.0);
    assert_eq!(tag_of(&entries[0].genome), 0.0);

    for _ in 0..2 {
        set_points(&mut ctrl, &[4.0, 2.0, 8.0, 1.0]);
        ctrl.make_new_generation().unwrap();
        for agent in ctrl.agents(0) {
            let tag = tag_of(agent.genome());
            assert!(tag == 0.0 || tag == 1.0);
        }
    }
    assert_eq!(ctrl.generation(), 3);
    assert_eq!(ctrl.archive().entries.len(), 3);
    assert_eq!(ctrl.history().len(), 3);
    assert_eq!(ctrl.history()[0].fitness.max, 10.0);
    assert_eq!(ctrl.history()[0].elites, 2);
}

#[test]
fn equal_fitness_keeps_the_seeded_order() {
    let mut ctrl = controller(4, 1, 0.0, MemoryArchive::default());
    ctrl.start_simulation().unwrap();
    let genomes: Vec<_> = (0..4).map(|i| tagged(i as f64)).collect();
    ctrl.seed_agents(0, &genomes, true).unwrap();
    set_points(&mut ctrl, &[1.0, 5.0, 5.0, 3.0]);

    ctrl.make_new_generation().unwrap();
    assert_eq!(tag_of(&ctrl.archive().entries[0].genome), 1.0);
    assert!(ctrl.agents(0).iter().all(|agent| tag_of(agent.genome()) == 1.0));
}

#[test]
fn signed_zero_fitness_counts_as_a_tie() {
    let mut ctrl = controller(2, 1, 0.0, MemoryArchive::default());
    ctrl.start_simulation().unwrap();
    let genomes: Vec<_> = (0..2).map(|i| tagged(i as f64)).collect();
    ctrl.seed_agents(0, &genomes, true).unwrap();
    set_points(&mut ctrl, &[-0.0, 0.0]);

    ctrl.make_new_generation().unwrap();
    assert_eq!(tag_of(&ctrl.archive().entries[0].genome), 0.0);
    assert!(ctrl.agents(0).iter().all(|agent| tag_of(agent.genome()) == 0.0));
}

#[test]
fn offspring_mutation_never_alters_the_archived_parent() {
    let mut ctrl = controller(6, 2, 100.0, MemoryArchive::default());
    ctrl.start_simulation().unwrap();
    set_points(&mut ctrl, &[3.0, 1.0]);

    ctrl.make_new_generation().unwrap();
    let parent = ctrl.archive().entries[0].genome.clone();
    assert_eq!(parent, tagged(-1.0));
    for agent in ctrl.agents(0) {
        assert_ne!(*agent.genome(), parent);
        for (child, declared) in agent.genome().genes().iter().zip(parent.genes()) {
            assert!((child.value - declared.value).abs() <= 0.5);
        }
    }
}

#[test]
fn extinct_population_is_bootstrapped_from_declared_genes() {
    let mut ctrl = controller(5, 2, 50.0, MemoryArchive::default());
    ctrl.start_simulation().unwrap();
    set_points(&mut ctrl, &[2.0, 4.0, 6.0, 8.0, 10.0]);

    let ids: Vec<_> = ctrl.agents(0).iter().map(|agent| agent.id()).collect();
    for id in ids {
        ctrl.world_mut().remove(id);
    }

    ctrl.make_new_generation().unwrap();
    assert_eq!(ctrl.phase(), Phase::Running);
    assert_eq!(ctrl.agents(0).len(), 5);
    for agent in ctrl.agents(0) {
        assert_eq!(*agent.genome(), tagged(-1.0));
        assert!(agent.properties().is_at_baseline());
        assert!(agent.is_awake());
    }
    assert!(ctrl.archive().entries.is_empty());
    assert_eq!(ctrl.history()[0].survivors, 0);
    assert_eq!(ctrl.history()[0].elites, 0);
}

#[test]
fn elite_pool_is_clamped_to_survivors() {
    let mut ctrl = controller(4, 3, 0.0, MemoryArchive::default());
    ctrl.start_simulation().unwrap();
    let genomes: Vec<_> = (0..4).map(|i| tagged(i as f64)).collect();
    ctrl.seed_agents(0, &genomes, true).unwrap();
    set_points(&mut ctrl, &[1.0, 2.0, 3.0, 4.0]);

    let ids: Vec<_> = ctrl.agents(0).iter().map(|agent| agent.id()).collect();
    ctrl.world_mut().remove(ids[1]);
    ctrl.world_mut().remove(ids[2]);
    ctrl.world_mut().remove(ids[3]);

    ctrl.make_new_generation().unwrap();
    assert_eq!(ctrl.history()[0].survivors, 1);
    assert_eq!(ctrl.history()[0].elites, 1);
    assert!(ctrl.agents(0).iter().all(|agent| tag_of(agent.genome()) == 0.0));
}

#[test]
fn archive_failure_does_not_block_reproduction() {
    let mut ctrl = controller(3, 2, 0.0, FailingArchive);
    ctrl.start_simulation().unwrap();
    set_points(&mut ctrl, &[1.0, 2.0, 3.0]);

    ctrl.make_new_generation().unwrap();
    assert_eq!(ctrl.generation(), 1);
    assert_eq!(ctrl.agents(0).len(), 3);
}

#[test]
fn timer_triggers_generations_and_keeps_the_residual() {
    let mut ctrl = controller(3, 1, 0.0, MemoryArchive::default());
    ctrl.start_simulation().unwrap();
    assert_eq!(ctrl.world().object_generations, 1);

    for _ in 0..4 {
        ctrl.tick(0.25).unwrap();
    }
    assert_eq!(ctrl.generation(), 0);
    assert!(ctrl.world().actuations > 0);

    ctrl.tick(0.25).unwrap();
    assert_eq!(ctrl.generation(), 1);
    assert_eq!(ctrl.elapsed(), 0.0);
    assert_eq!(ctrl.world().object_generations, 2);

    for _ in 0..4 {
        ctrl.tick(0.25).unwrap();
    }
    assert_eq!(ctrl.generation(), 1);
    ctrl.tick(0.25).unwrap();
    assert_eq!(ctrl.generation(), 2);
}

#[test]
fn interaction_events_reach_the_agent_properties() {
    let mut ctrl = controller(2, 1, 0.0, MemoryArchive::default());
    ctrl.start_simulation().unwrap();
    let target = ctrl.agents(0)[1].id();

    ctrl.world_mut().pending.push(InteractionEvent {
        agent: target,
        property: "points".to_string(),
        change: PropertyChange::Increment(1.0),
    });
    ctrl.world_mut().pending.push(InteractionEvent {
        agent: AgentId(999),
        property: "points".to_string(),
        change: PropertyChange::Increment(1.0),
    });
    ctrl.tick(0.1).unwrap();
    assert_eq!(ctrl.agents(0)[1].properties().get("points"), Ok(1.0));
    assert_eq!(ctrl.agents(0)[0].properties().get("points"), Ok(0.0));

    ctrl.world_mut().pending.push(InteractionEvent {
        agent: target,
        property: "points".to_string(),
        change: PropertyChange::Set(7.5),
    });
    ctrl.tick(0.1).unwrap();
    assert_eq!(ctrl.agents(0)[1].properties().get("points"), Ok(7.5));
}

#[test]
fn stop_keeps_properties_and_continue_breeds_from_them() {
    let mut ctrl = controller(4, 2, 0.0, MemoryArchive::default());
    ctrl.start_simulation().unwrap();
    let genomes: Vec<_> = (0..4).map(|i| tagged(i as f64)).collect();
    ctrl.seed_agents(0, &genomes, true).unwrap();
    set_points(&mut ctrl, &[1.0, 9.0, 2.0, 8.0]);

    ctrl.stop_handle().request_stop();
    ctrl.tick(0.25).unwrap();
    assert_eq!(ctrl.phase(), Phase::Stopped);
    assert_eq!(ctrl.world().halted.len(), 4);
    for agent in ctrl.agents(0) {
        assert!(!agent.is_awake());
    }
    assert_eq!(ctrl.agents(0)[1].properties().get("points"), Ok(9.0));

    let actuations = ctrl.world().actuations;
    for _ in 0..10 {
        ctrl.tick(0.25).unwrap();
    }
    assert_eq!(ctrl.world().actuations, actuations);
    assert_eq!(ctrl.generation(), 0);

    ctrl.continue_simulation().unwrap();
    assert_eq!(ctrl.phase(), Phase::Running);
    assert_eq!(ctrl.generation(), 1);
    for agent in ctrl.agents(0) {
        assert!(agent.is_awake());
        let tag = tag_of(agent.genome());
        assert!(tag == 1.0 || tag == 3.0);
    }
}

#[test]
fn agents_generated_asleep_do_not_act() {
    let mut ctrl = controller(3, 1, 0.0, MemoryArchive::default());
    ctrl.start_simulation().unwrap();
    ctrl.generate_agents(false).unwrap();
    ctrl.tick(0.1).unwrap();
    assert_eq!(ctrl.world().actuations, 0);
    assert!(ctrl.agents(0).iter().all(|agent| !agent.is_awake()));
}

#[test]
fn missing_required_gene_fails_activation() {
    let mut generator = generator(2);
    let template = Arc::get_mut(&mut generator.template).unwrap();
    template.genes.retain(|gene| gene.name != SIGHT);

    let mut ctrl = PopulationController::new(
        params(1, 0.0),
        vec![generator],
        StubWorld::default(),
        MemoryArchive::default(),
        Environment::default(),
        SimRng::seed_from_u64(0),
    );
    let err = ctrl.start_simulation().unwrap_err();
    assert!(err.is_config());
}

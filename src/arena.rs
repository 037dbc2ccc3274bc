//! Minimal planar world of boats, pirates and boxes.
//!
//! Bodies and objects are circles in a walled rectangle. Bodies move in a
//! straight line at their actuated velocity; touching a target named by an
//! interaction rule credits the toucher and, by default, removes the target.

use crate::SimRng;
use crate::sensor::{Direction, SensorReading, SensorSweep};
use crate::world::{AgentId, InteractionEvent, PropertyChange, World};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectSpawn {
    pub class: String,
    pub count: usize,
}

/// Property change granted when an agent touches a target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionRule {
    /// Generator name of the touching agent.
    pub agent: String,
    /// Object class or generator name of the touched target.
    pub target: String,
    pub property: String,
    pub delta: f64,
    #[serde(default = "default_consume")]
    pub consume: bool,
}

fn default_consume() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArenaConfig {
    pub width: f64,
    pub height: f64,
    pub agent_radius: f64,
    pub object_radius: f64,
    #[serde(default)]
    pub objects: Vec<ObjectSpawn>,
    #[serde(default)]
    pub interactions: Vec<InteractionRule>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Point {
    x: f64,
    y: f64,
}

impl Point {
    fn dist(&self, other: Point) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

#[derive(Debug, Clone)]
struct Body {
    generator: String,
    pos: Point,
    heading: Direction,
    speed: f64,
}

#[derive(Debug, Clone)]
struct Object {
    class: String,
    pos: Point,
}

pub struct Arena {
    cfg: ArenaConfig,
    objects: Vec<Object>,
    bodies: BTreeMap<AgentId, Body>,
    next_id: u64,
}

impl Arena {
    pub fn new(cfg: ArenaConfig) -> Self {
        Self {
            cfg,
            objects: Vec::new(),
            bodies: BTreeMap::new(),
            next_id: 0,
        }
    }

    pub fn n_objects(&self) -> usize {
        self.objects.len()
    }

    pub fn n_bodies(&self) -> usize {
        self.bodies.len()
    }

    /// Add a single object, mostly useful to set up scenes by hand.
    pub fn place_object(&mut self, class: impl Into<String>, x: f64, y: f64) {
        self.objects.push(Object {
            class: class.into(),
            pos: Point { x, y },
        });
    }

    /// Move a body and turn it to face `heading`.
    pub fn place_agent(&mut self, agent: AgentId, x: f64, y: f64, heading: Direction) {
        if let Some(body) = self.bodies.get_mut(&agent) {
            body.pos = Point { x, y };
            body.heading = heading;
        }
    }

    pub fn position(&self, agent: AgentId) -> Option<(f64, f64)> {
        self.bodies.get(&agent).map(|body| (body.pos.x, body.pos.y))
    }

    fn random_point(&self, rng: &mut SimRng) -> Point {
        Point {
            x: rng.random_range(0.0..=self.cfg.width),
            y: rng.random_range(0.0..=self.cfg.height),
        }
    }

    fn cast(&self, from: AgentId, origin: Point, dir: Direction, range: f64) -> SensorReading {
        let objects = self
            .objects
            .iter()
            .map(|obj| (obj.pos, self.cfg.object_radius, obj.class.as_str()));
        let bodies = self
            .bodies
            .iter()
            .filter(|&(&id, _)| id != from)
            .map(|(_, body)| (body.pos, self.cfg.agent_radius, body.generator.as_str()));

        let mut nearest: Option<(f64, &str)> = None;
        for (center, radius, class) in objects.chain(bodies) {
            let Some(t) = ray_circle(origin, dir, center, radius) else {
                continue;
            };
            if t <= range && nearest.is_none_or(|(best, _)| t < best) {
                nearest = Some((t, class));
            }
        }

        match nearest {
            Some((distance, class)) => SensorReading::hit(dir, class, distance),
            None => SensorReading::miss(dir),
        }
    }
}

/// Distance along a unit ray to the first point of a circle, if any.
fn ray_circle(origin: Point, dir: Direction, center: Point, radius: f64) -> Option<f64> {
    let (ox, oy) = (center.x - origin.x, center.y - origin.y);
    let proj = ox * dir.x + oy * dir.y;
    let perp_2 = ox * ox + oy * oy - proj * proj;
    let radius_2 = radius * radius;
    if perp_2 > radius_2 {
        return None;
    }
    let half_chord = (radius_2 - perp_2).sqrt();
    if proj + half_chord < 0.0 {
        return None;
    }
    Some((proj - half_chord).max(0.0))
}

impl World for Arena {
    fn generate_objects(&mut self, rng: &mut SimRng) {
        self.objects.clear();
        for spawn in self.cfg.objects.clone() {
            for _ in 0..spawn.count {
                let pos = self.random_point(rng);
                self.objects.push(Object {
                    class: spawn.class.clone(),
                    pos,
                });
            }
        }
    }

    fn respawn_agents(&mut self, generator: &str, count: usize, rng: &mut SimRng) -> Vec<AgentId> {
        self.bodies.retain(|_, body| body.generator != generator);

        let mut ids = Vec::with_capacity(count);
        for _ in 0..count {
            let id = AgentId(self.next_id);
            self.next_id += 1;
            let body = Body {
                generator: generator.to_string(),
                pos: self.random_point(rng),
                heading: Direction::from_degrees(rng.random_range(0.0..360.0)),
                speed: 0.0,
            };
            self.bodies.insert(id, body);
            ids.push(id);
        }
        ids
    }

    fn contains(&self, agent: AgentId) -> bool {
        self.bodies.contains_key(&agent)
    }

    fn query_sensors(&self, agent: AgentId, sweep: &SensorSweep) -> Vec<SensorReading> {
        let Some(body) = self.bodies.get(&agent) else {
            return Vec::new();
        };
        sweep
            .directions(body.heading)
            .into_iter()
            .map(|dir| self.cast(agent, body.pos, dir, sweep.range))
            .collect()
    }

    fn actuate(&mut self, agent: AgentId, direction: Option<Direction>, speed: f64) {
        if let Some(body) = self.bodies.get_mut(&agent) {
            if let Some(direction) = direction {
                body.heading = direction;
            }
            body.speed = speed;
        }
    }

    fn halt(&mut self, agent: AgentId) {
        if let Some(body) = self.bodies.get_mut(&agent) {
            body.speed = 0.0;
        }
    }

    fn step(&mut self, dt: f64) -> Vec<InteractionEvent> {
        for body in self.bodies.values_mut() {
            body.pos.x = (body.pos.x + body.heading.x * body.speed * dt).clamp(0.0, self.cfg.width);
            body.pos.y = (body.pos.y + body.heading.y * body.speed * dt).clamp(0.0, self.cfg.height);
        }

        let mut events = Vec::new();
        let ids: Vec<AgentId> = self.bodies.keys().copied().collect();
        for id in ids {
            // Bodies consumed earlier in this step no longer interact.
            let Some(body) = self.bodies.get(&id) else {
                continue;
            };
            let (pos, generator) = (body.pos, body.generator.clone());

            for rule in self.cfg.interactions.iter().filter(|rule| rule.agent == generator) {
                let event = || InteractionEvent {
                    agent: id,
                    property: rule.property.clone(),
                    change: PropertyChange::Increment(rule.delta),
                };

                let reach = self.cfg.agent_radius + self.cfg.object_radius;
                let mut i_obj = 0;
                while i_obj < self.objects.len() {
                    let obj = &self.objects[i_obj];
                    if obj.class == rule.target && obj.pos.dist(pos) <= reach {
                        events.push(event());
                        if rule.consume {
                            self.objects.swap_remove(i_obj);
                            continue;
                        }
                    }
                    i_obj += 1;
                }

                let reach = 2.0 * self.cfg.agent_radius;
                let touched: Vec<AgentId> = self
                    .bodies
                    .iter()
                    .filter(|&(&other, body)| {
                        other != id && body.generator == rule.target && body.pos.dist(pos) <= reach
                    })
                    .map(|(&other, _)| other)
                    .collect();
                for other in touched {
                    events.push(event());
                    if rule.consume {
                        self.bodies.remove(&other);
                    }
                }
            }
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn config() -> ArenaConfig {
        ArenaConfig {
            width: 20.0,
            height: 20.0,
            agent_radius: 0.5,
            object_radius: 0.5,
            objects: vec![ObjectSpawn {
                class: "box".to_string(),
                count: 10,
            }],
            interactions: vec![
                InteractionRule {
                    agent: "boat".to_string(),
                    target: "box".to_string(),
                    property: "points".to_string(),
                    delta: 1.0,
                    consume: true,
                },
                InteractionRule {
                    agent: "pirate".to_string(),
                    target: "boat".to_string(),
                    property: "points".to_string(),
                    delta: 5.0,
                    consume: true,
                },
            ],
        }
    }

    fn sweep() -> SensorSweep {
        SensorSweep {
            divisions: 2,
            step_angle: 45.0,
            range: 10.0,
        }
    }

    #[test]
    fn rays_report_the_nearest_target() {
        let mut rng = SimRng::seed_from_u64(0);
        let mut arena = Arena::new(ArenaConfig {
            objects: Vec::new(),
            ..config()
        });
        let boat = arena.respawn_agents("boat", 1, &mut rng)[0];
        arena.place_agent(boat, 5.0, 5.0, Direction::from_degrees(0.0));
        arena.place_object("box", 9.0, 5.0);
        arena.place_object("box", 12.0, 5.0);

        let readings = arena.query_sensors(boat, &sweep());
        assert_eq!(readings.len(), 3);
        assert!(!readings[0].hit);
        assert!(readings[1].hit);
        assert_eq!(readings[1].target_class.as_deref(), Some("box"));
        assert!((readings[1].distance - 3.5).abs() < 1e-9);
        assert!(!readings[2].hit);
    }

    #[test]
    fn targets_beyond_range_are_missed() {
        let mut rng = SimRng::seed_from_u64(0);
        let mut arena = Arena::new(config());
        let boat = arena.respawn_agents("boat", 1, &mut rng)[0];
        arena.place_agent(boat, 0.0, 0.0, Direction::from_degrees(0.0));
        arena.objects.clear();
        arena.place_object("box", 15.0, 0.0);
        let readings = arena.query_sensors(boat, &sweep());
        assert!(readings.iter().all(|reading| !reading.hit));
    }

    #[test]
    fn touching_a_box_collects_it() {
        let mut rng = SimRng::seed_from_u64(1);
        let mut arena = Arena::new(config());
        let boat = arena.respawn_agents("boat", 1, &mut rng)[0];
        arena.place_agent(boat, 5.0, 5.0, Direction::from_degrees(0.0));
        arena.objects.clear();
        arena.place_object("box", 6.5, 5.0);

        arena.actuate(boat, Some(Direction::from_degrees(0.0)), 1.0);
        let events = arena.step(1.0);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].agent, boat);
        assert_eq!(events[0].change, PropertyChange::Increment(1.0));
        assert_eq!(arena.n_objects(), 0);
        assert_eq!(arena.position(boat), Some((6.0, 5.0)));
    }

    #[test]
    fn pirates_remove_the_boats_they_catch() {
        let mut rng = SimRng::seed_from_u64(2);
        let mut arena = Arena::new(config());
        let boat = arena.respawn_agents("boat", 1, &mut rng)[0];
        let pirate = arena.respawn_agents("pirate", 1, &mut rng)[0];
        arena.objects.clear();
        arena.place_agent(boat, 5.0, 5.0, Direction::from_degrees(0.0));
        arena.place_agent(pirate, 5.5, 5.0, Direction::from_degrees(180.0));

        let events = arena.step(0.1);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].agent, pirate);
        assert!(!arena.contains(boat));
        assert!(arena.query_sensors(boat, &sweep()).is_empty());
    }

    #[test]
    fn respawning_replaces_only_the_given_generator() {
        let mut rng = SimRng::seed_from_u64(3);
        let mut arena = Arena::new(config());
        arena.generate_objects(&mut rng);
        assert_eq!(arena.n_objects(), 10);

        let boats = arena.respawn_agents("boat", 4, &mut rng);
        arena.respawn_agents("pirate", 2, &mut rng);
        let new_boats = arena.respawn_agents("boat", 3, &mut rng);
        assert_eq!(arena.n_bodies(), 5);
        assert!(boats.iter().all(|&id| !arena.contains(id)));
        assert!(new_boats.iter().all(|&id| arena.contains(id)));
    }
}

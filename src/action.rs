//! Candidate actions and utility-ranked action selection.

use crate::SimRng;
use crate::error::EngineError;
use crate::genome::Genome;
use crate::properties::PropertyStore;
use crate::sensor::{Direction, SensorReading};
use crate::utility::UtilityFunction;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::{cmp::Ordering, sync::Arc};

/// Behaviours an agent can perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// Move along the direction of the best reading.
    Seek,
    /// Move away from the direction of the best reading.
    Flee,
}

/// Movement intent produced by the selected action.
#[derive(Debug, Clone, PartialEq)]
pub struct ActuationCommand {
    pub kind: ActionKind,
    /// `None` when the action had no evidence to steer by.
    pub direction: Option<Direction>,
}

/// One candidate behaviour with its utility for the current tick.
pub struct Action {
    kind: ActionKind,
    utility_fn: Arc<dyn UtilityFunction>,
    current_utility: f64,
    best_evidence: Option<SensorReading>,
}

impl Action {
    pub fn new(kind: ActionKind, utility_fn: Arc<dyn UtilityFunction>) -> Self {
        Self {
            kind,
            utility_fn,
            current_utility: 0.0,
            best_evidence: None,
        }
    }

    pub fn kind(&self) -> ActionKind {
        self.kind
    }

    pub fn current_utility(&self) -> f64 {
        self.current_utility
    }

    pub fn best_evidence(&self) -> Option<&SensorReading> {
        self.best_evidence.as_ref()
    }

    fn evaluate(
        &mut self,
        genome: &Genome,
        props: &PropertyStore,
        readings: &[SensorReading],
        rng: &mut SimRng,
    ) -> Result<(), EngineError> {
        self.best_evidence = None;
        if readings.is_empty() {
            self.current_utility = self.utility_fn.baseline(genome, rng)?;
            return Ok(());
        }

        let mut best: Option<(f64, usize)> = None;
        for (i_reading, reading) in readings.iter().enumerate() {
            let utility = self.utility_fn.score(genome, props, reading, rng)?;
            // Strictly greater: the first reading in sweep order wins ties.
            if best.is_none_or(|(max, _)| utility > max) {
                best = Some((utility, i_reading));
            }
        }

        if let Some((utility, i_reading)) = best {
            self.current_utility = utility;
            self.best_evidence = Some(readings[i_reading].clone());
        }
        Ok(())
    }

    fn command(&self) -> ActuationCommand {
        let direction = self.best_evidence.as_ref().map(|reading| match self.kind {
            ActionKind::Seek => reading.direction,
            ActionKind::Flee => reading.direction.reversed(),
        });
        ActuationCommand {
            kind: self.kind,
            direction,
        }
    }
}

/// Ranks an agent's actions by utility and picks one to perform.
pub struct ActionSelector {
    actions: Vec<Action>,
    evaluated: bool,
}

impl ActionSelector {
    pub fn new(actions: Vec<Action>) -> Self {
        Self {
            actions,
            evaluated: false,
        }
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    /// Compute every action's utility as its maximum over `readings`.
    pub fn evaluate_all(
        &mut self,
        genome: &Genome,
        props: &PropertyStore,
        readings: &[SensorReading],
        rng: &mut SimRng,
    ) -> Result<(), EngineError> {
        self.evaluated = false;
        for action in &mut self.actions {
            action.evaluate(genome, props, readings, rng)?;
        }
        self.evaluated = true;
        Ok(())
    }

    /// Rank actions by utility and emit the command of the chosen one.
    ///
    /// With probability `exploration_chance` percent the best ranked action
    /// is chosen, otherwise the runner-up. A lone action is always chosen.
    ///
    /// # Errors
    /// Returns [`EngineError::StaleState`] unless [`Self::evaluate_all`] ran
    /// since the previous call.
    pub fn select_and_act(
        &mut self,
        exploration_chance: f64,
        rng: &mut SimRng,
    ) -> Result<Option<ActuationCommand>, EngineError> {
        if !self.evaluated {
            return Err(EngineError::StaleState);
        }
        self.evaluated = false;

        if self.actions.is_empty() {
            return Ok(None);
        }

        // Stable, so equal utilities keep their previous order.
        self.actions
            .sort_by(|a, b| rank_descending(a.current_utility, b.current_utility));

        let draw = rng.random_range(0.0..100.0);
        let rank = if draw < exploration_chance || self.actions.len() < 2 {
            0
        } else {
            1
        };
        Ok(Some(self.actions[rank].command()))
    }
}

/// Descending order for ranking scores.
///
/// Total over all values, but `-0.0` and `0.0` compare equal so that a stable
/// sort keeps them in their previous order.
pub(crate) fn rank_descending(a: f64, b: f64) -> Ordering {
    // Adding +0.0 maps -0.0 to +0.0 and leaves every other value unchanged.
    (b + 0.0).total_cmp(&(a + 0.0))
}

//! Sensor readings and the angular sweep contract.

use crate::error::EngineError;
use crate::genome::{Genome, SIGHT, SIGHT_DIVISIONS, STEP_ANGLE};
use serde::{Deserialize, Serialize};

/// Planar unit direction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Direction {
    pub x: f64,
    pub y: f64,
}

impl Direction {
    /// Direction pointing at `degrees` counter-clockwise from the x axis.
    pub fn from_degrees(degrees: f64) -> Self {
        let rad = degrees.to_radians();
        Self {
            x: rad.cos(),
            y: rad.sin(),
        }
    }

    pub fn degrees(&self) -> f64 {
        self.y.atan2(self.x).to_degrees()
    }

    pub fn rotated(&self, degrees: f64) -> Self {
        let (sin, cos) = degrees.to_radians().sin_cos();
        Self {
            x: self.x * cos - self.y * sin,
            y: self.x * sin + self.y * cos,
        }
    }

    pub fn reversed(&self) -> Self {
        Self {
            x: -self.x,
            y: -self.y,
        }
    }
}

/// One angular sample of a sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    pub direction: Direction,
    pub hit: bool,
    pub target_class: Option<String>,
    pub distance: f64,
}

impl SensorReading {
    pub fn miss(direction: Direction) -> Self {
        Self {
            direction,
            hit: false,
            target_class: None,
            distance: 0.0,
        }
    }

    pub fn hit(direction: Direction, target_class: impl Into<String>, distance: f64) -> Self {
        Self {
            direction,
            hit: true,
            target_class: Some(target_class.into()),
            distance,
        }
    }
}

/// Largest number of angular divisions a sweep casts.
pub const MAX_SIGHT_DIVISIONS: u32 = 360;

/// Parameters of a sensor query, read from the agent's genome.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorSweep {
    pub divisions: u32,
    pub step_angle: f64,
    pub range: f64,
}

impl SensorSweep {
    /// Read the sweep genes, clamping mutated divisions to
    /// `0..=MAX_SIGHT_DIVISIONS`.
    pub fn from_genome(genome: &Genome) -> Result<Self, EngineError> {
        let divisions = genome.get(SIGHT_DIVISIONS)?;
        Ok(Self {
            divisions: if divisions.is_finite() && divisions > 0.0 {
                divisions.min(MAX_SIGHT_DIVISIONS as f64) as u32
            } else {
                0
            },
            step_angle: genome.get(STEP_ANGLE)?,
            range: genome.get(SIGHT)?,
        })
    }

    /// Ray angles relative to the forward heading, in sweep order.
    ///
    /// Starts at `-step_angle * divisions / 2` and advances by `step_angle`
    /// for `divisions + 1` samples.
    pub fn relative_angles(&self) -> impl Iterator<Item = f64> + '_ {
        let start = -self.step_angle * (self.divisions as f64 / 2.0);
        (0..=self.divisions).map(move |i_ray| start + self.step_angle * i_ray as f64)
    }

    /// Ray directions for an agent facing `forward`, in sweep order.
    pub fn directions(&self, forward: Direction) -> Vec<Direction> {
        self.relative_angles()
            .map(|angle| forward.rotated(angle))
            .collect()
    }
}

//! Per-agent counters and environment-wide properties.

use crate::error::{EngineError, KeyKind};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Property {
    name: String,
    baseline: f64,
    value: f64,
}

/// Named mutable counters owned by one agent.
///
/// Every property is declared with a baseline value it returns to at birth.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PropertyStore {
    props: Vec<Property>,
}

impl PropertyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a property, or redefine the baseline of an existing one.
    ///
    /// The current value is set to the baseline in both cases.
    pub fn declare(&mut self, name: impl Into<String>, baseline: f64) {
        let name = name.into();
        match self.props.iter_mut().find(|prop| prop.name == name) {
            Some(prop) => {
                prop.baseline = baseline;
                prop.value = baseline;
            }
            None => self.props.push(Property {
                name,
                baseline,
                value: baseline,
            }),
        }
    }

    pub fn get(&self, name: &str) -> Result<f64, EngineError> {
        self.find(name).map(|prop| prop.value)
    }

    pub fn increment(&mut self, name: &str, delta: f64) -> Result<(), EngineError> {
        self.find_mut(name)?.value += delta;
        Ok(())
    }

    pub fn set(&mut self, name: &str, value: f64) -> Result<(), EngineError> {
        self.find_mut(name)?.value = value;
        Ok(())
    }

    pub fn reset_to_baseline(&mut self) {
        for prop in &mut self.props {
            prop.value = prop.baseline;
        }
    }

    /// Whether every property currently holds its baseline value.
    pub fn is_at_baseline(&self) -> bool {
        self.props.iter().all(|prop| prop.value == prop.baseline)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.props.iter().map(|prop| (prop.name.as_str(), prop.value))
    }

    fn find(&self, name: &str) -> Result<&Property, EngineError> {
        self.props
            .iter()
            .find(|prop| prop.name == name)
            .ok_or_else(|| EngineError::unknown(KeyKind::Property, name))
    }

    fn find_mut(&mut self, name: &str) -> Result<&mut Property, EngineError> {
        self.props
            .iter_mut()
            .find(|prop| prop.name == name)
            .ok_or_else(|| EngineError::unknown(KeyKind::Property, name))
    }
}

/// Global properties shared by all agents of a simulation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Environment {
    props: Vec<(String, f64)>,
}

impl Environment {
    pub fn new<I, S>(props: I) -> Self
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        let mut env = Self::default();
        for (name, value) in props {
            env.insert(name, value);
        }
        env
    }

    pub fn insert(&mut self, name: impl Into<String>, value: f64) {
        let name = name.into();
        match self.props.iter_mut().find(|(key, _)| *key == name) {
            Some((_, old)) => *old = value,
            None => self.props.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Result<f64, EngineError> {
        self.props
            .iter()
            .find(|(key, _)| key == name)
            .map(|&(_, value)| value)
            .ok_or_else(|| EngineError::unknown(KeyKind::EnvironmentProperty, name))
    }

    pub fn update(&mut self, name: &str, value: f64) -> Result<(), EngineError> {
        match self.props.iter_mut().find(|(key, _)| key == name) {
            Some((_, old)) => {
                *old = value;
                Ok(())
            }
            None => Err(EngineError::unknown(KeyKind::EnvironmentProperty, name)),
        }
    }
}

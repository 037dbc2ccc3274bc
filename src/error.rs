//! Errors raised by the decision engine.

use std::fmt;
use thiserror::Error;

/// Kind of named key that failed a lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    Gene,
    Property,
    EnvironmentProperty,
}

impl fmt::Display for KeyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            KeyKind::Gene => "gene",
            KeyKind::Property => "property",
            KeyKind::EnvironmentProperty => "environment property",
        };
        f.write_str(name)
    }
}

/// Engine-level failures.
///
/// Configuration errors surface when an agent is activated, key errors at the
/// call site that asked for an undeclared name, and stale state when an agent
/// tries to act on utilities that were not computed during the current tick.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("required gene {0:?} is missing")]
    MissingGene(String),

    #[error("{kind} {name:?} is declared more than once")]
    DuplicateKey { kind: KeyKind, name: String },

    #[error("unknown {kind} {name:?}")]
    UnknownKey { kind: KeyKind, name: String },

    #[error("actions were not evaluated during this tick")]
    StaleState,
}

impl EngineError {
    pub(crate) fn unknown(kind: KeyKind, name: &str) -> Self {
        EngineError::UnknownKey {
            kind,
            name: name.to_string(),
        }
    }

    /// Whether this error comes from a misconfigured genome.
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            EngineError::MissingGene(_) | EngineError::DuplicateKey { .. }
        )
    }
}

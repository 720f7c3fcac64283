use crate::common::engine::Engine;

/// Construction-time failures. All are fatal: the builder never catches or
/// recovers from one of these internally, it only propagates to the caller.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum BuildError {
    #[error("out of scratch space: requested {requested} words, {available} available")]
    ArenaOverflow { requested: usize, available: usize },

    #[error("unknown opcode `{opcode}` on engine {engine:?}")]
    UnknownOpcode { engine: Engine, opcode: &'static str },

    #[error("dependency cycle: {remaining} operation(s) could not be scheduled")]
    DependencyCycle { remaining: usize },

    #[error("invariant violation: {0}")]
    InvariantViolation(String),
}

pub type BuildResult<T> = Result<T, BuildError>;

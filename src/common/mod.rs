pub mod engine;
pub mod error;

pub use engine::Engine;
pub use error::{BuildError, BuildResult};

/// Word address into the scratch arena.
pub type Address = u32;

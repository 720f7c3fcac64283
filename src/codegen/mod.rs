pub mod hash;
pub mod select;
pub mod traversal;

pub use hash::HashEmitter;
pub use select::build_valu_select;
pub use traversal::{TraversalEmitter, TraversalState};

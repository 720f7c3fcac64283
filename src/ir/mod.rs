pub mod bundle;
pub mod ops;

pub use bundle::Bundle;
pub use ops::{
    AluSlot, DebugKey, DebugSlot, FlowSlot, LoadSlot, Operation, Slot, StoreSlot, ValuSlot,
};

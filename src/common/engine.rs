use std::fmt;

/// A named pipeline. Each engine dispatches an ordered list of slots per
/// bundle, up to its configured [`crate::env::SlotLimits`] limit — except
/// `Debug`, which is unbounded and hazard-free.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Engine {
    Load,
    Store,
    Alu,
    Valu,
    Flow,
    Debug,
}

impl Engine {
    /// All non-debug engines, in the order the scheduler favours them when
    /// ready ops tie on critical-path height (loads first, debug last).
    pub const ALL: [Engine; 6] = [
        Engine::Load,
        Engine::Store,
        Engine::Alu,
        Engine::Valu,
        Engine::Flow,
        Engine::Debug,
    ];

    /// Tie-break priority used by the list scheduler: lower sorts earlier.
    pub fn schedule_priority(self) -> u8 {
        match self {
            Engine::Load => 0,
            Engine::Store => 1,
            Engine::Valu => 2,
            Engine::Alu => 3,
            Engine::Flow => 4,
            Engine::Debug => 5,
        }
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Engine::Load => "load",
            Engine::Store => "store",
            Engine::Alu => "alu",
            Engine::Valu => "valu",
            Engine::Flow => "flow",
            Engine::Debug => "debug",
        };
        write!(f, "{s}")
    }
}

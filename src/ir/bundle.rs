use indexmap::IndexMap;

use crate::common::Engine;
use crate::ir::ops::Slot;

/// One cycle of dispatch: an ordered list of slots per engine. Engines with
/// no slots this cycle are simply absent from the map — callers should not
/// read anything into key presence beyond "at least one slot this cycle".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bundle {
    slots: IndexMap<Engine, Vec<Slot>>,
}

impl Bundle {
    pub fn new() -> Self {
        Self::default()
    }

    /// A bundle holding a single operation's slot on its engine. Used for
    /// the prologue/init-op emission path that bypasses the scheduler.
    pub fn single(engine: Engine, slot: Slot) -> Self {
        let mut b = Bundle::new();
        b.push(engine, slot);
        b
    }

    pub fn push(&mut self, engine: Engine, slot: Slot) {
        self.slots.entry(engine).or_default().push(slot);
    }

    pub fn slot_count(&self, engine: Engine) -> usize {
        self.slots.get(&engine).map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.slots.values().all(Vec::is_empty)
    }

    pub fn engines(&self) -> impl Iterator<Item = Engine> + '_ {
        self.slots.keys().copied()
    }

    /// Total slots occupied across every engine this cycle.
    pub fn total_slots(&self) -> usize {
        Engine::ALL.iter().map(|&e| self.slot_count(e)).sum()
    }

    pub fn slots_for(&self, engine: Engine) -> &[Slot] {
        self.slots.get(&engine).map_or(&[], Vec::as_slice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::ops::{AluSlot, LoadSlot};
    use crate::env::AluOpKind;

    #[test]
    fn total_slots_sums_across_engines() {
        let mut b = Bundle::new();
        b.push(Engine::Load, Slot::Load(LoadSlot::Const { dst: 0, imm: 1 }));
        b.push(Engine::Alu, Slot::Alu(AluSlot { op: AluOpKind::Add, dst: 1, src1: 0, src2: 0 }));
        b.push(Engine::Alu, Slot::Alu(AluSlot { op: AluOpKind::Add, dst: 2, src1: 0, src2: 0 }));
        assert_eq!(b.total_slots(), 3);
    }

    #[test]
    fn empty_bundle_has_zero_total_slots() {
        assert_eq!(Bundle::new().total_slots(), 0);
    }
}

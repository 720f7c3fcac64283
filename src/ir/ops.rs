use std::fmt;

use smallvec::SmallVec;

use crate::common::{Address, Engine};
use crate::env::AluOpKind;

/// A small set of scratch addresses touched by one operation. Most ops
/// touch 1-4 words; vector ops touch `VLEN` (typically 8), so inline
/// capacity avoids heap allocation for the common case.
pub type AddrSet = SmallVec<[Address; 8]>;

/// The debug engine's trace key: which round/item/stage this observation
/// corresponds to. Purely descriptive — never read back by the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DebugKey {
    pub round: usize,
    pub item: usize,
    pub tag: &'static str,
    pub stage: Option<usize>,
}

impl DebugKey {
    pub fn new(round: usize, item: usize, tag: &'static str) -> Self {
        DebugKey { round, item, tag, stage: None }
    }

    pub fn with_stage(round: usize, item: usize, tag: &'static str, stage: usize) -> Self {
        DebugKey { round, item, tag, stage: Some(stage) }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AluSlot {
    pub op: AluOpKind,
    pub dst: Address,
    pub src1: Address,
    pub src2: Address,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValuSlot {
    Bin { op: AluOpKind, dst: Address, src1: Address, src2: Address },
    /// `dst = a * b + c`, element-wise. The hash emitter's multiply-add
    /// rewrite collapses a `(+, +, <<)` stage into this single op.
    MultiplyAdd { dst: Address, a: Address, b: Address, c: Address },
    VBroadcast { dst: Address, src: Address },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadSlot {
    Const { dst: Address, imm: i64 },
    Load { dst: Address, ptr: Address },
    VLoad { dst: Address, ptr: Address },
    LoadOffset { base: Address, ptr: Address, lane_offset: Address },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreSlot {
    Store { ptr: Address, src: Address },
    VStore { ptr: Address, src: Address },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowSlot {
    VSelect { dst: Address, cond: Address, if_true: Address, if_false: Address },
    Select { dst: Address, cond: Address, if_true: Address, if_false: Address },
    AddImm { dst: Address, src: Address, imm: i64 },
    Pause,
    CondJump { cond: Address, target: usize },
    CondJumpRel { cond: Address, offset: i64 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DebugSlot {
    Compare { addr: Address, key: DebugKey },
    VCompare { addr: Address, keys: Vec<DebugKey> },
}

/// One operation: an `(engine, slot)` pair. The engine is always derivable
/// from the slot variant; it's kept
/// alongside for cheap dispatch without re-matching the slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    pub engine: Engine,
    pub slot: Slot,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Slot {
    Alu(AluSlot),
    Valu(ValuSlot),
    Load(LoadSlot),
    Store(StoreSlot),
    Flow(FlowSlot),
    Debug(DebugSlot),
}

macro_rules! operation_ctor {
    ($name:ident, $engine:expr, $slot_variant:ident, $payload:ident) => {
        impl Operation {
            pub fn $name(slot: $payload) -> Self {
                Operation { engine: $engine, slot: Slot::$slot_variant(slot) }
            }
        }
    };
}

operation_ctor!(alu, Engine::Alu, Alu, AluSlot);
operation_ctor!(valu, Engine::Valu, Valu, ValuSlot);
operation_ctor!(load, Engine::Load, Load, LoadSlot);
operation_ctor!(store, Engine::Store, Store, StoreSlot);
operation_ctor!(flow, Engine::Flow, Flow, FlowSlot);
operation_ctor!(debug, Engine::Debug, Debug, DebugSlot);

impl Operation {
    /// Scratch addresses this operation writes. Vector writes expand to
    /// the full `[addr, addr+vlen)` window. Debug ops write nothing —
    /// they are purely observational and hazard-free.
    pub fn writes(&self, vlen: usize) -> AddrSet {
        match &self.slot {
            Slot::Alu(s) => AddrSet::from_slice(&[s.dst]),
            Slot::Valu(s) => match s {
                ValuSlot::Bin { dst, .. }
                | ValuSlot::MultiplyAdd { dst, .. }
                | ValuSlot::VBroadcast { dst, .. } => vector_window(*dst, vlen),
            },
            Slot::Load(s) => match s {
                LoadSlot::Const { dst, .. } | LoadSlot::Load { dst, .. } => AddrSet::from_slice(&[*dst]),
                LoadSlot::VLoad { dst, .. } => vector_window(*dst, vlen),
                LoadSlot::LoadOffset { base, lane_offset, .. } => {
                    AddrSet::from_slice(&[base + lane_offset])
                }
            },
            Slot::Store(_) => AddrSet::new(),
            Slot::Flow(s) => match s {
                FlowSlot::Select { dst, .. } | FlowSlot::AddImm { dst, .. } => AddrSet::from_slice(&[*dst]),
                FlowSlot::VSelect { dst, .. } => vector_window(*dst, vlen),
                FlowSlot::Pause | FlowSlot::CondJump { .. } | FlowSlot::CondJumpRel { .. } => AddrSet::new(),
            },
            Slot::Debug(_) => AddrSet::new(),
        }
    }

    /// Scratch addresses this operation reads. `multiply_add`'s reads are
    /// the union of three `VLEN`-sized windows; `vselect` reads the mask
    /// plus both vector operands.
    pub fn reads(&self, vlen: usize) -> AddrSet {
        match &self.slot {
            Slot::Alu(s) => AddrSet::from_slice(&[s.src1, s.src2]),
            Slot::Valu(s) => match s {
                ValuSlot::Bin { src1, src2, .. } => {
                    let mut r = vector_window(*src1, vlen);
                    r.extend(vector_window(*src2, vlen));
                    r
                }
                ValuSlot::MultiplyAdd { a, b, c, .. } => {
                    let mut r = vector_window(*a, vlen);
                    r.extend(vector_window(*b, vlen));
                    r.extend(vector_window(*c, vlen));
                    r
                }
                ValuSlot::VBroadcast { src, .. } => AddrSet::from_slice(&[*src]),
            },
            Slot::Load(s) => match s {
                LoadSlot::Const { .. } => AddrSet::new(),
                LoadSlot::Load { ptr, .. } | LoadSlot::VLoad { ptr, .. } => AddrSet::from_slice(&[*ptr]),
                LoadSlot::LoadOffset { ptr, lane_offset, .. } => AddrSet::from_slice(&[ptr + lane_offset]),
            },
            Slot::Store(s) => match s {
                StoreSlot::Store { ptr, src } => AddrSet::from_slice(&[*ptr, *src]),
                StoreSlot::VStore { ptr, src } => {
                    let mut r = AddrSet::from_slice(&[*ptr]);
                    r.extend(vector_window(*src, vlen));
                    r
                }
            },
            Slot::Flow(s) => match s {
                FlowSlot::Select { cond, if_true, if_false, .. } => {
                    AddrSet::from_slice(&[*cond, *if_true, *if_false])
                }
                FlowSlot::VSelect { cond, if_true, if_false, .. } => {
                    let mut r = AddrSet::from_slice(&[*cond]);
                    r.extend(vector_window(*if_true, vlen));
                    r.extend(vector_window(*if_false, vlen));
                    r
                }
                FlowSlot::AddImm { src, .. } => AddrSet::from_slice(&[*src]),
                FlowSlot::CondJump { cond, .. } | FlowSlot::CondJumpRel { cond, .. } => {
                    AddrSet::from_slice(&[*cond])
                }
                FlowSlot::Pause => AddrSet::new(),
            },
            Slot::Debug(_) => AddrSet::new(),
        }
    }

    pub fn opcode_name(&self) -> &'static str {
        match &self.slot {
            Slot::Alu(_) => "alu",
            Slot::Valu(ValuSlot::Bin { .. }) => "valu",
            Slot::Valu(ValuSlot::MultiplyAdd { .. }) => "multiply_add",
            Slot::Valu(ValuSlot::VBroadcast { .. }) => "vbroadcast",
            Slot::Load(LoadSlot::Const { .. }) => "const",
            Slot::Load(LoadSlot::Load { .. }) => "load",
            Slot::Load(LoadSlot::VLoad { .. }) => "vload",
            Slot::Load(LoadSlot::LoadOffset { .. }) => "load_offset",
            Slot::Store(StoreSlot::Store { .. }) => "store",
            Slot::Store(StoreSlot::VStore { .. }) => "vstore",
            Slot::Flow(FlowSlot::VSelect { .. }) => "vselect",
            Slot::Flow(FlowSlot::Select { .. }) => "select",
            Slot::Flow(FlowSlot::AddImm { .. }) => "add_imm",
            Slot::Flow(FlowSlot::Pause) => "pause",
            Slot::Flow(FlowSlot::CondJump { .. }) => "cond_jump",
            Slot::Flow(FlowSlot::CondJumpRel { .. }) => "cond_jump_rel",
            Slot::Debug(DebugSlot::Compare { .. }) => "compare",
            Slot::Debug(DebugSlot::VCompare { .. }) => "vcompare",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.engine, self.opcode_name())
    }
}

fn vector_window(base: Address, vlen: usize) -> AddrSet {
    (base..base + vlen as Address).collect()
}

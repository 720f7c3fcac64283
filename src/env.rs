//! Stand-in for the host-provided problem constants, treated as an external
//! collaborator owned by the simulator rather than this crate. The real
//! deployment wires the core against whatever `VLEN`/`SLOT_LIMITS`/
//! `HASH_STAGES` the simulator was built with; this module supplies a
//! concrete, documented default so the crate builds and tests end to end.

use indexmap::IndexMap;

use crate::common::{Address, Engine};

/// Vector lane count. Every vector scratch slot is `VLEN` words wide.
pub const VLEN: usize = 8;

/// Scratch arena capacity, in words. Sized generously for the largest
/// documented scenario (forest_height=10, rounds=16, batch_size=256).
pub const SCRATCH_SIZE: usize = 1 << 16;

/// Per-engine bundle slot limits. `Debug` has no limit and is not
/// represented here; the scheduler treats it as always-available.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotLimits {
    pub load: usize,
    pub store: usize,
    pub alu: usize,
    pub valu: usize,
    pub flow: usize,
}

impl SlotLimits {
    /// The default accelerator configuration used by the documented
    /// end-to-end scenarios.
    pub const fn default_config() -> Self {
        SlotLimits { load: 2, store: 1, alu: 4, valu: 4, flow: 1 }
    }

    pub fn get(&self, engine: Engine) -> Option<usize> {
        match engine {
            Engine::Load => Some(self.load),
            Engine::Store => Some(self.store),
            Engine::Alu => Some(self.alu),
            Engine::Valu => Some(self.valu),
            Engine::Flow => Some(self.flow),
            Engine::Debug => None,
        }
    }

    /// `max(engine_limit for engine != debug)`, the roofline the scheduler
    /// defines its latency weights against.
    pub fn base_limit(&self) -> usize {
        [self.load, self.store, self.alu, self.valu, self.flow]
            .into_iter()
            .max()
            .unwrap_or(1)
    }
}

impl Default for SlotLimits {
    fn default() -> Self {
        Self::default_config()
    }
}

/// One hash-round stage: `val ← (val op1 val1) op2 (val op3 val3)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashStage {
    pub op1: AluOpKind,
    pub val1: i64,
    pub op2: AluOpKind,
    pub op3: AluOpKind,
    pub val3: i64,
}

/// The scalar/vector arithmetic operators a hash stage can combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AluOpKind {
    Add,
    Xor,
    Shl,
    Shr,
    And,
    /// `a < b`, yielding `1`/`0`. Used by the index-wrap mask in the
    /// traversal emitter, never by a hash stage.
    Lt,
    /// `a - b`. Used by the VALU select sequence, never by a hash stage.
    Sub,
    /// `a * b`. Used by the VALU select sequence, never by a hash stage.
    Mul,
}

impl AluOpKind {
    pub fn apply(self, a: i64, b: i64) -> i64 {
        match self {
            AluOpKind::Add => a.wrapping_add(b),
            AluOpKind::Xor => a ^ b,
            AluOpKind::Shl => a.wrapping_shl(b as u32),
            AluOpKind::Shr => ((a as u64).wrapping_shr(b as u32)) as i64,
            AluOpKind::And => a & b,
            AluOpKind::Lt => (a < b) as i64,
            AluOpKind::Sub => a.wrapping_sub(b),
            AluOpKind::Mul => a.wrapping_mul(b),
        }
    }
}

#[cfg(test)]
mod alu_op_kind_tests {
    use super::AluOpKind;

    #[test]
    fn apply_matches_each_operator() {
        assert_eq!(AluOpKind::Add.apply(2, 3), 5);
        assert_eq!(AluOpKind::Xor.apply(0b110, 0b011), 0b101);
        assert_eq!(AluOpKind::Shl.apply(1, 4), 16);
        assert_eq!(AluOpKind::Shr.apply(-1, 60), 15);
        assert_eq!(AluOpKind::And.apply(0b110, 0b011), 0b010);
        assert_eq!(AluOpKind::Lt.apply(3, 5), 1);
        assert_eq!(AluOpKind::Lt.apply(5, 3), 0);
        assert_eq!(AluOpKind::Sub.apply(10, 4), 6);
        assert_eq!(AluOpKind::Mul.apply(6, 7), 42);
    }

    #[test]
    fn valu_select_formula_matches_three_op_expansion() {
        // result = cond * (a - b) + b, for cond in {0, 1}.
        let a = 40;
        let b = 9;
        let tmp = AluOpKind::Sub.apply(a, b);
        let selected_a = AluOpKind::Add.apply(AluOpKind::Mul.apply(1, tmp), b);
        let selected_b = AluOpKind::Add.apply(AluOpKind::Mul.apply(0, tmp), b);
        assert_eq!(selected_a, a);
        assert_eq!(selected_b, b);
    }
}

/// The default hash-stage table: an 8-stage xorshift-multiply style mix.
/// Stages alternate between the `(+, +, <<)` shape the hash emitter rewrites
/// into a single `multiply_add`, and general shapes that stay 3-op.
pub fn hash_stages() -> Vec<HashStage> {
    use AluOpKind::*;
    vec![
        HashStage { op1: Add, val1: 0x9E37_79B9, op2: Add, op3: Shl, val3: 13 },
        HashStage { op1: Xor, val1: 0x85EB_CA6B, op2: Xor, op3: Shr, val3: 7 },
        HashStage { op1: Add, val1: 0xC2B2_AE35, op2: Add, op3: Shl, val3: 17 },
        HashStage { op1: Xor, val1: 0x27D4_EB2F, op2: Xor, op3: Shr, val3: 11 },
        HashStage { op1: Add, val1: 0x1656_67B1, op2: Add, op3: Shl, val3: 5 },
        HashStage { op1: And, val1: 0x3F3F_3F3F, op2: Xor, op3: Shr, val3: 3 },
        HashStage { op1: Add, val1: 0x9E37_79B9, op2: Add, op3: Shl, val3: 9 },
        HashStage { op1: Xor, val1: 0xFF51_AFD7, op2: Xor, op3: Shr, val3: 15 },
    ]
}

/// Post-build annotation for the scratch arena: maps an address to the
/// name and word-length it was allocated under.
#[derive(Debug, Clone, Default)]
pub struct DebugInfo {
    pub scratch_map: IndexMap<Address, (String, usize)>,
}

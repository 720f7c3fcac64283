//! Vectorised select emission.
//!
//! `build_valu_select` exists as an independently usable, independently
//! tested function — it is not wired into any round body; the traversal
//! emitter's own index-wrap logic uses the flow engine's `vselect` directly,
//! since the accelerator's flow select is strictly cheaper when available.
//! This function exists for accelerator configurations where the flow
//! engine's select is scarcer than VALU slots, mirroring
//! `original_source/perf_takehome.py`'s `build_valu_select`: it assumes
//! `cond` holds only `0`/`1` lanes and computes `cond * (a - b) + b` as
//! three VALU ops (`-`, `*`, `+`) rather than a single select opcode.

use crate::common::Address;
use crate::env::AluOpKind;
use crate::ir::{Operation, ValuSlot};

/// Build `dst = cond ? if_true : if_false` using only VALU arithmetic:
/// `tmp = if_true - if_false`, `tmp = cond * tmp`, `dst = tmp + if_false`.
/// `tmp` must be a scratch address distinct from the other four (it is
/// written before `dst` is).
pub fn build_valu_select(
    dst: Address,
    cond: Address,
    if_true: Address,
    if_false: Address,
    tmp: Address,
) -> Vec<Operation> {
    vec![
        Operation::valu(ValuSlot::Bin { op: AluOpKind::Sub, dst: tmp, src1: if_true, src2: if_false }),
        Operation::valu(ValuSlot::Bin { op: AluOpKind::Mul, dst: tmp, src1: cond, src2: tmp }),
        Operation::valu(ValuSlot::Bin { op: AluOpKind::Add, dst, src1: tmp, src2: if_false }),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Engine;
    use crate::ir::Slot;

    #[test]
    fn emits_subtract_multiply_add_in_order() {
        let ops = build_valu_select(100, 10, 20, 40, 50);
        assert_eq!(ops.len(), 3);
        assert!(matches!(
            ops[0].slot,
            Slot::Valu(ValuSlot::Bin { op: AluOpKind::Sub, dst: 50, src1: 20, src2: 40 })
        ));
        assert!(matches!(
            ops[1].slot,
            Slot::Valu(ValuSlot::Bin { op: AluOpKind::Mul, dst: 50, src1: 10, src2: 50 })
        ));
        assert!(matches!(
            ops[2].slot,
            Slot::Valu(ValuSlot::Bin { op: AluOpKind::Add, dst: 100, src1: 50, src2: 40 })
        ));
        assert!(ops.iter().all(|op| op.engine == Engine::Valu));
    }

    #[test]
    fn reads_and_writes_cover_every_vector_operand() {
        let ops = build_valu_select(100, 10, 20, 40, 50);
        let vlen = 8;
        let all_reads: Vec<_> = ops.iter().flat_map(|op| op.reads(vlen)).collect();
        let all_writes: Vec<_> = ops.iter().flat_map(|op| op.writes(vlen)).collect();
        for base in [10, 20, 40, 50] {
            assert!(all_reads.contains(&base), "missing read of vector at {base}");
        }
        for base in [50, 100] {
            assert!(all_writes.contains(&base), "missing write of vector at {base}");
        }
    }

    #[test]
    fn tmp_is_written_before_dst_is() {
        let ops = build_valu_select(100, 10, 20, 40, 50);
        let tmp_write_cycle = ops.iter().position(|op| op.writes(8).contains(&50)).unwrap();
        let dst_write_cycle = ops.iter().position(|op| op.writes(8).contains(&100)).unwrap();
        assert!(tmp_write_cycle < dst_write_cycle);
    }
}

//! Tree traversal emission.
//!
//! Three phases: initialization (header load, batch setup), rounds (one of
//! three strategies per round number), finalization (store results). Mirrors
//! `original_source/kernel_traversal.py`'s `TraversalBuilder`, but state that
//! the original carried on `self` between phase methods is threaded through
//! explicitly as a [`TraversalState`] value — no phase method closes over a
//! shared allocator/scheduler handle.
//!
//! Setup work (header loads, constant materialization) is emitted as
//! one-bundle-per-op, matching the original's direct `scheduler.add` calls;
//! only the batch-parallel data-flow ops within a phase are handed to the
//! packing scheduler, matching its `scheduler.build(..., vliw=True)` calls.

use crate::codegen::hash::HashEmitter;
use crate::common::{Address, BuildResult};
use crate::env::{AluOpKind, HashStage};
use crate::ir::{AluSlot, Bundle, DebugKey, DebugSlot, FlowSlot, LoadSlot, Operation, StoreSlot, ValuSlot};
use crate::memory::ScratchAllocator;
use crate::sched::Scheduler;

const N_TMP_POOLS: usize = 6;
const PIPE_DEPTH: usize = 2;
const ADDR_RING: usize = PIPE_DEPTH + 1;

/// Round-number boundaries that dispatch to the single-tree / dual-tree
/// strategies; every other round is general gather.
const SINGLE_TREE_ROUNDS: [usize; 2] = [0, 11];
const DUAL_TREE_ROUNDS: [usize; 2] = [1, 12];

/// Addresses allocated during initialization and consumed by every later
/// phase. Threaded explicitly rather than held by the emitter.
pub struct TraversalState {
    pub v_idx: Vec<Address>,
    pub v_val: Vec<Address>,
    pub v_node_val: Vec<Address>,
    pub v_tmp1: Vec<Address>,
    pub v_zero: Address,
    pub v_one: Address,
    pub v_two: Address,
    pub v_n_nodes: Address,
    pub tmp_addr: Address,
    pub batch_offsets: Vec<Address>,
}

pub struct TraversalEmitter;

impl TraversalEmitter {
    pub fn new() -> Self {
        TraversalEmitter
    }

    /// Build all three phases for a kernel of `rounds` rounds over
    /// `batch_size` items.
    #[allow(clippy::too_many_arguments)]
    pub fn build_kernel_ops(
        &self,
        alloc: &mut ScratchAllocator,
        hasher: &HashEmitter,
        scheduler: &Scheduler,
        stages: &[HashStage],
        batch_size: usize,
        rounds: usize,
        vlen: usize,
    ) -> BuildResult<(Vec<Bundle>, Vec<Bundle>, Vec<Bundle>)> {
        let num_batches = batch_size / vlen;
        let (init_bundles, state) = self.build_initialization(alloc, scheduler, num_batches, vlen)?;
        let round_bundles =
            self.build_rounds(alloc, hasher, scheduler, stages, rounds, num_batches, vlen, &state)?;
        let final_bundles = self.build_finalization(alloc, scheduler, num_batches, &state)?;
        Ok((init_bundles, round_bundles, final_bundles))
    }

    fn build_initialization(
        &self,
        alloc: &mut ScratchAllocator,
        scheduler: &Scheduler,
        num_batches: usize,
        vlen: usize,
    ) -> BuildResult<(Vec<Bundle>, TraversalState)> {
        let mut prologue = Vec::new();

        let tmp1 = alloc.alloc(Some("tmp1"), 1)?;
        let init_vars = [
            "rounds",
            "n_nodes",
            "batch_size",
            "forest_height",
            "forest_values_p",
            "inp_indices_p",
            "inp_values_p",
        ];
        for v in init_vars {
            alloc.alloc(Some(v), 1)?;
        }
        for (i, v) in init_vars.iter().enumerate() {
            prologue.push(Operation::load(LoadSlot::Const { dst: tmp1, imm: i as i64 }));
            let dst = alloc.named(v).expect("header var just allocated");
            prologue.push(Operation::load(LoadSlot::Load { dst, ptr: tmp1 }));
        }
        prologue.push(Operation::flow(FlowSlot::Pause));

        let v_idx = alloc_vectors(alloc, "v_idx", num_batches, vlen)?;
        let v_val = alloc_vectors(alloc, "v_val", num_batches, vlen)?;
        let v_node_val = alloc_vectors(alloc, "v_node_val", num_batches, vlen)?;
        let v_tmp1 = alloc_vectors(alloc, "v_tmp1", N_TMP_POOLS, vlen)?;

        let (v_zero, ops) = alloc.vec_const(0)?;
        prologue.extend(ops);
        let (v_one, ops) = alloc.vec_const(1)?;
        prologue.extend(ops);
        let (v_two, ops) = alloc.vec_const(2)?;
        prologue.extend(ops);

        let v_n_nodes = alloc.alloc(Some("v_n_nodes"), vlen)?;
        let n_nodes = alloc.named("n_nodes").expect("header var just allocated");
        prologue.push(Operation::valu(ValuSlot::VBroadcast { dst: v_n_nodes, src: n_nodes }));

        let tmp_addr = alloc.alloc(Some("tmp_addr"), 1)?;

        let mut batch_offsets = Vec::with_capacity(num_batches);
        for b in 0..num_batches {
            let (addr, ops) = alloc.scratch_const((b * vlen) as i64)?;
            prologue.extend(ops);
            batch_offsets.push(addr);
        }

        let inp_indices_p = alloc.named("inp_indices_p").expect("header var just allocated");
        let inp_values_p = alloc.named("inp_values_p").expect("header var just allocated");

        let mut load_ops = Vec::new();
        for b in 0..num_batches {
            let batch_start = b * vlen;
            load_ops.push(Operation::alu(AluSlot {
                op: AluOpKind::Add,
                dst: tmp_addr,
                src1: inp_indices_p,
                src2: batch_offsets[b],
            }));
            load_ops.push(Operation::load(LoadSlot::VLoad { dst: v_idx[b], ptr: tmp_addr }));
            load_ops.push(vcompare(v_idx[b], 0, batch_start, "idx", vlen));
            load_ops.push(Operation::alu(AluSlot {
                op: AluOpKind::Add,
                dst: tmp_addr,
                src1: inp_values_p,
                src2: batch_offsets[b],
            }));
            load_ops.push(Operation::load(LoadSlot::VLoad { dst: v_val[b], ptr: tmp_addr }));
            load_ops.push(vcompare(v_val[b], 0, batch_start, "val", vlen));
        }

        let mut bundles = scheduler.trivial(prologue);
        bundles.extend(scheduler.schedule(load_ops)?);

        let state = TraversalState {
            v_idx,
            v_val,
            v_node_val,
            v_tmp1,
            v_zero,
            v_one,
            v_two,
            v_n_nodes,
            tmp_addr,
            batch_offsets,
        };
        Ok((bundles, state))
    }

    #[allow(clippy::too_many_arguments)]
    fn build_rounds(
        &self,
        alloc: &mut ScratchAllocator,
        hasher: &HashEmitter,
        scheduler: &Scheduler,
        stages: &[HashStage],
        rounds: usize,
        num_batches: usize,
        vlen: usize,
        state: &TraversalState,
    ) -> BuildResult<Vec<Bundle>> {
        let tree_0 = alloc.alloc(Some("tree_0"), 1)?;
        let tree_1 = alloc.alloc(Some("tree_1"), 1)?;
        let tree_2 = alloc.alloc(Some("tree_2"), 1)?;
        let v_tmp3 = alloc.alloc(Some("v_tmp3"), vlen)?;
        let mut idx_addr = Vec::with_capacity(ADDR_RING);
        for s in 0..ADDR_RING {
            let mut lanes = Vec::with_capacity(vlen);
            for lane in 0..vlen {
                lanes.push(alloc.alloc(Some(&format!("idx_addr_{s}_{lane}")), 1)?);
            }
            idx_addr.push(lanes);
        }

        let forest_values_p = alloc.named("forest_values_p").expect("header var just allocated");

        let mut bundles = Vec::new();
        for round_num in 0..rounds {
            let (prologue, ops) = if SINGLE_TREE_ROUNDS.contains(&round_num) {
                self.build_single_tree_round(alloc, hasher, stages, round_num, num_batches, vlen, tree_0, forest_values_p, state)?
            } else if DUAL_TREE_ROUNDS.contains(&round_num) {
                self.build_dual_tree_round(
                    alloc,
                    hasher,
                    stages,
                    round_num,
                    num_batches,
                    vlen,
                    tree_1,
                    tree_2,
                    v_tmp3,
                    forest_values_p,
                    state,
                )?
            } else {
                (
                    Vec::new(),
                    self.build_general_round(alloc, hasher, stages, round_num, num_batches, vlen, &idx_addr, forest_values_p, state)?,
                )
            };
            bundles.extend(scheduler.trivial(prologue));
            bundles.extend(scheduler.schedule(ops)?);
        }
        Ok(bundles)
    }

    /// Rounds 0, 11: a single tree's node value, broadcast to every batch.
    #[allow(clippy::too_many_arguments)]
    fn build_single_tree_round(
        &self,
        alloc: &mut ScratchAllocator,
        hasher: &HashEmitter,
        stages: &[HashStage],
        round_num: usize,
        num_batches: usize,
        vlen: usize,
        tree_0: Address,
        forest_values_p: Address,
        state: &TraversalState,
    ) -> BuildResult<(Vec<Operation>, Vec<Operation>)> {
        let (c0, prologue) = alloc.scratch_const(0)?;

        let mut ops = Vec::new();
        ops.push(Operation::alu(AluSlot { op: AluOpKind::Add, dst: state.tmp_addr, src1: forest_values_p, src2: c0 }));
        ops.push(Operation::load(LoadSlot::Load { dst: tree_0, ptr: state.tmp_addr }));

        for b in 0..num_batches {
            let batch_start = b * vlen;
            ops.push(Operation::valu(ValuSlot::VBroadcast { dst: state.v_node_val[b], src: tree_0 }));
            ops.push(vcompare(state.v_node_val[b], round_num, batch_start, "node_val", vlen));
            ops.push(Operation::valu(ValuSlot::Bin {
                op: AluOpKind::Xor,
                dst: state.v_val[b],
                src1: state.v_val[b],
                src2: state.v_node_val[b],
            }));
        }

        ops.extend(hasher.build_vhash_interleaved(alloc, stages, vlen, &batches_info(state, num_batches, vlen), round_num)?);

        for b in 0..num_batches {
            ops.extend(index_update_ops(state, round_num, b, vlen));
        }

        Ok((prologue, ops))
    }

    /// Rounds 1, 12: two trees, selected per-lane by the index's low bit.
    #[allow(clippy::too_many_arguments)]
    fn build_dual_tree_round(
        &self,
        alloc: &mut ScratchAllocator,
        hasher: &HashEmitter,
        stages: &[HashStage],
        round_num: usize,
        num_batches: usize,
        vlen: usize,
        tree_1: Address,
        tree_2: Address,
        v_tmp3: Address,
        forest_values_p: Address,
        state: &TraversalState,
    ) -> BuildResult<(Vec<Operation>, Vec<Operation>)> {
        let (c1, init1) = alloc.scratch_const(1)?;
        let (c2, init2) = alloc.scratch_const(2)?;
        let mut prologue = init1;
        prologue.extend(init2);

        let mut ops = Vec::new();
        ops.push(Operation::alu(AluSlot { op: AluOpKind::Add, dst: state.tmp_addr, src1: forest_values_p, src2: c1 }));
        ops.push(Operation::load(LoadSlot::Load { dst: tree_1, ptr: state.tmp_addr }));
        ops.push(Operation::alu(AluSlot { op: AluOpKind::Add, dst: state.tmp_addr, src1: forest_values_p, src2: c2 }));
        ops.push(Operation::load(LoadSlot::Load { dst: tree_2, ptr: state.tmp_addr }));

        for b in 0..num_batches {
            let batch_start = b * vlen;
            let tp = b % N_TMP_POOLS;
            ops.push(Operation::valu(ValuSlot::Bin {
                op: AluOpKind::And,
                dst: state.v_tmp1[tp],
                src1: state.v_idx[b],
                src2: state.v_one,
            }));
            ops.push(Operation::valu(ValuSlot::VBroadcast { dst: v_tmp3, src: tree_1 }));
            ops.push(Operation::valu(ValuSlot::VBroadcast { dst: state.v_node_val[b], src: tree_2 }));
            ops.push(Operation::flow(FlowSlot::VSelect {
                dst: state.v_node_val[b],
                cond: state.v_tmp1[tp],
                if_true: v_tmp3,
                if_false: state.v_node_val[b],
            }));
            ops.push(vcompare(state.v_node_val[b], round_num, batch_start, "node_val", vlen));
            ops.push(Operation::valu(ValuSlot::Bin {
                op: AluOpKind::Xor,
                dst: state.v_val[b],
                src1: state.v_val[b],
                src2: state.v_node_val[b],
            }));
        }

        ops.extend(hasher.build_vhash_interleaved(alloc, stages, vlen, &batches_info(state, num_batches, vlen), round_num)?);

        for b in 0..num_batches {
            ops.extend(index_update_ops(state, round_num, b, vlen));
        }

        Ok((prologue, ops))
    }

    /// All other rounds: software-pipelined per-lane gather from the
    /// forest, since each lane may have diverged to a different node.
    #[allow(clippy::too_many_arguments)]
    fn build_general_round(
        &self,
        alloc: &mut ScratchAllocator,
        hasher: &HashEmitter,
        stages: &[HashStage],
        round_num: usize,
        num_batches: usize,
        vlen: usize,
        idx_addr: &[Vec<Address>],
        forest_values_p: Address,
        state: &TraversalState,
    ) -> BuildResult<Vec<Operation>> {
        let mut ops = Vec::new();
        let total_steps = num_batches + PIPE_DEPTH;

        for step in 0..total_steps {
            let addr_batch = step as isize;
            let load_batch = step as isize - 1;
            let compute_batch = step as isize - PIPE_DEPTH as isize;

            if addr_batch >= 0 && (addr_batch as usize) < num_batches {
                let b = addr_batch as usize;
                let s = b % ADDR_RING;
                for lane in 0..vlen {
                    ops.push(Operation::alu(AluSlot {
                        op: AluOpKind::Add,
                        dst: idx_addr[s][lane],
                        src1: forest_values_p,
                        src2: state.v_idx[b] + lane as Address,
                    }));
                }
            }

            if load_batch >= 0 && (load_batch as usize) < num_batches {
                let b = load_batch as usize;
                let s = b % ADDR_RING;
                for lane in 0..vlen {
                    ops.push(Operation::load(LoadSlot::Load {
                        dst: state.v_node_val[b] + lane as Address,
                        ptr: idx_addr[s][lane],
                    }));
                }
                ops.push(vcompare(state.v_node_val[b], round_num, b * vlen, "node_val", vlen));
            }

            if compute_batch >= 0 && (compute_batch as usize) < num_batches {
                let b = compute_batch as usize;
                ops.push(Operation::valu(ValuSlot::Bin {
                    op: AluOpKind::Xor,
                    dst: state.v_val[b],
                    src1: state.v_val[b],
                    src2: state.v_node_val[b],
                }));
            }
        }

        ops.extend(hasher.build_vhash_interleaved(alloc, stages, vlen, &batches_info(state, num_batches, vlen), round_num)?);

        for b in 0..num_batches {
            ops.extend(index_update_ops(state, round_num, b, vlen));
        }

        Ok(ops)
    }

    fn build_finalization(
        &self,
        alloc: &mut ScratchAllocator,
        scheduler: &Scheduler,
        num_batches: usize,
        state: &TraversalState,
    ) -> BuildResult<Vec<Bundle>> {
        let inp_indices_p = alloc.named("inp_indices_p").expect("header var just allocated");
        let inp_values_p = alloc.named("inp_values_p").expect("header var just allocated");

        let mut ops = Vec::new();
        for b in 0..num_batches {
            ops.push(Operation::alu(AluSlot {
                op: AluOpKind::Add,
                dst: state.tmp_addr,
                src1: inp_indices_p,
                src2: state.batch_offsets[b],
            }));
            ops.push(Operation::store(StoreSlot::VStore { ptr: state.tmp_addr, src: state.v_idx[b] }));
            ops.push(Operation::alu(AluSlot {
                op: AluOpKind::Add,
                dst: state.tmp_addr,
                src1: inp_values_p,
                src2: state.batch_offsets[b],
            }));
            ops.push(Operation::store(StoreSlot::VStore { ptr: state.tmp_addr, src: state.v_val[b] }));
        }
        scheduler.schedule(ops)
    }
}

impl Default for TraversalEmitter {
    fn default() -> Self {
        Self::new()
    }
}

fn alloc_vectors(alloc: &mut ScratchAllocator, prefix: &str, count: usize, vlen: usize) -> BuildResult<Vec<Address>> {
    (0..count).map(|i| alloc.alloc(Some(&format!("{prefix}_{i}")), vlen)).collect()
}

fn batches_info(state: &TraversalState, num_batches: usize, vlen: usize) -> Vec<(Address, Address, Address, usize)> {
    (0..num_batches).map(|b| (state.v_val[b], state.v_node_val[b], state.v_val[b], b * vlen)).collect()
}

/// The shared tail of every round: hash the node value into the item value,
/// then advance and wrap the index.
fn index_update_ops(state: &TraversalState, round_num: usize, b: usize, vlen: usize) -> Vec<Operation> {
    let batch_start = b * vlen;
    let tp = b % N_TMP_POOLS;
    vec![
        vcompare(state.v_val[b], round_num, batch_start, "hashed_val", vlen),
        Operation::valu(ValuSlot::Bin {
            op: AluOpKind::And,
            dst: state.v_tmp1[tp],
            src1: state.v_val[b],
            src2: state.v_one,
        }),
        Operation::valu(ValuSlot::Bin {
            op: AluOpKind::Add,
            dst: state.v_tmp1[tp],
            src1: state.v_tmp1[tp],
            src2: state.v_one,
        }),
        Operation::valu(ValuSlot::MultiplyAdd { dst: state.v_idx[b], a: state.v_idx[b], b: state.v_two, c: state.v_tmp1[tp] }),
        vcompare(state.v_idx[b], round_num, batch_start, "next_idx", vlen),
        Operation::valu(ValuSlot::Bin {
            op: AluOpKind::Lt,
            dst: state.v_tmp1[tp],
            src1: state.v_idx[b],
            src2: state.v_n_nodes,
        }),
        Operation::flow(FlowSlot::VSelect {
            dst: state.v_idx[b],
            cond: state.v_tmp1[tp],
            if_true: state.v_idx[b],
            if_false: state.v_zero,
        }),
        vcompare(state.v_idx[b], round_num, batch_start, "wrapped_idx", vlen),
    ]
}

fn vcompare(addr: Address, round: usize, batch_start: usize, tag: &'static str, vlen: usize) -> Operation {
    let keys = (0..vlen).map(|lane| DebugKey::new(round, batch_start + lane, tag)).collect();
    Operation::debug(DebugSlot::VCompare { addr, keys })
}

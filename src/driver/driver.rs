//! Driver façade: the single entry point that owns the scratch allocator
//! and scheduler and wires the hash/traversal emitters against them,
//! mirroring `original_source/perf_takehome.py`'s `KernelBuilder`. Unlike
//! `KernelBuilder`, which hands itself to `TraversalBuilder` as both
//! "allocator" and "scheduler", this driver owns its components outright
//! and passes them down by reference — no component holds a handle back
//! to the driver.

use crate::codegen::{HashEmitter, TraversalEmitter};
use crate::common::{BuildError, BuildResult};
use crate::env::{self, DebugInfo, HashStage};
use crate::ir::Bundle;
use crate::memory::ScratchAllocator;
use crate::sched::Scheduler;

/// Owns everything needed to build one kernel and accumulates its bundles
/// in program order.
pub struct Driver {
    allocator: ScratchAllocator,
    scheduler: Scheduler,
    hasher: HashEmitter,
    traversal: TraversalEmitter,
    stages: Vec<HashStage>,
    vlen: usize,
    bundles: Vec<Bundle>,
}

impl Driver {
    pub fn new() -> Self {
        Self::with_config(env::VLEN, env::SCRATCH_SIZE, env::SlotLimits::default_config(), env::hash_stages())
    }

    pub fn with_config(vlen: usize, scratch_size: usize, limits: env::SlotLimits, stages: Vec<HashStage>) -> Self {
        Driver {
            allocator: ScratchAllocator::new(vlen, scratch_size),
            scheduler: Scheduler::new(limits, vlen),
            hasher: HashEmitter::new(),
            traversal: TraversalEmitter::new(),
            stages,
            vlen,
            bundles: Vec::new(),
        }
    }

    /// Append a bundle built elsewhere, preserving program order.
    pub fn add_bundle(&mut self, bundle: Bundle) {
        self.bundles.push(bundle);
    }

    /// All bundles accumulated so far, in emission order.
    pub fn bundles(&self) -> &[Bundle] {
        &self.bundles
    }

    pub fn into_bundles(self) -> Vec<Bundle> {
        self.bundles
    }

    pub fn debug_info(&self) -> DebugInfo {
        self.allocator.debug_info()
    }

    /// Build the full traversal kernel: header load, `rounds` rounds over
    /// `batch_size` items, then store results. `forest_height` and `n_nodes`
    /// are accepted for parity with the original façade's signature — the
    /// kernel's shape depends only on `batch_size`/`rounds`/`vlen`; the tree
    /// shape itself is runtime data read from the memory header.
    pub fn build_kernel(
        &mut self,
        forest_height: usize,
        n_nodes: i64,
        batch_size: usize,
        rounds: usize,
    ) -> BuildResult<()> {
        let _ = (forest_height, n_nodes);

        if rounds == 0 {
            return Err(BuildError::InvariantViolation("rounds must be positive".into()));
        }
        if batch_size == 0 || batch_size % self.vlen != 0 {
            return Err(BuildError::InvariantViolation(format!(
                "batch_size ({batch_size}) must be a positive multiple of vlen ({})",
                self.vlen
            )));
        }
        if self.stages.is_empty() {
            return Err(BuildError::InvariantViolation("hash stage table must be non-empty".into()));
        }

        let (init, rounds_bundles, fin) = self.traversal.build_kernel_ops(
            &mut self.allocator,
            &self.hasher,
            &self.scheduler,
            &self.stages,
            batch_size,
            rounds,
            self.vlen,
        )?;

        self.bundles.extend(init);
        self.bundles.extend(rounds_bundles);
        self.bundles.extend(fin);
        Ok(())
    }
}

impl Default for Driver {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Engine;

    #[test]
    fn build_kernel_rejects_zero_rounds() {
        let mut d = Driver::new();
        let err = d.build_kernel(4, 100, env::VLEN, 0).unwrap_err();
        assert!(matches!(err, BuildError::InvariantViolation(_)));
    }

    #[test]
    fn build_kernel_rejects_batch_size_not_multiple_of_vlen() {
        let mut d = Driver::new();
        let err = d.build_kernel(4, 100, env::VLEN + 1, 1).unwrap_err();
        assert!(matches!(err, BuildError::InvariantViolation(_)));
    }

    #[test]
    fn build_kernel_rejects_empty_hash_stage_table() {
        let mut d = Driver::with_config(env::VLEN, env::SCRATCH_SIZE, env::SlotLimits::default_config(), Vec::new());
        let err = d.build_kernel(4, 100, env::VLEN, 1).unwrap_err();
        assert!(matches!(err, BuildError::InvariantViolation(_)));
    }

    #[test]
    fn build_kernel_accumulates_store_bundles() {
        let mut d = Driver::new();
        d.build_kernel(4, 100, env::VLEN * 2, 3).unwrap();
        let has_store = d.bundles().iter().any(|b| b.slot_count(Engine::Store) > 0);
        assert!(has_store);
    }

    #[test]
    fn debug_info_records_named_allocations() {
        let mut d = Driver::new();
        d.build_kernel(4, 100, env::VLEN, 1).unwrap();
        assert!(!d.debug_info().scratch_map.is_empty());
    }

    #[test]
    fn invariant_violations_are_checked_before_any_allocation() {
        let mut d = Driver::new();
        let before = d.debug_info().scratch_map.len();
        let _ = d.build_kernel(4, 100, env::VLEN, 0);
        let after = d.debug_info().scratch_map.len();
        assert_eq!(before, after);
    }
}

//! Static VLIW list scheduler.
//!
//! Packs a flat, program-ordered operation stream into bundles, honouring
//! per-engine slot limits and RAW/WAW/WAR data hazards. The algorithm is a
//! direct structural translation of `original_source/kernel_scheduler.py`'s
//! `VLIWScheduler.build`: a pre-pass computes per-op read/write sets and
//! two dependency relations (`pred_hard`, `pred_war`), then a cycle-by-cycle
//! greedy placement loop fills bundles in critical-path-height order.

use std::collections::{HashMap, HashSet};

use log::{debug, trace};

use crate::common::{Address, BuildError, BuildResult, Engine};
use crate::env::SlotLimits;
use crate::ir::{Bundle, Operation};

pub struct Scheduler {
    limits: SlotLimits,
    vlen: usize,
}

impl Scheduler {
    pub fn new(limits: SlotLimits, vlen: usize) -> Self {
        Scheduler { limits, vlen }
    }

    /// One bundle per operation — used by callers that do not request
    /// packing.
    pub fn trivial(&self, ops: Vec<Operation>) -> Vec<Bundle> {
        ops.into_iter().map(|op| Bundle::single(op.engine, op.slot)).collect()
    }

    /// Pack `ops` into bundles. `ops` is consumed in its given program
    /// order; that order is the only source of determinism the scheduler
    /// relies on.
    pub fn schedule(&self, ops: Vec<Operation>) -> BuildResult<Vec<Bundle>> {
        let n = ops.len();
        if n == 0 {
            return Ok(Vec::new());
        }

        let reads: Vec<_> = ops.iter().map(|op| op.reads(self.vlen)).collect();
        let writes: Vec<_> = ops.iter().map(|op| op.writes(self.vlen)).collect();

        // pred_hard[i]: earlier ops i must strictly follow (RAW or WAW).
        let mut pred_hard: Vec<HashSet<usize>> = vec![HashSet::new(); n];
        let mut last_write: HashMap<Address, usize> = HashMap::new();
        for i in 0..n {
            if ops[i].engine == Engine::Debug {
                continue;
            }
            for addr in &reads[i] {
                if let Some(&w) = last_write.get(addr) {
                    pred_hard[i].insert(w);
                }
            }
            for addr in &writes[i] {
                if let Some(&w) = last_write.get(addr) {
                    pred_hard[i].insert(w);
                }
            }
            for addr in &writes[i] {
                last_write.insert(*addr, i);
            }
        }

        // pred_war[i]: earlier readers of an address i writes. Same-cycle
        // placement is allowed (all reads precede all writes in a cycle);
        // an earlier cycle is not.
        let mut pred_war: Vec<HashSet<usize>> = vec![HashSet::new(); n];
        let mut last_read: HashMap<Address, HashSet<usize>> = HashMap::new();
        for i in 0..n {
            if ops[i].engine == Engine::Debug {
                continue;
            }
            for addr in &writes[i] {
                if let Some(readers) = last_read.get(addr) {
                    for &r in readers {
                        if r < i {
                            pred_war[i].insert(r);
                        }
                    }
                }
            }
            for addr in &reads[i] {
                last_read.entry(*addr).or_default().insert(i);
            }
        }

        let mut dep_count: Vec<usize> = pred_hard.iter().map(HashSet::len).collect();
        let mut succ: Vec<HashSet<usize>> = vec![HashSet::new(); n];
        for i in 0..n {
            for &p in &pred_hard[i] {
                succ[p].insert(i);
            }
        }

        let height = self.compute_heights(&ops, &succ);

        let mut scheduled = vec![false; n];
        let mut ready: Vec<usize> = (0..n).filter(|&i| dep_count[i] == 0).collect();
        let mut bundles = Vec::new();

        while !ready.is_empty() {
            ready.sort_by_key(|&i| (std::cmp::Reverse(height[i]), ops[i].engine.schedule_priority(), i));

            let mut bundle = Bundle::new();
            let mut slot_counts: HashMap<Engine, usize> = HashMap::new();
            let mut bundle_writes: HashSet<Address> = HashSet::new();
            let mut bundle_reads: HashSet<Address> = HashSet::new();
            let mut scheduled_this_cycle: Vec<usize> = Vec::new();
            let mut scheduled_this_cycle_set: HashSet<usize> = HashSet::new();

            let mut ready_set = ready;
            ready = Vec::new();
            let mut progress = true;

            while progress && !ready_set.is_empty() {
                progress = false;
                let mut new_ready = Vec::new();
                for i in ready_set {
                    let engine = ops[i].engine;
                    if engine == Engine::Debug {
                        bundle.push(engine, ops[i].slot.clone());
                        scheduled[i] = true;
                        scheduled_this_cycle.push(i);
                        scheduled_this_cycle_set.insert(i);
                        progress = true;
                        continue;
                    }

                    let war_blocked = pred_war[i]
                        .iter()
                        .any(|p| !scheduled[*p] && !scheduled_this_cycle_set.contains(p));
                    if war_blocked {
                        new_ready.push(i);
                        continue;
                    }

                    let limit = self.limits.get(engine).unwrap_or(1);
                    if *slot_counts.get(&engine).unwrap_or(&0) >= limit {
                        new_ready.push(i);
                        continue;
                    }

                    if reads[i].iter().any(|a| bundle_writes.contains(a)) {
                        new_ready.push(i);
                        continue;
                    }
                    if writes[i].iter().any(|a| bundle_writes.contains(a)) {
                        new_ready.push(i);
                        continue;
                    }

                    trace!("placing {} into bundle #{}", ops[i], bundles.len());
                    bundle.push(engine, ops[i].slot.clone());
                    *slot_counts.entry(engine).or_insert(0) += 1;
                    bundle_writes.extend(writes[i].iter().copied());
                    bundle_reads.extend(reads[i].iter().copied());
                    scheduled[i] = true;
                    scheduled_this_cycle.push(i);
                    scheduled_this_cycle_set.insert(i);
                    progress = true;
                }
                ready_set = new_ready;
            }

            ready = ready_set;

            if !bundle.is_empty() {
                trace!("bundle #{}: {} slots total", bundles.len(), bundle.total_slots());
                bundles.push(bundle);
            } else if scheduled_this_cycle.is_empty() {
                // No progress this cycle and nothing left to place: the
                // dependency graph has a cycle.
                return Err(BuildError::DependencyCycle { remaining: ready.len() });
            }

            for i in scheduled_this_cycle {
                for j in 0..n {
                    if !scheduled[j] && pred_hard[j].remove(&i) {
                        dep_count[j] -= 1;
                        if dep_count[j] == 0 && !ready.contains(&j) {
                            ready.push(j);
                        }
                    }
                }
            }
        }

        let remaining = scheduled.iter().filter(|s| !**s).count();
        if remaining > 0 {
            return Err(BuildError::DependencyCycle { remaining });
        }

        debug!("scheduled {n} ops into {} bundles", bundles.len());
        Ok(bundles)
    }

    /// Longest latency-weighted path from each op to any leaf in the
    /// successor graph.
    fn compute_heights(&self, ops: &[Operation], succ: &[HashSet<usize>]) -> Vec<u64> {
        let n = ops.len();
        let mut height = vec![0u64; n];
        for i in (0..n).rev() {
            let weight = self.latency_weight(ops[i].engine);
            height[i] = match succ[i].iter().map(|&s| height[s]).max() {
                Some(max_succ) => weight + max_succ,
                None => weight,
            };
        }
        height
    }

    /// Scarcity-derived latency weights, capped against the load roofline.
    /// A fixed-weight table (one constant latency per engine regardless of
    /// slot counts) was considered and rejected: it can't express that a
    /// single-slot engine is a tighter bottleneck than a four-slot one.
    fn latency_weight(&self, engine: Engine) -> u64 {
        let base_limit = self.limits.base_limit().max(1) as u64;
        let load_limit = (self.limits.load.max(1)) as u64;
        let load_weight = base_limit.div_ceil(load_limit);
        match engine {
            Engine::Debug => 0,
            Engine::Load => load_weight * 2,
            Engine::Flow | Engine::Store => {
                let limit = self.limits.get(engine).unwrap_or(1).max(1) as u64;
                let weight = base_limit.div_ceil(limit);
                weight.min(load_weight)
            }
            Engine::Alu | Engine::Valu => {
                let limit = self.limits.get(engine).unwrap_or(1).max(1) as u64;
                base_limit.div_ceil(limit)
            }
        }
    }
}

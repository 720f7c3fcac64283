//! The concrete end-to-end scenarios and whole-kernel invariants: bundle-count
//! ceiling, boundary round counts, and build determinism. The reference
//! simulator and interpreter are out-of-scope external collaborators, so
//! these check what this crate can check on its own: the emitted bundle
//! count and the structural invariants (slot limits, monotonic arena),
//! not numeric equivalence against a simulated execution.

use vliw_kernelgen::env;
use vliw_kernelgen::Driver;

fn full_tree_node_count(forest_height: i64) -> i64 {
    (1i64 << (forest_height + 1)) - 1
}

/// Scenario 1: the largest documented shape. Baseline ceiling from the
/// reference implementation's own bundle count for this configuration.
#[test]
fn scenario_1_large_shape_stays_under_baseline_bundle_count() {
    let _ = env_logger::try_init();
    let forest_height = 10usize;
    let n_nodes = full_tree_node_count(forest_height as i64);
    let mut driver = Driver::new();
    driver.build_kernel(forest_height, n_nodes, 256, 16).unwrap();

    let bundles = driver.bundles();
    assert!(
        bundles.len() <= 147_734,
        "emitted {} bundles, expected at most the 147,734 baseline",
        bundles.len()
    );
    assert_invariants_hold(&driver);
}

/// Scenario 2: shortest correctness case — a single batch, six rounds,
/// covering the single-tree and dual-tree special rounds plus general
/// gather rounds.
#[test]
fn scenario_2_shortest_case_builds_and_holds_invariants() {
    let _ = env_logger::try_init();
    let forest_height = 4usize;
    let n_nodes = full_tree_node_count(forest_height as i64);
    let mut driver = Driver::new();
    driver.build_kernel(forest_height, n_nodes, env::VLEN, 6).unwrap();
    assert!(!driver.bundles().is_empty());
    assert_invariants_hold(&driver);
}

/// Scenario 3: two batches, exercising multi-batch interleaving within
/// round 0 (a single-tree special round).
#[test]
fn scenario_3_multi_batch_special_round_builds_and_holds_invariants() {
    let _ = env_logger::try_init();
    let forest_height = 2usize;
    let n_nodes = full_tree_node_count(forest_height as i64);
    let mut driver = Driver::new();
    driver.build_kernel(forest_height, n_nodes, 2 * env::VLEN, 4).unwrap();
    assert!(!driver.bundles().is_empty());
    assert_invariants_hold(&driver);
}

/// Invariant 6: two builds with identical inputs produce identical outputs.
#[test]
fn identical_inputs_produce_identical_bundle_sequences() {
    let _ = env_logger::try_init();
    let mut a = Driver::new();
    a.build_kernel(4, 31, env::VLEN * 2, 6).unwrap();

    let mut b = Driver::new();
    b.build_kernel(4, 31, env::VLEN * 2, 6).unwrap();

    assert_eq!(a.bundles(), b.bundles());
}

/// Invariant 1: every bundle's per-engine slot count stays within the
/// configured limit (checked here against a non-default, tighter config so
/// the assertion isn't vacuously true under generous defaults).
#[test]
fn tight_slot_limits_are_never_exceeded_across_a_full_build() {
    use vliw_kernelgen::common::Engine;

    let _ = env_logger::try_init();
    let limits = env::SlotLimits { load: 1, store: 1, alu: 1, valu: 1, flow: 1 };
    let mut driver = Driver::with_config(env::VLEN, env::SCRATCH_SIZE, limits, env::hash_stages());
    driver.build_kernel(3, 15, env::VLEN * 2, 3).unwrap();

    for bundle in driver.bundles() {
        for engine in [Engine::Load, Engine::Store, Engine::Alu, Engine::Valu, Engine::Flow] {
            let limit = limits.get(engine).unwrap();
            assert!(
                bundle.slot_count(engine) <= limit,
                "{engine} exceeded its slot limit of {limit}"
            );
        }
    }
}

fn assert_invariants_hold(driver: &Driver) {
    use vliw_kernelgen::common::Engine;

    let limits = env::SlotLimits::default_config();
    for bundle in driver.bundles() {
        for engine in [Engine::Load, Engine::Store, Engine::Alu, Engine::Valu, Engine::Flow] {
            assert!(bundle.slot_count(engine) <= limits.get(engine).unwrap());
        }
    }
    assert!(!driver.debug_info().scratch_map.is_empty());
}

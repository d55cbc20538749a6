//! Keep/revert lifecycle of top-level constants.

mod common;

use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;

use common::{eager_config, lazy_ctx, long_of, wait_for_state};
use lazyrts::{CafRegistry, CapabilityPool, Closure, Field, RtsConfig, RtsError, ThunkState};

fn reading_caf(registry: &CafRegistry, source: &Arc<AtomicI64>, runs: &Arc<AtomicUsize>) -> Closure {
    let source = Arc::clone(source);
    let runs = Arc::clone(runs);
    Closure::caf_in(registry, move |_ctx| {
        runs.fetch_add(1, Ordering::SeqCst);
        Ok(Closure::long(source.load(Ordering::SeqCst)))
    })
}

#[test]
fn test_revert_forces_recomputation() {
    let mut ctx = lazy_ctx();
    let registry = CafRegistry::new();
    registry.set_keep_cafs();

    let source = Arc::new(AtomicI64::new(0));
    let runs = Arc::new(AtomicUsize::new(0));
    let caf = reading_caf(&registry, &source, &runs);

    assert_eq!(long_of(&caf.evaluate(&mut ctx).unwrap()), Some(0));
    source.store(10, Ordering::SeqCst);
    assert_eq!(long_of(&caf.evaluate(&mut ctx).unwrap()), Some(0));
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    registry.revert();
    assert_eq!(long_of(&caf.evaluate(&mut ctx).unwrap()), Some(10));
    assert_eq!(runs.load(Ordering::SeqCst), 2);
}

#[test]
fn test_revert_resets_every_registered_caf() {
    let mut ctx = lazy_ctx();
    let registry = CafRegistry::new();
    registry.set_keep_cafs();
    let source = Arc::new(AtomicI64::new(1));
    let runs = Arc::new(AtomicUsize::new(0));

    let cafs: Vec<Closure> = (0..5).map(|_| reading_caf(&registry, &source, &runs)).collect();
    for caf in &cafs {
        caf.evaluate(&mut ctx).unwrap();
    }
    assert_eq!(registry.len(), 5);

    assert_eq!(registry.revert(), 5);
    assert!(registry.is_empty());
    for caf in &cafs {
        assert!(matches!(caf.as_thunk().unwrap().state(), ThunkState::Unevaluated));
    }
    // a second revert has nothing left to do
    assert_eq!(registry.revert(), 0);

    source.store(2, Ordering::SeqCst);
    for caf in &cafs {
        assert_eq!(long_of(&caf.evaluate(&mut ctx).unwrap()), Some(2));
    }
    assert_eq!(runs.load(Ordering::SeqCst), 10);
}

#[test]
fn test_cafs_built_with_keep_off_are_permanent() {
    let mut ctx = lazy_ctx();
    let registry = CafRegistry::new();
    let source = Arc::new(AtomicI64::new(3));
    let runs = Arc::new(AtomicUsize::new(0));
    let caf = reading_caf(&registry, &source, &runs);
    let v = caf.evaluate(&mut ctx).unwrap();

    registry.set_keep_cafs();
    assert_eq!(registry.revert(), 0);
    assert!(caf.get_evaluated().unwrap().ptr_eq(&v));
}

#[test]
fn test_keep_flag_seeded_from_config() {
    let config = RtsConfig::from_toml_str("keep_cafs = true").unwrap();
    let registry = CafRegistry::new();
    registry.apply_config(&config);
    assert!(registry.should_keep_cafs());

    let source = Arc::new(AtomicI64::new(0));
    let runs = Arc::new(AtomicUsize::new(0));
    let _caf = reading_caf(&registry, &source, &runs);
    assert_eq!(registry.len(), 1);
}

#[test]
fn test_process_wide_registry() {
    let mut ctx = lazy_ctx();
    lazyrts::set_keep_cafs();
    assert!(lazyrts::should_keep_cafs());

    let source = Arc::new(AtomicI64::new(0));
    let caf = {
        let source = Arc::clone(&source);
        Closure::caf(move |_ctx| Ok(Closure::long(source.load(Ordering::SeqCst))))
    };
    assert_eq!(long_of(&caf.evaluate(&mut ctx).unwrap()), Some(0));
    source.store(1, Ordering::SeqCst);

    assert!(lazyrts::revert_cafs() >= 1);
    assert_eq!(long_of(&caf.evaluate(&mut ctx).unwrap()), Some(1));

    lazyrts::reset_keep_cafs();
    assert!(!lazyrts::should_keep_cafs());
}

#[test]
fn test_revert_releases_stale_value() {
    let mut ctx = lazy_ctx();
    let registry = CafRegistry::new();
    registry.set_keep_cafs();
    let caf = Closure::caf_in(&registry, |_ctx| Ok(Closure::data(1, (0..1000).map(Field::Long).collect())));

    let stale = caf.evaluate(&mut ctx).unwrap().downgrade();
    assert!(stale.upgrade().is_some());
    registry.revert();
    assert!(stale.upgrade().is_none());
}

#[test]
fn test_revert_wakes_blocked_waiters() {
    let registry = CafRegistry::new();
    registry.set_keep_cafs();
    let runs = Arc::new(AtomicUsize::new(0));
    let (gate_tx, gate_rx) = crossbeam_channel::bounded::<()>(0);
    let caf = {
        let runs = Arc::clone(&runs);
        Closure::caf_in(&registry, move |_ctx| {
            let n = runs.fetch_add(1, Ordering::SeqCst);
            if n == 0 {
                gate_rx.recv().map_err(|e| RtsError::Interpreter(e.to_string()))?;
            }
            Ok(Closure::long(n as i64))
        })
    };
    let pool = CapabilityPool::new(eager_config(2)).unwrap();

    let owner = {
        let caf = caf.clone();
        pool.spawn(move |ctx| caf.evaluate(ctx)).unwrap()
    };
    wait_for_state(&caf, |s| matches!(s, ThunkState::BlackHole { .. }));
    let waiter = {
        let caf = caf.clone();
        pool.spawn(move |ctx| caf.evaluate(ctx)).unwrap()
    };
    wait_for_state(&caf, |s| matches!(s, ThunkState::BlockingQueue { waiters: 1, .. }));

    // the reset displaces the queue; its waiter re-reads the slot and runs
    // the CAF itself
    assert_eq!(registry.revert(), 1);
    let v = waiter.recv().unwrap().unwrap();
    assert_eq!(long_of(&v), Some(1));

    gate_tx.send(()).unwrap();
    assert!(owner.recv().unwrap().unwrap().ptr_eq(&v));
    assert!(caf.get_evaluated().unwrap().ptr_eq(&v));
    assert_eq!(runs.load(Ordering::SeqCst), 2);
    pool.shutdown();
}

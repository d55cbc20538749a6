//! Shared helpers for the integration suites.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use lazyrts::{Closure, RtsConfig, StgContext, ThunkState};

/// Lazy-mode context on a private capability.
pub fn lazy_ctx() -> StgContext {
    lazyrts::runtime::logging::init_for_tests();
    StgContext::standalone(RtsConfig::default())
}

pub fn eager_config(capabilities: usize) -> RtsConfig {
    RtsConfig::default()
        .with_eager_blackholing()
        .with_capabilities(capabilities)
}

/// Thunk that counts how often its code runs and sleeps for `delay` first.
pub fn counting_thunk(calls: &Arc<AtomicUsize>, result: i64, delay: Duration) -> Closure {
    let calls = Arc::clone(calls);
    Closure::thunk(move |_ctx| {
        calls.fetch_add(1, Ordering::SeqCst);
        if !delay.is_zero() {
            thread::sleep(delay);
        }
        Ok(Closure::long(result))
    })
}

/// Native `(+)` on boxed longs; forces its arguments.
pub fn add() -> Closure {
    Closure::function("add", 2, |ctx, args| {
        let mut total = 0;
        for arg in args.iter() {
            if let Some(p) = arg.as_ptr() {
                total += long_of(&p.evaluate(ctx)?).unwrap_or(0);
            }
        }
        Ok(Closure::long(total))
    })
}

pub fn long_of(c: &Closure) -> Option<i64> {
    c.as_value()?.as_long()
}

pub fn int_of(c: &Closure) -> Option<i32> {
    c.as_value()?.as_int()
}

/// Poll `cond` on a thunk's state until it holds, failing after five seconds.
pub fn wait_for_state(thunk: &Closure, cond: impl Fn(&ThunkState) -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    let t = thunk.as_thunk().expect("not a thunk");
    loop {
        let state = t.state();
        if cond(&state) {
            return;
        }
        assert!(Instant::now() < deadline, "timed out waiting, last state {:?}", state);
        thread::sleep(Duration::from_millis(1));
    }
}

/// Poll until `cond` holds, failing after five seconds.
pub fn wait_until(what: &str, cond: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !cond() {
        assert!(Instant::now() < deadline, "timed out waiting for {}", what);
        thread::sleep(Duration::from_millis(1));
    }
}

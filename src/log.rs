//! Runtime switch for the MI wire trace.
//!
//! Every line written to or read from a gdb is logged under the `mi` target when the switch is
//! on. The switch can be flipped at any moment (the `debug` interpreter command does it), so it is
//! a plain atomic and not a logger filter.

use std::sync::atomic::{AtomicBool, Ordering};

static ENABLED: AtomicBool = AtomicBool::new(false);

#[inline(always)]
pub fn is_enabled() -> bool {
    ENABLED.load(Ordering::SeqCst)
}

pub fn disable() {
    ENABLED.store(false, Ordering::SeqCst)
}

pub fn enable() {
    ENABLED.store(true, Ordering::SeqCst)
}

/// Flip the switch, return the new state.
pub fn toggle() -> bool {
    !ENABLED.fetch_xor(true, Ordering::SeqCst)
}

#[macro_export]
macro_rules! mi_trace {
    ($($arg:tt)+) => {
        if $crate::log::is_enabled() {
            log::info!(target: "mi", $($arg)+)
        } else {
            log::trace!(target: "mi", $($arg)+)
        }
    };
}

//! Monotonic millisecond clock
//!
//! The std backend measures against a lazily captured process epoch. The
//! no_std backend reads a tick source registered exactly once during
//! single-threaded init (typically the RTOS tick hook or a hardware timer);
//! it is resolved at registration time, never re-resolved per call.

#[cfg(feature = "std")]
mod imp {
    use std::sync::OnceLock;
    use std::time::Instant;

    static EPOCH: OnceLock<Instant> = OnceLock::new();

    pub fn now_millis() -> u64 {
        let epoch = EPOCH.get_or_init(Instant::now);
        epoch.elapsed().as_millis() as u64
    }

    pub fn ticking() -> bool {
        true
    }
}

#[cfg(not(feature = "std"))]
mod imp {
    use core::sync::atomic::{AtomicUsize, Ordering};

    static TICK_SOURCE: AtomicUsize = AtomicUsize::new(0);

    /// Register the millisecond tick source. Call once during init, before
    /// any timed wait is issued.
    pub fn set_tick_source(source: fn() -> u64) {
        TICK_SOURCE.store(source as usize, Ordering::Release);
    }

    pub fn now_millis() -> u64 {
        let raw = TICK_SOURCE.load(Ordering::Acquire);
        if raw == 0 {
            return 0;
        }
        // Stored from a valid fn pointer in set_tick_source.
        let source: fn() -> u64 = unsafe { core::mem::transmute(raw) };
        source()
    }

    pub fn ticking() -> bool {
        TICK_SOURCE.load(Ordering::Acquire) != 0
    }
}

#[cfg(not(feature = "std"))]
pub use imp::set_tick_source;
pub use imp::{now_millis, ticking};

//! Reentrancy guard for replicated operation replay.
//!
//! While a thread is applying a remotely-originated operation, every local
//! mutation it triggers must be suppressed from re-publication, otherwise a
//! single update would echo around the cluster forever
//! (replicate → apply → replicate). The flag is thread-scoped: concurrent
//! dispatches on other threads never observe or clear each other's state.

use std::cell::Cell;

thread_local! {
    static REPLAYING: Cell<bool> = const { Cell::new(false) };
}

/// Is the current thread applying a remotely-originated operation?
#[must_use]
pub fn is_replaying() -> bool {
    REPLAYING.with(Cell::get)
}

/// RAII scope marking the current thread as replaying.
///
/// The previous value is restored on drop, on every exit path including
/// unwinding, so nested dispatches behave and a failed handler cannot leave
/// the thread stuck in replay mode.
#[derive(Debug)]
pub struct ReplayGuard {
    prev: bool,
}

impl ReplayGuard {
    #[must_use]
    pub fn enter() -> Self {
        let prev = REPLAYING.with(|flag| flag.replace(true));
        Self { prev }
    }
}

impl Drop for ReplayGuard {
    fn drop(&mut self) {
        REPLAYING.with(|flag| flag.set(self.prev));
    }
}

//! Operator abort signal
//!
//! Checked by the sequencer between phases only; a running move is never
//! interrupted by it.

use core::sync::atomic::{AtomicBool, Ordering};

/// Source of an operator abort request
pub trait AbortSignal {
    /// Check if an abort was requested
    fn abort_requested(&self) -> bool;
}

impl AbortSignal for AtomicBool {
    fn abort_requested(&self) -> bool {
        self.load(Ordering::Acquire)
    }
}

impl AbortSignal for bool {
    fn abort_requested(&self) -> bool {
        *self
    }
}

impl<A: AbortSignal + ?Sized> AbortSignal for &A {
    fn abort_requested(&self) -> bool {
        (**self).abort_requested()
    }
}

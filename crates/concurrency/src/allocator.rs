//! Write pointer allocation
//!
//! A single monotonic counter for the whole coordinator. Every transaction
//! start and every successful conflict registration takes the next value,
//! so write pointers and commit pointers share one total order.

use std::sync::atomic::{AtomicU64, Ordering};
use txcoord_core::{Error, Result, WritePointer};

/// Issues strictly increasing write pointers
///
/// Allocation is lock-free and safe from any number of threads; no value is
/// ever returned twice. Reaching `u64::MAX` is reported as
/// [`Error::PointerExhausted`] instead of wrapping.
#[derive(Debug, Default)]
pub struct PointerAllocator {
    /// Last value handed out; 0 means nothing allocated yet
    last: AtomicU64,
}

impl PointerAllocator {
    /// Create an allocator whose first pointer is `last + 1`
    pub fn new(last: WritePointer) -> Self {
        Self {
            last: AtomicU64::new(last),
        }
    }

    /// Allocate the next pointer
    pub fn next(&self) -> Result<WritePointer> {
        self.last
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| last.checked_add(1))
            .map(|previous| previous + 1)
            .map_err(|_| Error::PointerExhausted)
    }

    /// Highest pointer allocated so far
    pub fn current(&self) -> WritePointer {
        self.last.load(Ordering::SeqCst)
    }

    /// Make sure future pointers are above `pointer`. Used by recovery.
    pub fn advance_to(&self, pointer: WritePointer) {
        self.last.fetch_max(pointer, Ordering::SeqCst);
    }
}

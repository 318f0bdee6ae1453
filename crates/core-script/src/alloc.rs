//! Tracked allocation budget for VM values.
//!
//! Not a real allocator: an accounting handle charged at the VM's
//! allocation points (string concatenation, array/table creation and
//! growth, call-frame creation). Charges past the cap are refused with
//! `MemoryLimitExceeded` before the underlying allocation happens, so a
//! failed script leaves no half-charged state behind; the caller unwinds
//! and `reset` reclaims the whole run.

use std::cell::Cell;
use std::rc::Rc;

use crate::ScriptError;

/// Estimated overhead per value-sized slot (header + alignment).
pub const SLOT_COST: usize = 16;
/// Flat charge per call frame.
pub const FRAME_COST: usize = 128;

#[derive(Clone)]
pub struct TrackedAlloc {
    inner: Rc<Inner>,
}

struct Inner {
    cap: usize,
    used: Cell<usize>,
    peak: Cell<usize>,
}

impl TrackedAlloc {
    pub fn new(cap: usize) -> Self {
        Self {
            inner: Rc::new(Inner {
                cap,
                used: Cell::new(0),
                peak: Cell::new(0),
            }),
        }
    }

    /// Charge `bytes` against the budget, refusing past the cap.
    pub fn charge(&self, bytes: usize) -> Result<(), ScriptError> {
        let used = self.inner.used.get();
        let next = used
            .checked_add(bytes)
            .ok_or(ScriptError::MemoryLimitExceeded)?;
        if next > self.inner.cap {
            return Err(ScriptError::MemoryLimitExceeded);
        }
        self.inner.used.set(next);
        if next > self.inner.peak.get() {
            self.inner.peak.set(next);
        }
        Ok(())
    }

    /// Return `bytes` to the budget (frame pops).
    pub fn release(&self, bytes: usize) {
        let used = self.inner.used.get();
        self.inner.used.set(used.saturating_sub(bytes));
    }

    pub fn used(&self) -> usize {
        self.inner.used.get()
    }

    pub fn peak(&self) -> usize {
        self.inner.peak.get()
    }

    pub fn cap(&self) -> usize {
        self.inner.cap
    }

    /// Clear the running charge (start of a fresh invocation); peak is kept
    /// for host statistics until explicitly cleared.
    pub fn reset(&self) {
        self.inner.used.set(0);
    }
}

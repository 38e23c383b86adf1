//! Per-object ownership header: reference count, flags and scan count

use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};

/// There can be only one holder; retains are invariant violations.
pub(crate) const UNIQUE: u8 = 0b0000_0001;
/// Teardown runs a user-visible hook (class destructor).
pub(crate) const CUSTOM_HANDLERS: u8 = 0b0000_0010;
/// The object may transitively hold reference-counted values.
pub(crate) const NEEDS_SCAN: u8 = 0b0000_0100;
/// Teardown has begun; further access is an error.
pub(crate) const IN_TEARDOWN: u8 = 0b0000_1000;
/// `NEEDS_SCAN` is fixed for the object's lifetime (objects, closures,
/// closure variables, references) instead of following the scan count.
pub(crate) const SCAN_FIXED: u8 = 0b0001_0000;

#[derive(Debug, Default)]
pub(crate) struct ObjectHeader {
    refs: AtomicUsize,
    flags: AtomicU8,
    scan: AtomicUsize,
}

impl ObjectHeader {
    pub(crate) fn new(flags: u8, scan: usize) -> Self {
        let header = ObjectHeader::default();
        header.reset(flags, scan);
        header
    }

    /// Reinitialize for a new occupant with one owner.
    pub(crate) fn reset(&self, flags: u8, scan: usize) {
        let flags = if flags & SCAN_FIXED != 0 || scan > 0 {
            flags | NEEDS_SCAN
        } else {
            flags & !NEEDS_SCAN
        };
        self.scan.store(scan, Ordering::Relaxed);
        self.flags.store(flags, Ordering::Relaxed);
        self.refs.store(1, Ordering::Release);
    }

    /// Mark the slot empty.
    pub(crate) fn clear(&self) {
        self.refs.store(0, Ordering::Release);
        self.flags.store(0, Ordering::Relaxed);
        self.scan.store(0, Ordering::Relaxed);
    }

    // ═══════════════════════════════════════════════════════════════════
    // Reference Count
    // ═══════════════════════════════════════════════════════════════════

    pub(crate) fn refs(&self) -> usize {
        self.refs.load(Ordering::Acquire)
    }

    pub(crate) fn increment(&self) {
        self.refs.fetch_add(1, Ordering::Relaxed);
    }

    /// Decrement and return the previous count. Exactly one caller sees 1.
    ///
    /// An underflow is undone before returning 0.
    pub(crate) fn decrement(&self) -> usize {
        let prev = self.refs.fetch_sub(1, Ordering::AcqRel);
        if prev == 0 {
            self.refs.fetch_add(1, Ordering::AcqRel);
        }
        prev
    }

    // ═══════════════════════════════════════════════════════════════════
    // Flags
    // ═══════════════════════════════════════════════════════════════════

    pub(crate) fn has(&self, flag: u8) -> bool {
        self.flags.load(Ordering::Acquire) & flag != 0
    }

    pub(crate) fn is_unique(&self) -> bool {
        self.has(UNIQUE)
    }

    pub(crate) fn needs_scan(&self) -> bool {
        self.has(NEEDS_SCAN)
    }

    pub(crate) fn in_teardown(&self) -> bool {
        self.has(IN_TEARDOWN)
    }

    /// Set `IN_TEARDOWN`; true only for the caller that set it first.
    pub(crate) fn begin_teardown(&self) -> bool {
        self.flags.fetch_or(IN_TEARDOWN, Ordering::AcqRel) & IN_TEARDOWN == 0
    }

    // ═══════════════════════════════════════════════════════════════════
    // Scan Count
    // ═══════════════════════════════════════════════════════════════════

    pub(crate) fn scan_count(&self) -> usize {
        self.scan.load(Ordering::Acquire)
    }

    /// Adjust the scan count, keeping `NEEDS_SCAN` in step with it unless
    /// the flag is fixed. Returns the new count.
    pub(crate) fn adjust_scan(&self, delta: isize) -> usize {
        let new = if delta >= 0 {
            self.scan.fetch_add(delta as usize, Ordering::AcqRel) + delta as usize
        } else {
            let sub = delta.unsigned_abs();
            let prev = self
                .scan
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| Some(n.saturating_sub(sub)))
                .unwrap_or_else(|n| n);
            prev.saturating_sub(sub)
        };
        if !self.has(SCAN_FIXED) {
            if new > 0 {
                self.flags.fetch_or(NEEDS_SCAN, Ordering::AcqRel);
            } else {
                self.flags.fetch_and(!NEEDS_SCAN, Ordering::AcqRel);
            }
        }
        new
    }
}

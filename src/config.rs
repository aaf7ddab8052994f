//! Crate-wide tunables. Page size is overridable (test-only) via
//! `set_page_size`; the others are fixed defaults per spec §6.

use std::sync::atomic::{AtomicUsize, Ordering};

static PAGE_SIZE: AtomicUsize = AtomicUsize::new(4096);

pub fn get_page_size() -> usize {
    PAGE_SIZE.load(Ordering::Relaxed)
}

/// Test-only override; production callers should never call this.
pub fn set_page_size(size: usize) {
    PAGE_SIZE.store(size, Ordering::Relaxed);
}

pub const DEFAULT_BUFFER_POOL_CAPACITY: usize = 50;
pub const DEADLOCK_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);

/// Width, in bytes, of a page-number/page-index/table-id field on disk.
pub const INDEX_SIZE: usize = 4;

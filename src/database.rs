use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use once_cell::sync::OnceCell;

use crate::{
    buffer_pool::BufferPool, catalog::Catalog, concurrent_status::ConcurrentStatus,
    util::HandyRwLock,
};

static DATABASE: OnceCell<Database> = OnceCell::new();

/// Process-wide singleton bundling the buffer pool, lock manager, and
/// table catalog — the pieces every module reaches for by calling
/// `Database::buffer_pool()` etc. rather than threading references
/// through every function signature.
pub struct Database {
    buffer_pool: BufferPool,
    concurrent_status: ConcurrentStatus,
    catalog: Arc<RwLock<Catalog>>,
}

impl Database {
    fn new() -> Self {
        Self {
            buffer_pool: BufferPool::new(),
            concurrent_status: ConcurrentStatus::new(),
            catalog: Arc::new(RwLock::new(Catalog::new())),
        }
    }

    fn global() -> &'static Database {
        DATABASE.get_or_init(Database::new)
    }

    pub fn buffer_pool() -> &'static BufferPool {
        &Self::global().buffer_pool
    }

    pub fn mut_buffer_pool() -> &'static BufferPool {
        &Self::global().buffer_pool
    }

    pub fn concurrent_status() -> &'static ConcurrentStatus {
        &Self::global().concurrent_status
    }

    pub fn catalog() -> RwLockReadGuard<'static, Catalog> {
        Self::global().catalog.rl()
    }

    pub fn mut_catalog() -> RwLockWriteGuard<'static, Catalog> {
        Self::global().catalog.wl()
    }
}

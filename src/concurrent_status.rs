use std::{
    collections::{HashMap, HashSet},
    fmt,
    sync::Mutex,
    time::Instant,
};

use log::debug;

use crate::{
    page_key::PageKey, config::DEADLOCK_TIMEOUT, error::SmallError,
    transaction::Transaction,
};

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Lock {
    XLock,
    SLock,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Permission {
    ReadOnly,
    ReadWrite,
}

impl Permission {
    pub fn to_lock(&self) -> Lock {
        match self {
            Permission::ReadOnly => Lock::SLock,
            Permission::ReadWrite => Lock::XLock,
        }
    }
}

/// The buffer pool's lock manager: shared/exclusive page locks keyed by
/// `PageKey`, so heap pages and B+ tree pages share one lock table,
/// plus the reverse index of pages each transaction holds, used to
/// release everything at commit/abort.
pub struct ConcurrentStatus {
    inner: Mutex<Inner>,
}

struct Inner {
    s_lock_map: HashMap<PageKey, HashSet<Transaction>>,
    x_lock_map: HashMap<PageKey, Transaction>,
    hold_pages: HashMap<Transaction, HashSet<PageKey>>,
}

impl ConcurrentStatus {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                s_lock_map: HashMap::new(),
                x_lock_map: HashMap::new(),
                hold_pages: HashMap::new(),
            }),
        }
    }

    /// Blocks (busy-polling the lock tables) until `tx` holds `lock` on
    /// `page_id`, or the deadlock timeout elapses. Spec §4.4: "wait-die
    /// by wall-clock timeout... no waits-for graph is built."
    pub fn request_lock(
        &self,
        tx: &Transaction,
        lock: &Lock,
        page_id: &PageKey,
    ) -> Result<(), SmallError> {
        let start = Instant::now();
        loop {
            if self.try_add_lock(tx, lock, page_id) {
                return Ok(());
            }

            if start.elapsed() >= DEADLOCK_TIMEOUT {
                debug!("tx {:?} timed out waiting for {:?} on {:?}", tx, lock, page_id);
                return Err(SmallError::transaction_aborted(&format!(
                    "timed out waiting for lock on {}",
                    page_id
                )));
            }

            std::thread::sleep(std::time::Duration::from_millis(10));
        }
    }

    fn try_add_lock(&self, tx: &Transaction, lock: &Lock, page_id: &PageKey) -> bool {
        let mut inner = self.inner.lock().unwrap();

        let x_holder = inner.x_lock_map.get(page_id).copied();
        match lock {
            Lock::SLock => {
                // Granted unless some other tx holds the exclusive lock.
                if x_holder.is_some() && x_holder != Some(*tx) {
                    return false;
                }
                inner
                    .s_lock_map
                    .entry(page_id.clone())
                    .or_insert_with(HashSet::new)
                    .insert(*tx);
            }
            Lock::XLock => {
                if let Some(holder) = x_holder {
                    if holder != *tx {
                        return false;
                    }
                } else {
                    // Upgrade in place only if tx is the sole shared holder.
                    if let Some(readers) = inner.s_lock_map.get(page_id) {
                        if readers.iter().any(|t| t != tx) {
                            return false;
                        }
                    }
                }
                inner.x_lock_map.insert(page_id.clone(), *tx);
            }
        }

        inner
            .hold_pages
            .entry(*tx)
            .or_insert_with(HashSet::new)
            .insert(page_id.clone());
        true
    }

    pub fn release_lock(&self, tx: &Transaction, page_id: &PageKey) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(readers) = inner.s_lock_map.get_mut(page_id) {
            readers.remove(tx);
        }
        if inner.x_lock_map.get(page_id) == Some(tx) {
            inner.x_lock_map.remove(page_id);
        }
        if let Some(pages) = inner.hold_pages.get_mut(tx) {
            pages.remove(page_id);
        }
    }

    pub fn release_lock_by_tx(&self, tx: &Transaction) {
        let pages: Vec<PageKey> = {
            let inner = self.inner.lock().unwrap();
            inner
                .hold_pages
                .get(tx)
                .map(|s| s.iter().cloned().collect())
                .unwrap_or_default()
        };
        for p in pages {
            self.release_lock(tx, &p);
        }
        self.inner.lock().unwrap().hold_pages.remove(tx);
    }

    pub fn holds_lock(&self, tx: &Transaction, page_id: &PageKey) -> bool {
        let inner = self.inner.lock().unwrap();
        inner.x_lock_map.get(page_id) == Some(tx)
            || inner
                .s_lock_map
                .get(page_id)
                .map(|s| s.contains(tx))
                .unwrap_or(false)
    }

    pub fn pages_held_by(&self, tx: &Transaction) -> Vec<PageKey> {
        self.inner
            .lock()
            .unwrap()
            .hold_pages
            .get(tx)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.s_lock_map.clear();
        inner.x_lock_map.clear();
        inner.hold_pages.clear();
    }
}

impl fmt::Debug for ConcurrentStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let inner = self.inner.lock().unwrap();
        write!(
            f,
            "ConcurrentStatus {{ s_locks: {}, x_locks: {} }}",
            inner.s_lock_map.len(),
            inner.x_lock_map.len()
        )
    }
}

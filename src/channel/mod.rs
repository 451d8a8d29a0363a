//! # Channel Allocator
//!
//! Exclusive pool of hardware timing channels shared by every driver instance.
//!
//! The pool is a fixed bitmap behind one mutex. It is constructed once and
//! handed to each driver as an `Arc<ChannelPool>`. Drivers hold channels
//! through [`ChannelLease`], which returns its index to the pool exactly once.
//!
//! ```
//! use std::sync::Arc;
//! use dshot_link::channel::{ChannelLease, ChannelPool};
//!
//! let pool = Arc::new(ChannelPool::new(2));
//! {
//!     let mut lease = ChannelLease::new(&pool);
//!     assert!(lease.acquire_any());
//!     assert_eq!(pool.count_free(), 1);
//! }
//! assert_eq!(pool.count_free(), 2);
//! ```

use std::sync::{Arc, Mutex, MutexGuard};

use tracing::trace;

/// Index of a hardware channel within the pool
pub type ChannelIndex = usize;

/// Fixed-size pool of channel indices, each free or taken
#[derive(Debug)]
pub struct ChannelPool {
    taken: Mutex<Vec<bool>>,
}

impl ChannelPool {
    /// Create a pool with `size` free channels
    pub fn new(size: usize) -> Self {
        Self {
            taken: Mutex::new(vec![false; size]),
        }
    }

    // The bitmap is never left half-updated, so a poisoned lock is still usable.
    fn slots(&self) -> MutexGuard<'_, Vec<bool>> {
        self.taken.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Total number of channels
    pub fn size(&self) -> usize {
        self.slots().len()
    }

    /// Take the first free channel
    pub fn acquire_any(&self) -> Option<ChannelIndex> {
        self.acquire_in_range(0, ChannelIndex::MAX)
    }

    /// Take the first free channel within `first..=last`
    ///
    /// `last` is clamped to the pool size. An empty range yields `None`.
    pub fn acquire_in_range(&self, first: ChannelIndex, last: ChannelIndex) -> Option<ChannelIndex> {
        let mut slots = self.slots();
        let last = last.min(slots.len().checked_sub(1)?);
        if first > last {
            return None;
        }

        let index = (first..=last).find(|&i| !slots[i])?;
        slots[index] = true;
        trace!("Channel {} acquired", index);
        Some(index)
    }

    /// Return a channel to the pool
    ///
    /// Releasing a free or out-of-range index is a no-op.
    pub fn release(&self, index: ChannelIndex) {
        if let Some(slot) = self.slots().get_mut(index) {
            if *slot {
                trace!("Channel {} released", index);
            }
            *slot = false;
        }
    }

    /// Number of free channels
    pub fn count_free(&self) -> usize {
        self.slots().iter().filter(|&&taken| !taken).count()
    }

    /// Whether a channel is currently taken (out of range reads as free)
    pub fn is_taken(&self, index: ChannelIndex) -> bool {
        self.slots().get(index).copied().unwrap_or(false)
    }
}

/// RAII ownership of one pool channel
///
/// A lease starts empty, is populated by `acquire_any` / `acquire_in_range`,
/// and releases its channel on `release()` or drop. `disown()` hands the
/// index to the caller without releasing it.
#[derive(Debug)]
pub struct ChannelLease {
    pool: Arc<ChannelPool>,
    index: Option<ChannelIndex>,
}

impl ChannelLease {
    /// Create an empty lease on `pool`
    pub fn new(pool: &Arc<ChannelPool>) -> Self {
        Self {
            pool: Arc::clone(pool),
            index: None,
        }
    }

    /// Acquire any free channel; `true` if the lease now holds one
    pub fn acquire_any(&mut self) -> bool {
        if self.index.is_some() {
            return true;
        }
        self.index = self.pool.acquire_any();
        self.index.is_some()
    }

    /// Acquire a free channel within `first..=last`; `true` if the lease now holds one
    pub fn acquire_in_range(&mut self, first: ChannelIndex, last: ChannelIndex) -> bool {
        if self.index.is_some() {
            return true;
        }
        self.index = self.pool.acquire_in_range(first, last);
        self.index.is_some()
    }

    /// Return the held channel to the pool, if any
    pub fn release(&mut self) {
        if let Some(index) = self.index.take() {
            self.pool.release(index);
        }
    }

    /// Detach the channel without releasing it
    ///
    /// The caller becomes responsible for calling `ChannelPool::release`.
    pub fn disown(&mut self) -> Option<ChannelIndex> {
        self.index.take()
    }

    /// Held channel index
    pub fn index(&self) -> Option<ChannelIndex> {
        self.index
    }

    pub fn is_held(&self) -> bool {
        self.index.is_some()
    }
}

impl Drop for ChannelLease {
    fn drop(&mut self) {
        self.release();
    }
}

//! Shared-slice cells for block-parallel pair loops
//!
//! The pair loops of the field operators accumulate into both endpoint particles of every
//! edge. The mesh guarantees that blocks processed concurrently never share a particle
//! (see [`crate::mesh`]), so per-element mutable access from multiple threads is safe as
//! long as each index is only touched by the block that owns it. [`SyncCell`] is the
//! zero-cost handle that expresses this: a column is reinterpreted as a slice of cells,
//! and the block loop takes per-index mutable references through them.

use std::cell::UnsafeCell;

/// Interior-mutable wrapper over a single slice element
#[repr(transparent)]
pub(crate) struct SyncCell<T>(UnsafeCell<T>);

// SAFETY: access is coordinated externally by the block partitioning invariant.
unsafe impl<T: Send> Sync for SyncCell<T> {}

impl<T> SyncCell<T> {
    /// Mutable reference to the wrapped value
    ///
    /// # Safety
    ///
    /// No other reference to the same element may exist for the duration of the returned
    /// borrow. Inside `for_each_pair` this holds because concurrently processed blocks
    /// have disjoint endpoint sets and a single block is visited by one worker.
    #[allow(clippy::mut_from_ref)]
    pub(crate) unsafe fn get(&self) -> &mut T {
        &mut *self.0.get()
    }
}

impl<T: Copy> SyncCell<T> {
    /// Copies the wrapped value out without forming a mutable reference
    ///
    /// # Safety
    ///
    /// No concurrent write to the same element may happen. Concurrent reads are fine,
    /// which is what the boundary procedure relies on when many fixed particles read the
    /// state of a shared fluid neighbor.
    pub(crate) unsafe fn read(&self) -> T {
        *self.0.get()
    }
}

/// Reinterprets a mutable slice as a slice of [`SyncCell`]s
pub(crate) fn as_sync_cells<T>(slice: &mut [T]) -> &[SyncCell<T>] {
    // SAFETY: `SyncCell<T>` is `repr(transparent)` over `UnsafeCell<T>`, which is
    // `repr(transparent)` over `T`, so the layouts match.
    unsafe { &*(slice as *mut [T] as *const [SyncCell<T>]) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rayon::prelude::*;

    #[test]
    fn disjoint_parallel_writes_are_visible() {
        let mut data = vec![0usize; 1024];
        {
            let cells = as_sync_cells(&mut data);
            (0..1024usize).into_par_iter().for_each(|i| {
                // Every index is written by exactly one task.
                unsafe { *cells[i].get() = i * 2 };
            });
        }
        assert!(data.iter().enumerate().all(|(i, &v)| v == i * 2));
    }
}

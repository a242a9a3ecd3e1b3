//! Small helpers around std synchronization primitives.

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Locks a std mutex, recovering the data if a previous holder panicked.
///
/// Every mutex in Merit Scan guards plain state that stays consistent
/// between statements, so a poisoned lock is still safe to read.
pub fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

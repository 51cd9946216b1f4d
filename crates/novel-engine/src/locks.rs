//! Per-user turn serialization.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type LockTable = HashMap<i64, Arc<AsyncMutex<()>>>;

/// One async mutex per user id.
///
/// Holding the guard returned by [`UserLocks::acquire`] excludes every other
/// lifecycle operation for the same user; different users never contend.
/// A user's entry lives only while someone holds or waits for it.
#[derive(Debug, Default)]
pub struct UserLocks {
    locks: Mutex<LockTable>,
}

/// Exclusive hold on one user's lock. Dropping it releases the lock.
#[derive(Debug)]
pub struct UserLockGuard<'a> {
    guard: Option<OwnedMutexGuard<()>>,
    user_id: i64,
    owner: &'a UserLocks,
}

impl UserLocks {
    /// Create an empty lock table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for and take the lock of a user.
    pub async fn acquire(&self, user_id: i64) -> UserLockGuard<'_> {
        let lock = Arc::clone(self.table().entry(user_id).or_default());
        UserLockGuard {
            guard: Some(lock.lock_owned().await),
            user_id,
            owner: self,
        }
    }

    fn table(&self) -> std::sync::MutexGuard<'_, LockTable> {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Drop the user's entry when nobody else references it.
    fn release(&self, user_id: i64) {
        let mut table = self.table();
        if table
            .get(&user_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            table.remove(&user_id);
        }
    }

    #[cfg(test)]
    fn is_locked(&self, user_id: i64) -> bool {
        self.table()
            .get(&user_id)
            .is_some_and(|lock| lock.try_lock().is_err())
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.table().len()
    }
}

impl Drop for UserLockGuard<'_> {
    fn drop(&mut self) {
        // The mutex guard holds a reference to the entry; release it first.
        self.guard.take();
        self.owner.release(self.user_id);
    }
}

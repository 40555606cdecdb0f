//! Per-user critical section around validate-then-record.
//!
//! Two concurrent requests for the same user would otherwise both validate
//! against a history that contains neither of them.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Clone, Default)]
pub struct UserLocks {
    locks: Arc<DashMap<i64, Arc<Mutex<()>>>>,
}

impl UserLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for the user's lock. Held until the guard is dropped.
    pub async fn acquire(&self, user_id: i64) -> OwnedMutexGuard<()> {
        // Clone the Arc out so the shard lock is released before awaiting
        let lock = self
            .locks
            .entry(user_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        lock.lock_owned().await
    }

    /// Drop entries nobody holds or waits on
    pub fn prune(&self) {
        self.locks.retain(|_, lock| Arc::strong_count(lock) > 1);
    }

    pub fn tracked_users(&self) -> usize {
        self.locks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn same_user_is_serialized() {
        let locks = UserLocks::new();
        let guard = locks.acquire(1).await;

        let contender = locks.clone();
        let waiting = tokio::spawn(async move {
            let _guard = contender.acquire(1).await;
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiting.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), waiting)
            .await
            .expect("second acquire completes")
            .expect("task ok");
    }

    #[tokio::test]
    async fn different_users_do_not_block() {
        let locks = UserLocks::new();
        let _first = locks.acquire(1).await;
        tokio::time::timeout(Duration::from_millis(100), locks.acquire(2))
            .await
            .expect("other user is free");
    }

    #[tokio::test]
    async fn prune_keeps_held_locks() {
        let locks = UserLocks::new();
        let held = locks.acquire(1).await;
        drop(locks.acquire(2).await);
        assert_eq!(locks.tracked_users(), 2);

        locks.prune();
        assert_eq!(locks.tracked_users(), 1);

        drop(held);
        locks.prune();
        assert_eq!(locks.tracked_users(), 0);
    }
}

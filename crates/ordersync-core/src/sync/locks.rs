//! Per-identity mutual exclusion for items processed concurrently

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::OwnedMutexGuard;

/// Async locks keyed by order identity
///
/// Entries are dropped as soon as nobody holds or awaits them, including
/// waiters that are cancelled before acquiring.
#[derive(Default)]
pub struct KeyedLocks {
    slots: Mutex<HashMap<String, Slot>>,
}

struct Slot {
    lock: Arc<tokio::sync::Mutex<()>>,
    users: usize,
}

/// One holder's or waiter's claim on a slot
struct Registration {
    locks: Arc<KeyedLocks>,
    key: String,
}

pub struct KeyGuard {
    // Field order matters: the mutex is released before the slot can be pruned.
    _guard: OwnedMutexGuard<()>,
    _registration: Registration,
}

impl KeyedLocks {
    pub async fn lock(self: &Arc<Self>, key: String) -> KeyGuard {
        let lock = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            let slot = slots.entry(key.clone()).or_insert_with(|| Slot {
                lock: Arc::default(),
                users: 0,
            });
            slot.users += 1;
            Arc::clone(&slot.lock)
        };
        let registration = Registration {
            locks: Arc::clone(self),
            key,
        };
        let guard = lock.lock_owned().await;
        KeyGuard {
            _guard: guard,
            _registration: registration,
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        let mut slots = self
            .locks
            .slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(slot) = slots.get_mut(&self.key) {
            slot.users = slot.users.saturating_sub(1);
            if slot.users == 0 {
                slots.remove(&self.key);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn same_key_is_exclusive() {
        let locks = Arc::new(KeyedLocks::default());
        let first = locks.lock("b1/abc".to_string()).await;

        let contender = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move {
                let _guard = locks.lock("b1/abc".to_string()).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(first);
        contender.await.unwrap();
        assert_eq!(locks.len(), 0);
    }

    #[tokio::test]
    async fn cancelled_waiter_releases_its_slot() {
        let locks = Arc::new(KeyedLocks::default());
        let first = locks.lock("b1/abc".to_string()).await;

        let mut waiter = Box::pin(locks.lock("b1/abc".to_string()));
        let pending = tokio::time::timeout(Duration::from_millis(10), &mut waiter).await;
        assert!(pending.is_err());

        drop(first);
        assert_eq!(locks.len(), 1);
        drop(waiter);
        assert_eq!(locks.len(), 0);
    }

    #[tokio::test]
    async fn different_keys_do_not_block() {
        let locks = Arc::new(KeyedLocks::default());
        let _first = locks.lock("b1/abc".to_string()).await;
        let second = tokio::time::timeout(
            Duration::from_millis(100),
            locks.lock("b1/def".to_string()),
        )
        .await;
        assert!(second.is_ok());
    }
}

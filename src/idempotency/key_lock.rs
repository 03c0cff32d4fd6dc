//! Per-key mutual exclusion with automatic reclamation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Striped lock keyed by idempotency key.
///
/// Holders of different keys never contend with each other, and the registry
/// only retains entries for keys with at least one live waiter — an idle key
/// occupies no memory. The registry mutex is held only for map bookkeeping,
/// never across an await.
#[derive(Debug, Default)]
pub struct KeyLock {
    registry: Mutex<HashMap<String, LockEntry>>,
}

#[derive(Debug)]
struct LockEntry {
    mutex: Arc<AsyncMutex<()>>,
    waiters: usize,
}

impl KeyLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until no other caller holds the lock for `key`.
    ///
    /// Dropping the returned guard releases the key, on every exit path.
    /// Dropping the future while still waiting abandons the wait without
    /// disturbing the current holder.
    pub async fn lock(&self, key: &str) -> KeyLockGuard<'_> {
        let mutex = {
            let mut registry = self.registry.lock().expect("key lock registry poisoned");
            let entry = registry.entry(key.to_owned()).or_insert_with(|| LockEntry {
                mutex: Arc::new(AsyncMutex::new(())),
                waiters: 0,
            });
            entry.waiters += 1;
            Arc::clone(&entry.mutex)
        };

        // Registered before the suspension point, so a cancelled wait still
        // decrements via the registration's Drop.
        let registration = Registration {
            key: key.to_owned(),
            lock: self,
        };
        let permit = mutex.lock_owned().await;

        KeyLockGuard {
            _permit: permit,
            _registration: registration,
        }
    }

    /// Number of keys currently contended.
    pub fn contended(&self) -> usize {
        self.registry
            .lock()
            .expect("key lock registry poisoned")
            .len()
    }

    fn release(&self, key: &str) {
        let mut registry = self.registry.lock().expect("key lock registry poisoned");
        let Some(entry) = registry.get_mut(key) else {
            // Unknown key: nothing to release
            return;
        };
        entry.waiters -= 1;
        if entry.waiters == 0 {
            registry.remove(key);
        }
    }
}

/// Exclusive hold on one key.
///
/// Field order is load-bearing: the per-key mutex permit must drop before the
/// registration does, so the entry can only leave the registry once the mutex
/// is actually free. A removal while the mutex was still held would let a
/// concurrent `lock` create a fresh entry and enter the critical section.
#[derive(Debug)]
pub struct KeyLockGuard<'a> {
    _permit: OwnedMutexGuard<()>,
    _registration: Registration<'a>,
}

#[derive(Debug)]
struct Registration<'a> {
    key: String,
    lock: &'a KeyLock,
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        self.lock.release(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn same_key_is_exclusive() {
        let lock = Arc::new(KeyLock::new());
        let inside = Arc::new(AtomicBool::new(false));
        let overlaps = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let lock = Arc::clone(&lock);
            let inside = Arc::clone(&inside);
            let overlaps = Arc::clone(&overlaps);
            handles.push(tokio::spawn(async move {
                let _guard = lock.lock("k").await;
                if inside.swap(true, Ordering::SeqCst) {
                    overlaps.fetch_add(1, Ordering::SeqCst);
                }
                tokio::time::sleep(Duration::from_millis(2)).await;
                inside.store(false, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(overlaps.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn distinct_keys_do_not_contend() {
        let lock = KeyLock::new();
        let _a = lock.lock("a").await;

        // Must complete immediately even while "a" is held
        tokio::time::timeout(Duration::from_secs(1), lock.lock("b"))
            .await
            .expect("lock on a different key blocked");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn registry_is_reclaimed() {
        let lock = Arc::new(KeyLock::new());

        let mut handles = Vec::new();
        for i in 0..64 {
            let lock = Arc::clone(&lock);
            handles.push(tokio::spawn(async move {
                let key = format!("k{}", i % 4);
                let _guard = lock.lock(&key).await;
                tokio::task::yield_now().await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(lock.contended(), 0);
    }

    #[tokio::test]
    async fn cancelled_wait_is_reclaimed() {
        let lock = Arc::new(KeyLock::new());
        let guard = lock.lock("k").await;
        assert_eq!(lock.contended(), 1);

        let waiter = {
            let lock = Arc::clone(&lock);
            tokio::spawn(async move {
                let _guard = lock.lock("k").await;
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        waiter.abort();
        let _ = waiter.await;

        // The abandoned waiter is gone; only the holder remains registered
        assert_eq!(lock.contended(), 1);
        drop(guard);
        assert_eq!(lock.contended(), 0);
    }
}

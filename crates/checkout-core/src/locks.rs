//! Per-key async locks. Work for one charge id runs one at a time; different
//! charges proceed in parallel. Entries are dropped once nobody holds or
//! awaits them, including when the caller's future is cancelled.

use dashmap::DashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Debug, Default)]
pub struct KeyedLocks {
    inner: DashMap<String, Arc<Mutex<()>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `work` while holding the lock for `key`
    pub async fn run<F, T>(&self, key: &str, work: F) -> T
    where
        F: Future<Output = T>,
    {
        let entry = Entry {
            locks: self,
            key,
            lock: self.inner.entry(key.to_string()).or_default().clone(),
        };
        let _guard = entry.lock.lock().await;
        work.await
    }

    /// Keys currently held or awaited
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

/// Prunes the map slot on drop, whether `run` finished or was cancelled
struct Entry<'a> {
    locks: &'a KeyedLocks,
    key: &'a str,
    lock: Arc<Mutex<()>>,
}

impl Drop for Entry<'_> {
    fn drop(&mut self) {
        // The map and this entry are the only holders
        self.locks
            .inner
            .remove_if(self.key, |_, l| Arc::ptr_eq(l, &self.lock) && Arc::strong_count(l) == 2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_key_is_serialized() {
        let locks = Arc::new(KeyedLocks::new());
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let (locks, active, peak) = (locks.clone(), active.clone(), peak.clone());
            handles.push(tokio::spawn(async move {
                locks
                    .run("pi_1", async {
                        let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(5)).await;
                        active.fetch_sub(1, Ordering::SeqCst);
                    })
                    .await
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        assert_eq!(peak.load(Ordering::SeqCst), 1);
        assert!(locks.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_work_releases_entry() {
        let locks = Arc::new(KeyedLocks::new());

        // Cancelled while holding the lock
        let held = tokio::time::timeout(
            Duration::from_millis(10),
            locks.run("pi_1", std::future::pending::<()>()),
        )
        .await;
        assert!(held.is_err());
        assert!(locks.is_empty());

        // Cancelled while waiting behind another holder
        let (release, released) = tokio::sync::oneshot::channel::<()>();
        let holder = {
            let locks = locks.clone();
            tokio::spawn(async move {
                locks
                    .run("pi_1", async {
                        let _ = released.await;
                    })
                    .await
            })
        };
        tokio::task::yield_now().await;

        let waited =
            tokio::time::timeout(Duration::from_millis(10), locks.run("pi_1", async {})).await;
        assert!(waited.is_err());
        assert_eq!(locks.len(), 1);

        release.send(()).unwrap();
        holder.await.unwrap();
        assert!(locks.is_empty());
    }
}

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// One async mutex per student. Everything that writes a student's records,
/// leave or totals runs under it, so recompute never interleaves with a scan.
///
/// Entries are created on first use; [`StudentLocks::prune`] drops the idle
/// ones so the map tracks active students, not every student ever seen.
#[derive(Debug, Default)]
pub struct StudentLocks {
    inner: DashMap<String, Arc<Mutex<()>>>,
}

impl StudentLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, student_id: &str) -> OwnedMutexGuard<()> {
        // clone the Arc so the map shard is released before awaiting
        let lock = self
            .inner
            .entry(student_id.to_string())
            .or_default()
            .clone();
        lock.lock_owned().await
    }

    /// Removes locks nobody holds or waits on. The map is the only owner of
    /// such an entry, and `acquire` cannot clone it while `retain` holds the
    /// shard.
    pub fn prune(&self) -> usize {
        let before = self.inner.len();
        self.inner.retain(|_, lock| Arc::strong_count(lock) > 1);
        before.saturating_sub(self.inner.len())
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.inner.len()
    }
}

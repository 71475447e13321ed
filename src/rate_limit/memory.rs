//! In-process rate store for single-instance deployments.
//!
//! Records live in a `HashMap` behind one `std::sync::Mutex`. The lock is
//! held across the whole check-and-increment and never across an await, so
//! two requests for the same identifier cannot both take the last slot.
//!
//! Expired records are swept lazily: at most once per window length, the
//! next access drops every record whose window has already ended.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use super::store::{Admission, RateRecord, RateStore, StoreError};

#[derive(Default)]
pub struct MemoryRateStore {
    inner: Mutex<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    records: HashMap<String, RateRecord>,
    last_sweep_ms: u64,
}

impl MemoryRateStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
impl MemoryRateStore {
    /// Number of records currently held.
    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl MemoryInner {
    fn sweep_if_due(&mut self, now_ms: u64, window: Duration) {
        let window_ms = super::store::window_ms(window);
        if now_ms.saturating_sub(self.last_sweep_ms) < window_ms {
            return;
        }
        let before = self.records.len();
        self.records.retain(|_, record| !record.is_expired(now_ms, window));
        self.last_sweep_ms = now_ms;
        let evicted = before - self.records.len();
        if evicted > 0 {
            tracing::debug!(evicted, remaining = self.records.len(), "rate store: swept expired records");
        }
    }
}

#[async_trait::async_trait]
impl RateStore for MemoryRateStore {
    async fn get(&self, identifier: &str) -> Result<Option<RateRecord>, StoreError> {
        Ok(self.lock().records.get(identifier).cloned())
    }

    async fn set(&self, record: RateRecord) -> Result<(), StoreError> {
        self.lock()
            .records
            .insert(record.identifier.clone(), record);
        Ok(())
    }

    async fn check_and_increment(
        &self,
        identifier: &str,
        limit: u32,
        window: Duration,
        now_ms: u64,
    ) -> Result<Admission, StoreError> {
        let mut inner = self.lock();
        inner.sweep_if_due(now_ms, window);

        let record = inner
            .records
            .entry(identifier.to_owned())
            .or_insert_with(|| RateRecord { identifier: identifier.to_owned(), count: 0, window_start_ms: now_ms });

        if record.count == 0 || record.is_expired(now_ms, window) {
            record.count = 1;
            record.window_start_ms = now_ms;
            return Ok(Admission { allowed: true, count: 1, window_start_ms: now_ms });
        }

        if record.count >= limit {
            return Ok(Admission { allowed: false, count: record.count, window_start_ms: record.window_start_ms });
        }

        record.count += 1;
        Ok(Admission { allowed: true, count: record.count, window_start_ms: record.window_start_ms })
    }
}

#[cfg(test)]
#[path = "memory_test.rs"]
mod tests;

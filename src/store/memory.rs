//! In-process store.
//!
//! Inserts are upserts keyed by transaction id, like a Cassandra table with
//! `transaction_id` in its primary key. Latency, per-record rejection rules
//! and an offline switch can be injected, and the store tracks how many
//! inserts were running at once.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use super::{insert_statement, Store, StoreError};
use crate::record::SaleRecord;

type RejectionRule = Arc<dyn Fn(&SaleRecord) -> Option<StoreError> + Send + Sync>;

/// Compiled insert for the memory backend.
#[derive(Debug, Clone)]
pub struct MemoryPrepared {
    pub statement: String,
}

#[derive(Default)]
pub struct MemoryStore {
    rows: Mutex<BTreeMap<String, SaleRecord>>,
    latency: Duration,
    rejection: Option<RejectionRule>,
    offline: AtomicBool,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    attempts: AtomicUsize,
    prepares: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep for `latency` inside every insert.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Fail inserts for which `rule` returns an error.
    pub fn with_rejection<F>(mut self, rule: F) -> Self
    where
        F: Fn(&SaleRecord) -> Option<StoreError> + Send + Sync + 'static,
    {
        self.rejection = Some(Arc::new(rule));
        self
    }

    /// While offline every insert fails with [`StoreError::Unreachable`].
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.rows.lock().map(|rows| rows.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, transaction_id: &str) -> bool {
        self.rows
            .lock()
            .map(|rows| rows.contains_key(transaction_id))
            .unwrap_or(false)
    }

    /// Highest number of inserts observed running concurrently.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Number of insert calls, successful or not.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Number of times the insert template was compiled.
    pub fn prepares(&self) -> usize {
        self.prepares.load(Ordering::SeqCst)
    }

    fn lock_rows(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, SaleRecord>>, StoreError> {
        self.rows
            .lock()
            .map_err(|_| StoreError::Unreachable("memory store poisoned".to_string()))
    }
}

/// Decrements the in-flight gauge when an insert returns.
struct InFlightGuard<'a>(&'a AtomicUsize);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Store for MemoryStore {
    type Prepared = MemoryPrepared;

    fn name(&self) -> &'static str {
        "memory"
    }

    fn prepare_insert(&self) -> Result<Self::Prepared, StoreError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Unreachable("memory store offline".to_string()));
        }
        self.prepares.fetch_add(1, Ordering::SeqCst);
        Ok(MemoryPrepared {
            statement: insert_statement(),
        })
    }

    fn insert(&self, _prepared: &Self::Prepared, record: &SaleRecord) -> Result<(), StoreError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = InFlightGuard(&self.in_flight);
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        if !self.latency.is_zero() {
            thread::sleep(self.latency);
        }
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Unreachable("memory store offline".to_string()));
        }
        if let Some(err) = self.rejection.as_ref().and_then(|rule| rule(record)) {
            return Err(err);
        }
        self.lock_rows()?
            .insert(record.transaction_id.clone(), record.clone());
        Ok(())
    }

    fn sample(&self, limit: usize) -> Result<Vec<SaleRecord>, StoreError> {
        Ok(self.lock_rows()?.values().take(limit).cloned().collect())
    }

    fn scan(
        &self,
        page_size: usize,
        visit: &mut dyn FnMut(SaleRecord),
    ) -> Result<u64, StoreError> {
        let page_size = page_size.max(1);
        let mut last: Option<String> = None;
        let mut visited = 0u64;
        loop {
            // Copy one page out so the lock is not held while visiting.
            let page: Vec<SaleRecord> = {
                let rows = self.lock_rows()?;
                match &last {
                    Some(key) => rows
                        .range::<String, _>((
                            std::ops::Bound::Excluded(key),
                            std::ops::Bound::Unbounded,
                        ))
                        .take(page_size)
                        .map(|(_, r)| r.clone())
                        .collect(),
                    None => rows.values().take(page_size).cloned().collect(),
                }
            };
            let Some(tail) = page.last() else {
                return Ok(visited);
            };
            last = Some(tail.transaction_id.clone());
            let full = page.len() == page_size;
            for record in page {
                visited += 1;
                visit(record);
            }
            if !full {
                return Ok(visited);
            }
        }
    }
}

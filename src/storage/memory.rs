//! In-memory lease store.
//!
//! One mutex guards the whole pool. Nothing survives a restart.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};

use super::db::DatabaseError;
use super::models::{stored_precision, Identifier, Lease, PoolCounts};
use super::store::{ClaimOutcome, LeaseStore, ReleaseOutcome, RenewOutcome};

#[derive(Default)]
struct PoolState {
    /// Holder -> index into `records`
    by_holder: HashMap<String, usize>,
    /// Identifier value -> index into `records`
    by_value: HashMap<String, usize>,
    /// Free slots, lowest insertion index first
    free: BTreeSet<usize>,
    /// All identifiers in insertion order
    records: Vec<Identifier>,
}

impl PoolState {
    fn clear_lease(&mut self, index: usize) -> Option<Lease> {
        let record = &mut self.records[index];
        let lease = record.lease()?;
        record.holder = None;
        record.last_renewed_at = None;
        self.by_holder.remove(&lease.holder);
        self.free.insert(index);
        Some(lease)
    }
}

#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<PoolState>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, PoolState> {
        // Every mutation completes before the guard drops, so a poisoned
        // lock still holds a consistent pool.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl LeaseStore for InMemoryStore {
    fn seed(&self, values: &[String]) -> Result<usize, DatabaseError> {
        let mut state = self.lock();
        let mut inserted = 0;
        for value in values {
            if state.by_value.contains_key(value) {
                continue;
            }
            let index = state.records.len();
            state.records.push(Identifier::free(value.as_str()));
            state.by_value.insert(value.clone(), index);
            state.free.insert(index);
            inserted += 1;
        }
        Ok(inserted)
    }

    fn find_by_holder(&self, holder: &str) -> Result<Option<Identifier>, DatabaseError> {
        let state = self.lock();
        Ok(state
            .by_holder
            .get(holder)
            .map(|&index| state.records[index].clone()))
    }

    fn find_by_value(&self, value: &str) -> Result<Option<Identifier>, DatabaseError> {
        let state = self.lock();
        Ok(state
            .by_value
            .get(value)
            .map(|&index| state.records[index].clone()))
    }

    fn try_claim_any_free(
        &self,
        holder: &str,
        now: DateTime<Utc>,
    ) -> Result<ClaimOutcome, DatabaseError> {
        let mut state = self.lock();

        if let Some(&index) = state.by_holder.get(holder) {
            return Ok(ClaimOutcome::Existing(state.records[index].clone()));
        }

        let Some(index) = state.free.pop_first() else {
            return Ok(ClaimOutcome::Exhausted);
        };

        let record = &mut state.records[index];
        record.holder = Some(holder.to_string());
        record.last_renewed_at = Some(stored_precision(now));
        let claimed = record.clone();
        state.by_holder.insert(holder.to_string(), index);

        Ok(ClaimOutcome::Claimed(claimed))
    }

    fn renew(
        &self,
        value: &str,
        holder: &str,
        now: DateTime<Utc>,
    ) -> Result<RenewOutcome, DatabaseError> {
        let mut state = self.lock();

        let Some(&index) = state.by_value.get(value) else {
            return Ok(RenewOutcome::NotFound);
        };

        let record = &mut state.records[index];
        if record.holder.as_deref() != Some(holder) {
            return Ok(RenewOutcome::OwnerMismatch(record.holder.clone()));
        }

        record.last_renewed_at = Some(stored_precision(now));
        Ok(RenewOutcome::Renewed(record.clone()))
    }

    fn release(&self, value: &str, holder: &str) -> Result<ReleaseOutcome, DatabaseError> {
        let mut state = self.lock();

        let Some(&index) = state.by_value.get(value) else {
            return Ok(ReleaseOutcome::NoOp);
        };

        if state.records[index].holder.as_deref() != Some(holder) {
            return Ok(ReleaseOutcome::NoOp);
        }

        state.clear_lease(index);
        Ok(ReleaseOutcome::Released)
    }

    fn reclaim_expired(&self, threshold: DateTime<Utc>) -> Result<Vec<Lease>, DatabaseError> {
        let mut state = self.lock();

        let expired: Vec<usize> = state
            .records
            .iter()
            .enumerate()
            .filter(|(_, record)| record.lease().is_some_and(|l| l.is_stale(threshold)))
            .map(|(index, _)| index)
            .collect();

        Ok(expired
            .into_iter()
            .filter_map(|index| state.clear_lease(index))
            .collect())
    }

    fn list_all(&self) -> Result<Vec<Identifier>, DatabaseError> {
        Ok(self.lock().records.clone())
    }

    fn counts(&self, threshold: DateTime<Utc>) -> Result<PoolCounts, DatabaseError> {
        let state = self.lock();
        let total = state.records.len() as u64;
        let free = state.free.len() as u64;
        let stale = state
            .records
            .iter()
            .filter_map(Identifier::lease)
            .filter(|lease| lease.is_stale(threshold))
            .count() as u64;

        Ok(PoolCounts {
            free,
            leased: total - free,
            stale,
            total,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{at, pool};

    #[test]
    fn test_claim_release_cycle() {
        let store = InMemoryStore::new();
        store.seed(&pool(&["id-1", "id-2"])).unwrap();

        assert!(matches!(
            store.try_claim_any_free("vm-a", at(0)).unwrap(),
            ClaimOutcome::Claimed(ref id) if id.value == "id-1"
        ));
        assert_eq!(store.release("id-1", "vm-a").unwrap(), ReleaseOutcome::Released);

        // released slots rejoin the free list in pool order
        assert!(matches!(
            store.try_claim_any_free("vm-b", at(1)).unwrap(),
            ClaimOutcome::Claimed(ref id) if id.value == "id-1"
        ));
        assert!(matches!(
            store.try_claim_any_free("vm-c", at(1)).unwrap(),
            ClaimOutcome::Claimed(ref id) if id.value == "id-2"
        ));
    }

    #[test]
    fn test_reclaim_matches_threshold_rule() {
        let store = InMemoryStore::new();
        store.seed(&pool(&["id-1", "id-2"])).unwrap();
        store.try_claim_any_free("vm-a", at(0)).unwrap();
        store.try_claim_any_free("vm-b", at(10)).unwrap();

        assert_eq!(store.counts(at(10)).unwrap().stale, 1);

        let reclaimed = store.reclaim_expired(at(10)).unwrap();
        assert_eq!(reclaimed.len(), 1);
        assert_eq!(reclaimed[0].holder, "vm-a");
        assert!(store.find_by_holder("vm-a").unwrap().is_none());
        assert!(store.find_by_holder("vm-b").unwrap().is_some());
    }
}

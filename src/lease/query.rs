//! Read-only views over the pool.

use chrono::{DateTime, Utc};

use super::error::LeaseError;
use super::manager::{stale_threshold, LeaseManager};
use crate::storage::models::{Identifier, Lease, PoolCounts};

impl LeaseManager {
    /// Every identifier, leased or not, in pool order.
    pub fn list_identifiers(&self) -> Result<Vec<Identifier>, LeaseError> {
        Ok(self.store().list_all()?)
    }

    /// Only the identifiers currently held.
    pub fn list_allocated(&self) -> Result<Vec<Lease>, LeaseError> {
        Ok(self
            .store()
            .list_all()?
            .iter()
            .filter_map(Identifier::lease)
            .collect())
    }

    /// The lease held by `client_id`.
    pub fn client_details(&self, client_id: &str) -> Result<Lease, LeaseError> {
        self.store()
            .find_by_holder(client_id)?
            .as_ref()
            .and_then(Identifier::lease)
            .ok_or_else(|| LeaseError::ClientNotFound(client_id.to_string()))
    }

    pub fn identifier_details(&self, identifier: &str) -> Result<Identifier, LeaseError> {
        self.store()
            .find_by_value(identifier)?
            .ok_or_else(|| LeaseError::IdentifierNotFound(identifier.to_string()))
    }

    /// Pool counts, with staleness evaluated against `now`.
    pub fn stats(&self, now: DateTime<Utc>) -> Result<PoolCounts, LeaseError> {
        let threshold = stale_threshold(now, self.stale_timeout());
        Ok(self.store().counts(threshold)?)
    }

    /// Whether `lease` would be reclaimed by a sweep at `now`.
    pub fn is_stale(&self, lease: &Lease, now: DateTime<Utc>) -> bool {
        lease.is_stale(stale_threshold(now, self.stale_timeout()))
    }
}

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, info, warn};

use super::error::LeaseError;
use crate::storage::models::Lease;
use crate::storage::{ClaimOutcome, LeaseStore, ReleaseOutcome, RenewOutcome};

/// Client-facing lease state machine.
///
/// Holds no locks of its own: every transition is a single store operation,
/// so the manager is cheap to clone and share between request handlers and
/// the sweeper.
#[derive(Clone)]
pub struct LeaseManager {
    stale_timeout: Duration,
    store: Arc<dyn LeaseStore>,
}

/// Leases last renewed strictly before the returned instant are stale.
pub fn stale_threshold(now: DateTime<Utc>, stale_timeout: Duration) -> DateTime<Utc> {
    let window = TimeDelta::from_std(stale_timeout).unwrap_or(TimeDelta::MAX);
    now.checked_sub_signed(window).unwrap_or(DateTime::<Utc>::MIN_UTC)
}

impl LeaseManager {
    pub fn new(store: Arc<dyn LeaseStore>, stale_timeout: Duration) -> Self {
        Self {
            stale_timeout,
            store,
        }
    }

    pub fn stale_timeout(&self) -> Duration {
        self.stale_timeout
    }

    pub(super) fn store(&self) -> &dyn LeaseStore {
        self.store.as_ref()
    }

    /// Add identifiers to the pool. Existing identifiers keep their leases.
    pub fn seed(&self, identifiers: &[String]) -> Result<usize, LeaseError> {
        let inserted = self.store.seed(identifiers)?;
        info!(
            inserted,
            pool_size = identifiers.len(),
            "Seeded identifier pool"
        );
        Ok(inserted)
    }

    /// Hand out an identifier to `client_id`.
    ///
    /// A client that already holds an identifier gets the same one back, so
    /// retried requests never leak a second slot.
    pub fn allocate(&self, client_id: &str, now: DateTime<Utc>) -> Result<String, LeaseError> {
        if let Some(existing) = self.store.find_by_holder(client_id)? {
            debug!(client_id = %client_id, identifier = %existing.value, "Client already holds an identifier");
            return Ok(existing.value);
        }

        match self.store.try_claim_any_free(client_id, now)? {
            ClaimOutcome::Claimed(identifier) => {
                info!(client_id = %client_id, identifier = %identifier.value, "Allocated identifier");
                Ok(identifier.value)
            }
            ClaimOutcome::Existing(identifier) => {
                debug!(client_id = %client_id, identifier = %identifier.value, "Client already holds an identifier");
                Ok(identifier.value)
            }
            ClaimOutcome::Exhausted => {
                warn!(client_id = %client_id, "Allocation failed: no available identifiers");
                Err(LeaseError::PoolExhausted)
            }
        }
    }

    /// Prove liveness for a held identifier, extending its staleness deadline.
    pub fn renew(
        &self,
        client_id: &str,
        identifier: &str,
        now: DateTime<Utc>,
    ) -> Result<Lease, LeaseError> {
        match self.store.renew(identifier, client_id, now)? {
            RenewOutcome::Renewed(record) => {
                debug!(client_id = %client_id, identifier = %identifier, "Lease renewed");
                record.lease().ok_or_else(|| {
                    LeaseError::StoreUnavailable(crate::storage::DatabaseError::Inconsistent(
                        format!("renewed identifier {identifier} has no holder"),
                    ))
                })
            }
            RenewOutcome::NotFound => {
                warn!(client_id = %client_id, identifier = %identifier, "Renewal for unknown identifier");
                Err(LeaseError::IdentifierNotFound(identifier.to_string()))
            }
            RenewOutcome::OwnerMismatch(actual_holder) => {
                warn!(
                    client_id = %client_id,
                    identifier = %identifier,
                    current_holder = actual_holder.as_deref().unwrap_or(""),
                    "Renewal mismatch: identifier is not held by this client"
                );
                Err(LeaseError::OwnershipConflict {
                    identifier: identifier.to_string(),
                    actual_holder,
                })
            }
        }
    }

    /// Give an identifier back early.
    ///
    /// Succeeds whether or not the caller still held it.
    pub fn release(&self, client_id: &str, identifier: &str) -> Result<(), LeaseError> {
        match self.store.release(identifier, client_id)? {
            ReleaseOutcome::Released => {
                info!(client_id = %client_id, identifier = %identifier, "Client released identifier");
            }
            ReleaseOutcome::NoOp => {
                debug!(client_id = %client_id, identifier = %identifier, "Release ignored: not held by client");
            }
        }
        Ok(())
    }

    /// Free every lease not renewed within `stale_timeout` of `now`.
    pub fn reclaim_stale(
        &self,
        now: DateTime<Utc>,
        stale_timeout: Duration,
    ) -> Result<usize, LeaseError> {
        let threshold = stale_threshold(now, stale_timeout);
        let reclaimed = self.store.reclaim_expired(threshold)?;

        for lease in &reclaimed {
            info!(
                client_id = %lease.holder,
                identifier = %lease.identifier,
                last_renewed_at = %lease.last_renewed_at.to_rfc3339(),
                "Expired stale lease"
            );
        }

        Ok(reclaimed.len())
    }
}

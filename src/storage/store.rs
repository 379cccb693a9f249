//! The lease store contract.
//!
//! Every method is a single atomic step against the backing store. Two
//! callers racing on the same identifier or holder always observe one of
//! the two serial orders, never an intermediate state.

use chrono::{DateTime, Utc};

use super::db::DatabaseError;
use super::models::{Identifier, Lease, PoolCounts};

/// Result of [`LeaseStore::try_claim_any_free`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// A free identifier was leased to the caller
    Claimed(Identifier),
    /// The caller already held this identifier; nothing changed
    Existing(Identifier),
    /// No free identifier was left
    Exhausted,
}

/// Result of [`LeaseStore::renew`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenewOutcome {
    Renewed(Identifier),
    NotFound,
    /// Held by someone else, or free (`None`)
    OwnerMismatch(Option<String>),
}

/// Result of [`LeaseStore::release`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    Released,
    NoOp,
}

/// Renewal timestamps are stored truncated to whole microseconds; thresholds
/// are compared exactly against the stored value.
pub trait LeaseStore: Send + Sync {
    /// Insert each value as a free identifier unless it already exists.
    /// Returns the number of identifiers actually inserted.
    fn seed(&self, values: &[String]) -> Result<usize, DatabaseError>;

    fn find_by_holder(&self, holder: &str) -> Result<Option<Identifier>, DatabaseError>;

    fn find_by_value(&self, value: &str) -> Result<Option<Identifier>, DatabaseError>;

    /// Lease the oldest free identifier to `holder`, unless `holder` already
    /// has one, in which case that identifier is returned untouched.
    fn try_claim_any_free(
        &self,
        holder: &str,
        now: DateTime<Utc>,
    ) -> Result<ClaimOutcome, DatabaseError>;

    /// Refresh `last_renewed_at` if `value` is currently held by `holder`.
    fn renew(
        &self,
        value: &str,
        holder: &str,
        now: DateTime<Utc>,
    ) -> Result<RenewOutcome, DatabaseError>;

    /// Free `value` only if it is currently held by `holder`.
    fn release(&self, value: &str, holder: &str) -> Result<ReleaseOutcome, DatabaseError>;

    /// Free every lease last renewed strictly before `threshold`.
    fn reclaim_expired(&self, threshold: DateTime<Utc>) -> Result<Vec<Lease>, DatabaseError>;

    /// All identifiers in insertion order.
    fn list_all(&self) -> Result<Vec<Identifier>, DatabaseError>;

    /// Pool counts, with `stale` measured against `threshold`.
    fn counts(&self, threshold: DateTime<Utc>) -> Result<PoolCounts, DatabaseError>;
}

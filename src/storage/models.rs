use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

/// Renewal timestamps are stored at microsecond precision.
pub fn stored_precision(at: DateTime<Utc>) -> DateTime<Utc> {
    at.trunc_subsecs(6)
}

/// One slot in the identifier pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identifier {
    /// Client currently holding the identifier, if leased
    pub holder: Option<String>,
    /// Last successful allocation or renewal, present iff `holder` is
    pub last_renewed_at: Option<DateTime<Utc>>,
    /// Opaque identifier string, fixed at seed time
    pub value: String,
}

impl Identifier {
    pub fn free(value: impl Into<String>) -> Self {
        Self {
            holder: None,
            last_renewed_at: None,
            value: value.into(),
        }
    }

    pub fn is_allocated(&self) -> bool {
        self.holder.is_some()
    }

    /// The lease view of this identifier, if it is held.
    pub fn lease(&self) -> Option<Lease> {
        match (&self.holder, self.last_renewed_at) {
            (Some(holder), Some(last_renewed_at)) => Some(Lease {
                holder: holder.clone(),
                identifier: self.value.clone(),
                last_renewed_at,
            }),
            _ => None,
        }
    }
}

/// A held identifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lease {
    pub holder: String,
    pub identifier: String,
    pub last_renewed_at: DateTime<Utc>,
}

impl Lease {
    /// A lease renewed exactly at `threshold` is still live.
    pub fn is_stale(&self, threshold: DateTime<Utc>) -> bool {
        self.last_renewed_at < threshold
    }
}

/// Aggregate pool counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolCounts {
    pub free: u64,
    pub leased: u64,
    pub stale: u64,
    pub total: u64,
}

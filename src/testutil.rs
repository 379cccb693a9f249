//! Shared test helpers, available to all `#[cfg(test)]` modules in the crate.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use tempfile::TempDir;

use crate::config::{Config, LeaseConfig, PoolConfig, ServerConfig, StorageConfig};
use crate::lease::LeaseManager;
use crate::storage::models::{Identifier, Lease, PoolCounts};
use crate::storage::{
    ClaimOutcome, Database, DatabaseError, InMemoryStore, LeaseStore, ReleaseOutcome,
    RenewOutcome,
};
use crate::AppState;

/// Stale timeout used by every test manager.
pub const TEST_STALE_TIMEOUT: Duration = Duration::from_secs(10);

/// Open a fresh database in a temporary directory.
///
/// Returns both the `Database` and the `TempDir` guard. The caller must
/// keep the `TempDir` alive for the duration of the test.
pub fn setup_db() -> (Database, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let db = Database::open(temp_dir.path()).unwrap();
    (db, temp_dir)
}

/// A fixed instant `secs` seconds after an arbitrary epoch.
pub fn at(secs: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + TimeDelta::seconds(secs)
}

pub fn pool(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

/// A redb-backed manager seeded with `identifiers`.
pub fn test_manager(identifiers: &[&str]) -> (LeaseManager, TempDir) {
    let (db, temp_dir) = setup_db();
    let leases = LeaseManager::new(Arc::new(db), TEST_STALE_TIMEOUT);
    leases.seed(&pool(identifiers)).unwrap();
    (leases, temp_dir)
}

/// Run `test` once against each store implementation, freshly seeded.
pub fn with_each_store(identifiers: &[&str], test: impl Fn(&LeaseManager)) {
    let (db, _temp) = setup_db();
    let stores: Vec<Arc<dyn LeaseStore>> = vec![Arc::new(db), Arc::new(InMemoryStore::new())];

    for store in stores {
        let leases = LeaseManager::new(store, TEST_STALE_TIMEOUT);
        leases.seed(&pool(identifiers)).unwrap();
        test(&leases);
    }
}

/// A minimal `Config` suitable for unit tests.
pub fn test_config() -> Config {
    Config {
        leases: LeaseConfig {
            stale_timeout_seconds: TEST_STALE_TIMEOUT.as_secs(),
            sweep_interval_seconds: 1,
        },
        pool: PoolConfig {
            patterns: vec!["id-[1-2]".to_string()],
        },
        server: ServerConfig::default(),
        storage: StorageConfig::default(),
    }
}

/// Build a full `Arc<AppState>` around the given manager.
pub fn test_state(leases: LeaseManager) -> Arc<AppState> {
    Arc::new(AppState {
        config: test_config(),
        leases,
    })
}

/// A store whose every operation fails, as if the disk had gone away.
pub struct FailingStore;

fn unavailable<T>() -> Result<T, DatabaseError> {
    Err(DatabaseError::Inconsistent("store offline".to_string()))
}

impl LeaseStore for FailingStore {
    fn seed(&self, _values: &[String]) -> Result<usize, DatabaseError> {
        unavailable()
    }

    fn find_by_holder(&self, _holder: &str) -> Result<Option<Identifier>, DatabaseError> {
        unavailable()
    }

    fn find_by_value(&self, _value: &str) -> Result<Option<Identifier>, DatabaseError> {
        unavailable()
    }

    fn try_claim_any_free(
        &self,
        _holder: &str,
        _now: DateTime<Utc>,
    ) -> Result<ClaimOutcome, DatabaseError> {
        unavailable()
    }

    fn renew(
        &self,
        _value: &str,
        _holder: &str,
        _now: DateTime<Utc>,
    ) -> Result<RenewOutcome, DatabaseError> {
        unavailable()
    }

    fn release(&self, _value: &str, _holder: &str) -> Result<ReleaseOutcome, DatabaseError> {
        unavailable()
    }

    fn reclaim_expired(&self, _threshold: DateTime<Utc>) -> Result<Vec<Lease>, DatabaseError> {
        unavailable()
    }

    fn list_all(&self) -> Result<Vec<Identifier>, DatabaseError> {
        unavailable()
    }

    fn counts(&self, _threshold: DateTime<Utc>) -> Result<PoolCounts, DatabaseError> {
        unavailable()
    }
}

/// App state over a [`FailingStore`].
pub fn failing_state() -> Arc<AppState> {
    test_state(LeaseManager::new(Arc::new(FailingStore), TEST_STALE_TIMEOUT))
}

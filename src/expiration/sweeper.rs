use std::sync::Arc;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use crate::AppState;

/// Start the background reclamation sweeper.
///
/// The first sweep runs immediately, which also reclaims leases that went
/// stale while the process was down. A sweep that outlasts the interval
/// delays the next tick rather than overlapping with it.
pub fn start_sweeper(state: Arc<AppState>) -> JoinHandle<()> {
    let interval = state.config.leases.sweep_interval();

    tokio::spawn(async move {
        let mut interval_timer = tokio::time::interval(interval);
        interval_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            interval_timer.tick().await;
            run_sweep(&state).await;
        }
    })
}

/// Run one sweep. Returns the number of leases reclaimed, or `None` if the
/// sweep failed (the failure is logged and the next tick retries).
pub async fn run_sweep(state: &Arc<AppState>) -> Option<usize> {
    debug!("Running stale lease sweep");

    let leases = state.leases.clone();
    let result = tokio::task::spawn_blocking(move || {
        let stale_timeout = leases.stale_timeout();
        leases.reclaim_stale(Utc::now(), stale_timeout)
    })
    .await;

    match result {
        Ok(Ok(count)) => {
            if count > 0 {
                info!(
                    count,
                    stale_timeout_seconds = state.config.leases.stale_timeout_seconds,
                    "Expired stale client(s) due to timeout"
                );
            }
            Some(count)
        }
        Ok(Err(e)) => {
            error!(error = %e, "Failed to reclaim stale leases");
            None
        }
        Err(e) => {
            error!(error = %e, "Stale lease sweep panicked");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{at, failing_state, test_manager, test_state};
    use std::time::Duration;

    #[tokio::test]
    async fn test_run_sweep_reclaims_stale_leases() {
        let (leases, _temp) = test_manager(&["id-1", "id-2"]);
        leases.allocate("vm-old", at(0)).unwrap();
        leases.allocate("vm-live", Utc::now()).unwrap();
        let state = test_state(leases);

        assert_eq!(run_sweep(&state).await, Some(1));
        assert!(state.leases.client_details("vm-old").is_err());
        assert!(state.leases.client_details("vm-live").is_ok());

        assert_eq!(run_sweep(&state).await, Some(0));
    }

    #[tokio::test]
    async fn test_sweeper_runs_first_tick_immediately() {
        let (leases, _temp) = test_manager(&["id-1"]);
        leases.allocate("vm-old", at(0)).unwrap();
        let state = test_state(leases);

        let handle = start_sweeper(Arc::clone(&state));

        let reclaimed = tokio::time::timeout(Duration::from_secs(5), async {
            while state.leases.client_details("vm-old").is_ok() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;
        handle.abort();

        assert!(reclaimed.is_ok(), "sweeper never reclaimed the stale lease");
    }

    #[tokio::test]
    async fn test_failed_sweep_is_logged_and_retried() {
        let state = failing_state();

        assert_eq!(run_sweep(&state).await, None);
        assert_eq!(run_sweep(&state).await, None);
    }

    #[tokio::test]
    async fn test_sweeper_survives_store_failures() {
        let state = failing_state();
        let handle = start_sweeper(Arc::clone(&state));

        // The first tick fires immediately and fails
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!handle.is_finished());

        handle.abort();
    }
}

mod admin;
mod leases;
mod queries;

pub use admin::health;
pub use leases::{allocate, liveness, release};
pub use queries::{client_details, identifier_details, list_allocated, list_identifiers, stats};

use std::sync::Arc;

use crate::api::response::ApiError;
use crate::lease::{LeaseError, LeaseManager};
use crate::AppState;

/// Map a LeaseError to an ApiError
fn lease_error(e: LeaseError) -> ApiError {
    match e {
        LeaseError::ClientNotFound(_) => ApiError::not_found("Client not found"),
        LeaseError::IdentifierNotFound(_) => ApiError::not_found("Identifier not found"),
        LeaseError::OwnershipConflict { .. } => {
            ApiError::Fail(axum::http::StatusCode::CONFLICT, e.to_string())
        }
        LeaseError::PoolExhausted => ApiError::unavailable("No available identifiers"),
        LeaseError::StoreUnavailable(ref source) => {
            tracing::error!(error = %source, "Lease store failure");
            ApiError::internal(e.to_string())
        }
    }
}

/// Run a store-backed operation on the blocking pool.
///
/// redb commits fsync, so they must not run on a runtime worker.
async fn with_leases<T, F>(state: &Arc<AppState>, op: F) -> Result<T, ApiError>
where
    F: FnOnce(&LeaseManager) -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    let leases = state.leases.clone();
    tokio::task::spawn_blocking(move || op(&leases))
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Lease operation panicked");
            ApiError::internal("Lease operation failed")
        })?
}

fn require(field: &str, value: &str) -> Result<(), ApiError> {
    if value.trim().is_empty() {
        return Err(ApiError::bad_request(format!("{field} is required")));
    }
    Ok(())
}

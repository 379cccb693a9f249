use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{lease_error, require, with_leases};
use crate::api::response::{ApiError, AppJson, JSend};
use crate::lease::LeaseError;
use crate::AppState;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Deserialize, Serialize)]
pub struct AllocateRequest {
    #[serde(default)]
    pub client_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AllocateResponse {
    pub identifier: String,
}

/// Body shared by liveness and release.
#[derive(Debug, Deserialize, Serialize)]
pub struct LeaseRequest {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub identifier: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LivenessResponse {
    pub identifier: String,
    pub last_renewed_at: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReleaseResponse {
    pub message: String,
}

// ============================================================================
// Handlers
// ============================================================================

pub async fn allocate(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<AllocateRequest>,
) -> Result<Json<JSend<AllocateResponse>>, ApiError> {
    require("client_id", &req.client_id)?;

    let client_id = req.client_id;
    let identifier = with_leases(&state, move |leases| {
        leases.allocate(&client_id, Utc::now()).map_err(lease_error)
    })
    .await?;

    Ok(JSend::success(AllocateResponse { identifier }))
}

pub async fn liveness(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<LeaseRequest>,
) -> Result<Json<JSend<LivenessResponse>>, ApiError> {
    validate_lease_request(&req)?;

    let LeaseRequest {
        client_id,
        identifier,
    } = req;
    let lease = with_leases(&state, move |leases| {
        leases
            .renew(&client_id, &identifier, Utc::now())
            .map_err(|e| match e {
                LeaseError::OwnershipConflict { actual_holder, .. } => {
                    ApiError::conflict(client_id.as_str(), actual_holder)
                }
                other => lease_error(other),
            })
    })
    .await?;

    Ok(JSend::success(LivenessResponse {
        identifier: lease.identifier,
        last_renewed_at: lease.last_renewed_at.to_rfc3339(),
    }))
}

pub async fn release(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<LeaseRequest>,
) -> Result<Json<JSend<ReleaseResponse>>, ApiError> {
    validate_lease_request(&req)?;

    with_leases(&state, move |leases| {
        leases
            .release(&req.client_id, &req.identifier)
            .map_err(lease_error)
    })
    .await?;

    Ok(JSend::success(ReleaseResponse {
        message: "Identifier released".to_string(),
    }))
}

// ============================================================================
// Validation
// ============================================================================

fn validate_lease_request(req: &LeaseRequest) -> Result<(), ApiError> {
    require("client_id", &req.client_id)?;
    require("identifier", &req.identifier)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::response::ConflictData;
    use crate::testutil::{failing_state, test_manager, test_state};
    use axum::http::StatusCode;
    use std::time::Duration;

    fn allocate_req(client_id: &str) -> AppJson<AllocateRequest> {
        AppJson(AllocateRequest {
            client_id: client_id.to_string(),
        })
    }

    fn lease_req(client_id: &str, identifier: &str) -> AppJson<LeaseRequest> {
        AppJson(LeaseRequest {
            client_id: client_id.to_string(),
            identifier: identifier.to_string(),
        })
    }

    // ========================================================================
    // allocate
    // ========================================================================

    #[tokio::test]
    async fn test_allocate_returns_identifier() {
        let (leases, _temp) = test_manager(&["id-1", "id-2"]);
        let state = test_state(leases);

        let Json(body) = allocate(State(state.clone()), allocate_req("vm-a"))
            .await
            .unwrap();
        assert_eq!(body.data.identifier, "id-1");

        let Json(again) = allocate(State(state), allocate_req("vm-a")).await.unwrap();
        assert_eq!(again.data.identifier, "id-1");
    }

    #[tokio::test]
    async fn test_allocate_exhausted_is_unavailable() {
        let (leases, _temp) = test_manager(&["id-1"]);
        let state = test_state(leases);

        allocate(State(state.clone()), allocate_req("vm-a")).await.unwrap();
        let err = allocate(State(state), allocate_req("vm-b")).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_allocate_requires_client_id() {
        let (leases, _temp) = test_manager(&["id-1"]);
        let err = allocate(State(test_state(leases)), allocate_req("  "))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_allocate_store_failure_is_internal_error() {
        let err = allocate(State(failing_state()), allocate_req("vm-a"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ApiError::Error(StatusCode::INTERNAL_SERVER_ERROR, _)
        ));
    }

    // ========================================================================
    // liveness
    // ========================================================================

    #[tokio::test]
    async fn test_liveness_renews_held_identifier() {
        let (leases, _temp) = test_manager(&["id-1"]);
        let state = test_state(leases);
        allocate(State(state.clone()), allocate_req("vm-a")).await.unwrap();

        let Json(body) = liveness(State(state), lease_req("vm-a", "id-1"))
            .await
            .unwrap();
        assert_eq!(body.data.identifier, "id-1");
        assert!(!body.data.last_renewed_at.is_empty());
    }

    #[tokio::test]
    async fn test_liveness_unknown_identifier_is_not_found() {
        let (leases, _temp) = test_manager(&["id-1"]);
        let err = liveness(State(test_state(leases)), lease_req("vm-a", "id-9"))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_liveness_conflict_names_current_holder() {
        let (leases, _temp) = test_manager(&["id-1"]);
        let state = test_state(leases);
        allocate(State(state.clone()), allocate_req("vm-a")).await.unwrap();

        // Expire vm-a's lease and hand the identifier to vm-b
        let later = Utc::now() + chrono::TimeDelta::seconds(60);
        state
            .leases
            .reclaim_stale(later, Duration::from_secs(10))
            .unwrap();
        allocate(State(state.clone()), allocate_req("vm-b")).await.unwrap();

        match liveness(State(state), lease_req("vm-a", "id-1")).await {
            Err(ApiError::Conflict(ConflictData {
                client_id,
                current_holder,
                ..
            })) => {
                assert_eq!(client_id, "vm-a");
                assert_eq!(current_holder.as_deref(), Some("vm-b"));
            }
            other => panic!("expected a conflict, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_liveness_on_free_identifier_conflicts() {
        let (leases, _temp) = test_manager(&["id-1"]);
        match liveness(State(test_state(leases)), lease_req("vm-a", "id-1")).await {
            Err(ApiError::Conflict(data)) => assert_eq!(data.current_holder, None),
            other => panic!("expected a conflict, got {other:?}"),
        }
    }

    // ========================================================================
    // release
    // ========================================================================

    #[tokio::test]
    async fn test_release_always_succeeds() {
        let (leases, _temp) = test_manager(&["id-1"]);
        let state = test_state(leases);
        allocate(State(state.clone()), allocate_req("vm-a")).await.unwrap();

        release(State(state.clone()), lease_req("vm-b", "id-1"))
            .await
            .unwrap();
        assert_eq!(
            state.leases.client_details("vm-a").unwrap().identifier,
            "id-1"
        );

        release(State(state.clone()), lease_req("vm-a", "id-1"))
            .await
            .unwrap();
        release(State(state.clone()), lease_req("vm-a", "unknown"))
            .await
            .unwrap();
        assert_eq!(state.leases.stats(Utc::now()).unwrap().free, 1);
    }

    #[tokio::test]
    async fn test_release_requires_identifier() {
        let (leases, _temp) = test_manager(&["id-1"]);
        let err = release(State(test_state(leases)), lease_req("vm-a", ""))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }
}

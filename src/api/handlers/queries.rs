use axum::extract::{Path, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{lease_error, with_leases};
use crate::api::response::{ApiError, JSend};
use crate::lease::LeaseManager;
use crate::storage::models::{Identifier, Lease};
use crate::AppState;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct IdentifierResponse {
    pub allocated: bool,
    pub client_id: Option<String>,
    pub identifier: String,
    pub last_renewed_at: Option<String>,
    pub stale: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LeaseResponse {
    pub client_id: String,
    pub identifier: String,
    pub last_renewed_at: String,
    pub stale: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatsResponse {
    pub allocated_identifiers: u64,
    pub available_identifiers: u64,
    pub stale_identifiers: u64,
    pub stale_timeout_seconds: u64,
    pub total_identifiers: u64,
}

// ============================================================================
// Handlers
// ============================================================================

pub async fn list_identifiers(
    State(state): State<Arc<AppState>>,
) -> Result<Json<JSend<Vec<IdentifierResponse>>>, ApiError> {
    let identifiers = with_leases(&state, |leases| {
        let now = Utc::now();
        let records = leases.list_identifiers().map_err(lease_error)?;
        Ok(records
            .iter()
            .map(|record| identifier_to_response(leases, record, now))
            .collect::<Vec<_>>())
    })
    .await?;

    Ok(JSend::success(identifiers))
}

pub async fn list_allocated(
    State(state): State<Arc<AppState>>,
) -> Result<Json<JSend<Vec<LeaseResponse>>>, ApiError> {
    let allocated = with_leases(&state, |leases| {
        let now = Utc::now();
        let held = leases.list_allocated().map_err(lease_error)?;
        Ok(held
            .iter()
            .map(|lease| lease_to_response(leases, lease, now))
            .collect::<Vec<_>>())
    })
    .await?;

    Ok(JSend::success(allocated))
}

pub async fn client_details(
    State(state): State<Arc<AppState>>,
    Path(client_id): Path<String>,
) -> Result<Json<JSend<LeaseResponse>>, ApiError> {
    let response = with_leases(&state, move |leases| {
        let lease = leases.client_details(&client_id).map_err(lease_error)?;
        Ok(lease_to_response(leases, &lease, Utc::now()))
    })
    .await?;

    Ok(JSend::success(response))
}

pub async fn identifier_details(
    State(state): State<Arc<AppState>>,
    Path(identifier): Path<String>,
) -> Result<Json<JSend<IdentifierResponse>>, ApiError> {
    let response = with_leases(&state, move |leases| {
        let record = leases.identifier_details(&identifier).map_err(lease_error)?;
        Ok(identifier_to_response(leases, &record, Utc::now()))
    })
    .await?;

    Ok(JSend::success(response))
}

pub async fn stats(
    State(state): State<Arc<AppState>>,
) -> Result<Json<JSend<StatsResponse>>, ApiError> {
    let counts = with_leases(&state, |leases| {
        leases.stats(Utc::now()).map_err(lease_error)
    })
    .await?;

    Ok(JSend::success(StatsResponse {
        allocated_identifiers: counts.leased,
        available_identifiers: counts.free,
        stale_identifiers: counts.stale,
        stale_timeout_seconds: state.leases.stale_timeout().as_secs(),
        total_identifiers: counts.total,
    }))
}

// ============================================================================
// Helpers
// ============================================================================

fn lease_to_response(leases: &LeaseManager, lease: &Lease, now: DateTime<Utc>) -> LeaseResponse {
    LeaseResponse {
        client_id: lease.holder.clone(),
        identifier: lease.identifier.clone(),
        last_renewed_at: lease.last_renewed_at.to_rfc3339(),
        stale: leases.is_stale(lease, now),
    }
}

fn identifier_to_response(
    leases: &LeaseManager,
    record: &Identifier,
    now: DateTime<Utc>,
) -> IdentifierResponse {
    let lease = record.lease();
    IdentifierResponse {
        allocated: lease.is_some(),
        client_id: record.holder.clone(),
        identifier: record.value.clone(),
        last_renewed_at: record.last_renewed_at.map(|t| t.to_rfc3339()),
        stale: lease.is_some_and(|l| leases.is_stale(&l, now)),
    }
}

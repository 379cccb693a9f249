use axum::{extract::State, Json};
use serde::Serialize;
use std::sync::Arc;

use crate::api::response::JSend;
use crate::config::StorageBackend;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub storage: String,
}

pub async fn health(State(state): State<Arc<AppState>>) -> Json<JSend<HealthResponse>> {
    let storage = match state.config.storage.backend {
        StorageBackend::Memory => "memory",
        StorageBackend::Redb => "redb",
    };

    JSend::success(HealthResponse {
        status: "healthy".to_string(),
        storage: storage.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{test_manager, test_state};

    #[tokio::test]
    async fn test_health_reports_backend() {
        let (leases, _temp) = test_manager(&["id-1"]);
        let Json(body) = health(State(test_state(leases))).await;
        assert_eq!(body.data.status, "healthy");
        assert_eq!(body.data.storage, "redb");
    }
}

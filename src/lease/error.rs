use thiserror::Error;

use crate::storage::DatabaseError;

#[derive(Debug, Error)]
pub enum LeaseError {
    #[error("Client not found: {0}")]
    ClientNotFound(String),
    #[error("Identifier not found: {0}")]
    IdentifierNotFound(String),
    #[error(
        "Identifier {identifier} is held by {}",
        .actual_holder.as_deref().unwrap_or("no one")
    )]
    OwnershipConflict {
        identifier: String,
        actual_holder: Option<String>,
    },
    #[error("No available identifiers")]
    PoolExhausted,
    #[error("Store unavailable: {0}")]
    StoreUnavailable(#[from] DatabaseError),
}

//! The lease engine: allocation, renewal, release and reclamation rules
//! on top of a [`LeaseStore`](crate::storage::LeaseStore), plus the
//! read-only query surface.

mod error;
mod manager;
mod query;

pub use error::LeaseError;
pub use manager::{stale_threshold, LeaseManager};

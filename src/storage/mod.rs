pub mod db;
mod identifiers;
mod memory;
pub mod models;
pub mod store;
mod tables;

pub use db::{Database, DatabaseError};
pub use memory::InMemoryStore;
pub use store::{ClaimOutcome, LeaseStore, ReleaseOutcome, RenewOutcome};
pub use tables::*;

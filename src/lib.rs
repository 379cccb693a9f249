//! lease-manager - hands out a bounded pool of identifiers to ephemeral clients
//!
//! This crate provides exclusive, time-bounded identifier leases with:
//! - Idempotent allocation (a client holds at most one identifier)
//! - Liveness renewal with ownership-conflict detection
//! - Background reclamation of stale leases
//! - redb embedded database (ACID, crash-safe) or an in-memory pool
//! - REST API

pub mod api;
pub mod config;
pub mod expiration;
pub mod lease;
pub mod pool;
pub mod storage;
#[cfg(test)]
pub mod testutil;

use config::Config;
use lease::LeaseManager;

/// Shared application state
pub struct AppState {
    pub config: Config,
    pub leases: LeaseManager,
}

//! Shared configuration, errors, and typed ids for Ledgerline.
//!
//! This crate provides common types used across all other crates:
//! - Typed IDs for tenant, actor, and ledger row references
//! - Application-wide error types
//! - Layered configuration for the server, workers, and locks

pub mod config;
pub mod error;
pub mod types;

pub use config::AppConfig;
pub use error::{AppError, AppResult};

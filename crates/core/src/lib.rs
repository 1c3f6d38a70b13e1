//! Core posting pipeline logic for Ledgerline.
//!
//! This crate contains pure logic with ZERO web or database dependencies.
//! Everything that decides *what* happens to an event lives here; the `db`
//! crate only decides *how* it is persisted.
//!
//! # Modules
//!
//! - `event` - Event payloads, reference types, and the processing context
//! - `outbox` - Publish and processing lifecycles, backoff, retry/DEAD control
//! - `posting` - Posting gate, idempotency decisions, routing, tenant locks
//! - `ledger` - Journal and stock ledgers, reversal, running-balance rebuild

pub mod event;
pub mod ledger;
pub mod outbox;
pub mod posting;

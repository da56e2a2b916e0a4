//! A ledger transaction engine with idempotent operations, per-account
//! soft locking, risk evaluation and a pending-approval workflow.

pub mod application;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod interfaces;
